// ABOUTME: Runs a deploy: preflight, lock, snapshot, modules in order, then validation.
// ABOUTME: Halts on the first module failure; rollback is left to the operator.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;

use crate::backup::{BackupManager, BackupSnapshot};
use crate::context::{ConfigContext, DeploymentRun};
use crate::diagnostics::{Diagnostics, Warning};
use crate::exec::CommandRunner;
use crate::modules::{ModuleEnv, ModuleKind, ModuleOutcome};
use crate::runtime::ContainerRuntime;
use crate::state::{ModuleStatus, StateLog};
use crate::validate::{HealthTarget, ValidationReport, Validator};

use super::error::{DeployError, RollbackTarget};
use super::lock::DeployLock;
use super::preflight::Preflight;

/// Shared flag an operator interrupt sets; checked between modules.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Summary of a successful deploy.
#[derive(Debug, Clone, Serialize)]
pub struct DeployReport {
    pub run: DeploymentRun,
    #[serde(serialize_with = "serialize_backup_dir")]
    pub snapshot: BackupSnapshot,
    pub outcomes: Vec<(ModuleKind, ModuleOutcome)>,
    pub validation: ValidationReport,
    pub warnings: Vec<Warning>,
}

fn serialize_backup_dir<S: serde::Serializer>(
    snapshot: &BackupSnapshot,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&snapshot.dir.display())
}

/// Drives one deploy run.
pub struct Orchestrator<'a> {
    ctx: &'a ConfigContext,
    runner: &'a dyn CommandRunner,
    runtime: &'a dyn ContainerRuntime,
    cancel: CancelFlag,
    force_lock: bool,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        ctx: &'a ConfigContext,
        runner: &'a dyn CommandRunner,
        runtime: &'a dyn ContainerRuntime,
    ) -> Self {
        Self {
            ctx,
            runner,
            runtime,
            cancel: CancelFlag::new(),
            force_lock: false,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn force_lock(mut self, force: bool) -> Self {
        self.force_lock = force;
        self
    }

    pub async fn deploy(&self) -> Result<DeployReport, DeployError> {
        let ctx = self.ctx;
        let mut diag = Diagnostics::default();

        let plan = Preflight::new(ctx, self.runner, self.runtime)
            .run(&mut diag)
            .await?;

        let lock = DeployLock::acquire(&ctx.layout.lock_file(), &ctx.environment, self.force_lock)?;

        let run = ctx.run();
        let log = StateLog::new(ctx.layout.state_log());
        log.begin_run(&run)?;
        tracing::info!(
            "deploy {}: environment {}, version {}",
            run.deployment_id,
            run.environment,
            run.version
        );

        let snapshot = BackupManager::new(ctx, self.runner, self.runtime)
            .snapshot(&run)
            .await;
        for warning in snapshot.warnings() {
            diag.warn(Warning::backup(warning.clone()));
        }

        let env = ModuleEnv::new(ctx, self.runner, self.runtime);
        let mut outcomes = Vec::with_capacity(plan.len());
        for module in plan {
            if self.cancel.is_cancelled() {
                tracing::warn!("deploy cancelled before {}", module);
                return Err(DeployError::Cancelled {
                    next: module,
                    target: self.rollback_target(&snapshot),
                });
            }

            match module.execute(&env).await {
                Ok(outcome) => {
                    log.record(module, ModuleStatus::Success)?;
                    outcomes.push((module, outcome));
                }
                Err(source) => {
                    if let Err(e) = log.record(module, ModuleStatus::Failed) {
                        tracing::error!("failed to record failure of {}: {}", module, e);
                    }
                    return Err(DeployError::ModuleFailed {
                        module,
                        target: self.rollback_target(&snapshot),
                        source,
                    });
                }
            }
        }

        let validation = self.validate().await;
        for failure in validation.failures() {
            diag.warn(Warning::validation(format!(
                "{} failed validation: {}",
                failure.target, failure.detail
            )));
        }

        if let Err(e) = lock.release() {
            diag.warn(Warning::lock_release(format!("failed to release deploy lock: {e}")));
        }

        Ok(DeployReport {
            run,
            snapshot,
            outcomes,
            validation,
            warnings: diag.into_warnings(),
        })
    }

    fn rollback_target(&self, snapshot: &BackupSnapshot) -> RollbackTarget {
        RollbackTarget {
            project_root: self.ctx.project_root().to_path_buf(),
            environment: self.ctx.environment.clone(),
            backup_dir: snapshot.dir.clone(),
        }
    }

    /// Grace period, then one validation pass.
    async fn validate(&self) -> ValidationReport {
        let config = &self.ctx.config;
        let grace = config.validation.grace_period;
        if !grace.is_zero() {
            tracing::info!("waiting {}s before validation", grace.as_secs());
            tokio::time::sleep(grace).await;
        }
        let targets = HealthTarget::from_config(config);
        Validator::new(self.runtime, &config.project, config.validation.http_timeout)
            .run(&targets)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_flag_is_shared_between_clones() {
        let flag = CancelFlag::new();
        let handle = flag.clone();
        assert!(!flag.is_cancelled());
        handle.cancel();
        assert!(flag.is_cancelled());
    }
}

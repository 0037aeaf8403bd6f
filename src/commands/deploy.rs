// ABOUTME: Deploy command implementation.
// ABOUTME: Runs the orchestrator and prints either a summary or the rollback hint.

use super::runtime_connection::connect_to_runtime;
use deployctl::context::ConfigContext;
use deployctl::deploy::{CancelFlag, DeployError, DeployReport, Orchestrator};
use deployctl::error::Result;
use deployctl::exec::ProcessRunner;
use deployctl::modules::{ModuleKind, ModuleOutcome};
use deployctl::output::Output;
use serde::Serialize;

/// Deploy the stack described by `ctx`.
pub async fn deploy(
    ctx: &ConfigContext,
    force_lock: bool,
    cancel: CancelFlag,
    mut output: Output,
) -> Result<()> {
    output.start_timer();
    output.progress(&format!(
        "Deploying {} ({}) version {}",
        ctx.config.project, ctx.environment, ctx.version
    ));

    let runtime = connect_to_runtime(ctx, &output)?;
    let runner = ProcessRunner::new();

    let result = Orchestrator::new(ctx, &runner, &runtime)
        .with_cancel(cancel)
        .force_lock(force_lock)
        .deploy()
        .await;

    match result {
        Ok(report) => {
            print_summary(&report, &output);
            Ok(())
        }
        Err(e) => {
            print_failure(&e, &output);
            Err(e.into())
        }
    }
}

fn print_summary(report: &DeployReport, output: &Output) {
    for warning in &report.warnings {
        output.warning(&warning.message);
    }

    output.detail("Deployment ID", report.run.deployment_id.as_str());
    output.detail("Environment", report.run.environment.as_str());
    output.detail("Version", &report.run.version);
    output.detail("Backup", &report.snapshot.dir.display().to_string());
    for (module, outcome) in &report.outcomes {
        let label = match outcome {
            ModuleOutcome::Executed => "executed",
            ModuleOutcome::Skipped => "skipped (already at this version)",
        };
        output.detail(module.name(), label);
    }
    output.detail(
        "Validation",
        &format!(
            "{} passed, {} warned",
            report.validation.passed, report.validation.warned
        ),
    );

    output.report("deploy", report);
    output.success("Deployment complete!");
}

#[derive(Serialize)]
struct FailureReport<'a> {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    module: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    backup_dir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rollback_command: Option<String>,
}

/// Operator-facing lines explaining why the run stopped and how to undo it.
fn failure_notices(error: &DeployError) -> Vec<String> {
    let mut notices = Vec::new();
    if let Some(holder) = error.lock_holder_info() {
        notices.push(format!(
            "Deploy lock held by {} (pid {}) since {}; pass --force-lock to break it",
            holder.holder, holder.pid, holder.started_at
        ));
    }
    if let Some(module) = error.failed_module() {
        notices.push(format!(
            "  ✗ Module {} ({} of {}) failed",
            module,
            module.position(),
            ModuleKind::ALL.len()
        ));
    }
    if let Some(dir) = error.backup_dir() {
        notices.push(format!("  Backup: {}", dir.display()));
    }
    if let Some(command) = error.rollback_command() {
        notices.push(format!("  To roll back run: {command}"));
    }
    notices
}

fn print_failure(error: &DeployError, output: &Output) {
    for notice in failure_notices(error) {
        output.notice(&notice);
    }

    output.report(
        "deploy_failed",
        &FailureReport {
            error: error.to_string(),
            module: error.failed_module().map(|m| m.name()),
            backup_dir: error.backup_dir().map(|d| d.display().to_string()),
            rollback_command: error.rollback_command(),
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use deployctl::deploy::RollbackTarget;
    use deployctl::modules::ModuleError;
    use deployctl::types::EnvironmentName;
    use std::path::PathBuf;

    #[test]
    fn failure_hint_names_the_project_root() {
        let error = DeployError::ModuleFailed {
            module: ModuleKind::Services,
            target: RollbackTarget {
                project_root: PathBuf::from("/srv/app"),
                environment: EnvironmentName::new("production").unwrap(),
                backup_dir: PathBuf::from("/srv/app/backups/20260301-100000-abcdef"),
            },
            source: ModuleError::Failed {
                module: ModuleKind::Services,
                message: "api never started".into(),
            },
        };

        let notices = failure_notices(&error);
        assert_eq!(notices[0], "  ✗ Module services (5 of 7) failed");
        assert_eq!(
            notices.last().map(String::as_str),
            Some(
                "  To roll back run: deployctl --project-root /srv/app --environment production rollback /srv/app/backups/20260301-100000-abcdef"
            )
        );
    }
}

// ABOUTME: The closed set of provisioning modules run in a fixed declared order.
// ABOUTME: Each module checks its idempotency marker, does its work, then writes the marker.

mod cache;
mod compose_file;
mod database;
mod gateway;
mod init;
mod marker;
mod monitoring;
mod secrets;
mod services;

pub use compose_file::render_compose_file;
pub use gateway::HEALTH_PROBE_PREFIX;
pub use marker::IdempotencyMarker;

use crate::context::ConfigContext;
use crate::exec::{CommandError, CommandOutput, CommandRunner, CommandSpec};
use crate::files::{self, MODE_PUBLIC};
use crate::runtime::{
    ContainerError, ContainerFilters, ContainerOps, ContainerRuntime, ContainerSummary,
    ExecConfig, ExecError, ExecOps, ExecResult,
};
use crate::secrets::{SecretError, SecretStore};
use serde::Serialize;
use snafu::{ResultExt, Snafu};
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// A provisioning module. Declaration order is deployment order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    Init,
    Secrets,
    Database,
    Cache,
    Services,
    Monitoring,
    Gateway,
}

impl ModuleKind {
    pub const ALL: [ModuleKind; 7] = [
        ModuleKind::Init,
        ModuleKind::Secrets,
        ModuleKind::Database,
        ModuleKind::Cache,
        ModuleKind::Services,
        ModuleKind::Monitoring,
        ModuleKind::Gateway,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ModuleKind::Init => "init",
            ModuleKind::Secrets => "secrets",
            ModuleKind::Database => "database",
            ModuleKind::Cache => "cache",
            ModuleKind::Services => "services",
            ModuleKind::Monitoring => "monitoring",
            ModuleKind::Gateway => "gateway",
        }
    }

    /// 1-based position in deployment order.
    pub fn position(self) -> usize {
        self as usize + 1
    }

    /// Run the module unless its marker already records the current version.
    pub async fn execute(self, env: &ModuleEnv<'_>) -> Result<ModuleOutcome, ModuleError> {
        let ctx = env.ctx;
        let marker = IdempotencyMarker::new(&ctx.layout, self);

        let forced = ctx.force.reinit(self);
        let current = marker.matches(&ctx.version).context(IoSnafu {
            module: self,
            path: marker.path(),
        })?;
        if current && !forced {
            tracing::info!("{}: already at version {}, skipping", self, ctx.version);
            return Ok(ModuleOutcome::Skipped);
        }

        tracing::info!("{}: running (version {})", self, ctx.version);
        match self {
            ModuleKind::Init => init::run(env).await?,
            ModuleKind::Secrets => secrets::run(env).await?,
            ModuleKind::Database => database::run(env).await?,
            ModuleKind::Cache => cache::run(env).await?,
            ModuleKind::Services => services::run(env).await?,
            ModuleKind::Monitoring => monitoring::run(env).await?,
            ModuleKind::Gateway => gateway::run(env).await?,
        }

        marker.write(&ctx.version).context(IoSnafu {
            module: self,
            path: marker.path(),
        })?;
        tracing::info!("{}: done", self);
        Ok(ModuleOutcome::Executed)
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A module name that matches no module.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown module: {0}")]
pub struct UnknownModule(pub String);

impl FromStr for ModuleKind {
    type Err = UnknownModule;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModuleKind::ALL
            .into_iter()
            .find(|m| m.name() == s)
            .ok_or_else(|| UnknownModule(s.to_string()))
    }
}

/// What a module did on this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleOutcome {
    Executed,
    Skipped,
}

/// Errors from module execution. Every external failure carries the module name.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ModuleError {
    #[snafu(display("{module}: command failed: {source}"))]
    Command {
        module: ModuleKind,
        command: String,
        source: CommandError,
    },

    #[snafu(display("{module}: `{command}` in {container} failed: {source}"))]
    Exec {
        module: ModuleKind,
        container: String,
        command: String,
        source: ExecError,
    },

    #[snafu(display("{module}: container runtime error: {source}"))]
    Container {
        module: ModuleKind,
        source: ContainerError,
    },

    #[snafu(display("{module}: {source}"))]
    Secret {
        module: ModuleKind,
        source: SecretError,
    },

    #[snafu(display("{module}: failed to write {}: {source}", path.display()))]
    Io {
        module: ModuleKind,
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("{module}: {source}"))]
    Config {
        module: ModuleKind,
        source: Box<crate::error::Error>,
    },

    #[snafu(display("{module}: {what} not ready after {}s{}", timeout.as_secs(), describe_last(last_error)))]
    NotReady {
        module: ModuleKind,
        what: String,
        timeout: Duration,
        last_error: Option<String>,
    },

    #[snafu(display("{module}: {message}"))]
    Failed { module: ModuleKind, message: String },
}

fn describe_last(last_error: &Option<String>) -> String {
    match last_error {
        Some(e) => format!(" (last error: {e})"),
        None => String::new(),
    }
}

impl ModuleError {
    pub fn module(&self) -> ModuleKind {
        match self {
            ModuleError::Command { module, .. }
            | ModuleError::Exec { module, .. }
            | ModuleError::Container { module, .. }
            | ModuleError::Secret { module, .. }
            | ModuleError::Io { module, .. }
            | ModuleError::Config { module, .. }
            | ModuleError::NotReady { module, .. }
            | ModuleError::Failed { module, .. } => *module,
        }
    }

    /// The external command that failed, when there was one.
    pub fn command(&self) -> Option<&str> {
        match self {
            ModuleError::Command { command, .. } | ModuleError::Exec { command, .. } => {
                Some(command)
            }
            _ => None,
        }
    }
}

/// Collaborators a module needs besides the run context.
#[derive(Clone, Copy)]
pub struct ModuleEnv<'a> {
    pub ctx: &'a ConfigContext,
    pub runner: &'a dyn CommandRunner,
    pub runtime: &'a dyn ContainerRuntime,
}

impl<'a> ModuleEnv<'a> {
    pub fn new(
        ctx: &'a ConfigContext,
        runner: &'a dyn CommandRunner,
        runtime: &'a dyn ContainerRuntime,
    ) -> Self {
        Self {
            ctx,
            runner,
            runtime,
        }
    }

    pub(crate) fn secret_store(&self) -> SecretStore {
        SecretStore::new(&self.ctx.layout)
    }

    pub(crate) async fn run(
        &self,
        module: ModuleKind,
        spec: &CommandSpec,
    ) -> Result<CommandOutput, ModuleError> {
        tracing::debug!("{}: running {}", module, spec);
        self.runner.run_checked(spec).await.context(CommandSnafu {
            module,
            command: spec.to_string(),
        })
    }

    /// `compose up -d` for the given services.
    pub(crate) async fn compose_up<S: AsRef<str>>(
        &self,
        module: ModuleKind,
        services: &[S],
    ) -> Result<(), ModuleError> {
        let spec = self.ctx.compose().up(services);
        self.run(module, &spec).await.map(|_| ())
    }

    /// Render a generated artifact; unchanged content is not rewritten.
    pub(crate) fn write_file(
        &self,
        module: ModuleKind,
        path: &Path,
        contents: &str,
        mode: u32,
    ) -> Result<(), ModuleError> {
        let changed =
            files::write_if_changed(path, contents.as_bytes(), mode).context(IoSnafu {
                module,
                path,
            })?;
        if changed {
            tracing::debug!("{}: wrote {}", module, path.display());
        }
        Ok(())
    }

    pub(crate) fn write_config(
        &self,
        module: ModuleKind,
        path: &Path,
        contents: &str,
    ) -> Result<(), ModuleError> {
        self.write_file(module, path, contents, MODE_PUBLIC)
    }

    /// The running container of a compose service, if any.
    pub(crate) async fn service_container(
        &self,
        module: ModuleKind,
        service: &str,
    ) -> Result<Option<ContainerSummary>, ModuleError> {
        let filters = ContainerFilters::for_service(&self.ctx.config.project, service, false);
        let containers = self
            .runtime
            .list_containers(&filters)
            .await
            .context(ContainerSnafu { module })?;
        Ok(containers.into_iter().find(|c| c.is_running()))
    }

    /// Exec inside the running container of `service`.
    pub(crate) async fn exec_in_service(
        &self,
        module: ModuleKind,
        service: &str,
        config: &ExecConfig,
    ) -> Result<ExecResult, ModuleError> {
        let container = self
            .service_container(module, service)
            .await?
            .ok_or_else(|| ModuleError::Failed {
                module,
                message: format!("no running container for service '{service}'"),
            })?;
        tracing::debug!("{}: exec {} in {}", module, config.display_cmd(), container.name);
        self.runtime
            .exec(&container.id, config)
            .await
            .context(ExecSnafu {
                module,
                container: container.name.clone(),
                command: config.display_cmd(),
            })
    }
}

/// Poll `probe` until it reports ready or `timeout` elapses.
///
/// Probe errors count as "not ready yet"; the last one is kept for the report.
pub(crate) async fn wait_until<F, Fut>(
    module: ModuleKind,
    what: &str,
    timeout: Duration,
    interval: Duration,
    mut probe: F,
) -> Result<(), ModuleError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, ModuleError>>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    let mut last_error = None;
    loop {
        match probe().await {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(e) => {
                tracing::debug!("{}: {} not ready: {}", module, what, e);
                last_error = Some(e.to_string());
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(ModuleError::NotReady {
                module,
                what: what.to_string(),
                timeout,
                last_error,
            });
        }
        tokio::time::sleep(interval).await;
    }
}

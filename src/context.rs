// ABOUTME: Immutable per-invocation run parameters and the project directory layout.
// ABOUTME: Built once in the CLI and passed by reference to every component.

use crate::config::Config;
use crate::modules::{ModuleKind, UnknownModule};
use crate::types::{AppVersion, DeploymentId, EnvironmentName};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Paths of every artifact under the project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn compose_file(&self) -> PathBuf {
        self.root.join("docker-compose.yml")
    }

    pub fn env_file(&self) -> PathBuf {
        self.root.join(".env")
    }

    pub fn deploy_dir(&self) -> PathBuf {
        self.root.join(".deploy")
    }

    pub fn state_log(&self) -> PathBuf {
        self.deploy_dir().join("state.log")
    }

    pub fn markers_dir(&self) -> PathBuf {
        self.deploy_dir().join("markers")
    }

    pub fn lock_file(&self) -> PathBuf {
        self.deploy_dir().join("deploy.lock")
    }

    pub fn secrets_dir(&self) -> PathBuf {
        self.root.join("secrets")
    }

    pub fn tls_dir(&self) -> PathBuf {
        self.root.join("tls")
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.root.join("backups")
    }

    pub fn backup_dir(&self, id: &DeploymentId) -> PathBuf {
        self.backups_dir().join(id.as_str())
    }

    /// Generated configuration for one service, e.g. `config/postgres`.
    pub fn service_config_dir(&self, service: &str) -> PathBuf {
        self.root.join("config").join(service)
    }

    /// Persistent volume directory for one service, e.g. `data/postgres`.
    pub fn data_dir(&self, service: &str) -> PathBuf {
        self.root.join("data").join(service)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }
}

/// Operator overrides of the idempotency markers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForceFlags {
    reinit: BTreeSet<ModuleKind>,
    /// Regenerate every secret value (implies re-running `secrets`).
    pub recreate_secrets: bool,
}

impl ForceFlags {
    /// Parse a comma-separated module list; `all` selects every module.
    pub fn parse(list: &str) -> Result<Self, UnknownModule> {
        let mut reinit = BTreeSet::new();
        for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            if item.eq_ignore_ascii_case("all") {
                reinit.extend(ModuleKind::ALL);
            } else {
                reinit.insert(item.parse()?);
            }
        }
        Ok(Self {
            reinit,
            recreate_secrets: false,
        })
    }

    pub fn all() -> Self {
        Self {
            reinit: ModuleKind::ALL.into_iter().collect(),
            recreate_secrets: false,
        }
    }

    pub fn with_recreate_secrets(mut self, recreate: bool) -> Self {
        self.recreate_secrets = recreate;
        self
    }

    /// Whether `module` must run even if its marker matches.
    pub fn reinit(&self, module: ModuleKind) -> bool {
        self.reinit.contains(&module) || (self.recreate_secrets && module == ModuleKind::Secrets)
    }

    pub fn is_empty(&self) -> bool {
        self.reinit.is_empty() && !self.recreate_secrets
    }
}

/// One deploy invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentRun {
    pub deployment_id: DeploymentId,
    pub version: AppVersion,
    pub environment: EnvironmentName,
    pub started_at: DateTime<Utc>,
}

/// Immutable run parameters shared by every component.
#[derive(Debug, Clone)]
pub struct ConfigContext {
    pub environment: EnvironmentName,
    pub deployment_id: DeploymentId,
    pub version: AppVersion,
    pub started_at: DateTime<Utc>,
    pub force: ForceFlags,
    pub layout: Layout,
    /// Project configuration with the environment's overrides applied.
    pub config: Config,
}

impl ConfigContext {
    pub const DEFAULT_VERSION: &'static str = "latest";

    /// Build a context for a new run, applying environment overrides to `config`.
    pub fn new(
        project_root: impl Into<PathBuf>,
        environment: EnvironmentName,
        version: &str,
        config: &Config,
    ) -> crate::error::Result<Self> {
        let version = AppVersion::new(version)?;
        let started_at = Utc::now();
        let config = config.for_environment(&environment)?;
        Ok(Self {
            environment,
            deployment_id: DeploymentId::generate(started_at),
            version,
            started_at,
            force: ForceFlags::default(),
            layout: Layout::new(project_root),
            config,
        })
    }

    pub fn with_force(mut self, force: ForceFlags) -> Self {
        self.force = force;
        self
    }

    pub fn project_root(&self) -> &Path {
        self.layout.root()
    }

    pub fn run(&self) -> DeploymentRun {
        DeploymentRun {
            deployment_id: self.deployment_id.clone(),
            version: self.version.clone(),
            environment: self.environment.clone(),
            started_at: self.started_at,
        }
    }

    /// Compose invocation helper bound to this project.
    pub fn compose(&self) -> crate::exec::Compose {
        crate::exec::Compose::new(
            &self.config.compose.program,
            &self.layout.compose_file(),
            &self.config.project,
            self.layout.root(),
        )
        .with_timeout(self.config.compose.timeout)
    }
}

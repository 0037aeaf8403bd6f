// ABOUTME: Application-wide error types for deployctl.
// ABOUTME: Uses thiserror; every error maps to a stable process exit code.

use crate::backup::RollbackError;
use crate::deploy::{DeployError, DeployErrorKind, LockError};
use crate::exec::CommandError;
use crate::modules::{ModuleKind, UnknownModule};
use crate::runtime::{ContainerError, LogError, RuntimeError};
use crate::state::StateLogError;
use crate::types::{AppVersionError, EnvironmentNameError};
use thiserror::Error;

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_USAGE: i32 = 2;
pub const EXIT_PREFLIGHT: i32 = 3;
pub const EXIT_LOCK: i32 = 4;
pub const EXIT_ROLLBACK: i32 = 5;
pub const EXIT_VALIDATION: i32 = 6;
/// Module failures exit with this plus the module's 1-based position.
pub const EXIT_MODULE_BASE: i32 = 10;
pub const EXIT_CANCELLED: i32 = 130;

#[derive(Debug, Error)]
pub enum Error {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    InvalidEnvironment(#[from] EnvironmentNameError),

    #[error(transparent)]
    InvalidVersion(#[from] AppVersionError),

    #[error(transparent)]
    UnknownModule(#[from] UnknownModule),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("container runtime: {0}")]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Deploy(#[from] DeployError),

    #[error("rollback failed: {0}")]
    Rollback(#[from] RollbackError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    StateLog(#[from] StateLogError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("container runtime: {0}")]
    Container(#[from] ContainerError),

    #[error("failed to read logs: {0}")]
    Logs(#[from] LogError),

    #[error("validation failed for {failed} target(s)")]
    ValidationFailed { failed: usize },

    #[error("aborted by operator")]
    Aborted,
}

impl Error {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::MissingEnvVar(_)
            | Error::InvalidConfig(_)
            | Error::InvalidEnvironment(_)
            | Error::InvalidVersion(_)
            | Error::UnknownModule(_)
            | Error::Yaml(_) => EXIT_USAGE,
            Error::Deploy(e) => match e.kind() {
                DeployErrorKind::Preflight => EXIT_PREFLIGHT,
                DeployErrorKind::LockHeld | DeployErrorKind::Lock => EXIT_LOCK,
                DeployErrorKind::ModuleFailed => e
                    .failed_module()
                    .map(module_exit_code)
                    .unwrap_or(EXIT_FAILURE),
                DeployErrorKind::Cancelled => EXIT_CANCELLED,
                DeployErrorKind::StateLog => EXIT_FAILURE,
            },
            Error::Lock(_) => EXIT_LOCK,
            Error::Rollback(_) => EXIT_ROLLBACK,
            Error::ValidationFailed { .. } => EXIT_VALIDATION,
            Error::Aborted => EXIT_CANCELLED,
            Error::Io(_)
            | Error::Runtime(_)
            | Error::StateLog(_)
            | Error::Command(_)
            | Error::Container(_)
            | Error::Logs(_) => EXIT_FAILURE,
        }
    }
}

pub fn module_exit_code(module: ModuleKind) -> i32 {
    EXIT_MODULE_BASE + module.position() as i32
}

pub type Result<T> = std::result::Result<T, Error>;

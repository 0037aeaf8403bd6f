// ABOUTME: Error types for the deploy pipeline.
// ABOUTME: Module failures carry a rollback target so the CLI can print a runnable rollback invocation.

use std::path::{Path, PathBuf};

use crate::exec::CommandSpec;
use crate::modules::{ModuleError, ModuleKind};
use crate::state::StateLogError;
use crate::types::EnvironmentName;

use super::lock::{LockError, LockInfo};
use super::preflight::PreflightError;

/// Everything the rollback invocation for a halted run needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackTarget {
    pub project_root: PathBuf,
    pub environment: EnvironmentName,
    pub backup_dir: PathBuf,
}

impl RollbackTarget {
    /// The `deployctl rollback` invocation, valid from any working directory.
    pub fn command(&self) -> String {
        CommandSpec::new("deployctl")
            .arg("--project-root")
            .arg(self.project_root.display().to_string())
            .arg("--environment")
            .arg(self.environment.as_str())
            .arg("rollback")
            .arg(self.backup_dir.display().to_string())
            .to_string()
    }
}

/// Errors that end a deploy run.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// Nothing was touched.
    #[error(transparent)]
    Preflight(#[from] PreflightError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    StateLog(#[from] StateLogError),

    /// Module `module` failed; earlier modules' artifacts stay on disk.
    #[error("deploy halted at module {} of {}: {source}", .module.position(), ModuleKind::ALL.len())]
    ModuleFailed {
        module: ModuleKind,
        target: RollbackTarget,
        #[source]
        source: ModuleError,
    },

    /// Operator cancelled between modules.
    #[error("deploy cancelled before module {next}")]
    Cancelled {
        next: ModuleKind,
        target: RollbackTarget,
    },
}

/// Categories of deploy errors, for callers that branch on the cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployErrorKind {
    Preflight,
    LockHeld,
    Lock,
    StateLog,
    ModuleFailed,
    Cancelled,
}

impl DeployError {
    pub fn kind(&self) -> DeployErrorKind {
        match self {
            DeployError::Preflight(_) => DeployErrorKind::Preflight,
            DeployError::Lock(LockError::Held(_)) => DeployErrorKind::LockHeld,
            DeployError::Lock(_) => DeployErrorKind::Lock,
            DeployError::StateLog(_) => DeployErrorKind::StateLog,
            DeployError::ModuleFailed { .. } => DeployErrorKind::ModuleFailed,
            DeployError::Cancelled { .. } => DeployErrorKind::Cancelled,
        }
    }

    pub fn rollback_target(&self) -> Option<&RollbackTarget> {
        match self {
            DeployError::ModuleFailed { target, .. } | DeployError::Cancelled { target, .. } => {
                Some(target)
            }
            _ => None,
        }
    }

    /// Backup taken at the start of the run, when the run got that far.
    pub fn backup_dir(&self) -> Option<&Path> {
        self.rollback_target().map(|t| t.backup_dir.as_path())
    }

    /// The exact command that rolls this run back.
    pub fn rollback_command(&self) -> Option<String> {
        self.rollback_target().map(RollbackTarget::command)
    }

    pub fn failed_module(&self) -> Option<ModuleKind> {
        match self {
            DeployError::ModuleFailed { module, .. } => Some(*module),
            _ => None,
        }
    }

    pub fn lock_holder_info(&self) -> Option<&LockInfo> {
        match self {
            DeployError::Lock(e) => e.holder_info(),
            _ => None,
        }
    }
}

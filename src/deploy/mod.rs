// ABOUTME: Deploy pipeline: preflight, advisory lock and the module orchestrator.
// ABOUTME: Exports the Orchestrator and the errors the CLI maps to exit codes.

mod error;
mod lock;
mod orchestrator;
mod preflight;

pub use error::{DeployError, DeployErrorKind, RollbackTarget};
pub use lock::{DeployLock, LockError, LockInfo};
pub use orchestrator::{CancelFlag, DeployReport, Orchestrator};
pub use preflight::{Preflight, PreflightError, PreflightProblem, resolve_modules};

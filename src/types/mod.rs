// ABOUTME: Validated domain types shared across the orchestrator.
// ABOUTME: Environment names, application versions and deployment identifiers.

mod deployment_id;
mod environment;
mod version;

pub use deployment_id::{DeploymentId, DeploymentIdError};
pub use environment::{EnvironmentName, EnvironmentNameError};
pub use version::{AppVersion, AppVersionError};

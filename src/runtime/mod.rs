// ABOUTME: Container runtime access for Docker and Podman.
// ABOUTME: Capability traits, local socket detection, and the bollard implementation.

mod bollard;
mod detection;
mod error;
mod traits;

pub use self::bollard::BollardRuntime;
pub use detection::{DetectionError, RuntimeConfig, RuntimeSocket, RuntimeType, detect_local};
pub use error::RuntimeError;
pub use traits::{
    COMPOSE_PROJECT_LABEL, COMPOSE_SERVICE_LABEL, ContainerError, ContainerFilters,
    ContainerOps, ContainerRuntime, ContainerSummary, ExecConfig, ExecError, ExecOps, ExecResult,
    LogError, LogLine, LogLines, LogOps, LogOptions, LogStream, RuntimeInfo, RuntimeInfoError,
    RuntimeMetadata,
};

/// Connect to the local container runtime, honouring an explicit override.
pub fn connect_local(config: Option<&RuntimeConfig>) -> Result<BollardRuntime, RuntimeError> {
    let socket = detect_local(config)?;
    tracing::debug!("using {} at {}", socket.runtime_type, socket.socket_path);
    Ok(BollardRuntime::connect(&socket)?)
}

// ABOUTME: Composable capability traits for container runtimes.
// ABOUTME: Defines ContainerOps, ExecOps, LogOps, RuntimeInfo and the umbrella trait.

mod container;
mod exec;
mod logs;
mod runtime_info;

pub use container::{
    COMPOSE_PROJECT_LABEL, COMPOSE_SERVICE_LABEL, ContainerError, ContainerFilters, ContainerOps,
    ContainerSummary,
};
pub use exec::{ExecConfig, ExecError, ExecOps, ExecResult};
pub use logs::{LogError, LogLine, LogLines, LogOps, LogOptions, LogStream};
pub use runtime_info::{RuntimeInfo, RuntimeInfoError, RuntimeMetadata};

/// Everything the orchestrator needs from a container runtime.
pub trait ContainerRuntime: RuntimeInfo + ContainerOps + ExecOps + LogOps {}

impl<T: RuntimeInfo + ContainerOps + ExecOps + LogOps> ContainerRuntime for T {}

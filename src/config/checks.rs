// ABOUTME: Configuration for preflight checks, compose invocation and validation.
// ABOUTME: Declares thresholds, timeouts and the health targets probed after deploy.

use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PreflightConfig {
    /// Executables that must answer `<tool> --version`.
    pub required_tools: Vec<String>,
    pub min_disk_gb: u64,
    /// Below this only a warning is emitted.
    pub min_memory_gb: u64,
}

impl Default for PreflightConfig {
    fn default() -> Self {
        Self {
            required_tools: vec!["docker".to_string()],
            min_disk_gb: 25,
            min_memory_gb: 4,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ComposeConfig {
    /// Program providing the `compose` subcommand (`docker` or `podman`).
    pub program: String,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            program: "docker".to_string(),
            timeout: Duration::from_secs(600),
        }
    }
}

/// A declared health target: either a compose service that must be running or
/// an HTTP endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum HealthTargetConfig {
    Http { name: String, url: String },
    Process { process: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidationConfig {
    /// Pause between the last module and the first probe.
    #[serde(with = "humantime_serde")]
    pub grace_period: Duration,

    #[serde(with = "humantime_serde")]
    pub http_timeout: Duration,

    /// Explicit targets; when unset they are derived from the stack.
    pub targets: Option<Vec<HealthTargetConfig>>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(10),
            http_timeout: Duration::from_secs(5),
            targets: None,
        }
    }
}

// ABOUTME: Test support utilities.
// ABOUTME: Scripted command runner, in-memory container runtime and project fixtures.

use async_trait::async_trait;
use deployctl::config::Config;
use deployctl::context::ConfigContext;
use deployctl::exec::{CommandError, CommandOutput, CommandRunner, CommandSpec};
use deployctl::runtime::{
    COMPOSE_PROJECT_LABEL, COMPOSE_SERVICE_LABEL, ContainerError, ContainerFilters, ContainerOps,
    ContainerSummary, ExecConfig, ExecError, ExecOps, ExecResult, LogError, LogLines, LogOps,
    LogOptions, RuntimeInfo, RuntimeInfoError, RuntimeMetadata,
};
use deployctl::types::EnvironmentName;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter =
            EnvFilter::from_default_env().add_directive("deployctl=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Configuration that deploys quickly against the fakes: no resource floors,
/// no grace period, only process health targets.
#[allow(dead_code)]
pub const FAST_CONFIG: &str = r#"
project: app
domain: app.test
preflight:
  min_disk_gb: 0
  min_memory_gb: 0
database:
  ready_timeout: 2s
  poll_interval: 10ms
cache:
  ready_timeout: 2s
  poll_interval: 10ms
services:
  apps:
    - name: api
      image: registry.local/api:{version}
      port: 8000
      health_path: /health
    - name: web
      image: registry.local/web:{version}
      port: 3000
  start_timeout: 2s
  poll_interval: 10ms
validation:
  grace_period: 0s
  http_timeout: 1s
  targets:
    - process: api
    - process: web
"#;

#[allow(dead_code)]
pub fn fast_config() -> Config {
    Config::from_yaml(FAST_CONFIG).expect("test config should parse")
}

#[allow(dead_code)]
pub fn context(root: &Path, version: &str) -> ConfigContext {
    ConfigContext::new(root, EnvironmentName::production(), version, &fast_config())
        .expect("context should build")
}

/// Every compose service the default stack starts.
#[allow(dead_code)]
pub const STACK_SERVICES: [&str; 7] = [
    "postgres",
    "redis",
    "api",
    "web",
    "prometheus",
    "grafana",
    "nginx",
];

#[allow(dead_code)]
/// A `CommandRunner` that answers from a script and records every call.
///
/// Unscripted commands succeed with empty output.
#[derive(Default)]
pub struct FakeRunner {
    script: Mutex<Vec<(String, CommandOutput)>>,
    calls: Mutex<Vec<CommandSpec>>,
}

#[allow(dead_code)]
impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands whose rendered line contains `needle` with `output`.
    pub fn respond(&self, needle: &str, output: CommandOutput) {
        self.script.lock().push((needle.to_string(), output));
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().clone()
    }

    pub fn call_lines(&self) -> Vec<String> {
        self.calls.lock().iter().map(|s| s.to_string()).collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        self.calls.lock().push(spec.clone());
        let line = spec.to_string();
        let output = self
            .script
            .lock()
            .iter()
            .find(|(needle, _)| line.contains(needle.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_else(|| CommandOutput::ok(""));
        Ok(output)
    }
}

#[allow(dead_code)]
/// In-memory container runtime.
///
/// Exec answers are keyed by the program name (first word of the command);
/// unscripted programs succeed with empty output.
pub struct FakeRuntime {
    containers: Mutex<Vec<ContainerSummary>>,
    exec_script: Mutex<HashMap<String, ExecResult>>,
    execs: Mutex<Vec<(String, Vec<String>)>>,
    reachable: bool,
}

#[allow(dead_code)]
impl FakeRuntime {
    pub fn new() -> Self {
        Self {
            containers: Mutex::new(Vec::new()),
            exec_script: Mutex::new(HashMap::new()),
            execs: Mutex::new(Vec::new()),
            reachable: true,
        }
    }

    /// A runtime where every stack service is running and answers its probes.
    pub fn healthy(project: &str) -> Self {
        let runtime = Self::new();
        for service in STACK_SERVICES {
            runtime.add_container(project, service, "running");
        }
        runtime.respond_exec(
            "redis-cli",
            ExecResult {
                exit_code: 0,
                stdout: b"PONG\n".to_vec(),
                stderr: Vec::new(),
            },
        );
        runtime
    }

    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            ..Self::new()
        }
    }

    pub fn add_container(&self, project: &str, service: &str, state: &str) {
        let mut labels = HashMap::new();
        labels.insert(COMPOSE_PROJECT_LABEL.to_string(), project.to_string());
        labels.insert(COMPOSE_SERVICE_LABEL.to_string(), service.to_string());
        let mut containers = self.containers.lock();
        let id = format!("{service}-{}", containers.len());
        containers.push(ContainerSummary {
            id,
            name: format!("{project}-{service}-1"),
            image: format!("{service}:test"),
            state: state.to_string(),
            status: if state == "running" {
                "Up 1 minute".to_string()
            } else {
                "Exited (1)".to_string()
            },
            labels,
        });
    }

    pub fn respond_exec(&self, program: &str, result: ExecResult) {
        self.exec_script.lock().insert(program.to_string(), result);
    }

    /// Commands executed inside containers, as `(container id, argv)`.
    pub fn execs(&self) -> Vec<(String, Vec<String>)> {
        self.execs.lock().clone()
    }
}

#[async_trait]
impl RuntimeInfo for FakeRuntime {
    async fn info(&self) -> Result<RuntimeMetadata, RuntimeInfoError> {
        self.ping().await?;
        Ok(RuntimeMetadata {
            name: "fake".to_string(),
            version: "0".to_string(),
            os: "linux".to_string(),
        })
    }

    async fn ping(&self) -> Result<(), RuntimeInfoError> {
        if self.reachable {
            Ok(())
        } else {
            Err(RuntimeInfoError::ConnectionFailed(
                "fake runtime is down".to_string(),
            ))
        }
    }
}

#[async_trait]
impl ContainerOps for FakeRuntime {
    async fn list_containers(
        &self,
        filters: &ContainerFilters,
    ) -> Result<Vec<ContainerSummary>, ContainerError> {
        Ok(self
            .containers
            .lock()
            .iter()
            .filter(|c| filters.matches(c))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ExecOps for FakeRuntime {
    async fn exec(&self, container: &str, config: &ExecConfig) -> Result<ExecResult, ExecError> {
        self.execs
            .lock()
            .push((container.to_string(), config.cmd.clone()));
        let program = config.cmd.first().cloned().unwrap_or_default();
        Ok(self
            .exec_script
            .lock()
            .get(&program)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl LogOps for FakeRuntime {
    async fn container_logs(&self, id: &str, _opts: &LogOptions) -> Result<LogLines, LogError> {
        Err(LogError::ContainerNotFound(id.to_string()))
    }
}

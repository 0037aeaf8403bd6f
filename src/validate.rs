// ABOUTME: Post-deploy validation of running services and HTTP health endpoints.
// ABOUTME: Every target is probed exactly once; failures are warnings, never errors.

use crate::config::{Config, HealthTargetConfig, MonitoringConfig};
use crate::modules::HEALTH_PROBE_PREFIX;
use crate::runtime::{ContainerFilters, ContainerOps, ContainerRuntime};
use http_body_util::Empty;
use hyper::Uri;
use hyper_util::rt::TokioIo;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;
use tokio::net::TcpStream;

/// Something that should be healthy after a deploy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum HealthTarget {
    /// A compose service that must have a running container.
    Process { name: String },
    /// An endpoint that must answer one GET with 2xx or 3xx.
    Http { name: String, url: String },
}

impl HealthTarget {
    pub fn name(&self) -> &str {
        match self {
            HealthTarget::Process { name } | HealthTarget::Http { name, .. } => name,
        }
    }

    /// Targets for a configuration: the declared list, or one process target per
    /// service plus the gateway's HTTP health endpoints.
    pub fn from_config(config: &Config) -> Vec<HealthTarget> {
        if let Some(declared) = &config.validation.targets {
            return declared
                .iter()
                .map(|t| match t {
                    HealthTargetConfig::Http { name, url } => HealthTarget::Http {
                        name: name.clone(),
                        url: url.clone(),
                    },
                    HealthTargetConfig::Process { process } => HealthTarget::Process {
                        name: process.clone(),
                    },
                })
                .collect();
        }

        let mut processes = vec![config.database.service.clone(), config.cache.service.clone()];
        processes.extend(config.services.apps.iter().map(|a| a.name.clone()));
        if config.monitoring.enabled {
            processes.push(MonitoringConfig::PROMETHEUS_SERVICE.to_string());
            processes.push(MonitoringConfig::GRAFANA_SERVICE.to_string());
        }
        processes.push(config.gateway.service.clone());

        let mut targets: Vec<_> = processes
            .into_iter()
            .map(|name| HealthTarget::Process { name })
            .collect();

        let base = format!("http://localhost:{}", config.gateway.http_port);
        targets.push(HealthTarget::Http {
            name: format!("{} /health", config.gateway.service),
            url: format!("{base}/health"),
        });
        for app in config.services.apps.iter() {
            if app.port.is_some() && app.health_path.is_some() {
                targets.push(HealthTarget::Http {
                    name: format!("{} health", app.name),
                    url: format!("{base}{HEALTH_PROBE_PREFIX}{}", app.name),
                });
            }
        }
        targets
    }
}

impl fmt::Display for HealthTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthTarget::Process { name } => write!(f, "process {name}"),
            HealthTarget::Http { name, url } => write!(f, "{name} ({url})"),
        }
    }
}

/// Outcome for one target.
#[derive(Debug, Clone, Serialize)]
pub struct TargetResult {
    pub target: HealthTarget,
    pub passed: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub results: Vec<TargetResult>,
    pub passed: usize,
    pub warned: usize,
}

impl ValidationReport {
    fn push(&mut self, target: HealthTarget, outcome: Result<String, String>) {
        let (passed, detail) = match outcome {
            Ok(detail) => (true, detail),
            Err(detail) => (false, detail),
        };
        if passed {
            self.passed += 1;
            tracing::info!("validate: {} ok ({})", target, detail);
        } else {
            self.warned += 1;
            tracing::warn!("validate: {} failed: {}", target, detail);
        }
        self.results.push(TargetResult {
            target,
            passed,
            detail,
        });
    }

    pub fn is_clean(&self) -> bool {
        self.warned == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &TargetResult> {
        self.results.iter().filter(|r| !r.passed)
    }
}

/// Probes health targets of one compose project.
pub struct Validator<'a> {
    runtime: &'a dyn ContainerRuntime,
    project: String,
    http_timeout: Duration,
}

impl<'a> Validator<'a> {
    pub fn new(runtime: &'a dyn ContainerRuntime, project: &str, http_timeout: Duration) -> Self {
        Self {
            runtime,
            project: project.to_string(),
            http_timeout,
        }
    }

    /// Probe every target once and aggregate the results. Never aborts early.
    pub async fn run(&self, targets: &[HealthTarget]) -> ValidationReport {
        let mut report = ValidationReport::default();
        let mut running: Option<Result<HashSet<String>, String>> = None;

        for target in targets {
            let outcome = match target {
                HealthTarget::Process { name } => {
                    if running.is_none() {
                        running = Some(self.running_services().await);
                    }
                    match &running {
                        Some(Ok(set)) if set.contains(name) => Ok("running".to_string()),
                        Some(Ok(_)) => Err("no running container".to_string()),
                        Some(Err(e)) => Err(e.clone()),
                        None => Err("container list unavailable".to_string()),
                    }
                }
                HealthTarget::Http { url, .. } => self.probe_http(url).await,
            };
            report.push(target.clone(), outcome);
        }
        report
    }

    async fn running_services(&self) -> Result<HashSet<String>, String> {
        let filters = ContainerFilters::for_project(&self.project, false);
        let containers = self
            .runtime
            .list_containers(&filters)
            .await
            .map_err(|e| format!("failed to list containers: {e}"))?;
        Ok(containers
            .iter()
            .filter(|c| c.is_running())
            .filter_map(|c| c.service().map(str::to_string))
            .collect())
    }

    async fn probe_http(&self, url: &str) -> Result<String, String> {
        match tokio::time::timeout(self.http_timeout, http_get(url)).await {
            Ok(Ok(status)) if status < 400 => Ok(format!("HTTP {status}")),
            Ok(Ok(status)) => Err(format!("HTTP {status}")),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(format!("no answer within {}s", self.http_timeout.as_secs())),
        }
    }
}

/// One plain HTTP/1.1 GET; returns the status code.
async fn http_get(url: &str) -> Result<u16, String> {
    let uri: Uri = url.parse().map_err(|e| format!("invalid URL: {e}"))?;
    if uri.scheme_str() != Some("http") {
        return Err(format!("unsupported scheme in {url}, only http:// is probed"));
    }
    let host = uri
        .host()
        .ok_or_else(|| format!("no host in {url}"))?
        .to_string();
    let port = uri.port_u16().unwrap_or(80);
    let path = uri
        .path_and_query()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    let stream = TcpStream::connect((host.as_str(), port))
        .await
        .map_err(|e| format!("connect failed: {e}"))?;
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .map_err(|e| format!("HTTP handshake failed: {e}"))?;
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            tracing::debug!("health probe connection error: {}", e);
        }
    });

    let req = hyper::Request::builder()
        .method("GET")
        .uri(path)
        .header("Host", format!("{host}:{port}"))
        .header("User-Agent", concat!("deployctl/", env!("CARGO_PKG_VERSION")))
        .body(Empty::<bytes::Bytes>::new())
        .map_err(|e| format!("failed to build request: {e}"))?;
    let resp = sender
        .send_request(req)
        .await
        .map_err(|e| format!("request failed: {e}"))?;
    Ok(resp.status().as_u16())
}

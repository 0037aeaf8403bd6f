// ABOUTME: The monitoring module provisions Prometheus and Grafana when enabled.
// ABOUTME: When disabled it only records its marker.

use super::{ModuleEnv, ModuleError, ModuleKind};
use crate::config::{Config, MonitoringConfig};

const MODULE: ModuleKind = ModuleKind::Monitoring;

pub(super) async fn run(env: &ModuleEnv<'_>) -> Result<(), ModuleError> {
    let ctx = env.ctx;
    let config = &ctx.config;
    if !config.monitoring.enabled {
        tracing::info!("monitoring: disabled, nothing to do");
        return Ok(());
    }

    let prometheus_dir = ctx
        .layout
        .service_config_dir(MonitoringConfig::PROMETHEUS_SERVICE);
    env.write_config(
        MODULE,
        &prometheus_dir.join("prometheus.yml"),
        &render_prometheus_yml(config),
    )?;

    let datasource = ctx
        .layout
        .service_config_dir(MonitoringConfig::GRAFANA_SERVICE)
        .join("provisioning/datasources/prometheus.yml");
    env.write_config(MODULE, &datasource, GRAFANA_DATASOURCE)?;

    env.compose_up(
        MODULE,
        &[
            MonitoringConfig::PROMETHEUS_SERVICE,
            MonitoringConfig::GRAFANA_SERVICE,
        ],
    )
    .await?;

    tracing::info!("monitoring: prometheus and grafana started");
    Ok(())
}

const GRAFANA_DATASOURCE: &str = r#"# Generated by deployctl; do not edit.
apiVersion: 1
datasources:
  - name: Prometheus
    type: prometheus
    access: proxy
    url: http://prometheus:9090
    isDefault: true
"#;

fn render_prometheus_yml(config: &Config) -> String {
    let mut out = format!(
        "# Generated by deployctl; do not edit.\nglobal:\n  scrape_interval: {}s\n  evaluation_interval: {}s\n\nscrape_configs:\n  - job_name: prometheus\n    static_configs:\n      - targets: ['localhost:9090']\n",
        config.monitoring.scrape_interval.as_secs().max(1),
        config.monitoring.scrape_interval.as_secs().max(1),
    );
    for app in config.services.apps.iter() {
        if let Some(port) = app.port {
            out.push_str(&format!(
                "  - job_name: {name}\n    metrics_path: /metrics\n    static_configs:\n      - targets: ['{name}:{port}']\n",
                name = app.name,
            ));
        }
    }
    out
}

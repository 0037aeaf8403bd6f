// ABOUTME: The init module creates the project directory tree and compose file.
// ABOUTME: Everything later modules write into exists once this succeeds.

use super::{IoSnafu, ModuleEnv, ModuleError, ModuleKind, render_compose_file};
use crate::config::MonitoringConfig;
use crate::files::{self, MODE_PRIVATE_DIR};
use snafu::ResultExt;
use std::fs;

const MODULE: ModuleKind = ModuleKind::Init;

pub(super) async fn run(env: &ModuleEnv<'_>) -> Result<(), ModuleError> {
    let ctx = env.ctx;
    let layout = &ctx.layout;
    let config = &ctx.config;

    let mut dirs = vec![
        layout.markers_dir(),
        layout.backups_dir(),
        layout.tls_dir(),
        layout.logs_dir(),
        layout.service_config_dir(&config.database.service).join("init"),
        layout.service_config_dir(&config.cache.service),
        layout.service_config_dir(&config.gateway.service),
        layout.data_dir(&config.database.service),
        layout.data_dir(&config.cache.service),
    ];
    if config.monitoring.enabled {
        dirs.push(layout.service_config_dir(MonitoringConfig::PROMETHEUS_SERVICE));
        dirs.push(
            layout
                .service_config_dir(MonitoringConfig::GRAFANA_SERVICE)
                .join("provisioning/datasources"),
        );
        dirs.push(layout.data_dir(MonitoringConfig::PROMETHEUS_SERVICE));
        dirs.push(layout.data_dir(MonitoringConfig::GRAFANA_SERVICE));
    }

    for dir in &dirs {
        fs::create_dir_all(dir).context(IoSnafu {
            module: MODULE,
            path: dir,
        })?;
    }

    let secrets_dir = layout.secrets_dir();
    files::create_dir_with_mode(&secrets_dir, MODE_PRIVATE_DIR).context(IoSnafu {
        module: MODULE,
        path: &secrets_dir,
    })?;

    let compose = render_compose_file(ctx).map_err(|e| ModuleError::Failed {
        module: MODULE,
        message: format!("failed to render compose file: {e}"),
    })?;
    env.write_config(MODULE, &layout.compose_file(), &compose)?;

    tracing::info!("init: project tree ready at {}", layout.root().display());
    Ok(())
}

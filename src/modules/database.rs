// ABOUTME: The database module renders PostgreSQL configuration and starts the database.
// ABOUTME: Succeeds once pg_isready answers inside the container.

use super::{ModuleEnv, ModuleError, ModuleKind, SecretSnafu, wait_until};
use crate::config::DatabaseConfig;
use crate::runtime::ExecConfig;
use snafu::ResultExt;
use std::time::Duration;

const MODULE: ModuleKind = ModuleKind::Database;

pub(super) async fn run(env: &ModuleEnv<'_>) -> Result<(), ModuleError> {
    let ctx = env.ctx;
    let db = &ctx.config.database;

    env.secret_store()
        .validate(&["postgres_password"])
        .context(SecretSnafu { module: MODULE })?;

    let dir = ctx.layout.service_config_dir(&db.service);
    env.write_config(MODULE, &dir.join("postgresql.conf"), &render_postgresql_conf(db))?;
    env.write_config(MODULE, &dir.join("init/01-init.sql"), &render_init_sql(db))?;

    env.compose_up(MODULE, &[db.service.as_str()]).await?;

    let probe = ExecConfig::new(["pg_isready", "-U", db.user.as_str(), "-d", db.name.as_str()])
        .timeout(Duration::from_secs(10));
    wait_until(MODULE, &db.service, db.ready_timeout, db.poll_interval, || async {
        let result = env.exec_in_service(MODULE, &db.service, &probe).await?;
        Ok(result.success())
    })
    .await?;

    tracing::info!("database: {} accepting connections", db.service);
    Ok(())
}

fn render_postgresql_conf(db: &DatabaseConfig) -> String {
    format!(
        r#"# Generated by deployctl; do not edit.
listen_addresses = '*'
port = 5432
max_connections = {max_connections}
shared_buffers = {shared_buffers}
password_encryption = scram-sha-256

wal_level = replica
max_wal_size = 1GB
checkpoint_completion_target = 0.9

log_destination = 'stderr'
log_min_duration_statement = 1000
log_line_prefix = '%m [%p] %u@%d '
log_timezone = 'UTC'
timezone = 'UTC'
"#,
        max_connections = db.max_connections,
        shared_buffers = db.shared_buffers,
    )
}

fn render_init_sql(db: &DatabaseConfig) -> String {
    format!(
        r#"-- Generated by deployctl; runs once on an empty data directory.
CREATE EXTENSION IF NOT EXISTS pgcrypto;
CREATE EXTENSION IF NOT EXISTS "uuid-ossp";
ALTER DATABASE "{name}" SET timezone TO 'UTC';
GRANT ALL PRIVILEGES ON DATABASE "{name}" TO "{user}";
"#,
        name = db.name,
        user = db.user,
    )
}

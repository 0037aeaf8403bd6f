// ABOUTME: The cache module renders Redis configuration and starts the cache.
// ABOUTME: Succeeds once an authenticated PING returns PONG.

use super::{ModuleEnv, ModuleError, ModuleKind, SecretSnafu, wait_until};
use crate::config::CacheConfig;
use crate::runtime::ExecConfig;
use snafu::ResultExt;
use std::time::Duration;

const MODULE: ModuleKind = ModuleKind::Cache;

pub(super) async fn run(env: &ModuleEnv<'_>) -> Result<(), ModuleError> {
    let ctx = env.ctx;
    let cache = &ctx.config.cache;

    let secrets = env
        .secret_store()
        .require(&["redis_password"])
        .context(SecretSnafu { module: MODULE })?;
    let password = secrets
        .get("redis_password")
        .map(|s| s.value.expose().to_string())
        .unwrap_or_default();

    let path = ctx
        .layout
        .service_config_dir(&cache.service)
        .join("redis.conf");
    env.write_config(MODULE, &path, &render_redis_conf(cache))?;

    env.compose_up(MODULE, &[cache.service.as_str()]).await?;

    // REDISCLI_AUTH keeps the password out of the exec argv.
    let probe = ExecConfig::new(["redis-cli", "ping"])
        .env("REDISCLI_AUTH", &password)
        .timeout(Duration::from_secs(10));
    wait_until(
        MODULE,
        &cache.service,
        cache.ready_timeout,
        cache.poll_interval,
        || async {
            let result = env.exec_in_service(MODULE, &cache.service, &probe).await?;
            Ok(result.success() && String::from_utf8_lossy(&result.stdout).trim() == "PONG")
        },
    )
    .await?;

    tracing::info!("cache: {} answering", cache.service);
    Ok(())
}

/// The password is passed on the server command line from `.env`, not written here.
fn render_redis_conf(cache: &CacheConfig) -> String {
    format!(
        r#"# Generated by deployctl; do not edit.
bind 0.0.0.0
protected-mode yes
port 6379
maxmemory {maxmemory}
maxmemory-policy {policy}
appendonly yes
appendfsync everysec
dir /data
"#,
        maxmemory = cache.maxmemory,
        policy = cache.maxmemory_policy,
    )
}

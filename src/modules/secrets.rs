// ABOUTME: The secrets module generates or loads secrets, issues TLS material and renders .env.
// ABOUTME: Later modules only ever read what this module persisted.

use super::{ConfigSnafu, ModuleEnv, ModuleError, ModuleKind, SecretSnafu};
use crate::config::resolve_env_map;
use crate::context::ConfigContext;
use crate::files::MODE_PRIVATE;
use crate::secrets::Secret;
use snafu::ResultExt;
use std::collections::BTreeMap;

const MODULE: ModuleKind = ModuleKind::Secrets;

pub(super) async fn run(env: &ModuleEnv<'_>) -> Result<(), ModuleError> {
    let ctx = env.ctx;
    let config = &ctx.config;
    let store = env.secret_store();

    let decls: Vec<_> = config.secrets.iter().cloned().collect();
    let secrets = store
        .generate_or_load(&decls, ctx.force.recreate_secrets)
        .context(SecretSnafu { module: MODULE })?;
    store
        .validate(&config.secret_names())
        .context(SecretSnafu { module: MODULE })?;

    let ca = store
        .issue_ca(&format!("{} Local CA", config.project))
        .context(SecretSnafu { module: MODULE })?;
    let leaf = store
        .issue_leaf(&ca, &config.domain, &config.sans, ctx.force.recreate_secrets)
        .context(SecretSnafu { module: MODULE })?;
    tracing::info!(
        "secrets: {} secret(s) ready, leaf for {} valid {} more days{}",
        secrets.len(),
        leaf.subject,
        leaf.days_remaining(),
        if leaf.reused { " (reused)" } else { "" }
    );

    let extra = resolve_env_map(&config.env)
        .map_err(Box::new)
        .context(ConfigSnafu { module: MODULE })?;
    let dotenv = render_env_file(ctx, &secrets, &extra);
    env.write_file(MODULE, &ctx.layout.env_file(), &dotenv, MODE_PRIVATE)
}

/// Render `.env`: run parameters, derived connection URLs, extra values, then secrets.
pub(super) fn render_env_file(
    ctx: &ConfigContext,
    secrets: &BTreeMap<String, Secret>,
    extra: &BTreeMap<String, String>,
) -> String {
    let config = &ctx.config;
    let mut out = String::from("# Generated by deployctl; do not edit.\n");
    let mut line = |key: &str, value: &str| {
        out.push_str(key);
        out.push('=');
        out.push_str(&quote_env_value(value));
        out.push('\n');
    };

    line("ENVIRONMENT", ctx.environment.as_str());
    line("APP_VERSION", ctx.version.as_str());
    line("COMPOSE_PROJECT_NAME", &config.project);
    line("DOMAIN", &config.domain);
    line("POSTGRES_DB", &config.database.name);
    line("POSTGRES_USER", &config.database.user);

    if let Some(pw) = secrets.get("postgres_password") {
        line(
            "DATABASE_URL",
            &format!(
                "postgresql://{}:{}@{}:5432/{}",
                config.database.user,
                pw.value.expose(),
                config.database.service,
                config.database.name
            ),
        );
    }
    if let Some(pw) = secrets.get("redis_password") {
        line(
            "REDIS_URL",
            &format!("redis://:{}@{}:6379/0", pw.value.expose(), config.cache.service),
        );
    }

    for (key, value) in extra {
        line(key, value);
    }

    for decl in config.secrets.iter() {
        if let Some(secret) = secrets.get(&decl.name) {
            line(&decl.env_key(), secret.value.expose());
        }
    }

    out
}

fn quote_env_value(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '#' | '$' | '\\'));
    if needs_quotes {
        format!("'{}'", value.replace('\'', "'\\''"))
    } else {
        value.to_string()
    }
}

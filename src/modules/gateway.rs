// ABOUTME: The gateway module renders the nginx configuration and starts the TLS gateway.
// ABOUTME: Succeeds once `nginx -t` accepts the configuration inside the container.

use super::{ModuleEnv, ModuleError, ModuleKind};
use crate::config::Config;
use crate::runtime::ExecConfig;
use crate::secrets::tls::{FULLCHAIN, SERVER_CERT, SERVER_KEY};
use std::time::Duration;

const MODULE: ModuleKind = ModuleKind::Gateway;

/// Plain-HTTP location under which each service's health endpoint is proxied.
pub const HEALTH_PROBE_PREFIX: &str = "/_health/";

pub(super) async fn run(env: &ModuleEnv<'_>) -> Result<(), ModuleError> {
    let ctx = env.ctx;
    let gw = &ctx.config.gateway;

    let tls_dir = ctx.layout.tls_dir();
    let missing: Vec<_> = [SERVER_KEY, SERVER_CERT, FULLCHAIN]
        .into_iter()
        .filter(|name| !tls_dir.join(name).exists())
        .collect();
    if !missing.is_empty() {
        return Err(ModuleError::Failed {
            module: MODULE,
            message: format!(
                "TLS material missing in {}: {}",
                tls_dir.display(),
                missing.join(", ")
            ),
        });
    }

    let path = ctx
        .layout
        .service_config_dir(&gw.service)
        .join("nginx.conf");
    env.write_config(MODULE, &path, &render_nginx_conf(&ctx.config))?;

    env.compose_up(MODULE, &[gw.service.as_str()]).await?;

    let check = ExecConfig::new(["nginx", "-t"]).timeout(Duration::from_secs(30));
    let result = env.exec_in_service(MODULE, &gw.service, &check).await?;
    if !result.success() {
        return Err(ModuleError::Failed {
            module: MODULE,
            message: format!("nginx -t rejected the configuration: {}", result.stderr_lossy()),
        });
    }

    tracing::info!("gateway: {} serving {}", gw.service, ctx.config.domain);
    Ok(())
}

fn render_nginx_conf(config: &Config) -> String {
    let mut upstreams = String::new();
    let mut seen = Vec::new();
    for route in &config.gateway.routes {
        if seen.contains(&route.service) {
            continue;
        }
        if let Some(port) = config.services.get(&route.service).and_then(|a| a.port) {
            upstreams.push_str(&format!(
                "    upstream {name} {{\n        server {name}:{port};\n        keepalive 16;\n    }}\n\n",
                name = route.service,
            ));
            seen.push(route.service.clone());
        }
    }

    // Per-service health probes, served on plain HTTP.
    let mut probes = String::new();
    for app in config.services.apps.iter() {
        if let (Some(port), Some(path)) = (app.port, app.health_path.as_deref()) {
            probes.push_str(&format!(
                "        location = {prefix}{name} {{\n            access_log off;\n            proxy_pass http://{name}:{port}{path};\n        }}\n\n",
                prefix = HEALTH_PROBE_PREFIX,
                name = app.name,
            ));
        }
    }

    let mut locations = String::new();
    for route in &config.gateway.routes {
        locations.push_str(&format!(
            r#"        location {path} {{
            proxy_pass http://{service};
            proxy_http_version 1.1;
            proxy_set_header Connection "";
            proxy_set_header Host $host;
            proxy_set_header X-Real-IP $remote_addr;
            proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;
            proxy_set_header X-Forwarded-Proto $scheme;
        }}

"#,
            path = route.path,
            service = route.service,
        ));
    }

    format!(
        r#"# Generated by deployctl; do not edit.
worker_processes auto;

events {{
    worker_connections 1024;
}}

http {{
    include /etc/nginx/mime.types;
    default_type application/octet-stream;
    sendfile on;
    server_tokens off;
    client_max_body_size 50m;

{upstreams}    server {{
        listen 80;
        server_name {domain};

        location = /health {{
            access_log off;
            add_header Content-Type text/plain;
            return 200 "ok\n";
        }}

{probes}        location / {{
            return 301 https://$host$request_uri;
        }}
    }}

    server {{
        listen 443 ssl;
        http2 on;
        server_name {domain};

        ssl_certificate /etc/nginx/tls/{fullchain};
        ssl_certificate_key /etc/nginx/tls/{key};
        ssl_protocols TLSv1.2 TLSv1.3;
        ssl_session_cache shared:SSL:10m;

        add_header Strict-Transport-Security "max-age=31536000" always;

        location = /health {{
            access_log off;
            add_header Content-Type text/plain;
            return 200 "ok\n";
        }}

{locations}    }}
}}
"#,
        domain = config.domain,
        fullchain = FULLCHAIN,
        key = SERVER_KEY,
    )
}

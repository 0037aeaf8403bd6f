// ABOUTME: Renders docker-compose.yml from the project configuration.
// ABOUTME: Output is deterministic so unchanged configuration never rewrites the file.

use crate::config::MonitoringConfig;
use crate::context::ConfigContext;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Serialize)]
struct ComposeFile {
    name: String,
    services: BTreeMap<String, ServiceDef>,
}

#[derive(Debug, Default, Serialize)]
struct ServiceDef {
    image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    command: Option<Vec<String>>,
    restart: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    env_file: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    environment: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    ports: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    volumes: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    depends_on: Vec<String>,
}

impl ServiceDef {
    fn new(image: &str) -> Self {
        Self {
            image: image.to_string(),
            restart: "unless-stopped",
            ..Default::default()
        }
    }
}

/// Render the compose file for the run described by `ctx`.
pub fn render_compose_file(ctx: &ConfigContext) -> Result<String, serde_yaml::Error> {
    let config = &ctx.config;
    let env_file = vec![".env".to_string()];
    let has_secret = |name: &str| config.secrets.iter().any(|s| s.name == name);
    let mut services = BTreeMap::new();

    let db = &config.database;
    let mut postgres = ServiceDef::new(&db.image);
    postgres.command = Some(vec![
        "postgres".into(),
        "-c".into(),
        "config_file=/etc/postgresql/postgresql.conf".into(),
    ]);
    postgres.env_file = env_file.clone();
    postgres
        .environment
        .insert("POSTGRES_DB".into(), db.name.clone());
    postgres
        .environment
        .insert("POSTGRES_USER".into(), db.user.clone());
    postgres.volumes = vec![
        format!("./data/{}:/var/lib/postgresql/data", db.service),
        format!(
            "./config/{}/postgresql.conf:/etc/postgresql/postgresql.conf:ro",
            db.service
        ),
        format!("./config/{}/init:/docker-entrypoint-initdb.d:ro", db.service),
    ];
    services.insert(db.service.clone(), postgres);

    let cache = &config.cache;
    let mut redis = ServiceDef::new(&cache.image);
    let mut redis_command = vec![
        "redis-server".to_string(),
        "/usr/local/etc/redis/redis.conf".to_string(),
    ];
    if has_secret("redis_password") {
        // Interpolated by compose from .env so the password never lands in redis.conf.
        redis_command.push("--requirepass".into());
        redis_command.push("${REDIS_PASSWORD}".into());
    }
    redis.command = Some(redis_command);
    redis.volumes = vec![
        format!(
            "./config/{}/redis.conf:/usr/local/etc/redis/redis.conf:ro",
            cache.service
        ),
        format!("./data/{}:/data", cache.service),
    ];
    services.insert(cache.service.clone(), redis);

    for app in config.services.apps.iter() {
        let mut def = ServiceDef::new(&app.image_for(&ctx.version));
        def.command = app.command.clone();
        def.env_file = env_file.clone();
        def.environment
            .insert("DATABASE_HOST".into(), db.service.clone());
        def.environment
            .insert("REDIS_HOST".into(), cache.service.clone());
        if let Some(port) = app.port {
            def.environment.insert("PORT".into(), port.to_string());
        }
        def.depends_on = vec![db.service.clone(), cache.service.clone()];
        services.insert(app.name.clone(), def);
    }

    if config.monitoring.enabled {
        let mon = &config.monitoring;
        let mut prometheus = ServiceDef::new(&mon.prometheus_image);
        prometheus.ports = vec![format!("127.0.0.1:{}:9090", mon.prometheus_port)];
        prometheus.volumes = vec![
            "./config/prometheus/prometheus.yml:/etc/prometheus/prometheus.yml:ro".into(),
            "./data/prometheus:/prometheus".into(),
        ];
        services.insert(MonitoringConfig::PROMETHEUS_SERVICE.into(), prometheus);

        let mut grafana = ServiceDef::new(&mon.grafana_image);
        grafana.ports = vec![format!("127.0.0.1:{}:3000", mon.grafana_port)];
        if has_secret("grafana_admin_password") {
            grafana.environment.insert(
                "GF_SECURITY_ADMIN_PASSWORD".into(),
                "${GRAFANA_ADMIN_PASSWORD}".into(),
            );
        }
        grafana.volumes = vec![
            "./config/grafana/provisioning:/etc/grafana/provisioning:ro".into(),
            "./data/grafana:/var/lib/grafana".into(),
        ];
        grafana.depends_on = vec![MonitoringConfig::PROMETHEUS_SERVICE.into()];
        services.insert(MonitoringConfig::GRAFANA_SERVICE.into(), grafana);
    }

    let gw = &config.gateway;
    let mut nginx = ServiceDef::new(&gw.image);
    nginx.ports = vec![
        format!("{}:80", gw.http_port),
        format!("{}:443", gw.https_port),
    ];
    nginx.volumes = vec![
        format!("./config/{}/nginx.conf:/etc/nginx/nginx.conf:ro", gw.service),
        "./tls:/etc/nginx/tls:ro".into(),
        "./logs:/var/log/nginx".into(),
    ];
    nginx.depends_on = config
        .services
        .apps
        .iter()
        .map(|app| app.name.clone())
        .collect();
    services.insert(gw.service.clone(), nginx);

    let file = ComposeFile {
        name: config.project.clone(),
        services,
    };
    let body = serde_yaml::to_string(&file)?;
    Ok(format!(
        "# Generated by deployctl for {} ({}); do not edit.\n{}",
        ctx.environment, ctx.version, body
    ))
}

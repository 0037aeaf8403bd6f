// ABOUTME: Configuration sections for the services in the compose stack.
// ABOUTME: Database, cache, application services, monitoring and gateway.

use super::deserialize::deserialize_apps;
use nonempty::NonEmpty;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Compose service name.
    pub service: String,
    pub image: String,
    /// Database created on first start.
    pub name: String,
    pub user: String,
    pub max_connections: u32,
    pub shared_buffers: String,
    #[serde(with = "humantime_serde")]
    pub ready_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            service: "postgres".to_string(),
            image: "postgres:16-alpine".to_string(),
            name: "app".to_string(),
            user: "app".to_string(),
            max_connections: 100,
            shared_buffers: "256MB".to_string(),
            ready_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub service: String,
    pub image: String,
    pub maxmemory: String,
    pub maxmemory_policy: String,
    #[serde(with = "humantime_serde")]
    pub ready_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            service: "redis".to_string(),
            image: "redis:7-alpine".to_string(),
            maxmemory: "256mb".to_string(),
            maxmemory_policy: "allkeys-lru".to_string(),
            ready_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// An application container started by the `services` module.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppService {
    pub name: String,

    /// Image reference; `{version}` is replaced with the deployed version.
    pub image: String,

    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub health_path: Option<String>,

    #[serde(default)]
    pub command: Option<Vec<String>>,
}

impl AppService {
    pub fn image_for(&self, version: &str) -> String {
        self.image.replace("{version}", version)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServicesConfig {
    #[serde(deserialize_with = "deserialize_apps")]
    pub apps: NonEmpty<AppService>,

    #[serde(with = "humantime_serde")]
    pub start_timeout: Duration,

    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl ServicesConfig {
    pub fn get(&self, name: &str) -> Option<&AppService> {
        self.apps.iter().find(|app| app.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.apps.iter().map(|app| app.name.as_str()).collect()
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        let api = AppService {
            name: "api".to_string(),
            image: "app/api:{version}".to_string(),
            port: Some(8000),
            health_path: Some("/health".to_string()),
            command: None,
        };
        let web = AppService {
            name: "web".to_string(),
            image: "app/web:{version}".to_string(),
            port: Some(3000),
            health_path: None,
            command: None,
        };
        let mut apps = NonEmpty::new(api);
        apps.push(web);

        Self {
            apps,
            start_timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitoringConfig {
    pub enabled: bool,
    pub prometheus_image: String,
    pub grafana_image: String,
    #[serde(with = "humantime_serde")]
    pub scrape_interval: Duration,
    pub prometheus_port: u16,
    pub grafana_port: u16,
}

impl MonitoringConfig {
    pub const PROMETHEUS_SERVICE: &'static str = "prometheus";
    pub const GRAFANA_SERVICE: &'static str = "grafana";
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prometheus_image: "prom/prometheus:v2.53.0".to_string(),
            grafana_image: "grafana/grafana:11.1.0".to_string(),
            scrape_interval: Duration::from_secs(15),
            prometheus_port: 9090,
            grafana_port: 3001,
        }
    }
}

/// A path prefix proxied by the gateway to an application service.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Route {
    pub path: String,
    pub service: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    pub service: String,
    pub image: String,
    pub http_port: u16,
    pub https_port: u16,
    pub routes: Vec<Route>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            service: "nginx".to_string(),
            image: "nginx:1.27-alpine".to_string(),
            http_port: 80,
            https_port: 443,
            routes: vec![
                Route {
                    path: "/api/".to_string(),
                    service: "api".to_string(),
                },
                Route {
                    path: "/".to_string(),
                    service: "web".to_string(),
                },
            ],
        }
    }
}

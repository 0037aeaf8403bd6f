// ABOUTME: Configuration types and parsing for deployctl.yml.
// ABOUTME: Handles YAML parsing, built-in defaults, and per-environment overrides.

mod checks;
mod deserialize;
mod env_value;
mod stack;

pub use checks::{ComposeConfig, HealthTargetConfig, PreflightConfig, ValidationConfig};
pub use env_value::{EnvValue, resolve_env_map};
pub use stack::{
    AppService, CacheConfig, DatabaseConfig, GatewayConfig, MonitoringConfig, Route,
    ServicesConfig,
};

use crate::error::{Error, Result};
use crate::runtime::RuntimeConfig;
use crate::secrets::SecretDecl;
use crate::types::EnvironmentName;
use deserialize::deserialize_secrets;
use nonempty::NonEmpty;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

pub const CONFIG_FILENAME: &str = "deployctl.yml";
pub const CONFIG_FILENAME_ALT: &str = "deployctl.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".deployctl/config.yml";

/// Project configuration. Every section has a default, so an empty file (or no
/// file at all) describes a complete stack.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Compose project name; also the container name prefix.
    pub project: String,

    pub domain: String,

    pub sans: Vec<String>,

    pub runtime: Option<RuntimeConfig>,

    pub compose: ComposeConfig,

    pub modules: Vec<String>,

    pub database: DatabaseConfig,

    pub cache: CacheConfig,

    pub services: ServicesConfig,

    pub monitoring: MonitoringConfig,

    pub gateway: GatewayConfig,

    #[serde(deserialize_with = "deserialize_secrets")]
    pub secrets: NonEmpty<SecretDecl>,

    pub env: HashMap<String, EnvValue>,

    pub preflight: PreflightConfig,

    pub validation: ValidationConfig,

    pub environments: HashMap<String, EnvironmentOverride>,
}

/// Values an environment may override. Maps are deep-merged, everything else replaces.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentOverride {
    #[serde(default)]
    pub domain: Option<String>,

    #[serde(default)]
    pub sans: Option<Vec<String>>,

    #[serde(default)]
    pub modules: Option<Vec<String>>,

    #[serde(default)]
    pub env: HashMap<String, EnvValue>,

    #[serde(default)]
    pub monitoring: Option<bool>,

    #[serde(default)]
    pub validation: Option<ValidationConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            project: "app".to_string(),
            domain: "localhost".to_string(),
            sans: vec!["127.0.0.1".to_string()],
            runtime: None,
            compose: ComposeConfig::default(),
            modules: crate::modules::ModuleKind::ALL
                .iter()
                .map(|m| m.name().to_string())
                .collect(),
            database: DatabaseConfig::default(),
            cache: CacheConfig::default(),
            services: ServicesConfig::default(),
            monitoring: MonitoringConfig::default(),
            gateway: GatewayConfig::default(),
            secrets: SecretDecl::defaults(),
            env: HashMap::new(),
            preflight: PreflightConfig::default(),
            validation: ValidationConfig::default(),
            environments: HashMap::new(),
        }
    }
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        // An empty document deserializes as unit, not as an empty map.
        if yaml.trim().is_empty() {
            return Ok(Config::default());
        }
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Find the configuration file in a project root, if any.
    pub fn locate(dir: &Path) -> Option<PathBuf> {
        [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ]
        .into_iter()
        .find(|path| path.exists())
    }

    /// Load the project configuration, falling back to defaults when no file exists.
    pub fn discover(dir: &Path) -> Result<Self> {
        match Self::locate(dir) {
            Some(path) => {
                tracing::debug!("loading configuration from {}", path.display());
                Self::load(&path)
            }
            None => {
                tracing::debug!("no configuration file in {}, using defaults", dir.display());
                Ok(Config::default())
            }
        }
    }

    /// Apply the overrides declared for an environment. Environments without an
    /// override section use the base configuration unchanged.
    pub fn for_environment(&self, environment: &EnvironmentName) -> Result<Config> {
        let Some(over) = self.environments.get(environment.as_str()) else {
            return Ok(self.clone());
        };

        let mut merged = self.clone();

        if let Some(ref domain) = over.domain {
            merged.domain = domain.clone();
        }

        if let Some(ref sans) = over.sans {
            merged.sans = sans.clone();
        }

        if let Some(ref modules) = over.modules {
            merged.modules = modules.clone();
        }

        // Deep merge env
        for (k, v) in &over.env {
            merged.env.insert(k.clone(), v.clone());
        }

        if let Some(enabled) = over.monitoring {
            merged.monitoring.enabled = enabled;
        }

        if let Some(ref validation) = over.validation {
            merged.validation = validation.clone();
        }

        merged.validate()?;
        Ok(merged)
    }

    /// Names the leaf certificate must cover: the domain first, then extra SANs.
    pub fn certificate_names(&self) -> Vec<String> {
        let mut names = vec![self.domain.clone()];
        for san in &self.sans {
            if !names.contains(san) {
                names.push(san.clone());
            }
        }
        names
    }

    /// Secret names declared by the project, in declaration order.
    pub fn secret_names(&self) -> Vec<&str> {
        self.secrets.iter().map(|s| s.name.as_str()).collect()
    }

    /// Check cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if !is_valid_project_name(&self.project) {
            return Err(Error::InvalidConfig(format!(
                "project name '{}' must be lowercase alphanumerics, '-' or '_'",
                self.project
            )));
        }

        if self.domain.trim().is_empty() {
            return Err(Error::InvalidConfig("domain must not be empty".to_string()));
        }

        let mut seen = HashSet::new();
        for decl in self.secrets.iter() {
            if !decl.has_valid_name() {
                return Err(Error::InvalidConfig(format!(
                    "secret name '{}' must be lowercase alphanumerics or '_'",
                    decl.name
                )));
            }
            if !seen.insert(decl.name.as_str()) {
                return Err(Error::InvalidConfig(format!(
                    "secret '{}' is declared twice",
                    decl.name
                )));
            }
        }

        let reserved = [
            self.database.service.as_str(),
            self.cache.service.as_str(),
            self.gateway.service.as_str(),
            MonitoringConfig::PROMETHEUS_SERVICE,
            MonitoringConfig::GRAFANA_SERVICE,
        ];
        let mut names = HashSet::new();
        for app in self.services.apps.iter() {
            if !is_valid_project_name(&app.name) {
                return Err(Error::InvalidConfig(format!(
                    "service name '{}' must be lowercase alphanumerics, '-' or '_'",
                    app.name
                )));
            }
            if reserved.contains(&app.name.as_str()) {
                return Err(Error::InvalidConfig(format!(
                    "service name '{}' clashes with a built-in service",
                    app.name
                )));
            }
            if !names.insert(app.name.as_str()) {
                return Err(Error::InvalidConfig(format!(
                    "service '{}' is declared twice",
                    app.name
                )));
            }
        }

        for route in &self.gateway.routes {
            match self.services.get(&route.service) {
                Some(app) if app.port.is_some() => {}
                Some(_) => {
                    return Err(Error::InvalidConfig(format!(
                        "route '{}' targets service '{}' which has no port",
                        route.path, route.service
                    )));
                }
                None => {
                    return Err(Error::InvalidConfig(format!(
                        "route '{}' targets unknown service '{}'",
                        route.path, route.service
                    )));
                }
            }
        }

        Ok(())
    }
}

fn is_valid_project_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 63
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
        && name.chars().next().is_some_and(|c| c.is_ascii_alphanumeric())
}

// ABOUTME: Application environment values with interpolation support.
// ABOUTME: Handles literal values and references to host environment variables.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum EnvValue {
    Literal(String),
    FromEnv {
        #[serde(rename = "env")]
        var: String,
        #[serde(default)]
        default: Option<String>,
    },
}

impl EnvValue {
    pub fn resolve(&self) -> Result<String> {
        self.resolve_with(|var| std::env::var(var).ok())
    }

    /// Resolve against an arbitrary lookup instead of the process environment.
    pub fn resolve_with<F>(&self, lookup: F) -> Result<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        match self {
            EnvValue::Literal(s) => Ok(s.clone()),
            EnvValue::FromEnv { var, default } => lookup(var)
                .or_else(|| default.clone())
                .ok_or_else(|| Error::MissingEnvVar(var.clone())),
        }
    }
}

/// Resolve every value, sorted by key so rendered files are stable.
pub fn resolve_env_map(map: &HashMap<String, EnvValue>) -> Result<BTreeMap<String, String>> {
    map.iter()
        .map(|(k, v)| v.resolve().map(|resolved| (k.clone(), resolved)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_resolves_to_itself() {
        let value = EnvValue::Literal("info".to_string());
        assert_eq!(value.resolve_with(|_| None).unwrap(), "info");
    }

    #[test]
    fn from_env_prefers_lookup_over_default() {
        let value = EnvValue::FromEnv {
            var: "LOG_LEVEL".to_string(),
            default: Some("warn".to_string()),
        };
        let resolved = value
            .resolve_with(|var| (var == "LOG_LEVEL").then(|| "debug".to_string()))
            .unwrap();
        assert_eq!(resolved, "debug");
    }

    #[test]
    fn from_env_falls_back_to_default() {
        let value = EnvValue::FromEnv {
            var: "LOG_LEVEL".to_string(),
            default: Some("warn".to_string()),
        };
        assert_eq!(value.resolve_with(|_| None).unwrap(), "warn");
    }

    #[test]
    fn from_env_without_default_is_an_error() {
        let value = EnvValue::FromEnv {
            var: "DEPLOYCTL_TEST_UNSET".to_string(),
            default: None,
        };
        let err = value.resolve_with(|_| None).unwrap_err();
        assert!(matches!(err, Error::MissingEnvVar(ref v) if v == "DEPLOYCTL_TEST_UNSET"));
    }

    #[test]
    fn parses_both_yaml_shapes() {
        let yaml = "a: plain\nb:\n  env: HOME_DIR\n  default: /srv\n";
        let map: HashMap<String, EnvValue> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(map["a"], EnvValue::Literal("plain".to_string()));
        assert_eq!(
            map["b"],
            EnvValue::FromEnv {
                var: "HOME_DIR".to_string(),
                default: Some("/srv".to_string()),
            }
        );
    }
}

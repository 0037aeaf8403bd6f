// ABOUTME: Custom serde deserializers for config types.
// ABOUTME: Handles non-empty service lists and shorthand secret declarations.

use nonempty::NonEmpty;
use serde::Deserialize;

use super::AppService;
use crate::secrets::{SecretDecl, SecretKind};

pub fn deserialize_apps<'de, D>(deserializer: D) -> Result<NonEmpty<AppService>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let values: Vec<AppService> = Vec::deserialize(deserializer)?;
    NonEmpty::from_vec(values)
        .ok_or_else(|| serde::de::Error::custom("at least one service is required"))
}

pub fn deserialize_secrets<'de, D>(deserializer: D) -> Result<NonEmpty<SecretDecl>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let values: Vec<SecretEntry> = Vec::deserialize(deserializer)?;
    let decls = values.into_iter().map(SecretEntry::into_decl).collect();
    NonEmpty::from_vec(decls)
        .ok_or_else(|| serde::de::Error::custom("at least one secret is required"))
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SecretEntry {
    Simple(String),
    Detailed { name: String, kind: SecretKind },
}

impl SecretEntry {
    fn into_decl(self) -> SecretDecl {
        match self {
            SecretEntry::Simple(name) => SecretDecl::inferred(name),
            SecretEntry::Detailed { name, kind } => SecretDecl::new(name, kind),
        }
    }
}

// ABOUTME: Application version validation.
// ABOUTME: Versions become image tags and are written into markers, the env file and the state log.

use serde::{Serialize, Serializer};
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;
use thiserror::Error;

/// Longest tag a registry accepts.
const MAX_LEN: usize = 128;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AppVersionError {
    #[error("application version cannot be empty")]
    Empty,

    #[error("application version exceeds maximum length of {MAX_LEN} characters")]
    TooLong,

    #[error("application version cannot start with '{0}'")]
    InvalidStart(char),

    #[error("invalid character in application version: {0:?}")]
    InvalidChar(char),
}

/// Version of the application being deployed, such as `1.4.2` or `latest`.
///
/// Follows the image tag grammar: an ASCII letter, digit or underscore, then up
/// to 127 letters, digits, underscores, periods or hyphens.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AppVersion(String);

impl AppVersion {
    pub fn new(value: &str) -> Result<Self, AppVersionError> {
        let mut chars = value.chars();
        let first = chars.next().ok_or(AppVersionError::Empty)?;

        if value.len() > MAX_LEN {
            return Err(AppVersionError::TooLong);
        }

        if !(first.is_ascii_alphanumeric() || first == '_') {
            return Err(AppVersionError::InvalidStart(first));
        }

        if let Some(c) = chars.find(|&c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))) {
            return Err(AppVersionError::InvalidChar(c));
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for AppVersion {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl FromStr for AppVersion {
    type Err = AppVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for AppVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for AppVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

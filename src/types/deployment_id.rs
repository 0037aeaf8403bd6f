// ABOUTME: Deployment identifiers naming backup directories and state log segments.
// ABOUTME: Format is a UTC timestamp plus a random hex suffix, so ids sort by time.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";
const SUFFIX_LEN: usize = 6;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeploymentIdError {
    #[error("deployment id must look like YYYYMMDD-HHMMSS-xxxxxx, got '{0}'")]
    Malformed(String),
}

/// Identifier of one deployment attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeploymentId(String);

impl DeploymentId {
    /// Generate a fresh id for a run starting at `at`.
    pub fn generate(at: DateTime<Utc>) -> Self {
        let mut suffix = [0u8; SUFFIX_LEN / 2];
        rand::fill(&mut suffix);
        Self(format!(
            "{}-{}",
            at.format(TIMESTAMP_FORMAT),
            hex::encode(suffix)
        ))
    }

    pub fn parse(value: &str) -> Result<Self, DeploymentIdError> {
        let malformed = || DeploymentIdError::Malformed(value.to_string());

        // "YYYYMMDD-HHMMSS" is 15 chars, then '-' and the suffix
        if value.len() != 15 + 1 + SUFFIX_LEN {
            return Err(malformed());
        }
        let (stamp, rest) = value.split_at(15);
        NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).map_err(|_| malformed())?;

        let suffix = rest.strip_prefix('-').ok_or_else(malformed)?;
        if !suffix
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        {
            return Err(malformed());
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for DeploymentId {
    type Err = DeploymentIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for DeploymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for DeploymentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DeploymentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn generated_id_parses_back() {
        let at = Utc.with_ymd_and_hms(2026, 10, 19, 8, 30, 5).unwrap();
        let id = DeploymentId::generate(at);

        assert!(id.as_str().starts_with("20261019-083005-"));
        assert_eq!(DeploymentId::parse(id.as_str()).unwrap(), id);
    }

    #[test]
    fn ids_from_same_second_differ() {
        let at = Utc::now();
        let ids: std::collections::HashSet<_> =
            (0..32).map(|_| DeploymentId::generate(at)).collect();
        assert!(ids.len() > 1);
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!(DeploymentId::parse("").is_err());
        assert!(DeploymentId::parse("20261019-083005").is_err());
        assert!(DeploymentId::parse("20261319-083005-abcdef").is_err());
        assert!(DeploymentId::parse("20261019-083005-ABCDEF").is_err());
        assert!(DeploymentId::parse("../../etc/passwd-xxxxxx").is_err());
    }
}

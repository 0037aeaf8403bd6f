// ABOUTME: Error types for secret and certificate management.
// ABOUTME: Missing secrets are reported all at once, never one at a time.

use std::fmt;
use std::path::PathBuf;

/// Why a declared secret is unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapReason {
    Missing,
    Empty,
}

/// A declared secret that is missing or empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretGap {
    pub name: String,
    pub reason: GapReason,
}

impl fmt::Display for SecretGap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason {
            GapReason::Missing => write!(f, "{} (missing)", self.name),
            GapReason::Empty => write!(f, "{} (empty)", self.name),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("{} secret(s) unusable: {}", .gaps.len(), format_gaps(.gaps))]
    Missing { gaps: Vec<SecretGap> },

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("certificate generation failed: {0}")]
    Certificate(#[from] rcgen::Error),

    #[error("failed to parse certificate {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

impl SecretError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SecretError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parse(path: impl Into<PathBuf>, message: impl fmt::Display) -> Self {
        SecretError::Parse {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

fn format_gaps(gaps: &[SecretGap]) -> String {
    gaps.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

// ABOUTME: Secret generation and persistence for a project root.
// ABOUTME: One owner-only file per secret; the tls submodule manages the CA and leaf certificates.

mod error;
pub mod tls;

pub use error::{GapReason, SecretError, SecretGap};
pub use tls::{CertificateAuthority, LeafCertificate};

use crate::context::Layout;
use crate::files::{self, MODE_PRIVATE, MODE_PRIVATE_DIR};
use base64::Engine;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use nonempty::NonEmpty;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Purpose of a secret; decides entropy and encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretKind {
    Password,
    ApiKey,
    SigningKey,
    EncryptionKey,
}

impl SecretKind {
    /// Random bytes drawn for this kind.
    pub fn entropy_bytes(self) -> usize {
        match self {
            SecretKind::Password | SecretKind::ApiKey | SecretKind::EncryptionKey => 32,
            SecretKind::SigningKey => 64,
        }
    }

    fn encode(self, bytes: &[u8]) -> String {
        match self {
            // Safe inside connection URLs and unquoted .env values.
            SecretKind::Password => URL_SAFE_NO_PAD.encode(bytes),
            SecretKind::ApiKey | SecretKind::SigningKey => hex::encode(bytes),
            // Fernet-style key: url-safe base64 of exactly 32 bytes.
            SecretKind::EncryptionKey => URL_SAFE.encode(bytes),
        }
    }
}

/// A secret the project declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretDecl {
    pub name: String,
    pub kind: SecretKind,
}

impl SecretDecl {
    pub fn new(name: impl Into<String>, kind: SecretKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Guess the kind from a conventional name.
    pub fn inferred(name: impl Into<String>) -> Self {
        let name = name.into();
        let kind = if name.ends_with("password") {
            SecretKind::Password
        } else if name.contains("jwt") || name.contains("signing") || name.ends_with("_secret") {
            SecretKind::SigningKey
        } else if name.contains("encryption") {
            SecretKind::EncryptionKey
        } else {
            SecretKind::ApiKey
        };
        Self { name, kind }
    }

    /// Secrets every stack needs.
    pub fn defaults() -> NonEmpty<SecretDecl> {
        let mut decls = NonEmpty::new(SecretDecl::new("postgres_password", SecretKind::Password));
        decls.push(SecretDecl::new("redis_password", SecretKind::Password));
        decls.push(SecretDecl::new("jwt_secret", SecretKind::SigningKey));
        decls.push(SecretDecl::new("api_key", SecretKind::ApiKey));
        decls.push(SecretDecl::new("encryption_key", SecretKind::EncryptionKey));
        decls.push(SecretDecl::new("grafana_admin_password", SecretKind::Password));
        decls
    }

    /// Names double as file names, so keep them boring.
    pub fn has_valid_name(&self) -> bool {
        !self.name.is_empty()
            && self
                .name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    }

    /// Variable name used in the rendered `.env`.
    pub fn env_key(&self) -> String {
        self.name.to_ascii_uppercase()
    }
}

/// Secret material. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretValue(<redacted>)")
    }
}

/// Whether a secret was read back from disk or freshly generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretOrigin {
    Loaded,
    Generated,
}

#[derive(Debug, Clone)]
pub struct Secret {
    pub name: String,
    pub value: SecretValue,
    pub created_at: DateTime<Utc>,
    pub origin: SecretOrigin,
}

/// File-backed store for symmetric secrets and TLS material.
#[derive(Debug, Clone)]
pub struct SecretStore {
    dir: PathBuf,
    tls_dir: PathBuf,
}

impl SecretStore {
    pub fn new(layout: &Layout) -> Self {
        Self::open(layout.secrets_dir(), layout.tls_dir())
    }

    pub fn open(dir: impl Into<PathBuf>, tls_dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            tls_dir: tls_dir.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn tls_dir(&self) -> &Path {
        &self.tls_dir
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Load every declared secret, generating the ones that are missing or empty.
    ///
    /// With `force` every value is regenerated and the old file replaced.
    pub fn generate_or_load(
        &self,
        decls: &[SecretDecl],
        force: bool,
    ) -> Result<BTreeMap<String, Secret>, SecretError> {
        files::create_dir_with_mode(&self.dir, MODE_PRIVATE_DIR)
            .map_err(|e| SecretError::io(&self.dir, e))?;

        let mut secrets = BTreeMap::new();
        for decl in decls {
            let existing = if force { None } else { self.load(&decl.name)? };
            let secret = match existing {
                Some(secret) if !secret.value.expose().is_empty() => secret,
                _ => self.generate(decl)?,
            };
            secrets.insert(decl.name.clone(), secret);
        }
        Ok(secrets)
    }

    fn generate(&self, decl: &SecretDecl) -> Result<Secret, SecretError> {
        let mut bytes = vec![0u8; decl.kind.entropy_bytes()];
        rand::fill(&mut bytes[..]);
        let value = decl.kind.encode(&bytes);

        let path = self.path_for(&decl.name);
        files::write_atomic(&path, value.as_bytes(), MODE_PRIVATE)
            .map_err(|e| SecretError::io(&path, e))?;
        tracing::info!("generated secret {}", decl.name);

        Ok(Secret {
            name: decl.name.clone(),
            value: SecretValue(value),
            created_at: Utc::now(),
            origin: SecretOrigin::Generated,
        })
    }

    /// Read a secret from disk. Returns `None` when the file does not exist.
    pub fn load(&self, name: &str) -> Result<Option<Secret>, SecretError> {
        let path = self.path_for(name);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SecretError::io(&path, e)),
        };

        let created_at = fs::metadata(&path)
            .and_then(|m| m.modified())
            .map(DateTime::<Utc>::from)
            .map_err(|e| SecretError::io(&path, e))?;

        Ok(Some(Secret {
            name: name.to_string(),
            value: SecretValue(contents.trim().to_string()),
            created_at,
            origin: SecretOrigin::Loaded,
        }))
    }

    /// Check that every named secret exists and is non-empty, reporting all gaps.
    pub fn validate(&self, names: &[&str]) -> Result<(), SecretError> {
        let mut gaps = Vec::new();
        for name in names {
            match self.load(name)? {
                None => gaps.push(SecretGap {
                    name: name.to_string(),
                    reason: GapReason::Missing,
                }),
                Some(secret) if secret.value.expose().is_empty() => gaps.push(SecretGap {
                    name: name.to_string(),
                    reason: GapReason::Empty,
                }),
                Some(_) => {}
            }
        }

        if gaps.is_empty() {
            Ok(())
        } else {
            Err(SecretError::Missing { gaps })
        }
    }

    /// Validate then load the named secrets.
    pub fn require(&self, names: &[&str]) -> Result<BTreeMap<String, Secret>, SecretError> {
        self.validate(names)?;
        let mut secrets = BTreeMap::new();
        for name in names {
            if let Some(secret) = self.load(name)? {
                secrets.insert(name.to_string(), secret);
            }
        }
        Ok(secrets)
    }

    /// Reuse the CA if its key exists, otherwise create a new one.
    pub fn issue_ca(&self, common_name: &str) -> Result<CertificateAuthority, SecretError> {
        tls::issue_ca(&self.tls_dir, common_name)
    }

    /// Reuse the leaf certificate while it has more than 30 days left and covers
    /// `sans`; otherwise, or with `force`, issue a fresh one signed by `ca`.
    pub fn issue_leaf(
        &self,
        ca: &CertificateAuthority,
        subject: &str,
        sans: &[String],
        force: bool,
    ) -> Result<LeafCertificate, SecretError> {
        tls::issue_leaf(&self.tls_dir, ca, subject, sans, force)
    }
}

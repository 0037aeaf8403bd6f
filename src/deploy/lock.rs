// ABOUTME: Advisory deploy lock preventing concurrent runs against one project root.
// ABOUTME: Atomic create-new of .deploy/deploy.lock holding JSON about the holder.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::types::EnvironmentName;

/// Information about who holds a deploy lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// Hostname of the machine that holds the lock.
    pub holder: String,
    /// Process ID of the lock holder.
    pub pid: u32,
    /// When the lock was acquired.
    pub started_at: DateTime<Utc>,
    /// Environment being deployed.
    pub environment: String,
}

impl LockInfo {
    /// Create new lock info for the current process.
    pub fn new(environment: &EnvironmentName) -> Self {
        Self {
            holder: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
            started_at: Utc::now(),
            environment: environment.to_string(),
        }
    }

    /// Check if this lock is stale (older than 1 hour).
    pub fn is_stale(&self) -> bool {
        let age = Utc::now() - self.started_at;
        age.num_hours() >= 1
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error(
        "deploy lock held by {} (pid {}) since {}; pass --force-lock to break it",
        .0.holder, .0.pid, .0.started_at
    )]
    Held(LockInfo),

    #[error("lock at {} was taken by another process while breaking it", .0.display())]
    Contended(PathBuf),

    #[error("lock file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl LockError {
    /// Holder details when the lock is actively held.
    pub fn holder_info(&self) -> Option<&LockInfo> {
        match self {
            LockError::Held(info) => Some(info),
            _ => None,
        }
    }
}

/// A held deploy lock that releases on drop.
#[derive(Debug)]
pub struct DeployLock {
    path: PathBuf,
    released: bool,
}

impl DeployLock {
    /// Acquire the lock at `path`.
    ///
    /// Stale locks (>1 hour) and unreadable lock files are broken with a warning;
    /// `force` breaks an active lock too.
    pub fn acquire(
        path: &Path,
        environment: &EnvironmentName,
        force: bool,
    ) -> Result<Self, LockError> {
        let io_err = |source| LockError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let info = LockInfo::new(environment);
        if try_create(path, &info).map_err(io_err)? {
            return Ok(Self::held(path));
        }

        if !should_break(path, force)? {
            return match read_info(path) {
                Some(existing) => Err(LockError::Held(existing)),
                None => Err(LockError::Contended(path.to_path_buf())),
            };
        }

        tracing::debug!("removing stale/forced lock at {}", path.display());
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_err(e)),
        }

        if try_create(path, &info).map_err(io_err)? {
            Ok(Self::held(path))
        } else {
            Err(LockError::Contended(path.to_path_buf()))
        }
    }

    fn held(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            released: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock, reporting a failure to remove the file.
    pub fn release(mut self) -> Result<(), LockError> {
        self.released = true;
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(LockError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

impl Drop for DeployLock {
    fn drop(&mut self) {
        if !self.released
            && let Err(e) = fs::remove_file(&self.path)
            && e.kind() != io::ErrorKind::NotFound
        {
            tracing::warn!("failed to remove lock {}: {}", self.path.display(), e);
        }
    }
}

/// Atomically create the lock file; `Ok(false)` when it already exists.
fn try_create(path: &Path, info: &LockInfo) -> io::Result<bool> {
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(e),
    };
    let json = serde_json::to_string(info).map_err(io::Error::other)?;
    file.write_all(json.as_bytes())?;
    file.sync_all()?;
    Ok(true)
}

fn read_info(path: &Path) -> Option<LockInfo> {
    let content = fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}

/// Check if an existing lock should be broken (stale, forced, or corrupted).
fn should_break(path: &Path, force: bool) -> Result<bool, LockError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        // Released between our create attempt and now
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(true),
        Err(source) => {
            return Err(LockError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    match serde_json::from_str::<LockInfo>(&content) {
        Ok(existing) => {
            if force {
                tracing::warn!(
                    "Breaking lock held by {} (pid {}) since {}",
                    existing.holder,
                    existing.pid,
                    existing.started_at
                );
                Ok(true)
            } else if existing.is_stale() {
                tracing::warn!(
                    "Auto-breaking stale lock held by {} (pid {}) since {}",
                    existing.holder,
                    existing.pid,
                    existing.started_at
                );
                Ok(true)
            } else {
                Ok(false)
            }
        }
        Err(_) => {
            tracing::warn!("Lock info corrupted, breaking lock");
            Ok(true)
        }
    }
}

// ABOUTME: Pre-deploy snapshots of the compose file, env file and a database dump.
// ABOUTME: Snapshots never fail a deploy; every problem becomes a warning in the metadata.

mod rollback;

pub use rollback::{RollbackError, RollbackOutcome, rollback};

use crate::context::{ConfigContext, DeploymentRun, Layout};
use crate::exec::{CommandRunner, CommandSpec};
use crate::files::{self, MODE_PRIVATE, MODE_PRIVATE_DIR, MODE_PUBLIC};
use crate::runtime::{ContainerFilters, ContainerOps, ContainerRuntime, ExecConfig, ExecOps};
use crate::types::DeploymentId;
use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const METADATA_FILE: &str = "metadata.json";
pub const DATABASE_DUMP_FILE: &str = "database.sql.gz";

const DUMP_TIMEOUT: Duration = Duration::from_secs(600);

/// Contents of `metadata.json` in a backup directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub deployment_id: DeploymentId,
    pub version: String,
    pub environment: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_commit: Option<String>,
    /// File names copied into the backup, relative to the project root.
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_dump: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// A written backup directory.
#[derive(Debug, Clone)]
pub struct BackupSnapshot {
    pub dir: PathBuf,
    pub metadata: SnapshotMetadata,
}

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("no backup metadata at {path}")]
    MetadataMissing { path: PathBuf },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("backup metadata {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl BackupSnapshot {
    /// Read a snapshot back from its directory.
    pub fn load(dir: &Path) -> Result<Self, BackupError> {
        let path = dir.join(METADATA_FILE);
        let content = std::fs::read_to_string(&path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                BackupError::MetadataMissing { path: path.clone() }
            } else {
                BackupError::Read {
                    path: path.clone(),
                    source,
                }
            }
        })?;
        let metadata =
            serde_json::from_str(&content).map_err(|source| BackupError::Corrupt { path, source })?;
        Ok(Self {
            dir: dir.to_path_buf(),
            metadata,
        })
    }

    pub fn database_dump_path(&self) -> Option<PathBuf> {
        self.metadata
            .database_dump
            .as_ref()
            .map(|name| self.dir.join(name))
    }

    pub fn warnings(&self) -> &[String] {
        &self.metadata.warnings
    }
}

/// Project files captured by a snapshot and the mode they are restored with.
pub(crate) fn snapshot_files(layout: &Layout) -> [(PathBuf, u32); 2] {
    [
        (layout.compose_file(), MODE_PUBLIC),
        (layout.env_file(), MODE_PRIVATE),
    ]
}

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Takes snapshots for one project root.
pub struct BackupManager<'a> {
    ctx: &'a ConfigContext,
    runner: &'a dyn CommandRunner,
    runtime: &'a dyn ContainerRuntime,
}

impl<'a> BackupManager<'a> {
    pub fn new(
        ctx: &'a ConfigContext,
        runner: &'a dyn CommandRunner,
        runtime: &'a dyn ContainerRuntime,
    ) -> Self {
        Self {
            ctx,
            runner,
            runtime,
        }
    }

    /// Snapshot the current deployment state into `backups/<deployment-id>/`.
    pub async fn snapshot(&self, run: &DeploymentRun) -> BackupSnapshot {
        let layout = &self.ctx.layout;
        let dir = layout.backup_dir(&run.deployment_id);
        let mut metadata = SnapshotMetadata {
            deployment_id: run.deployment_id.clone(),
            version: run.version.to_string(),
            environment: run.environment.to_string(),
            created_at: Utc::now(),
            source_commit: None,
            files: Vec::new(),
            database_dump: None,
            warnings: Vec::new(),
        };

        // Copied env files hold secrets.
        if let Err(e) = files::create_dir_with_mode(&dir, MODE_PRIVATE_DIR) {
            warn(&mut metadata, format!("failed to create {}: {e}", dir.display()));
        }

        for (path, mode) in snapshot_files(layout) {
            let name = file_name(&path);
            match files::copy_atomic(&path, &dir.join(&name), mode) {
                Ok(()) => metadata.files.push(name),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    tracing::debug!("backup: {} absent, not copied", path.display());
                }
                Err(e) => warn(&mut metadata, format!("failed to copy {name}: {e}")),
            }
        }

        match self.dump_database(&dir).await {
            Ok(Some(name)) => metadata.database_dump = Some(name),
            Ok(None) => tracing::debug!("backup: database not running, no dump taken"),
            Err(message) => warn(&mut metadata, format!("database dump failed: {message}")),
        }

        metadata.source_commit = self.source_commit().await;

        match serde_json::to_vec_pretty(&metadata) {
            Ok(json) => {
                if let Err(e) = files::write_atomic(&dir.join(METADATA_FILE), &json, MODE_PUBLIC) {
                    warn(&mut metadata, format!("failed to write {METADATA_FILE}: {e}"));
                }
            }
            Err(e) => warn(&mut metadata, format!("failed to encode metadata: {e}")),
        }

        tracing::info!("backup: snapshot written to {}", dir.display());
        BackupSnapshot { dir, metadata }
    }

    /// `pg_dump` through the running database container, gzip-compressed.
    /// Returns `Ok(None)` when no database container is running.
    async fn dump_database(&self, dir: &Path) -> Result<Option<String>, String> {
        let db = &self.ctx.config.database;
        let filters = ContainerFilters::for_service(&self.ctx.config.project, &db.service, false);
        let containers = self
            .runtime
            .list_containers(&filters)
            .await
            .map_err(|e| e.to_string())?;
        let Some(container) = containers.into_iter().find(|c| c.is_running()) else {
            return Ok(None);
        };

        let dump = ExecConfig::new([
            "pg_dump",
            "-U",
            db.user.as_str(),
            "-d",
            db.name.as_str(),
            "--clean",
            "--if-exists",
        ])
        .timeout(DUMP_TIMEOUT);
        let result = self
            .runtime
            .exec(&container.id, &dump)
            .await
            .map_err(|e| e.to_string())?;
        if !result.success() {
            return Err(format!(
                "pg_dump exited with {}: {}",
                result.exit_code,
                result.stderr_lossy()
            ));
        }

        let compressed = gzip(&result.stdout).map_err(|e| e.to_string())?;
        files::write_atomic(&dir.join(DATABASE_DUMP_FILE), &compressed, MODE_PRIVATE)
            .map_err(|e| e.to_string())?;
        tracing::info!(
            "backup: database dump of {} bytes compressed to {}",
            result.stdout.len(),
            compressed.len()
        );
        Ok(Some(DATABASE_DUMP_FILE.to_string()))
    }

    async fn source_commit(&self) -> Option<String> {
        let spec = CommandSpec::new("git")
            .args(["rev-parse", "HEAD"])
            .cwd(self.ctx.project_root())
            .timeout(Duration::from_secs(10));
        match self.runner.run(&spec).await {
            Ok(output) if output.success() => {
                let commit = output.stdout.trim();
                (!commit.is_empty()).then(|| commit.to_string())
            }
            _ => None,
        }
    }
}

fn warn(metadata: &mut SnapshotMetadata, message: String) {
    tracing::warn!("backup: {}", message);
    metadata.warnings.push(message);
}

fn gzip(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

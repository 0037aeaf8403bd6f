// ABOUTME: Operator-invoked rollback to a pre-deploy snapshot.
// ABOUTME: Stops services, restores compose/env files, and surfaces the database dump for manual restore.

use super::{BackupError, BackupSnapshot, file_name, snapshot_files};
use crate::context::ConfigContext;
use crate::exec::{CommandError, CommandRunner};
use crate::files;
use crate::modules::{IdempotencyMarker, ModuleKind};
use crate::state::{StateLog, StateLogError};
use crate::types::DeploymentId;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RollbackError {
    #[error(transparent)]
    Backup(#[from] BackupError),

    #[error(
        "deployment {deployment_id} does not appear in the state log; pass --force to roll back anyway"
    )]
    UnknownDeployment { deployment_id: DeploymentId },

    #[error(
        "deployment {deployment_id} is not the most recent run (latest is {latest}); pass --force to roll back anyway"
    )]
    NotLatestRun {
        deployment_id: DeploymentId,
        latest: DeploymentId,
    },

    #[error("failed to stop services: {0}")]
    Stop(#[source] CommandError),

    #[error("failed to restore {path}: {source}")]
    Restore {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to clear marker {path}: {source}")]
    Marker {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    StateLog(#[from] StateLogError),
}

/// What a rollback did.
#[derive(Debug, Clone)]
pub struct RollbackOutcome {
    pub deployment_id: DeploymentId,
    pub restored: Vec<PathBuf>,
    pub database_dump: Option<PathBuf>,
    /// Shell command an operator can run to load the dump.
    pub restore_command: Option<String>,
}

/// Roll the project back to the snapshot in `backup_dir`.
///
/// Refuses snapshots whose deployment is not the latest run in the state log
/// unless `force` is set. Every idempotency marker is cleared so the next deploy
/// re-runs all modules. The database dump is never restored automatically.
pub async fn rollback(
    ctx: &ConfigContext,
    runner: &dyn CommandRunner,
    backup_dir: &Path,
    force: bool,
) -> Result<RollbackOutcome, RollbackError> {
    let snapshot = BackupSnapshot::load(backup_dir)?;
    let deployment_id = snapshot.metadata.deployment_id.clone();
    let log = StateLog::new(ctx.layout.state_log());

    if let Err(refusal) = check_latest(&log, &deployment_id) {
        if !force {
            return Err(refusal);
        }
        tracing::warn!("{refusal}; continuing because of --force");
    }

    let layout = &ctx.layout;
    if layout.compose_file().exists() {
        tracing::info!("rollback: stopping services");
        runner
            .run_checked(&ctx.compose().down(false))
            .await
            .map_err(RollbackError::Stop)?;
    } else {
        tracing::warn!("rollback: no compose file, nothing to stop");
    }

    let mut restored = Vec::new();
    for (target, mode) in snapshot_files(layout) {
        let name = file_name(&target);
        if !snapshot.metadata.files.contains(&name) {
            continue;
        }
        files::copy_atomic(&snapshot.dir.join(&name), &target, mode).map_err(|source| {
            RollbackError::Restore {
                path: target.clone(),
                source,
            }
        })?;
        tracing::info!("rollback: restored {}", target.display());
        restored.push(target);
    }

    // Restored artifacts no longer match any recorded version.
    for module in ModuleKind::ALL {
        let marker = IdempotencyMarker::new(layout, module);
        marker.clear().map_err(|source| RollbackError::Marker {
            path: marker.path().to_path_buf(),
            source,
        })?;
    }

    log.note_rollback(&deployment_id)?;

    let database_dump = snapshot.database_dump_path();
    let restore_command = database_dump.as_ref().map(|dump| restore_command(ctx, dump));
    Ok(RollbackOutcome {
        deployment_id,
        restored,
        database_dump,
        restore_command,
    })
}

fn check_latest(log: &StateLog, deployment_id: &DeploymentId) -> Result<(), RollbackError> {
    let runs = log.runs()?;
    if !runs.iter().any(|r| &r.deployment_id == deployment_id) {
        return Err(RollbackError::UnknownDeployment {
            deployment_id: deployment_id.clone(),
        });
    }
    match runs.last() {
        Some(latest) if &latest.deployment_id != deployment_id => Err(RollbackError::NotLatestRun {
            deployment_id: deployment_id.clone(),
            latest: latest.deployment_id.clone(),
        }),
        _ => Ok(()),
    }
}

fn restore_command(ctx: &ConfigContext, dump: &Path) -> String {
    let db = &ctx.config.database;
    format!(
        "gunzip -c {} | {} compose -f {} -p {} exec -T {} psql -U {} -d {}",
        dump.display(),
        ctx.config.compose.program,
        ctx.layout.compose_file().display(),
        ctx.config.project,
        db.service,
        db.user,
        db.name
    )
}

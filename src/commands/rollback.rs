// ABOUTME: Rollback command implementation.
// ABOUTME: Restores a backup under the deploy lock and prints the manual database restore step.

use deployctl::backup::{self, RollbackOutcome};
use deployctl::context::ConfigContext;
use deployctl::deploy::DeployLock;
use deployctl::diagnostics::{Diagnostics, Warning};
use deployctl::error::Result;
use deployctl::exec::ProcessRunner;
use deployctl::output::Output;
use serde::Serialize;
use std::path::Path;

/// Roll back to the snapshot in `backup_dir`.
pub async fn rollback(
    ctx: &ConfigContext,
    backup_dir: &Path,
    force: bool,
    force_lock: bool,
    mut output: Output,
) -> Result<()> {
    output.start_timer();
    let mut diag = Diagnostics::default();

    output.progress(&format!("Rolling back to {}", backup_dir.display()));
    let lock = DeployLock::acquire(&ctx.layout.lock_file(), &ctx.environment, force_lock)?;

    let runner = ProcessRunner::new();
    let outcome = backup::rollback(ctx, &runner, backup_dir, force).await?;

    if let Err(e) = lock.release() {
        diag.warn(Warning::lock_release(format!(
            "failed to release deploy lock: {e}"
        )));
    }
    for warning in diag.warnings() {
        output.warning(&warning.message);
    }

    print_outcome(&outcome, &output);
    output.success(&format!(
        "Rolled back to deployment {}",
        outcome.deployment_id
    ));
    Ok(())
}

#[derive(Serialize)]
struct RollbackReport<'a> {
    deployment_id: &'a str,
    restored: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    database_dump: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    restore_command: Option<&'a str>,
}

fn print_outcome(outcome: &RollbackOutcome, output: &Output) {
    for path in &outcome.restored {
        output.progress(&format!("  → Restored {}", path.display()));
    }
    if let (Some(dump), Some(command)) = (&outcome.database_dump, &outcome.restore_command) {
        output.notice(&format!(
            "The database was not restored. The dump taken before the deploy is at {}",
            dump.display()
        ));
        output.notice(&format!("To restore it run:\n  {command}"));
    }

    output.report(
        "rollback",
        &RollbackReport {
            deployment_id: outcome.deployment_id.as_str(),
            restored: outcome
                .restored
                .iter()
                .map(|p| p.display().to_string())
                .collect(),
            database_dump: outcome.database_dump.as_ref().map(|p| p.display().to_string()),
            restore_command: outcome.restore_command.as_deref(),
        },
    );
}

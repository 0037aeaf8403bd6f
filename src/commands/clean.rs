// ABOUTME: Clean command implementation.
// ABOUTME: Removes containers, volumes, the state log and module markers after confirmation.

use deployctl::context::ConfigContext;
use deployctl::deploy::DeployLock;
use deployctl::error::{Error, Result};
use deployctl::exec::{CommandRunner, ProcessRunner};
use deployctl::output::Output;
use deployctl::state::StateLog;
use std::io::{self, BufRead, Write};

pub async fn clean(ctx: &ConfigContext, yes: bool, mut output: Output) -> Result<()> {
    if !yes && !confirm(ctx)? {
        return Err(Error::Aborted);
    }
    output.start_timer();

    let lock = DeployLock::acquire(&ctx.layout.lock_file(), &ctx.environment, false)?;

    output.progress("  → Removing containers and volumes...");
    ProcessRunner::new()
        .run_checked(&ctx.compose().down(true))
        .await?;

    output.progress("  → Removing state log and markers...");
    StateLog::new(ctx.layout.state_log()).remove()?;
    match std::fs::remove_dir_all(ctx.layout.markers_dir()) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    if let Err(e) = lock.release() {
        output.warning(&format!("failed to release deploy lock: {e}"));
    }
    output.success(&format!("Cleaned {}", ctx.config.project));
    Ok(())
}

/// Ask on the terminal; only a literal `yes` proceeds.
fn confirm(ctx: &ConfigContext) -> Result<bool> {
    let mut stderr = io::stderr();
    write!(
        stderr,
        "This removes all containers, volumes and deploy state of project {} in {}.\nType 'yes' to continue: ",
        ctx.config.project,
        ctx.project_root().display()
    )?;
    stderr.flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(answer.trim() == "yes")
}

// ABOUTME: Stop command implementation.
// ABOUTME: Stops every compose service without removing containers or volumes.

use deployctl::context::ConfigContext;
use deployctl::error::Result;
use deployctl::exec::{CommandRunner, ProcessRunner};
use deployctl::output::Output;

pub async fn stop(ctx: &ConfigContext, mut output: Output) -> Result<()> {
    output.start_timer();
    output.progress(&format!("Stopping {}", ctx.config.project));
    ProcessRunner::new()
        .run_checked(&ctx.compose().stop())
        .await?;
    output.success("Services stopped");
    Ok(())
}

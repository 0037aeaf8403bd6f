// ABOUTME: Shared helper for connecting to the local container runtime.
// ABOUTME: Used by every command that talks to containers.

use deployctl::context::ConfigContext;
use deployctl::error::Result;
use deployctl::output::Output;
use deployctl::runtime::{BollardRuntime, connect_local};

/// Connect to the runtime named in the config, or the first local socket found.
pub fn connect_to_runtime(ctx: &ConfigContext, output: &Output) -> Result<BollardRuntime> {
    output.progress("  → Connecting to container runtime...");
    let runtime = connect_local(ctx.config.runtime.as_ref())?;
    Ok(runtime)
}

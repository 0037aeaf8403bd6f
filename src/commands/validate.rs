// ABOUTME: Validate command implementation.
// ABOUTME: Probes every health target once; failures are warnings unless --strict.

use super::runtime_connection::connect_to_runtime;
use deployctl::context::ConfigContext;
use deployctl::error::{Error, Result};
use deployctl::output::Output;
use deployctl::validate::{HealthTarget, Validator};

pub async fn validate(ctx: &ConfigContext, strict: bool, mut output: Output) -> Result<()> {
    output.start_timer();
    let runtime = connect_to_runtime(ctx, &output)?;

    let targets = HealthTarget::from_config(&ctx.config);
    output.progress(&format!("Validating {} target(s)", targets.len()));
    let report = Validator::new(
        &runtime,
        &ctx.config.project,
        ctx.config.validation.http_timeout,
    )
    .run(&targets)
    .await;

    for result in &report.results {
        let mark = if result.passed { "✓" } else { "✗" };
        output.progress(&format!("  {mark} {}: {}", result.target, result.detail));
    }
    for failure in report.failures() {
        output.warning(&format!("{} failed validation: {}", failure.target, failure.detail));
    }
    output.report("validate", &report);

    if strict && !report.is_clean() {
        return Err(Error::ValidationFailed {
            failed: report.warned,
        });
    }
    output.success(&format!(
        "{} passed, {} warned",
        report.passed, report.warned
    ));
    Ok(())
}

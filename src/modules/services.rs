// ABOUTME: The services module starts the application containers.
// ABOUTME: Succeeds once every declared service has a running container.

use super::{ContainerSnafu, ModuleEnv, ModuleError, ModuleKind, wait_until};
use crate::runtime::{ContainerFilters, ContainerOps};
use snafu::ResultExt;
use std::collections::HashSet;

const MODULE: ModuleKind = ModuleKind::Services;

pub(super) async fn run(env: &ModuleEnv<'_>) -> Result<(), ModuleError> {
    let ctx = env.ctx;
    let services = &ctx.config.services;
    let names = services.names();

    env.compose_up(MODULE, &names).await?;

    let filters = ContainerFilters::for_project(&ctx.config.project, false);
    wait_until(
        MODULE,
        "application services",
        services.start_timeout,
        services.poll_interval,
        || async {
            let running: HashSet<String> = env
                .runtime
                .list_containers(&filters)
                .await
                .context(ContainerSnafu { module: MODULE })?
                .into_iter()
                .filter(|c| c.is_running())
                .filter_map(|c| c.service().map(str::to_string))
                .collect();
            let missing: Vec<_> = names
                .iter()
                .filter(|n| !running.contains(**n))
                .collect();
            if !missing.is_empty() {
                tracing::debug!("services: waiting for {:?}", missing);
            }
            Ok(missing.is_empty())
        },
    )
    .await?;

    tracing::info!("services: {} running", names.join(", "));
    Ok(())
}

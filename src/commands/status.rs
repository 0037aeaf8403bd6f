// ABOUTME: Status command implementation.
// ABOUTME: Shows per-module status, the state log tail and the project's running containers.

use super::runtime_connection::connect_to_runtime;
use deployctl::context::ConfigContext;
use deployctl::error::Result;
use deployctl::modules::ModuleKind;
use deployctl::output::Output;
use deployctl::runtime::{ContainerFilters, ContainerOps, ContainerSummary};
use deployctl::state::{ModuleStatus, StateLog};
use serde::Serialize;

#[derive(Serialize)]
struct StatusReport<'a> {
    modules: Vec<(ModuleKind, ModuleStatus)>,
    log: &'a [String],
    containers: Vec<ContainerStatus<'a>>,
}

#[derive(Serialize)]
struct ContainerStatus<'a> {
    name: &'a str,
    service: Option<&'a str>,
    image: &'a str,
    status: &'a str,
}

pub async fn status(ctx: &ConfigContext, lines: usize, output: Output) -> Result<()> {
    let log = StateLog::new(ctx.layout.state_log());

    let mut modules = Vec::with_capacity(ModuleKind::ALL.len());
    for module in ModuleKind::ALL {
        modules.push((module, log.current_status(module)?));
    }
    let tail = log.tail(lines)?;

    // Containers are best effort.
    let containers = match connect_to_runtime(ctx, &output) {
        Ok(runtime) => {
            let filters = ContainerFilters::for_project(&ctx.config.project, false);
            match runtime.list_containers(&filters).await {
                Ok(containers) => containers,
                Err(e) => {
                    output.warning(&format!("failed to list containers: {e}"));
                    Vec::new()
                }
            }
        }
        Err(e) => {
            output.warning(&format!("container runtime unavailable: {e}"));
            Vec::new()
        }
    };

    output.progress(&format!("Project {} ({})", ctx.config.project, ctx.environment));
    output.progress("Modules:");
    for (module, status) in &modules {
        output.detail(module.name(), status.as_str());
    }

    output.progress(&format!("State log ({}):", log.path().display()));
    if tail.is_empty() {
        output.progress("  (empty)");
    }
    for line in &tail {
        output.progress(&format!("  {line}"));
    }

    output.progress("Running containers:");
    if containers.is_empty() {
        output.progress("  (none)");
    }
    for container in &containers {
        output.detail(&container.name, &describe(container));
    }

    output.report(
        "status",
        &StatusReport {
            modules,
            log: &tail,
            containers: containers
                .iter()
                .map(|c| ContainerStatus {
                    name: &c.name,
                    service: c.service(),
                    image: &c.image,
                    status: &c.status,
                })
                .collect(),
        },
    );
    Ok(())
}

fn describe(container: &ContainerSummary) -> String {
    format!("{} [{}]", container.status, container.image)
}

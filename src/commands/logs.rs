// ABOUTME: Logs command implementation.
// ABOUTME: Streams logs of one service, or interleaves every service of the project.

use super::runtime_connection::connect_to_runtime;
use deployctl::context::ConfigContext;
use deployctl::error::{Error, Result};
use deployctl::output::Output;
use deployctl::runtime::{
    ContainerFilters, ContainerOps, LogLine, LogOps, LogOptions, LogStream,
};
use futures::StreamExt;
use futures::stream;

pub async fn logs(
    ctx: &ConfigContext,
    service: Option<&str>,
    tail: u64,
    follow: bool,
    output: Output,
) -> Result<()> {
    let runtime = connect_to_runtime(ctx, &output)?;
    let project = &ctx.config.project;
    let filters = match service {
        Some(service) => ContainerFilters::for_service(project, service, false),
        None => ContainerFilters::for_project(project, false),
    };
    let containers = runtime.list_containers(&filters).await?;
    if containers.is_empty() {
        output.warning(&match service {
            Some(service) => format!("no running container for service {service}"),
            None => format!("no running containers in project {project}"),
        });
        return Ok(());
    }

    let opts = LogOptions::tail(tail, follow);
    let prefixed = containers.len() > 1;
    let mut streams = Vec::with_capacity(containers.len());
    for container in &containers {
        let label = container.service().unwrap_or(&container.name).to_string();
        let lines = runtime.container_logs(&container.id, &opts).await?;
        streams.push(lines.map(move |line| (label.clone(), line)).boxed());
    }

    let mut merged = stream::select_all(streams);
    while let Some((label, line)) = merged.next().await {
        let line = line.map_err(Error::Logs)?;
        print_line(&label, &line, prefixed);
    }
    Ok(())
}

fn print_line(label: &str, line: &LogLine, prefixed: bool) {
    let content = line.content.trim_end_matches('\n');
    let text = if prefixed {
        format!("{label} | {content}")
    } else {
        content.to_string()
    };
    match line.stream {
        LogStream::Stdout => println!("{text}"),
        LogStream::Stderr => eprintln!("{text}"),
    }
}

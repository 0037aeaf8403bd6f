// ABOUTME: Entry point for the deployctl CLI application.
// ABOUTME: Parses arguments, builds the run context and dispatches to command handlers.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use deployctl::config::Config;
use deployctl::context::{ConfigContext, ForceFlags};
use deployctl::deploy::CancelFlag;
use deployctl::error::{EXIT_CANCELLED, Result};
use deployctl::output::{Output, OutputMode};
use deployctl::types::EnvironmentName;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins over the verbose flag
    let default_filter = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mode = output_mode(&cli);
    if let Err(e) = run(cli, mode).await {
        Output::new(mode).error(&e.to_string());
        std::process::exit(e.exit_code());
    }
}

fn output_mode(cli: &Cli) -> OutputMode {
    if cli.json {
        OutputMode::Json
    } else if cli.quiet {
        OutputMode::Quiet
    } else {
        OutputMode::Normal
    }
}

async fn run(cli: Cli, mode: OutputMode) -> Result<()> {
    let output = Output::new(mode);
    let root = std::fs::canonicalize(&cli.project_root).unwrap_or_else(|_| cli.project_root.clone());
    let config = Config::discover(&root)?;

    match cli.command {
        Commands::Deploy {
            target,
            app_version,
            force,
            recreate_secrets,
            force_lock,
        } => {
            let environment = EnvironmentName::new(target.as_deref().unwrap_or(&cli.env_name))?;
            let force = match force {
                Some(list) => ForceFlags::parse(&list)?,
                None => ForceFlags::default(),
            }
            .with_recreate_secrets(recreate_secrets);
            let ctx = ConfigContext::new(root, environment, &app_version, &config)?.with_force(force);

            let cancel = CancelFlag::new();
            watch_interrupts(cancel.clone());
            commands::deploy(&ctx, force_lock, cancel, output).await
        }
        Commands::Rollback {
            backup_dir,
            force,
            force_lock,
        } => {
            let ctx = context(root, &cli.env_name, &config)?;
            commands::rollback(&ctx, &backup_dir, force, force_lock, output).await
        }
        Commands::Validate { strict } => {
            let ctx = context(root, &cli.env_name, &config)?;
            commands::validate(&ctx, strict, output).await
        }
        Commands::Status { lines } => {
            let ctx = context(root, &cli.env_name, &config)?;
            commands::status(&ctx, lines, output).await
        }
        Commands::Logs {
            service,
            tail,
            no_follow,
        } => {
            let ctx = context(root, &cli.env_name, &config)?;
            commands::logs(&ctx, service.as_deref(), tail, !no_follow, output).await
        }
        Commands::Stop => {
            let ctx = context(root, &cli.env_name, &config)?;
            commands::stop(&ctx, output).await
        }
        Commands::Clean { yes } => {
            let ctx = context(root, &cli.env_name, &config)?;
            commands::clean(&ctx, yes, output).await
        }
    }
}

/// Context for commands that do not start a new deployment.
fn context(root: PathBuf, environment: &str, config: &Config) -> Result<ConfigContext> {
    let environment = EnvironmentName::new(environment)?;
    ConfigContext::new(root, environment, ConfigContext::DEFAULT_VERSION, config)
}

/// First Ctrl-C stops the deploy before the next module; a second one exits at once.
fn watch_interrupts(cancel: CancelFlag) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        eprintln!("Interrupted: stopping before the next module (Ctrl-C again to abort now)");
        cancel.cancel();
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(EXIT_CANCELLED);
        }
    });
}

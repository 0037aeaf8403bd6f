// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "deployctl")]
#[command(about = "Single-host deployment orchestrator for Docker Compose stacks")]
#[command(version)]
pub struct Cli {
    /// Project root holding deployctl.yml and the generated stack
    #[arg(long, global = true, env = "PROJECT_ROOT", default_value = ".")]
    pub project_root: PathBuf,

    /// Target environment
    #[arg(
        long = "environment",
        global = true,
        env = "ENVIRONMENT",
        default_value = "production"
    )]
    pub env_name: String,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Minimal output for CI (only final result)
    #[arg(short, long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    /// Output results as JSON lines
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Provision and start the stack, module by module
    Deploy {
        /// Target environment (defaults to --environment / ENVIRONMENT)
        #[arg(value_name = "ENVIRONMENT")]
        target: Option<String>,

        /// Application version recorded in markers and the state log
        #[arg(long = "app-version", env = "VERSION", default_value = "latest")]
        app_version: String,

        /// Re-run modules even if already at this version ("all" or a comma list)
        #[arg(long, env = "FORCE_REINIT")]
        force: Option<String>,

        /// Regenerate existing secrets and reissue the server certificate (the CA is kept)
        #[arg(long, env = "FORCE_RECREATE_SECRETS")]
        recreate_secrets: bool,

        /// Break an existing deploy lock
        #[arg(long)]
        force_lock: bool,
    },

    /// Restore the compose and env files from a backup directory
    Rollback {
        /// Backup directory written at the start of a deploy
        backup_dir: PathBuf,

        /// Roll back even if the backup is not from the latest run
        #[arg(long)]
        force: bool,

        /// Break an existing deploy lock
        #[arg(long)]
        force_lock: bool,
    },

    /// Probe every health target once
    Validate {
        /// Exit non-zero when any target fails
        #[arg(long)]
        strict: bool,
    },

    /// Show the state log and running services
    Status {
        /// Number of state log lines to show
        #[arg(long, default_value_t = 20)]
        lines: usize,
    },

    /// Show logs from a service
    Logs {
        /// Compose service name (all project services when omitted)
        service: Option<String>,

        /// Number of lines to show from the end
        #[arg(long, default_value_t = 100)]
        tail: u64,

        /// Print the current logs and exit
        #[arg(long)]
        no_follow: bool,
    },

    /// Stop all services, keeping containers and volumes
    Stop,

    /// Remove containers, volumes and deploy state
    Clean {
        /// Do not ask for confirmation
        #[arg(long)]
        yes: bool,
    },
}

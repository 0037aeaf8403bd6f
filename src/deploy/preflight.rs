// ABOUTME: Pre-flight checks run before anything is touched.
// ABOUTME: Every check runs; all failures are reported together in one PreflightError.

use crate::context::ConfigContext;
use crate::diagnostics::{Diagnostics, Warning};
use crate::exec::{CommandRunner, CommandSpec};
use crate::modules::ModuleKind;
use crate::runtime::{ContainerRuntime, RuntimeInfo};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

const GB: u64 = 1024 * 1024 * 1024;

/// One failed pre-flight check.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PreflightProblem {
    #[error("required tool `{tool}` is not callable: {reason}")]
    ToolMissing { tool: String, reason: String },

    #[error("`{program} compose` is not available: {reason}")]
    ComposeUnavailable { program: String, reason: String },

    #[error("container runtime unreachable: {0}")]
    RuntimeUnreachable(String),

    #[error("only {available_gb} GB free on {path}, at least {required_gb} GB required")]
    LowDisk {
        path: PathBuf,
        available_gb: u64,
        required_gb: u64,
    },

    #[error("cannot determine free disk space on {path}: {reason}")]
    DiskUnknown { path: PathBuf, reason: String },

    #[error("unknown module '{0}'")]
    UnknownModule(String),

    #[error("module '{0}' is declared more than once")]
    DuplicateModule(String),

    #[error("no modules declared")]
    NoModules,
}

/// Aggregated pre-flight failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreflightError {
    pub problems: Vec<PreflightProblem>,
}

impl PreflightError {
    pub fn new(problems: Vec<PreflightProblem>) -> Self {
        Self { problems }
    }
}

impl fmt::Display for PreflightError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "preflight failed with {} problem(s)", self.problems.len())?;
        for problem in &self.problems {
            write!(f, "\n  - {problem}")?;
        }
        Ok(())
    }
}

impl std::error::Error for PreflightError {}

/// Pre-flight checks for one run.
pub struct Preflight<'a> {
    ctx: &'a ConfigContext,
    runner: &'a dyn CommandRunner,
    runtime: &'a dyn ContainerRuntime,
}

impl<'a> Preflight<'a> {
    pub fn new(
        ctx: &'a ConfigContext,
        runner: &'a dyn CommandRunner,
        runtime: &'a dyn ContainerRuntime,
    ) -> Self {
        Self {
            ctx,
            runner,
            runtime,
        }
    }

    /// Run every check. Returns the modules to execute, in declared order.
    pub async fn run(&self, diag: &mut Diagnostics) -> Result<Vec<ModuleKind>, PreflightError> {
        let config = &self.ctx.config;
        let mut problems = Vec::new();

        for tool in &config.preflight.required_tools {
            let spec = CommandSpec::new(tool)
                .arg("--version")
                .timeout(Duration::from_secs(15));
            if let Err(reason) = self.probe(&spec).await {
                problems.push(PreflightProblem::ToolMissing {
                    tool: tool.clone(),
                    reason,
                });
            }
        }

        if let Err(reason) = self.probe(&self.ctx.compose().version()).await {
            problems.push(PreflightProblem::ComposeUnavailable {
                program: config.compose.program.clone(),
                reason,
            });
        }

        if let Err(e) = self.runtime.ping().await {
            problems.push(PreflightProblem::RuntimeUnreachable(e.to_string()));
        }

        if let Some(problem) = check_disk(self.ctx.project_root(), config.preflight.min_disk_gb) {
            problems.push(problem);
        }

        let plan = match resolve_modules(&config.modules) {
            Ok(plan) => plan,
            Err(mut module_problems) => {
                problems.append(&mut module_problems);
                Vec::new()
            }
        };

        check_memory(config.preflight.min_memory_gb, diag);

        if problems.is_empty() {
            tracing::info!("preflight: ok, {} module(s) planned", plan.len());
            Ok(plan)
        } else {
            Err(PreflightError::new(problems))
        }
    }

    async fn probe(&self, spec: &CommandSpec) -> Result<(), String> {
        match self.runner.run(spec).await {
            Ok(output) if output.success() => Ok(()),
            Ok(output) => Err(format!(
                "`{spec}` exited with {}",
                output
                    .code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".into())
            )),
            Err(e) => Err(e.to_string()),
        }
    }
}

/// Resolve declared module names to the fixed execution order.
pub fn resolve_modules(names: &[String]) -> Result<Vec<ModuleKind>, Vec<PreflightProblem>> {
    let mut problems = Vec::new();
    let mut seen = HashSet::new();
    for name in names {
        match name.parse::<ModuleKind>() {
            Ok(module) => {
                if !seen.insert(module) {
                    problems.push(PreflightProblem::DuplicateModule(name.clone()));
                }
            }
            Err(_) => problems.push(PreflightProblem::UnknownModule(name.clone())),
        }
    }
    if names.is_empty() {
        problems.push(PreflightProblem::NoModules);
    }
    if !problems.is_empty() {
        return Err(problems);
    }
    Ok(ModuleKind::ALL
        .into_iter()
        .filter(|m| seen.contains(m))
        .collect())
}

fn check_disk(root: &Path, min_gb: u64) -> Option<PreflightProblem> {
    if min_gb == 0 {
        return None;
    }
    // A fresh project root may not exist yet; measure its nearest existing ancestor.
    let existing = root.ancestors().find(|p| p.exists()).unwrap_or(root);
    match available_bytes(existing) {
        Ok(bytes) if bytes < min_gb * GB => Some(PreflightProblem::LowDisk {
            path: existing.to_path_buf(),
            available_gb: bytes / GB,
            required_gb: min_gb,
        }),
        Ok(_) => None,
        Err(reason) => Some(PreflightProblem::DiskUnknown {
            path: existing.to_path_buf(),
            reason,
        }),
    }
}

fn available_bytes(path: &Path) -> Result<u64, String> {
    let stat = nix::sys::statvfs::statvfs(path).map_err(|e| e.to_string())?;
    #[allow(clippy::unnecessary_cast)]
    let bytes = stat.blocks_available() as u64 * stat.fragment_size() as u64;
    Ok(bytes)
}

fn check_memory(min_gb: u64, diag: &mut Diagnostics) {
    if min_gb == 0 {
        return;
    }
    let Ok(meminfo) = std::fs::read_to_string("/proc/meminfo") else {
        tracing::debug!("preflight: /proc/meminfo unreadable, skipping memory check");
        return;
    };
    if let Some(kb) = mem_available_kb(&meminfo)
        && kb * 1024 < min_gb * GB
    {
        diag.warn(Warning::resources(format!(
            "only {:.1} GB memory available, {} GB recommended",
            kb as f64 / (1024.0 * 1024.0),
            min_gb
        )));
    }
}

fn mem_available_kb(meminfo: &str) -> Option<u64> {
    meminfo
        .lines()
        .find_map(|line| line.strip_prefix("MemAvailable:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|n| n.parse().ok())
}

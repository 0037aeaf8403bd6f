// ABOUTME: Builders for `docker compose` invocations against the project stack.
// ABOUTME: Produces CommandSpecs; running them is the caller's business.

use std::path::{Path, PathBuf};
use std::time::Duration;

use super::command::CommandSpec;

/// The compose stack of one project root.
#[derive(Debug, Clone)]
pub struct Compose {
    program: String,
    file: PathBuf,
    project: String,
    cwd: PathBuf,
    timeout: Duration,
}

impl Compose {
    pub fn new(program: &str, file: &Path, project: &str, cwd: &Path) -> Self {
        Self {
            program: program.to_string(),
            file: file.to_path_buf(),
            project: project.to_string(),
            cwd: cwd.to_path_buf(),
            timeout: Duration::from_secs(600),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    fn base(&self) -> CommandSpec {
        CommandSpec::new(&self.program)
            .arg("compose")
            .arg("-f")
            .arg(self.file.to_string_lossy())
            .arg("-p")
            .arg(&self.project)
            .cwd(&self.cwd)
            .timeout(self.timeout)
    }

    /// `compose version`, used by preflight.
    pub fn version(&self) -> CommandSpec {
        CommandSpec::new(&self.program)
            .args(["compose", "version"])
            .timeout(Duration::from_secs(15))
    }

    /// Start the given services detached.
    pub fn up<S: AsRef<str>>(&self, services: &[S]) -> CommandSpec {
        self.base()
            .args(["up", "-d", "--remove-orphans"])
            .args(services.iter().map(|s| s.as_ref().to_string()))
    }

    /// Stop all services, keeping containers and volumes.
    pub fn stop(&self) -> CommandSpec {
        self.base().arg("stop")
    }

    /// Remove containers; `volumes` also removes named volumes.
    pub fn down(&self, volumes: bool) -> CommandSpec {
        let spec = self.base().arg("down");
        if volumes {
            spec.args(["--volumes", "--remove-orphans"])
        } else {
            spec
        }
    }
}

// ABOUTME: Production command runner backed by tokio::process.
// ABOUTME: Captures stdout/stderr and enforces optional per-command timeouts.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

use super::command::{CommandOutput, CommandRunner, CommandSpec, CommandError};

/// Spawns real processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        tracing::debug!("exec: {}", spec);

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref dir) = spec.cwd {
            cmd.current_dir(dir);
        }

        let output = cmd.output();
        let output = match spec.timeout {
            Some(limit) => tokio::time::timeout(limit, output)
                .await
                .map_err(|_| CommandError::Timeout {
                    command: spec.to_string(),
                    after: limit,
                })?,
            None => output.await,
        }
        .map_err(|source| CommandError::Spawn {
            command: spec.to_string(),
            source,
        })?;

        let result = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };

        if !result.success() {
            tracing::debug!("exec failed ({:?}): {}", result.code, spec);
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let runner = ProcessRunner::new();
        let spec = CommandSpec::new("sh").args(["-c", "echo hello; exit 3"]);

        let output = runner.run(&spec).await.unwrap();

        assert_eq!(output.code, Some(3));
        assert_eq!(output.stdout.trim(), "hello");
        assert!(runner.run_checked(&spec).await.is_err());
    }

    #[tokio::test]
    async fn passes_env_to_child() {
        let runner = ProcessRunner::new();
        let spec = CommandSpec::new("sh")
            .args(["-c", "printf %s \"$TOKEN\""])
            .env("TOKEN", "abc");

        let output = runner.run_checked(&spec).await.unwrap();
        assert_eq!(output.stdout, "abc");
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let runner = ProcessRunner::new();
        let spec = CommandSpec::new("definitely-not-a-real-binary-4471");

        let err = runner.run(&spec).await.unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
    }

    #[tokio::test]
    async fn timeout_is_reported() {
        let runner = ProcessRunner::new();
        let spec = CommandSpec::new("sleep")
            .arg("5")
            .timeout(Duration::from_millis(100));

        let err = runner.run(&spec).await.unwrap_err();
        assert!(matches!(err, CommandError::Timeout { .. }));
    }
}

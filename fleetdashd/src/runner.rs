//! Subprocess execution with bounded timeouts.
//!
//! Git lookups and host metrics go through [`CommandRunner`] so handlers
//! never spawn processes directly.

use async_trait::async_trait;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Captured result of a finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {}ms", timeout.as_millis())]
    TimedOut { program: String, timeout: Duration },
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, waiting at most `timeout`.
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, CommandError>;
}

/// Runs real processes via `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, CommandError> {
        let started = Instant::now();
        let child = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(timeout, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(CommandError::Spawn {
                    program: program.to_string(),
                    source,
                });
            }
            Err(_) => {
                return Err(CommandError::TimedOut {
                    program: program.to_string(),
                    timeout,
                });
            }
        };

        debug!(
            program,
            code = ?output.status.code(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Command finished"
        );

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use fleetdash_common::test_guard;

    #[tokio::test]
    async fn test_system_runner_captures_stdout() {
        let _guard = test_guard!();
        let out = SystemRunner
            .run("echo", &["fleetdash".to_string()], Duration::from_secs(5))
            .await
            .unwrap();
        assert!(out.success);
        assert_eq!(out.stdout.trim(), "fleetdash");
    }

    #[tokio::test]
    async fn test_system_runner_reports_nonzero_exit() {
        let _guard = test_guard!();
        let out = SystemRunner
            .run("false", &[], Duration::from_secs(5))
            .await
            .unwrap();
        assert!(!out.success);
        assert_eq!(out.code, Some(1));
    }

    #[tokio::test]
    async fn test_system_runner_times_out() {
        let _guard = test_guard!();
        let err = SystemRunner
            .run("sleep", &["5".to_string()], Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::TimedOut { .. }));
    }

    #[tokio::test]
    async fn test_system_runner_spawn_failure() {
        let _guard = test_guard!();
        let err = SystemRunner
            .run("fleetdash-no-such-binary", &[], Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_recording_runner_prefers_longest_match() {
        let _guard = test_guard!();
        let runner = recording::RecordingRunner::new();
        runner.respond("git", "generic");
        runner.respond("--format=%B", "message");
        let out = runner
            .run(
                "git",
                &["show".to_string(), "--format=%B".to_string()],
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert_eq!(out.stdout, "message");
        assert_eq!(runner.calls().len(), 1);
    }
}

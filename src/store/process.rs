use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use log::{debug, warn};
use tokio::process::Command;

use crate::error::{ResolveError, ResolveResult};
use crate::logic::ReasonerCommand;
use crate::store::traits::ProcessRunner;

/// Spawns the reasoner directly (no shell) and waits for it with a deadline.
#[derive(Debug, Clone)]
pub struct TokioProcessRunner {
    timeout: Duration,
    working_dir: Option<PathBuf>,
}

impl TokioProcessRunner {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            working_dir: None,
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

fn failure(message: String, stderr: String) -> ResolveError {
    ResolveError::ProcessFailure { message, stderr }
}

#[async_trait::async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, command: &ReasonerCommand) -> ResolveResult<String> {
        debug!("Running {}", command);

        let mut process = Command::new(&command.program);
        process
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            process.current_dir(dir);
        }

        let child = process.spawn().map_err(|e| {
            failure(
                format!("could not start '{}': {}", command.program, e),
                String::new(),
            )
        })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| {
                failure(
                    format!("'{}' could not be awaited: {}", command.program, e),
                    String::new(),
                )
            })?,
            Err(_) => {
                warn!(
                    "'{}' timed out after {:?}; process killed",
                    command.program, self.timeout
                );
                return Err(failure(
                    format!("'{}' timed out after {:?}", command.program, self.timeout),
                    String::new(),
                ));
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() {
            return Err(failure(
                format!("'{}' exited with {}", command.program, output.status),
                stderr,
            ));
        }
        if !stderr.is_empty() {
            debug!("{} stderr: {}", command.program, stderr.trim_end());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> ReasonerCommand {
        ReasonerCommand {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
        }
    }

    #[tokio::test]
    async fn captures_stdout() {
        let runner = TokioProcessRunner::new(Duration::from_secs(5));
        let out = runner.run(&sh("echo ':a :b :c.'")).await.unwrap();
        assert_eq!(out.trim(), ":a :b :c.");
    }

    #[tokio::test]
    async fn non_zero_exit_carries_stderr() {
        let runner = TokioProcessRunner::new(Duration::from_secs(5));
        let err = runner.run(&sh("echo broken >&2; exit 3")).await.unwrap_err();
        match err {
            ResolveError::ProcessFailure { stderr, .. } => assert_eq!(stderr.trim(), "broken"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_processes_time_out() {
        let runner = TokioProcessRunner::new(Duration::from_millis(100));
        let err = runner.run(&sh("sleep 5")).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn missing_program_fails_to_start() {
        let runner = TokioProcessRunner::new(Duration::from_secs(1));
        let command = ReasonerCommand {
            program: "definitely-not-a-reasoner".to_string(),
            args: Vec::new(),
        };
        let err = runner.run(&command).await.unwrap_err();
        assert_eq!(err.kind(), "ProcessFailure");
    }
}

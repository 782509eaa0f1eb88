//! `CommandRunner` backed by `tokio::process`.
//!
//! Every child gets a null stdin and piped stdout/stderr. A child that
//! outlives its budget is killed: the pending `wait_with_output` future owns
//! the `Child`, and dropping it on timeout triggers `kill_on_drop`.

use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::application::ports::CommandRunner;
use crate::domain::error::TimeoutError;

/// Budget for short probes such as `git --version`.
pub const DEFAULT_CMD_TIMEOUT: Duration = Duration::from_secs(15);

/// Production [`CommandRunner`].
pub struct TokioCommandRunner {
    default_timeout: Duration,
}

impl TokioCommandRunner {
    #[must_use]
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }

    async fn spawn_and_wait(
        program: &str,
        args: &[&str],
        cwd: Option<&Path>,
        timeout: Duration,
    ) -> Result<Output> {
        let mut command = tokio::process::Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }
        debug!(
            program,
            ?args,
            ?cwd,
            timeout_s = timeout.as_secs(),
            "exec"
        );

        let child = command
            .spawn()
            .with_context(|| format!("failed to spawn {program}"))?;
        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => output.with_context(|| format!("waiting for {program}")),
            Err(_) => {
                warn!(program, timeout_s = timeout.as_secs(), "exec: killed after timeout");
                Err(TimeoutError {
                    operation: program.to_string(),
                    limit: timeout,
                }
                .into())
            }
        }
    }
}

impl CommandRunner for TokioCommandRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output> {
        Self::spawn_and_wait(program, args, None, self.default_timeout).await
    }

    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output> {
        Self::spawn_and_wait(program, args, None, timeout).await
    }

    async fn run_in_dir(
        &self,
        program: &str,
        args: &[&str],
        cwd: &Path,
        timeout: Duration,
    ) -> Result<Output> {
        Self::spawn_and_wait(program, args, Some(cwd), timeout).await
    }
}

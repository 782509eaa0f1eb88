//! Application service: runtime environment preparation.
//!
//! Creates a Python virtualenv and installs dependencies, or runs a Node
//! package manager, inside an installed target. Every subprocess goes through
//! the injected `CommandRunner` with an explicit working directory and
//! timeout.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info, warn};

use matrix_common::{RunnerDescriptor, RunnerType};

use crate::application::ports::CommandRunner;
use crate::application::services::is_link;
use crate::domain::archive::{contained_join, reject_linked};
use crate::domain::error::{BuildError, TimeoutError, stderr_excerpt};
use crate::domain::pyproject::{PyprojectInstall, classify_pyproject};
use crate::domain::runner::{PackageManager, venv_python};

/// Makefile targets tried in order until one succeeds.
pub const MAKEFILE_TARGETS: &[&str] = &["install", "setup"];

/// What `prepare` did to a target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnvReport {
    pub python_prepared: bool,
    pub node_prepared: bool,
    pub notes: Vec<String>,
}

/// Prepares language runtimes for an installed runner.
pub struct EnvPreparer<'a, R: CommandRunner> {
    commands: &'a R,
    python_bin: &'a str,
}

impl<'a, R: CommandRunner> EnvPreparer<'a, R> {
    /// `python_bin` is the interpreter used to create virtualenvs.
    #[must_use]
    pub fn new(commands: &'a R, python_bin: &'a str) -> Self {
        Self {
            commands,
            python_bin,
        }
    }

    /// Prepare `target` for `runner`.
    ///
    /// # Errors
    ///
    /// Returns a `BuildError` for a failed install command, a `TimeoutError`
    /// when one exceeds `timeout`, and `FetchError::UnsafePath` for a venv
    /// directory outside the target.
    pub async fn prepare(
        &self,
        target: &Path,
        runner: &RunnerDescriptor,
        timeout: Duration,
    ) -> Result<EnvReport> {
        let mut report = EnvReport::default();
        let kind = runner.runner_type();
        info!(kind = %runner.kind, target = %target.display(), "env: preparing environment");

        match kind {
            Some(RunnerType::Python) => {
                self.prepare_python(target, runner, timeout).await?;
                report.python_prepared = true;
            }
            Some(RunnerType::Node) => {}
            None => {
                let note = format!("runner type '{}' has no environment to prepare", runner.kind);
                warn!("env: {note}");
                report.notes.push(note);
            }
        }

        let wants_node = kind == Some(RunnerType::Node)
            || (kind == Some(RunnerType::Python) && runner.node.is_some());
        if wants_node {
            match self.prepare_node(target, runner, timeout).await? {
                Ok(()) => report.node_prepared = true,
                Err(note) => {
                    warn!("env: {note}");
                    report.notes.push(note);
                }
            }
        }

        Ok(report)
    }

    async fn prepare_python(
        &self,
        target: &Path,
        runner: &RunnerDescriptor,
        timeout: Duration,
    ) -> Result<()> {
        let venv = contained_join(target, runner.venv_dir())?;
        reject_linked(target, &venv, is_link)?;
        if venv.exists() {
            debug!(venv = %venv.display(), "env: reusing existing venv");
        } else {
            info!(venv = %venv.display(), "env: creating venv");
            let venv_arg = venv.to_string_lossy();
            self.run_step(self.python_bin, &["-m", "venv", &*venv_arg], target, timeout)
                .await?;
        }

        let python = venv_python(&venv);
        let python = python.to_string_lossy();
        let py: &str = &python;

        if target.join("pyproject.toml").is_file() {
            let text = std::fs::read_to_string(target.join("pyproject.toml"))
                .map_err(|e| BuildError::Pyproject(e.to_string()))?;
            return match classify_pyproject(&text)? {
                PyprojectInstall::Dependencies(deps) if deps.is_empty() => {
                    info!("env: application-mode pyproject declares no dependencies");
                    Ok(())
                }
                PyprojectInstall::Dependencies(deps) => {
                    info!(count = deps.len(), "env: installing application dependencies");
                    let mut args = vec!["-m", "pip", "install"];
                    args.extend(deps.iter().map(String::as_str));
                    self.run_step(py, &args, target, timeout).await
                }
                PyprojectInstall::Project => {
                    info!("env: installing project with pip install .");
                    self.run_step(py, &["-m", "pip", "install", "."], target, timeout)
                        .await
                }
            };
        }

        if target.join("requirements.txt").is_file() {
            info!("env: installing requirements.txt");
            return self
                .run_step(
                    py,
                    &["-m", "pip", "install", "-r", "requirements.txt"],
                    target,
                    timeout,
                )
                .await;
        }

        if target.join("Makefile").is_file() {
            return self.run_make(target, timeout).await;
        }

        let declared = runner
            .python
            .as_ref()
            .map(|p| p.requirements.as_slice())
            .unwrap_or_default();
        if declared.is_empty() {
            debug!("env: no dependency files; checking pip");
            self.run_step(py, &["-m", "pip", "--version"], target, timeout)
                .await
        } else {
            info!(count = declared.len(), "env: installing runner-declared requirements");
            let mut args = vec!["-m", "pip", "install"];
            args.extend(declared.iter().map(String::as_str));
            self.run_step(py, &args, target, timeout).await
        }
    }

    async fn run_make(&self, target: &Path, timeout: Duration) -> Result<()> {
        for make_target in MAKEFILE_TARGETS.iter().copied() {
            info!(make_target, "env: trying make target");
            match self.run_step("make", &[make_target], target, timeout).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is::<TimeoutError>() => return Err(e),
                Err(e) => warn!("env: make {make_target} failed: {e}"),
            }
        }
        Err(BuildError::MakeTargetsFailed {
            tried: MAKEFILE_TARGETS.iter().map(|t| (*t).to_string()).collect(),
        }
        .into())
    }

    /// Outer error is fatal; inner `Err` is a note for the report.
    async fn prepare_node(
        &self,
        target: &Path,
        runner: &RunnerDescriptor,
        timeout: Duration,
    ) -> Result<std::result::Result<(), String>> {
        let section = runner.node.clone().unwrap_or_default();
        let manager = match section.package_manager.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => match PackageManager::parse(name) {
                Some(pm) => pm,
                None => return Ok(Err(format!("unsupported node package manager '{name}'"))),
            },
            _ => match PackageManager::detect(|f| target.join(f).is_file()) {
                Some(pm) => pm,
                None => {
                    return Ok(Err(
                        "node requested but no package manager detected".to_string()
                    ));
                }
            },
        };

        let mut args = vec!["install"];
        args.extend(section.install_args.iter().map(String::as_str));
        info!(manager = manager.program(), "env: running node install");
        self.run_step(manager.program(), &args, target, timeout)
            .await?;
        Ok(Ok(()))
    }

    async fn run_step(
        &self,
        program: &str,
        args: &[&str],
        cwd: &Path,
        timeout: Duration,
    ) -> Result<()> {
        let command = std::iter::once(program)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        debug!(%command, cwd = %cwd.display(), timeout_s = timeout.as_secs(), "env: exec");

        let output = match self.commands.run_in_dir(program, args, cwd, timeout).await {
            Ok(output) => output,
            Err(e) if e.is::<TimeoutError>() => return Err(e),
            Err(e) => {
                return Err(BuildError::Spawn {
                    command,
                    reason: format!("{e:#}"),
                }
                .into());
            }
        };
        if output.status.success() {
            return Ok(());
        }
        Err(BuildError::CommandFailed {
            command,
            cwd: cwd.to_path_buf(),
            code: output.status.code(),
            stderr: stderr_excerpt(&output.stderr),
        }
        .into())
    }
}

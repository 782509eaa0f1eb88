//! Application service: install orchestration.
//!
//! Drives one build through `Planned → Materialized → EnvPrepared →
//! Complete`. Each stage consumes the previous stage's output and a failure
//! aborts the remaining stages. Filesystem effects are confined to the
//! target directory.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use matrix_common::runner::RUNNER_FILE;
use matrix_common::{ArtifactSpec, RunnerDescriptor};

use crate::application::ports::{ArtifactFetcher, CatalogClient, CommandRunner, ProgressReporter};
use crate::application::services::env_prepare::{EnvPreparer, EnvReport};
use crate::application::services::is_link;
use crate::domain::archive::{contained_join, reject_linked};
use crate::domain::config::MatrixConfig;
use crate::domain::plan::{InstallOutcome, file_bytes};
use crate::domain::runner::{check_runner, infer_runner, parse_runner};

/// Pipeline stages, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BuildStage {
    Planned,
    Materialized,
    EnvPrepared,
    Complete,
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Planned => "planned",
            Self::Materialized => "materialized",
            Self::EnvPrepared => "env-prepared",
            Self::Complete => "complete",
        })
    }
}

/// Summary of the materialize stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub files_written: usize,
    pub artifacts_fetched: usize,
    pub artifacts_skipped: usize,
    pub runner_path: Option<PathBuf>,
    pub notes: Vec<String>,
}

/// Everything one `build` produced.
#[derive(Debug, Clone, Serialize)]
pub struct BuildResult {
    pub id: String,
    pub target: PathBuf,
    pub plan: Value,
    pub build: BuildReport,
    pub env: EnvReport,
    pub runner: Option<RunnerDescriptor>,
}

/// Turns catalog plans into prepared install targets.
pub struct InstallOrchestrator<'a, C, F, R, P> {
    catalog: &'a C,
    fetcher: &'a F,
    commands: &'a R,
    reporter: &'a P,
    config: &'a MatrixConfig,
}

impl<'a, C, F, R, P> InstallOrchestrator<'a, C, F, R, P>
where
    C: CatalogClient,
    F: ArtifactFetcher,
    R: CommandRunner,
    P: ProgressReporter,
{
    #[must_use]
    pub fn new(
        catalog: &'a C,
        fetcher: &'a F,
        commands: &'a R,
        reporter: &'a P,
        config: &'a MatrixConfig,
    ) -> Self {
        Self {
            catalog,
            fetcher,
            commands,
            reporter,
            config,
        }
    }

    /// Ask the catalog for a plan and normalize it. No filesystem writes.
    ///
    /// # Errors
    ///
    /// Propagates catalog failures and returns `PlanError` for a response
    /// that is not a JSON object.
    pub async fn plan(&self, id: &str, target: &Path) -> Result<InstallOutcome> {
        info!(id, target = %target.display(), "plan: requesting install plan");
        let raw = self
            .catalog
            .install(id, target)
            .await
            .with_context(|| format!("requesting install plan for {id}"))?;
        let outcome = InstallOutcome::from_value(raw)?;
        debug!(
            files = outcome.files.len(),
            artifacts = outcome.artifacts.len(),
            skipped = outcome.skipped.len(),
            "plan: normalized"
        );
        Ok(outcome)
    }

    /// Write inline files, fetch artifacts and settle on a runner descriptor.
    ///
    /// # Errors
    ///
    /// Any file write or artifact fetch failure aborts the stage. Malformed
    /// artifact entries are skipped, not fatal.
    pub async fn materialize(&self, outcome: &InstallOutcome, target: &Path) -> Result<BuildReport> {
        std::fs::create_dir_all(target)
            .with_context(|| format!("creating target directory {}", target.display()))?;
        let mut report = BuildReport::default();

        for entry in &outcome.files {
            let path = contained_join(target, &entry.path)?;
            reject_linked(target, &path, is_link)?;
            let bytes = file_bytes(entry)?;
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating directory {}", parent.display()))?;
            }
            std::fs::write(&path, &bytes)
                .with_context(|| format!("writing file {}", path.display()))?;
            debug!(path = %path.display(), bytes = bytes.len(), "materialize: wrote file");
            report.files_written += 1;
        }

        for skipped in &outcome.skipped {
            let note = format!("skipped artifact #{}: {}", skipped.index, skipped.reason);
            warn!("materialize: {note}");
            self.reporter.warn(&note);
            report.notes.push(note);
        }
        report.artifacts_skipped = outcome.skipped.len();

        for artifact in &outcome.artifacts {
            match artifact {
                ArtifactSpec::Git(spec) => {
                    self.reporter.step(&format!("fetching git artifact {}", spec.repo));
                    self.fetcher
                        .fetch_git(spec, target)
                        .await
                        .with_context(|| format!("git artifact {}", spec.repo))?;
                }
                ArtifactSpec::Http(spec) => {
                    self.reporter.step(&format!("fetching {}", spec.url));
                    self.fetcher
                        .fetch_http(spec, target)
                        .await
                        .with_context(|| format!("http artifact {}", spec.url))?;
                }
            }
            report.artifacts_fetched += 1;
        }

        report.runner_path = self.materialize_runner(outcome, target)?;
        if report.runner_path.is_none() {
            report
                .notes
                .push("no valid runner descriptor found or inferred".to_string());
        }
        info!(
            files = report.files_written,
            artifacts = report.artifacts_fetched,
            "materialize: done"
        );
        Ok(report)
    }

    /// Plan object, then an existing runner file, then layout inference.
    fn materialize_runner(&self, outcome: &InstallOutcome, target: &Path) -> Result<Option<PathBuf>> {
        let standard = target.join(RUNNER_FILE);

        if let Some(raw) = &outcome.runner {
            let parsed = serde_json::from_value::<RunnerDescriptor>(raw.clone())
                .map_err(anyhow::Error::from)
                .and_then(|r| check_runner(&r).map(|()| r).map_err(anyhow::Error::from));
            match parsed {
                Ok(runner) => {
                    write_runner(target, &standard, &runner)?;
                    info!(path = %standard.display(), "runner: wrote runner.json from plan");
                    return Ok(Some(standard));
                }
                Err(e) => warn!("runner: plan.runner failed schema validation: {e}"),
            }
        }

        let file_name = outcome.runner_file.as_deref().unwrap_or(RUNNER_FILE);
        let candidate = contained_join(target, file_name)?;
        if candidate.is_file() {
            let bytes = std::fs::read(&candidate)
                .with_context(|| format!("reading {}", candidate.display()))?;
            match parse_runner(&candidate, &bytes) {
                Ok(runner) => {
                    if candidate != standard {
                        write_runner(target, &standard, &runner)?;
                        debug!("runner: mirrored custom runner file to runner.json");
                    }
                    info!(path = %candidate.display(), "runner: using existing runner file");
                    return Ok(Some(candidate));
                }
                Err(e) => warn!("runner: {} is unusable: {e}", candidate.display()),
            }
        }

        if let Some(runner) = infer_runner(|f| target.join(f).is_file()) {
            write_runner(target, &standard, &runner)?;
            info!(kind = %runner.kind, entry = %runner.entry, "runner: inferred runner.json");
            return Ok(Some(standard));
        }

        warn!("runner: no valid runner descriptor found and none could be inferred");
        Ok(None)
    }

    /// Prepare the runtime for `runner`. An absent or invalid descriptor is
    /// a no-op.
    ///
    /// # Errors
    ///
    /// Propagates `EnvPreparer` failures.
    pub async fn prepare_env(
        &self,
        target: &Path,
        runner: Option<&RunnerDescriptor>,
        timeout: Duration,
    ) -> Result<EnvReport> {
        let Some(runner) = runner.filter(|r| r.is_valid()) else {
            debug!("env: no runner descriptor; nothing to prepare");
            return Ok(EnvReport::default());
        };
        EnvPreparer::new(self.commands, &self.config.python_bin)
            .prepare(target, runner, timeout)
            .await
    }

    /// Run every stage for `id`.
    ///
    /// # Errors
    ///
    /// The first failing stage's error, typed by kind.
    pub async fn build(
        &self,
        id: &str,
        target: Option<&Path>,
        alias: Option<&str>,
        timeout: Duration,
    ) -> Result<BuildResult> {
        let target = match target {
            Some(t) => t.to_path_buf(),
            None => self.config.default_install_target(id, alias),
        };
        let target = std::path::absolute(&target)
            .with_context(|| format!("resolving target {}", target.display()))?;
        std::fs::create_dir_all(&target)
            .with_context(|| format!("creating target directory {}", target.display()))?;

        self.reporter.step(&format!("planning {id}"));
        let outcome = self.plan(id, &target).await?;
        info!(stage = %BuildStage::Planned, "build: stage reached");

        self.reporter.step("materializing files and artifacts");
        let build = self.materialize(&outcome, &target).await?;
        info!(stage = %BuildStage::Materialized, "build: stage reached");

        let runner_path = build
            .runner_path
            .clone()
            .filter(|p| p.is_file())
            .unwrap_or_else(|| target.join(RUNNER_FILE));
        let runner = if runner_path.is_file() {
            let bytes = std::fs::read(&runner_path)
                .with_context(|| format!("reading {}", runner_path.display()))?;
            Some(parse_runner(&runner_path, &bytes)?)
        } else {
            warn!("build: runner.json not found; environment preparation skipped");
            None
        };

        self.reporter.step("preparing environment");
        let env = self.prepare_env(&target, runner.as_ref(), timeout).await?;
        info!(stage = %BuildStage::EnvPrepared, "build: stage reached");

        self.reporter.success(&format!("built {id} in {}", target.display()));
        info!(
            stage = %BuildStage::Complete,
            id,
            files = build.files_written,
            artifacts = build.artifacts_fetched,
            python = env.python_prepared,
            node = env.node_prepared,
            "build: stage reached"
        );
        Ok(BuildResult {
            id: id.to_string(),
            target,
            plan: outcome.raw,
            build,
            env,
            runner,
        })
    }
}

/// Atomic write via temp file then rename. Neither file may be a link.
fn write_runner(target: &Path, path: &Path, runner: &RunnerDescriptor) -> Result<()> {
    let content = serde_json::to_string_pretty(runner).context("serializing runner descriptor")?;
    let temp_path = path.with_extension("json.tmp");
    reject_linked(target, &temp_path, is_link)?;
    reject_linked(target, path, is_link)?;
    std::fs::write(&temp_path, content)
        .with_context(|| format!("writing temp file {}", temp_path.display()))?;
    std::fs::rename(&temp_path, path)
        .with_context(|| format!("finalizing {}", path.display()))?;
    Ok(())
}

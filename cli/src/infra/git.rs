//! Git artifact fetching with a validated, argv-only git invocation.

use std::path::Path;
use std::process::Output;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use matrix_common::GitSpec;

use crate::application::ports::CommandRunner;
use crate::domain::config::GitPolicy;
use crate::domain::error::{FetchError, TimeoutError, stderr_excerpt};
use crate::domain::git::{ValidatedGit, head_matches, validate_git_spec};
use crate::infra::command_runner::DEFAULT_CMD_TIMEOUT;
use crate::infra::fs::{copy_tree, ensure_unlinked, remove_dir_quietly};

/// Prefix for ephemeral clone directories.
pub const CLONE_DIR_PREFIX: &str = "matrix-git-";

/// Materializes git artifacts through a `CommandRunner`.
pub struct GitFetcher<'a, R: CommandRunner> {
    runner: &'a R,
    policy: &'a GitPolicy,
}

impl<'a, R: CommandRunner> GitFetcher<'a, R> {
    #[must_use]
    pub fn new(runner: &'a R, policy: &'a GitPolicy) -> Self {
        Self { runner, policy }
    }

    /// Validate `spec`, clone it into a temporary directory and copy the
    /// checked-out tree (or `subdir`) into `target`.
    ///
    /// Validation failures spawn no subprocess. The temporary clone is
    /// removed whether or not the fetch succeeds.
    ///
    /// # Errors
    ///
    /// Returns a `FetchError` for policy violations and failed git steps,
    /// and a `TimeoutError` when a step exceeds the policy timeout.
    pub async fn fetch(&self, spec: &GitSpec, target: &Path) -> Result<()> {
        let git = validate_git_spec(spec, self.policy)?;
        std::fs::create_dir_all(target)
            .with_context(|| format!("creating target directory {}", target.display()))?;
        info!(
            repo = %git.repo,
            reference = %git.reference,
            depth = git.depth,
            subdir = git.subdir.as_deref().unwrap_or("-"),
            "git: cloning"
        );

        self.git("version", &["--version"], DEFAULT_CMD_TIMEOUT, None)
            .await?;

        let tmp = tempfile::Builder::new()
            .prefix(CLONE_DIR_PREFIX)
            .tempdir()
            .context("creating temporary clone directory")?;
        self.checkout(&git, tmp.path()).await?;

        let src = match &git.subdir {
            Some(sub) => tmp.path().join(sub),
            None => tmp.path().to_path_buf(),
        };
        ensure_unlinked(tmp.path(), &src)?;
        if !src.is_dir() {
            return Err(FetchError::SubdirNotFound {
                subdir: git.subdir.clone().unwrap_or_default(),
            }
            .into());
        }

        let exclude: &[&str] = if git.strip_vcs { &[".git"] } else { &[] };
        copy_tree(&src, target, exclude)?;
        if git.strip_vcs {
            remove_dir_quietly(&target.join(".git"));
        }
        info!(target = %target.display(), "git: materialized repository");
        Ok(())
    }

    async fn checkout(&self, git: &ValidatedGit, tmp: &Path) -> Result<()> {
        let timeout = self.policy.timeout;
        let tmp_arg = tmp.to_string_lossy();
        let tmp_arg: &str = &tmp_arg;
        let depth = git.depth.to_string();

        let mut clone = vec![
            "clone",
            "--filter=blob:none",
            "--no-checkout",
            "--depth",
            depth.as_str(),
        ];
        if git.recurse_submodules {
            clone.push("--recurse-submodules");
        }
        clone.push(git.repo.as_str());
        clone.push(tmp_arg);
        self.git("clone", &clone, timeout, Some(&git.repo)).await?;

        if let Some(subdir) = &git.subdir {
            self.git(
                "sparse-checkout init",
                &["-C", tmp_arg, "sparse-checkout", "init", "--cone"],
                timeout,
                None,
            )
            .await?;
            self.git(
                "sparse-checkout set",
                &["-C", tmp_arg, "sparse-checkout", "set", subdir],
                timeout,
                None,
            )
            .await?;
        }

        self.git(
            "checkout",
            &[
                "-C",
                tmp_arg,
                "-c",
                "advice.detachedHead=false",
                "checkout",
                "--detach",
                &git.reference,
            ],
            timeout,
            None,
        )
        .await?;

        if git.lfs
            && let Err(e) = self
                .git("lfs pull", &["-C", tmp_arg, "lfs", "pull"], timeout, None)
                .await
        {
            warn!("git: lfs pull failed (continuing): {e:#}");
        }

        if let Some(expected) = &git.verify_sha {
            let out = self
                .git(
                    "rev-parse",
                    &["-C", tmp_arg, "rev-parse", "--verify", "HEAD"],
                    timeout,
                    None,
                )
                .await?;
            let head = String::from_utf8_lossy(&out.stdout).trim().to_string();
            if !head_matches(&head, expected) {
                return Err(FetchError::HeadMismatch {
                    head: head.chars().take(12).collect(),
                    expected: expected.clone(),
                }
                .into());
            }
            debug!(%head, "git: HEAD verified");
        }
        Ok(())
    }

    /// Run one git step. `redact` is replaced by `<repo>` in logs and errors,
    /// and the final argument (the clone directory) by `<tmp>`.
    async fn git(
        &self,
        step: &str,
        args: &[&str],
        timeout: Duration,
        redact: Option<&str>,
    ) -> Result<Output> {
        let bin = self.policy.bin.as_str();
        if redact.is_some() {
            let shown: Vec<&str> = args
                .iter()
                .take(args.len().saturating_sub(2))
                .copied()
                .chain(["<repo>", "<tmp>"])
                .collect();
            debug!(argv = ?shown, "git: exec {bin}");
        } else {
            debug!(argv = ?args, "git: exec {bin}");
        }

        let output = match self.runner.run_with_timeout(bin, args, timeout).await {
            Ok(output) => output,
            Err(e) if e.is::<TimeoutError>() => {
                return Err(TimeoutError {
                    operation: format!("git {step}"),
                    limit: timeout,
                }
                .into());
            }
            Err(e) if step == "version" => {
                debug!("git: probe failed: {e:#}");
                return Err(FetchError::GitMissing {
                    bin: bin.to_string(),
                }
                .into());
            }
            Err(e) => return Err(e.context(format!("running git {step}"))),
        };

        if !output.status.success() {
            let mut stderr = stderr_excerpt(&output.stderr);
            if let Some(repo) = redact {
                stderr = stderr.replace(repo, "<repo>");
            }
            return Err(FetchError::Git {
                step: step.to_string(),
                code: output.status.code(),
                stderr,
            }
            .into());
        }
        let noise = String::from_utf8_lossy(&output.stderr);
        if !noise.trim().is_empty() {
            debug!(step, stderr = %noise.trim(), "git: stderr");
        }
        Ok(output)
    }
}

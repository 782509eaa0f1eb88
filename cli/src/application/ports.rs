//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain` and `matrix_common`, never
//! from `crate::infra`, `crate::commands`, or `crate::output`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use anyhow::Result;
use serde_json::Value;

use matrix_common::{GitSpec, HttpSpec, LockInfo};

// ── Command Runner Port ───────────────────────────────────────────────────────

/// Abstracts process execution so infrastructure can be swapped or mocked.
///
/// Programs are always invoked with an explicit argv, never through a shell.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run a program and capture its output.
    ///
    /// Implementations should delegate to `run_with_timeout` using the
    /// instance's configured default timeout.
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output>;
    /// Run a program with a custom timeout override.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned, and a
    /// `TimeoutError` if it exceeds `timeout`. On timeout, the child process
    /// must be killed (not left orphaned).
    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output>;
    /// Run a program in `cwd` with a timeout.
    async fn run_in_dir(
        &self,
        program: &str,
        args: &[&str],
        cwd: &Path,
        timeout: Duration,
    ) -> Result<Output>;
}

// ── Fetch Ports ───────────────────────────────────────────────────────────────

/// Downloads a whole HTTP(S) body into memory.
#[allow(async_fn_in_trait)]
pub trait Downloader {
    /// Fetch `url`, following redirects.
    ///
    /// # Errors
    ///
    /// `FetchError::Transport` / `FetchError::HttpStatus` on failure and
    /// `TimeoutError` when `timeout` elapses.
    async fn fetch_bytes(&self, url: &str, timeout: Duration) -> Result<Vec<u8>>;
}

/// Materializes one plan artifact under a target directory.
#[allow(async_fn_in_trait)]
pub trait ArtifactFetcher {
    /// Download, verify and optionally unpack an HTTP artifact.
    async fn fetch_http(&self, spec: &HttpSpec, target: &Path) -> Result<()>;
    /// Validate and check out a git artifact.
    async fn fetch_git(&self, spec: &GitSpec, target: &Path) -> Result<()>;
}

// ── Catalog Port ──────────────────────────────────────────────────────────────

/// The remote collaborator that issues install plans.
#[allow(async_fn_in_trait)]
pub trait CatalogClient {
    /// Ask for an install plan for `id` targeting `target`. Any JSON shape is
    /// accepted here; normalization happens in the orchestrator.
    async fn install(&self, id: &str, target: &Path) -> Result<Value>;
}

// ── Runtime Ports ─────────────────────────────────────────────────────────────

/// Abstracts lock-record persistence for supervised processes.
#[allow(async_fn_in_trait)]
pub trait LockStore {
    /// Path of the lock file for `alias`.
    fn lock_path(&self, alias: &str) -> PathBuf;
    /// Whether a lock file exists for `alias`.
    fn exists(&self, alias: &str) -> bool;
    /// Persist a new lock record.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::LockConflict` if a record already exists for
    /// the alias. Existing records are never overwritten.
    async fn create(&self, info: &LockInfo) -> Result<()>;
    /// Load the record for `alias`, `None` if absent. Corrupt records are
    /// errors.
    async fn load(&self, alias: &str) -> Result<Option<LockInfo>>;
    /// Delete the record for `alias`. Returns whether a file was removed.
    async fn remove(&self, alias: &str) -> Result<bool>;
    /// Every alias that currently has a lock file.
    async fn aliases(&self) -> Result<Vec<String>>;
}

/// What to launch for a supervised runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRequest {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// Added on top of the inherited environment.
    pub env: BTreeMap<String, String>,
    /// stdout and stderr are appended here.
    pub log_path: PathBuf,
}

/// Result of a termination request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Signalled,
    /// The process was already gone.
    NotFound,
}

/// OS process control for detached children.
pub trait ProcessControl {
    /// Start a child without waiting on it; returns its PID.
    ///
    /// # Errors
    ///
    /// Returns an error if the log file cannot be opened or the program
    /// cannot be spawned.
    fn spawn_detached(&self, request: &SpawnRequest) -> Result<u32>;
    /// Zero-cost liveness probe.
    fn is_alive(&self, pid: u32) -> bool;
    /// Ask the process, and every process it started in its group, to
    /// terminate.
    ///
    /// # Errors
    ///
    /// Returns an error only for failures other than "no such process".
    fn terminate(&self, pid: u32) -> Result<Termination>;
}

/// Local TCP port availability.
pub trait PortProbe {
    /// Whether `127.0.0.1:<port>` can be bound right now.
    fn is_free(&self, port: u16) -> bool;
}

/// HTTP health probing for `doctor`.
#[allow(async_fn_in_trait)]
pub trait HealthProbe {
    /// GET `url` and return the response status code.
    ///
    /// # Errors
    ///
    /// Returns an error if no response arrives (connection refused, timeout).
    async fn get_status(&self, url: &str, timeout: Duration) -> Result<u16>;
}

/// Reads a supervised process's log file.
pub trait LogReader {
    type Lines: Iterator<Item = String>;
    /// The last `n` lines of `path`; with `follow`, keep yielding appended
    /// lines until the caller stops iterating. A missing file yields nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read.
    fn tail(&self, path: &Path, follow: bool, n: usize) -> Result<Self::Lines>;
}

// ── Progress Reporting Port ───────────────────────────────────────────────────

/// Abstracts progress reporting so services can emit events without
/// depending on the Presentation layer. Sync trait, no async needed.
pub trait ProgressReporter {
    /// Emit an in-progress step message.
    fn step(&self, message: &str);
    /// Emit a success message.
    fn success(&self, message: &str);
    /// Emit a warning message.
    fn warn(&self, message: &str);
}

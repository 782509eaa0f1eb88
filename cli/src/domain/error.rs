//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All error types implement `thiserror::Error` and convert to `anyhow::Error`
//! via the `?` operator; callers recover the kind with `downcast_ref`.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

// ── Fetch errors ──────────────────────────────────────────────────────────────

/// Errors raised while downloading, verifying or unpacking artifacts.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("download failed for {url}: {reason}")]
    Transport { url: String, reason: String },

    #[error("http {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("sha256 mismatch for {url}: expected={expected} got={actual}")]
    ChecksumMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("refusing to write outside target: {}", .0.display())]
    UnsafePath(PathBuf),

    #[error("refusing to write through symlink: {}", .0.display())]
    LinkedPath(PathBuf),

    #[error("unsafe {kind} entry path: {entry}")]
    UnsafeEntry { kind: &'static str, entry: String },

    #[error("bad {kind} archive: {reason}")]
    BadArchive { kind: &'static str, reason: String },

    #[error("cannot unpack unknown archive type from {url}")]
    UnknownArchive { url: String },

    #[error("invalid inline content for {path}: {reason}")]
    InvalidContent { path: String, reason: String },

    #[error("repo must be an https URL (set MATRIX_GIT_ALLOW_INSECURE=1 to allow http): {repo}")]
    InsecureRepo { repo: String },

    #[error("host not allowed: {host}")]
    HostNotAllowed { host: String },

    #[error("invalid ref (unsafe characters): {reference:?}")]
    InvalidRef { reference: String },

    #[error("invalid subdir: {subdir:?}")]
    InvalidSubdir { subdir: String },

    #[error("forbidden key(s) present in git spec: {}", .keys.join(", "))]
    ForbiddenKeys { keys: Vec<String> },

    #[error("git {step} failed (exit {}): {stderr}", code.map_or_else(|| "signal".to_string(), |c| c.to_string()))]
    Git {
        step: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("git not found: install git or set MATRIX_GIT_BIN ({bin})")]
    GitMissing { bin: String },

    #[error("subdir not found in repository: {subdir}")]
    SubdirNotFound { subdir: String },

    #[error("HEAD {head} does not match verify_sha={expected}")]
    HeadMismatch { head: String, expected: String },
}

// ── Schema errors ─────────────────────────────────────────────────────────────

/// Errors about missing or invalid runner descriptors.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("runner.json not found in {}", .0.display())]
    MissingRunner(PathBuf),

    #[error("runner descriptor at {} is not valid JSON: {reason}", path.display())]
    InvalidJson { path: PathBuf, reason: String },

    #[error("runner descriptor is missing the required '{0}' field")]
    MissingField(&'static str),
}

// ── Build errors ──────────────────────────────────────────────────────────────

/// Errors from environment preparation subprocesses.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("`{command}` failed in {} (exit {}): {stderr}", cwd.display(), code.map_or_else(|| "signal".to_string(), |c| c.to_string()))]
    CommandFailed {
        command: String,
        cwd: PathBuf,
        code: Option<i32>,
        stderr: String,
    },

    #[error("cannot run `{command}`: {reason}")]
    Spawn { command: String, reason: String },

    #[error("Makefile present but no install target succeeded (tried: {})", .tried.join(", "))]
    MakeTargetsFailed { tried: Vec<String> },

    #[error("cannot parse pyproject.toml: {0}")]
    Pyproject(String),
}

// ── Runtime errors ────────────────────────────────────────────────────────────

/// Errors raised by the runtime supervisor.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Lock file already exists for alias '{alias}' at {}", path.display())]
    LockConflict { alias: String, path: PathBuf },

    #[error("Invalid alias '{0}': must match ^[A-Za-z0-9._-]{{1,64}}$")]
    InvalidAlias(String),

    #[error("Could not find an available port after trying {attempts} ports from {start}")]
    NoFreePort { start: u16, attempts: u32 },

    #[error("Unsupported runner type: '{0}'")]
    UnsupportedRunner(String),

    #[error(
        "Python executable not found in expected venv path: {}. Ensure the environment was prepared correctly.",
        .0.display()
    )]
    PythonNotFound(PathBuf),
}

// ── Plan errors ───────────────────────────────────────────────────────────────

/// Errors about the shape of a catalog response.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("unrecognized install plan: expected a JSON object, got {0}")]
    Unrecognized(&'static str),
}

// ── Timeout ───────────────────────────────────────────────────────────────────

/// A bounded operation exceeded its budget.
#[derive(Debug, Error)]
#[error("{operation} timed out after {}s", .limit.as_secs())]
pub struct TimeoutError {
    pub operation: String,
    pub limit: Duration,
}

/// Longest stderr excerpt carried in an error message.
pub const STDERR_EXCERPT_LEN: usize = 2000;

/// Trimmed, lossy UTF-8 tail of a subprocess stream.
#[must_use]
pub fn stderr_excerpt(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim();
    let count = trimmed.chars().count();
    if count <= STDERR_EXCERPT_LEN {
        return trimmed.to_string();
    }
    let tail: String = trimmed.chars().skip(count - STDERR_EXCERPT_LEN).collect();
    format!("...{tail}")
}

/// Classify an error chain into a stable machine-readable code.
#[must_use]
pub fn error_code(err: &anyhow::Error) -> &'static str {
    for cause in err.chain() {
        if cause.is::<TimeoutError>() {
            return "timeout";
        }
        if let Some(fetch) = cause.downcast_ref::<FetchError>() {
            return match fetch {
                FetchError::ChecksumMismatch { .. } => "checksum",
                _ => "fetch",
            };
        }
        if cause.is::<SchemaError>() {
            return "schema";
        }
        if cause.is::<BuildError>() {
            return "build";
        }
        if let Some(rt) = cause.downcast_ref::<RuntimeError>() {
            return match rt {
                RuntimeError::LockConflict { .. } => "lock_conflict",
                _ => "runtime",
            };
        }
        if cause.is::<PlanError>() {
            return "plan";
        }
    }
    "internal"
}

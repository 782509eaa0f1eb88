//! Runner descriptor rules: schema checks, layout inference, package
//! manager detection and alias validation.

use std::path::{Path, PathBuf};

use matrix_common::RunnerDescriptor;

use crate::domain::error::{RuntimeError, SchemaError};

/// Longest alias accepted for lock and log file names.
pub const MAX_ALIAS_LEN: usize = 64;

/// Parse and schema-check a runner descriptor read from `path`.
///
/// # Errors
///
/// Returns [`SchemaError::InvalidJson`] for unparsable bytes and
/// [`SchemaError::MissingField`] when `type` or `entry` is empty.
pub fn parse_runner(path: &Path, bytes: &[u8]) -> Result<RunnerDescriptor, SchemaError> {
    let runner: RunnerDescriptor =
        serde_json::from_slice(bytes).map_err(|e| SchemaError::InvalidJson {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    check_runner(&runner)?;
    Ok(runner)
}

/// Require non-empty `type` and `entry`.
///
/// # Errors
///
/// Returns [`SchemaError::MissingField`] naming the first empty field.
pub fn check_runner(runner: &RunnerDescriptor) -> Result<(), SchemaError> {
    if runner.kind.trim().is_empty() {
        return Err(SchemaError::MissingField("type"));
    }
    if runner.entry.trim().is_empty() {
        return Err(SchemaError::MissingField("entry"));
    }
    Ok(())
}

/// Guess a runner from the files present at the target root.
///
/// `server.py` wins over `server.js`/`package.json`. A node project without
/// `server.js` is assumed to start from `index.js`.
pub fn infer_runner(exists: impl Fn(&str) -> bool) -> Option<RunnerDescriptor> {
    if exists("server.py") {
        return Some(RunnerDescriptor::python("server.py"));
    }
    let has_server_js = exists("server.js");
    if has_server_js || exists("package.json") {
        let entry = if has_server_js { "server.js" } else { "index.js" };
        return Some(RunnerDescriptor::node(entry));
    }
    None
}

/// Node package managers detected by lock file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Npm,
    Pnpm,
    Yarn,
}

impl PackageManager {
    /// Parse an explicit `node.package_manager` value.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "npm" => Some(Self::Npm),
            "pnpm" => Some(Self::Pnpm),
            "yarn" => Some(Self::Yarn),
            _ => None,
        }
    }

    /// Executable name.
    #[must_use]
    pub fn program(self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::Pnpm => "pnpm",
            Self::Yarn => "yarn",
        }
    }

    /// `pnpm-lock.yaml` → pnpm, `yarn.lock` → yarn, `package.json` or
    /// `package-lock.json` → npm.
    pub fn detect(exists: impl Fn(&str) -> bool) -> Option<Self> {
        if exists("pnpm-lock.yaml") {
            Some(Self::Pnpm)
        } else if exists("yarn.lock") {
            Some(Self::Yarn)
        } else if exists("package-lock.json") || exists("package.json") {
            Some(Self::Npm)
        } else {
            None
        }
    }
}

/// Interpreter inside a virtualenv.
#[must_use]
pub fn venv_python(venv: &Path) -> PathBuf {
    if cfg!(windows) {
        venv.join("Scripts").join("python.exe")
    } else {
        venv.join("bin").join("python")
    }
}

/// Aliases name files under the state and log directories.
///
/// # Errors
///
/// Returns [`RuntimeError::InvalidAlias`] unless the alias is 1 to 64
/// characters of `[A-Za-z0-9._-]` and not `.` or `..`.
pub fn validate_alias(alias: &str) -> Result<(), RuntimeError> {
    let valid = !alias.is_empty()
        && alias.len() <= MAX_ALIAS_LEN
        && alias != "."
        && alias != ".."
        && alias
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(RuntimeError::InvalidAlias(alias.to_string()))
    }
}

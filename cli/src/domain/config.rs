//! Runtime configuration for the install engine and supervisor.
//!
//! Pure types only. `infra::config` layers defaults, the optional YAML file
//! and environment variables into a [`MatrixConfig`] once at startup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use matrix_common::lock::LOCK_FILE;

// ── Defaults ─────────────────────────────────────────────────────────────────

pub const DEFAULT_GIT_BIN: &str = "git";
pub const DEFAULT_ALLOWED_HOSTS: &[&str] = &["github.com", "gitlab.com", "bitbucket.org"];
pub const DEFAULT_GIT_TIMEOUT: Duration = Duration::from_secs(180);
pub const DEFAULT_HTTP_FETCH_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_ENV_TIMEOUT: Duration = Duration::from_secs(900);
pub const DEFAULT_PYTHON_BIN: &str = "python3";
pub const DEFAULT_NODE_BIN: &str = "node";
pub const DEFAULT_PORT: u16 = 6288;
pub const DEFAULT_HUB_URL: &str = "https://api.matrixhub.io";

// ── Config schema ────────────────────────────────────────────────────────────

/// Git fetch policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitPolicy {
    /// Executable used for every git invocation.
    pub bin: String,
    /// Hosts a repo URL may point at (exact or subdomain match).
    pub allowed_hosts: Vec<String>,
    /// Permit plain `http://` repo URLs.
    pub allow_insecure: bool,
    /// Budget for each git subprocess.
    pub timeout: Duration,
}

impl Default for GitPolicy {
    fn default() -> Self {
        Self {
            bin: DEFAULT_GIT_BIN.to_string(),
            allowed_hosts: DEFAULT_ALLOWED_HOSTS
                .iter()
                .map(|h| (*h).to_string())
                .collect(),
            allow_insecure: false,
            timeout: DEFAULT_GIT_TIMEOUT,
        }
    }
}

/// Immutable configuration built once at program start.
#[derive(Debug, Clone)]
pub struct MatrixConfig {
    /// Root for state, logs and default install targets.
    pub home: PathBuf,
    pub git: GitPolicy,
    pub http_fetch_timeout: Duration,
    pub env_timeout: Duration,
    pub python_bin: String,
    pub node_bin: String,
    pub default_port: u16,
    pub hub_url: String,
    pub hub_token: Option<String>,
}

impl MatrixConfig {
    /// Configuration rooted at `home` with every other field at its default.
    #[must_use]
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            git: GitPolicy::default(),
            http_fetch_timeout: DEFAULT_HTTP_FETCH_TIMEOUT,
            env_timeout: DEFAULT_ENV_TIMEOUT,
            python_bin: DEFAULT_PYTHON_BIN.to_string(),
            node_bin: DEFAULT_NODE_BIN.to_string(),
            default_port: DEFAULT_PORT,
            hub_url: DEFAULT_HUB_URL.to_string(),
            hub_token: None,
        }
    }

    #[must_use]
    pub fn state_dir(&self) -> PathBuf {
        self.home.join("state")
    }

    #[must_use]
    pub fn logs_dir(&self) -> PathBuf {
        self.home.join("logs")
    }

    /// `<home>/state/<alias>/runner.lock.json`
    #[must_use]
    pub fn lock_path(&self, alias: &str) -> PathBuf {
        self.state_dir().join(alias).join(LOCK_FILE)
    }

    /// `<home>/logs/<alias>.log`
    #[must_use]
    pub fn log_path(&self, alias: &str) -> PathBuf {
        self.logs_dir().join(format!("{alias}.log"))
    }

    /// Where `build` installs when no target is given.
    #[must_use]
    pub fn default_install_target(&self, id: &str, alias: Option<&str>) -> PathBuf {
        default_install_target(&self.home, id, alias)
    }
}

/// Optional overrides read from `<home>/config.yaml`.
///
/// Every field is optional; absent fields keep the built-in default.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FileConfig {
    pub git: FileGitConfig,
    /// Seconds.
    pub http_fetch_timeout: Option<u64>,
    /// Seconds.
    pub env_timeout: Option<u64>,
    pub python_bin: Option<String>,
    pub node_bin: Option<String>,
    pub default_port: Option<u16>,
    pub hub_url: Option<String>,
}

/// Git section of [`FileConfig`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FileGitConfig {
    pub bin: Option<String>,
    pub allowed_hosts: Option<Vec<String>>,
    pub allow_insecure: Option<bool>,
    /// Seconds.
    pub timeout: Option<u64>,
}

impl FileConfig {
    /// Apply the file's overrides on top of `cfg`.
    pub fn apply(&self, cfg: &mut MatrixConfig) {
        if let Some(bin) = &self.git.bin {
            cfg.git.bin.clone_from(bin);
        }
        if let Some(hosts) = &self.git.allowed_hosts {
            cfg.git.allowed_hosts = normalize_hosts(hosts.iter().map(String::as_str));
        }
        if let Some(insecure) = self.git.allow_insecure {
            cfg.git.allow_insecure = insecure;
        }
        if let Some(secs) = self.git.timeout {
            cfg.git.timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.http_fetch_timeout {
            cfg.http_fetch_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.env_timeout {
            cfg.env_timeout = Duration::from_secs(secs);
        }
        if let Some(python) = &self.python_bin {
            cfg.python_bin.clone_from(python);
        }
        if let Some(node) = &self.node_bin {
            cfg.node_bin.clone_from(node);
        }
        if let Some(port) = self.default_port {
            cfg.default_port = port;
        }
        if let Some(url) = &self.hub_url {
            cfg.hub_url.clone_from(url);
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Lowercase, trim and drop empty host entries.
pub fn normalize_hosts<'a>(hosts: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    hosts
        .into_iter()
        .map(|h| h.trim().to_ascii_lowercase())
        .filter(|h| !h.is_empty())
        .collect()
}

/// `1`, `true`, `yes` and `on` (any case) are truthy.
#[must_use]
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Replace every character outside `[A-Za-z0-9._-]` with `_`.
#[must_use]
pub fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

/// Split `kind:name@version` into `(name, version)`.
fn split_id(id: &str) -> (&str, Option<&str>) {
    let rest = id.split_once(':').map_or(id, |(_, rest)| rest);
    match rest.rsplit_once('@') {
        Some((name, version)) if !version.is_empty() => (name, Some(version)),
        Some((name, _)) => (name, None),
        None => (rest, None),
    }
}

/// `<home>/runners/<alias-or-name>/<version-or-latest>`.
#[must_use]
pub fn default_install_target(home: &Path, id: &str, alias: Option<&str>) -> PathBuf {
    let (name, version) = split_id(id);
    let leaf = alias.filter(|a| !a.trim().is_empty()).unwrap_or(name);
    home.join("runners")
        .join(sanitize_component(leaf))
        .join(sanitize_component(version.unwrap_or("latest")))
}

// ── Unit tests ───────────────────────────────────────────────────────────────

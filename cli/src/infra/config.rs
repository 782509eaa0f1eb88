//! Loads [`MatrixConfig`] from defaults, `<home>/config.yaml` and the
//! environment.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::domain::config::{FileConfig, MatrixConfig, is_truthy, normalize_hosts};

/// Name of the optional YAML file under the home directory.
pub const CONFIG_FILE: &str = "config.yaml";

/// Build the configuration once at startup.
///
/// `lookup` resolves environment variables; production passes
/// `|k| std::env::var(k).ok()`.
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined, the YAML file
/// exists but cannot be read or parsed, or a numeric variable is malformed.
pub fn load_config(lookup: impl Fn(&str) -> Option<String>) -> Result<MatrixConfig> {
    let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    let home = match var("MATRIX_HOME") {
        Some(home) => PathBuf::from(home),
        None => dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?
            .join(".matrix"),
    };
    let mut cfg = MatrixConfig::with_home(home);

    let path = cfg.home.join(CONFIG_FILE);
    if path.is_file() {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        let file: FileConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("cannot parse {}", path.display()))?;
        file.apply(&mut cfg);
    }

    if let Some(bin) = var("MATRIX_GIT_BIN") {
        cfg.git.bin = bin;
    }
    if let Some(hosts) = var("MATRIX_GIT_ALLOWED_HOSTS") {
        cfg.git.allowed_hosts = normalize_hosts(hosts.split(','));
    }
    if let Some(flag) = var("MATRIX_GIT_ALLOW_INSECURE") {
        cfg.git.allow_insecure = is_truthy(&flag);
    }
    if let Some(raw) = var("MATRIX_GIT_TIMEOUT") {
        cfg.git.timeout = parse_secs("MATRIX_GIT_TIMEOUT", &raw)?;
    }
    if let Some(raw) = var("MATRIX_HTTP_FETCH_TIMEOUT") {
        cfg.http_fetch_timeout = parse_secs("MATRIX_HTTP_FETCH_TIMEOUT", &raw)?;
    }
    if let Some(raw) = var("MATRIX_ENV_TIMEOUT") {
        cfg.env_timeout = parse_secs("MATRIX_ENV_TIMEOUT", &raw)?;
    }
    if let Some(python) = var("MATRIX_PYTHON") {
        cfg.python_bin = python;
    }
    if let Some(node) = var("NODE") {
        cfg.node_bin = node;
    }
    if let Some(raw) = var("MATRIX_DEFAULT_PORT") {
        cfg.default_port = raw
            .trim()
            .parse()
            .with_context(|| format!("MATRIX_DEFAULT_PORT must be a port number, got '{raw}'"))?;
    }
    if let Some(url) = var("MATRIX_HUB_BASE") {
        cfg.hub_url = url;
    }
    if let Some(token) = var("MATRIX_HUB_TOKEN") {
        cfg.hub_token = Some(token);
    }
    Ok(cfg)
}

fn parse_secs(key: &str, raw: &str) -> Result<Duration> {
    let secs: u64 = raw
        .trim()
        .parse()
        .with_context(|| format!("{key} must be a whole number of seconds, got '{raw}'"))?;
    Ok(Duration::from_secs(secs))
}

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// File name of the per-alias lock record under `<home>/state/<alias>/`.
pub const LOCK_FILE: &str = "runner.lock.json";

/// Identity of one supervised runner process.
///
/// Persisted as `<home>/state/<alias>/runner.lock.json`; its presence is the
/// source of truth for "this alias is running".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    pub alias: String,
    pub pid: u32,
    #[serde(default)]
    pub port: Option<u16>,
    pub started_at: DateTime<Utc>,
    pub target: PathBuf,
    pub runner_path: PathBuf,
}

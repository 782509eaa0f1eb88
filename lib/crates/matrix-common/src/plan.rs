//! Entry types found inside an install plan.
//!
//! Plans arrive as loosely shaped JSON; these parsers turn one entry into a
//! typed value or report it as unusable. Walking the plan tree itself is the
//! installer's job.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Keys that must never appear in a git spec: they would let a plan smuggle
/// shell behaviour into the fetcher.
pub const FORBIDDEN_GIT_KEYS: &[&str] = &["command", "shell", "args", "script"];

/// Content of an inline plan file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContent {
    Text(String),
    Base64(String),
    Empty,
}

/// One inline file to write under the install target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: String,
    pub content: FileContent,
}

impl FileEntry {
    /// Parse a `{path|rel|dest, content?, content_b64?}` object.
    ///
    /// Returns `None` when the value is not an object or names no path.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let path = ["path", "rel", "dest"]
            .iter()
            .find_map(|k| obj.get(*k).and_then(Value::as_str))
            .filter(|p| !p.trim().is_empty())?;
        let content = if let Some(b64) = obj.get("content_b64").and_then(Value::as_str) {
            FileContent::Base64(b64.to_string())
        } else if let Some(text) = obj.get("content").and_then(Value::as_str) {
            FileContent::Text(text.to_string())
        } else {
            FileContent::Empty
        };
        Some(Self {
            path: path.to_string(),
            content,
        })
    }
}

fn default_true() -> bool {
    true
}

/// Structured git artifact spec.
///
/// Unknown keys are kept in `extra` so validation can refuse specs that carry
/// any of [`FORBIDDEN_GIT_KEYS`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitSpec {
    pub repo: String,
    #[serde(rename = "ref", default)]
    pub reference: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<i64>,
    #[serde(default = "default_true")]
    pub strip_vcs: bool,
    #[serde(default)]
    pub recurse_submodules: bool,
    #[serde(default)]
    pub lfs: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify_sha: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl GitSpec {
    /// Forbidden keys present in this spec, in declaration order.
    #[must_use]
    pub fn forbidden_keys(&self) -> Vec<&'static str> {
        FORBIDDEN_GIT_KEYS
            .iter()
            .copied()
            .filter(|k| self.extra.contains_key(*k))
            .collect()
    }
}

/// HTTP(S) artifact: a file or archive fetched by URL.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HttpSpec {
    pub url: String,
    /// Relative path under the target where the raw bytes are written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default)]
    pub unpack: bool,
}

/// A fetchable plan artifact.
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactSpec {
    Git(GitSpec),
    Http(HttpSpec),
}

impl ArtifactSpec {
    /// Parse one entry of a plan's `artifacts` list.
    ///
    /// # Errors
    ///
    /// Returns a short description of why the entry is unusable; callers skip
    /// such entries with a warning.
    pub fn from_value(value: &Value) -> Result<Self, String> {
        let obj = value
            .as_object()
            .ok_or_else(|| "artifact entry is not an object".to_string())?;

        if obj.get("kind").and_then(Value::as_str) == Some("git") {
            let spec = obj
                .get("spec")
                .filter(|s| s.is_object())
                .ok_or_else(|| "git artifact has no structured 'spec' object".to_string())?;
            let git: GitSpec = serde_json::from_value(spec.clone())
                .map_err(|e| format!("git artifact spec is malformed: {e}"))?;
            if git.repo.trim().is_empty() {
                return Err("git artifact spec has an empty 'repo'".to_string());
            }
            return Ok(Self::Git(git));
        }

        if let Some(url) = obj.get("url").and_then(Value::as_str) {
            let url = url.trim();
            if url.is_empty() {
                return Err("artifact 'url' is empty".to_string());
            }
            let dest = ["path", "dest"]
                .iter()
                .find_map(|k| obj.get(*k).and_then(Value::as_str))
                .filter(|d| !d.trim().is_empty())
                .map(str::to_string);
            let sha256 = obj
                .get("sha256")
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
                .map(|s| s.trim().to_string());
            let unpack = obj.get("unpack").and_then(Value::as_bool).unwrap_or(false);
            return Ok(Self::Http(HttpSpec {
                url: url.to_string(),
                dest,
                sha256,
                unpack,
            }));
        }

        Err("artifact is neither kind=git nor url-based".to_string())
    }
}

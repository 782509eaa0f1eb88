use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default virtualenv directory, relative to the install target.
pub const DEFAULT_VENV: &str = ".venv";

/// File name of the persisted runner descriptor inside a target directory.
pub const RUNNER_FILE: &str = "runner.json";

/// Interpreter family a runner is executed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerType {
    Python,
    Node,
}

impl RunnerType {
    /// Parse the `type` field of a runner descriptor (case-insensitive).
    #[must_use]
    pub fn parse(kind: &str) -> Option<Self> {
        match kind.trim().to_ascii_lowercase().as_str() {
            "python" => Some(Self::Python),
            "node" => Some(Self::Node),
            _ => None,
        }
    }
}

/// Python section of `runner.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PythonSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venv: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requirements: Vec<String>,
}

/// Node section of `runner.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_manager: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub install_args: Vec<String>,
}

/// Runner descriptor persisted as `<target>/runner.json`.
///
/// This is the contract between the installer, which writes it, and the
/// supervisor, which executes it. Unknown keys are preserved in `extra` so a
/// descriptor survives a load/save cycle unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunnerDescriptor {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub entry: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python: Option<PythonSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<NodeSection>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl RunnerDescriptor {
    /// A descriptor is usable only when both `type` and `entry` are non-empty.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.kind.trim().is_empty() && !self.entry.trim().is_empty()
    }

    #[must_use]
    pub fn runner_type(&self) -> Option<RunnerType> {
        RunnerType::parse(&self.kind)
    }

    /// Virtualenv directory name, falling back to `.venv`.
    #[must_use]
    pub fn venv_dir(&self) -> &str {
        self.python
            .as_ref()
            .and_then(|p| p.venv.as_deref())
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(DEFAULT_VENV)
    }

    /// Python runner inferred from a `server.py` entry point.
    #[must_use]
    pub fn python(entry: &str) -> Self {
        Self {
            kind: "python".to_string(),
            entry: entry.to_string(),
            transport: Some("sse".to_string()),
            python: Some(PythonSection {
                venv: Some(DEFAULT_VENV.to_string()),
                requirements: Vec::new(),
            }),
            ..Self::default()
        }
    }

    /// Node runner inferred from `server.js` or `package.json`.
    #[must_use]
    pub fn node(entry: &str) -> Self {
        Self {
            kind: "node".to_string(),
            entry: entry.to_string(),
            transport: Some("sse".to_string()),
            node: Some(NodeSection::default()),
            ..Self::default()
        }
    }
}

//! Install plan normalization.
//!
//! The catalog returns loosely shaped JSON. [`InstallOutcome::from_value`] is
//! the one adapter that turns it into typed entries; nothing downstream looks
//! at the raw value again except to echo it back in build results.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;

use matrix_common::{ArtifactSpec, FileContent, FileEntry};

use crate::domain::error::{FetchError, PlanError};

/// An artifact entry that could not be parsed, kept for reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedArtifact {
    pub index: usize,
    pub reason: String,
}

/// Typed view of one catalog install response.
#[derive(Debug, Clone)]
pub struct InstallOutcome {
    /// The response exactly as received.
    pub raw: Value,
    pub files: Vec<FileEntry>,
    pub artifacts: Vec<ArtifactSpec>,
    pub skipped: Vec<SkippedArtifact>,
    /// `plan.runner`, unvalidated.
    pub runner: Option<Value>,
    /// `plan.runner_file`, a target-relative file name.
    pub runner_file: Option<String>,
}

impl InstallOutcome {
    /// Normalize a catalog response.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::Unrecognized`] if the top level is not an object.
    pub fn from_value(raw: Value) -> Result<Self, PlanError> {
        let Some(top) = raw.as_object() else {
            return Err(PlanError::Unrecognized(json_kind(&raw)));
        };
        let plan = top.get("plan").and_then(Value::as_object);

        let mut file_lists: Vec<&Value> = Vec::new();
        file_lists.extend(top.get("files"));
        file_lists.extend(plan.and_then(|p| p.get("files")));
        if let Some(results) = top.get("results").and_then(Value::as_array) {
            file_lists.extend(results.iter().filter_map(|step| step.get("files")));
        }
        let files = file_lists
            .into_iter()
            .filter_map(Value::as_array)
            .flatten()
            .filter_map(FileEntry::from_value)
            .collect();

        let artifact_list = plan
            .and_then(|p| p.get("artifacts"))
            .and_then(Value::as_array)
            .or_else(|| top.get("artifacts").and_then(Value::as_array));
        let mut artifacts = Vec::new();
        let mut skipped = Vec::new();
        for (index, entry) in artifact_list.into_iter().flatten().enumerate() {
            match ArtifactSpec::from_value(entry) {
                Ok(spec) => artifacts.push(spec),
                Err(reason) => skipped.push(SkippedArtifact { index, reason }),
            }
        }

        let runner = plan
            .and_then(|p| p.get("runner"))
            .filter(|r| !r.is_null())
            .cloned();
        let runner_file = plan
            .and_then(|p| p.get("runner_file"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Ok(Self {
            files,
            artifacts,
            skipped,
            runner,
            runner_file,
            raw,
        })
    }
}

/// Decode an inline file's content into the bytes to write.
///
/// # Errors
///
/// Returns [`FetchError::InvalidContent`] if `content_b64` is not valid base64.
pub fn file_bytes(entry: &FileEntry) -> Result<Vec<u8>, FetchError> {
    match &entry.content {
        FileContent::Text(text) => Ok(text.clone().into_bytes()),
        FileContent::Empty => Ok(Vec::new()),
        FileContent::Base64(encoded) => {
            let compact: String = encoded.split_whitespace().collect();
            STANDARD
                .decode(compact)
                .map_err(|e| FetchError::InvalidContent {
                    path: entry.path.clone(),
                    reason: e.to_string(),
                })
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

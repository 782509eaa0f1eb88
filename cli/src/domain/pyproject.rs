//! `pyproject.toml` interpretation for environment preparation.

use crate::domain::error::BuildError;

/// How a `pyproject.toml` should be installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PyprojectInstall {
    /// Poetry application mode: install these requirement strings directly.
    Dependencies(Vec<String>),
    /// A regular package: `pip install .`.
    Project,
}

/// Classify a `pyproject.toml`.
///
/// # Errors
///
/// Returns [`BuildError::Pyproject`] if the text is not valid TOML.
pub fn classify_pyproject(text: &str) -> Result<PyprojectInstall, BuildError> {
    let doc: toml::Table = text
        .parse()
        .map_err(|e: toml::de::Error| BuildError::Pyproject(e.message().to_string()))?;

    let poetry = doc
        .get("tool")
        .and_then(|t| t.get("poetry"))
        .and_then(toml::Value::as_table);
    let Some(poetry) = poetry else {
        return Ok(PyprojectInstall::Project);
    };
    if poetry.get("package-mode").and_then(toml::Value::as_bool) != Some(false) {
        return Ok(PyprojectInstall::Project);
    }

    let deps = poetry
        .get("dependencies")
        .and_then(toml::Value::as_table)
        .map(|table| {
            table
                .iter()
                .filter(|(name, _)| !name.eq_ignore_ascii_case("python"))
                .map(|(name, spec)| poetry_requirement(name, spec))
                .collect()
        })
        .unwrap_or_default();
    Ok(PyprojectInstall::Dependencies(deps))
}

/// Convert one Poetry dependency into a pip requirement string.
///
/// `^x` → `>=x`, `~x` → `~=x`, a bare version → `==x`, `*` → the name
/// alone. Table form uses its `version` key; tables without one (git, path)
/// install by name.
#[must_use]
pub fn poetry_requirement(name: &str, spec: &toml::Value) -> String {
    let constraint = match spec {
        toml::Value::String(s) => Some(s.as_str()),
        toml::Value::Table(t) => t.get("version").and_then(toml::Value::as_str),
        _ => None,
    };
    let Some(constraint) = constraint.map(str::trim).filter(|c| !c.is_empty() && *c != "*") else {
        return name.to_string();
    };
    if let Some(v) = constraint.strip_prefix('^') {
        format!("{name}>={}", v.trim())
    } else if let Some(v) = constraint.strip_prefix("~=") {
        format!("{name}~={}", v.trim())
    } else if let Some(v) = constraint.strip_prefix('~') {
        format!("{name}~={}", v.trim())
    } else if constraint.starts_with(|c: char| c.is_ascii_digit()) {
        format!("{name}=={constraint}")
    } else {
        format!("{name}{constraint}")
    }
}

//! Git artifact validation.
//!
//! Everything here runs before any subprocess is spawned. A spec that passes
//! [`validate_git_spec`] is safe to hand to `git` as argv.

use matrix_common::GitSpec;

use crate::domain::config::GitPolicy;
use crate::domain::error::FetchError;

/// A git spec that passed validation, with defaults resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedGit {
    pub repo: String,
    pub reference: String,
    pub subdir: Option<String>,
    pub depth: u32,
    pub strip_vcs: bool,
    pub recurse_submodules: bool,
    pub lfs: bool,
    pub verify_sha: Option<String>,
}

/// Validate a git spec against the fetch policy.
///
/// Checks, in order: URL scheme, host allow-list, ref characters, forbidden
/// keys, subdir shape.
///
/// # Errors
///
/// Returns the [`FetchError`] for the first check that fails.
pub fn validate_git_spec(spec: &GitSpec, policy: &GitPolicy) -> Result<ValidatedGit, FetchError> {
    let repo = spec.repo.trim();

    let authority = repo_authority(repo, policy.allow_insecure).ok_or_else(|| {
        FetchError::InsecureRepo {
            repo: repo.to_string(),
        }
    })?;

    let host = host_of(authority);
    if !host_allowed(&host, &policy.allowed_hosts) {
        return Err(FetchError::HostNotAllowed { host });
    }

    let reference = spec.reference.trim();
    if !is_safe_ref(reference) {
        return Err(FetchError::InvalidRef {
            reference: spec.reference.clone(),
        });
    }

    let forbidden = spec.forbidden_keys();
    if !forbidden.is_empty() {
        return Err(FetchError::ForbiddenKeys {
            keys: forbidden.into_iter().map(str::to_string).collect(),
        });
    }

    let subdir = match spec.subdir.as_deref() {
        Some(raw) => normalize_subdir(raw)?,
        None => None,
    };

    let depth = spec
        .depth
        .map_or(1, |d| u32::try_from(d.max(1)).unwrap_or(u32::MAX));

    let verify_sha = spec
        .verify_sha
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Ok(ValidatedGit {
        repo: repo.to_string(),
        reference: reference.to_string(),
        subdir,
        depth,
        strip_vcs: spec.strip_vcs,
        recurse_submodules: spec.recurse_submodules,
        lfs: spec.lfs,
        verify_sha,
    })
}

/// Return the authority part of an `https://` (or, if allowed, `http://`) URL.
fn repo_authority(repo: &str, allow_insecure: bool) -> Option<&str> {
    let rest = match strip_scheme(repo, "https://") {
        Some(rest) => rest,
        None if allow_insecure => strip_scheme(repo, "http://")?,
        None => return None,
    };
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    (!authority.is_empty()).then_some(authority)
}

fn strip_scheme<'a>(url: &'a str, scheme: &str) -> Option<&'a str> {
    let head = url.get(..scheme.len())?;
    head.eq_ignore_ascii_case(scheme)
        .then(|| &url[scheme.len()..])
}

/// Host of an authority: userinfo and port removed, lowercased.
fn host_of(authority: &str) -> String {
    let without_user = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
    let host = if let Some(bracketed) = without_user.strip_prefix('[') {
        bracketed.split(']').next().unwrap_or_default()
    } else {
        without_user.split(':').next().unwrap_or_default()
    };
    host.to_ascii_lowercase()
}

/// Exact or subdomain match. An empty allow-list denies everything.
#[must_use]
pub fn host_allowed(host: &str, allowed: &[String]) -> bool {
    if host.is_empty() {
        return false;
    }
    allowed
        .iter()
        .map(|h| h.trim().to_ascii_lowercase())
        .filter(|h| !h.is_empty())
        .any(|h| host == h || host.ends_with(&format!(".{h}")))
}

/// Non-empty, no whitespace, only ASCII alphanumerics and `/ . _ - @`, and
/// not starting with `-` (it would parse as a git option).
#[must_use]
pub fn is_safe_ref(reference: &str) -> bool {
    !reference.is_empty()
        && !reference.starts_with('-')
        && reference
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '_' | '-' | '@'))
}

/// Strip surrounding slashes; reject parent segments and absolute paths.
///
/// # Errors
///
/// Returns [`FetchError::InvalidSubdir`] for unsafe values.
pub fn normalize_subdir(raw: &str) -> Result<Option<String>, FetchError> {
    let trimmed = raw.trim();
    let invalid = || FetchError::InvalidSubdir {
        subdir: raw.to_string(),
    };
    if trimmed.starts_with('\\') || trimmed.contains(':') {
        return Err(invalid());
    }
    let cleaned = trimmed.trim_matches('/');
    if cleaned.is_empty() {
        return Ok(None);
    }
    if cleaned.split(['/', '\\']).any(|seg| seg == "..") {
        return Err(invalid());
    }
    Ok(Some(cleaned.to_string()))
}

/// Case-insensitive prefix match of a resolved HEAD against `verify_sha`.
#[must_use]
pub fn head_matches(head: &str, expected_prefix: &str) -> bool {
    head.trim()
        .to_ascii_lowercase()
        .starts_with(&expected_prefix.trim().to_ascii_lowercase())
}

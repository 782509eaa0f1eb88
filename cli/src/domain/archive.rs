//! Archive type inference and path containment rules.

use std::path::{Component, Path, PathBuf};

use crate::domain::error::FetchError;

/// Archive formats the fetcher can unpack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    Tar,
    TarGz,
}

impl ArchiveKind {
    /// Infer from a URL or file name suffix. Query strings and fragments are
    /// ignored.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let path = name.split(['?', '#']).next().unwrap_or_default();
        let lower = path.to_ascii_lowercase();
        if lower.ends_with(".zip") {
            Some(Self::Zip)
        } else if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if lower.ends_with(".tar") {
            Some(Self::Tar)
        } else {
            None
        }
    }

    /// Sniff from leading bytes. Plain tar has no reliable magic at offset 0,
    /// so only zip and gzip are detected.
    #[must_use]
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"PK\x03\x04") || bytes.starts_with(b"PK\x05\x06") {
            Some(Self::Zip)
        } else if bytes.starts_with(&[0x1f, 0x8b]) {
            Some(Self::TarGz)
        } else {
            None
        }
    }

    /// Label used in error messages.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::Tar | Self::TarGz => "tar",
        }
    }
}

/// Decide whether (and as what) an HTTP artifact should be unpacked.
///
/// `Some(None)` means unpacking was requested but the type could not be
/// inferred from names; the caller falls back to content sniffing.
#[must_use]
pub fn unpack_plan(url: &str, dest: Option<&str>, unpack: bool) -> Option<Option<ArchiveKind>> {
    let inferred = ArchiveKind::from_name(url).or_else(|| dest.and_then(ArchiveKind::from_name));
    match (inferred, unpack) {
        (Some(kind), _) => Some(Some(kind)),
        (None, true) => Some(None),
        (None, false) => None,
    }
}

/// Resolve `rel` under `root` lexically, refusing anything that escapes.
///
/// Absolute paths, drive prefixes and `..` segments that climb above `root`
/// are rejected with [`FetchError::UnsafePath`]. `root` itself is accepted.
///
/// # Errors
///
/// Returns [`FetchError::UnsafePath`] when the path leaves `root`.
pub fn contained_join(root: &Path, rel: &str) -> Result<PathBuf, FetchError> {
    let normalized = normalize_relative(rel).ok_or_else(|| FetchError::UnsafePath(root.join(rel)))?;
    Ok(root.join(normalized))
}

/// Refuse `path` if it, or any directory between `root` and it, is a
/// symbolic link. `is_link` must not follow links.
///
/// Run after [`contained_join`], immediately before the write.
///
/// # Errors
///
/// Returns [`FetchError::LinkedPath`] naming the first link found, and
/// [`FetchError::UnsafePath`] if `path` is not under `root` at all.
pub fn reject_linked(
    root: &Path,
    path: &Path,
    is_link: impl Fn(&Path) -> bool,
) -> Result<(), FetchError> {
    let rel = path
        .strip_prefix(root)
        .map_err(|_| FetchError::UnsafePath(path.to_path_buf()))?;
    let mut current = root.to_path_buf();
    for component in rel.components() {
        current.push(component);
        if is_link(&current) {
            return Err(FetchError::LinkedPath(current));
        }
    }
    Ok(())
}

/// Validate an archive entry name and return its target-relative path.
///
/// Returns `Ok(None)` for entries that resolve to the root itself (such as
/// `./`).
///
/// # Errors
///
/// Returns [`FetchError::UnsafeEntry`] for absolute or escaping names.
pub fn entry_relative(kind: ArchiveKind, name: &str) -> Result<Option<PathBuf>, FetchError> {
    let normalized = normalize_relative(name).ok_or_else(|| FetchError::UnsafeEntry {
        kind: kind.label(),
        entry: name.to_string(),
    })?;
    Ok((!normalized.as_os_str().is_empty()).then_some(normalized))
}

/// Lexically normalize a relative path. `None` if it is absolute or climbs
/// above its starting point.
fn normalize_relative(rel: &str) -> Option<PathBuf> {
    if rel.starts_with('/') || rel.starts_with('\\') || has_drive_prefix(rel) {
        return None;
    }
    let mut out: Vec<&std::ffi::OsStr> = Vec::new();
    for component in Path::new(rel).components() {
        match component {
            Component::Normal(part) => {
                if part.to_str().is_some_and(|p| p.split('\\').any(|s| s == "..")) {
                    return None;
                }
                out.push(part);
            }
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop()?;
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(out.into_iter().collect())
}

fn has_drive_prefix(rel: &str) -> bool {
    let bytes = rel.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Case-insensitive hex digest comparison.
#[must_use]
pub fn checksum_matches(expected: &str, actual: &str) -> bool {
    expected.trim().eq_ignore_ascii_case(actual.trim())
}

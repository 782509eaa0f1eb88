//! Filesystem helpers shared by the fetchers.

use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::domain::archive::reject_linked;
use crate::domain::error::FetchError;

/// Lowercase hex encoding.
#[must_use]
pub fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(char::from(HEX[(b >> 4) as usize]));
        out.push(char::from(HEX[(b & 0xf) as usize]));
    }
    out
}

/// SHA-256 hex digest of an in-memory body.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex_encode(&Sha256::digest(bytes))
}

/// Whether `path` itself is a symbolic link. Never follows the link.
#[must_use]
pub fn is_symlink(path: &Path) -> bool {
    std::fs::symlink_metadata(path).is_ok_and(|m| m.file_type().is_symlink())
}

/// Fail if writing `path` would pass through a symlink below `root`.
///
/// # Errors
///
/// Returns `FetchError::LinkedPath` (or `UnsafePath` when `path` is not
/// under `root`).
pub fn ensure_unlinked(root: &Path, path: &Path) -> Result<(), FetchError> {
    reject_linked(root, path, is_symlink)
}

/// Recursively copy the contents of `src` into `dst`, skipping top-level
/// entries named in `exclude`. Existing files are overwritten.
///
/// Symlinks are recreated on unix only when they resolve inside `dst`;
/// absolute or escaping links are skipped with a warning. Nothing is written
/// through a link that already exists under `dst`.
///
/// # Errors
///
/// Returns an error on the first entry that cannot be read or written.
pub fn copy_tree(src: &Path, dst: &Path, exclude: &[&str]) -> Result<()> {
    copy_dir(src, dst, dst, exclude)
}

fn copy_dir(src: &Path, dst: &Path, root: &Path, exclude: &[&str]) -> Result<()> {
    ensure_unlinked(root, dst)?;
    std::fs::create_dir_all(dst).with_context(|| format!("creating directory {}", dst.display()))?;
    for entry in std::fs::read_dir(src).with_context(|| format!("reading {}", src.display()))? {
        let entry = entry.with_context(|| format!("reading {}", src.display()))?;
        let name = entry.file_name();
        if name.to_str().is_some_and(|n| exclude.contains(&n)) {
            continue;
        }
        copy_entry(&entry.path(), &dst.join(&name), root)?;
    }
    Ok(())
}

fn copy_entry(from: &Path, to: &Path, root: &Path) -> Result<()> {
    let meta = std::fs::symlink_metadata(from)
        .with_context(|| format!("inspecting {}", from.display()))?;
    let kind = meta.file_type();
    if kind.is_dir() {
        copy_dir(from, to, root, &[])
    } else if kind.is_symlink() {
        copy_symlink(from, to, root)
    } else {
        if let Some(parent) = to.parent() {
            ensure_unlinked(root, parent)?;
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }
        if is_symlink(to) {
            std::fs::remove_file(to).with_context(|| format!("replacing {}", to.display()))?;
        }
        std::fs::copy(from, to)
            .with_context(|| format!("copying {} to {}", from.display(), to.display()))?;
        Ok(())
    }
}

/// A relative link at `at` whose target stays under `root` lexically.
#[cfg(unix)]
fn link_stays_inside(root: &Path, at: &Path, link: &Path) -> bool {
    use crate::domain::archive::contained_join;

    if link.is_absolute() {
        return false;
    }
    let Some(dir) = at.parent().and_then(|p| p.strip_prefix(root).ok()) else {
        return false;
    };
    dir.join(link)
        .to_str()
        .is_some_and(|rel| contained_join(root, rel).is_ok())
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path, root: &Path) -> Result<()> {
    let link = std::fs::read_link(from).with_context(|| format!("reading link {}", from.display()))?;
    if !link_stays_inside(root, to, &link) {
        tracing::warn!(
            path = %to.display(),
            link = %link.display(),
            "copy: skipping symlink that points outside the target"
        );
        return Ok(());
    }
    if let Some(parent) = to.parent() {
        ensure_unlinked(root, parent)?;
    }
    if std::fs::symlink_metadata(to).is_ok() {
        std::fs::remove_file(to).with_context(|| format!("replacing {}", to.display()))?;
    }
    std::os::unix::fs::symlink(&link, to)
        .with_context(|| format!("creating link {}", to.display()))
}

#[cfg(not(unix))]
fn copy_symlink(from: &Path, _to: &Path, _root: &Path) -> Result<()> {
    debug!(path = %from.display(), "copy: skipping symlink");
    Ok(())
}

/// Remove a directory tree if present; failures are logged, not returned.
pub fn remove_dir_quietly(path: &Path) {
    if path.exists()
        && let Err(e) = std::fs::remove_dir_all(path)
    {
        debug!(path = %path.display(), "could not remove directory: {e}");
    }
}

//! HTTP artifact fetching: download, checksum, safe unpack, flatten.

use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use matrix_common::HttpSpec;

use crate::application::ports::Downloader;
use crate::domain::archive::{ArchiveKind, checksum_matches, contained_join, entry_relative, unpack_plan};
use crate::domain::error::{FetchError, TimeoutError};
use crate::infra::fs::{ensure_unlinked, sha256_hex};

/// Largest body accepted from a single download.
pub const MAX_DOWNLOAD_BYTES: u64 = 1024 * 1024 * 1024;

// ── Downloader ────────────────────────────────────────────────────────────────

/// Production `Downloader` backed by a blocking `ureq` agent.
pub struct UreqDownloader {
    user_agent: String,
}

impl UreqDownloader {
    #[must_use]
    pub fn new() -> Self {
        Self {
            user_agent: format!("matrix-cli/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for UreqDownloader {
    fn default() -> Self {
        Self::new()
    }
}

impl Downloader for UreqDownloader {
    async fn fetch_bytes(&self, url: &str, timeout: Duration) -> Result<Vec<u8>> {
        let url = url.to_string();
        let user_agent = self.user_agent.clone();
        tokio::task::spawn_blocking(move || download_blocking(&url, &user_agent, timeout))
            .await
            .context("download task panicked")?
    }
}

fn download_blocking(url: &str, user_agent: &str, timeout: Duration) -> Result<Vec<u8>> {
    let agent = ureq::AgentBuilder::new()
        .timeout(timeout)
        .redirects(10)
        .user_agent(user_agent)
        .build();
    let started = Instant::now();
    debug!(url, timeout_s = timeout.as_secs(), "download: GET");

    let response = match agent.get(url).call() {
        Ok(resp) => resp,
        Err(ureq::Error::Status(status, _)) => {
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                status,
            }
            .into());
        }
        Err(ureq::Error::Transport(t)) => {
            return Err(transport_error(url, &t.to_string(), started, timeout));
        }
    };

    let mut body = Vec::new();
    response
        .into_reader()
        .take(MAX_DOWNLOAD_BYTES + 1)
        .read_to_end(&mut body)
        .map_err(|e| transport_error(url, &e.to_string(), started, timeout))?;
    if body.len() as u64 > MAX_DOWNLOAD_BYTES {
        return Err(FetchError::Transport {
            url: url.to_string(),
            reason: format!("body exceeds {MAX_DOWNLOAD_BYTES} bytes"),
        }
        .into());
    }
    debug!(url, bytes = body.len(), "download: complete");
    Ok(body)
}

fn transport_error(url: &str, reason: &str, started: Instant, timeout: Duration) -> anyhow::Error {
    let lowered = reason.to_ascii_lowercase();
    if started.elapsed() >= timeout || lowered.contains("timed out") {
        return TimeoutError {
            operation: format!("download {url}"),
            limit: timeout,
        }
        .into();
    }
    FetchError::Transport {
        url: url.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

// ── Archive fetcher ───────────────────────────────────────────────────────────

/// Downloads one HTTP artifact into a target directory.
pub struct ArchiveFetcher<'a, D: Downloader> {
    downloader: &'a D,
    timeout: Duration,
}

impl<'a, D: Downloader> ArchiveFetcher<'a, D> {
    #[must_use]
    pub fn new(downloader: &'a D, timeout: Duration) -> Self {
        Self {
            downloader,
            timeout,
        }
    }

    /// Download `spec.url`, verify it, write `spec.dest` and unpack.
    ///
    /// Nothing touches the disk until the checksum (if any) matches.
    ///
    /// # Errors
    ///
    /// Returns a `FetchError` for transport, checksum, path containment or
    /// archive problems and a `TimeoutError` when the download is too slow.
    pub async fn fetch(&self, spec: &HttpSpec, target: &Path) -> Result<()> {
        let bytes = self.downloader.fetch_bytes(&spec.url, self.timeout).await?;

        if let Some(expected) = spec.sha256.as_deref() {
            let actual = sha256_hex(&bytes);
            if !checksum_matches(expected, &actual) {
                return Err(FetchError::ChecksumMismatch {
                    url: spec.url.clone(),
                    expected: expected.to_string(),
                    actual,
                }
                .into());
            }
            debug!(url = %spec.url, "download: sha256 verified");
        }

        let dest = spec
            .dest
            .as_deref()
            .map(|d| contained_join(target, d))
            .transpose()?;
        let unpack = unpack_plan(&spec.url, spec.dest.as_deref(), spec.unpack);

        let target = target.to_path_buf();
        let url = spec.url.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            std::fs::create_dir_all(&target)
                .with_context(|| format!("creating target directory {}", target.display()))?;
            if let Some(dest) = &dest {
                ensure_unlinked(&target, dest)?;
                if let Some(parent) = dest.parent() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("creating directory {}", parent.display()))?;
                }
                std::fs::write(dest, &bytes)
                    .with_context(|| format!("writing {}", dest.display()))?;
                info!(path = %dest.display(), bytes = bytes.len(), "artifact: wrote download");
            }
            if let Some(kind) = unpack {
                unpack_bytes(kind, &bytes, &target, &url)?;
                flatten_single_dir(&target, dest.as_deref());
            }
            Ok(())
        })
        .await
        .context("unpack task panicked")?
    }
}

// ── Unpacking ─────────────────────────────────────────────────────────────────

/// Unpack `bytes` into `target`. `None` means the type was not inferable
/// from names: try zip, then tar.
///
/// # Errors
///
/// Returns [`FetchError::UnsafeEntry`] before writing anything if any entry
/// would escape `target`, and [`FetchError::LinkedPath`] if one would be
/// written through a symlink already present under it.
pub fn unpack_bytes(kind: Option<ArchiveKind>, bytes: &[u8], target: &Path, url: &str) -> Result<()> {
    match kind {
        Some(ArchiveKind::Zip) => extract_zip(bytes, target),
        Some(ArchiveKind::Tar | ArchiveKind::TarGz) => extract_tar(bytes, target),
        None => match extract_zip(bytes, target) {
            Err(e) if is_bad_archive(&e) => {
                debug!("unpack: not a zip ({e}); trying tar");
                extract_tar(bytes, target).map_err(|e| {
                    if is_bad_archive(&e) {
                        FetchError::UnknownArchive {
                            url: url.to_string(),
                        }
                        .into()
                    } else {
                        e
                    }
                })
            }
            other => other,
        },
    }
}

fn is_bad_archive(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<FetchError>(), Some(FetchError::BadArchive { .. }))
}

fn bad(kind: ArchiveKind, reason: impl ToString) -> anyhow::Error {
    FetchError::BadArchive {
        kind: kind.label(),
        reason: reason.to_string(),
    }
    .into()
}

/// Two passes: validate every entry name and its route on disk, then write.
fn extract_zip(bytes: &[u8], target: &Path) -> Result<()> {
    let kind = ArchiveKind::Zip;
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| bad(kind, e))?;

    let mut planned: Vec<(usize, PathBuf, bool)> = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let file = archive.by_index_raw(index).map_err(|e| bad(kind, e))?;
        let Some(rel) = entry_relative(kind, file.name())? else {
            continue;
        };
        ensure_unlinked(target, &target.join(&rel))?;
        let is_link = file
            .unix_mode()
            .is_some_and(|mode| mode & 0o170_000 == 0o120_000);
        if is_link {
            debug!(entry = file.name(), "unpack: skipping zip symlink");
            continue;
        }
        planned.push((index, rel, file.is_dir()));
    }

    for (index, rel, is_dir) in planned {
        let out = target.join(&rel);
        if is_dir {
            std::fs::create_dir_all(&out)
                .with_context(|| format!("creating directory {}", out.display()))?;
            continue;
        }
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }
        let mut file = archive.by_index(index).map_err(|e| bad(kind, e))?;
        let mut writer = std::fs::File::create(&out)
            .with_context(|| format!("creating {}", out.display()))?;
        std::io::copy(&mut file, &mut writer).map_err(|e| bad(kind, e))?;
        apply_mode(&out, file.unix_mode());
    }
    debug!(target = %target.display(), "unpack: zip extracted");
    Ok(())
}

fn tar_reader(bytes: &[u8]) -> Box<dyn Read + '_> {
    if ArchiveKind::sniff(bytes) == Some(ArchiveKind::TarGz) {
        Box::new(flate2::read::GzDecoder::new(bytes))
    } else {
        Box::new(bytes)
    }
}

/// Two passes: validate every entry name, then write regular files and
/// directories. Links and special entries are skipped.
fn extract_tar(bytes: &[u8], target: &Path) -> Result<()> {
    let kind = ArchiveKind::Tar;

    let mut archive = tar::Archive::new(tar_reader(bytes));
    let mut seen = 0usize;
    for entry in archive.entries().map_err(|e| bad(kind, e))? {
        let entry = entry.map_err(|e| bad(kind, e))?;
        let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        if let Some(rel) = entry_relative(kind, &name)? {
            ensure_unlinked(target, &target.join(rel))?;
        }
        seen += 1;
    }
    if seen == 0 {
        return Err(bad(kind, "archive has no entries"));
    }

    let mut archive = tar::Archive::new(tar_reader(bytes));
    for entry in archive.entries().map_err(|e| bad(kind, e))? {
        let mut entry = entry.map_err(|e| bad(kind, e))?;
        let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        let Some(rel) = entry_relative(kind, &name)? else {
            continue;
        };
        let out = target.join(&rel);
        match entry.header().entry_type() {
            tar::EntryType::Directory => {
                std::fs::create_dir_all(&out)
                    .with_context(|| format!("creating directory {}", out.display()))?;
            }
            tar::EntryType::Regular | tar::EntryType::Continuous => {
                if let Some(parent) = out.parent() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("creating directory {}", parent.display()))?;
                }
                let mut writer = std::fs::File::create(&out)
                    .with_context(|| format!("creating {}", out.display()))?;
                std::io::copy(&mut entry, &mut writer).map_err(|e| bad(kind, e))?;
                apply_mode(&out, entry.header().mode().ok());
            }
            other => debug!(entry = %name, kind = ?other, "unpack: skipping non-regular tar entry"),
        }
    }
    debug!(target = %target.display(), "unpack: tar extracted");
    Ok(())
}

/// Keep the owner-executable bit from the archive; nothing else.
#[cfg(unix)]
fn apply_mode(path: &Path, mode: Option<u32>) {
    use std::os::unix::fs::PermissionsExt;
    if mode.is_some_and(|m| m & 0o100 != 0)
        && let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
    {
        warn!(path = %path.display(), "unpack: cannot mark executable: {e}");
    }
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: Option<u32>) {}

// ── Flattening ────────────────────────────────────────────────────────────────

/// If `target` holds exactly one directory (ignoring the raw download at
/// `ignore`), move its children up and remove it. Best-effort.
pub fn flatten_single_dir(target: &Path, ignore: Option<&Path>) {
    let entries: Vec<PathBuf> = match std::fs::read_dir(target) {
        Ok(rd) => rd
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| Some(p.as_path()) != ignore)
            .collect(),
        Err(e) => {
            debug!("flatten: cannot list {}: {e}", target.display());
            return;
        }
    };
    let [only] = entries.as_slice() else {
        return;
    };
    let is_real_dir = std::fs::symlink_metadata(only).is_ok_and(|m| m.is_dir());
    if !is_real_dir {
        return;
    }

    debug!(dir = %only.display(), "flatten: lifting single top-level directory");
    let children = match std::fs::read_dir(only) {
        Ok(rd) => rd.filter_map(Result::ok).collect::<Vec<_>>(),
        Err(e) => {
            warn!("flatten: cannot list {}: {e}", only.display());
            return;
        }
    };
    for child in children {
        let dest = target.join(child.file_name());
        if std::fs::symlink_metadata(&dest).is_ok() {
            debug!(path = %dest.display(), "flatten: name collision; leaving in place");
            continue;
        }
        if let Err(e) = std::fs::rename(child.path(), &dest) {
            warn!("flatten: moving {} failed: {e}", child.path().display());
        }
    }
    if let Err(e) = std::fs::remove_dir(only) {
        debug!("flatten: {} kept: {e}", only.display());
    }
}

//! Infrastructure implementation of the `LockStore` port.
//!
//! `FileLockStore` keeps one `runner.lock.json` per alias under the state
//! directory. Blocking filesystem work runs on `tokio::task::spawn_blocking`.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use matrix_common::LockInfo;
use matrix_common::lock::LOCK_FILE;

use crate::application::ports::LockStore;
use crate::domain::error::RuntimeError;

/// Lock file store rooted at `<home>/state`.
pub struct FileLockStore {
    state_dir: PathBuf,
}

impl FileLockStore {
    #[must_use]
    pub fn new(state_dir: PathBuf) -> Self {
        Self { state_dir }
    }

    fn path_for(state_dir: &Path, alias: &str) -> PathBuf {
        state_dir.join(alias).join(LOCK_FILE)
    }

    /// Create-new semantics: an existing file is a conflict, never replaced.
    fn create_sync(path: &Path, info: &LockInfo) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(info).context("serializing lock")?;

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = match options.open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(RuntimeError::LockConflict {
                    alias: info.alias.clone(),
                    path: path.to_path_buf(),
                }
                .into());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("creating lock file {}", path.display()));
            }
        };

        let written = file
            .write_all(content.as_bytes())
            .and_then(|()| file.sync_all());
        if let Err(e) = written {
            drop(file);
            let _ = std::fs::remove_file(path);
            return Err(e).with_context(|| format!("writing lock file {}", path.display()));
        }
        Ok(())
    }

    fn load_sync(path: &Path) -> Result<Option<LockInfo>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading lock file {}", path.display()))?;
        let info: LockInfo = serde_json::from_str(&content)
            .with_context(|| format!("parsing lock file {}", path.display()))?;
        Ok(Some(info))
    }

    fn remove_sync(path: &Path) -> Result<bool> {
        let removed = match std::fs::remove_file(path) {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                return Err(e).with_context(|| format!("removing lock file {}", path.display()));
            }
        };
        if let Some(parent) = path.parent() {
            // Only succeeds once the alias directory is empty.
            let _ = std::fs::remove_dir(parent);
        }
        Ok(removed)
    }

    fn aliases_sync(state_dir: &Path) -> Result<Vec<String>> {
        let entries = match std::fs::read_dir(state_dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("listing {}", state_dir.display()));
            }
        };
        let mut aliases: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|e| e.path().join(LOCK_FILE).is_file())
            .filter_map(|e| e.file_name().into_string().ok())
            .collect();
        aliases.sort();
        Ok(aliases)
    }
}

impl LockStore for FileLockStore {
    fn lock_path(&self, alias: &str) -> PathBuf {
        Self::path_for(&self.state_dir, alias)
    }

    fn exists(&self, alias: &str) -> bool {
        self.lock_path(alias).exists()
    }

    async fn create(&self, info: &LockInfo) -> Result<()> {
        let path = self.lock_path(&info.alias);
        let info = info.clone();
        tokio::task::spawn_blocking(move || Self::create_sync(&path, &info))
            .await
            .context("lock create task panicked")?
    }

    async fn load(&self, alias: &str) -> Result<Option<LockInfo>> {
        let path = self.lock_path(alias);
        tokio::task::spawn_blocking(move || Self::load_sync(&path))
            .await
            .context("lock load task panicked")?
    }

    async fn remove(&self, alias: &str) -> Result<bool> {
        let path = self.lock_path(alias);
        tokio::task::spawn_blocking(move || Self::remove_sync(&path))
            .await
            .context("lock remove task panicked")?
    }

    async fn aliases(&self) -> Result<Vec<String>> {
        let state_dir = self.state_dir.clone();
        tokio::task::spawn_blocking(move || Self::aliases_sync(&state_dir))
            .await
            .context("lock listing task panicked")?
    }
}

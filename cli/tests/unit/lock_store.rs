//! Tests for `FileLockStore` on a real temporary state directory.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use chrono::{TimeZone, Utc};

use matrix_cli::application::ports::LockStore;
use matrix_cli::domain::error::RuntimeError;
use matrix_cli::infra::lock_store::FileLockStore;
use matrix_common::LockInfo;

fn lock(alias: &str, pid: u32) -> LockInfo {
    LockInfo {
        alias: alias.to_string(),
        pid,
        port: Some(6288),
        started_at: Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap(),
        target: "/srv/runners/hello".into(),
        runner_path: "/srv/runners/hello/runner.json".into(),
    }
}

#[tokio::test]
async fn create_then_load_round_trips() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileLockStore::new(dir.path().to_path_buf());

    store.create(&lock("hello", 10)).await.expect("create");

    assert!(store.exists("hello"));
    assert_eq!(
        store.lock_path("hello"),
        dir.path().join("hello").join("runner.lock.json")
    );
    let loaded = store.load("hello").await.expect("load");
    assert_eq!(loaded, Some(lock("hello", 10)));
}

#[tokio::test]
async fn create_never_overwrites() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileLockStore::new(dir.path().to_path_buf());
    store.create(&lock("hello", 10)).await.expect("create");

    let err = store
        .create(&lock("hello", 11))
        .await
        .expect_err("second create must conflict");

    assert!(matches!(
        err.downcast_ref::<RuntimeError>(),
        Some(RuntimeError::LockConflict { alias, .. }) if alias == "hello"
    ));
    let kept = store.load("hello").await.unwrap().unwrap();
    assert_eq!(kept.pid, 10);
}

#[tokio::test]
async fn load_missing_is_none_and_corrupt_is_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileLockStore::new(dir.path().to_path_buf());
    assert_eq!(store.load("ghost").await.expect("load"), None);

    let path = store.lock_path("bad");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "{\"alias\":").unwrap();
    assert!(store.load("bad").await.is_err());
}

#[tokio::test]
async fn remove_deletes_file_and_empty_alias_dir() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileLockStore::new(dir.path().to_path_buf());
    store.create(&lock("hello", 10)).await.expect("create");

    assert!(store.remove("hello").await.expect("remove"));
    assert!(!store.exists("hello"));
    assert!(!dir.path().join("hello").exists());
    assert!(!store.remove("hello").await.expect("second remove"));
}

#[tokio::test]
async fn aliases_are_sorted_and_ignore_stray_entries() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileLockStore::new(dir.path().to_path_buf());
    for (alias, pid) in [("zeta", 1), ("alpha", 2), ("mid", 3)] {
        store.create(&lock(alias, pid)).await.expect("create");
    }
    std::fs::create_dir_all(dir.path().join("empty-dir")).unwrap();
    std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

    assert_eq!(
        store.aliases().await.expect("aliases"),
        ["alpha", "mid", "zeta"]
    );
}

#[tokio::test]
async fn aliases_of_missing_state_dir_is_empty() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileLockStore::new(dir.path().join("never-created"));
    assert!(store.aliases().await.expect("aliases").is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn lock_file_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileLockStore::new(dir.path().to_path_buf());
    store.create(&lock("hello", 10)).await.expect("create");

    let mode = std::fs::metadata(store.lock_path("hello"))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o600);
}

//! Tests for `GitFetcher` driven through a recording git stand-in.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use serde_json::{Value, json};

use matrix_cli::domain::config::GitPolicy;
use matrix_cli::domain::error::{FetchError, TimeoutError};
use matrix_cli::infra::git::GitFetcher;
use matrix_common::GitSpec;

use super::helpers::{RecordingRunner, err_output, fake_git, ok_output};

const HEAD: &str = "0123456789abcdef0123456789abcdef01234567";

fn spec(value: Value) -> GitSpec {
    serde_json::from_value(value).expect("valid git spec")
}

fn policy() -> GitPolicy {
    GitPolicy {
        bin: "git-test".to_string(),
        ..GitPolicy::default()
    }
}

fn fetch_error(err: &anyhow::Error) -> &FetchError {
    err.downcast_ref::<FetchError>()
        .unwrap_or_else(|| panic!("expected FetchError, got {err:#}"))
}

#[tokio::test]
async fn clone_copies_tree_without_vcs_metadata() {
    let runner = fake_git(HEAD);
    let policy = policy();
    let target = tempfile::tempdir().expect("tempdir");

    GitFetcher::new(&runner, &policy)
        .fetch(
            &spec(json!({"repo": "https://github.com/acme/tool.git", "ref": "v1.2.0"})),
            target.path(),
        )
        .await
        .expect("fetch");

    assert!(target.path().join("README.md").is_file());
    assert!(target.path().join("server/server.py").is_file());
    assert!(!target.path().join(".git").exists());

    let calls = runner.calls();
    assert!(calls.iter().all(|c| c.program == "git-test"));
    assert_eq!(calls[0].args, ["--version"]);
    let clone = &calls[1].args;
    assert_eq!(clone[0], "clone");
    assert!(clone.contains(&"--no-checkout".to_string()));
    assert!(clone.windows(2).any(|w| w == ["--depth", "1"]));
    assert_eq!(clone[clone.len() - 2], "https://github.com/acme/tool.git");
    assert!(calls[2].args.ends_with(&["--detach".to_string(), "v1.2.0".to_string()]));
    assert!(!runner.lines().iter().any(|l| l.contains("sparse-checkout")));
}

#[tokio::test]
async fn subdir_uses_sparse_checkout_and_copies_only_that_dir() {
    let runner = fake_git(HEAD);
    let policy = policy();
    let target = tempfile::tempdir().expect("tempdir");

    GitFetcher::new(&runner, &policy)
        .fetch(
            &spec(json!({
                "repo": "https://github.com/acme/tool",
                "ref": "main",
                "subdir": "server/",
                "depth": 5
            })),
            target.path(),
        )
        .await
        .expect("fetch");

    assert!(target.path().join("server.py").is_file());
    assert!(!target.path().join("README.md").exists());

    let lines = runner.lines();
    assert!(lines.iter().any(|l| l.contains("sparse-checkout init --cone")));
    assert!(lines.iter().any(|l| l.ends_with("sparse-checkout set server")));
    assert!(lines.iter().any(|l| l.contains("--depth 5")));
}

#[tokio::test]
async fn strip_vcs_false_keeps_git_directory() {
    let runner = fake_git(HEAD);
    let policy = policy();
    let target = tempfile::tempdir().expect("tempdir");

    GitFetcher::new(&runner, &policy)
        .fetch(
            &spec(json!({"repo": "https://github.com/acme/tool", "ref": "main", "strip_vcs": false})),
            target.path(),
        )
        .await
        .expect("fetch");

    assert!(target.path().join(".git/HEAD").is_file());
}

#[tokio::test]
async fn verify_sha_accepts_prefix_and_rejects_mismatch() {
    let policy = policy();

    let runner = fake_git(HEAD);
    let target = tempfile::tempdir().expect("tempdir");
    GitFetcher::new(&runner, &policy)
        .fetch(
            &spec(json!({"repo": "https://github.com/acme/tool", "ref": "main", "verify_sha": "0123456"})),
            target.path(),
        )
        .await
        .expect("prefix matches");
    assert!(runner.lines().iter().any(|l| l.contains("rev-parse --verify HEAD")));

    let runner = fake_git(HEAD);
    let target = tempfile::tempdir().expect("tempdir");
    let err = GitFetcher::new(&runner, &policy)
        .fetch(
            &spec(json!({"repo": "https://github.com/acme/tool", "ref": "main", "verify_sha": "deadbeef"})),
            target.path(),
        )
        .await
        .expect_err("must fail");
    assert!(matches!(fetch_error(&err), FetchError::HeadMismatch { expected, .. } if expected == "deadbeef"));
    assert!(!target.path().join("README.md").exists());
}

#[tokio::test]
async fn missing_subdir_is_reported() {
    let runner = fake_git(HEAD);
    let policy = policy();
    let target = tempfile::tempdir().expect("tempdir");

    let err = GitFetcher::new(&runner, &policy)
        .fetch(
            &spec(json!({"repo": "https://github.com/acme/tool", "ref": "main", "subdir": "nope"})),
            target.path(),
        )
        .await
        .expect_err("must fail");

    assert!(matches!(fetch_error(&err), FetchError::SubdirNotFound { subdir } if subdir == "nope"));
}

#[tokio::test]
async fn policy_violations_spawn_no_subprocess() {
    let cases = [
        json!({"repo": "http://github.com/acme/tool", "ref": "main"}),
        json!({"repo": "git@github.com:acme/tool.git", "ref": "main"}),
        json!({"repo": "https://evil.example/acme/tool", "ref": "main"}),
        json!({"repo": "https://github.com/acme/tool", "ref": "--upload-pack=x"}),
        json!({"repo": "https://github.com/acme/tool", "ref": "main", "command": "rm -rf /"}),
        json!({"repo": "https://github.com/acme/tool", "ref": "main", "subdir": "../up"}),
    ];
    let policy = policy();
    for case in cases {
        let runner = RecordingRunner::new();
        let target = tempfile::tempdir().expect("tempdir");
        let result = GitFetcher::new(&runner, &policy)
            .fetch(&spec(case.clone()), target.path())
            .await;
        let err = result.expect_err("must be rejected");
        assert!(err.downcast_ref::<FetchError>().is_some(), "{case}: {err:#}");
        assert!(runner.calls().is_empty(), "{case} spawned git");
    }
}

#[tokio::test]
async fn specific_policy_errors_are_typed() {
    let policy = policy();
    let runner = RecordingRunner::new();
    let target = tempfile::tempdir().expect("tempdir");
    let fetcher = GitFetcher::new(&runner, &policy);

    let err = fetcher
        .fetch(&spec(json!({"repo": "https://evil.example/x", "ref": "main"})), target.path())
        .await
        .unwrap_err();
    assert!(matches!(fetch_error(&err), FetchError::HostNotAllowed { host } if host == "evil.example"));

    let err = fetcher
        .fetch(
            &spec(json!({"repo": "https://github.com/x/y", "ref": "main", "shell": true, "script": "x"})),
            target.path(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        fetch_error(&err),
        FetchError::ForbiddenKeys { keys } if keys == &["shell".to_string(), "script".to_string()]
    ));
}

#[tokio::test]
async fn insecure_http_allowed_when_policy_permits() {
    let policy = GitPolicy {
        allow_insecure: true,
        allowed_hosts: vec!["git.internal".to_string()],
        ..policy()
    };
    let runner = fake_git(HEAD);
    let target = tempfile::tempdir().expect("tempdir");

    GitFetcher::new(&runner, &policy)
        .fetch(&spec(json!({"repo": "http://git.internal/team/tool", "ref": "main"})), target.path())
        .await
        .expect("fetch");
    assert!(target.path().join("README.md").is_file());
}

#[tokio::test]
async fn failed_clone_redacts_repo_in_error() {
    let runner = RecordingRunner::with(|call| {
        if call.args.first().is_some_and(|a| a == "clone") {
            Ok(err_output(
                128,
                b"fatal: could not read from https://github.com/acme/private",
            ))
        } else {
            Ok(ok_output(b"git version 2.45.0\n"))
        }
    });
    let policy = policy();
    let target = tempfile::tempdir().expect("tempdir");

    let err = GitFetcher::new(&runner, &policy)
        .fetch(&spec(json!({"repo": "https://github.com/acme/private", "ref": "main"})), target.path())
        .await
        .expect_err("must fail");

    match fetch_error(&err) {
        FetchError::Git { step, code, stderr } => {
            assert_eq!(step, "clone");
            assert_eq!(*code, Some(128));
            assert!(stderr.contains("<repo>"));
            assert!(!stderr.contains("acme/private"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn missing_git_binary_is_reported() {
    let runner = RecordingRunner::with(|_| Err(anyhow::anyhow!("No such file or directory")));
    let policy = policy();
    let target = tempfile::tempdir().expect("tempdir");

    let err = GitFetcher::new(&runner, &policy)
        .fetch(&spec(json!({"repo": "https://github.com/acme/tool", "ref": "main"})), target.path())
        .await
        .expect_err("must fail");

    assert!(matches!(fetch_error(&err), FetchError::GitMissing { bin } if bin == "git-test"));
    assert_eq!(runner.calls().len(), 1);
}

#[tokio::test]
async fn timed_out_step_is_named() {
    let runner = RecordingRunner::with(|call| {
        if call.args.first().is_some_and(|a| a == "clone") {
            Err(TimeoutError {
                operation: "git-test".to_string(),
                limit: std::time::Duration::from_secs(1),
            }
            .into())
        } else {
            Ok(ok_output(b"git version 2.45.0\n"))
        }
    });
    let policy = policy();
    let target = tempfile::tempdir().expect("tempdir");

    let err = GitFetcher::new(&runner, &policy)
        .fetch(&spec(json!({"repo": "https://github.com/acme/tool", "ref": "main"})), target.path())
        .await
        .expect_err("must fail");

    let timeout = err.downcast_ref::<TimeoutError>().expect("typed timeout");
    assert_eq!(timeout.operation, "git clone");
    assert_eq!(timeout.limit, policy.timeout);
}

#[cfg(unix)]
mod repository_links {
    use std::path::PathBuf;

    use super::*;

    /// A clone holding an escaping link, a link posing as a directory, and a
    /// harmless relative link.
    fn git_with_links(outside: PathBuf) -> RecordingRunner {
        RecordingRunner::with(move |call| {
            if call.args.iter().any(|a| a == "clone") {
                let dest = PathBuf::from(call.args.last().expect("clone dest"));
                std::fs::create_dir_all(dest.join("pkg")).unwrap();
                std::fs::write(dest.join("pkg/app.py"), "x").unwrap();
                std::os::unix::fs::symlink(&outside, dest.join("escape")).unwrap();
                std::os::unix::fs::symlink(&outside, dest.join("linked-sub")).unwrap();
                std::os::unix::fs::symlink("pkg/app.py", dest.join("app.py")).unwrap();
            }
            Ok(ok_output(b"git version 2.45.0\n"))
        })
    }

    #[tokio::test]
    async fn escaping_links_are_not_copied_into_target() {
        let outside = tempfile::tempdir().expect("tempdir");
        let runner = git_with_links(outside.path().to_path_buf());
        let policy = policy();
        let target = tempfile::tempdir().expect("tempdir");

        GitFetcher::new(&runner, &policy)
            .fetch(
                &spec(json!({"repo": "https://github.com/acme/tool", "ref": "main"})),
                target.path(),
            )
            .await
            .expect("fetch");

        assert!(std::fs::symlink_metadata(target.path().join("escape")).is_err());
        assert!(std::fs::symlink_metadata(target.path().join("linked-sub")).is_err());
        assert_eq!(std::fs::read_to_string(target.path().join("app.py")).unwrap(), "x");
    }

    #[tokio::test]
    async fn subdir_that_is_a_link_is_refused() {
        let outside = tempfile::tempdir().expect("tempdir");
        std::fs::write(outside.path().join("secret.txt"), "s").unwrap();
        let runner = git_with_links(outside.path().to_path_buf());
        let policy = policy();
        let target = tempfile::tempdir().expect("tempdir");

        let err = GitFetcher::new(&runner, &policy)
            .fetch(
                &spec(json!({"repo": "https://github.com/acme/tool", "ref": "main", "subdir": "linked-sub"})),
                target.path(),
            )
            .await
            .expect_err("must fail");

        assert!(matches!(fetch_error(&err), FetchError::LinkedPath(_)));
        assert!(!target.path().join("secret.txt").exists());
    }
}

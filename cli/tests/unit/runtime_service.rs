//! Tests for `RuntimeSupervisor` against mock process/port/health ports and a
//! real lock store, plus real-process runs on unix.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;

use matrix_cli::application::ports::{LockStore, PortProbe};
use matrix_cli::application::services::runtime::{
    PORT_ATTEMPTS, RuntimeSupervisor, find_free_port,
};
use matrix_cli::domain::config::MatrixConfig;
use matrix_cli::domain::error::{RuntimeError, SchemaError};
use matrix_cli::domain::health::HealthStatus;
use matrix_cli::infra::lock_store::FileLockStore;
use matrix_cli::infra::log_tail::FileLogReader;
use matrix_common::LockInfo;

use super::helpers::{BusyPorts, FakeProcesses, FixedHealth};

struct Harness {
    home: tempfile::TempDir,
    config: MatrixConfig,
    locks: FileLockStore,
    processes: FakeProcesses,
    ports: BusyPorts,
    health: FixedHealth,
    logs: FileLogReader,
}

impl Harness {
    fn new() -> Self {
        let home = tempfile::tempdir().expect("tempdir");
        let config = MatrixConfig::with_home(home.path());
        Self {
            locks: FileLockStore::new(config.state_dir()),
            home,
            config,
            processes: FakeProcesses::new(),
            ports: BusyPorts::default(),
            health: FixedHealth(Some(200)),
            logs: FileLogReader,
        }
    }

    fn supervisor(
        &self,
    ) -> RuntimeSupervisor<'_, FileLockStore, FakeProcesses, BusyPorts, FixedHealth, FileLogReader>
    {
        RuntimeSupervisor::new(
            &self.locks,
            &self.processes,
            &self.ports,
            &self.health,
            &self.logs,
            &self.config,
        )
    }

    /// An installed target named `name` with the given runner.json.
    fn target(&self, name: &str, runner: &serde_json::Value) -> std::path::PathBuf {
        let dir = self.home.path().join("runners").join(name);
        std::fs::create_dir_all(&dir).expect("mkdir");
        std::fs::write(dir.join("runner.json"), runner.to_string()).expect("write");
        dir
    }

    fn python_target(&self, name: &str) -> std::path::PathBuf {
        let dir = self.target(
            name,
            &json!({"type": "python", "entry": "server.py", "env": {"MCP_MODE": "sse"}}),
        );
        let bin = dir.join(".venv").join(if cfg!(windows) { "Scripts" } else { "bin" });
        std::fs::create_dir_all(&bin).expect("mkdir");
        let exe = if cfg!(windows) { "python.exe" } else { "python" };
        std::fs::write(bin.join(exe), "").expect("write");
        dir
    }
}

// ── start ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn start_spawns_with_merged_env_and_writes_lock() {
    let h = Harness::new();
    let target = h.python_target("hello");

    let info = h
        .supervisor()
        .start(&target, None, Some(7001))
        .await
        .expect("start");

    assert_eq!(info.alias, "hello");
    assert_eq!(info.port, Some(7001));
    assert_eq!(info.target, target);
    assert_eq!(info.runner_path, target.join("runner.json"));

    let spawned = h.processes.spawned.lock().unwrap().clone();
    assert_eq!(spawned.len(), 1);
    let req = &spawned[0];
    assert!(req.program.contains(".venv"));
    assert_eq!(
        req.args,
        vec![target.join("server.py").to_string_lossy().into_owned()]
    );
    assert_eq!(req.cwd, target);
    assert_eq!(req.env.get("PORT").map(String::as_str), Some("7001"));
    assert_eq!(req.env.get("MCP_MODE").map(String::as_str), Some("sse"));
    assert_eq!(req.log_path, h.config.log_path("hello"));

    let stored = h.locks.load("hello").await.expect("load").expect("lock");
    assert_eq!(stored, info);
}

#[tokio::test]
async fn start_uses_node_override_for_node_runners() {
    let mut h = Harness::new();
    h.config.node_bin = "/opt/node/bin/node".to_string();
    let target = h.target("web", &json!({"type": "node", "entry": "server.js"}));

    h.supervisor()
        .start(&target, Some("web-1"), None)
        .await
        .expect("start");

    let spawned = h.processes.spawned.lock().unwrap().clone();
    assert_eq!(spawned[0].program, "/opt/node/bin/node");
    assert_eq!(
        spawned[0].env.get("PORT").map(String::as_str),
        Some(h.config.default_port.to_string().as_str())
    );
    assert!(h.locks.exists("web-1"));
}

#[tokio::test]
async fn start_twice_is_a_lock_conflict() {
    let h = Harness::new();
    let target = h.python_target("dup");
    let first = h.supervisor().start(&target, None, None).await.expect("first");

    let err = h
        .supervisor()
        .start(&target, None, Some(9100))
        .await
        .expect_err("second must fail");

    assert!(matches!(
        err.downcast_ref::<RuntimeError>(),
        Some(RuntimeError::LockConflict { alias, .. }) if alias == "dup"
    ));
    assert_eq!(h.processes.spawned.lock().unwrap().len(), 1);
    let kept = h.locks.load("dup").await.expect("load").expect("lock");
    assert_eq!(kept.pid, first.pid);
    assert_eq!(kept.port, first.port);
    assert_eq!(kept, first);
}

#[tokio::test]
async fn start_without_venv_reports_missing_interpreter() {
    let h = Harness::new();
    let target = h.target("novenv", &json!({"type": "python", "entry": "server.py"}));

    let err = h
        .supervisor()
        .start(&target, None, None)
        .await
        .expect_err("must fail");

    assert!(matches!(
        err.downcast_ref::<RuntimeError>(),
        Some(RuntimeError::PythonNotFound(_))
    ));
    assert!(!h.locks.exists("novenv"));
}

#[tokio::test]
async fn start_without_runner_json_is_a_schema_error() {
    let h = Harness::new();
    let target = h.home.path().join("empty");
    std::fs::create_dir_all(&target).expect("mkdir");

    let err = h
        .supervisor()
        .start(&target, None, None)
        .await
        .expect_err("must fail");

    assert!(matches!(
        err.downcast_ref::<SchemaError>(),
        Some(SchemaError::MissingRunner(_))
    ));
}

#[tokio::test]
async fn start_rejects_runner_without_entry() {
    let h = Harness::new();
    let target = h.target("noentry", &json!({"type": "python"}));

    let err = h
        .supervisor()
        .start(&target, None, None)
        .await
        .expect_err("must fail");
    assert!(err.downcast_ref::<SchemaError>().is_some());
}

#[tokio::test]
async fn start_rejects_unsupported_runner_type() {
    let h = Harness::new();
    let target = h.target("rb", &json!({"type": "ruby", "entry": "app.rb"}));

    let err = h
        .supervisor()
        .start(&target, None, None)
        .await
        .expect_err("must fail");
    assert!(matches!(
        err.downcast_ref::<RuntimeError>(),
        Some(RuntimeError::UnsupportedRunner(kind)) if kind == "ruby"
    ));
}

#[tokio::test]
async fn start_rejects_invalid_alias() {
    let h = Harness::new();
    let target = h.python_target("ok");

    let err = h
        .supervisor()
        .start(&target, Some("../escape"), None)
        .await
        .expect_err("must fail");
    assert!(matches!(
        err.downcast_ref::<RuntimeError>(),
        Some(RuntimeError::InvalidAlias(_))
    ));
}

#[tokio::test]
async fn start_skips_busy_ports() {
    let mut h = Harness::new();
    h.ports = BusyPorts(BTreeSet::from([8000, 8001]));
    let target = h.python_target("busy");

    let info = h
        .supervisor()
        .start(&target, None, Some(8000))
        .await
        .expect("start");
    assert_eq!(info.port, Some(8002));
}

#[tokio::test]
async fn start_fails_when_port_budget_is_exhausted() {
    let mut h = Harness::new();
    let start = 9000u16;
    let budget = u16::try_from(PORT_ATTEMPTS).unwrap();
    h.ports = BusyPorts((start..start + budget).collect());
    let target = h.python_target("full");

    let err = h
        .supervisor()
        .start(&target, None, Some(start))
        .await
        .expect_err("must fail");
    assert!(matches!(
        err.downcast_ref::<RuntimeError>(),
        Some(RuntimeError::NoFreePort { .. })
    ));
    assert!(h.processes.spawned.lock().unwrap().is_empty());
}

#[test]
fn find_free_port_never_passes_65535() {
    struct NothingFree;
    impl PortProbe for NothingFree {
        fn is_free(&self, _: u16) -> bool {
            false
        }
    }
    assert!(find_free_port(&NothingFree, 65_530, 100).is_err());
    assert_eq!(
        find_free_port(&BusyPorts(BTreeSet::from([65_534])), 65_534, 100).unwrap(),
        65_535
    );
}

#[test]
fn find_free_port_never_offers_port_zero() {
    assert_eq!(find_free_port(&BusyPorts::default(), 0, 5).unwrap(), 1);
    assert_eq!(
        find_free_port(&BusyPorts(BTreeSet::from([1, 2])), 0, 5).unwrap(),
        3
    );
}

#[tokio::test]
async fn start_with_port_zero_exports_a_real_port() {
    let h = Harness::new();
    let target = h.python_target("zero");

    let info = h.supervisor().start(&target, None, Some(0)).await.expect("start");

    assert_eq!(info.port, Some(1));
    let spawned = h.processes.spawned.lock().unwrap().clone();
    assert_eq!(spawned[0].env.get("PORT").map(String::as_str), Some("1"));
}

// ── stop ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn stop_terminates_and_removes_lock() {
    let h = Harness::new();
    let target = h.python_target("svc");
    let info = h.supervisor().start(&target, None, None).await.expect("start");

    assert!(h.supervisor().stop("svc").await.expect("stop"));

    assert_eq!(h.processes.terminated.lock().unwrap().clone(), vec![info.pid]);
    assert!(!h.locks.exists("svc"));
    assert!(!h.supervisor().stop("svc").await.expect("second stop"));
}

#[tokio::test]
async fn stop_of_dead_process_still_removes_lock() {
    let h = Harness::new();
    let target = h.python_target("gone");
    let info = h.supervisor().start(&target, None, None).await.expect("start");
    h.processes.kill_externally(info.pid);

    assert!(h.supervisor().stop("gone").await.expect("stop"));
    assert!(!h.locks.exists("gone"));
}

#[tokio::test]
async fn stop_removes_corrupt_lock() {
    let h = Harness::new();
    let path = h.config.lock_path("broken");
    std::fs::create_dir_all(path.parent().unwrap()).expect("mkdir");
    std::fs::write(&path, "{not json").expect("write");

    assert!(h.supervisor().stop("broken").await.expect("stop"));
    assert!(!path.exists());
    assert!(h.processes.terminated.lock().unwrap().is_empty());
}

// ── status ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn status_lists_live_processes_and_prunes_stale_locks() {
    let h = Harness::new();
    for name in ["zeta", "alpha", "stale"] {
        let target = h.python_target(name);
        h.supervisor().start(&target, None, None).await.expect("start");
    }
    let stale = h.locks.load("stale").await.unwrap().unwrap();
    h.processes.kill_externally(stale.pid);

    let running = h.supervisor().status().await.expect("status");

    let aliases: Vec<&str> = running.iter().map(|i| i.alias.as_str()).collect();
    assert_eq!(aliases, ["alpha", "zeta"]);
    assert!(!h.locks.exists("stale"));
}

#[tokio::test]
async fn status_twice_settles_on_the_same_live_set() {
    let h = Harness::new();
    for name in ["live", "stale"] {
        let target = h.python_target(name);
        h.supervisor().start(&target, None, None).await.expect("start");
    }
    let stale = h.locks.load("stale").await.unwrap().unwrap();
    h.processes.kill_externally(stale.pid);
    let corrupt = h.config.lock_path("broken");
    std::fs::create_dir_all(corrupt.parent().unwrap()).expect("mkdir");
    std::fs::write(&corrupt, "{not json").expect("write");
    let live_lock = std::fs::read(h.config.lock_path("live")).expect("read");

    let first = h.supervisor().status().await.expect("status");
    let after_first = h.locks.aliases().await.expect("aliases");
    let second = h.supervisor().status().await.expect("status");

    assert_eq!(first, second);
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].alias, "live");
    assert_eq!(after_first, ["live"]);
    assert_eq!(h.locks.aliases().await.expect("aliases"), after_first);
    assert!(!corrupt.exists());
    assert_eq!(std::fs::read(h.config.lock_path("live")).expect("read"), live_lock);
    assert!(h.processes.terminated.lock().unwrap().is_empty());
}

#[tokio::test]
async fn status_is_empty_without_state_dir() {
    let h = Harness::new();
    assert!(h.supervisor().status().await.expect("status").is_empty());
}

// ── logs ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn tail_logs_reads_the_alias_log() {
    let h = Harness::new();
    let log = h.config.log_path("svc");
    std::fs::create_dir_all(log.parent().unwrap()).expect("mkdir");
    std::fs::write(&log, "a\nb\nc\n").expect("write");

    let lines: Vec<String> = h
        .supervisor()
        .tail_logs("svc", false, 2)
        .expect("tail")
        .collect();
    assert_eq!(lines, ["b", "c"]);
    assert_eq!(
        h.supervisor().tail_logs("other", false, 5).expect("tail").count(),
        0
    );
}

// ── doctor ───────────────────────────────────────────────────────────────────

async fn write_lock(h: &Harness, alias: &str, pid: u32, port: Option<u16>) {
    let info = LockInfo {
        alias: alias.to_string(),
        pid,
        port,
        started_at: Utc::now(),
        target: h.home.path().to_path_buf(),
        runner_path: h.home.path().join("runner.json"),
    };
    h.locks.create(&info).await.expect("create lock");
}

#[tokio::test]
async fn doctor_without_lock_fails() {
    let h = Harness::new();
    let report = h
        .supervisor()
        .doctor("nobody", Duration::from_secs(1))
        .await
        .expect("doctor");
    assert_eq!(report.status, HealthStatus::Fail);
    assert!(report.reason.contains("no lock file"));
}

#[tokio::test]
async fn doctor_reports_dead_process() {
    let h = Harness::new();
    write_lock(&h, "dead", 999_999, Some(7000)).await;

    let report = h
        .supervisor()
        .doctor("dead", Duration::from_secs(1))
        .await
        .expect("doctor");
    assert_eq!(report.status, HealthStatus::Fail);
    assert!(report.reason.contains("999999"));
}

#[tokio::test]
async fn doctor_ok_on_healthy_endpoint() {
    let h = Harness::new();
    let target = h.python_target("well");
    h.supervisor().start(&target, None, None).await.expect("start");

    let report = h
        .supervisor()
        .doctor("well", Duration::from_secs(5))
        .await
        .expect("doctor");
    assert_eq!(report.status, HealthStatus::Ok);
    assert!(report.latency_ms.is_some());
}

#[tokio::test]
async fn doctor_fails_on_error_status_or_unreachable_endpoint() {
    for health in [FixedHealth(Some(503)), FixedHealth(None)] {
        let mut h = Harness::new();
        h.health = health;
        let target = h.python_target("sick");
        h.supervisor().start(&target, None, None).await.expect("start");

        let report = h
            .supervisor()
            .doctor("sick", Duration::from_secs(5))
            .await
            .expect("doctor");
        assert_eq!(report.status, HealthStatus::Fail, "{}", report.reason);
    }
}

#[tokio::test]
async fn doctor_without_port_checks_liveness_only() {
    let h = Harness::new();
    let target = h.python_target("noport");
    let info = h.supervisor().start(&target, None, None).await.expect("start");
    h.locks.remove("noport").await.expect("remove");
    write_lock(&h, "noport", info.pid, None).await;

    let report = h
        .supervisor()
        .doctor("noport", Duration::from_secs(1))
        .await
        .expect("doctor");
    assert_eq!(report.status, HealthStatus::Ok);
    assert!(report.latency_ms.is_none());
}

// ── Real processes ───────────────────────────────────────────────────────────

#[cfg(unix)]
mod real_process {
    use super::*;
    use matrix_cli::application::ports::ProcessControl;
    use matrix_cli::infra::network::{TcpPortProbe, UreqHealthProbe};
    use matrix_cli::infra::process::OsProcessControl;

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        for _ in 0..100 {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        false
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn start_status_logs_stop_with_a_shell_runner() {
        let home = tempfile::tempdir().expect("tempdir");
        let mut config = MatrixConfig::with_home(home.path());
        config.node_bin = "sh".to_string();
        let target = home.path().join("shell-runner");
        std::fs::create_dir_all(&target).expect("mkdir");
        std::fs::write(
            target.join("runner.json"),
            r#"{"type":"node","entry":"server.js","env":{"GREETING":"hi"}}"#,
        )
        .expect("write");
        std::fs::write(
            target.join("server.js"),
            "echo \"$GREETING from port $PORT\"\nexec sleep 30\n",
        )
        .expect("write");

        let locks = FileLockStore::new(config.state_dir());
        let processes = OsProcessControl;
        let supervisor = RuntimeSupervisor::new(
            &locks,
            &processes,
            &TcpPortProbe,
            &UreqHealthProbe,
            &FileLogReader,
            &config,
        );

        let info = supervisor.start(&target, None, None).await.expect("start");
        assert!(processes.is_alive(info.pid));

        let running = supervisor.status().await.expect("status");
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].pid, info.pid);

        let port = info.port.expect("port");
        let expected = format!("hi from port {port}");
        assert!(
            wait_for(|| {
                supervisor
                    .tail_logs("shell-runner", false, 10)
                    .map(|lines| lines.into_iter().any(|l| l == expected))
                    .unwrap_or(false)
            }),
            "log line never appeared"
        );

        assert!(supervisor.stop("shell-runner").await.expect("stop"));
        assert!(wait_for(|| !processes.is_alive(info.pid)), "child survived SIGTERM");
        assert!(supervisor.status().await.expect("status").is_empty());
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn stop_takes_down_forked_children_and_the_log_goes_quiet() {
        let home = tempfile::tempdir().expect("tempdir");
        let mut config = MatrixConfig::with_home(home.path());
        config.node_bin = "sh".to_string();
        let target = home.path().join("forker");
        std::fs::create_dir_all(&target).expect("mkdir");
        std::fs::write(target.join("runner.json"), r#"{"type":"node","entry":"server.js"}"#)
            .expect("write");
        std::fs::write(
            target.join("server.js"),
            "( while true; do echo tick; sleep 0.1; done ) &\nwait\n",
        )
        .expect("write");

        let locks = FileLockStore::new(config.state_dir());
        let processes = OsProcessControl;
        let supervisor = RuntimeSupervisor::new(
            &locks,
            &processes,
            &TcpPortProbe,
            &UreqHealthProbe,
            &FileLogReader,
            &config,
        );
        let log = config.log_path("forker");
        let log_len = || std::fs::metadata(&log).map(|m| m.len()).unwrap_or(0);

        let info = supervisor.start(&target, None, None).await.expect("start");
        assert!(wait_for(|| log_len() > 0), "forked child never wrote");

        assert!(supervisor.stop("forker").await.expect("stop"));
        assert!(wait_for(|| !processes.is_alive(info.pid)), "leader survived SIGTERM");
        std::thread::sleep(Duration::from_millis(300));
        let settled = log_len();
        std::thread::sleep(Duration::from_millis(800));

        assert_eq!(log_len(), settled, "log kept growing after stop");
        assert!(!locks.exists("forker"));
    }

    #[test]
    fn terminate_unknown_pid_is_not_found() {
        use matrix_cli::application::ports::Termination;
        // Past PID_MAX_LIMIT (2^22).
        let outcome = OsProcessControl.terminate(2_000_000_000).expect("terminate");
        assert_eq!(outcome, Termination::NotFound);
        assert!(!OsProcessControl.is_alive(2_000_000_000));
    }

    #[test]
    fn spawn_failure_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let request = matrix_cli::application::ports::SpawnRequest {
            program: "/definitely/not/here".to_string(),
            args: Vec::new(),
            cwd: dir.path().to_path_buf(),
            env: std::collections::BTreeMap::new(),
            log_path: dir.path().join("logs").join("x.log"),
        };
        assert!(OsProcessControl.spawn_detached(&request).is_err());
    }
}

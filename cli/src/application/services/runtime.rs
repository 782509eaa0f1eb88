//! Application service: runtime supervision of installed runners.
//!
//! Lock files under the state directory are the single source of truth for
//! what is running. Per alias: `Absent → Running → Absent` via `stop`, or
//! `Running → Stale → Absent` when `status` finds the process gone.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info, warn};

use matrix_common::runner::RUNNER_FILE;
use matrix_common::{LockInfo, RunnerType};

use crate::application::ports::{
    HealthProbe, LockStore, LogReader, PortProbe, ProcessControl, SpawnRequest, Termination,
};
use crate::domain::archive::contained_join;
use crate::domain::config::MatrixConfig;
use crate::domain::error::{RuntimeError, SchemaError};
use crate::domain::health::{DoctorReport, health_url, judge_response};
use crate::domain::runner::{parse_runner, validate_alias, venv_python};

/// Ports tried before giving up, starting at the requested one.
pub const PORT_ATTEMPTS: u32 = 100;

/// Supervises detached runner processes through lock files.
pub struct RuntimeSupervisor<'a, L, P, N, H, G> {
    locks: &'a L,
    processes: &'a P,
    ports: &'a N,
    health: &'a H,
    logs: &'a G,
    config: &'a MatrixConfig,
}

impl<'a, L, P, N, H, G> RuntimeSupervisor<'a, L, P, N, H, G>
where
    L: LockStore,
    P: ProcessControl,
    N: PortProbe,
    H: HealthProbe,
    G: LogReader,
{
    #[must_use]
    pub fn new(
        locks: &'a L,
        processes: &'a P,
        ports: &'a N,
        health: &'a H,
        logs: &'a G,
        config: &'a MatrixConfig,
    ) -> Self {
        Self {
            locks,
            processes,
            ports,
            health,
            logs,
            config,
        }
    }

    /// Start the runner installed at `target` as a detached process.
    ///
    /// # Errors
    ///
    /// `RuntimeError::LockConflict` if the alias is already supervised,
    /// `SchemaError` for a missing or invalid `runner.json`,
    /// `RuntimeError::PythonNotFound` when the venv was never prepared and
    /// `RuntimeError::NoFreePort` when no port is available.
    pub async fn start(
        &self,
        target: &Path,
        alias: Option<&str>,
        port: Option<u16>,
    ) -> Result<LockInfo> {
        let target = std::path::absolute(target)
            .with_context(|| format!("resolving target {}", target.display()))?;
        let alias = match alias {
            Some(a) => a.to_string(),
            None => target
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };
        validate_alias(&alias)?;

        if self.locks.exists(&alias) {
            return Err(RuntimeError::LockConflict {
                path: self.locks.lock_path(&alias),
                alias,
            }
            .into());
        }

        let runner_path = target.join(RUNNER_FILE);
        if !runner_path.is_file() {
            return Err(SchemaError::MissingRunner(target).into());
        }
        let bytes = std::fs::read(&runner_path)
            .with_context(|| format!("reading {}", runner_path.display()))?;
        let runner = parse_runner(&runner_path, &bytes)?;

        let entry = contained_join(&target, &runner.entry)?;
        let program = match runner.runner_type() {
            Some(RunnerType::Python) => {
                let venv = contained_join(&target, runner.venv_dir())?;
                let python = venv_python(&venv);
                if !python.is_file() {
                    return Err(RuntimeError::PythonNotFound(python).into());
                }
                python.to_string_lossy().into_owned()
            }
            Some(RunnerType::Node) => self.config.node_bin.clone(),
            None => return Err(RuntimeError::UnsupportedRunner(runner.kind.clone()).into()),
        };

        let requested = port.unwrap_or(self.config.default_port);
        let chosen = find_free_port(self.ports, requested, PORT_ATTEMPTS)?;
        if chosen != requested {
            warn!(requested, chosen, "start: requested port busy; using next free port");
        }

        let mut env: BTreeMap<String, String> = runner.env.clone();
        env.insert("PORT".to_string(), chosen.to_string());
        let request = SpawnRequest {
            program,
            args: vec![entry.to_string_lossy().into_owned()],
            cwd: target.clone(),
            env,
            log_path: self.config.log_path(&alias),
        };
        debug!(program = %request.program, args = ?request.args, "start: spawning");
        let pid = self.processes.spawn_detached(&request)?;

        let info = LockInfo {
            alias: alias.clone(),
            pid,
            port: Some(chosen),
            started_at: Utc::now(),
            target,
            runner_path,
        };
        if let Err(e) = self.locks.create(&info).await {
            warn!(pid, "start: could not persist lock; terminating child");
            if let Err(kill_err) = self.processes.terminate(pid) {
                warn!("start: terminating pid {pid} failed: {kill_err:#}");
            }
            return Err(e);
        }
        info!(alias = %alias, pid, port = chosen, "start: runner started");
        Ok(info)
    }

    /// Stop the process recorded for `alias`.
    ///
    /// Returns `false` when there was nothing to stop. The lock file is
    /// always removed.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid alias or when the lock file cannot be
    /// removed.
    pub async fn stop(&self, alias: &str) -> Result<bool> {
        validate_alias(alias)?;
        let info = match self.locks.load(alias).await {
            Ok(Some(info)) => info,
            Ok(None) => {
                debug!(alias, "stop: no lock file");
                return Ok(false);
            }
            Err(e) => {
                warn!(alias, "stop: removing unreadable lock file: {e:#}");
                self.locks.remove(alias).await?;
                return Ok(true);
            }
        };

        match self.processes.terminate(info.pid) {
            Ok(Termination::Signalled) => info!(alias, pid = info.pid, "stop: sent SIGTERM"),
            Ok(Termination::NotFound) => {
                info!(alias, pid = info.pid, "stop: process already gone");
            }
            Err(e) => warn!(alias, pid = info.pid, "stop: terminate failed: {e:#}"),
        }
        self.locks.remove(alias).await?;
        Ok(true)
    }

    /// Every supervised process that is still alive. Stale and corrupt lock
    /// files are deleted along the way.
    ///
    /// # Errors
    ///
    /// Returns an error only if the state directory cannot be listed.
    pub async fn status(&self) -> Result<Vec<LockInfo>> {
        let mut running = Vec::new();
        for alias in self.locks.aliases().await? {
            match self.locks.load(&alias).await {
                Ok(Some(info)) if self.processes.is_alive(info.pid) => running.push(info),
                Ok(Some(info)) => {
                    warn!(alias = %alias, pid = info.pid, "status: removing stale lock");
                    self.remove_quietly(&alias).await;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(alias = %alias, "status: removing corrupt lock: {e:#}");
                    self.remove_quietly(&alias).await;
                }
            }
        }
        running.sort_by(|a, b| a.alias.cmp(&b.alias));
        Ok(running)
    }

    async fn remove_quietly(&self, alias: &str) {
        if let Err(e) = self.locks.remove(alias).await {
            warn!(alias, "status: could not remove lock: {e:#}");
        }
    }

    /// Lines of the alias's log. See [`LogReader::tail`].
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid alias or an unreadable log file.
    pub fn tail_logs(&self, alias: &str, follow: bool, n: usize) -> Result<G::Lines> {
        validate_alias(alias)?;
        self.logs.tail(&self.config.log_path(alias), follow, n)
    }

    /// Probe liveness and, when a port was recorded, the health endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error only for an invalid alias; every runtime condition is
    /// reported through [`DoctorReport`].
    pub async fn doctor(&self, alias: &str, timeout: Duration) -> Result<DoctorReport> {
        validate_alias(alias)?;
        let info = match self.locks.load(alias).await {
            Ok(Some(info)) => info,
            Ok(None) => return Ok(DoctorReport::fail("Server not running (no lock file).")),
            Err(e) => return Ok(DoctorReport::fail(format!("Lock file is unreadable: {e:#}"))),
        };
        if !self.processes.is_alive(info.pid) {
            return Ok(DoctorReport::fail(format!("Process {} not found.", info.pid)));
        }
        let Some(port) = info.port else {
            return Ok(DoctorReport::ok(format!(
                "Process {} is running (no port to check).",
                info.pid
            )));
        };

        let url = health_url(port);
        debug!(%url, "doctor: probing health endpoint");
        let started = Instant::now();
        let report = match self.health.get_status(&url, timeout).await {
            Ok(status) => judge_response(&url, status, started.elapsed(), timeout),
            Err(e) => DoctorReport::fail(format!("HTTP request to health endpoint failed: {e:#}"))
                .with_latency(started.elapsed()),
        };
        Ok(report)
    }
}

/// First port at or after `start` that `probe` reports free. Port 0 is
/// never returned; a search from 0 begins at 1.
///
/// # Errors
///
/// Returns [`RuntimeError::NoFreePort`] after `attempts` ports or on reaching
/// 65535.
pub fn find_free_port(probe: &impl PortProbe, start: u16, attempts: u32) -> Result<u16, RuntimeError> {
    let first = u32::from(start.max(1));
    let last = first.saturating_add(attempts.saturating_sub(1)).min(u32::from(u16::MAX));
    for candidate in first..=last {
        let Ok(port) = u16::try_from(candidate) else {
            break;
        };
        if probe.is_free(port) {
            return Ok(port);
        }
        debug!(port, "start: port busy");
    }
    Err(RuntimeError::NoFreePort { start, attempts })
}

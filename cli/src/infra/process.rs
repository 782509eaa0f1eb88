//! Infrastructure implementation of the `ProcessControl` port.
//!
//! Children are spawned as leaders of their own process group with stdin
//! from null and stdout/stderr appended to the alias log; termination
//! signals the whole group. A reaper thread waits on each
//! child so a long-lived caller never accumulates zombies; the child itself
//! outlives the caller.

use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use tracing::debug;

use crate::application::ports::{ProcessControl, SpawnRequest, Termination};

/// Production process control (POSIX signals via `nix`).
pub struct OsProcessControl;

impl ProcessControl for OsProcessControl {
    fn spawn_detached(&self, request: &SpawnRequest) -> Result<u32> {
        if let Some(parent) = request.log_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating log directory {}", parent.display()))?;
        }
        let log = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&request.log_path)
            .with_context(|| format!("opening log file {}", request.log_path.display()))?;
        let log_err = log
            .try_clone()
            .with_context(|| format!("duplicating log handle {}", request.log_path.display()))?;

        let mut command = Command::new(&request.program);
        command
            .args(&request.args)
            .current_dir(&request.cwd)
            .envs(&request.env)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err));
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut child = command
            .spawn()
            .with_context(|| format!("failed to spawn {}", request.program))?;
        let pid = child.id();
        debug!(pid, program = %request.program, "process: spawned");

        std::thread::Builder::new()
            .name(format!("reap-{pid}"))
            .spawn(move || {
                if let Err(e) = child.wait() {
                    debug!(pid, "process: wait failed: {e}");
                }
            })
            .context("starting reaper thread")?;
        Ok(pid)
    }

    #[cfg(unix)]
    fn is_alive(&self, pid: u32) -> bool {
        use nix::errno::Errno;
        use nix::sys::signal::kill;

        let Some(target) = to_pid(pid) else {
            return false;
        };
        match kill(target, None) {
            Ok(()) | Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    #[cfg(not(unix))]
    fn is_alive(&self, _pid: u32) -> bool {
        false
    }

    /// SIGTERM the child's whole process group, forked descendants included.
    #[cfg(unix)]
    fn terminate(&self, pid: u32) -> Result<Termination> {
        use nix::errno::Errno;
        use nix::sys::signal::{Signal, killpg};

        let Some(group) = to_pid(pid) else {
            return Ok(Termination::NotFound);
        };
        match killpg(group, Signal::SIGTERM) {
            Ok(()) => {
                debug!(pid, "process: SIGTERM sent to process group");
                Ok(Termination::Signalled)
            }
            Err(Errno::ESRCH) => Ok(Termination::NotFound),
            Err(e) => Err(anyhow::anyhow!("sending SIGTERM to process group {pid}: {e}")),
        }
    }

    #[cfg(not(unix))]
    fn terminate(&self, pid: u32) -> Result<Termination> {
        anyhow::bail!("terminating pid {pid} is only supported on unix")
    }
}

/// PIDs 0 and values past `i32::MAX` would address process groups or wrap.
#[cfg(unix)]
fn to_pid(pid: u32) -> Option<nix::unistd::Pid> {
    i32::try_from(pid)
        .ok()
        .filter(|p| *p > 0)
        .map(nix::unistd::Pid::from_raw)
}

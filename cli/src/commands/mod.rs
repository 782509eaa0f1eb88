//! Command implementations

pub mod build;
pub mod doctor;
pub mod logs;
pub mod start;
pub mod status;
pub mod stop;
pub mod version;

use crate::application::services::runtime::RuntimeSupervisor;
use crate::domain::config::MatrixConfig;
use crate::infra::lock_store::FileLockStore;
use crate::infra::log_tail::FileLogReader;
use crate::infra::network::{TcpPortProbe, UreqHealthProbe};
use crate::infra::process::OsProcessControl;

/// Production adapters behind the runtime commands.
pub struct RuntimeDeps {
    locks: FileLockStore,
    processes: OsProcessControl,
    ports: TcpPortProbe,
    health: UreqHealthProbe,
    logs: FileLogReader,
}

/// The supervisor type every runtime command drives.
pub type Supervisor<'a> = RuntimeSupervisor<
    'a,
    FileLockStore,
    OsProcessControl,
    TcpPortProbe,
    UreqHealthProbe,
    FileLogReader,
>;

impl RuntimeDeps {
    #[must_use]
    pub fn new(config: &MatrixConfig) -> Self {
        Self {
            locks: FileLockStore::new(config.state_dir()),
            processes: OsProcessControl,
            ports: TcpPortProbe,
            health: UreqHealthProbe,
            logs: FileLogReader,
        }
    }

    #[must_use]
    pub fn supervisor<'a>(&'a self, config: &'a MatrixConfig) -> Supervisor<'a> {
        RuntimeSupervisor::new(
            &self.locks,
            &self.processes,
            &self.ports,
            &self.health,
            &self.logs,
            config,
        )
    }
}

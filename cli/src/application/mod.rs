//! Ports and the services built on them.
//!
//! Depends on `crate::domain` and `matrix_common` only.

pub mod ports;
pub mod services;

pub use ports::{
    ArtifactFetcher, CatalogClient, CommandRunner, Downloader, HealthProbe, LockStore, LogReader,
    PortProbe, ProcessControl, ProgressReporter,
};

pub mod lock;
pub mod plan;
pub mod runner;

pub use lock::LockInfo;
pub use plan::{ArtifactSpec, FileContent, FileEntry, GitSpec, HttpSpec};
pub use runner::{NodeSection, PythonSection, RunnerDescriptor, RunnerType};

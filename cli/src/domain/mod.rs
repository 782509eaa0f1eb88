//! Domain layer: pure business logic, types, and validation.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All functions are synchronous and take data in, returning data out.

pub mod archive;
pub mod config;
pub mod error;
pub mod git;
pub mod health;
pub mod plan;
pub mod pyproject;
pub mod runner;

pub use config::MatrixConfig;
pub use error::{BuildError, FetchError, PlanError, RuntimeError, SchemaError, TimeoutError};
pub use health::{DoctorReport, HealthStatus};
pub use plan::InstallOutcome;

//! Infrastructure layer: concrete implementations of application port traits.
//!
//! This module contains all I/O-performing code: process execution, HTTP and
//! git fetching, archive extraction, lock files, log files and configuration
//! loading.
//!
//! Imports from `crate::domain` and `crate::application::ports` are allowed.
//! Imports from `crate::commands` or `crate::output` are forbidden.

pub mod archive;
pub mod catalog;
pub mod command_runner;
pub mod config;
pub mod fetcher;
pub mod fs;
pub mod git;
pub mod lock_store;
pub mod log_tail;
pub mod network;
pub mod process;

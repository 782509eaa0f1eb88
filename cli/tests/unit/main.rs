//! Unit tests for the matrix CLI
//!
//! These tests use mocked ports and tempdirs and run without network access.

mod git_fetcher;
mod lock_store;
mod runtime_service;

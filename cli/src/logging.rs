//! Tracing subscriber setup for the `matrix` binary.

use tracing_subscriber::EnvFilter;

use crate::domain::config::is_truthy;

/// Filter used when nothing asks for more.
pub const DEFAULT_FILTER: &str = "warn";

/// Resolve the `EnvFilter` directives.
///
/// `--verbose` wins, then `RUST_LOG`, then the `MATRIX_SDK_DEBUG` and
/// `MATRIX_SDK_DEBUG_GIT` switches.
#[must_use]
pub fn filter_directives(verbose: bool, lookup: impl Fn(&str) -> Option<String>) -> String {
    if verbose {
        return "warn,matrix_cli=debug".to_string();
    }
    if let Some(rust_log) = lookup("RUST_LOG").filter(|v| !v.trim().is_empty()) {
        return rust_log;
    }
    let mut directives = vec![DEFAULT_FILTER.to_string()];
    if lookup("MATRIX_SDK_DEBUG").is_some_and(|v| is_truthy(&v)) {
        directives.push("matrix_cli=debug".to_string());
    }
    if lookup("MATRIX_SDK_DEBUG_GIT").is_some_and(|v| v.trim() == "1") {
        directives.push("matrix_cli::infra::git=debug".to_string());
    }
    directives.join(",")
}

/// Install the global subscriber writing to stderr. Safe to call once.
pub fn init(verbose: bool) {
    let directives = filter_directives(verbose, |key| std::env::var(key).ok());
    let filter =
        EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .try_init();
}

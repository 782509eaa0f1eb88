//! Per-invocation state shared by the command handlers: how to print and the
//! configuration resolved at startup.

use anyhow::Result;

use crate::domain::config::MatrixConfig;
use crate::infra::config::load_config;
use crate::output::{HumanRenderer, OutputContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    /// One JSON document on stdout per invocation.
    Json,
}

/// The global `--no-color`, `--quiet` and `--json` flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputFlags {
    pub no_color: bool,
    pub quiet: bool,
    pub json: bool,
}

/// Handed to every command handler.
pub struct AppContext {
    /// Forced quiet in JSON mode so only the document reaches stdout.
    pub output: OutputContext,
    pub mode: OutputMode,
    pub config: MatrixConfig,
}

impl AppContext {
    /// Load the configuration from `MATRIX_HOME`, its `config.yaml` and the
    /// process environment.
    ///
    /// # Errors
    ///
    /// Returns an error for an unreadable config file or a malformed
    /// variable.
    pub fn new(flags: OutputFlags) -> Result<Self> {
        let config = load_config(|key| std::env::var(key).ok())?;
        Ok(Self::with_config(flags, config))
    }

    /// Context over a configuration built elsewhere (tests, embedding).
    #[must_use]
    pub fn with_config(flags: OutputFlags, config: MatrixConfig) -> Self {
        let mode = if flags.json {
            OutputMode::Json
        } else {
            OutputMode::Human
        };
        Self {
            output: OutputContext::new(flags.no_color, flags.quiet || flags.json),
            mode,
            config,
        }
    }

    #[must_use]
    pub fn is_json(&self) -> bool {
        self.mode == OutputMode::Json
    }

    /// Human renderer over this context's output.
    #[must_use]
    pub fn human(&self) -> HumanRenderer<'_> {
        HumanRenderer::new(&self.output)
    }
}

//! Human-readable terminal renderer.

use std::path::Path;

use chrono::{DateTime, Utc};

use matrix_common::LockInfo;

use crate::application::services::install::BuildResult;
use crate::domain::health::DoctorReport;
use crate::output::OutputContext;

/// Renders command results as human-readable terminal output using `OutputContext`.
pub struct HumanRenderer<'a> {
    ctx: &'a OutputContext,
}

impl<'a> HumanRenderer<'a> {
    /// Create a new `HumanRenderer` wrapping the given output context.
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self { ctx }
    }

    /// Render the CLI version information.
    pub fn render_version(&self, version: &str) {
        if !self.ctx.quiet {
            println!("matrix {version}");
        }
    }

    /// Render the outcome of `matrix build`.
    pub fn render_build(&self, result: &BuildResult) {
        if self.ctx.quiet {
            return;
        }
        println!();
        self.ctx.kv("Target:", &result.target.display().to_string());
        self.ctx.kv("Files:", &result.build.files_written.to_string());
        self.ctx.kv(
            "Artifacts:",
            &format!(
                "{} fetched, {} skipped",
                result.build.artifacts_fetched, result.build.artifacts_skipped
            ),
        );
        match &result.runner {
            Some(runner) => self
                .ctx
                .kv("Runner:", &format!("{} ({})", runner.entry, runner.kind)),
            None => self.ctx.kv("Runner:", "none"),
        }
        for note in result.build.notes.iter().chain(&result.env.notes) {
            self.ctx.warn(note);
        }
        if result.runner.is_some() {
            println!();
            self.ctx
                .info(&format!("Start it: matrix start {}", result.target.display()));
        }
    }

    /// Render a freshly started runner.
    pub fn render_started(&self, info: &LockInfo, log_path: &Path) {
        let port = info
            .port
            .map_or_else(|| "-".to_string(), |p| p.to_string());
        self.ctx.success(&format!(
            "Started {} (pid {}, port {port})",
            info.alias, info.pid
        ));
        self.ctx.kv("Logs:", &log_path.display().to_string());
    }

    /// Render the result of `matrix stop`.
    pub fn render_stopped(&self, alias: &str, stopped: bool) {
        if stopped {
            self.ctx.success(&format!("Stopped {alias}"));
        } else {
            self.ctx.info(&format!("{alias} is not running"));
        }
    }

    /// Render supervised processes as a table.
    pub fn render_status(&self, running: &[LockInfo], now: DateTime<Utc>) {
        if self.ctx.quiet {
            return;
        }
        if running.is_empty() {
            self.ctx.info("No runners are running.");
            return;
        }
        self.ctx.header(&format!(
            "{:<20} {:>8} {:>6} {:>8}  {}",
            "ALIAS", "PID", "PORT", "UPTIME", "TARGET"
        ));
        for info in running {
            let port = info
                .port
                .map_or_else(|| "-".to_string(), |p| p.to_string());
            let uptime = u64::try_from((now - info.started_at).num_seconds()).unwrap_or(0);
            println!(
                "  {:<20} {:>8} {:>6} {:>8}  {}",
                info.alias,
                info.pid,
                port,
                format_uptime(uptime),
                info.target.display()
            );
        }
    }

    /// Render a health report.
    pub fn render_doctor(&self, alias: &str, report: &DoctorReport) {
        let latency = report
            .latency_ms
            .map(|ms| format!(" ({ms} ms)"))
            .unwrap_or_default();
        if report.is_ok() {
            self.ctx
                .success(&format!("{alias}: {}{latency}", report.reason));
        } else {
            self.ctx.error(&format!("{alias}: {}{latency}", report.reason));
        }
    }
}

// ── Display helpers (used by tests and output layer) ─────────────────────────

#[must_use]
pub fn format_uptime(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m")
    } else {
        format!("{seconds}s")
    }
}

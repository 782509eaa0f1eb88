//! `matrix doctor`: liveness and health check for one runner.

use std::time::Duration;

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::commands::RuntimeDeps;
use crate::output::{json, progress};

/// Arguments for the doctor command.
#[derive(Args)]
pub struct DoctorArgs {
    /// Alias given at start
    pub alias: String,

    /// Seconds to wait for the health endpoint
    #[arg(long, value_name = "SECS", default_value_t = 5)]
    pub timeout: u64,
}

/// Run `matrix doctor`. A failing report is printed, not returned as an
/// error.
///
/// # Errors
///
/// Returns an error only for an invalid alias.
pub async fn run(app: &AppContext, args: &DoctorArgs) -> Result<()> {
    let deps = RuntimeDeps::new(&app.config);
    let pb = progress::maybe_spinner(
        app.output.show_progress(),
        &format!("Checking {}...", args.alias),
    );
    let report = deps
        .supervisor(&app.config)
        .doctor(&args.alias, Duration::from_secs(args.timeout))
        .await;
    progress::finish_clear(&pb);
    let report = report?;

    if app.is_json() {
        json::print(&report)
    } else {
        app.human().render_doctor(&args.alias, &report);
        Ok(())
    }
}

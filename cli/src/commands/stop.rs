//! `matrix stop`: terminate a supervised runner.

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::commands::RuntimeDeps;
use crate::output::json;

/// Arguments for the stop command.
#[derive(Args)]
pub struct StopArgs {
    /// Alias given at start
    pub alias: String,
}

/// Run `matrix stop`. Stopping an alias that is not running is not an error.
///
/// # Errors
///
/// Returns an error for an invalid alias or an unremovable lock file.
pub async fn run(app: &AppContext, args: &StopArgs) -> Result<()> {
    let deps = RuntimeDeps::new(&app.config);
    let stopped = deps.supervisor(&app.config).stop(&args.alias).await?;

    if app.is_json() {
        json::print(&serde_json::json!({ "alias": args.alias, "stopped": stopped }))
    } else {
        app.human().render_stopped(&args.alias, stopped);
        Ok(())
    }
}

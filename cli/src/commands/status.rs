//! `matrix status`: list supervised runners that are still alive.

use anyhow::Result;
use chrono::Utc;

use crate::app::AppContext;
use crate::commands::RuntimeDeps;
use crate::output::json;

/// Run `matrix status`.
///
/// # Errors
///
/// Returns an error if the state directory cannot be listed.
pub async fn run(app: &AppContext) -> Result<()> {
    let deps = RuntimeDeps::new(&app.config);
    let running = deps.supervisor(&app.config).status().await?;

    if app.is_json() {
        json::print(&running)
    } else {
        app.human().render_status(&running, Utc::now());
        Ok(())
    }
}

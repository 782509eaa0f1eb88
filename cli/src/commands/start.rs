//! `matrix start`: launch an installed runner in the background.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::commands::RuntimeDeps;
use crate::output::json;

/// Arguments for the start command.
#[derive(Args)]
pub struct StartArgs {
    /// Install directory containing runner.json
    pub target: PathBuf,

    /// Name to supervise the process under (default: directory name)
    #[arg(long)]
    pub alias: Option<String>,

    /// Preferred port; the next free one is used if it is taken
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
    pub port: Option<u16>,
}

/// Run `matrix start`.
///
/// # Errors
///
/// Returns an error if the alias is already running, the runner is invalid
/// or the process cannot be spawned.
pub async fn run(app: &AppContext, args: &StartArgs) -> Result<()> {
    let deps = RuntimeDeps::new(&app.config);
    let info = deps
        .supervisor(&app.config)
        .start(&args.target, args.alias.as_deref(), args.port)
        .await?;

    if app.is_json() {
        json::print(&info)
    } else {
        app.human()
            .render_started(&info, &app.config.log_path(&info.alias));
        Ok(())
    }
}

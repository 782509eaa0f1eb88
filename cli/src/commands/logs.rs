//! `matrix logs`: print or follow a runner's log file.

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::commands::RuntimeDeps;

/// Arguments for the logs command.
#[derive(Args)]
pub struct LogsArgs {
    /// Alias given at start
    pub alias: String,

    /// Keep printing lines as they are appended
    #[arg(short, long)]
    pub follow: bool,

    /// Number of trailing lines to show
    #[arg(short = 'n', long = "lines", default_value_t = 20)]
    pub lines: usize,
}

/// Run `matrix logs`.
///
/// Lines are printed verbatim; `--json` and `--quiet` do not apply. With
/// `--follow` this runs until interrupted.
///
/// # Errors
///
/// Returns an error for an invalid alias or an unreadable log file.
pub async fn run(app: &AppContext, args: &LogsArgs) -> Result<()> {
    let deps = RuntimeDeps::new(&app.config);
    let config = app.config.clone();
    let alias = args.alias.clone();
    let (follow, n) = (args.follow, args.lines);

    // Follow mode blocks between polls.
    tokio::task::spawn_blocking(move || -> Result<()> {
        let lines = deps.supervisor(&config).tail_logs(&alias, follow, n)?;
        for line in lines {
            println!("{line}");
        }
        Ok(())
    })
    .await??;
    Ok(())
}

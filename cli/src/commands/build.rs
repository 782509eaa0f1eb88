//! `matrix build`: plan, materialize and prepare a runner locally.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::services::install::InstallOrchestrator;
use crate::infra::archive::{ArchiveFetcher, UreqDownloader};
use crate::infra::catalog::{AnyCatalog, FileCatalogClient, HttpCatalogClient};
use crate::infra::command_runner::{DEFAULT_CMD_TIMEOUT, TokioCommandRunner};
use crate::infra::fetcher::SecureFetcher;
use crate::infra::git::GitFetcher;
use crate::output::{TerminalReporter, json};

/// Arguments for the build command.
#[derive(Args)]
pub struct BuildArgs {
    /// Catalog id, e.g. `mcp_server:hello@0.1.0`
    pub id: String,

    /// Install directory (default: ~/.matrix/runners/<alias-or-name>/<version>)
    #[arg(long, value_name = "DIR")]
    pub target: Option<PathBuf>,

    /// Alias used for the default install directory
    #[arg(long)]
    pub alias: Option<String>,

    /// Read the install plan from a local JSON file instead of the catalog
    #[arg(long, value_name = "FILE")]
    pub plan_file: Option<PathBuf>,

    /// Budget in seconds for each environment preparation command
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

/// Run `matrix build`.
///
/// # Errors
///
/// Returns the first failing stage's error.
pub async fn run(app: &AppContext, args: &BuildArgs) -> Result<()> {
    let config = &app.config;
    let catalog = match &args.plan_file {
        Some(path) => AnyCatalog::File(FileCatalogClient::new(path.clone())),
        None => AnyCatalog::Http(HttpCatalogClient::new(
            &config.hub_url,
            config.hub_token.clone(),
        )),
    };
    let commands = TokioCommandRunner::new(DEFAULT_CMD_TIMEOUT);
    let downloader = UreqDownloader::new();
    let fetcher = SecureFetcher::new(
        ArchiveFetcher::new(&downloader, config.http_fetch_timeout),
        GitFetcher::new(&commands, &config.git),
    );
    let reporter = TerminalReporter::new(&app.output);
    let orchestrator = InstallOrchestrator::new(&catalog, &fetcher, &commands, &reporter, config);

    let timeout = args.timeout.map_or(config.env_timeout, Duration::from_secs);
    let result = orchestrator
        .build(
            &args.id,
            args.target.as_deref(),
            args.alias.as_deref(),
            timeout,
        )
        .await?;

    if app.is_json() {
        json::print(&result)
    } else {
        app.human().render_build(&result);
        Ok(())
    }
}

//! Matrix CLI - install, prepare and supervise catalog runners locally

use clap::Parser;

use matrix_cli::cli::Cli;
use matrix_cli::domain::error::error_code;
use matrix_cli::output::json;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    matrix_cli::logging::init(cli.verbose);
    let as_json = cli.json;
    if let Err(e) = cli.run().await {
        match json::format_error(&format!("{e:#}"), error_code(&e)) {
            Ok(text) if as_json => println!("{text}"),
            _ => eprintln!("Error: {e:#}"),
        }
        std::process::exit(1);
    }
}

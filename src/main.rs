//! claude-workflow CLI entry point.
//!
//! A thin composition layer: parse CLI arguments, initialize logging,
//! dispatch to [`claude_workflow::cli::execute_command`], and map any error
//! to an exit code via [`claude_workflow::app::handle_fatal_error`].

use clap::Parser;

use claude_workflow::app::{handle_fatal_error, init_logging, AppConfig};
use claude_workflow::cli::{execute_command, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let app_config = match AppConfig::new(cli.verbose) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to initialize application configuration: {e}");
            std::process::exit(1);
        }
    };
    init_logging(&app_config);

    let verbose = cli.verbose;
    match execute_command(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => handle_fatal_error(e, verbose),
    }
}

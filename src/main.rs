use clap::Parser;

use studiopay::cli::{self, Cli, Commands};
use studiopay::server::Server;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let settings = match cli::load_and_merge_config(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = cli::init_logger_from_settings(&settings) {
        eprintln!("Logger initialization error: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = cli::execute_command(&cli, settings.clone()).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Serve without --dry-run, or no subcommand at all, falls through to the
    // long-running server.
    let start_server = match &cli.command {
        Some(Commands::Serve { dry_run, .. }) => !*dry_run,
        None => true,
        Some(_) => false,
    };

    if start_server
        && let Err(e) = Server::new(settings).run().await
    {
        tracing::error!(error = %e, "Server terminated with error");
        std::process::exit(1);
    }
}

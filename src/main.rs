//! Dave CLI entry point.

use clap::Parser;

use dave::cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve(args) => dave::cli::commands::serve::execute(args, cli.json).await,
        Commands::CheckConfig(args) => {
            dave::cli::commands::check_config::execute(args, cli.json).await
        }
    };

    if let Err(err) = result {
        dave::cli::handle_error(err, cli.json);
    }
}

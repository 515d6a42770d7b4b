//! Command-line interface.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};

use commands::check_config::CheckConfigArgs;
use commands::serve::ServeArgs;

#[derive(Parser)]
#[command(name = "dave")]
#[command(about = "Dave - career coach chat gateway", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP gateway
    Serve(ServeArgs),

    /// Validate configuration and exit
    CheckConfig(CheckConfigArgs),
}

/// Print an error in the selected format and exit non-zero.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let body = serde_json::json!({
            "success": false,
            "error": format!("{err:#}"),
        });
        eprintln!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("Error: {err:#}");
    }
    std::process::exit(1);
}

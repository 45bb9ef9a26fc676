//! Halo CLI entry point.

use clap::Parser;

use halo::cli::{handle_error, Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run(args) => halo::cli::commands::run::execute(args, cli.json).await,
        Commands::Config(args) => halo::cli::commands::config::execute(args, cli.json).await,
    };

    if let Err(err) = result {
        handle_error(&err, cli.json);
    }
}

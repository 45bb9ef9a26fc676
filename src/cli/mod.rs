//! Command-line interface for the halo loop.

pub mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "halo", version, about = "Self-healing remediation loop")]
pub struct Cli {
    /// Emit machine-readable JSON output
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the remediation loop and run until interrupted
    Run(commands::run::RunArgs),
    /// Print the effective configuration
    Config(commands::config::ConfigArgs),
}

/// Report a fatal command error and exit non-zero.
pub fn handle_error(err: &anyhow::Error, json: bool) -> ! {
    if json {
        eprintln!("{}", serde_json::json!({ "error": err.to_string() }));
    } else {
        eprintln!("error: {:#}", err);
    }
    std::process::exit(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_structure() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_with_config() {
        let cli = Cli::parse_from(["halo", "run", "--config", "custom.yaml"]);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.config.unwrap().to_str().unwrap(), "custom.yaml");
            }
            Commands::Config(_) => panic!("expected run command"),
        }
    }
}

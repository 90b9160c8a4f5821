//! tirecast - command-line tools for the tire temperature engine.
//!
//! Inspects and maintains the data directory the engine writes: stored
//! sessions, learned patterns and per-car models.

mod commands;
mod error;
mod runner;

use clap::{Parser, Subcommand};

use commands::config::ConfigCommands;

#[derive(Debug, Parser)]
#[command(name = "tirecast", version, about = "Tire temperature forecasting tools")]
struct Cli {
    /// Mirror debug logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show storage usage, stored sessions, patterns and models
    Stats,

    /// Train the model for one car from its stored sessions
    Train {
        /// Car identifier as recorded in the session
        #[arg(long)]
        car: String,

        /// Install the new model even if it validates worse than the current one
        #[arg(long)]
        force: bool,
    },

    /// Run a storage pass now, synthesizing and deleting old data over budget
    Cleanup,

    /// Replay a stored session and report forecast error at each pit stop
    Replay {
        /// Session identifier
        session_id: String,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// View or edit configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Stats => commands::stats::run(cli.verbose),
        Commands::Train { car, force } => commands::train::run(&car, force, cli.verbose),
        Commands::Cleanup => commands::cleanup::run(cli.verbose),
        Commands::Replay { session_id, json } => {
            commands::replay::run(&session_id, json, cli.verbose)
        }
        Commands::Config(command) => commands::config::run(command),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_train() {
        let cli = Cli::try_parse_from(["tirecast", "train", "--car", "bmw_m4_gt3"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Train { ref car, force: false } if car == "bmw_m4_gt3"
        ));
    }

    #[test]
    fn test_parse_train_force() {
        let cli =
            Cli::try_parse_from(["tirecast", "train", "--car", "bmw_m4_gt3", "--force"]).unwrap();
        assert!(matches!(cli.command, Commands::Train { force: true, .. }));
    }

    #[test]
    fn test_train_requires_car() {
        assert!(Cli::try_parse_from(["tirecast", "train"]).is_err());
    }

    #[test]
    fn test_parse_replay_json() {
        let cli = Cli::try_parse_from(["tirecast", "-v", "replay", "race-1", "--json"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::Replay { ref session_id, json: true } if session_id == "race-1"
        ));
    }
}

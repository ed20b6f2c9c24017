//! Command-line interface for FutureBot.

pub mod commands;

use clap::{Parser, Subcommand};

/// FutureBot - Vedic astrology gateway
#[derive(Parser)]
#[command(name = "futurebot")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP gateway and the midnight refresh job
    #[command(alias = "-d", alias = "--daemon")]
    Serve,

    /// Validate the config and ping local storage and the backend
    #[command(alias = "-c", alias = "--check")]
    Check,

    /// Rebuild the notification schedule once and print it
    Reschedule,

    /// Manage the local response caches
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },

    /// Manage the config file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// Remove every cached backend response
    Clear,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Create a default config.toml if none exists
    #[command(alias = "--init")]
    Init,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_commands() {
        let cli = Cli::try_parse_from(["futurebot", "cache", "clear"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Cache {
                command: CacheCommands::Clear
            })
        ));

        let cli = Cli::try_parse_from(["futurebot"]).unwrap();
        assert!(cli.command.is_none());
    }
}

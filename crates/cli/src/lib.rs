use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "matchbook")]
#[command(about = "Matchbook - a durable multi-instrument matching engine")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the matching service with the given configuration
    Start {
        /// Path to the configuration file
        #[arg(short, long, default_value = "matchbook.yaml")]
        config: PathBuf,
    },

    /// Validate a configuration file without starting the service
    Validate {
        /// Path to the configuration file
        #[arg(short, long, default_value = "matchbook.yaml")]
        config: PathBuf,
    },

    /// Write a new configuration file with defaults
    Init {
        /// Output path for the new configuration file
        #[arg(short, long, default_value = "matchbook.yaml")]
        output: PathBuf,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_defaults() {
        let cli = Cli::try_parse_from(["matchbook", "start"]).unwrap();
        match cli.command {
            Commands::Start { config } => {
                assert_eq!(config, PathBuf::from("matchbook.yaml"));
            }
            other => panic!("expected start, got {other:?}"),
        }
    }

    #[test]
    fn test_init_custom_output() {
        let cli = Cli::try_parse_from(["matchbook", "init", "--output", "/tmp/mb.yaml"]).unwrap();
        match cli.command {
            Commands::Init { output } => assert_eq!(output, PathBuf::from("/tmp/mb.yaml")),
            other => panic!("expected init, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_command_rejected() {
        assert!(Cli::try_parse_from(["matchbook", "serve"]).is_err());
    }
}

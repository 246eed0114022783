use clap::{Parser, Subcommand};

/// CLI for devdesk
#[derive(Parser, Debug)]
#[command(
    name = "devdesk",
    version,
    about = "Supervisor for a browser-reachable remote desktop"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start services and supervise them until Ctrl+C
    Run {
        /// File path to the configuration file (TOML)
        #[arg(short, long)]
        file: Option<String>,

        /// Services to start, with their dependencies. All if empty
        services: Vec<String>,

        /// Restart failed services every SECS seconds
        #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
        heal_every: Option<u64>,
    },
    /// Validate a configuration file and print the start order
    Check {
        /// File path to the configuration file (TOML)
        #[arg(short, long)]
        file: Option<String>,
    },
}

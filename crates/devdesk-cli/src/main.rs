use anyhow::Result;
use clap::Parser;

mod commands;
mod config;
mod logger;

pub const DEFAULT_FILENAMES: [&str; 2] = ["devdesk.toml", ".devdesk.toml"];

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = config::Cli::parse();

    match cli.command {
        config::Commands::Run {
            file,
            services,
            heal_every,
        } => commands::run::run(file, services, heal_every).await,
        config::Commands::Check { file } => commands::check::check(file),
    }
}

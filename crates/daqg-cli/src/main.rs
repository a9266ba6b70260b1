mod cli;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run { config_dir, bind, port, max_buffer, retention_days } => {
            commands::run(config_dir, bind, port, max_buffer, retention_days, cli.token).await
        }
        Command::Status => commands::status(cli.remote, cli.token).await,
        Command::Sources => commands::sources(cli.remote, cli.token).await,
        Command::Source { id } => commands::source(id, cli.remote, cli.token).await,
        Command::Connector { id, action } => {
            commands::connector(id, action, cli.remote, cli.token).await
        }
        Command::Discovery { id } => commands::discovery(id, cli.remote, cli.token).await,
        Command::Configure { id } => commands::configure(id, cli.remote, cli.token).await,
        Command::Data { query } => commands::data(query, cli.remote, cli.token).await,
    }
}

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "daqg", about = "Industrial data-acquisition gateway", version)]
pub struct Cli {
    /// Talk to a running gateway's control plane instead of starting one.
    #[arg(long, env = "DAQG_URL", global = true)]
    pub remote: Option<String>,

    /// Bearer token for --remote requests (or the running server's own token).
    #[arg(long, env = "DAQG_API_KEY", global = true)]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the gateway: loads config, runs the engine and control plane.
    Run {
        /// Directory containing sources.yml, storage.yml and mapping.yml.
        #[arg(long, default_value = "./config")]
        config_dir: PathBuf,

        /// Control-plane listen address.
        #[arg(long, env = "DAQG_BIND", default_value = "0.0.0.0")]
        bind: String,

        /// Control-plane listen port.
        #[arg(long, env = "DAQG_PORT", default_value_t = 8080)]
        port: u16,

        /// Overrides the configured buffer's max entry count (§4.5).
        #[arg(long, env = "DAQG_MAX_BUFFER")]
        max_buffer: Option<usize>,

        /// Overrides the configured buffer's retention window, in days (§4.5).
        #[arg(long, env = "DAQG_RETENTION_DAYS")]
        retention_days: Option<u64>,
    },

    /// Process + engine snapshot (GET /status).
    Status,

    /// List configured sources and their runtime status.
    Sources,

    /// Show one source.
    Source {
        id: String,
    },

    /// Start, stop, or restart a connector.
    Connector {
        id: String,
        #[command(subcommand)]
        action: ConnectorAction,
    },

    /// Show a connector's cached discovery catalog.
    Discovery {
        id: String,
    },

    /// Promote a connector's discovery catalog into its live config and restart it.
    Configure {
        id: String,
    },

    /// Query the buffer.
    Data {
        #[command(subcommand)]
        query: DataQuery,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConnectorAction {
    Start,
    Stop,
    Restart,
}

#[derive(Debug, Subcommand)]
pub enum DataQuery {
    /// Most recent records across all sources.
    Latest {
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
    /// Most recent records for one source.
    Source {
        id: String,
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
    /// Records between two RFC3339 timestamps.
    Range {
        start: String,
        end: String,
    },
    /// Records matching a free-text search.
    Search {
        query: String,
    },
    /// Export recent records as JSON or CSV.
    Export {
        #[arg(long, default_value = "json")]
        format: String,
        #[arg(long, default_value_t = 1000)]
        limit: usize,
    },
}

//! Argument parsing. Environment variables are layered under explicit
//! flags via clap's `env` feature; a flag always wins over its variable.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "mcp-portal", version, about = "MCP aggregation gateway")]
pub struct Cli {
    /// Host to bind the HTTP surface to.
    #[arg(long, env = "MCP_PORTAL_HOST", default_value = "0.0.0.0", global = true)]
    pub host: String,

    /// Port to bind the HTTP surface to.
    #[arg(long, env = "MCP_PORTAL_PORT", default_value_t = 8020, global = true)]
    pub port: u16,

    /// `tracing_subscriber::EnvFilter` directive string.
    #[arg(long, env = "MCP_PORTAL_LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,

    /// Override for the manual-source directory (default `~/.mcp-portal`).
    #[arg(long, env = "MCP_PORTAL_CONFIG_DIR", global = true)]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the gateway server (default when no subcommand is given).
    Serve,
    /// Scan every known config location and print the discovered servers.
    Discover,
    /// Read or replace the manual-source configuration document.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the current manual-source document.
    Get,
    /// Replace the manual-source document with the JSON file at `path`.
    Set {
        /// Path to a JSON file shaped like `{"mcpServers": {...}}`.
        path: PathBuf,
    },
}

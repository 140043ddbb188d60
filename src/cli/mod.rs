//! Command-line interface.

mod cache;
mod config;
mod logging;
mod serve;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

use rostercache::config::Config;

pub(crate) use logging::init_tracing;

#[derive(Parser, Debug)]
#[command(name = "rostercache", version, about = "Self-healing cache for the roster backend")]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.rostercache/config.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// Run the API server and the cache health monitor
    Serve {
        /// Override the listen port
        #[arg(long)]
        port: Option<u16>,
        /// Do not start the background health monitor
        #[arg(long)]
        no_monitor: bool,
    },
    /// Inspect or manage the cache of a running server
    Cache {
        #[command(subcommand)]
        action: CacheSubcommand,
        /// Server base URL (defaults to http://127.0.0.1:<server.port>)
        #[arg(long)]
        server: Option<String>,
        /// Admin token (defaults to server.admin_token)
        #[arg(long)]
        token: Option<String>,
    },
    /// Show configuration
    Config {
        #[command(subcommand)]
        action: ConfigSubcommand,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub(crate) enum CacheSubcommand {
    /// Show health snapshot and cached entries
    Info,
    /// Remove one cached key
    Clear { key: String },
    /// Remove every cached key
    ClearAll,
    /// Resolve a key through the cache and report where it came from
    Test {
        key: String,
        /// Bypass the cache and refetch from the backend
        #[arg(long)]
        refresh: bool,
    },
    /// Run a health sweep now
    Sweep,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConfigSubcommand {
    /// Print the effective configuration
    Show,
    /// Print the default config file path
    Path,
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let config = match path {
        Some(p) => Config::load_at(p)?,
        None => Config::load()?,
    };
    Ok(config)
}

/// Dispatch a parsed command line.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_ref())?;
    match cli.command {
        Commands::Serve { port, no_monitor } => {
            let mut config = config;
            if let Some(port) = port {
                config.server.port = port;
            }
            serve::cmd_serve(config, no_monitor).await
        }
        Commands::Cache {
            action,
            server,
            token,
        } => {
            let base = server.unwrap_or_else(|| format!("http://127.0.0.1:{}", config.server.port));
            let token = token.or(config.server.admin_token);
            cache::cmd_cache(action, &base, token).await
        }
        Commands::Config { action } => config::cmd_config(action, &config),
    }
}

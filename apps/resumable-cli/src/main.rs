//! Resumable upload client entry point.

mod commands;
mod config;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use resumable_protocol::Dialect;
use tracing_subscriber::EnvFilter;

/// Uploads files with a resumable upload protocol.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Configuration file (defaults to ~/.config/resumable/client.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Creation endpoint (overrides the configured one)
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Wire dialect: tus-v1, ietf-draft-03 or ietf-draft-05
    #[arg(long, global = true)]
    dialect: Option<Dialect>,

    /// Bytes per PATCH request
    #[arg(long, global = true)]
    chunk_size: Option<u64>,

    /// Number of parts uploaded concurrently
    #[arg(long, global = true)]
    parallel: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start a new upload
    Upload {
        file: PathBuf,
        /// Metadata entries as key=value
        #[arg(long = "meta", value_parser = parse_key_value)]
        metadata: Vec<(String, String)>,
    },
    /// Continue the most recent interrupted upload of a file
    Resume { file: PathBuf },
    /// Delete an upload on the server
    Terminate {
        url: String,
        /// Also drop the stored resumption record with this key
        #[arg(long)]
        forget: Option<String>,
    },
    /// List stored resumption records
    List,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got `{s}`"))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => config::Config::load_from(path)?,
        None => config::Config::load()?,
    };
    if let Some(endpoint) = cli.endpoint {
        config.endpoint = endpoint;
    }
    if let Some(dialect) = cli.dialect {
        config.dialect = dialect;
    }
    if let Some(chunk_size) = cli.chunk_size {
        config.chunk_size = chunk_size;
    }
    if let Some(parallel) = cli.parallel {
        config.parallel_uploads = parallel;
    }
    tracing::debug!(endpoint = %config.endpoint, dialect = %config.dialect, "configuration loaded");

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        match cli.command {
            Command::Upload { file, metadata } => {
                commands::upload(&config, &file, metadata.into_iter().collect(), false).await
            }
            Command::Resume { file } => {
                commands::upload(&config, &file, Default::default(), true).await
            }
            Command::Terminate { url, forget } => {
                commands::terminate(&config, &url, forget.as_deref()).await
            }
            Command::List => commands::list(&config),
        }
    })
}

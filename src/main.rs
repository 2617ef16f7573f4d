//! kvshim CLI
//!
//! Command-line access to the key-value storage, persisted under a data
//! directory.
//!
//! # Usage
//!
//! ```bash
//! # Store a structured value
//! kvshim set profile '{"name": "ada", "tags": [1, 2]}'
//!
//! # Store a plain string
//! kvshim set greeting hello
//!
//! # Read, count, remove
//! kvshim get profile
//! kvshim length
//! kvshim remove greeting
//!
//! # Without the transactional backend
//! kvshim --flat-only set k v
//! ```

use clap::{Parser, Subcommand};
use kvshim::{select_backend, HostEnvironment, Storage, StorageConfig};
use serde_json::Value;

// =============================================================================
// TigerStyle Constants
// =============================================================================

/// Default data directory
pub const DATA_DIR_DEFAULT: &str = "~/.kvshim";

/// Application name
pub const APP_NAME: &str = "kvshim";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// CLI
// =============================================================================

/// Uniform key-value storage over an object store or a flat store
#[derive(Parser, Debug)]
#[command(name = APP_NAME)]
#[command(about = "Uniform key-value storage over an object store or a flat store")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding the persisted stores
    #[arg(long, default_value = DATA_DIR_DEFAULT)]
    data_dir: String,

    /// Use the flat backend even though the object store is available
    #[arg(long)]
    flat_only: bool,

    /// Log backend errors
    #[arg(long)]
    debug: bool,

    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the value stored under a key
    Get {
        /// Key to read
        key: String,
    },
    /// Store a value (parsed as JSON, otherwise stored as a string)
    Set {
        /// Key to write
        key: String,
        /// Value to write
        value: String,
    },
    /// Remove a key
    Remove {
        /// Key to remove
        key: String,
    },
    /// Remove every key
    Clear,
    /// Print the number of keys
    Length,
    /// Print which backend serves the storage
    Backend,
}

/// JSON if it parses, otherwise the text itself.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!("{} v{}", APP_NAME, APP_VERSION);

    let mut config = StorageConfig::from_env()?;
    config.debug |= cli.debug;
    config.force_flat |= cli.flat_only;

    // Expand data directory
    let data_dir = shellexpand::tilde(&cli.data_dir).to_string();
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Data directory: {}", data_dir);

    let host = HostEnvironment::on_disk(std::path::Path::new(&data_dir))?;
    let storage = select_backend(&host, &config);

    match cli.command {
        Commands::Get { key } => {
            let value = storage.try_get(&key).await?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Commands::Set { key, value } => {
            storage.try_set(&key, parse_value(&value)).await?;
        }
        Commands::Remove { key } => {
            storage.try_remove(&key).await?;
        }
        Commands::Clear => {
            storage.try_clear().await?;
        }
        Commands::Length => {
            println!("{}", storage.try_length().await?);
        }
        Commands::Backend => {
            println!("{}", storage.kind());
        }
    }

    Ok(())
}

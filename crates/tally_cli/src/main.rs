//! Tally CLI
//!
//! Operator tools for tally instance snapshots.
//!
//! # Commands
//!
//! - `export` - Write a user's dataset to a snapshot file
//! - `import` - Merge a snapshot file into a user's dataset
//! - `inspect` - Show what a snapshot file contains
//! - `redact` - Mask secrets in text read from stdin
//! - `settings` - List the setting keys a snapshot may carry

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tally_codec::DEFAULT_MAX_DOCUMENT_SIZE;
use tally_core::EngineConfig;
use tracing_subscriber::EnvFilter;

/// Tally snapshot tools.
#[derive(Parser)]
#[command(name = "tally")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store file
    #[arg(global = true, short, long, env = "TALLY_STORE")]
    store: Option<PathBuf>,

    /// Environment variable holding the passphrase
    #[arg(global = true, long, default_value = "TALLY_PASSPHRASE")]
    passphrase_env: String,

    /// Largest accepted snapshot, in bytes
    #[arg(global = true, long, default_value_t = DEFAULT_MAX_DOCUMENT_SIZE)]
    max_document_size: usize,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a user's dataset to a snapshot file
    Export {
        /// Owner of the dataset
        #[arg(short, long)]
        user: u64,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Seal the snapshot with the passphrase
        #[arg(short, long)]
        encrypt: bool,
    },

    /// Merge a snapshot file into a user's dataset
    Import {
        /// Owner of the dataset
        #[arg(short, long)]
        user: u64,

        /// Snapshot file
        #[arg(short, long = "in")]
        input: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show what a snapshot file contains
    Inspect {
        /// Snapshot file
        #[arg(short, long = "in")]
        input: PathBuf,

        /// Open a sealed snapshot with the passphrase
        #[arg(short, long)]
        decrypt: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Mask secrets in text read from stdin
    Redact {
        /// Value to replace with a fixed marker
        #[arg(long = "secret")]
        secrets: Vec<String>,

        /// Value to mask except for its last characters
        #[arg(long = "keyword")]
        keywords: Vec<String>,
    },

    /// List the setting keys a snapshot may carry
    Settings,

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so exports can be piped.
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = EngineConfig::new().max_document_size(cli.max_document_size);

    match cli.command {
        Commands::Export { user, out, encrypt } => {
            let store = cli.store.ok_or("Store path required for export")?;
            let passphrase = if encrypt {
                Some(commands::passphrase(&cli.passphrase_env)?)
            } else {
                None
            };
            commands::export::run(
                &store,
                user,
                out.as_deref(),
                passphrase.as_deref().map(String::as_str),
                &config,
            )?;
        }
        Commands::Import {
            user,
            input,
            format,
        } => {
            let store = cli.store.ok_or("Store path required for import")?;
            let passphrase = commands::optional_passphrase(&cli.passphrase_env);
            commands::import::run(
                &store,
                user,
                &input,
                passphrase.as_deref().map(String::as_str),
                &config,
                &format,
            )?;
        }
        Commands::Inspect {
            input,
            decrypt,
            format,
        } => {
            let passphrase = if decrypt {
                Some(commands::passphrase(&cli.passphrase_env)?)
            } else {
                None
            };
            commands::inspect::run(
                &input,
                passphrase.as_deref().map(String::as_str),
                &config,
                &format,
            )?;
        }
        Commands::Redact { secrets, keywords } => {
            let stdin = std::io::stdin();
            let stdout = std::io::stdout();
            commands::redact::run(&secrets, &keywords, stdin.lock(), stdout.lock())?;
        }
        Commands::Settings => {
            commands::settings::run();
        }
        Commands::Version => {
            println!("Tally CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Tally Core v{}", tally_core::VERSION);
            println!(
                "Snapshot format v{}",
                tally_codec::CURRENT_FORMAT_VERSION
            );
        }
    }

    Ok(())
}

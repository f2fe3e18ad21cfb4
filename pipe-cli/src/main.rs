//! # airpipe
//!
//! Send a file to anyone with a link.
//!
//! ## Commands
//!
//! - `send`: Offer a file and print a link (or join a receiver's link)
//! - `receive`: Ask for a file and print a link (or join a sender's link)
//!
//! ## Example
//!
//! ```bash
//! # Print a link and QR code, wait for the other side
//! airpipe send photo.jpg
//!
//! # On another machine, open the link or join it from the terminal
//! airpipe receive --link 'https://airpipe.sanyamgarg.com/d/…#…' ~/Downloads
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod display;

use commands::{receive, send};
use config::{FileConfig, Overrides, Settings};

/// End-to-end encrypted file transfer through a relay.
#[derive(Parser, Debug)]
#[command(name = "airpipe")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Relay address (ws:// or wss://)
    #[arg(long, global = true)]
    relay: Option<String>,

    /// Config file (default: platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Plaintext bytes per chunk
    #[arg(long, global = true)]
    chunk_size: Option<usize>,

    /// Seconds to wait for the other party
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Send a file
    Send {
        /// File to send
        file: PathBuf,

        /// Join a receiver's link instead of creating one
        #[arg(long)]
        link: Option<String>,
    },

    /// Receive a file
    Receive {
        /// Directory to save into
        #[arg(default_value = ".")]
        dir: PathBuf,

        /// Join a sender's link instead of creating one
        #[arg(long)]
        link: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!();
        eprintln!("  ✗ Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let file = FileConfig::load(cli.config.as_deref())?;
    let settings = Settings::resolve(
        file,
        Overrides {
            relay: cli.relay,
            chunk_size: cli.chunk_size,
            peer_timeout_secs: cli.timeout,
        },
    );
    tracing::debug!(?settings, "resolved settings");

    match cli.command {
        Commands::Send { file, link } => send::run(&file, link.as_deref(), &settings).await,
        Commands::Receive { dir, link } => receive::run(&dir, link.as_deref(), &settings).await,
    }
}

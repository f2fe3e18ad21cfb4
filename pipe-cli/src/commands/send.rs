//! Send a file.

use anyhow::{Context, Result};
use pipe_client::{Sender, SessionConfig};
use pipe_types::Role;
use std::path::Path;

use super::{apply, config_from_link, print_link, print_progress};
use crate::config::Settings;
use crate::display::fmt_bytes;

/// Run the send command.
///
/// Without `link` a new session is created and its link printed; with
/// `link` the sender joins the slot a receiver already opened.
pub async fn run(file: &Path, link: Option<&str>, settings: &Settings) -> Result<()> {
    let meta = std::fs::metadata(file)
        .with_context(|| format!("Cannot read {}", file.display()))?;
    if !meta.is_file() {
        anyhow::bail!("{} is not a regular file", file.display());
    }
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    println!();
    println!("  AirPipe - Send");
    println!();
    println!("  File: {} ({})", name, fmt_bytes(meta.len()));
    println!();

    let config = match link {
        Some(link) => config_from_link(link, Role::Accept, settings)?,
        None => apply(SessionConfig::generate(&settings.relay)?, settings),
    };
    let mut sender = Sender::new(config);

    if link.is_none() {
        print_link(&sender.pairing_link()?.to_url()?)?;
    }
    println!("  🔒 E2E Encrypted");

    sender
        .connect()
        .await
        .with_context(|| format!("Failed to join relay {}", sender.config().relay_url))?;
    if !sender.state().is_paired() {
        println!("  ⏳ Waiting for receiver...");
        sender.wait_for_peer(settings.peer_timeout).await?;
    }
    println!("  ✓ Connected!");
    println!();

    let result = sender.send_file(file, print_progress).await;
    println!();
    sender.close().await;

    let summary = result?;
    tracing::info!(chunks = summary.chunks, "send complete");
    println!();
    println!("  ✓ Done! Sent {}", fmt_bytes(summary.bytes));
    Ok(())
}

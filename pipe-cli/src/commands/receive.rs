//! Receive a file.

use anyhow::{Context, Result};
use pipe_client::{Receiver, SessionConfig};
use pipe_types::Role;
use std::path::Path;

use super::{apply, config_from_link, print_link, print_progress};
use crate::config::Settings;
use crate::display::fmt_bytes;

/// Run the receive command.
///
/// Without `link` a new session is created and its link printed so the
/// other party can upload; with `link` the receiver joins a sender's slot.
pub async fn run(dest_dir: &Path, link: Option<&str>, settings: &Settings) -> Result<()> {
    if !dest_dir.is_dir() {
        anyhow::bail!("{} is not a directory", dest_dir.display());
    }

    println!();
    println!("  AirPipe - Receive");
    println!();

    let config = match link {
        Some(link) => config_from_link(link, Role::Offer, settings)?,
        None => apply(SessionConfig::generate(&settings.relay)?, settings),
    };
    let mut receiver = Receiver::new(config);

    if link.is_none() {
        print_link(&receiver.pairing_link()?.to_url()?)?;
    }
    println!("  🔒 E2E Encrypted");

    receiver
        .connect()
        .await
        .with_context(|| format!("Failed to join relay {}", receiver.config().relay_url))?;
    if !receiver.state().is_paired() {
        println!("  ⏳ Waiting for sender...");
        receiver.wait_for_peer(settings.peer_timeout).await?;
    }
    println!("  ✓ Connected!");
    println!();

    let result = receiver.receive_file(dest_dir, print_progress).await;
    println!();
    receiver.close().await;

    let summary = result?;
    println!();
    println!("  File: {} ({})", summary.name, fmt_bytes(summary.bytes));
    println!("  ✓ Saved: {}", summary.path.display());
    Ok(())
}

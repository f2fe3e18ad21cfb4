//! CLI command implementations.

pub mod receive;
pub mod send;

use anyhow::{bail, Context, Result};
use pipe_client::SessionConfig;
use pipe_core::PairingLink;
use pipe_types::Role;
use std::io::Write;

use crate::config::Settings;
use crate::display::progress_bar;

/// Session configuration for joining another party's link.
///
/// `expected` is the role of the party that shared the link.
fn config_from_link(link: &str, expected: Role, settings: &Settings) -> Result<SessionConfig> {
    let link = PairingLink::parse(link).context("Invalid pairing link")?;
    if link.role() != expected {
        match link.role() {
            Role::Offer => bail!("This link offers a file; run `airpipe receive --link` instead"),
            Role::Accept => bail!("This link asks for a file; run `airpipe send --link` instead"),
        }
    }
    Ok(apply(SessionConfig::from_link(&link)?, settings))
}

fn apply(config: SessionConfig, settings: &Settings) -> SessionConfig {
    config
        .with_chunk_size(settings.chunk_size)
        .with_peer_timeout(settings.peer_timeout)
}

fn print_link(url: &str) -> Result<()> {
    println!("{}", crate::display::render_qr(url)?);
    println!("  {url}");
    println!();
    Ok(())
}

fn print_progress(done: u64, total: u64) {
    print!("\r  {}", progress_bar(done, total));
    std::io::stdout().flush().ok();
}

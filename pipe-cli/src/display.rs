//! Terminal output helpers.

use anyhow::{Context, Result};
use qrcode::render::unicode::Dense1x2;
use qrcode::QrCode;

/// Width of the progress bar in cells.
const BAR_WIDTH: usize = 40;

/// Human-readable size: `B`, `KB`, `MB`, `GB` with one decimal above bytes.
pub fn fmt_bytes(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    if bytes < UNIT {
        return format!("{bytes} B");
    }

    let mut value = bytes as f64 / UNIT as f64;
    let mut suffix = 0;
    while value >= UNIT as f64 && suffix < 3 {
        value /= UNIT as f64;
        suffix += 1;
    }
    format!("{value:.1} {}", ["KB", "MB", "GB", "TB"][suffix])
}

/// `[████░░░░]  42%` for `done` out of `total`.
pub fn progress_bar(done: u64, total: u64) -> String {
    let ratio = if total == 0 {
        1.0
    } else {
        (done.min(total)) as f64 / total as f64
    };
    let filled = (ratio * BAR_WIDTH as f64) as usize;
    format!(
        "[{}{}] {:>3.0}%",
        "█".repeat(filled),
        "░".repeat(BAR_WIDTH - filled),
        ratio * 100.0
    )
}

/// Render `data` as a QR code using half-block characters.
pub fn render_qr(data: &str) -> Result<String> {
    let code = QrCode::new(data.as_bytes()).context("Pairing link too long for a QR code")?;
    Ok(code
        .render::<Dense1x2>()
        .dark_color(Dense1x2::Light)
        .light_color(Dense1x2::Dark)
        .quiet_zone(true)
        .build())
}

//! pixel-sink: a raw frame receiver for small panels
//!
//! Accepts one image per HTTP connection and draws it without ever holding
//! the whole frame in memory:
//! - `POST /update-image` with exactly `width * height * 2` bytes of
//!   little-endian RGB565
//! - Body streamed in bounded row chunks straight to the display
//! - Every read and write guarded by a deadline
//! - Configuration via CLI arguments or TOML file

mod config;
mod display;
mod protocols;
mod runtime;
#[cfg(test)]
mod testing;
mod transfer;

use config::Config;
use display::Framebuffer;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Color the panel shows before the first upload.
const BACKGROUND: u16 = 0x0000;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        listen = %config.listen,
        width = config.width,
        height = config.height,
        path = %config.upload_path,
        chunk_rows = config.chunk_rows,
        payload_bytes = config.geometry().payload_len(),
        memory_budget = ?config.memory_budget,
        "Starting pixel-sink"
    );

    let mut display = Framebuffer::new(config.width, config.height);
    display.fill(BACKGROUND);
    if let Some(path) = &config.snapshot {
        info!(path = %path.display(), "Writing frame snapshots");
        display = display.with_snapshot(path.clone());
    }

    runtime::run(&config, &mut display)?;
    Ok(())
}

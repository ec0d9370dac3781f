//! kiln-worker: child-process worker for the Kiln worker pool
//!
//! Reads one JSON task per line on stdin and writes one JSON reply per line on
//! stdout. Logs go to stderr, filtered by `KILN_LOG`.
//!
//! The stock binary links no transforms, so every task fails with a
//! "no worker context configured" error. Embedders build their own worker
//! around [`serve_stdio`] with a real context.

use anyhow::{Context, Result};
use kiln_sys::worker::{serve_stdio, UnconfiguredContext};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_env("KILN_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_env_filter(filter)
        .init();

    tracing::debug!(pid = std::process::id(), "worker started");
    serve_stdio(&UnconfiguredContext).context("worker I/O failed")?;
    Ok(())
}

//! Top-level error type for building a compiler system

use thiserror::Error;

use crate::config::ConfigError;
use crate::loader::FetchError;
use crate::worker::WorkerError;

/// Errors raised while assembling a [`CompilerSystem`](crate::CompilerSystem).
///
/// Runtime operations never return this: filesystem failures are carried in
/// result values and worker failures reject their task.
#[derive(Debug, Error)]
pub enum SysError {
    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The HTTP client could not be constructed
    #[error("Fetch setup failed: {0}")]
    Fetch(#[from] FetchError),

    /// The worker pool could not be created
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// The current directory could not be determined
    #[error("Failed to determine current directory: {0}")]
    CurrentDir(#[source] std::io::Error),
}

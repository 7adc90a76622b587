//! Error types for the dashboard service
//!
//! This module defines the crate-wide `Result` alias (anyhow) and typed errors
//! for the failures callers may want to match on.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific dashboard scenarios
#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    #[error("Failed to bind dashboard server on {address}: {message}")]
    BindFailed { address: String, message: String },

    #[error("Invalid server address: {address}")]
    InvalidAddress { address: String },
}

//! Common error types for the bridge.
//!
//! A single thiserror enum covers both sides of the bridge: local faults
//! (configuration, I/O) and device-side faults (malformed packets,
//! RPC errors reported by the vacuum, missed response deadlines).

use std::time::Duration;
use thiserror::Error;

/// Main error type for bridge operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors from tokio or std
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed or unauthentic protocol traffic
    #[error("protocol error: {0}")]
    Protocol(String),

    /// An error reported by the device itself
    #[error("device error {code}: {message}")]
    Device { code: i64, message: String },

    /// The device did not answer in time
    #[error("device did not respond within {0:?}")]
    Timeout(Duration),

    /// Payload (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience type alias for Results using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

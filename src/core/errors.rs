// src/core/errors.rs

//! Defines the primary error type for the caching layer.

use thiserror::Error;

/// The main error enum, representing all failures this layer can surface.
///
/// The type is `Clone` and `PartialEq` because a single settled result is
/// fanned out to every caller coalesced onto the same in-flight request, and
/// tests assert on the exact failure a caller observes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The fetch executor's timeout bound was exceeded.
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    /// A transport-level failure (DNS, connection refused, reset, ...).
    #[error("network error: {0}")]
    Network(String),

    /// The response body could not be decoded as the requested type.
    #[error("payload decode error: {0}")]
    Decode(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

// --- From trait implementations for easy error conversion ---

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::Decode(e.to_string())
    }
}

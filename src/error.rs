//! Error types for purchase-verifier.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the verifier's infrastructure.
///
/// These never reach a requesting member directly; the verification engine
/// folds them into [`crate::verify::VerifyError::VerificationFailed`].
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be loaded or is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The redemption ledger could not be read or written.
    #[error("ledger error: {0}")]
    Ledger(String),

    /// The payment provider could not be queried.
    #[error("purchase lookup failed: {0}")]
    Lookup(String),

    /// Encoding or decoding a record failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<rmp_serde::encode::Error> for Error {
    fn from(e: rmp_serde::encode::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::Lookup(e.to_string())
    }
}

//! Error types and result aliases for Scribe primitives.

use crate::canonical_json::EncodingError;

/// The result type used throughout `scribe-core`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when working with Scribe primitives.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An invalid identifier was provided.
    #[error("invalid identifier: {message}")]
    InvalidId {
        /// Description of what made the ID invalid.
        message: String,
    },

    /// A value could not be canonicalized for sealing.
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),
}

impl Error {
    /// Creates a new invalid-identifier error.
    #[must_use]
    pub fn invalid_id(message: impl Into<String>) -> Self {
        Self::InvalidId {
            message: message.into(),
        }
    }
}

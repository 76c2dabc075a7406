//! Error types for the dispatch domain.
//!
//! Every failure is a typed variant so CLI/UI collaborators can render an
//! actionable message and exit code. Integrity mismatches found during audit
//! are deliberately NOT errors; they are reported inside the audit report.

use scribe_core::EncodingError;

/// The result type used throughout `scribe-dispatch`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in dispatch operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or missing required input fields. Not retried.
    #[error("validation error: {message}")]
    Validation {
        /// Description of what failed validation.
        message: String,
    },

    /// The referenced entity does not exist.
    #[error("not found: {resource_type} with id {id}")]
    NotFound {
        /// The type of resource that was not found.
        resource_type: &'static str,
        /// The identifier that was looked up.
        id: String,
    },

    /// A freshly generated dispatch ID collided with an existing one.
    ///
    /// Astronomically unlikely; the ledger regenerates and retries.
    #[error("duplicate dispatch id: {id}")]
    DuplicateId {
        /// The colliding identifier.
        id: String,
    },

    /// The dispatch already carries a result and overwrite was not requested.
    #[error("dispatch {dispatch_id} is already completed")]
    AlreadyCompleted {
        /// The completed dispatch.
        dispatch_id: String,
    },

    /// Concurrent mutation detected (optimistic lock failure).
    ///
    /// The caller must refetch and may retry at most once.
    #[error("conflict on {resource_type} {id}: expected {expected}, found {actual}")]
    Conflict {
        /// The type of resource that was contended.
        resource_type: &'static str,
        /// The contended identifier.
        id: String,
        /// What the caller expected to find.
        expected: String,
        /// What was actually found.
        actual: String,
    },

    /// A workflow phase transition that is not on a legal edge.
    #[error("illegal workflow transition: {from} -> {to}")]
    IllegalTransition {
        /// The current phase.
        from: String,
        /// The requested target phase.
        to: String,
    },

    /// A payload could not be canonicalized for sealing.
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// A storage operation failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A serialization error occurred.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// Invalid configuration was provided.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// An error from scribe-core primitives.
    #[error("core error: {0}")]
    Core(#[from] scribe_core::Error),
}

impl Error {
    /// Creates a new validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a new not-found error.
    #[must_use]
    pub fn not_found(resource_type: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            resource_type,
            id: id.to_string(),
        }
    }

    /// Creates a new storage error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new storage error with a source.
    #[must_use]
    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new serialization error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }
}

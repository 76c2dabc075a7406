//! # scribe-core
//!
//! Core primitives for the Scribe dispatch ledger.
//!
//! This crate provides the foundational types shared by every Scribe
//! component:
//!
//! - **Identifiers**: Strongly-typed IDs for dispatches, runs, queue
//!   entries, replays, and testimonies
//! - **Canonical JSON**: Deterministic serialization for hashing
//! - **Seals**: Tamper-evident digests over a dispatch's classifying
//!   fields and payloads
//! - **Error Types**: Shared error definitions and result types
//! - **Observability**: Logging initialization and span constructors
//!
//! ## Crate Boundary
//!
//! `scribe-core` is the only crate allowed to define shared primitives.
//! The dispatch domain (`scribe-dispatch`) builds on these types and never
//! redefines them.
//!
//! ## Example
//!
//! ```rust
//! use scribe_core::prelude::*;
//! use serde_json::json;
//!
//! let dispatch_id = DispatchId::generate();
//! let input = json!({"prompt": "x"});
//! let result = json!({});
//! let payload = SealPayload {
//!     actor: "Custodian",
//!     realm: "PL-001",
//!     capsule: "Sovereign Crown",
//!     intent: "Crown.Invocation",
//!     input: &input,
//!     result: &result,
//! };
//! let seal = Seal::compute("reasoning", &payload).expect("sealable payload");
//! assert!(seal.verify(&payload).expect("sealable payload"));
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod canonical_json;
pub mod error;
pub mod id;
pub mod observability;
pub mod seal;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use scribe_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::canonical_json::{EncodingError, to_canonical_bytes, to_canonical_string};
    pub use crate::error::{Error, Result};
    pub use crate::id::{DispatchId, EntryId, ReplayId, RunId, TestimonyId};
    pub use crate::seal::{Seal, SealPayload};
}

// Re-export key types at crate root for ergonomics
pub use canonical_json::{EncodingError, to_canonical_bytes, to_canonical_string};
pub use error::{Error, Result};
pub use id::{DispatchId, EntryId, ReplayId, RunId, TestimonyId};
pub use observability::{LogFormat, init_logging};
pub use seal::{Seal, SealPayload};

//! Strongly-typed identifiers for Scribe entities.
//!
//! All identifiers are:
//! - **Strongly typed**: Mixing up ID kinds is a compile error
//! - **Globally unique**: No coordination required for generation
//! - **Lexicographically sortable**: ULID-based IDs sort by creation time
//!
//! Dispatch identifiers additionally carry a human-scannable prefix and
//! date so operators can read them off a log line:
//! `SCB-20250115-01ARZ3NDEKTSV4RRFFQ69G5FAV`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::{Error, Result};

/// Prefix for dispatch identifiers.
pub const DISPATCH_ID_PREFIX: &str = "SCB";

/// A unique identifier for a recorded dispatch.
///
/// Format: `<PREFIX>-<YYYYMMDD>-<ULID>`. The ULID suffix makes collisions
/// astronomically unlikely; the ledger still regenerates on a duplicate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DispatchId(String);

impl DispatchId {
    /// Generates a new dispatch ID for the current date.
    #[must_use]
    pub fn generate() -> Self {
        Self::generate_at(Utc::now())
    }

    /// Generates a new dispatch ID dated by the given timestamp.
    #[must_use]
    pub fn generate_at(at: DateTime<Utc>) -> Self {
        Self(format!(
            "{DISPATCH_ID_PREFIX}-{}-{}",
            at.format("%Y%m%d"),
            Ulid::new()
        ))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DispatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DispatchId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.splitn(3, '-');
        let (prefix, date, suffix) = match (parts.next(), parts.next(), parts.next()) {
            (Some(p), Some(d), Some(u)) => (p, d, u),
            _ => {
                return Err(Error::invalid_id(format!(
                    "dispatch ID '{s}' must have the form PREFIX-DATE-SUFFIX"
                )));
            }
        };

        if prefix != DISPATCH_ID_PREFIX {
            return Err(Error::invalid_id(format!(
                "dispatch ID '{s}' has prefix '{prefix}', expected '{DISPATCH_ID_PREFIX}'"
            )));
        }
        if date.len() != 8 || !date.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::invalid_id(format!(
                "dispatch ID '{s}' has malformed date segment '{date}'"
            )));
        }
        Ulid::from_string(suffix)
            .map_err(|e| Error::invalid_id(format!("dispatch ID '{s}' has invalid suffix: {e}")))?;

        Ok(Self(s.to_string()))
    }
}

macro_rules! ulid_id {
    ($(#[$doc:meta])* $name:ident, $label:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Ulid);

        impl $name {
            /// Generates a new unique identifier.
            #[must_use]
            pub fn generate() -> Self {
                Self(Ulid::new())
            }

            /// Creates an identifier from a raw ULID.
            #[must_use]
            pub const fn from_ulid(ulid: Ulid) -> Self {
                Self(ulid)
            }

            /// Returns the underlying ULID.
            #[must_use]
            pub const fn as_ulid(&self) -> Ulid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                Ulid::from_string(s).map(Self).map_err(|e| {
                    Error::invalid_id(format!(concat!("invalid ", $label, " ID '{}': {}"), s, e))
                })
            }
        }
    };
}

ulid_id! {
    /// A unique identifier for a workflow run.
    RunId, "run"
}

ulid_id! {
    /// A unique identifier for a replay queue entry.
    EntryId, "queue entry"
}

ulid_id! {
    /// A unique identifier for a replay artifact.
    ///
    /// Every replay mints a fresh one; two replays of the same dispatch are
    /// distinguishable by this ID even when their audit content is identical.
    ReplayId, "replay"
}

ulid_id! {
    /// A unique identifier for a testimony entry.
    TestimonyId, "testimony"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_id_roundtrip() {
        let id = DispatchId::generate();
        let parsed: DispatchId = id.as_str().parse().expect("generated ID must parse");
        assert_eq!(id, parsed);
    }

    #[test]
    fn dispatch_id_has_expected_shape() {
        let id = DispatchId::generate();
        let parts: Vec<&str> = id.as_str().splitn(3, '-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], DISPATCH_ID_PREFIX);
        assert_eq!(parts[1].len(), 8);
        assert_eq!(parts[2].len(), 26);
    }

    #[test]
    fn dispatch_ids_are_unique() {
        assert_ne!(DispatchId::generate(), DispatchId::generate());
    }

    #[test]
    fn dispatch_id_rejects_malformed_input() {
        for bad in [
            "",
            "SCB",
            "SCB-20250115",
            "XXX-20250115-01ARZ3NDEKTSV4RRFFQ69G5FAV",
            "SCB-2025011-01ARZ3NDEKTSV4RRFFQ69G5FAV",
            "SCB-20250115-not-a-ulid",
        ] {
            let result: Result<DispatchId> = bad.parse();
            assert!(result.is_err(), "should reject {bad:?}");
        }
    }

    #[test]
    fn dispatch_id_serializes_as_plain_string() {
        let id = DispatchId::generate();
        let json = serde_json::to_string(&id).expect("serializes");
        assert_eq!(json, format!("\"{id}\""));
    }

    #[test]
    fn run_id_roundtrip() {
        let id = RunId::generate();
        let parsed: RunId = id.to_string().parse().expect("generated ID must parse");
        assert_eq!(id, parsed);
    }

    #[test]
    fn entry_id_rejects_garbage() {
        let result: Result<EntryId> = "not-a-ulid".parse();
        assert!(result.is_err());
    }

    #[test]
    fn replay_ids_are_unique() {
        assert_ne!(ReplayId::generate(), ReplayId::generate());
    }
}

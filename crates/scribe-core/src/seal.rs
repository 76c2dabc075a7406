//! Tamper-evident seals over dispatch payloads.
//!
//! A seal binds a dispatch's classifying fields, input, and result into a
//! single SHA-256 digest computed over their canonical JSON form. Recomputing
//! the digest from a stored record and comparing it to the stored value is
//! how the audit verifier detects tampering or corruption.
//!
//! Seal computation is a pure function: no side effects, deterministic for
//! identical input, and the only code path that may produce a `seal_hash`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::canonical_json::{EncodingError, to_canonical_bytes};

/// The authority tag for reasoning dispatches.
pub const AUTHORITY_REASONING: &str = "reasoning";

/// The authority tag for ceremonial dispatches.
pub const AUTHORITY_CEREMONIAL: &str = "ceremonial";

/// The fields a seal binds, borrowed from a dispatch record.
///
/// `input` and `result` are the JSON forms of the opaque payloads; the
/// canonical serializer sorts their keys so key order never affects the hash.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SealPayload<'a> {
    /// Who requested the work.
    pub actor: &'a str,
    /// Classification realm.
    pub realm: &'a str,
    /// Classification capsule.
    pub capsule: &'a str,
    /// Requested intent.
    pub intent: &'a str,
    /// Request payload.
    pub input: &'a Value,
    /// Produced output (empty object until completion).
    pub result: &'a Value,
}

/// A tamper-evident seal stamped onto a dispatch record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seal {
    /// Classification tag for the sealing authority; informational only.
    pub authority: String,
    /// Lowercase hex SHA-256 digest over the canonical payload.
    pub seal_hash: String,
}

impl Seal {
    /// Computes a seal over the given payload.
    ///
    /// # Errors
    ///
    /// Returns an [`EncodingError`] if the payload cannot be canonicalized
    /// (e.g. contains a float). This is non-retryable; the caller must fix
    /// the input.
    pub fn compute(
        authority: impl Into<String>,
        payload: &SealPayload<'_>,
    ) -> Result<Self, EncodingError> {
        let bytes = to_canonical_bytes(payload)?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(Self {
            authority: authority.into(),
            seal_hash: hex::encode(hasher.finalize()),
        })
    }

    /// Recomputes the digest for `payload` and compares it to this seal.
    ///
    /// Returns `true` when the stored hash matches the recomputed one.
    ///
    /// # Errors
    ///
    /// Returns an [`EncodingError`] if the payload cannot be canonicalized.
    pub fn verify(&self, payload: &SealPayload<'_>) -> Result<bool, EncodingError> {
        let recomputed = Self::compute(self.authority.clone(), payload)?;
        Ok(recomputed.seal_hash == self.seal_hash)
    }
}

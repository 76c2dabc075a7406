//! Dispatch records and submission requests.
//!
//! A `DispatchRecord` is one immutable version of a recorded unit of work.
//! The ledger never updates a record in place: completion appends a new
//! version with a higher `version` number, and readers resolve "current"
//! as the highest version for a `dispatch_id`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use scribe_core::{DispatchId, EncodingError, Seal, SealPayload};

use crate::error::{Error, Result};
use crate::payload::Payload;

/// A submission to the dispatch ledger.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    /// Who requested the work.
    pub actor: String,
    /// Classification realm.
    pub realm: String,
    /// Classification capsule.
    pub capsule: String,
    /// Requested intent.
    pub intent: String,
    /// Request payload.
    pub input: Payload,
    /// An earlier dispatch this one corrects, if any.
    pub supersedes: Option<DispatchId>,
}

impl DispatchRequest {
    /// Creates a new submission request.
    #[must_use]
    pub fn new(
        actor: impl Into<String>,
        realm: impl Into<String>,
        capsule: impl Into<String>,
        intent: impl Into<String>,
        input: Payload,
    ) -> Self {
        Self {
            actor: actor.into(),
            realm: realm.into(),
            capsule: capsule.into(),
            intent: intent.into(),
            input,
            supersedes: None,
        }
    }

    /// Marks this request as a correction of an earlier dispatch.
    #[must_use]
    pub fn superseding(mut self, dispatch_id: DispatchId) -> Self {
        self.supersedes = Some(dispatch_id);
        self
    }

    /// Validates that the classification fields are present and non-empty.
    ///
    /// # Errors
    ///
    /// Returns a validation error naming the first empty field.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("actor", &self.actor),
            ("realm", &self.realm),
            ("capsule", &self.capsule),
            ("intent", &self.intent),
        ] {
            if value.trim().is_empty() {
                return Err(Error::validation(format!("{name} must be non-empty")));
            }
        }
        Ok(())
    }
}

/// One immutable version of a recorded dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRecord {
    /// Globally unique dispatch identifier, generated once.
    pub dispatch_id: DispatchId,
    /// Version number, 1-based; completion appends version 2 and so on.
    pub version: u64,
    /// Who requested the work.
    pub actor: String,
    /// Classification realm.
    pub realm: String,
    /// Classification capsule.
    pub capsule: String,
    /// Requested intent.
    pub intent: String,
    /// Request payload.
    pub input: Payload,
    /// Produced output; empty until processing completes.
    #[serde(default)]
    pub result: Payload,
    /// Tamper-evident seal over the fields above.
    pub seal: Seal,
    /// When version 1 was appended. Never mutated.
    pub created_at: DateTime<Utc>,
    /// When a result was recorded, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// An earlier dispatch this one corrects, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<DispatchId>,
}

impl DispatchRecord {
    /// Returns true if a result has been recorded.
    #[must_use]
    pub const fn has_result(&self) -> bool {
        !self.result.is_empty()
    }

    /// Computes a fresh seal over this record's current fields.
    ///
    /// This is the only way a `seal_hash` is ever produced for a record;
    /// the ledger calls it on append and on completion.
    ///
    /// # Errors
    ///
    /// Returns an [`EncodingError`] if a payload cannot be canonicalized.
    pub fn compute_seal(&self, authority: &str) -> std::result::Result<Seal, EncodingError> {
        let input = self.input.to_value();
        let result = self.result.to_value();
        Seal::compute(
            authority,
            &SealPayload {
                actor: &self.actor,
                realm: &self.realm,
                capsule: &self.capsule,
                intent: &self.intent,
                input: &input,
                result: &result,
            },
        )
    }

    /// Recomputes the seal and compares it to the stored one.
    ///
    /// # Errors
    ///
    /// Returns an [`EncodingError`] if a payload can no longer be
    /// canonicalized. Audit treats that as an integrity failure rather
    /// than an error.
    pub fn verify_seal(&self) -> std::result::Result<bool, EncodingError> {
        let input = self.input.to_value();
        let result = self.result.to_value();
        self.seal.verify(&SealPayload {
            actor: &self.actor,
            realm: &self.realm,
            capsule: &self.capsule,
            intent: &self.intent,
            input: &input,
            result: &result,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_record() -> DispatchRecord {
        let input = Payload::from_value(json!({"prompt": "x"})).expect("object accepted");
        let mut record = DispatchRecord {
            dispatch_id: DispatchId::generate(),
            version: 1,
            actor: "Custodian".into(),
            realm: "PL-001".into(),
            capsule: "Sovereign Crown".into(),
            intent: "Crown.Invocation".into(),
            input,
            result: Payload::Empty,
            seal: Seal {
                authority: String::new(),
                seal_hash: String::new(),
            },
            created_at: Utc::now(),
            completed_at: None,
            supersedes: None,
        };
        record.seal = record.compute_seal("reasoning").expect("sealable");
        record
    }

    #[test]
    fn request_validation_rejects_empty_fields() {
        let mut request = DispatchRequest::new("Custodian", "PL-001", "Crown", "Invoke", Payload::Empty);
        assert!(request.validate().is_ok());

        request.realm = "   ".into();
        let err = request.validate().expect_err("blank realm must be rejected");
        assert!(err.to_string().contains("realm"));
    }

    #[test]
    fn freshly_sealed_record_verifies() {
        let record = sample_record();
        assert!(record.verify_seal().expect("sealable"));
    }

    #[test]
    fn mutated_record_fails_verification() {
        let mut record = sample_record();
        record.intent = "Crown.Forgery".into();
        assert!(!record.verify_seal().expect("sealable"));
    }

    #[test]
    fn result_changes_the_seal() {
        let record = sample_record();
        let mut completed = record.clone();
        completed.result = Payload::from_value(json!({"verdict": "ok"})).expect("object accepted");
        let resealed = completed.compute_seal("reasoning").expect("sealable");
        assert_ne!(record.seal.seal_hash, resealed.seal_hash);
    }

    #[test]
    fn record_serializes_camel_case() {
        let record = sample_record();
        let json = serde_json::to_value(&record).expect("serializes");
        assert!(json.get("dispatchId").is_some());
        assert!(json.get("createdAt").is_some());
        assert!(json.get("completedAt").is_none());
    }
}

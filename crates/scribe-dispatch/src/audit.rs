//! Audit verification of ledger records.
//!
//! The auditor reads the current version of a dispatch and checks it for
//! structural integrity and seal validity. Failures are findings inside the
//! report, not errors: a tampered or missing record is a normal, reportable
//! outcome of an audit. Only infrastructure faults (storage unavailable)
//! surface as errors.

use serde::{Deserialize, Serialize};

use scribe_core::DispatchId;

use crate::error::Result;
use crate::ledger::LedgerStore;
use crate::metrics::DispatchMetrics;
use crate::record::DispatchRecord;

use std::sync::Arc;

/// Overall outcome of an audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    /// Every check passed.
    Passed,
    /// The record exists but at least one check failed.
    Failed,
    /// No record exists for the dispatch ID.
    Missing,
}

impl AuditStatus {
    /// Stable lowercase label, used in metrics and wire responses.
    #[must_use]
    pub const fn as_label(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Missing => "missing",
        }
    }
}

impl std::fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Per-field presence checks on a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldPresence {
    /// The actor field is present and non-empty.
    pub actor: bool,
    /// The dispatch ID parses under the expected format.
    pub dispatch_id: bool,
    /// A seal hash is present.
    pub seal: bool,
    /// A creation timestamp is present.
    pub created_at: bool,
}

impl FieldPresence {
    /// Returns true if every field is present.
    #[must_use]
    pub const fn all_present(&self) -> bool {
        self.actor && self.dispatch_id && self.seal && self.created_at
    }
}

/// Structural integrity findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityChecks {
    /// Presence of the required fields.
    pub field_presence: FieldPresence,
}

/// Seal verification findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SealVerification {
    /// A seal hash was stored on the record.
    pub seal_present: bool,
    /// Recomputing the seal over the stored fields reproduced the hash.
    pub seal_hash_valid: bool,
}

/// The full result of auditing one dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    /// The audited dispatch.
    pub dispatch_id: DispatchId,
    /// Overall outcome.
    pub audit_status: AuditStatus,
    /// Structural findings. Absent for missing dispatches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integrity_checks: Option<IntegrityChecks>,
    /// Seal findings. Absent for missing dispatches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seal_verification: Option<SealVerification>,
}

impl AuditReport {
    /// Returns true if the audit passed.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.audit_status == AuditStatus::Passed
    }

    fn missing(dispatch_id: DispatchId) -> Self {
        Self {
            dispatch_id,
            audit_status: AuditStatus::Missing,
            integrity_checks: None,
            seal_verification: None,
        }
    }
}

/// Reads ledger records and verifies them.
#[derive(Clone)]
pub struct Auditor {
    store: Arc<dyn LedgerStore>,
    metrics: DispatchMetrics,
}

impl Auditor {
    /// Creates an auditor over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            store,
            metrics: DispatchMetrics::new(),
        }
    }

    /// Audits the current version of a dispatch.
    ///
    /// A missing dispatch produces a `missing` report rather than an error.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the ledger cannot be read.
    #[tracing::instrument(skip(self), fields(dispatch_id = %dispatch_id))]
    pub async fn audit(&self, dispatch_id: &DispatchId) -> Result<AuditReport> {
        let report = match self.store.get_current(dispatch_id).await? {
            Some(record) => Self::audit_record(&record),
            None => AuditReport::missing(dispatch_id.clone()),
        };
        tracing::info!(status = %report.audit_status, "audit finished");
        self.metrics.record_audit(report.audit_status);
        Ok(report)
    }

    /// Verifies a record without touching storage.
    ///
    /// A record whose payloads can no longer be canonicalized fails seal
    /// verification; it cannot be proven untampered.
    #[must_use]
    pub fn audit_record(record: &DispatchRecord) -> AuditReport {
        let field_presence = FieldPresence {
            actor: !record.actor.trim().is_empty(),
            dispatch_id: record
                .dispatch_id
                .as_str()
                .parse::<DispatchId>()
                .is_ok(),
            seal: !record.seal.seal_hash.is_empty(),
            created_at: true,
        };
        let seal_verification = SealVerification {
            seal_present: field_presence.seal,
            seal_hash_valid: record.verify_seal().unwrap_or(false),
        };

        let audit_status = if field_presence.all_present() && seal_verification.seal_hash_valid {
            AuditStatus::Passed
        } else {
            AuditStatus::Failed
        };

        AuditReport {
            dispatch_id: record.dispatch_id.clone(),
            audit_status,
            integrity_checks: Some(IntegrityChecks { field_presence }),
            seal_verification: Some(seal_verification),
        }
    }
}

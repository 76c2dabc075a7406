//! Deterministic replay of recorded dispatches.
//!
//! A replay re-reads the full version history of a dispatch from the ledger
//! and re-verifies it, producing a fresh artifact each time. Replaying the
//! same untampered dispatch twice yields two artifacts with distinct replay
//! IDs but identical audit results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use scribe_core::{DispatchId, ReplayId};

use crate::audit::{AuditReport, Auditor};
use crate::error::{Error, Result};
use crate::ledger::LedgerStore;

use std::sync::Arc;

/// One version of the dispatch as seen during replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayFrame {
    /// The version number.
    pub version: u64,
    /// The seal hash stored on that version.
    pub seal_hash: String,
    /// When version 1 was appended.
    pub created_at: DateTime<Utc>,
    /// When this version recorded a result, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// The output of one replay run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayArtifact {
    /// Unique ID of this replay run. Fresh on every replay.
    pub replay_id: ReplayId,
    /// When the replay was performed.
    pub timestamp: DateTime<Utc>,
    /// Classification realm of the replayed dispatch.
    pub realm: String,
    /// Classification capsule of the replayed dispatch.
    pub capsule: String,
    /// Audit of the current version, recomputed during this replay.
    pub audit: AuditReport,
    /// The version chain in ascending order.
    pub timeline: Vec<ReplayFrame>,
}

/// Replays dispatches from the ledger.
#[derive(Clone)]
pub struct ReplayEngine {
    store: Arc<dyn LedgerStore>,
}

impl ReplayEngine {
    /// Creates a replay engine over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Replays a dispatch, producing a fresh artifact.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the dispatch has no recorded versions,
    /// or a storage error if the ledger cannot be read.
    #[tracing::instrument(skip(self), fields(dispatch_id = %dispatch_id))]
    pub async fn replay(&self, dispatch_id: &DispatchId) -> Result<ReplayArtifact> {
        let history = self.store.history(dispatch_id).await?;
        let current = history
            .last()
            .ok_or_else(|| Error::not_found("dispatch", dispatch_id))?;

        let audit = Auditor::audit_record(current);
        let timeline = history
            .iter()
            .map(|record| ReplayFrame {
                version: record.version,
                seal_hash: record.seal.seal_hash.clone(),
                created_at: record.created_at,
                completed_at: record.completed_at,
            })
            .collect();

        let artifact = ReplayArtifact {
            replay_id: ReplayId::generate(),
            timestamp: Utc::now(),
            realm: current.realm.clone(),
            capsule: current.capsule.clone(),
            audit,
            timeline,
        };
        tracing::info!(
            replay_id = %artifact.replay_id,
            versions = artifact.timeline.len(),
            status = %artifact.audit.audit_status,
            "replay finished"
        );
        Ok(artifact)
    }
}

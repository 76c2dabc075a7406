//! Wire contract for embedding transports.
//!
//! These DTOs define the request/response shapes a transport (HTTP server,
//! CLI, message consumer) exchanges with [`DispatchService`]. The service
//! itself is transport-agnostic: it validates, dispatches to the core
//! engines, and folds domain errors into response bodies so a transport
//! only has to serialize.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use scribe_core::seal::{AUTHORITY_CEREMONIAL, AUTHORITY_REASONING};
use scribe_core::{DispatchId, ReplayId};

use crate::audit::{AuditReport, AuditStatus, Auditor};
use crate::error::{Error, Result};
use crate::ledger::{Ledger, LedgerStore};
use crate::payload::Payload;
use crate::record::DispatchRequest;
use crate::replay::ReplayEngine;

use std::sync::Arc;

/// A request to record and dispatch a unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasonRequest {
    /// Who requested the work.
    pub actor: String,
    /// Classification realm.
    pub realm: String,
    /// Classification capsule.
    pub capsule: String,
    /// Requested intent.
    pub intent: String,
    /// Seal authority tag. Defaults to `reasoning` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seal: Option<String>,
    /// Request payload; a JSON object or null.
    #[serde(default)]
    pub input: Value,
}

/// Response to a successful [`ReasonRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasonResponse {
    /// The recorded dispatch.
    pub dispatch_id: DispatchId,
    /// Short human-readable description of what was recorded.
    pub summary: String,
    /// Hash of the seal protecting the record.
    pub seal_hash: String,
}

/// A request to replay a recorded dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayRequest {
    /// The dispatch to replay.
    pub dispatch_id: String,
}

/// Condensed audit outcome inside a replay summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditSummary {
    /// Overall audit outcome.
    pub status: AuditStatus,
}

/// Condensed replay artifact for the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaySummary {
    /// Unique ID of this replay run.
    pub replay_id: ReplayId,
    /// When the replay ran.
    pub timestamp: DateTime<Utc>,
    /// Classification realm of the replayed dispatch.
    pub realm: String,
    /// Classification capsule of the replayed dispatch.
    pub capsule: String,
    /// Audit outcome.
    pub audit: AuditSummary,
}

/// Response to a [`ReplayRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayResponse {
    /// Whether the replay ran.
    pub ok: bool,
    /// The replay summary when `ok` is true.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replay: Option<ReplaySummary>,
    /// A human-readable error when `ok` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A request to audit a recorded dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRequest {
    /// The dispatch to audit.
    pub dispatch_id: String,
}

/// Response to an [`AuditRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditResponse {
    /// The audited dispatch ID, echoed back.
    pub dispatch_id: String,
    /// True when the audit passed.
    pub ok: bool,
    /// The full findings when the request was well-formed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_results: Option<AuditReport>,
    /// A human-readable error when the request was malformed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Liveness response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `"ok"` while the service is up.
    pub status: &'static str,
    /// Server time at the moment of the check.
    pub time: DateTime<Utc>,
}

/// Transport-agnostic service facade over the ledger, auditor, and replay
/// engine.
#[derive(Clone)]
pub struct DispatchService {
    store: Arc<dyn LedgerStore>,
    auditor: Auditor,
    replay: ReplayEngine,
}

impl DispatchService {
    /// Creates a service over a ledger store.
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            auditor: Auditor::new(Arc::clone(&store)),
            replay: ReplayEngine::new(Arc::clone(&store)),
            store,
        }
    }

    /// Records a new dispatch.
    ///
    /// # Errors
    ///
    /// Returns a validation error for empty classification fields, an
    /// unknown seal authority, or a non-object payload.
    pub async fn reason(&self, request: ReasonRequest) -> Result<ReasonResponse> {
        let authority = match request.seal.as_deref() {
            None => AUTHORITY_REASONING,
            Some(AUTHORITY_REASONING) => AUTHORITY_REASONING,
            Some(AUTHORITY_CEREMONIAL) => AUTHORITY_CEREMONIAL,
            Some(other) => {
                return Err(Error::validation(format!(
                    "unknown seal authority '{other}'"
                )));
            }
        };
        let ledger = Ledger::with_authority(Arc::clone(&self.store), authority);

        let input = Payload::from_value(request.input)?;
        let record = ledger
            .append(DispatchRequest::new(
                request.actor,
                request.realm,
                request.capsule,
                request.intent,
                input,
            ))
            .await?;

        Ok(ReasonResponse {
            summary: format!(
                "dispatch {} recorded under {} authority for intent '{}'",
                record.dispatch_id, record.seal.authority, record.intent
            ),
            dispatch_id: record.dispatch_id,
            seal_hash: record.seal.seal_hash,
        })
    }

    /// Replays a dispatch, folding domain failures into the response body.
    ///
    /// # Errors
    ///
    /// Only infrastructure faults (storage) surface as errors; a malformed
    /// ID or unknown dispatch comes back as `ok: false`.
    pub async fn replay(&self, request: ReplayRequest) -> Result<ReplayResponse> {
        let dispatch_id: DispatchId = match request.dispatch_id.parse() {
            Ok(id) => id,
            Err(e) => return Ok(ReplayResponse::rejected(e.to_string())),
        };

        match self.replay.replay(&dispatch_id).await {
            Ok(artifact) => Ok(ReplayResponse {
                ok: true,
                replay: Some(ReplaySummary {
                    replay_id: artifact.replay_id,
                    timestamp: artifact.timestamp,
                    realm: artifact.realm,
                    capsule: artifact.capsule,
                    audit: AuditSummary {
                        status: artifact.audit.audit_status,
                    },
                }),
                error: None,
            }),
            Err(e @ Error::NotFound { .. }) => Ok(ReplayResponse::rejected(e.to_string())),
            Err(e) => Err(e),
        }
    }

    /// Audits a dispatch, folding domain failures into the response body.
    ///
    /// # Errors
    ///
    /// Only infrastructure faults (storage) surface as errors.
    pub async fn audit(&self, request: AuditRequest) -> Result<AuditResponse> {
        let dispatch_id: DispatchId = match request.dispatch_id.parse() {
            Ok(id) => id,
            Err(e) => {
                return Ok(AuditResponse {
                    dispatch_id: request.dispatch_id,
                    ok: false,
                    audit_results: None,
                    error: Some(e.to_string()),
                });
            }
        };

        let report = self.auditor.audit(&dispatch_id).await?;
        Ok(AuditResponse {
            dispatch_id: request.dispatch_id,
            ok: report.passed(),
            audit_results: Some(report),
            error: None,
        })
    }

    /// Reports liveness.
    #[must_use]
    pub fn health(&self) -> HealthResponse {
        HealthResponse {
            status: "ok",
            time: Utc::now(),
        }
    }
}

impl ReplayResponse {
    fn rejected(error: String) -> Self {
        Self {
            ok: false,
            replay: None,
            error: Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::memory::InMemoryLedger;
    use serde_json::json;

    fn service() -> (DispatchService, Arc<InMemoryLedger>) {
        let store = Arc::new(InMemoryLedger::new());
        (
            DispatchService::new(Arc::clone(&store) as Arc<dyn LedgerStore>),
            store,
        )
    }

    fn reason_request() -> ReasonRequest {
        ReasonRequest {
            actor: "Custodian".into(),
            realm: "PL-001".into(),
            capsule: "Sovereign Crown".into(),
            intent: "Crown.Invocation".into(),
            seal: None,
            input: json!({"prompt": "x"}),
        }
    }

    #[tokio::test]
    async fn reason_then_audit_passes() -> Result<()> {
        let (service, _) = service();
        let response = service.reason(reason_request()).await?;
        assert_eq!(response.seal_hash.len(), 64);
        assert!(response.summary.contains(&response.dispatch_id.to_string()));

        let wire = serde_json::to_value(&response).expect("serializes");
        assert!(wire.get("dispatchId").is_some());
        assert!(wire.get("summary").is_some());
        assert!(wire.get("sealHash").is_some());

        let audit = service
            .audit(AuditRequest {
                dispatch_id: response.dispatch_id.to_string(),
            })
            .await?;
        assert!(audit.ok);
        let report = audit.audit_results.expect("well-formed request");
        assert_eq!(report.audit_status, AuditStatus::Passed);
        Ok(())
    }

    #[tokio::test]
    async fn reason_rejects_unknown_authority() {
        let (service, _) = service();
        let mut request = reason_request();
        request.seal = Some("notarized".into());

        let err = service.reason(request).await.expect_err("must reject");
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[tokio::test]
    async fn ceremonial_authority_is_recorded_on_the_seal() -> Result<()> {
        let (service, store) = service();
        let mut request = reason_request();
        request.seal = Some(AUTHORITY_CEREMONIAL.into());

        let response = service.reason(request).await?;
        let record = store
            .get_current(&response.dispatch_id)
            .await?
            .expect("stored");
        assert_eq!(record.seal.authority, AUTHORITY_CEREMONIAL);
        Ok(())
    }

    #[tokio::test]
    async fn reason_rejects_non_object_input() {
        let (service, _) = service();
        let mut request = reason_request();
        request.input = json!("just a string");

        let err = service.reason(request).await.expect_err("must reject");
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[tokio::test]
    async fn replay_of_recorded_dispatch_succeeds() -> Result<()> {
        let (service, _) = service();
        let response = service.reason(reason_request()).await?;

        let replay = service
            .replay(ReplayRequest {
                dispatch_id: response.dispatch_id.to_string(),
            })
            .await?;
        assert!(replay.ok);
        let summary = replay.replay.expect("ok response carries a summary");
        assert_eq!(summary.realm, "PL-001");
        assert_eq!(summary.audit.status, AuditStatus::Passed);
        Ok(())
    }

    #[tokio::test]
    async fn malformed_id_is_a_body_level_error() -> Result<()> {
        let (service, _) = service();
        let replay = service
            .replay(ReplayRequest {
                dispatch_id: "not-a-dispatch-id".into(),
            })
            .await?;
        assert!(!replay.ok);
        assert!(replay.replay.is_none());
        assert!(replay.error.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn replay_of_unknown_dispatch_is_a_body_level_error() -> Result<()> {
        let (service, _) = service();
        let replay = service
            .replay(ReplayRequest {
                dispatch_id: DispatchId::generate().to_string(),
            })
            .await?;
        assert!(!replay.ok);
        assert!(replay.error.expect("error set").contains("not found"));
        Ok(())
    }

    #[tokio::test]
    async fn audit_of_missing_dispatch_reports_missing() -> Result<()> {
        let (service, _) = service();
        let audit = service
            .audit(AuditRequest {
                dispatch_id: DispatchId::generate().to_string(),
            })
            .await?;
        assert!(!audit.ok);
        let report = audit.audit_results.expect("well-formed request");
        assert_eq!(report.audit_status, AuditStatus::Missing);
        Ok(())
    }

    #[test]
    fn health_reports_ok() {
        let (service, _) = service();
        let health = service.health();
        assert_eq!(health.status, "ok");
    }
}

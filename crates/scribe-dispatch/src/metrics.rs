//! Metrics instrumentation for dispatch operations.
//!
//! Emits through the `metrics` facade; the embedding process installs the
//! recorder (Prometheus, statsd, or a no-op). Without a recorder every call
//! is a cheap no-op, so core types carry a [`DispatchMetrics`] handle
//! unconditionally.

use crate::audit::AuditStatus;

/// Metric names emitted by this crate.
pub mod names {
    /// Counter: dispatches appended to the ledger.
    pub const DISPATCH_APPENDS: &str = "scribe_dispatch_appends_total";
    /// Counter: completions recorded against existing dispatches.
    pub const DISPATCH_COMPLETIONS: &str = "scribe_dispatch_completions_total";
    /// Counter: audits performed, labeled by outcome.
    pub const DISPATCH_AUDITS: &str = "scribe_dispatch_audits_total";
    /// Counter: queue delivery attempts, labeled by outcome.
    pub const QUEUE_DELIVERIES: &str = "scribe_queue_deliveries_total";
    /// Counter: entries rescheduled for retry.
    pub const QUEUE_RETRIES: &str = "scribe_queue_retries_total";
    /// Gauge: entries currently held by the queue.
    pub const QUEUE_DEPTH: &str = "scribe_queue_depth";
    /// Counter: workflow phase transitions, labeled by edge.
    pub const WORKFLOW_TRANSITIONS: &str = "scribe_workflow_transitions_total";
}

/// Label keys used on the metrics above.
pub mod labels {
    /// Audit or delivery outcome.
    pub const OUTCOME: &str = "outcome";
    /// Source phase of a workflow transition.
    pub const FROM: &str = "from";
    /// Target phase of a workflow transition.
    pub const TO: &str = "to";
}

/// Handle for emitting dispatch metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchMetrics;

impl DispatchMetrics {
    /// Creates a metrics handle.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Records a ledger append.
    pub fn record_append(&self) {
        metrics::counter!(names::DISPATCH_APPENDS).increment(1);
    }

    /// Records a completion.
    pub fn record_complete(&self) {
        metrics::counter!(names::DISPATCH_COMPLETIONS).increment(1);
    }

    /// Records an audit with its outcome.
    pub fn record_audit(&self, status: AuditStatus) {
        metrics::counter!(names::DISPATCH_AUDITS, labels::OUTCOME => status.as_label())
            .increment(1);
    }

    /// Records a queue delivery attempt.
    pub fn record_delivery(&self, outcome: &'static str) {
        metrics::counter!(names::QUEUE_DELIVERIES, labels::OUTCOME => outcome).increment(1);
    }

    /// Records an entry rescheduled for another attempt.
    pub fn record_retry(&self) {
        metrics::counter!(names::QUEUE_RETRIES).increment(1);
    }

    /// Publishes the current queue depth.
    pub fn set_queue_depth(&self, depth: usize) {
        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!(names::QUEUE_DEPTH).set(depth as f64);
    }

    /// Records a workflow transition along an edge.
    pub fn record_workflow_transition(&self, from: &'static str, to: &'static str) {
        metrics::counter!(
            names::WORKFLOW_TRANSITIONS,
            labels::FROM => from,
            labels::TO => to
        )
        .increment(1);
    }
}

//! Observability infrastructure for Scribe.
//!
//! Structured logging with consistent spans across components. This module
//! provides the one-shot logging initializer and span constructors used by
//! the ledger, queue processor, and workflow components.

use std::sync::Once;

use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Call once at application startup. Safe to call multiple times; subsequent
/// calls are no-ops.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Controls log levels (e.g. `info`, `scribe_dispatch=debug`)
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json())
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().pretty())
                    .init();
            }
        }
    });
}

/// Creates a span for ledger and audit operations.
#[must_use]
pub fn dispatch_span(operation: &str, dispatch_id: &str) -> Span {
    tracing::info_span!("dispatch", op = operation, dispatch_id = dispatch_id)
}

/// Creates a span for workflow operations.
#[must_use]
pub fn workflow_span(operation: &str, run_id: &str) -> Span {
    tracing::info_span!("workflow", op = operation, run_id = run_id)
}

/// Creates a span for queue processor passes.
#[must_use]
pub fn queue_span(operation: &str) -> Span {
    tracing::info_span!("replay_queue", op = operation)
}

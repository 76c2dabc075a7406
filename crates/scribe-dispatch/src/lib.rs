//! # scribe-dispatch
//!
//! The dispatch domain for Scribe: a tamper-evident ledger of reasoning
//! dispatches with audit, replay, a retrying delivery queue, and a workflow
//! state machine.
//!
//! ## Components
//!
//! - [`ledger`]: Append-only, versioned dispatch records sealed on write
//! - [`audit`]: Integrity and seal verification over stored records
//! - [`replay`]: Deterministic re-verification of a dispatch's history
//! - [`queue`]: Retry queue with exponential backoff and operator redrive
//! - [`workflow`]: The `DISPATCH -> PROCESS -> VALIDATE -> COMPLETE/ABORT`
//!   state machine
//! - [`testimony`]: Append-only operational statements
//! - [`contract`]: Wire DTOs and the transport-agnostic service facade
//!
//! Storage is abstracted behind traits ([`ledger::LedgerStore`],
//! [`queue::QueueStore`], [`workflow::RunStore`], [`testimony::TestimonyLog`])
//! with in-memory implementations for tests and single-process embedding.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use scribe_dispatch::ledger::memory::InMemoryLedger;
//! use scribe_dispatch::ledger::{Ledger, LedgerStore};
//! use scribe_dispatch::audit::Auditor;
//! use scribe_dispatch::payload::Payload;
//! use scribe_dispatch::record::DispatchRequest;
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store: Arc<dyn LedgerStore> = Arc::new(InMemoryLedger::new());
//! let ledger = Ledger::new(Arc::clone(&store));
//!
//! let input = Payload::from_value(json!({"prompt": "summarize the treaty"}))?;
//! let record = ledger
//!     .append(DispatchRequest::new(
//!         "Custodian",
//!         "PL-001",
//!         "Sovereign Crown",
//!         "Crown.Invocation",
//!         input,
//!     ))
//!     .await?;
//!
//! let report = Auditor::new(store).audit(&record.dispatch_id).await?;
//! assert!(report.passed());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod audit;
pub mod contract;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod payload;
pub mod queue;
pub mod record;
pub mod replay;
pub mod testimony;
pub mod workflow;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::audit::{AuditReport, AuditStatus, Auditor};
    pub use crate::contract::DispatchService;
    pub use crate::error::{Error, Result};
    pub use crate::ledger::{Ledger, LedgerStore};
    pub use crate::payload::Payload;
    pub use crate::queue::{QueueConfig, QueueProcessor, QueueStore};
    pub use crate::record::{DispatchRecord, DispatchRequest};
    pub use crate::replay::{ReplayArtifact, ReplayEngine};
    pub use crate::testimony::{Testimony, TestimonyLog};
    pub use crate::workflow::{Phase, WorkflowRun, Workflows};
}

pub use error::{Error, Result};

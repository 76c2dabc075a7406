//! The append-only dispatch ledger.
//!
//! The ledger is the source of truth for audit and replay. Records are
//! never mutated in place: `append` writes version 1, `complete` writes a
//! new version via compare-and-swap on the previous one, and readers see
//! the highest version for a given `dispatch_id`.
//!
//! ## Design Principles
//!
//! - **CAS semantics**: Completion uses compare-and-swap to prevent races
//! - **Dependency-injected storage**: The ledger holds a store handle, not
//!   global state, so the core is testable without a live database
//! - **Idempotency**: `dispatch_id` is the retry key; a timed-out caller
//!   refetches before retrying a completion

pub mod memory;

use std::sync::Arc;

use chrono::Utc;

use scribe_core::DispatchId;
use scribe_core::seal::AUTHORITY_REASONING;

use crate::error::{Error, Result};
use crate::metrics::DispatchMetrics;
use crate::payload::Payload;
use crate::record::{DispatchRecord, DispatchRequest};

/// Result of a compare-and-swap version write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasResult {
    /// The new version was appended.
    Success,
    /// No record exists for the dispatch ID.
    NotFound,
    /// The current version didn't match the expected one.
    VersionConflict {
        /// The version that was actually current.
        actual: u64,
    },
}

impl CasResult {
    /// Returns true if the write was applied.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Storage abstraction for dispatch records.
///
/// Implementations must provide:
/// - Atomic insert-if-absent for new dispatches
/// - CAS semantics on the version chain for completions
/// - Version history reads for replay
///
/// All methods are `Send + Sync` to support concurrent callers.
#[async_trait::async_trait]
pub trait LedgerStore: Send + Sync {
    /// Inserts version 1 of a new dispatch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateId`] if a record with the same
    /// `dispatch_id` already exists.
    async fn insert_new(&self, record: &DispatchRecord) -> Result<()>;

    /// Returns the current (highest) version for a dispatch, if any.
    async fn get_current(&self, dispatch_id: &DispatchId) -> Result<Option<DispatchRecord>>;

    /// Returns all versions of a dispatch in ascending version order.
    ///
    /// Empty when the dispatch does not exist.
    async fn history(&self, dispatch_id: &DispatchId) -> Result<Vec<DispatchRecord>>;

    /// Appends a new version if the current version equals `expected_version`.
    ///
    /// This is the concurrency primitive that totally orders completions
    /// within a single `dispatch_id`.
    async fn put_version(
        &self,
        record: &DispatchRecord,
        expected_version: u64,
    ) -> Result<CasResult>;
}

/// How many times `append` regenerates the dispatch ID on a collision.
const MAX_ID_GENERATION_ATTEMPTS: u32 = 3;

/// The dispatch ledger.
///
/// Cheap to clone; clones share the underlying store.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn LedgerStore>,
    authority: String,
    metrics: DispatchMetrics,
}

impl Ledger {
    /// Creates a ledger over the given store with the default seal authority.
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self::with_authority(store, AUTHORITY_REASONING)
    }

    /// Creates a ledger sealing under a specific authority tag.
    #[must_use]
    pub fn with_authority(store: Arc<dyn LedgerStore>, authority: impl Into<String>) -> Self {
        Self {
            store,
            authority: authority.into(),
            metrics: DispatchMetrics::new(),
        }
    }

    /// Records a new dispatch.
    ///
    /// Generates the `dispatch_id`, seals the record with an empty result,
    /// and persists version 1 atomically. A duplicate ID (astronomically
    /// unlikely) is retried with a fresh suffix, bounded.
    ///
    /// # Errors
    ///
    /// Returns a validation error for empty classification fields, an
    /// encoding error for unsealable input, or a storage error.
    #[tracing::instrument(
        skip(self, request),
        fields(actor = %request.actor, realm = %request.realm, intent = %request.intent)
    )]
    pub async fn append(&self, request: DispatchRequest) -> Result<DispatchRecord> {
        request.validate()?;

        let mut attempt = 0;
        loop {
            let mut record = DispatchRecord {
                dispatch_id: DispatchId::generate(),
                version: 1,
                actor: request.actor.clone(),
                realm: request.realm.clone(),
                capsule: request.capsule.clone(),
                intent: request.intent.clone(),
                input: request.input.clone(),
                result: Payload::Empty,
                seal: scribe_core::Seal {
                    authority: self.authority.clone(),
                    seal_hash: String::new(),
                },
                created_at: Utc::now(),
                completed_at: None,
                supersedes: request.supersedes.clone(),
            };
            record.seal = record.compute_seal(&self.authority)?;

            match self.store.insert_new(&record).await {
                Ok(()) => {
                    tracing::info!(dispatch_id = %record.dispatch_id, "dispatch appended");
                    self.metrics.record_append();
                    return Ok(record);
                }
                Err(Error::DuplicateId { id }) if attempt < MAX_ID_GENERATION_ATTEMPTS => {
                    tracing::warn!(dispatch_id = %id, "dispatch id collision, regenerating");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Records a result for an existing dispatch.
    ///
    /// Refetches the current version and delegates to [`Self::complete_version`].
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the dispatch does not exist
    /// - [`Error::AlreadyCompleted`] if a result exists and `overwrite` is false
    /// - [`Error::Conflict`] if another completion raced ahead; refetch and
    ///   retry at most once
    pub async fn complete(
        &self,
        dispatch_id: &DispatchId,
        result: Payload,
        overwrite: bool,
    ) -> Result<DispatchRecord> {
        let current = self
            .store
            .get_current(dispatch_id)
            .await?
            .ok_or_else(|| Error::not_found("dispatch", dispatch_id))?;
        self.complete_version(&current, result, overwrite).await
    }

    /// Records a result against an explicit snapshot of the current version.
    ///
    /// This is the optimistic-concurrency primitive `complete` builds on:
    /// the CAS targets `current.version`, so a stale snapshot yields
    /// [`Error::Conflict`] instead of silently overwriting a racing writer.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Self::complete`].
    #[tracing::instrument(
        skip(self, current, result),
        fields(dispatch_id = %current.dispatch_id, expected_version = current.version)
    )]
    pub async fn complete_version(
        &self,
        current: &DispatchRecord,
        result: Payload,
        overwrite: bool,
    ) -> Result<DispatchRecord> {
        if current.has_result() && !overwrite {
            return Err(Error::AlreadyCompleted {
                dispatch_id: current.dispatch_id.to_string(),
            });
        }

        let mut next = current.clone();
        next.version = current.version + 1;
        next.result = result;
        next.completed_at = Some(Utc::now());
        next.seal = next.compute_seal(&self.authority)?;

        match self.store.put_version(&next, current.version).await? {
            CasResult::Success => {
                tracing::info!(version = next.version, "dispatch completed");
                self.metrics.record_complete();
                Ok(next)
            }
            CasResult::NotFound => Err(Error::not_found("dispatch", &current.dispatch_id)),
            CasResult::VersionConflict { actual } => Err(Error::Conflict {
                resource_type: "dispatch",
                id: current.dispatch_id.to_string(),
                expected: current.version.to_string(),
                actual: actual.to_string(),
            }),
        }
    }

    /// Returns the current version of a dispatch, if it exists.
    ///
    /// A missing dispatch is `None`, not an error; audit reports it as a
    /// distinct `missing` outcome.
    pub async fn get(&self, dispatch_id: &DispatchId) -> Result<Option<DispatchRecord>> {
        self.store.get_current(dispatch_id).await
    }

    /// Returns all versions of a dispatch in order, for replay.
    pub async fn history(&self, dispatch_id: &DispatchId) -> Result<Vec<DispatchRecord>> {
        self.store.history(dispatch_id).await
    }

    /// Returns the store handle, for wiring auditors and replay engines.
    #[must_use]
    pub fn store(&self) -> Arc<dyn LedgerStore> {
        Arc::clone(&self.store)
    }
}

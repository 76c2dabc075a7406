//! The replay queue.
//!
//! Failed or deferred deliveries land here and are retried with exponential
//! backoff until they succeed or exhaust their attempt budget. Exhausted
//! entries park in a terminal `FAILED` state; an operator can inspect them
//! and redrive explicitly. Exhaustion is reported via testimony, never as an
//! error from the drain loop.

pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use scribe_core::{EntryId, RunId};

use crate::error::{Error, Result};
use crate::metrics::DispatchMetrics;
use crate::payload::Payload;
use crate::testimony::{Testimony, TestimonyLog};

/// Lifecycle state of a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryStatus {
    /// Waiting to be attempted (or re-attempted after backoff).
    Pending,
    /// Claimed by a processor, delivery in flight.
    Processing,
    /// Delivered. Terminal.
    Succeeded,
    /// Attempt budget exhausted. Terminal until redriven.
    Failed,
}

impl EntryStatus {
    /// Returns true if no further attempts happen without operator action.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Stable label for logs and metrics.
    #[must_use]
    pub const fn as_label(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}

/// One unit of work held by the replay queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayQueueEntry {
    /// Unique entry ID.
    pub id: EntryId,
    /// The workflow run that produced this entry, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
    /// The flow that produced this entry, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow_id: Option<String>,
    /// What to deliver.
    pub payload: Payload,
    /// Current lifecycle state.
    pub status: EntryStatus,
    /// Attempts made so far, including the successful one.
    pub attempts: u32,
    /// Message from the most recent failed attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// When the entry was enqueued.
    pub created_at: DateTime<Utc>,
    /// Earliest time the next attempt may run. None means immediately due.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_before: Option<DateTime<Utc>>,
}

impl ReplayQueueEntry {
    /// Creates a pending entry for a payload.
    #[must_use]
    pub fn new(payload: Payload) -> Self {
        Self {
            id: EntryId::generate(),
            run_id: None,
            flow_id: None,
            payload,
            status: EntryStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
            not_before: None,
        }
    }

    /// Correlates the entry with a workflow run.
    #[must_use]
    pub fn with_run_id(mut self, run_id: RunId) -> Self {
        self.run_id = Some(run_id);
        self
    }

    /// Correlates the entry with a flow.
    #[must_use]
    pub fn with_flow_id(mut self, flow_id: impl Into<String>) -> Self {
        self.flow_id = Some(flow_id.into());
        self
    }
}

/// A delivery failure, as reported by a [`Delivery`] implementation.
#[derive(Debug, thiserror::Error)]
#[error("delivery failed: {message}")]
pub struct DeliveryError {
    /// What went wrong, recorded on the entry as `last_error`.
    pub message: String,
}

impl DeliveryError {
    /// Creates a delivery error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The side the queue delivers to (notifier, webhook, downstream engine).
#[async_trait::async_trait]
pub trait Delivery: Send + Sync {
    /// Attempts to deliver a payload once.
    ///
    /// # Errors
    ///
    /// Returns a [`DeliveryError`] for any failed attempt; the processor
    /// decides whether to retry.
    async fn deliver(&self, payload: &Payload) -> std::result::Result<(), DeliveryError>;
}

/// The outcome a processor writes back after an attempt.
#[derive(Debug, Clone)]
pub struct EntrySettle {
    /// New lifecycle state.
    pub status: EntryStatus,
    /// Updated attempt count.
    pub attempts: u32,
    /// Error from this attempt, if it failed.
    pub last_error: Option<String>,
    /// Earliest next attempt, if one is scheduled.
    pub not_before: Option<DateTime<Utc>>,
}

/// Storage abstraction for the replay queue.
#[async_trait::async_trait]
pub trait QueueStore: Send + Sync {
    /// Persists a new entry.
    async fn enqueue(&self, entry: ReplayQueueEntry) -> Result<()>;

    /// Returns an entry by ID.
    async fn get(&self, id: &EntryId) -> Result<Option<ReplayQueueEntry>>;

    /// Returns pending entries whose backoff window has elapsed at `now`,
    /// oldest first.
    async fn due_entries(&self, now: DateTime<Utc>) -> Result<Vec<ReplayQueueEntry>>;

    /// Atomically claims a pending entry for processing.
    ///
    /// Returns false if the entry was already claimed or settled; the
    /// caller skips it.
    async fn claim(&self, id: &EntryId) -> Result<bool>;

    /// Writes the outcome of an attempt back onto an entry.
    async fn settle(&self, id: &EntryId, settle: EntrySettle) -> Result<ReplayQueueEntry>;

    /// Moves a `FAILED` entry back to `PENDING`, immediately due.
    ///
    /// Attempt history is preserved.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the entry is not in `FAILED`.
    async fn redrive(&self, id: &EntryId) -> Result<ReplayQueueEntry>;

    /// Returns the number of non-terminal entries.
    async fn depth(&self) -> Result<usize>;
}

/// Retry policy for the queue processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Maximum delivery attempts before an entry parks as `FAILED`.
    pub max_attempts: u32,
    /// Backoff after the first failed attempt; doubles per failure.
    pub backoff_base: Duration,
    /// Upper bound on the backoff window.
    pub backoff_cap: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_base: Duration::from_secs(2),
            backoff_cap: Duration::from_secs(300),
        }
    }
}

impl QueueConfig {
    /// Loads configuration from `SCRIBE_QUEUE_*` environment variables,
    /// falling back to defaults for unset ones.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a set variable is not a positive
    /// integer.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an injected environment lookup.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Self::from_env`].
    pub fn from_env_with<F>(get_env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let max_attempts = parse_positive_env(
            &get_env,
            "SCRIBE_QUEUE_MAX_ATTEMPTS",
            u64::from(defaults.max_attempts),
        )?;
        let backoff_base_ms = parse_positive_env(
            &get_env,
            "SCRIBE_QUEUE_BACKOFF_BASE_MS",
            u64::try_from(defaults.backoff_base.as_millis()).unwrap_or(u64::MAX),
        )?;
        let backoff_cap_ms = parse_positive_env(
            &get_env,
            "SCRIBE_QUEUE_BACKOFF_CAP_MS",
            u64::try_from(defaults.backoff_cap.as_millis()).unwrap_or(u64::MAX),
        )?;

        if backoff_cap_ms < backoff_base_ms {
            return Err(Error::configuration(
                "SCRIBE_QUEUE_BACKOFF_CAP_MS must be >= SCRIBE_QUEUE_BACKOFF_BASE_MS",
            ));
        }

        Ok(Self {
            max_attempts: u32::try_from(max_attempts)
                .map_err(|_| Error::configuration("SCRIBE_QUEUE_MAX_ATTEMPTS is too large"))?,
            backoff_base: Duration::from_millis(backoff_base_ms),
            backoff_cap: Duration::from_millis(backoff_cap_ms),
        })
    }

    /// Backoff window after `attempts` failed attempts: `base * 2^(n-1)`,
    /// capped.
    #[must_use]
    pub fn backoff_for(&self, attempts: u32) -> Duration {
        if attempts == 0 {
            return Duration::ZERO;
        }
        let exponent = attempts - 1;
        let millis = u64::try_from(self.backoff_base.as_millis())
            .unwrap_or(u64::MAX)
            .saturating_mul(1u64.checked_shl(exponent).unwrap_or(u64::MAX));
        Duration::from_millis(millis).min(self.backoff_cap)
    }
}

fn parse_positive_env<F>(get_env: &F, key: &str, default: u64) -> Result<u64>
where
    F: Fn(&str) -> Option<String>,
{
    match get_env(key) {
        None => Ok(default),
        Some(raw) => {
            let value: u64 = raw
                .trim()
                .parse()
                .map_err(|_| Error::configuration(format!("{key} must be a positive integer")))?;
            if value == 0 {
                return Err(Error::configuration(format!("{key} must be positive")));
            }
            Ok(value)
        }
    }
}

/// Tally of one drain pass over the due entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    /// Entries this pass attempted.
    pub processed: usize,
    /// Entries delivered.
    pub succeeded: usize,
    /// Entries rescheduled with backoff.
    pub retried: usize,
    /// Entries parked as `FAILED`.
    pub exhausted: usize,
    /// Entries another processor claimed first.
    pub skipped: usize,
}

/// Drives delivery attempts against the queue.
pub struct QueueProcessor {
    store: Arc<dyn QueueStore>,
    delivery: Arc<dyn Delivery>,
    testimony: Arc<dyn TestimonyLog>,
    config: QueueConfig,
    metrics: DispatchMetrics,
}

impl QueueProcessor {
    /// Creates a processor over a store, a delivery target, and a testimony
    /// log.
    #[must_use]
    pub fn new(
        store: Arc<dyn QueueStore>,
        delivery: Arc<dyn Delivery>,
        testimony: Arc<dyn TestimonyLog>,
        config: QueueConfig,
    ) -> Self {
        Self {
            store,
            delivery,
            testimony,
            config,
            metrics: DispatchMetrics::new(),
        }
    }

    /// Enqueues a payload for delivery.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the entry cannot be persisted.
    #[tracing::instrument(skip(self, payload))]
    pub async fn enqueue(
        &self,
        payload: Payload,
        run_id: Option<RunId>,
        flow_id: Option<String>,
    ) -> Result<ReplayQueueEntry> {
        let mut entry = ReplayQueueEntry::new(payload);
        entry.run_id = run_id;
        entry.flow_id = flow_id;
        self.store.enqueue(entry.clone()).await?;
        tracing::info!(entry_id = %entry.id, "entry enqueued");
        self.publish_depth().await?;
        Ok(entry)
    }

    /// Attempts every due entry once.
    ///
    /// Entries that fail with budget remaining go back to `PENDING` with an
    /// exponentially later `not_before`. Entries that exhaust their budget
    /// park as `FAILED` and an error testimony is recorded.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the queue cannot be read or settled.
    /// Delivery failures never error out of the drain.
    #[tracing::instrument(skip(self))]
    pub async fn drain_once(&self, now: DateTime<Utc>) -> Result<DrainSummary> {
        let mut summary = DrainSummary::default();

        for entry in self.store.due_entries(now).await? {
            if !self.store.claim(&entry.id).await? {
                summary.skipped += 1;
                continue;
            }
            summary.processed += 1;
            let attempts = entry.attempts + 1;

            match self.delivery.deliver(&entry.payload).await {
                Ok(()) => {
                    self.store
                        .settle(
                            &entry.id,
                            EntrySettle {
                                status: EntryStatus::Succeeded,
                                attempts,
                                last_error: None,
                                not_before: None,
                            },
                        )
                        .await?;
                    tracing::info!(entry_id = %entry.id, attempts, "entry delivered");
                    self.metrics.record_delivery("succeeded");
                    summary.succeeded += 1;
                }
                Err(err) if attempts >= self.config.max_attempts => {
                    self.store
                        .settle(
                            &entry.id,
                            EntrySettle {
                                status: EntryStatus::Failed,
                                attempts,
                                last_error: Some(err.message.clone()),
                                not_before: None,
                            },
                        )
                        .await?;
                    tracing::error!(entry_id = %entry.id, attempts, error = %err, "entry exhausted");
                    self.metrics.record_delivery("exhausted");
                    self.report_exhaustion(&entry, attempts, &err).await?;
                    summary.exhausted += 1;
                }
                Err(err) => {
                    let backoff = self.config.backoff_for(attempts);
                    let delay = chrono::Duration::from_std(backoff)
                        .unwrap_or_else(|_| chrono::Duration::milliseconds(i64::MAX));
                    let not_before = now
                        .checked_add_signed(delay)
                        .unwrap_or(DateTime::<Utc>::MAX_UTC);
                    self.store
                        .settle(
                            &entry.id,
                            EntrySettle {
                                status: EntryStatus::Pending,
                                attempts,
                                last_error: Some(err.message.clone()),
                                not_before: Some(not_before),
                            },
                        )
                        .await?;
                    tracing::warn!(
                        entry_id = %entry.id,
                        attempts,
                        backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "entry rescheduled"
                    );
                    self.metrics.record_delivery("failed");
                    self.metrics.record_retry();
                    summary.retried += 1;
                }
            }
        }

        self.publish_depth().await?;
        Ok(summary)
    }

    /// Moves a `FAILED` entry back into rotation, immediately due.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown entry or a validation
    /// error if the entry is not in `FAILED`.
    #[tracing::instrument(skip(self), fields(entry_id = %id))]
    pub async fn redrive(&self, id: &EntryId) -> Result<ReplayQueueEntry> {
        let entry = self.store.redrive(id).await?;
        tracing::info!(attempts = entry.attempts, "entry redriven");
        self.testimony
            .append(Testimony::info(format!(
                "queue entry {id} redriven after {} attempts",
                entry.attempts
            )))
            .await?;
        self.publish_depth().await?;
        Ok(entry)
    }

    /// Drains on an interval until the surrounding task is cancelled.
    ///
    /// # Errors
    ///
    /// Returns the first storage error a drain pass hits.
    pub async fn run(&self, poll_interval: Duration) -> Result<()> {
        let mut ticker = tokio::time::interval(poll_interval);
        loop {
            ticker.tick().await;
            self.drain_once(Utc::now()).await?;
        }
    }

    async fn report_exhaustion(
        &self,
        entry: &ReplayQueueEntry,
        attempts: u32,
        err: &DeliveryError,
    ) -> Result<()> {
        let mut testimony = Testimony::error(format!(
            "queue entry {} exhausted after {attempts} attempts: {}",
            entry.id, err.message
        ));
        if let Some(run_id) = entry.run_id {
            testimony = testimony.with_run_id(run_id);
        }
        self.testimony.append(testimony).await
    }

    async fn publish_depth(&self) -> Result<()> {
        let depth = self.store.depth().await?;
        self.metrics.set_queue_depth(depth);
        Ok(())
    }
}

//! The testimony log.
//!
//! Testimonies are append-only operational statements: retries exhausted,
//! workflows aborted, entries redriven. They are the operator-facing trail
//! the queue and workflow engines write to, separate from tracing output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use scribe_core::{RunId, TestimonyId};

use crate::error::{Error, Result};

use std::sync::{PoisonError, RwLock};

/// Severity of a testimony.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestimonyLevel {
    /// Routine operational note.
    Info,
    /// Degraded but recoverable condition.
    Warn,
    /// A unit of work was lost or abandoned.
    Error,
}

impl std::fmt::Display for TestimonyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}

/// One immutable testimony entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Testimony {
    /// Unique entry ID.
    pub id: TestimonyId,
    /// The workflow run this concerns, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
    /// The capsule this concerns, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capsule_id: Option<String>,
    /// Severity.
    pub level: TestimonyLevel,
    /// Human-readable statement.
    pub message: String,
    /// When the testimony was recorded.
    pub created_at: DateTime<Utc>,
}

impl Testimony {
    fn new(level: TestimonyLevel, message: impl Into<String>) -> Self {
        Self {
            id: TestimonyId::generate(),
            run_id: None,
            capsule_id: None,
            level,
            message: message.into(),
            created_at: Utc::now(),
        }
    }

    /// Creates an info-level testimony.
    #[must_use]
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(TestimonyLevel::Info, message)
    }

    /// Creates a warn-level testimony.
    #[must_use]
    pub fn warn(message: impl Into<String>) -> Self {
        Self::new(TestimonyLevel::Warn, message)
    }

    /// Creates an error-level testimony.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(TestimonyLevel::Error, message)
    }

    /// Correlates this testimony with a workflow run.
    #[must_use]
    pub fn with_run_id(mut self, run_id: RunId) -> Self {
        self.run_id = Some(run_id);
        self
    }

    /// Correlates this testimony with a capsule.
    #[must_use]
    pub fn with_capsule_id(mut self, capsule_id: impl Into<String>) -> Self {
        self.capsule_id = Some(capsule_id.into());
        self
    }
}

/// Append-only storage for testimonies.
#[async_trait::async_trait]
pub trait TestimonyLog: Send + Sync {
    /// Appends a testimony. Entries are never updated or removed.
    async fn append(&self, testimony: Testimony) -> Result<()>;

    /// Returns testimonies correlated with a run, in insertion order.
    async fn for_run(&self, run_id: &RunId) -> Result<Vec<Testimony>>;

    /// Returns all testimonies in insertion order.
    async fn all(&self) -> Result<Vec<Testimony>>;
}

fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("testimony lock poisoned")
}

/// In-memory implementation of [`TestimonyLog`].
#[derive(Debug, Default)]
pub struct InMemoryTestimonyLog {
    entries: RwLock<Vec<Testimony>>,
}

impl InMemoryTestimonyLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl TestimonyLog for InMemoryTestimonyLog {
    async fn append(&self, testimony: Testimony) -> Result<()> {
        tracing::debug!(level = %testimony.level, message = %testimony.message, "testimony");
        self.entries.write().map_err(poison_err)?.push(testimony);
        Ok(())
    }

    async fn for_run(&self, run_id: &RunId) -> Result<Vec<Testimony>> {
        let entries = self.entries.read().map_err(poison_err)?;
        Ok(entries
            .iter()
            .filter(|t| t.run_id.as_ref() == Some(run_id))
            .cloned()
            .collect())
    }

    async fn all(&self) -> Result<Vec<Testimony>> {
        Ok(self.entries.read().map_err(poison_err)?.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_preserves_insertion_order() -> Result<()> {
        let log = InMemoryTestimonyLog::new();
        log.append(Testimony::info("first")).await?;
        log.append(Testimony::warn("second")).await?;

        let all = log.all().await?;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].message, "first");
        assert_eq!(all[1].level, TestimonyLevel::Warn);
        Ok(())
    }

    #[tokio::test]
    async fn for_run_filters_by_correlation() -> Result<()> {
        let log = InMemoryTestimonyLog::new();
        let run = RunId::generate();
        log.append(Testimony::error("retries exhausted").with_run_id(run))
            .await?;
        log.append(Testimony::info("unrelated")).await?;

        let scoped = log.for_run(&run).await?;
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].message, "retries exhausted");
        Ok(())
    }

    #[test]
    fn level_serializes_snake_case() {
        let json = serde_json::to_value(TestimonyLevel::Warn).expect("serializes");
        assert_eq!(json, serde_json::json!("warn"));
    }
}

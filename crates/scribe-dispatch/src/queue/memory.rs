//! In-memory queue store.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};

use scribe_core::EntryId;

use crate::error::{Error, Result};

use super::{EntrySettle, EntryStatus, QueueStore, ReplayQueueEntry};

fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("queue lock poisoned")
}

/// In-memory implementation of [`QueueStore`].
#[derive(Debug, Default)]
pub struct InMemoryQueue {
    entries: RwLock<HashMap<EntryId, ReplayQueueEntry>>,
}

impl InMemoryQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl QueueStore for InMemoryQueue {
    async fn enqueue(&self, entry: ReplayQueueEntry) -> Result<()> {
        self.entries
            .write()
            .map_err(poison_err)?
            .insert(entry.id, entry);
        Ok(())
    }

    async fn get(&self, id: &EntryId) -> Result<Option<ReplayQueueEntry>> {
        Ok(self.entries.read().map_err(poison_err)?.get(id).cloned())
    }

    async fn due_entries(&self, now: DateTime<Utc>) -> Result<Vec<ReplayQueueEntry>> {
        let entries = self.entries.read().map_err(poison_err)?;
        let mut due: Vec<ReplayQueueEntry> = entries
            .values()
            .filter(|e| {
                e.status == EntryStatus::Pending
                    && e.not_before.is_none_or(|not_before| not_before <= now)
            })
            .cloned()
            .collect();
        due.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.as_ulid().cmp(&b.id.as_ulid()))
        });
        Ok(due)
    }

    async fn claim(&self, id: &EntryId) -> Result<bool> {
        let mut entries = self.entries.write().map_err(poison_err)?;
        match entries.get_mut(id) {
            Some(entry) if entry.status == EntryStatus::Pending => {
                entry.status = EntryStatus::Processing;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn settle(&self, id: &EntryId, settle: EntrySettle) -> Result<ReplayQueueEntry> {
        let mut entries = self.entries.write().map_err(poison_err)?;
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| Error::not_found("queue entry", id))?;
        entry.status = settle.status;
        entry.attempts = settle.attempts;
        entry.last_error = settle.last_error;
        entry.not_before = settle.not_before;
        Ok(entry.clone())
    }

    async fn redrive(&self, id: &EntryId) -> Result<ReplayQueueEntry> {
        let mut entries = self.entries.write().map_err(poison_err)?;
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| Error::not_found("queue entry", id))?;
        if entry.status != EntryStatus::Failed {
            return Err(Error::validation(format!(
                "queue entry {id} is {}, only FAILED entries can be redriven",
                entry.status
            )));
        }
        // Attempt history and last_error survive so operators can see what
        // led here.
        entry.status = EntryStatus::Pending;
        entry.not_before = None;
        Ok(entry.clone())
    }

    async fn depth(&self) -> Result<usize> {
        let entries = self.entries.read().map_err(poison_err)?;
        Ok(entries
            .values()
            .filter(|e| !e.status.is_terminal())
            .count())
    }
}

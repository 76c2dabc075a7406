//! In-memory ledger store.
//!
//! Backs tests and single-process embedding. Version chains live in a
//! `HashMap` keyed by dispatch ID; CAS is enforced under a single lock.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use scribe_core::DispatchId;

use crate::error::{Error, Result};
use crate::record::DispatchRecord;

use super::{CasResult, LedgerStore};

fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("ledger lock poisoned")
}

/// In-memory implementation of [`LedgerStore`].
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    records: RwLock<HashMap<DispatchId, Vec<DispatchRecord>>>,
}

impl InMemoryLedger {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of distinct dispatches stored.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the lock is poisoned.
    pub fn dispatch_count(&self) -> Result<usize> {
        Ok(self.records.read().map_err(poison_err)?.len())
    }

    /// Mutates the stored current version of a dispatch in place.
    ///
    /// Simulates out-of-band storage corruption so audit behavior against
    /// tampered records can be exercised. Returns false if the dispatch
    /// does not exist.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the lock is poisoned.
    pub fn tamper<F>(&self, dispatch_id: &DispatchId, mutate: F) -> Result<bool>
    where
        F: FnOnce(&mut DispatchRecord),
    {
        let mut records = self.records.write().map_err(poison_err)?;
        match records.get_mut(dispatch_id).and_then(|v| v.last_mut()) {
            Some(record) => {
                mutate(record);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait::async_trait]
impl LedgerStore for InMemoryLedger {
    async fn insert_new(&self, record: &DispatchRecord) -> Result<()> {
        let mut records = self.records.write().map_err(poison_err)?;
        if records.contains_key(&record.dispatch_id) {
            return Err(Error::DuplicateId {
                id: record.dispatch_id.to_string(),
            });
        }
        records.insert(record.dispatch_id.clone(), vec![record.clone()]);
        Ok(())
    }

    async fn get_current(&self, dispatch_id: &DispatchId) -> Result<Option<DispatchRecord>> {
        let records = self.records.read().map_err(poison_err)?;
        Ok(records
            .get(dispatch_id)
            .and_then(|versions| versions.last().cloned()))
    }

    async fn history(&self, dispatch_id: &DispatchId) -> Result<Vec<DispatchRecord>> {
        let records = self.records.read().map_err(poison_err)?;
        Ok(records.get(dispatch_id).cloned().unwrap_or_default())
    }

    async fn put_version(
        &self,
        record: &DispatchRecord,
        expected_version: u64,
    ) -> Result<CasResult> {
        let mut records = self.records.write().map_err(poison_err)?;
        let Some(versions) = records.get_mut(&record.dispatch_id) else {
            return Ok(CasResult::NotFound);
        };
        let current = versions
            .last()
            .map(|r| r.version)
            .ok_or_else(|| Error::storage("empty version chain"))?;
        if current != expected_version {
            return Ok(CasResult::VersionConflict { actual: current });
        }
        versions.push(record.clone());
        Ok(CasResult::Success)
    }
}

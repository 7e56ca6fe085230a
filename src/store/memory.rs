//! In-process retry store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, VecDeque};
use tokio::sync::Mutex;

use super::{truncate_error, RecordId, RetryStore, StoreError, StoredRecord};
use crate::retry::RetryRecord;

/// Discarded records kept for inspection by default.
const DEFAULT_DISCARD_HISTORY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Pending,
    InFlight,
}

#[derive(Debug)]
struct Entry {
    stored: StoredRecord,
    status: Status,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    entries: BTreeMap<RecordId, Entry>,
    discarded: VecDeque<StoredRecord>,
}

/// Retry store kept in memory. Records are lost when the process exits.
///
/// Discarded records leave the store. Only the most recent ones are kept,
/// see [`MemoryRetryStore::with_discard_history`].
#[derive(Debug)]
pub struct MemoryRetryStore {
    inner: Mutex<Inner>,
    discard_history: usize,
}

impl Default for MemoryRetryStore {
    fn default() -> Self {
        Self {
            inner: Mutex::default(),
            discard_history: DEFAULT_DISCARD_HISTORY,
        }
    }
}

impl MemoryRetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of discarded records to remember. Zero keeps none.
    pub fn with_discard_history(mut self, limit: usize) -> Self {
        self.discard_history = limit;
        self
    }

    /// Most recently discarded records, oldest first.
    pub async fn discarded(&self) -> Vec<StoredRecord> {
        let inner = self.inner.lock().await;
        inner.discarded.iter().cloned().collect()
    }

    /// Records held for delivery, pending or in flight.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl RetryStore for MemoryRetryStore {
    async fn append(&self, record: RetryRecord) -> Result<RecordId, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.next_id += 1;
        let id = RecordId(inner.next_id);
        let next_attempt_at = record.timestamp;
        inner.entries.insert(
            id,
            Entry {
                stored: StoredRecord {
                    id,
                    record,
                    next_attempt_at,
                    last_error: None,
                },
                status: Status::Pending,
            },
        );
        Ok(id)
    }

    async fn claim_due(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        let mut inner = self.inner.lock().await;

        let mut due: Vec<(DateTime<Utc>, RecordId)> = inner
            .entries
            .values()
            .filter(|e| e.status == Status::Pending && e.stored.next_attempt_at <= now)
            .map(|e| (e.stored.next_attempt_at, e.stored.id))
            .collect();
        due.sort();
        due.truncate(limit);

        let mut claimed = Vec::with_capacity(due.len());
        for (_, id) in due {
            if let Some(entry) = inner.entries.get_mut(&id) {
                entry.status = Status::InFlight;
                claimed.push(entry.stored.clone());
            }
        }
        Ok(claimed)
    }

    async fn complete(&self, id: RecordId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner
            .entries
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::UnknownRecord(id))
    }

    async fn reschedule(
        &self,
        id: RecordId,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let entry = inner
            .entries
            .get_mut(&id)
            .ok_or(StoreError::UnknownRecord(id))?;
        entry.status = Status::Pending;
        entry.stored.record.retry_count += 1;
        entry.stored.next_attempt_at = next_attempt_at;
        entry.stored.last_error = Some(truncate_error(error).to_string());
        Ok(())
    }

    async fn discard(&self, id: RecordId, error: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let mut entry = inner
            .entries
            .remove(&id)
            .ok_or(StoreError::UnknownRecord(id))?;
        if self.discard_history == 0 {
            return Ok(());
        }
        entry.stored.last_error = Some(truncate_error(error).to_string());
        if inner.discarded.len() == self.discard_history {
            inner.discarded.pop_front();
        }
        inner.discarded.push_back(entry.stored);
        Ok(())
    }

    async fn pending_count(&self) -> Result<usize, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .entries
            .values()
            .filter(|e| e.status == Status::Pending)
            .count())
    }

    async fn recover_orphans(&self) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock().await;
        let mut recovered = 0;
        for entry in inner.entries.values_mut() {
            if entry.status == Status::InFlight {
                entry.status = Status::Pending;
                recovered += 1;
            }
        }
        Ok(recovered)
    }
}

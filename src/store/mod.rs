//! Retry record storage.

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use memory::MemoryRetryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteRetryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

use crate::retry::RetryRecord;

/// Longest error message kept with a record.
const MAX_ERROR_LEN: usize = 2000;

/// Unique identifier for a stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(pub i64);

/// A record retrieved from storage.
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub id: RecordId,
    pub record: RetryRecord,
    pub next_attempt_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

/// Error type for store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("unknown retry record: {0:?}")]
    UnknownRecord(RecordId),
}

/// Append-only hand-off point for failed deliveries.
///
/// Records move `pending -> in flight` when claimed, then are either
/// completed (removed), rescheduled (back to pending), or discarded.
#[async_trait]
pub trait RetryStore: Send + Sync {
    /// Store a record, due immediately.
    async fn append(&self, record: RetryRecord) -> Result<RecordId, StoreError>;

    /// Claim up to `limit` pending records due at or before `now`.
    async fn claim_due(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<StoredRecord>, StoreError>;

    /// Remove a record that was delivered.
    async fn complete(&self, id: RecordId) -> Result<(), StoreError>;

    /// Return a record to pending with its retry count incremented.
    async fn reschedule(
        &self,
        id: RecordId,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), StoreError>;

    /// Give up on a record. It is never claimed again.
    async fn discard(&self, id: RecordId, error: &str) -> Result<(), StoreError>;

    /// Number of records waiting for an attempt.
    async fn pending_count(&self) -> Result<usize, StoreError>;

    /// Return records stuck in flight to pending.
    /// Call on startup to recover from crashes. The forward loop also calls
    /// it after a pass in which a store update failed.
    async fn recover_orphans(&self) -> Result<usize, StoreError> {
        Ok(0)
    }
}

#[async_trait]
impl<S: RetryStore + ?Sized> RetryStore for Arc<S> {
    async fn append(&self, record: RetryRecord) -> Result<RecordId, StoreError> {
        (**self).append(record).await
    }

    async fn claim_due(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        (**self).claim_due(limit, now).await
    }

    async fn complete(&self, id: RecordId) -> Result<(), StoreError> {
        (**self).complete(id).await
    }

    async fn reschedule(
        &self,
        id: RecordId,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), StoreError> {
        (**self).reschedule(id, next_attempt_at, error).await
    }

    async fn discard(&self, id: RecordId, error: &str) -> Result<(), StoreError> {
        (**self).discard(id, error).await
    }

    async fn pending_count(&self) -> Result<usize, StoreError> {
        (**self).pending_count().await
    }

    async fn recover_orphans(&self) -> Result<usize, StoreError> {
        (**self).recover_orphans().await
    }
}

fn truncate_error(error: &str) -> &str {
    match error.char_indices().nth(MAX_ERROR_LEN) {
        Some((index, _)) => &error[..index],
        None => error,
    }
}

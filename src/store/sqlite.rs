//! SQLite implementation of RetryStore.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::{truncate_error, RecordId, RetryStore, StoreError, StoredRecord};
use crate::retry::RetryRecord;
use crate::transport::Destination;

type RecordRow = (i64, String, Vec<u8>, String, String, i64, i64, Option<String>);

const SELECT_COLUMNS: &str = "id, correlation_id, payload, destination, created_at, \
                              retry_count, next_attempt_at, last_error";

/// SQLite-backed retry store.
pub struct SqliteRetryStore {
    pool: SqlitePool,
}

impl SqliteRetryStore {
    /// Create a new SqliteRetryStore.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Run migrations to create the retry table.
    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS edgeflow_retry (
                id INTEGER PRIMARY KEY,
                correlation_id TEXT NOT NULL,
                payload BLOB NOT NULL,
                destination TEXT NOT NULL,
                created_at TEXT NOT NULL,
                retry_count INTEGER NOT NULL DEFAULT 0,
                next_attempt_at INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                last_error TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_edgeflow_retry_due
            ON edgeflow_retry(status, next_attempt_at)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        Ok(())
    }
}

fn storage(e: sqlx::Error) -> StoreError {
    StoreError::Storage(e.to_string())
}

fn from_row(row: RecordRow) -> Result<StoredRecord, StoreError> {
    let (
        id,
        correlation_id,
        payload,
        destination,
        created_at,
        retry_count,
        next_attempt_at,
        last_error,
    ) = row;
    let destination: Destination = serde_json::from_str(&destination)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    let timestamp = DateTime::parse_from_rfc3339(&created_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    let next_attempt_at = DateTime::<Utc>::from_timestamp_millis(next_attempt_at)
        .ok_or_else(|| StoreError::Serialization(format!("invalid timestamp {next_attempt_at}")))?;

    Ok(StoredRecord {
        id: RecordId(id),
        record: RetryRecord {
            correlation_id,
            payload,
            destination,
            timestamp,
            retry_count: u32::try_from(retry_count).unwrap_or(u32::MAX),
        },
        next_attempt_at,
        last_error,
    })
}

#[async_trait]
impl RetryStore for SqliteRetryStore {
    async fn append(&self, record: RetryRecord) -> Result<RecordId, StoreError> {
        let destination = serde_json::to_string(&record.destination)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO edgeflow_retry
                (correlation_id, payload, destination, created_at, retry_count, next_attempt_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&record.correlation_id)
        .bind(&record.payload)
        .bind(destination)
        .bind(record.timestamp.to_rfc3339())
        .bind(i64::from(record.retry_count))
        .bind(record.timestamp.timestamp_millis())
        .fetch_one(&self.pool)
        .await
        .map_err(storage)?;

        Ok(RecordId(id))
    }

    async fn claim_due(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        // SQLite doesn't support UPDATE ... LIMIT with RETURNING directly,
        // so we do it in two steps within a transaction
        let mut tx = self.pool.begin().await.map_err(storage)?;

        let ids: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT id FROM edgeflow_retry
            WHERE status = 'pending' AND next_attempt_at <= ?
            ORDER BY next_attempt_at, id
            LIMIT ?
            "#,
        )
        .bind(now.timestamp_millis())
        .bind(limit as i64)
        .fetch_all(&mut *tx)
        .await
        .map_err(storage)?;

        if ids.is_empty() {
            tx.commit().await.map_err(storage)?;
            return Ok(vec![]);
        }

        let placeholders: Vec<&str> = ids.iter().map(|_| "?").collect();
        let in_clause = placeholders.join(",");

        let update_query = format!(
            "UPDATE edgeflow_retry SET status = 'in_flight' WHERE id IN ({})",
            in_clause
        );
        let mut update = sqlx::query(&update_query);
        for id in &ids {
            update = update.bind(id);
        }
        update.execute(&mut *tx).await.map_err(storage)?;

        let select_query = format!(
            "SELECT {} FROM edgeflow_retry WHERE id IN ({}) ORDER BY next_attempt_at, id",
            SELECT_COLUMNS, in_clause
        );
        let mut select = sqlx::query_as::<_, RecordRow>(&select_query);
        for id in &ids {
            select = select.bind(id);
        }
        let rows = select.fetch_all(&mut *tx).await.map_err(storage)?;

        tx.commit().await.map_err(storage)?;

        rows.into_iter().map(from_row).collect()
    }

    async fn complete(&self, id: RecordId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM edgeflow_retry WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(storage)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::UnknownRecord(id));
        }
        Ok(())
    }

    async fn reschedule(
        &self,
        id: RecordId,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE edgeflow_retry
            SET status = 'pending', retry_count = retry_count + 1,
                next_attempt_at = ?, last_error = ?
            WHERE id = ?
            "#,
        )
        .bind(next_attempt_at.timestamp_millis())
        .bind(truncate_error(error))
        .bind(id.0)
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::UnknownRecord(id));
        }
        Ok(())
    }

    async fn discard(&self, id: RecordId, error: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE edgeflow_retry
            SET status = 'discarded', last_error = ?
            WHERE id = ?
            "#,
        )
        .bind(truncate_error(error))
        .bind(id.0)
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::UnknownRecord(id));
        }
        Ok(())
    }

    async fn pending_count(&self) -> Result<usize, StoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM edgeflow_retry WHERE status = 'pending'")
                .fetch_one(&self.pool)
                .await
                .map_err(storage)?;
        Ok(count as usize)
    }

    async fn recover_orphans(&self) -> Result<usize, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE edgeflow_retry
            SET status = 'pending'
            WHERE status = 'in_flight'
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        Ok(result.rows_affected() as usize)
    }
}

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

use super::models::Entry;
use crate::error::{AppError, AppResult};

/// Storage operations the expiry worker needs
#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Active, still-paid entries whose `expires_at` is at or before `now`,
    /// oldest expiry first, at most `limit` rows
    async fn fetch_expired_candidates(&self, now: i64, limit: u32) -> AppResult<Vec<Entry>>;

    /// Rebind an entry to the free instruction and flip it to free access
    async fn mark_entry_free(&self, entry_id: &str, free_piid: &str, now: i64) -> AppResult<()>;
}

/// Postgres-backed entry store
pub struct PgEntryStore {
    pub pool: PgPool,
}

impl PgEntryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntryStore for PgEntryStore {
    async fn fetch_expired_candidates(&self, now: i64, limit: u32) -> AppResult<Vec<Entry>> {
        let entries = sqlx::query_as::<_, Entry>(
            r#"
            SELECT id, feed_id, cid, piid, expires_at, is_active, is_free, updated_at
            FROM entries
            WHERE expires_at IS NOT NULL
              AND expires_at <= $1
              AND is_active = TRUE
              AND is_free = FALSE
            ORDER BY expires_at ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        debug!("Fetched {} expired entry candidates", entries.len());
        Ok(entries)
    }

    async fn mark_entry_free(&self, entry_id: &str, free_piid: &str, now: i64) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE entries
            SET piid = $2, is_free = TRUE, updated_at = $3
            WHERE id = $1
            "#,
        )
        .bind(entry_id)
        .bind(free_piid)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Entry {} not found", entry_id)));
        }

        Ok(())
    }
}

//! Reading Store - Work Queue Interface
//!
//! The scoring loop sees the store as a source of sessions. A session owns one
//! connection and one transaction for the length of an iteration:
//! fetch -> stage updates -> commit or rollback. Dropping a session without
//! committing rolls back and returns the connection.

#![allow(async_fn_in_trait)]

use sqlx::{PgPool, Postgres, Transaction};
use thiserror::Error;

use crate::models::{AnomalyStatus, Reading, ReadingId, Verdict};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Something that hands out scoring sessions
pub trait ReadingStore {
    type Session: ScoringSession;

    /// Acquire a connection and open the batch transaction
    async fn acquire(&self) -> Result<Self::Session, StoreError>;
}

/// One batch transaction
pub trait ScoringSession {
    /// Unscored readings, oldest first, at most `limit`, skipping `exclude`
    async fn fetch_unscored(
        &mut self,
        limit: u32,
        exclude: &[ReadingId],
    ) -> Result<Vec<Reading>, StoreError>;

    /// Record a verdict inside the open transaction
    async fn stage(&mut self, id: ReadingId, verdict: Verdict) -> Result<(), StoreError>;

    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}

// ============================================================================
// POSTGRES
// ============================================================================

#[derive(Debug, Clone)]
pub struct PgReadingStore {
    pool: PgPool,
}

impl PgReadingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl ReadingStore for PgReadingStore {
    type Session = PgScoringSession;

    async fn acquire(&self) -> Result<Self::Session, StoreError> {
        if self.pool.is_closed() {
            return Err(StoreError::Unavailable("connection pool is closed".to_string()));
        }
        let tx = self.pool.begin().await?;
        Ok(PgScoringSession { tx })
    }
}

pub struct PgScoringSession {
    tx: Transaction<'static, Postgres>,
}

impl ScoringSession for PgScoringSession {
    async fn fetch_unscored(
        &mut self,
        limit: u32,
        exclude: &[ReadingId],
    ) -> Result<Vec<Reading>, StoreError> {
        Ok(Reading::fetch_unscored(&mut *self.tx, i64::from(limit), exclude).await?)
    }

    async fn stage(&mut self, id: ReadingId, verdict: Verdict) -> Result<(), StoreError> {
        let status = AnomalyStatus::from(verdict);
        let affected = Reading::set_anomaly_status(&mut *self.tx, id, status).await?;
        if affected == 0 {
            // Row was claimed with FOR UPDATE, so this only happens if it was deleted
            tracing::warn!(reading_id = id, "Reading vanished before its status could be set");
        }
        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        Ok(self.tx.commit().await?)
    }

    async fn rollback(self) -> Result<(), StoreError> {
        Ok(self.tx.rollback().await?)
    }
}

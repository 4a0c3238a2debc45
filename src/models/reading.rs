//! Sensor reading model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection};

/// Store-assigned reading identity
pub type ReadingId = i64;

/// One sensor observation as stored in `sensor_readings`.
///
/// `temperature` and `humidity` are NUMERIC columns, read back as `float8`.
/// They stay optional because upstream payloads are not validated on insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Reading {
    pub id: ReadingId,
    pub timestamp_utc: DateTime<Utc>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub device_id: Option<String>,
    pub is_anomaly: Option<bool>,
}

/// Tri-state anomaly status. Only `Unscored -> Normal | Anomalous` is allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyStatus {
    Unscored,
    Normal,
    Anomalous,
}

impl AnomalyStatus {
    /// Column value as read by the query API
    pub fn as_column(self) -> Option<bool> {
        match self {
            AnomalyStatus::Unscored => None,
            AnomalyStatus::Normal => Some(false),
            AnomalyStatus::Anomalous => Some(true),
        }
    }
}

impl From<Option<bool>> for AnomalyStatus {
    fn from(value: Option<bool>) -> Self {
        match value {
            None => AnomalyStatus::Unscored,
            Some(false) => AnomalyStatus::Normal,
            Some(true) => AnomalyStatus::Anomalous,
        }
    }
}

/// Scoring result for one reading; what the loop stages for commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Normal,
    Anomalous,
}

impl From<Verdict> for AnomalyStatus {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Normal => AnomalyStatus::Normal,
            Verdict::Anomalous => AnomalyStatus::Anomalous,
        }
    }
}

impl Reading {
    /// Device identifier if present and non-empty. Returned verbatim since it
    /// forms the one-hot feature name; a blank id is just an unknown device.
    pub fn device(&self) -> Option<&str> {
        self.device_id.as_deref().filter(|d| !d.is_empty())
    }

    /// Oldest unscored readings, claimed for the surrounding transaction.
    ///
    /// `SKIP LOCKED` lets a second engine instance take the next rows instead
    /// of scoring the same ones.
    pub async fn fetch_unscored(
        conn: &mut PgConnection,
        limit: i64,
        exclude: &[ReadingId],
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Reading>(
            r#"
            SELECT id, timestamp_utc,
                   temperature::float8 AS temperature,
                   humidity::float8 AS humidity,
                   device_id, is_anomaly
            FROM sensor_readings
            WHERE is_anomaly IS NULL
              AND NOT (id = ANY($2))
            ORDER BY timestamp_utc ASC, id ASC
            LIMIT $1
            FOR UPDATE SKIP LOCKED
            "#
        )
        .bind(limit)
        .bind(exclude)
        .fetch_all(conn)
        .await
    }

    /// Set the status of an unscored reading. Returns rows affected; zero means
    /// the reading was already scored (or is gone) and nothing changed.
    pub async fn set_anomaly_status(
        conn: &mut PgConnection,
        id: ReadingId,
        status: AnomalyStatus,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE sensor_readings
            SET is_anomaly = $1
            WHERE id = $2 AND is_anomaly IS NULL
            "#
        )
        .bind(status.as_column())
        .bind(id)
        .execute(conn)
        .await?;

        Ok(result.rows_affected())
    }
}

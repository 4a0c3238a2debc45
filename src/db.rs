//! Database module - PostgreSQL connection and migrations

use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::config::Config;

/// Create the connection pool.
///
/// The pool connects lazily: an unreachable database at startup is not fatal,
/// the scoring loop retries acquisition on every poll.
pub fn create_pool(config: &Config) -> Result<PgPool, sqlx::Error> {
    let options = config.connect_options()?;

    Ok(PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(config.db_acquire_timeout)
        .connect_lazy_with(options))
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Multiple statements need the simple query protocol
    sqlx::raw_sql(SCHEMA_SQL).execute(pool).await?;

    tracing::info!("Database schema applied successfully");
    Ok(())
}

/// Database schema SQL
const SCHEMA_SQL: &str = r#"
-- Sensor readings (inserted by the ingestion side, scored here)
CREATE TABLE IF NOT EXISTS sensor_readings (
    id BIGSERIAL PRIMARY KEY,
    timestamp_utc TIMESTAMPTZ NOT NULL,
    temperature NUMERIC(5, 2),
    humidity NUMERIC(5, 2),
    device_id VARCHAR(100),
    is_anomaly BOOLEAN
);

-- Work queue: oldest unscored readings first
CREATE INDEX IF NOT EXISTS idx_sensor_readings_unscored
    ON sensor_readings (timestamp_utc, id)
    WHERE is_anomaly IS NULL;

CREATE INDEX IF NOT EXISTS idx_sensor_readings_device
    ON sensor_readings (device_id, timestamp_utc);
"#;

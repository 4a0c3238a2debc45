//! SAFE Scoring Engine
//!
//! Background daemon that scores sensor readings for anomalies.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    SAFE SCORING ENGINE                       │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌────────────┐   ┌─────────────────┐   ┌─────────────────┐  │
//! │  │  Model     │   │  Feature        │   │  Scoring Loop   │  │
//! │  │  Handle    │──▶│  Builder        │◀──│  (poll/commit)  │  │
//! │  │  (schema)  │   │  (one-hot)      │   │                 │  │
//! │  └────────────┘   └─────────────────┘   └────────┬────────┘  │
//! │                                                  ▼           │
//! │                                         ┌─────────────────┐  │
//! │                                         │  PostgreSQL     │  │
//! │                                         │ sensor_readings │  │
//! │                                         └─────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod db;
mod error;
mod logic;
mod models;

use std::process::ExitCode;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::{Config, LogFormat};
use logic::scoring::{LoopSettings, ScoringLoop, TokioPacer};
use logic::store::PgReadingStore;

use error::AppResult;

#[tokio::main]
async fn main() -> ExitCode {
    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    init_tracing(config.log_format);

    tracing::info!("SAFE Scoring Engine v{} starting...", env!("CARGO_PKG_VERSION"));

    if report(start(config).await) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Fatal errors are reported here, once. True on a clean shutdown.
fn report(result: AppResult<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(error = %e, "FATAL: scoring engine stopped, no readings will be scored");
            false
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "safe_scoring_engine=info,sqlx=warn".into());

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn start(config: Config) -> AppResult<()> {
    config.validate()?;

    tracing::info!("Database: {}", config.database_label());
    // Lazy pool: no connection is opened until the loop asks for one
    let pool = db::create_pool(&config)?;

    // Model first: nothing touches the store without it
    let mut engine = ScoringLoop::from_artifact(
        &config.model_path,
        config.model_sha256.as_deref(),
        PgReadingStore::new(pool.clone()),
        TokioPacer,
        LoopSettings::from_config(&config),
    )?;
    let model = Arc::clone(engine.model());
    let stats = engine.stats();

    if config.run_migrations {
        tracing::info!("Running database migrations...");
        // Store outages are retried by the loop, so this is not fatal
        if let Err(e) = db::run_migrations(&pool).await {
            tracing::warn!("Migrations skipped, store not ready: {}", e);
        }
    }

    tokio::select! {
        _ = engine.run() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown requested");
        }
    }

    // Any open batch transaction was dropped above and rolls back
    pool.close().await;

    tracing::info!(
        model = %serde_json::json!(model.metadata()),
        stats = %serde_json::json!(stats.snapshot()),
        inference = %serde_json::json!(model.stats()),
        quarantined = engine.quarantine().len(),
        "Scoring engine stopped"
    );

    Ok(())
}

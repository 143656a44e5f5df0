use std::{sync::Arc, time::Duration};

use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::{info, warn};

use crate::{
    clock::SystemClock,
    config::Config,
    entries::PgEntryStore,
    error::AppResult,
    expiry::{EngineSettings, ExpiryScheduler, ReconciliationEngine},
    payment::HttpPaymentClientFactory,
    server::AppState,
};

pub async fn initialize_app_state(config: &Config) -> AppResult<AppState> {
    info!("Initializing application components ...");

    let pool = initialize_database(&config.database_url).await?;
    let store = Arc::new(PgEntryStore::new(pool));

    let engine = Arc::new(ReconciliationEngine::new(
        store,
        Arc::new(SystemClock),
        EngineSettings::from(&config.expiry),
    ));

    if config.expiry.free_payment_instruction_id.is_none() {
        warn!("⚠️  FREE_PAYMENT_INSTRUCTION_ID not set - expiry worker will not start");
    }
    if config.expiry.max_concurrency > 1 {
        info!(
            "Expiry worker transitions up to {} entries concurrently",
            config.expiry.max_concurrency
        );
    }

    let client_factory = Arc::new(HttpPaymentClientFactory::new(
        config.payment_instructions.clone(),
    ));
    let scheduler = Arc::new(ExpiryScheduler::new(
        config.expiry.clone(),
        engine,
        client_factory,
    ));
    info!("✅ Expiry scheduler initialized");

    Ok(AppState { scheduler })
}

async fn initialize_database(database_url: &str) -> AppResult<PgPool> {
    info!("📊 Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await?;

    info!("✓ Database pool configured: 10 max connections");

    info!("🔄 Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("✓ Database initialized");
    Ok(pool)
}

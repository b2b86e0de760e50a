pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod repositories;
pub(crate) mod schemas;
pub(crate) mod services;
pub(crate) mod tasks;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use tokio::sync::watch;

use crate::core::{config::Settings, redis::RedisHandle, state::AppState, telemetry};
use crate::repositories::material_records::PgRecordStore;
use crate::repositories::materials::PgMaterialStore;
use crate::repositories::users::PgIdentityLookup;
use crate::services::extraction::LlmRecordExtractor;
use crate::services::files::MaterialFiles;
use crate::services::review::{RecordFinalizer, ReviewEngine};
use crate::services::storage::StorageService;
use crate::tasks::finalize_queue::FinalizeQueue;

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let db_pool = db::init_pool(&settings).await?;
    db::run_migrations(&db_pool).await?;

    let redis = RedisHandle::new(settings.redis().redis_url());
    if let Err(err) = redis.connect().await {
        tracing::error!(error = %err, "Failed to connect to Redis; continuing without rate limits");
    } else {
        tracing::info!("Redis connected successfully");
    }

    let storage = StorageService::from_settings(&settings).await?;
    let files = MaterialFiles::from_settings(&settings, storage);
    let extractor = LlmRecordExtractor::from_settings(&settings, files)?;

    let materials = Arc::new(PgMaterialStore::new(db_pool.clone()));
    let records = Arc::new(PgRecordStore::new(db_pool.clone()));
    let finalizer = Arc::new(RecordFinalizer::new(materials.clone(), records, Arc::new(extractor)));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (queue, workers) = FinalizeQueue::start(
        finalizer.clone(),
        settings.review().finalize_queue_capacity,
        settings.review().finalize_workers,
        shutdown_rx,
    );

    let engine = Arc::new(ReviewEngine::new(materials, finalizer, Arc::new(queue)));
    let identity = Arc::new(PgIdentityLookup::new(db_pool.clone()));
    let state = AppState::new(settings, db_pool, redis.clone(), identity, engine);

    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        finalize_workers = workers.len(),
        "Material review API listening"
    );

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(core::shutdown::shutdown_signal(shutdown_tx))
        .await;

    for handle in workers {
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "Finalize worker join failed");
        }
    }

    redis.disconnect().await;
    tracing::info!("Redis disconnected");

    result?;

    Ok(())
}

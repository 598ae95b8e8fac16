// src/server/mod.rs

//! The HTTP listener, dispatcher wiring and process lifecycle.

mod dispatcher;
pub mod handlers;
mod hooks;
mod metrics_server;

pub use dispatcher::Dispatcher;
pub use hooks::{HeaderOverrideHook, RequestHook};

use crate::config::{Config, StorageBackendConfig};
use crate::core::coordinator::{
    BucketStorages, Coordinator, CoordinatorSettings, PlaceholderSource,
};
use crate::core::engine::HttpImageEngine;
use crate::core::storage::{FilesystemStorage, HttpStorage, MemoryStorage, Storage};
use crate::core::tasks::{CacheSweeperTask, FlightJanitorTask};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

/// Shared state behind every request handler.
pub struct AppState {
    pub config: Arc<Config>,
    pub dispatcher: Dispatcher,
    pub hooks: Vec<Box<dyn RequestHook>>,
}

/// The main server startup function, orchestrating all setup phases.
pub async fn run(config: Config) -> Result<()> {
    // 1. Build per-bucket storage, the engine client and the coordinator.
    let buckets = build_bucket_storages(&config);
    let engine = Arc::new(HttpImageEngine::new(config.engine.url.clone()));
    let placeholder = config
        .placeholder
        .as_ref()
        .map(|p| PlaceholderSource::from_file(&p.source, &p.path))
        .transpose()?;
    let settings = CoordinatorSettings {
        cache_max_entries: config.cache.max_entries,
        concurrency: config.processing.concurrency,
        lock_timeout: config.server.lock_timeout(),
        success_ttl: config.cache.success_ttl,
        placeholder_ttl: config.cache.placeholder_ttl,
        error_ttl: config.cache.error_ttl,
        writeback_timeout: config.processing.writeback_timeout,
    };
    let coordinator = Arc::new(Coordinator::new(buckets, engine, placeholder, settings));

    // 2. Spawn background tasks.
    let (shutdown_tx, _) = broadcast::channel(1);
    tokio::spawn(
        CacheSweeperTask::new(Arc::clone(coordinator.cache())).run(shutdown_tx.subscribe()),
    );
    tokio::spawn(
        FlightJanitorTask::new(Arc::clone(coordinator.flight()), config.server.lock_timeout())
            .run(shutdown_tx.subscribe()),
    );
    if config.metrics.enabled {
        tokio::spawn(metrics_server::run_metrics_server(
            config.metrics.port,
            shutdown_tx.subscribe(),
        ));
    }

    // 3. Wire the dispatcher and the HTTP surface.
    let dispatcher = Dispatcher::new(Arc::clone(&coordinator), config.server.queue_len);
    let hooks: Vec<Box<dyn RequestHook>> =
        vec![Box::new(HeaderOverrideHook::from_config(&config.headers))];
    let listen = config.server.listen;
    let state = Arc::new(AppState {
        config: Arc::new(config),
        dispatcher,
        hooks,
    });

    let app = axum::Router::new()
        .fallback(handlers::handle)
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .with_context(|| format!("Failed to bind listener on {listen}"))?;
    info!("Pixelgate listening on {listen}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await
        .context("HTTP server error")?;

    Ok(())
}

/// Builds the storage pair for every configured bucket.
fn build_bucket_storages(config: &Config) -> HashMap<String, BucketStorages> {
    config
        .buckets
        .iter()
        .map(|(name, bucket)| {
            let basic = build_storage(&bucket.storage.basic);
            let transforms = bucket
                .storage
                .transforms
                .as_ref()
                .map(build_storage)
                .unwrap_or_else(|| Arc::clone(&basic));
            (name.clone(), BucketStorages { basic, transforms })
        })
        .collect()
}

fn build_storage(config: &StorageBackendConfig) -> Arc<dyn Storage> {
    match config {
        StorageBackendConfig::Filesystem { root_path } => {
            Arc::new(FilesystemStorage::new(root_path.clone()))
        }
        StorageBackendConfig::Memory => Arc::new(MemoryStorage::new()),
        StorageBackendConfig::Http { base_url } => Arc::new(HttpStorage::new(base_url.clone())),
    }
}

/// Resolves when the process receives a termination signal, broadcasting
/// shutdown to the background tasks first.
async fn shutdown_signal(shutdown_tx: broadcast::Sender<()>) {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
}

use std::sync::Arc;

use anyhow::Context;

use edutrack_api::app::{AppState, build_app};
use edutrack_api::config::ApiConfig;
use edutrack_events::{EventBus, EventEnvelope, InMemoryEventBus};
use edutrack_infra::document_store::InMemoryDocumentStore;
use edutrack_infra::propagation::default_registry;
use edutrack_infra::{Dispatcher, PropagationConfig, PropagationWorker};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    edutrack_observability::init();

    let api_config = ApiConfig::from_env()?;
    let propagation_config = PropagationConfig::from_env()?;

    // In-memory wiring (dev/test): store + change feed + propagation worker.
    let feed: Arc<InMemoryEventBus<EventEnvelope>> = Arc::new(InMemoryEventBus::new());
    let store = Arc::new(InMemoryDocumentStore::with_change_feed(feed.clone()));

    let registry = Arc::new(default_registry()?);
    tracing::info!(bindings = ?registry.bindings(), "propagation handlers registered");
    let dispatcher = Arc::new(Dispatcher::new(registry, store.clone(), propagation_config));
    let worker = PropagationWorker::spawn(dispatcher, feed.subscribe());

    let app = build_app(AppState::with_hs256(store, &api_config.jwt_secret));

    let listener = tokio::net::TcpListener::bind(api_config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", api_config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    worker.shutdown().await;
    Ok(())
}

mod api;
mod config;
mod data;
mod errors;
mod provider;
mod websocket;

use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use tokio::net::TcpListener;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use crate::api::{create_api_router, ApiState};
use crate::config::{Config, SourceKind, STATS_INTERVAL_SECS};
use crate::data::{Hub, HubConfig, PriceReading, StoreConfig, TtlStore};
use crate::provider::{CoinDeskSource, PriceFetcher, PriceSource, SimulatedSource};
use crate::websocket::run_listener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(&config.log_level));

    config.log_config();

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        return Err(e.into());
    }

    raise_fd_limit();

    let cancel = CancellationToken::new();

    let store: Arc<TtlStore<PriceReading>> = TtlStore::start(
        StoreConfig::default()
            .with_capacity(config.store_capacity)
            .with_ttl(config.store_ttl)
            .with_compaction_interval(config.compaction_interval),
        &cancel,
    );
    let hub = Arc::new(Hub::new(HubConfig {
        shard_count: config.shard_count,
        delivery_timeout: config.delivery_timeout,
    }));
    let source = build_source(&config)?;
    let fetcher = Arc::new(PriceFetcher::new(store.clone(), source, hub.clone()));

    let hub_task = tokio::spawn(hub.clone().run(cancel.clone()));
    let fetcher_task = fetcher.start(cancel.clone(), config.poll_interval);
    start_stats_task(store.clone(), hub.clone(), cancel.clone());

    // Start API server
    let api_router = create_api_router(ApiState {
        store: store.clone(),
        hub: hub.clone(),
    })
    .layer(CorsLayer::permissive());

    let api_listener = TcpListener::bind(&config.api_bind_address).await?;
    info!("🌐 HTTP API server running at http://{}", config.api_bind_address);

    let api_cancel = cancel.clone();
    let api_task = tokio::spawn(async move {
        axum::serve(api_listener, api_router)
            .with_graceful_shutdown(async move { api_cancel.cancelled().await })
            .await
    });

    // Start WebSocket server
    let ws_listener = TcpListener::bind(&config.bind_address).await?;
    info!("🚀 WebSocket server running at ws://{}/ws", config.bind_address);

    let ws_task = tokio::spawn(run_listener(ws_listener, store.clone(), hub.clone(), cancel.clone()));

    shutdown_signal().await;
    info!("Shutdown signal received, stopping workers");
    cancel.cancel();
    store.stop();

    match api_task.await {
        Ok(Err(e)) => error!("API server stopped with error: {}", e),
        Err(e) => error!("API server task failed: {}", e),
        Ok(Ok(())) => {}
    }
    for (name, task) in [("WebSocket listener", ws_task), ("hub", hub_task), ("fetcher", fetcher_task)] {
        if let Err(e) = task.await {
            error!("{} task failed: {}", name, e);
        }
    }

    info!("Shutdown complete");
    Ok(())
}

fn build_source(config: &Config) -> Result<Arc<dyn PriceSource>, Box<dyn std::error::Error>> {
    let source: Arc<dyn PriceSource> = match config.source_kind()? {
        SourceKind::CoinDesk => Arc::new(CoinDeskSource::new(
            config.api_base_url.clone(),
            config.api_token.clone(),
            config.poll_interval,
        )?),
        SourceKind::Simulated => {
            warn!("Using simulated prices (PRICE_SOURCE=simulated)");
            Arc::new(SimulatedSource::default())
        }
    };
    Ok(source)
}

fn start_stats_task(store: Arc<TtlStore<PriceReading>>, hub: Arc<Hub>, cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut interval_timer = interval(Duration::from_secs(STATS_INTERVAL_SECS));

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval_timer.tick() => {
                    let subscribers = hub.len().await;
                    info!("Stats - Subscribers: {}, Stored prices: {}", subscribers, store.len());
                }
            }
        }
    });

    info!("📈 Started stats monitoring task (every {} seconds)", STATS_INTERVAL_SECS);
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

// Lift the soft open-file limit to the hard limit so many sockets can stay open
#[cfg(unix)]
fn raise_fd_limit() {
    match rlimit::increase_nofile_limit(u64::MAX) {
        Ok(limit) => info!("Open file limit raised to {}", limit),
        Err(e) => warn!("Failed to raise open file limit: {}", e),
    }
}

#[cfg(not(unix))]
fn raise_fd_limit() {}

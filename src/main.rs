//! ORPflow - Order Book Feed
//!
//! Connects to the public book channel, keeps a reconciled local order book
//! and serves its state over HTTP for health checks and metrics.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::interval;
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use orderbook_feed::publisher::notification_channel;
use orderbook_feed::{
    telemetry, AppState, Config, ConnectionManager, FeedClient, FeedSettings, ManagerHandle,
    ManagerSettings, OrderBookStore, Publisher, WsTransport,
};

/// Levels per side returned by `/book` and logged in status lines
const DISPLAY_DEPTH: usize = 10;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Starting ORPflow Order Book Feed");

    // Load configuration
    let config = Arc::new(Config::load()?);
    info!(
        symbol = %config.symbol,
        precision = %config.precision,
        endpoint = %config.ws_endpoint,
        "Configuration loaded"
    );

    let store = Arc::new(RwLock::new(OrderBookStore::new(config.precision)));
    let (notifications_tx, notifications_rx) = notification_channel();

    // Forward notifications over IPC when a consumer socket is configured
    match &config.ipc_socket_path {
        Some(path) => {
            let publisher = Publisher::new(path).await?;
            tokio::spawn(publisher.run(notifications_rx));
        }
        None => drop(notifications_rx),
    }

    let feed = FeedClient::new(WsTransport::new(), FeedSettings::from(config.as_ref()));
    let manager = ConnectionManager::new(
        feed,
        store.clone(),
        notifications_tx,
        ManagerSettings::from(config.as_ref()),
    );
    let (handle, commands) = ManagerHandle::channel(16);
    let manager_task = tokio::spawn(manager.run(commands));

    let state = Arc::new(AppState {
        store: store.clone(),
        config: config.clone(),
    });

    // Start health check server
    let health_state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = start_health_server(health_state).await {
            warn!(error = %e, "Health server error");
        }
    });

    tokio::spawn(log_status(store.clone(), config.status_log_interval()));

    handle.start(Some(config.precision)).await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    handle.disconnect().await?;

    // Dropping the last handle stops the manager loop
    drop(handle);
    manager_task.await?;

    Ok(())
}

/// Periodically log top of book
async fn log_status(store: Arc<RwLock<OrderBookStore>>, every: Duration) {
    let mut ticker = interval(every);
    loop {
        ticker.tick().await;
        let store = store.read().await;
        let metrics = store.book().metrics();
        info!(
            precision = %store.precision(),
            connected = store.status().connected,
            reconnecting = store.status().reconnecting,
            best_bid = ?metrics.best_bid,
            best_ask = ?metrics.best_ask,
            spread_bps = ?metrics.spread_bps,
            imbalance = ?metrics.imbalance,
            bid_levels = metrics.bid_levels,
            ask_levels = metrics.ask_levels,
            "Order book status"
        );
    }
}

/// Start HTTP server for health checks and metrics
async fn start_health_server(state: Arc<AppState>) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/book", get(book))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.health_port));
    info!(addr = %addr, "Starting health check server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let store = state.store.read().await;
    let status = store.status();
    let book_healthy = store.book().metrics().is_healthy();
    Json(serde_json::json!({
        "status": if status.connected && book_healthy { "healthy" } else { "degraded" },
        "component": "orderbook-feed",
        "symbol": state.config.symbol,
        "connected": status.connected,
        "reconnecting": status.reconnecting,
        "book_healthy": book_healthy,
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn book(State(state): State<Arc<AppState>>) -> Json<orderbook_feed::OrderBookState> {
    Json(state.store.read().await.state(DISPLAY_DEPTH))
}

async fn metrics() -> Result<String, StatusCode> {
    telemetry::render().map_err(|e| {
        warn!(error = %e, "Failed to render metrics");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

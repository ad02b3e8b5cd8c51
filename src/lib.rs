//! ORPflow - Order Book Feed Library
//!
//! Maintains a local order book from a streaming WebSocket feed: an initial
//! snapshot followed by incremental price-level updates, with transparent
//! reconnection after unclean disconnects.

use std::sync::Arc;
use tokio::sync::RwLock;

pub mod config;
pub mod error;
pub mod orderbook;
pub mod parser;
pub mod precision;
pub mod publisher;
pub mod telemetry;
pub mod websocket;

pub use config::Config;
pub use error::{FeedError, Result};
pub use orderbook::{
    ConnectionStatus, OrderBook, OrderBookMetrics, OrderBookState, OrderBookStore, PriceLevel,
    Side, StatusUpdate,
};
pub use parser::{FeedEvent, LevelUpdate, SubscribeRequest};
pub use precision::{BookDepth, Frequency, Precision, PrecisionChange};
pub use publisher::{BookNotification, Publisher};
pub use websocket::{
    ConnectionManager, ConnectionState, FeedClient, FeedSettings, ManagerHandle, ManagerSettings,
    Transport, TransportEvent, WsTransport,
};

/// Application state shared across components
pub struct AppState {
    pub store: Arc<RwLock<OrderBookStore>>,
    pub config: Arc<Config>,
}

//! Order book module
//!
//! Reconciles snapshot and incremental price-level events into a local book.

mod book;
mod metrics;
mod store;

pub use book::OrderBook;
pub use metrics::OrderBookMetrics;
pub use store::OrderBookStore;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Side of the order book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Bid,
    Ask,
}

impl Side {
    pub fn opposite(&self) -> Side {
        match self {
            Side::Bid => Side::Ask,
            Side::Ask => Side::Bid,
        }
    }
}

/// Aggregated resting liquidity at one price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    /// Number of orders at this price
    pub count: u64,
    /// Absolute aggregated size
    pub amount: Decimal,
}

/// Connection state exposed to readers of the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub reconnecting: bool,
}

/// Partial status update; `None` fields keep their current value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub connected: Option<bool>,
    pub reconnecting: Option<bool>,
}

impl StatusUpdate {
    pub fn connected(connected: bool) -> Self {
        Self {
            connected: Some(connected),
            reconnecting: None,
        }
    }

    pub fn reconnecting(reconnecting: bool) -> Self {
        Self {
            connected: None,
            reconnecting: Some(reconnecting),
        }
    }

    pub fn both(connected: bool, reconnecting: bool) -> Self {
        Self {
            connected: Some(connected),
            reconnecting: Some(reconnecting),
        }
    }
}

impl ConnectionStatus {
    /// Merge a partial update into this status
    pub fn merge(&mut self, update: StatusUpdate) {
        if let Some(connected) = update.connected {
            self.connected = connected;
        }
        if let Some(reconnecting) = update.reconnecting {
            self.reconnecting = reconnecting;
        }
    }
}

/// Book snapshot for publishing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBookState {
    pub precision: crate::precision::Precision,
    pub status: ConnectionStatus,
    /// Best first (highest price)
    pub bids: Vec<PriceLevel>,
    /// Best first (lowest price)
    pub asks: Vec<PriceLevel>,
    pub metrics: OrderBookMetrics,
}

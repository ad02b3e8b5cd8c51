//! Order book store
//!
//! Holds the reconciled book together with the precision of record and the
//! connection status. Only the connection manager writes to it.

use super::{ConnectionStatus, OrderBook, OrderBookState, PriceLevel, StatusUpdate};
use crate::parser::LevelUpdate;
use crate::precision::Precision;

#[derive(Debug, Clone, Default)]
pub struct OrderBookStore {
    book: OrderBook,
    precision: Precision,
    status: ConnectionStatus,
}

impl OrderBookStore {
    pub fn new(precision: Precision) -> Self {
        Self {
            book: OrderBook::new(),
            precision,
            status: ConnectionStatus::default(),
        }
    }

    /// Replace the whole book with a snapshot
    pub fn replace(&mut self, levels: &[LevelUpdate]) {
        self.book.replace(levels);
    }

    /// Apply an incremental update, returning true if the book changed
    pub fn apply(&mut self, update: &LevelUpdate) -> bool {
        self.book.apply(update)
    }

    pub fn set_precision(&mut self, precision: Precision) {
        self.precision = precision;
    }

    /// Merge a partial status update
    pub fn update_status(&mut self, update: StatusUpdate) -> ConnectionStatus {
        self.status.merge(update);
        self.status
    }

    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    /// Current bids, highest first
    pub fn bids(&self) -> Vec<PriceLevel> {
        self.book.bids().copied().collect()
    }

    /// Current asks, lowest first
    pub fn asks(&self) -> Vec<PriceLevel> {
        self.book.asks().copied().collect()
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Top `depth` levels per side with derived metrics
    pub fn state(&self, depth: usize) -> OrderBookState {
        OrderBookState {
            precision: self.precision,
            status: self.status,
            bids: self.book.bids_desc(depth),
            asks: self.book.asks_asc(depth),
            metrics: self.book.metrics(),
        }
    }
}

//! Core order book implementation
//!
//! Uses BTreeMap for sorted price level management. Bids are keyed by
//! `Reverse(price)` so both sides iterate best price first.

use rust_decimal::Decimal;
use std::cmp::Reverse;
use std::collections::BTreeMap;

use super::{OrderBookMetrics, PriceLevel, Side};
use crate::parser::LevelUpdate;

/// Levels used for the top-of-book imbalance metric
const IMBALANCE_LEVELS: usize = 5;

/// Local order book for one subscription
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderBook {
    /// Bids sorted by price descending (highest first)
    bids: BTreeMap<Reverse<Decimal>, PriceLevel>,
    /// Asks sorted by price ascending (lowest first)
    asks: BTreeMap<Decimal, PriceLevel>,
}

/// Side selected by the sign of a signed amount
fn side_of(amount: Decimal) -> Option<Side> {
    if amount > Decimal::ZERO {
        Some(Side::Bid)
    } else if amount < Decimal::ZERO {
        Some(Side::Ask)
    } else {
        None
    }
}

impl OrderBook {
    /// Create a new empty order book
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild both sides from a full snapshot.
    ///
    /// Nothing from the previous book survives unless it is listed again.
    pub fn replace(&mut self, levels: &[LevelUpdate]) {
        let mut next = OrderBook::new();
        for level in levels {
            if level.count > 0 {
                next.upsert(level);
            }
        }
        *self = next;
    }

    /// Apply one incremental update in place.
    ///
    /// Returns true if the book changed.
    pub fn apply(&mut self, update: &LevelUpdate) -> bool {
        if update.count > 0 {
            return self.upsert(update);
        }

        if update.count == 0 {
            // Deletions carry the side in the sign of a unit amount
            if update.amount == Decimal::ONE {
                return self.remove(Side::Bid, update.price);
            }
            if update.amount == Decimal::NEGATIVE_ONE {
                return self.remove(Side::Ask, update.price);
            }
        }

        false
    }

    fn upsert(&mut self, update: &LevelUpdate) -> bool {
        let Some(side) = side_of(update.amount) else {
            return false;
        };

        let level = PriceLevel {
            price: update.price,
            count: update.count.unsigned_abs(),
            amount: update.amount.abs(),
        };

        // A price rests on one side only
        self.remove(side.opposite(), update.price);

        match side {
            Side::Bid => self.bids.insert(Reverse(update.price), level),
            Side::Ask => self.asks.insert(update.price, level),
        };
        true
    }

    fn remove(&mut self, side: Side, price: Decimal) -> bool {
        match side {
            Side::Bid => self.bids.remove(&Reverse(price)).is_some(),
            Side::Ask => self.asks.remove(&price).is_some(),
        }
    }

    /// Bid level at `price`
    pub fn bid(&self, price: Decimal) -> Option<&PriceLevel> {
        self.bids.get(&Reverse(price))
    }

    /// Ask level at `price`
    pub fn ask(&self, price: Decimal) -> Option<&PriceLevel> {
        self.asks.get(&price)
    }

    /// Bids, highest price first
    pub fn bids(&self) -> impl Iterator<Item = &PriceLevel> {
        self.bids.values()
    }

    /// Asks, lowest price first
    pub fn asks(&self) -> impl Iterator<Item = &PriceLevel> {
        self.asks.values()
    }

    /// Top `n` bids, highest price first
    pub fn bids_desc(&self, n: usize) -> Vec<PriceLevel> {
        self.bids.values().take(n).copied().collect()
    }

    /// Top `n` asks, lowest price first
    pub fn asks_asc(&self, n: usize) -> Vec<PriceLevel> {
        self.asks.values().take(n).copied().collect()
    }

    pub fn bid_levels(&self) -> usize {
        self.bids.len()
    }

    pub fn ask_levels(&self) -> usize {
        self.asks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Get best bid price
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first_key_value().map(|(Reverse(p), _)| *p)
    }

    /// Get best ask price
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first_key_value().map(|(p, _)| *p)
    }

    /// Get mid price
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::from(2)),
            _ => None,
        }
    }

    /// Absolute spread between best ask and best bid
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    /// Get spread in basis points
    pub fn spread_bps(&self) -> Option<Decimal> {
        match (self.spread(), self.mid_price()) {
            (Some(spread), Some(mid)) if mid > Decimal::ZERO => {
                Some(spread / mid * Decimal::from(10000))
            }
            _ => None,
        }
    }

    /// Calculate order book imbalance at top N levels
    pub fn imbalance(&self, levels: usize) -> Option<Decimal> {
        let bid_volume: Decimal = self.bids.values().take(levels).map(|l| l.amount).sum();
        let ask_volume: Decimal = self.asks.values().take(levels).map(|l| l.amount).sum();

        let total = bid_volume + ask_volume;
        if total > Decimal::ZERO {
            Some((bid_volume - ask_volume) / total)
        } else {
            None
        }
    }

    /// Calculate order book metrics
    pub fn metrics(&self) -> OrderBookMetrics {
        OrderBookMetrics {
            best_bid: self.best_bid(),
            best_ask: self.best_ask(),
            mid_price: self.mid_price(),
            spread: self.spread(),
            spread_bps: self.spread_bps(),
            imbalance: self.imbalance(IMBALANCE_LEVELS),
            bid_depth: self.bids.values().map(|l| l.amount).sum(),
            ask_depth: self.asks.values().map(|l| l.amount).sum(),
            bid_levels: self.bids.len(),
            ask_levels: self.asks.len(),
        }
    }
}

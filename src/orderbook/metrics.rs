//! Order book metrics calculation

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Computed metrics for an order book
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderBookMetrics {
    /// Highest bid price
    pub best_bid: Option<Decimal>,

    /// Lowest ask price
    pub best_ask: Option<Decimal>,

    /// Mid price (average of best bid and ask)
    pub mid_price: Option<Decimal>,

    /// Best ask minus best bid
    pub spread: Option<Decimal>,

    /// Spread in basis points
    pub spread_bps: Option<Decimal>,

    /// Simple imbalance: (bid_vol - ask_vol) / (bid_vol + ask_vol)
    pub imbalance: Option<Decimal>,

    /// Total bid depth (volume)
    pub bid_depth: Decimal,

    /// Total ask depth (volume)
    pub ask_depth: Decimal,

    /// Number of bid levels
    pub bid_levels: usize,

    /// Number of ask levels
    pub ask_levels: usize,
}

impl OrderBookMetrics {
    /// Check if the order book is healthy (has valid data)
    pub fn is_healthy(&self) -> bool {
        self.mid_price.is_some()
            && self.spread.map_or(false, |s| s > Decimal::ZERO)
            && self.bid_levels > 0
            && self.ask_levels > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_empty_book_is_unhealthy() {
        let metrics = OrderBookMetrics::default();
        assert!(!metrics.is_healthy());
    }

    #[test]
    fn test_crossed_book_is_unhealthy() {
        let metrics = OrderBookMetrics {
            best_bid: Some(dec!(101)),
            best_ask: Some(dec!(100)),
            mid_price: Some(dec!(100.5)),
            spread: Some(dec!(-1)),
            bid_levels: 1,
            ask_levels: 1,
            bid_depth: dec!(2),
            ask_depth: dec!(4),
            ..Default::default()
        };
        assert!(!metrics.is_healthy());
    }
}

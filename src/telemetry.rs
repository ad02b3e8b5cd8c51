//! Prometheus counters for feed traffic and connection churn

use prometheus::{
    register_int_counter, register_int_counter_vec, Encoder, IntCounter, IntCounterVec,
    TextEncoder,
};
use std::sync::LazyLock;

use crate::error::{FeedError, Result};

static FRAMES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "orderbook_feed_frames_total",
        "Inbound frames by classification",
        &["kind"]
    )
    .expect("frames counter registered once")
});

static RECONNECTS: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "orderbook_feed_reconnects_total",
        "Reconnection attempts after unclean closes"
    )
    .expect("reconnects counter registered once")
});

static PARSE_ERRORS: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "orderbook_feed_parse_errors_total",
        "Inbound frames dropped as malformed"
    )
    .expect("parse error counter registered once")
});

static EXCHANGE_ERRORS: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "orderbook_feed_exchange_errors_total",
        "Error events reported by the exchange"
    )
    .expect("exchange error counter registered once")
});

pub fn record_frame(kind: &str) {
    FRAMES.with_label_values(&[kind]).inc();
}

pub fn record_reconnect() {
    RECONNECTS.inc();
}

pub fn record_parse_error() {
    PARSE_ERRORS.inc();
}

pub fn record_exchange_error() {
    EXCHANGE_ERRORS.inc();
}

/// Render the default registry in the Prometheus text format
pub fn render() -> Result<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&prometheus::gather(), &mut buffer)
        .map_err(|e| FeedError::SerializationError(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| FeedError::SerializationError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_show_up_in_render() {
        record_frame("heartbeat");
        record_reconnect();

        let text = render().unwrap();
        assert!(text.contains("orderbook_feed_frames_total"));
        assert!(text.contains("orderbook_feed_reconnects_total"));
    }
}

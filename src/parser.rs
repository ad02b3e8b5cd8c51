//! Parser module for book channel WebSocket messages
//!
//! Handles the subscribe request, exchange event objects and the
//! `[channelId, payload]` data frames carrying price-level triples.

use rust_decimal::Decimal;
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::str::FromStr;

use crate::error::{FeedError, Result};
use crate::precision::{BookDepth, Frequency, Precision};

/// Payload sent in place of data to keep an idle channel alive
pub const HEARTBEAT: &str = "hb";

/// Book channel subscribe request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscribeRequest {
    pub event: &'static str,
    pub channel: &'static str,
    pub symbol: String,
    pub prec: Precision,
    pub freq: Frequency,
    pub len: String,
}

impl SubscribeRequest {
    pub fn book(symbol: &str, prec: Precision, freq: Frequency, depth: BookDepth) -> Self {
        Self {
            event: "subscribe",
            channel: "book",
            symbol: symbol.to_string(),
            prec,
            freq,
            len: depth.to_string(),
        }
    }
}

/// A single `[price, count, amount]` entry.
///
/// The sign of `amount` selects the side: positive for bids, negative for
/// asks. A `count` of zero removes the level, with `amount` of `1` or `-1`
/// naming the side to remove it from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LevelUpdate {
    pub price: Decimal,
    pub count: i64,
    pub amount: Decimal,
}

impl LevelUpdate {
    pub fn new(price: Decimal, count: i64, amount: Decimal) -> Self {
        Self {
            price,
            count,
            amount,
        }
    }
}

impl<'de> Deserialize<'de> for LevelUpdate {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let (price, count, amount): (serde_json::Number, i64, serde_json::Number) =
            Deserialize::deserialize(deserializer)?;
        Ok(LevelUpdate {
            price: number_to_decimal(&price).map_err(de::Error::custom)?,
            count,
            amount: number_to_decimal(&amount).map_err(de::Error::custom)?,
        })
    }
}

/// Typed event decoded from an inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// `{"event": "error", ...}` reported by the exchange
    ExchangeError { code: i64, msg: String },
    /// Any other `event` object (`info`, `subscribed`, ...)
    Control { event: String },
    /// Keep-alive with no data
    Heartbeat,
    /// Full listing of the book, first data frame of a subscription
    Snapshot(Vec<LevelUpdate>),
    /// Single level delta
    Incremental(LevelUpdate),
}

/// Event object frame
#[derive(Debug, Clone, Deserialize)]
struct EventFrame {
    event: String,
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    msg: Option<String>,
}

/// Inbound frame before the data payload is interpreted
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    ExchangeError { code: i64, msg: String },
    Control { event: String },
    Heartbeat,
    Data(Value),
}

impl Frame {
    /// Parse a raw WebSocket text message
    pub fn parse(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)?;

        match value {
            Value::Object(_) => {
                let event: EventFrame = serde_json::from_value(value)?;
                if event.event == "error" {
                    Ok(Frame::ExchangeError {
                        code: event.code.unwrap_or_default(),
                        msg: event.msg.unwrap_or_default(),
                    })
                } else {
                    Ok(Frame::Control { event: event.event })
                }
            }
            Value::Array(mut items) if items.len() >= 2 => {
                let payload = items.swap_remove(1);
                if payload.as_str() == Some(HEARTBEAT) {
                    Ok(Frame::Heartbeat)
                } else {
                    Ok(Frame::Data(payload))
                }
            }
            other => Err(FeedError::ParseError(format!(
                "Unexpected frame shape: {}",
                other
            ))),
        }
    }
}

/// Decode a snapshot payload (sequence of triples)
pub fn decode_snapshot(payload: &Value) -> Result<Vec<LevelUpdate>> {
    Ok(Vec::<LevelUpdate>::deserialize(payload)?)
}

/// Decode an incremental payload (single triple)
pub fn decode_incremental(payload: &Value) -> Result<LevelUpdate> {
    Ok(LevelUpdate::deserialize(payload)?)
}

/// Convert a JSON number to Decimal without going through f64 rounding
fn number_to_decimal(number: &serde_json::Number) -> std::result::Result<Decimal, String> {
    let text = number.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|e| format!("Invalid number {}: {}", text, e))
}

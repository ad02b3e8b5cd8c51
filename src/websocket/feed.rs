//! Book channel client
//!
//! Builds the subscribe request and turns raw frames into [`FeedEvent`]s.

use tokio::sync::mpsc;
use tracing::{debug, info};

use super::transport::{Transport, TransportEvent};
use crate::config::Config;
use crate::error::{FeedError, Result};
use crate::parser::{decode_incremental, decode_snapshot, FeedEvent, Frame, SubscribeRequest};
use crate::precision::{BookDepth, Frequency, Precision};

/// Fixed subscription parameters
#[derive(Debug, Clone, PartialEq)]
pub struct FeedSettings {
    pub endpoint: String,
    pub symbol: String,
    pub frequency: Frequency,
    pub depth: BookDepth,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for FeedSettings {
    fn from(config: &Config) -> Self {
        Self {
            endpoint: config.ws_endpoint.clone(),
            symbol: config.symbol.clone(),
            frequency: config.frequency,
            depth: config.depth,
        }
    }
}

/// The active subscription of one connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription {
    pub precision: Precision,
    /// The next data frame is a full snapshot
    awaiting_snapshot: bool,
}

impl Subscription {
    fn new(precision: Precision) -> Self {
        Self {
            precision,
            awaiting_snapshot: true,
        }
    }

    pub fn awaiting_snapshot(&self) -> bool {
        self.awaiting_snapshot
    }
}

/// Protocol-aware client on top of a [`Transport`]
#[derive(Debug)]
pub struct FeedClient<T> {
    transport: T,
    settings: FeedSettings,
    subscription: Option<Subscription>,
}

impl<T: Transport> FeedClient<T> {
    pub fn new(transport: T, settings: FeedSettings) -> Self {
        Self {
            transport,
            settings,
            subscription: None,
        }
    }

    /// Open the transport to the feed endpoint
    pub fn connect(&mut self) {
        self.transport.connect(&self.settings.endpoint);
    }

    /// Close the transport and forget the subscription
    pub fn disconnect(&mut self) {
        self.subscription = None;
        self.transport.disconnect();
    }

    pub fn listen(&mut self) -> mpsc::UnboundedReceiver<TransportEvent> {
        self.transport.listen()
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    pub fn subscription(&self) -> Option<&Subscription> {
        self.subscription.as_ref()
    }

    /// Drop the subscription after its connection closed
    pub fn end_subscription(&mut self) {
        self.subscription = None;
    }

    /// Subscribe to the book channel at `precision`.
    ///
    /// Starts a fresh subscription, so the next data frame is read as a
    /// snapshot.
    pub fn subscribe(&mut self, precision: impl AsRef<str>) -> Result<Precision> {
        let precision: Precision = precision.as_ref().parse()?;

        let request = SubscribeRequest::book(
            &self.settings.symbol,
            precision,
            self.settings.frequency,
            self.settings.depth,
        );
        let payload = serde_json::to_value(&request)
            .map_err(|e| FeedError::SerializationError(e.to_string()))?;

        self.transport.send(&payload)?;
        self.subscription = Some(Subscription::new(precision));

        info!(
            symbol = %self.settings.symbol,
            precision = %precision,
            freq = %self.settings.frequency,
            len = %self.settings.depth,
            "Subscribed to book channel"
        );
        Ok(precision)
    }

    /// Classify one inbound frame.
    ///
    /// Error and control objects, heartbeats, then data: the first data frame
    /// of a subscription is the snapshot, every later one an incremental.
    pub fn classify(&mut self, raw: &str) -> Result<FeedEvent> {
        match Frame::parse(raw)? {
            Frame::ExchangeError { code, msg } => Ok(FeedEvent::ExchangeError { code, msg }),
            Frame::Control { event } => Ok(FeedEvent::Control { event }),
            Frame::Heartbeat => Ok(FeedEvent::Heartbeat),
            Frame::Data(payload) => {
                let subscription = self
                    .subscription
                    .as_mut()
                    .ok_or(FeedError::UnsolicitedFrame)?;

                if subscription.awaiting_snapshot {
                    let levels = decode_snapshot(&payload)?;
                    subscription.awaiting_snapshot = false;
                    debug!(levels = levels.len(), "Snapshot received");
                    Ok(FeedEvent::Snapshot(levels))
                } else {
                    Ok(FeedEvent::Incremental(decode_incremental(&payload)?))
                }
            }
        }
    }
}

//! WebSocket connection manager
//!
//! Owns the connection lifecycle: connect, subscribe on open, route data
//! frames into the order book store and reconnect after unclean closes.

use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::time::{sleep, Sleep};
use tracing::{debug, error, info, trace, warn};

use super::feed::FeedClient;
use super::transport::{Transport, TransportEvent};
use crate::config::Config;
use crate::error::{FeedError, Result};
use crate::orderbook::{OrderBookStore, StatusUpdate};
use crate::parser::FeedEvent;
use crate::precision::{Precision, PrecisionChange};
use crate::publisher::{BookNotification, NotificationSender};
use crate::telemetry;

/// Lifecycle state of the managed connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    AwaitingSnapshot,
    Streaming,
    ReconnectPending,
}

impl ConnectionState {
    fn is_live(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting
                | ConnectionState::AwaitingSnapshot
                | ConnectionState::Streaming
        )
    }
}

/// Manager tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerSettings {
    /// Precision used when `start` is called without one
    pub precision: Precision,
    pub reconnect_delay: Duration,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for ManagerSettings {
    fn from(config: &Config) -> Self {
        Self {
            precision: config.precision,
            reconnect_delay: config.reconnect_delay(),
        }
    }
}

/// Requests accepted by a running manager
#[derive(Debug)]
pub enum Command {
    Start(Option<Precision>),
    Disconnect,
    ChangePrecision {
        change: PrecisionChange,
        reply: oneshot::Sender<Precision>,
    },
}

/// Cloneable handle for driving a running [`ConnectionManager`]
#[derive(Debug, Clone)]
pub struct ManagerHandle {
    commands: mpsc::Sender<Command>,
}

impl ManagerHandle {
    /// Create a handle and the command receiver to pass to [`ConnectionManager::run`]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Command>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { commands: tx }, rx)
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| FeedError::NotReady("Connection manager has stopped".to_string()))
    }

    pub async fn start(&self, precision: Option<Precision>) -> Result<()> {
        self.send(Command::Start(precision)).await
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.send(Command::Disconnect).await
    }

    /// Reconnect at a new precision, returning the level subscribed to
    pub async fn change_precision(&self, change: PrecisionChange) -> Result<Precision> {
        let (reply, response) = oneshot::channel();
        self.send(Command::ChangePrecision { change, reply }).await?;
        response
            .await
            .map_err(|_| FeedError::NotReady("Connection manager has stopped".to_string()))
    }
}

/// Drives one feed session and the store it writes to
pub struct ConnectionManager<T> {
    feed: FeedClient<T>,
    store: Arc<RwLock<OrderBookStore>>,
    notifications: NotificationSender,
    settings: ManagerSettings,
    state: ConnectionState,
    /// Precision to subscribe with on the next (re)connect
    requested: Precision,
    /// Listener for the current connection attempt
    events: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    /// Pending reconnect; dropping it cancels the reconnect
    reconnect: Option<Pin<Box<Sleep>>>,
}

impl<T: Transport> ConnectionManager<T> {
    pub fn new(
        feed: FeedClient<T>,
        store: Arc<RwLock<OrderBookStore>>,
        notifications: NotificationSender,
        settings: ManagerSettings,
    ) -> Self {
        Self {
            feed,
            store,
            notifications,
            settings,
            state: ConnectionState::Disconnected,
            requested: settings.precision,
            events: None,
            reconnect: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn requested_precision(&self) -> Precision {
        self.requested
    }

    pub fn is_reconnect_scheduled(&self) -> bool {
        self.reconnect.is_some()
    }

    /// Process commands, transport events and the reconnect timer until
    /// every handle is dropped
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        info!("Starting connection manager");

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        self.disconnect().await;
                        break;
                    }
                },
                event = next_event(&mut self.events) => match event {
                    Some(event) => self.handle_transport_event(event).await,
                    None => self.events = None,
                },
                _ = reconnect_due(&mut self.reconnect) => self.on_reconnect_due().await,
            }
        }

        info!("Connection manager stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start(precision) => self.start(precision).await,
            Command::Disconnect => self.disconnect().await,
            Command::ChangePrecision { change, reply } => {
                let precision = self.change_precision(change).await;
                let _ = reply.send(precision);
            }
        }
    }

    /// Open the feed, subscribing at `precision` (or the last requested one)
    pub async fn start(&mut self, precision: Option<Precision>) {
        if self.state != ConnectionState::Disconnected {
            warn!(state = ?self.state, "Session already active, ignoring start");
            return;
        }

        if let Some(precision) = precision {
            self.requested = precision;
        }

        info!(precision = %self.requested, "Starting feed session");
        self.begin_connect();
    }

    /// Tear down the session and cancel any pending reconnect
    pub async fn disconnect(&mut self) {
        self.reconnect = None;
        self.events = None;
        self.feed.disconnect();

        let previous = std::mem::replace(&mut self.state, ConnectionState::Disconnected);
        if previous != ConnectionState::Disconnected {
            info!(state = ?previous, "Disconnected");
            self.publish_status(StatusUpdate::both(false, false)).await;
        }
    }

    /// Resubscribe on a fresh connection at a new precision.
    ///
    /// Steps past either end clamp to the nearest level and still reconnect.
    pub async fn change_precision(&mut self, change: PrecisionChange) -> Precision {
        let next = change.resolve(self.requested);

        info!(from = %self.requested, to = %next, "Changing precision");
        self.disconnect().await;
        self.start(Some(next)).await;
        next
    }

    pub async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Open => self.on_open().await,
            TransportEvent::Message(text) => self.on_message(&text).await,
            TransportEvent::Error(e) => warn!(error = %e, "Transport error"),
            TransportEvent::Close { clean } => self.on_close(clean).await,
        }
    }

    /// Replace the listener and open a new connection
    fn begin_connect(&mut self) {
        self.feed.disconnect();
        self.events = Some(self.feed.listen());
        self.state = ConnectionState::Connecting;
        self.feed.connect();
    }

    async fn on_open(&mut self) {
        if self.state != ConnectionState::Connecting {
            debug!(state = ?self.state, "Ignoring open event");
            return;
        }

        let precision = match self.feed.subscribe(self.requested) {
            Ok(precision) => precision,
            Err(e) => {
                // A close event follows if the socket went away
                error!(error = %e, "Failed to subscribe");
                return;
            }
        };

        self.state = ConnectionState::AwaitingSnapshot;
        self.store.write().await.set_precision(precision);
        self.notify(BookNotification::PrecisionChanged(precision));
        self.publish_status(StatusUpdate::both(true, false)).await;
    }

    async fn on_message(&mut self, text: &str) {
        let event = match self.feed.classify(text) {
            Ok(event) => event,
            Err(e) => {
                telemetry::record_parse_error();
                warn!(error = %e, "Dropping malformed frame");
                return;
            }
        };

        match event {
            FeedEvent::ExchangeError { code, msg } => {
                telemetry::record_frame("error");
                telemetry::record_exchange_error();
                error!(code, msg = %msg, "Exchange error");
            }
            FeedEvent::Control { event } => {
                telemetry::record_frame("control");
                debug!(event = %event, "Control message");
            }
            FeedEvent::Heartbeat => {
                telemetry::record_frame("heartbeat");
                trace!("Heartbeat");
            }
            FeedEvent::Snapshot(levels) => {
                telemetry::record_frame("snapshot");
                self.store.write().await.replace(&levels);
                self.state = ConnectionState::Streaming;
                info!(levels = levels.len(), "Order book snapshot applied");
                self.notify(BookNotification::BookReplaced(levels));
            }
            FeedEvent::Incremental(update) => {
                telemetry::record_frame("incremental");
                self.store.write().await.apply(&update);
                trace!(price = %update.price, count = update.count, amount = %update.amount, "Level update");
                self.notify(BookNotification::BookLevelUpdated(update));
            }
        }
    }

    async fn on_close(&mut self, clean: bool) {
        if !self.state.is_live() {
            debug!(state = ?self.state, clean, "Ignoring close event");
            return;
        }

        self.events = None;
        self.feed.end_subscription();
        self.publish_status(StatusUpdate::connected(false)).await;

        let reason = FeedError::transport_closed(clean);
        if reason.triggers_reconnect() {
            warn!(
                reason = %reason,
                delay_ms = self.settings.reconnect_delay.as_millis() as u64,
                precision = %self.requested,
                "Connection lost, scheduling reconnect"
            );
            self.state = ConnectionState::ReconnectPending;
            self.reconnect = Some(Box::pin(sleep(self.settings.reconnect_delay)));
        } else {
            // WsTransport detaches listeners before its clean close is emitted,
            // so only transports that report a locally requested close land here
            info!(reason = %reason, "Connection closed cleanly");
            self.state = ConnectionState::Disconnected;
        }
    }

    async fn on_reconnect_due(&mut self) {
        self.reconnect = None;
        if self.state != ConnectionState::ReconnectPending {
            return;
        }

        telemetry::record_reconnect();
        info!(precision = %self.requested, "Reconnecting");
        self.begin_connect();
        self.publish_status(StatusUpdate::reconnecting(true)).await;
    }

    async fn publish_status(&self, update: StatusUpdate) {
        let status = self.store.write().await.update_status(update);
        self.notify(BookNotification::StatusChanged(status));
    }

    fn notify(&self, notification: BookNotification) {
        if self.notifications.send(notification).is_err() {
            trace!("No notification receiver");
        }
    }
}

async fn next_event(
    events: &mut Option<mpsc::UnboundedReceiver<TransportEvent>>,
) -> Option<TransportEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => pending().await,
    }
}

async fn reconnect_due(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(timer) => timer.as_mut().await,
        None => pending().await,
    }
}

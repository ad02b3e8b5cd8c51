//! Message transport over a single WebSocket connection
//!
//! Open, send, close and event delivery. No message interpretation and no
//! reconnection; that policy lives in the connection manager.

use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, warn};

use crate::error::{FeedError, Result};

/// Connection lifecycle events delivered to listeners
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Open,
    Message(String),
    Error(String),
    /// `clean` is true only when the close was requested locally
    Close { clean: bool },
}

/// Ready state of the underlying connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadyState {
    Connecting = 0,
    Open = 1,
    Closed = 2,
}

impl ReadyState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ReadyState::Connecting,
            1 => ReadyState::Open,
            _ => ReadyState::Closed,
        }
    }
}

/// Bidirectional message-oriented connection
#[cfg_attr(test, mockall::automock)]
pub trait Transport: Send {
    /// Open a connection; a no-op while one is connecting or open
    fn connect(&mut self, endpoint: &str);

    /// Close the active connection and detach all listeners
    fn disconnect(&mut self);

    /// Serialize and write a payload; fails with `NotReady` unless open
    fn send(&mut self, payload: &serde_json::Value) -> Result<()>;

    fn ready_state(&self) -> ReadyState;

    /// Register a listener receiving every subsequent event
    fn listen(&mut self) -> mpsc::UnboundedReceiver<TransportEvent>;

    fn is_open(&self) -> bool {
        self.ready_state() == ReadyState::Open
    }
}

/// State shared with the connection task
#[derive(Debug)]
struct Shared {
    /// Identifies the current connection; bumped on every connect/disconnect
    epoch: AtomicU64,
    ready: AtomicU8,
    listeners: Mutex<Vec<mpsc::UnboundedSender<TransportEvent>>>,
}

impl Shared {
    fn listeners(&self) -> MutexGuard<'_, Vec<mpsc::UnboundedSender<TransportEvent>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver an event if it belongs to the current connection
    fn emit(&self, epoch: u64, event: TransportEvent) {
        let mut listeners = self.listeners();
        if self.epoch.load(Ordering::SeqCst) != epoch {
            return;
        }
        listeners.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn set_ready(&self, epoch: u64, state: ReadyState) {
        let _guard = self.listeners();
        if self.epoch.load(Ordering::SeqCst) == epoch {
            self.ready.store(state as u8, Ordering::SeqCst);
        }
    }
}

/// WebSocket transport backed by tokio-tungstenite
#[derive(Debug)]
pub struct WsTransport {
    shared: Arc<Shared>,
    outbound: Option<mpsc::UnboundedSender<Message>>,
}

impl Default for WsTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl WsTransport {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                epoch: AtomicU64::new(0),
                ready: AtomicU8::new(ReadyState::Closed as u8),
                listeners: Mutex::new(Vec::new()),
            }),
            outbound: None,
        }
    }
}

impl Transport for WsTransport {
    fn connect(&mut self, endpoint: &str) {
        if self.ready_state() != ReadyState::Closed {
            debug!(endpoint = %endpoint, "Transport already active, ignoring connect");
            return;
        }

        let epoch = {
            let _guard = self.shared.listeners();
            self.shared
                .ready
                .store(ReadyState::Connecting as u8, Ordering::SeqCst);
            self.shared.epoch.fetch_add(1, Ordering::SeqCst) + 1
        };

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        self.outbound = Some(outbound_tx);

        tokio::spawn(run_connection(
            endpoint.to_string(),
            epoch,
            self.shared.clone(),
            outbound_rx,
        ));
    }

    fn disconnect(&mut self) {
        {
            let mut listeners = self.shared.listeners();
            self.shared.epoch.fetch_add(1, Ordering::SeqCst);
            self.shared
                .ready
                .store(ReadyState::Closed as u8, Ordering::SeqCst);
            listeners.clear();
        }

        // Dropping the sender makes the connection task close the socket
        if self.outbound.take().is_some() {
            debug!("Transport disconnected");
        }
    }

    fn send(&mut self, payload: &serde_json::Value) -> Result<()> {
        let state = self.ready_state();
        if state != ReadyState::Open {
            return Err(FeedError::NotReady(format!(
                "WebSocket state {:?} can't send",
                state
            )));
        }

        let text = serde_json::to_string(payload)
            .map_err(|e| FeedError::SerializationError(e.to_string()))?;

        self.outbound
            .as_ref()
            .ok_or_else(|| FeedError::NotReady("No active connection".to_string()))?
            .send(Message::Text(text))
            .map_err(|_| FeedError::NotReady("Connection task has stopped".to_string()))
    }

    fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.shared.ready.load(Ordering::SeqCst))
    }

    fn listen(&mut self) -> mpsc::UnboundedReceiver<TransportEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.listeners().push(tx);
        rx
    }
}

/// Drive one connection until it closes
async fn run_connection(
    endpoint: String,
    epoch: u64,
    shared: Arc<Shared>,
    mut outbound: mpsc::UnboundedReceiver<Message>,
) {
    info!(url = %endpoint, "Connecting to WebSocket");

    let stream = match connect_async(endpoint.as_str()).await {
        Ok((stream, response)) => {
            info!(status = ?response.status(), "WebSocket connected");
            stream
        }
        Err(e) => {
            error!(error = %e, "Failed to connect");
            shared.emit(epoch, TransportEvent::Error(e.to_string()));
            shared.set_ready(epoch, ReadyState::Closed);
            shared.emit(epoch, TransportEvent::Close { clean: false });
            return;
        }
    };

    shared.set_ready(epoch, ReadyState::Open);
    shared.emit(epoch, TransportEvent::Open);

    let (mut write, mut read) = stream.split();

    let clean = loop {
        tokio::select! {
            message = outbound.recv() => match message {
                Some(message) => {
                    if let Err(e) = write.send(message).await {
                        error!(error = %e, "WebSocket send failed");
                        shared.emit(epoch, TransportEvent::Error(e.to_string()));
                        break false;
                    }
                }
                None => {
                    // Local close request
                    let _ = write.send(Message::Close(None)).await;
                    let _ = write.close().await;
                    break true;
                }
            },
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    debug!(len = text.len(), "Received text message");
                    shared.emit(epoch, TransportEvent::Message(text));
                }
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                    Ok(text) => shared.emit(epoch, TransportEvent::Message(text)),
                    Err(e) => {
                        warn!(error = %e, "Dropping binary frame that is not UTF-8");
                        shared.emit(epoch, TransportEvent::Error(e.to_string()));
                    }
                },
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    warn!(frame = ?frame, "Received close frame");
                    break false;
                }
                Some(Err(e)) => {
                    error!(error = %e, "WebSocket error");
                    shared.emit(epoch, TransportEvent::Error(e.to_string()));
                    break false;
                }
                None => {
                    warn!("WebSocket stream ended");
                    break false;
                }
            },
        }
    };

    shared.set_ready(epoch, ReadyState::Closed);
    shared.emit(epoch, TransportEvent::Close { clean });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::time::Duration;
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::oneshot;
    use tokio::task::JoinHandle;
    use tokio::time::timeout;
    use tokio_test::assert_err;
    use tokio_tungstenite::{accept_async, WebSocketStream};

    #[test]
    fn test_new_transport_is_closed() {
        let transport = WsTransport::new();
        assert_eq!(transport.ready_state(), ReadyState::Closed);
        assert!(!transport.is_open());
    }

    #[test]
    fn test_send_before_connect_is_not_ready() {
        let mut transport = WsTransport::new();
        let result = transport.send(&serde_json::json!({"event": "ping"}));
        assert!(matches!(assert_err!(result), FeedError::NotReady(_)));
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let mut transport = WsTransport::new();
        transport.disconnect();
        transport.disconnect();
        assert_eq!(transport.ready_state(), ReadyState::Closed);
    }

    #[test]
    fn test_multiple_listeners_receive_events() {
        let mut transport = WsTransport::new();
        let mut first = transport.listen();
        let mut second = transport.listen();

        let epoch = transport.shared.epoch.load(Ordering::SeqCst);
        transport.shared.emit(epoch, TransportEvent::Open);

        assert_eq!(first.try_recv().unwrap(), TransportEvent::Open);
        assert_eq!(second.try_recv().unwrap(), TransportEvent::Open);
    }

    #[test]
    fn test_disconnect_detaches_listeners() {
        let mut transport = WsTransport::new();
        let mut rx = transport.listen();
        let stale_epoch = transport.shared.epoch.load(Ordering::SeqCst);

        transport.disconnect();
        transport.shared.emit(stale_epoch, TransportEvent::Close { clean: false });

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_events_from_superseded_connection_are_dropped() {
        let mut transport = WsTransport::new();
        let mut rx = transport.listen();
        let stale_epoch = transport.shared.epoch.fetch_add(1, Ordering::SeqCst);

        transport
            .shared
            .emit(stale_epoch, TransportEvent::Message("[1,\"hb\"]".to_string()));
        assert!(rx.try_recv().is_err());
    }

    async fn serve_once<F, Fut>(handler: F) -> (String, JoinHandle<()>)
    where
        F: FnOnce(WebSocketStream<TcpStream>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = accept_async(stream).await.unwrap();
            handler(ws).await;
        });
        (format!("ws://{}", addr), task)
    }

    async fn next_event(
        rx: &mut mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Option<TransportEvent> {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("transport event within timeout")
    }

    async fn events_until_close(
        rx: &mut mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        while let Some(event) = next_event(rx).await {
            let done = matches!(event, TransportEvent::Close { .. });
            events.push(event);
            if done {
                break;
            }
        }
        events
    }

    #[tokio::test]
    async fn test_connect_failure_reports_unclean_close() {
        let mut transport = WsTransport::new();
        let mut rx = transport.listen();

        // Nothing listens on port 1
        transport.connect("ws://127.0.0.1:1");
        assert_eq!(transport.ready_state(), ReadyState::Connecting);

        // Second connect while connecting is a no-op
        transport.connect("ws://127.0.0.1:1");

        let events = events_until_close(&mut rx).await;

        assert!(matches!(events.first(), Some(TransportEvent::Error(_))));
        assert_eq!(events.last(), Some(&TransportEvent::Close { clean: false }));
        assert_eq!(events.len(), 2);
        assert_eq!(transport.ready_state(), ReadyState::Closed);
    }

    #[tokio::test]
    async fn test_text_frames_then_server_close_is_unclean() {
        let (url, server) = serve_once(|mut ws| async move {
            ws.send(Message::Text("[1,\"hb\"]".to_string())).await.unwrap();
            let _ = ws.close(None).await;
        })
        .await;

        let mut transport = WsTransport::new();
        let mut rx = transport.listen();
        transport.connect(&url);

        let events = events_until_close(&mut rx).await;

        assert_eq!(
            events,
            vec![
                TransportEvent::Open,
                TransportEvent::Message("[1,\"hb\"]".to_string()),
                TransportEvent::Close { clean: false },
            ]
        );
        assert_eq!(transport.ready_state(), ReadyState::Closed);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_send_waits_for_open_and_reconnect_while_open_is_noop() {
        let (received_tx, received_rx) = oneshot::channel();
        let (url, server) = serve_once(|mut ws| async move {
            while let Some(Ok(message)) = ws.next().await {
                if let Message::Text(text) = message {
                    let _ = received_tx.send(text);
                    break;
                }
            }
        })
        .await;

        let mut transport = WsTransport::new();
        let mut rx = transport.listen();
        transport.connect(&url);

        assert_eq!(transport.ready_state(), ReadyState::Connecting);
        let result = transport.send(&serde_json::json!({"event": "ping"}));
        assert!(matches!(assert_err!(result), FeedError::NotReady(_)));

        assert_eq!(next_event(&mut rx).await, Some(TransportEvent::Open));
        assert!(transport.is_open());

        let epoch = transport.shared.epoch.load(Ordering::SeqCst);
        transport.connect(&url);
        assert_eq!(transport.shared.epoch.load(Ordering::SeqCst), epoch);
        assert!(transport.is_open());

        transport
            .send(&serde_json::json!({"event": "subscribe"}))
            .unwrap();
        let text = timeout(Duration::from_secs(5), received_rx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(text, r#"{"event":"subscribe"}"#);

        transport.disconnect();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_local_disconnect_sends_close_frame_silently() {
        let (closed_tx, closed_rx) = oneshot::channel();
        let (url, server) = serve_once(|mut ws| async move {
            while let Some(Ok(message)) = ws.next().await {
                if let Message::Close(frame) = message {
                    let _ = closed_tx.send(frame);
                    break;
                }
            }
        })
        .await;

        let mut transport = WsTransport::new();
        let mut rx = transport.listen();
        transport.connect(&url);
        assert_eq!(next_event(&mut rx).await, Some(TransportEvent::Open));

        transport.disconnect();

        assert_eq!(transport.ready_state(), ReadyState::Closed);
        assert_eq!(next_event(&mut rx).await, None);

        let frame = timeout(Duration::from_secs(5), closed_rx)
            .await
            .unwrap()
            .unwrap();
        assert!(frame.is_none());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_non_utf8_binary_frame_is_reported_and_dropped() {
        let (url, server) = serve_once(|mut ws| async move {
            ws.send(Message::Binary(vec![0xff, 0xfe, 0xfd])).await.unwrap();
            ws.send(Message::Binary(b"[1,\"hb\"]".to_vec())).await.unwrap();
            let _ = ws.close(None).await;
        })
        .await;

        let mut transport = WsTransport::new();
        let mut rx = transport.listen();
        transport.connect(&url);

        let events = events_until_close(&mut rx).await;

        assert_eq!(events.len(), 4);
        assert_eq!(events[0], TransportEvent::Open);
        assert!(matches!(events[1], TransportEvent::Error(_)));
        assert_eq!(events[2], TransportEvent::Message("[1,\"hb\"]".to_string()));
        assert_eq!(events[3], TransportEvent::Close { clean: false });
        server.await.unwrap();
    }
}

//! Publisher module for IPC communication
//!
//! Forwards book notifications to other system components.

use serde::Serialize;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::error::{FeedError, Result};
use crate::orderbook::ConnectionStatus;
use crate::parser::LevelUpdate;
use crate::precision::Precision;

/// Change notifications emitted by the connection manager
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum BookNotification {
    PrecisionChanged(Precision),
    StatusChanged(ConnectionStatus),
    BookReplaced(Vec<LevelUpdate>),
    BookLevelUpdated(LevelUpdate),
}

pub type NotificationSender = mpsc::UnboundedSender<BookNotification>;
pub type NotificationReceiver = mpsc::UnboundedReceiver<BookNotification>;

/// Create a notification channel
pub fn notification_channel() -> (NotificationSender, NotificationReceiver) {
    mpsc::unbounded_channel()
}

/// Publisher for sending notifications via Unix socket
pub struct Publisher {
    socket_path: String,
    stream: Mutex<Option<UnixStream>>,
}

impl Publisher {
    /// Create a new publisher
    pub async fn new(socket_path: &str) -> Result<Self> {
        let publisher = Self {
            socket_path: socket_path.to_string(),
            stream: Mutex::new(None),
        };

        // Try initial connection (the consumer may not be up yet)
        if let Err(e) = publisher.connect().await {
            warn!(error = %e, "Initial IPC connection failed, will retry on publish");
        }

        Ok(publisher)
    }

    /// Connect to the Unix socket
    async fn connect(&self) -> Result<()> {
        let path = Path::new(&self.socket_path);

        if !path.exists() {
            return Err(FeedError::IpcError(format!(
                "Socket path does not exist: {}",
                self.socket_path
            )));
        }

        let stream = UnixStream::connect(path).await.map_err(|e| {
            FeedError::IpcError(format!("Failed to connect to {}: {}", self.socket_path, e))
        })?;

        let mut guard = self.stream.lock().await;
        *guard = Some(stream);

        info!(path = %self.socket_path, "Connected to IPC socket");
        Ok(())
    }

    /// Encode a notification as a length-prefixed MessagePack frame
    pub fn encode(notification: &BookNotification) -> Result<Vec<u8>> {
        let data = rmp_serde::to_vec_named(notification).map_err(|e| {
            FeedError::SerializationError(format!("Failed to serialize: {}", e))
        })?;

        let len = (data.len() as u32).to_be_bytes();
        let mut message = Vec::with_capacity(4 + data.len());
        message.extend_from_slice(&len);
        message.extend_from_slice(&data);
        Ok(message)
    }

    /// Publish one notification; delivery failures are logged, not returned
    pub async fn publish(&self, notification: &BookNotification) -> Result<()> {
        let message = Self::encode(notification)?;

        let mut guard = self.stream.lock().await;

        if guard.is_none() {
            drop(guard);
            if let Err(e) = self.connect().await {
                debug!(error = %e, "Failed to reconnect to IPC socket");
                return Ok(());
            }
            guard = self.stream.lock().await;
        }

        if let Some(stream) = guard.as_mut() {
            match stream.write_all(&message).await {
                Ok(_) => debug!(bytes = message.len(), "Published notification"),
                Err(e) => {
                    warn!(error = %e, "Failed to write to IPC socket");
                    *guard = None;
                }
            }
        }

        Ok(())
    }

    /// Forward every notification until the channel closes
    pub async fn run(self, mut notifications: NotificationReceiver) {
        while let Some(notification) = notifications.recv().await {
            if let Err(e) = self.publish(&notification).await {
                warn!(error = %e, "Dropping notification");
            }
        }
        debug!("Notification channel closed, publisher stopping");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tokio::io::AsyncReadExt;
    use tokio::net::UnixListener;

    #[test]
    fn test_encode_prefixes_length() {
        let notification = BookNotification::StatusChanged(ConnectionStatus {
            connected: true,
            reconnecting: false,
        });
        let frame = Publisher::encode(&notification).unwrap();
        let len = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
        assert_eq!(len, frame.len() - 4);
    }

    #[tokio::test]
    async fn test_publish_without_consumer_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.sock");
        let publisher = Publisher::new(path.to_str().unwrap()).await.unwrap();

        let result = publisher
            .publish(&BookNotification::PrecisionChanged(Precision::P1))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_run_forwards_notifications() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let publisher = Publisher::new(path.to_str().unwrap()).await.unwrap();
        let (tx, rx) = notification_channel();
        let task = tokio::spawn(publisher.run(rx));

        let notification =
            BookNotification::BookLevelUpdated(LevelUpdate::new(dec!(1500), 1, dec!(1)));
        tx.send(notification.clone()).unwrap();
        drop(tx);

        let (mut socket, _) = listener.accept().await.unwrap();
        let mut len = [0u8; 4];
        socket.read_exact(&mut len).await.unwrap();
        let mut body = vec![0u8; u32::from_be_bytes(len) as usize];
        socket.read_exact(&mut body).await.unwrap();

        assert_eq!(body, Publisher::encode(&notification).unwrap()[4..].to_vec());
        task.await.unwrap();
    }
}

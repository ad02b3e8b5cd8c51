//! WebSocket module: transport, book channel client and connection manager

mod feed;
mod manager;
mod transport;

pub use feed::{FeedClient, FeedSettings, Subscription};
pub use manager::{Command, ConnectionManager, ConnectionState, ManagerHandle, ManagerSettings};
pub use transport::{ReadyState, Transport, TransportEvent, WsTransport};

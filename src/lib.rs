//! Client-side room connection for the party game.
//!
//! - [`connection`]: lifecycle state machine with bounded exponential reconnect.
//! - [`router`]: `type`-tagged dispatch to custom and built-in handlers.
//! - [`client`]: task-driven handle that owns one connection per room.
//! - [`transport`]: socket seam and the tokio-tungstenite implementation.

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod outbound;
pub mod protocol;
pub mod reconnect;
pub mod room;
pub mod router;
pub mod sink;
pub mod transport;

pub use client::RoomClient;
pub use config::ClientConfig;
pub use connection::{ConnectionManager, ConnectionState};
pub use error::ClientError;
pub use outbound::OutboundCommand;
pub use protocol::{Envelope, MessageKind};
pub use reconnect::ReconnectPolicy;
pub use room::{PageLocation, RoomCode};
pub use router::MessageRouter;
pub use sink::{UiEvent, UiSink};
pub use transport::{Connector, WsConnector};

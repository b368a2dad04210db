//! Connection manager — lifecycle state machine for one room socket.
//!
//! The manager is synchronous and event-driven: the owner feeds it transport
//! events and reconnect-timer firings one at a time (see [`crate::client`]).
//! It never holds more than one socket and never has more than one reconnect
//! pending.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::outbound::OutboundCommand;
use crate::protocol::{Envelope, MessageKind};
use crate::room::RoomCode;
use crate::router::MessageRouter;
use crate::sink::{UiEvent, UiSink};
use crate::transport::{Connector, SocketHandle, TransportEvent};

/// Lifecycle of the room connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closed,
    Reconnecting,
    Exhausted,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Exhausted => "exhausted",
        }
    }

    /// States from which a new socket may be opened.
    pub fn can_connect(self) -> bool {
        matches!(
            self,
            ConnectionState::Idle
                | ConnectionState::Closed
                | ConnectionState::Reconnecting
                | ConnectionState::Exhausted
        )
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingReconnect {
    attempt: u32,
    delay: Duration,
    deadline: Instant,
}

/// Owns the room socket, the reconnect counter and the handler registry.
pub struct ConnectionManager<C: Connector> {
    room: RoomCode,
    config: ClientConfig,
    connector: C,
    state: ConnectionState,
    attempts: u32,
    socket: Option<SocketHandle>,
    pending: Option<PendingReconnect>,
    /// Set by `disconnect`; a close seen afterwards never re-arms a reconnect.
    torn_down: bool,
    router: MessageRouter,
    sink: Arc<dyn UiSink>,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(room: RoomCode, config: ClientConfig, connector: C, sink: Arc<dyn UiSink>) -> Self {
        Self {
            room,
            config,
            connector,
            state: ConnectionState::Idle,
            attempts: 0,
            socket: None,
            pending: None,
            torn_down: false,
            router: MessageRouter::new(sink.clone()),
            sink,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Consecutive reconnects since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn room(&self) -> &RoomCode {
        &self.room
    }

    pub fn url(&self) -> String {
        self.config.ws_url(self.room.as_str())
    }

    pub fn has_socket(&self) -> bool {
        self.socket.is_some()
    }

    pub fn router_mut(&mut self) -> &mut MessageRouter {
        &mut self.router
    }

    /// Delay of the scheduled reconnect, if one is pending.
    pub fn pending_reconnect(&self) -> Option<Duration> {
        self.pending.map(|p| p.delay)
    }

    /// When the pending reconnect is due.
    pub fn reconnect_deadline(&self) -> Option<Instant> {
        self.pending.map(|p| p.deadline)
    }

    // -----------------------------------------------------------------------
    // Caller operations
    // -----------------------------------------------------------------------

    /// Open a socket to the room. From `Exhausted` this is a manual reset.
    pub fn connect(&mut self) -> Result<(), ClientError> {
        if !self.state.can_connect() || self.socket.is_some() {
            return Err(ClientError::InvalidState(self.state));
        }
        if self.state == ConnectionState::Exhausted {
            self.attempts = 0;
        }
        self.pending = None;
        self.torn_down = false;

        let url = self.url();
        info!(room = %self.room, attempt = self.attempts, %url, "connecting");
        self.socket = Some(self.connector.open(&url));
        self.state = ConnectionState::Connecting;
        Ok(())
    }

    /// Send one envelope. False, with nothing transmitted, unless `Open`.
    pub fn send(&mut self, kind: &str, content: Value) -> bool {
        let Some(socket) = self.socket.as_ref().filter(|_| self.state == ConnectionState::Open)
        else {
            warn!(room = %self.room, kind, state = %self.state, "not connected, message dropped");
            return false;
        };
        let envelope = Envelope::new(kind, content);
        let sent = socket.transmit(envelope.to_json());
        debug!(room = %self.room, kind, sent, "message sent");
        sent
    }

    /// Validate and send a typed game command.
    pub fn send_command(&mut self, command: &OutboundCommand) -> Result<bool, ClientError> {
        command.validate()?;
        Ok(self.send(command.kind().as_str(), command.content()))
    }

    /// Close the socket on purpose. Idempotent; never schedules a reconnect.
    pub fn disconnect(&mut self) {
        self.torn_down = true;
        if self.pending.take().is_some() {
            debug!(room = %self.room, "pending reconnect cancelled");
        }
        let had_socket = match self.socket.take() {
            Some(socket) => {
                socket.close();
                true
            }
            None => false,
        };
        if matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Open | ConnectionState::Reconnecting
        ) {
            info!(room = %self.room, from = %self.state, "disconnected");
            self.state = ConnectionState::Closed;
            if had_socket {
                self.notify(UiEvent::Disconnected);
            }
        }
    }

    /// Disconnect and forget every custom handler.
    pub fn teardown(&mut self) {
        self.disconnect();
        self.router.clear();
    }

    // -----------------------------------------------------------------------
    // Event inputs
    // -----------------------------------------------------------------------

    /// Wait for the current socket's next event. Pends forever without a socket.
    pub async fn next_transport_event(&mut self) -> TransportEvent {
        match self.socket.as_mut() {
            Some(socket) => socket.next_event().await,
            None => std::future::pending().await,
        }
    }

    pub fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Open => self.on_open(),
            TransportEvent::Frame(bytes) => self.on_frame(&bytes),
            TransportEvent::Error(message) => self.on_error(message),
            TransportEvent::Closed => self.on_closed(),
        }
    }

    /// The reconnect timer fired.
    pub fn reconnect_due(&mut self) {
        if self.state != ConnectionState::Reconnecting {
            return;
        }
        let Some(pending) = self.pending.take() else {
            return;
        };
        debug!(room = %self.room, attempt = pending.attempt, "reconnect due");
        if let Err(e) = self.connect() {
            warn!(room = %self.room, "reconnect skipped: {e}");
        }
    }

    /// Report to the UI. A panicking sink never takes the connection down.
    fn notify(&self, event: UiEvent) {
        let sink = &self.sink;
        if catch_unwind(AssertUnwindSafe(|| sink.notify(event))).is_err() {
            error!(room = %self.room, "ui sink panicked");
        }
    }

    fn on_open(&mut self) {
        if self.state != ConnectionState::Connecting {
            debug!(room = %self.room, state = %self.state, "ignoring stale open");
            return;
        }
        info!(room = %self.room, "connected");
        self.state = ConnectionState::Open;
        self.attempts = 0;
        self.send(
            MessageKind::PlayerConnected.as_str(),
            json!({ "message": "Player connected to the room" }),
        );
        self.notify(UiEvent::Connected);
    }

    fn on_frame(&mut self, bytes: &[u8]) {
        match Envelope::from_frame(bytes) {
            Ok(message) => {
                debug!(room = %self.room, kind = %message.kind, "message received");
                self.router.dispatch(&message);
            }
            Err(e) => {
                warn!(room = %self.room, "dropping frame: {e}");
                self.notify(UiEvent::Error(e.to_string()));
            }
        }
    }

    fn on_error(&mut self, message: String) {
        let err = ClientError::Transport(message);
        error!(room = %self.room, "{err}");
        self.notify(UiEvent::Error(err.to_string()));
    }

    fn on_closed(&mut self) {
        self.socket = None;
        if self.torn_down || !matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Open
        ) {
            debug!(room = %self.room, state = %self.state, "close after teardown");
            return;
        }

        info!(room = %self.room, "socket closed");
        self.state = ConnectionState::Closed;
        self.notify(UiEvent::Disconnected);

        let policy = self.config.reconnect;
        if policy.should_retry(self.attempts) {
            self.attempts += 1;
            let delay = policy.delay_for(self.attempts);
            info!(
                room = %self.room,
                attempt = self.attempts,
                max_attempts = policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                "reconnect scheduled"
            );
            self.pending = Some(PendingReconnect {
                attempt: self.attempts,
                delay,
                deadline: Instant::now() + delay,
            });
            self.state = ConnectionState::Reconnecting;
            self.notify(UiEvent::Reconnecting {
                attempt: self.attempts,
                delay,
            });
        } else {
            let err = ClientError::Exhausted {
                attempts: self.attempts,
            };
            error!(room = %self.room, "{err}");
            self.state = ConnectionState::Exhausted;
            self.notify(UiEvent::Exhausted {
                attempts: self.attempts,
            });
        }
    }
}

impl<C: Connector> std::fmt::Debug for ConnectionManager<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("room", &self.room)
            .field("state", &self.state)
            .field("attempts", &self.attempts)
            .field("pending", &self.pending)
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

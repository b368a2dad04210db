//! Room client — a handle to the task that owns a [`ConnectionManager`].
//!
//! Caller commands, transport events of the live socket and the reconnect
//! deadline are multiplexed on one task, so every state transition and
//! handler call runs in arrival order and never concurrently.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::connection::{ConnectionManager, ConnectionState};
use crate::error::ClientError;
use crate::outbound::OutboundCommand;
use crate::protocol::Envelope;
use crate::room::RoomCode;
use crate::router::Handler;
use crate::sink::UiSink;
use crate::transport::{Connector, TransportEvent, WsConnector};

enum Command {
    Connect(oneshot::Sender<Result<(), ClientError>>),
    Send {
        kind: String,
        content: Value,
        reply: oneshot::Sender<bool>,
    },
    Register {
        kind: String,
        handler: Handler,
    },
    Unregister {
        kind: String,
    },
    Disconnect(oneshot::Sender<()>),
}

enum Step {
    Command(Command),
    Transport(TransportEvent),
    ReconnectDue,
    Shutdown,
}

/// Owned handle to one room connection. Dropping it tears the connection down.
#[derive(Debug)]
pub struct RoomClient {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    task: JoinHandle<()>,
}

impl RoomClient {
    /// WebSocket client for `room`. Does not connect until [`RoomClient::connect`].
    pub fn new(room: RoomCode, config: ClientConfig, sink: Arc<dyn UiSink>) -> Self {
        Self::spawn(ConnectionManager::new(room, config, WsConnector, sink))
    }

    /// Drive an existing manager on a new task.
    pub fn spawn<C: Connector>(manager: ConnectionManager<C>) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(manager.state());
        let task = tokio::spawn(drive(manager, rx, state_tx));
        Self {
            commands,
            state,
            task,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub async fn connect(&self) -> Result<(), ClientError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Connect(reply))?;
        rx.await.map_err(|_| ClientError::ClientClosed)?
    }

    /// Send one envelope; false when the connection is not open.
    pub async fn send(&self, kind: impl Into<String>, content: Value) -> bool {
        let (reply, rx) = oneshot::channel();
        let cmd = Command::Send {
            kind: kind.into(),
            content,
            reply,
        };
        if self.command(cmd).is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Validate and send a typed game command.
    pub async fn send_command(&self, command: OutboundCommand) -> Result<bool, ClientError> {
        command.validate()?;
        Ok(self.send(command.kind().as_str(), command.content()).await)
    }

    /// Register the handler for `kind`, replacing any previous one.
    pub fn on<F>(&self, kind: impl Into<String>, handler: F)
    where
        F: FnMut(&Envelope) + Send + 'static,
    {
        let _ = self.command(Command::Register {
            kind: kind.into(),
            handler: Box::new(handler),
        });
    }

    pub fn off(&self, kind: impl Into<String>) {
        let _ = self.command(Command::Unregister { kind: kind.into() });
    }

    /// Close the socket on purpose and cancel any pending reconnect.
    pub async fn disconnect(&self) {
        let (reply, rx) = oneshot::channel();
        if self.command(Command::Disconnect(reply)).is_ok() {
            let _ = rx.await;
        }
    }

    /// Disconnect, drop every handler and wait for the task to finish.
    pub async fn shutdown(self) {
        let RoomClient { commands, task, .. } = self;
        drop(commands);
        if let Err(e) = task.await {
            warn!("room client task failed: {e}");
        }
    }

    fn command(&self, cmd: Command) -> Result<(), ClientError> {
        self.commands
            .send(cmd)
            .map_err(|_| ClientError::ClientClosed)
    }
}

async fn drive<C: Connector>(
    mut manager: ConnectionManager<C>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    state_tx: watch::Sender<ConnectionState>,
) {
    loop {
        let deadline = manager.reconnect_deadline();
        let step = tokio::select! {
            cmd = commands.recv() => cmd.map_or(Step::Shutdown, Step::Command),
            event = manager.next_transport_event() => Step::Transport(event),
            () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                Step::ReconnectDue
            }
        };

        match step {
            Step::Command(cmd) => apply(&mut manager, cmd, &state_tx),
            Step::Transport(event) => manager.handle_event(event),
            Step::ReconnectDue => manager.reconnect_due(),
            Step::Shutdown => {
                manager.teardown();
                publish(&state_tx, manager.state());
                break;
            }
        }
        publish(&state_tx, manager.state());
    }
    debug!(room = %manager.room(), "room client stopped");
}

/// Replies go out after the resulting state is visible to watchers.
fn apply<C: Connector>(
    manager: &mut ConnectionManager<C>,
    cmd: Command,
    state_tx: &watch::Sender<ConnectionState>,
) {
    match cmd {
        Command::Connect(reply) => {
            let result = manager.connect();
            publish(state_tx, manager.state());
            let _ = reply.send(result);
        }
        Command::Send {
            kind,
            content,
            reply,
        } => {
            let _ = reply.send(manager.send(&kind, content));
        }
        Command::Register { kind, handler } => manager.router_mut().register(kind, handler),
        Command::Unregister { kind } => {
            manager.router_mut().unregister(&kind);
        }
        Command::Disconnect(reply) => {
            manager.disconnect();
            publish(state_tx, manager.state());
            let _ = reply.send(());
        }
    }
}

fn publish(state_tx: &watch::Sender<ConnectionState>, current: ConnectionState) {
    state_tx.send_if_modified(|s| {
        let changed = *s != current;
        *s = current;
        changed
    });
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

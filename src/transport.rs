//! Socket seam. A [`Connector`] opens a socket and hands back a
//! [`SocketHandle`]: outbound commands in, transport events out.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

/// What the transport reports about one socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Open,
    Frame(Vec<u8>),
    Error(String),
    Closed,
}

/// What the connection asks of one socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketCommand {
    Text(String),
    Close,
}

/// Connection-side end of a socket. Dropping it releases the socket.
#[derive(Debug)]
pub struct SocketHandle {
    commands: mpsc::UnboundedSender<SocketCommand>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Transport-side end of a socket, held by the task driving the wire.
#[derive(Debug)]
pub struct SocketPeer {
    pub events: mpsc::UnboundedSender<TransportEvent>,
    pub commands: mpsc::UnboundedReceiver<SocketCommand>,
}

impl SocketHandle {
    /// A connected handle/peer pair.
    pub fn pair() -> (SocketHandle, SocketPeer) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (evt_tx, evt_rx) = mpsc::unbounded_channel();
        (
            SocketHandle {
                commands: cmd_tx,
                events: evt_rx,
            },
            SocketPeer {
                events: evt_tx,
                commands: cmd_rx,
            },
        )
    }

    /// Queue one text frame. False once the transport side is gone.
    pub fn transmit(&self, text: String) -> bool {
        self.commands.send(SocketCommand::Text(text)).is_ok()
    }

    /// Ask the transport to close the socket.
    pub fn close(&self) {
        let _ = self.commands.send(SocketCommand::Close);
    }

    /// Next event; a vanished transport reads as [`TransportEvent::Closed`].
    pub async fn next_event(&mut self) -> TransportEvent {
        self.events.recv().await.unwrap_or(TransportEvent::Closed)
    }
}

/// Opens sockets. Must not block: the handshake result arrives later as an event.
pub trait Connector: Send + Sync + 'static {
    fn open(&self, url: &str) -> SocketHandle;
}

// ---------------------------------------------------------------------------
// tokio-tungstenite
// ---------------------------------------------------------------------------

/// WebSocket connector. Each socket runs on its own tokio task; must be
/// called from within a runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn open(&self, url: &str) -> SocketHandle {
        let (handle, peer) = SocketHandle::pair();
        tokio::spawn(run_socket(url.to_string(), peer));
        handle
    }
}

/// Drive one WebSocket until either side closes. Always ends with `Closed`.
async fn run_socket(url: String, peer: SocketPeer) {
    let SocketPeer {
        events,
        mut commands,
    } = peer;

    let mut stream = match connect_async(url.as_str()).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            let _ = events.send(TransportEvent::Error(e.to_string()));
            let _ = events.send(TransportEvent::Closed);
            return;
        }
    };
    debug!(url, "WS handshake complete");
    if events.send(TransportEvent::Open).is_err() {
        // Released while the handshake was in flight.
        debug!(url, "WS handle dropped during handshake, closing");
        let _ = stream.close(None).await;
        return;
    }

    let (mut sink, mut stream) = stream.split();
    loop {
        tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(SocketCommand::Text(text)) => {
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        let _ = events.send(TransportEvent::Error(e.to_string()));
                        break;
                    }
                }
                // Close requested, or the connection released the socket.
                Some(SocketCommand::Close) | None => {
                    let _ = sink.close().await;
                    break;
                }
            },
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(TransportEvent::Frame(text.as_bytes().to_vec()));
                }
                Some(Ok(Message::Binary(bytes))) => {
                    let _ = events.send(TransportEvent::Frame(bytes.to_vec()));
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {} // Ping / Pong handled by tungstenite
                Some(Err(e)) => {
                    let _ = events.send(TransportEvent::Error(e.to_string()));
                    break;
                }
            },
        }
    }

    debug!(url, "WS socket finished");
    let _ = events.send(TransportEvent::Closed);
}

// ---------------------------------------------------------------------------
// Test support
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod mock {
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Records each opened socket so tests can play the transport side.
    #[derive(Debug, Clone, Default)]
    pub(crate) struct MockConnector {
        pub(crate) opened: Arc<Mutex<Vec<(String, SocketPeer)>>>,
    }

    impl MockConnector {
        pub(crate) fn open_count(&self) -> usize {
            self.opened.lock().unwrap().len()
        }

        /// Frames sent on the `index`-th socket so far.
        pub(crate) fn sent(&self, index: usize) -> Vec<SocketCommand> {
            let mut opened = self.opened.lock().unwrap();
            let peer = &mut opened[index].1;
            let mut out = Vec::new();
            while let Ok(cmd) = peer.commands.try_recv() {
                out.push(cmd);
            }
            out
        }

        /// Push a transport event on the `index`-th socket.
        pub(crate) fn emit(&self, index: usize, event: TransportEvent) {
            let _ = self.opened.lock().unwrap()[index].1.events.send(event);
        }
    }

    impl Connector for MockConnector {
        fn open(&self, url: &str) -> SocketHandle {
            let (handle, peer) = SocketHandle::pair();
            self.opened.lock().unwrap().push((url.to_string(), peer));
            handle
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn handle_and_peer_are_wired() {
        let (mut handle, mut peer) = SocketHandle::pair();
        assert!(handle.transmit("hello".into()));
        handle.close();
        assert_eq!(
            peer.commands.recv().await,
            Some(SocketCommand::Text("hello".into()))
        );
        assert_eq!(peer.commands.recv().await, Some(SocketCommand::Close));

        peer.events.send(TransportEvent::Open).unwrap();
        assert_eq!(handle.next_event().await, TransportEvent::Open);
    }

    #[tokio::test]
    async fn vanished_transport_reads_as_closed() {
        let (mut handle, peer) = SocketHandle::pair();
        drop(peer);
        assert_eq!(handle.next_event().await, TransportEvent::Closed);
        assert!(!handle.transmit("late".into()));
    }

    #[tokio::test]
    async fn ws_connector_reports_refused_connection() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut handle = WsConnector.open(&format!("ws://127.0.0.1:{port}/ws?room=ab12"));
        let first = handle.next_event().await;
        assert!(matches!(first, TransportEvent::Error(_)), "got {first:?}");
        assert_eq!(handle.next_event().await, TransportEvent::Closed);
    }
}

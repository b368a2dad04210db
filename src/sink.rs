//! UI sink — the rendering side of the client, seen as a single capability.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::protocol::ScoreEntry;

/// A scoreboard row with its position in the order the server sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedEntry {
    pub rank: usize,
    pub display_name: String,
    pub score: i64,
}

impl RankedEntry {
    /// Rank rows in input order; the server already sorted them.
    pub fn rank_all(entries: Vec<ScoreEntry>) -> Vec<RankedEntry> {
        entries
            .into_iter()
            .enumerate()
            .map(|(i, e)| RankedEntry {
                rank: i + 1,
                display_name: e.display_name,
                score: e.score,
            })
            .collect()
    }
}

/// Everything the connection asks the UI to show.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    // Lifecycle
    Connected,
    Disconnected,
    Reconnecting { attempt: u32, delay: Duration },
    Exhausted { attempts: u32 },
    Error(String),

    // Game
    PlayerJoined { name: String, user_id: Option<String> },
    PlayerLeft { name: String, user_id: Option<String> },
    ChatMessage { from: String, text: String },
    GameStarted,
    RoundStarted { round: u32, total: u32, letter: Option<String> },
    PlayerAnswered { name: String },
    RoundEnded { results: Value },
    FinalScoreboard(Vec<RankedEntry>),
    Scoreboard(Vec<RankedEntry>),
    CategoryAdded { category: String },
    CategoryDeleted { category: String },
}

/// Receiver of UI effects. Calls happen on the connection task and must not block.
pub trait UiSink: Send + Sync {
    fn notify(&self, event: UiEvent);
}

impl<F> UiSink for F
where
    F: Fn(UiEvent) + Send + Sync,
{
    fn notify(&self, event: UiEvent) {
        self(event)
    }
}

/// Forwards events to a channel; a closed receiver drops them.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<UiEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<UiEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl UiSink for ChannelSink {
    fn notify(&self, event: UiEvent) {
        let _ = self.tx.send(event);
    }
}

/// Renders events as log lines, for headless clients.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl UiSink for TracingSink {
    fn notify(&self, event: UiEvent) {
        match event {
            UiEvent::Error(message) => warn!(%message, "connection error"),
            UiEvent::Exhausted { attempts } => warn!(attempts, "reconnect attempts exhausted"),
            UiEvent::Reconnecting { attempt, delay } => {
                info!(attempt, delay_ms = delay.as_millis() as u64, "reconnecting")
            }
            UiEvent::ChatMessage { from, text } => info!(%from, %text, "chat"),
            UiEvent::PlayerJoined { name, .. } => info!(%name, "player joined"),
            UiEvent::PlayerLeft { name, .. } => info!(%name, "player left"),
            UiEvent::Scoreboard(rows) | UiEvent::FinalScoreboard(rows) => {
                for row in rows {
                    info!(rank = row.rank, name = %row.display_name, score = row.score, "score");
                }
            }
            other => info!(event = ?other, "ui"),
        }
    }
}

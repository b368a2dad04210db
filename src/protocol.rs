//! Wire envelope and the message kinds the game speaks.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// One frame on the room socket, in either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Routing tag.
    #[serde(rename = "type")]
    pub kind: String,
    /// Type-specific payload, opaque to the router.
    #[serde(default)]
    pub content: Value,
    /// Milliseconds since the Unix epoch. The server does not stamp relayed
    /// frames, so a missing value decodes as 0.
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "string_or_number"
    )]
    pub user_id: Option<String>,
}

impl Envelope {
    /// Outbound envelope stamped with the current time.
    pub fn new(kind: impl Into<String>, content: Value) -> Self {
        Envelope {
            kind: kind.into(),
            content,
            timestamp: now_millis(),
            from: None,
            user_id: None,
        }
    }

    /// Decode a raw frame. Frames must be UTF-8 JSON objects with a `type`.
    pub fn from_frame(bytes: &[u8]) -> Result<Self, crate::ClientError> {
        let text = std::str::from_utf8(bytes)?;
        Ok(serde_json::from_str(text)?)
    }

    /// Serialize to JSON text for sending over WebSocket.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            json!({ "type": self.kind, "content": null, "timestamp": self.timestamp }).to_string()
        })
    }

    /// The recognized kind, if any.
    pub fn message_kind(&self) -> Option<MessageKind> {
        MessageKind::parse(&self.kind)
    }
}

/// Current time as epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
    }

    Ok(Option::<Id>::deserialize(deserializer)?.map(|id| match id {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    }))
}

// ---------------------------------------------------------------------------
// Message kinds
// ---------------------------------------------------------------------------

/// Every `type` tag the game client produces or consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    PlayerConnected,
    PlayerDisconnected,
    Chat,
    GameStart,
    RoundStart,
    AnswerSubmitted,
    RoundEnd,
    GameEnd,
    ScoreboardUpdate,
    CategoryAdded,
    CategoryDeleted,
    // Outbound only.
    AnswersSubmitted,
    ValidationVote,
    AddCategory,
    DeleteCategory,
    CategoriesSelected,
}

impl MessageKind {
    /// Kinds with a built-in inbound handler.
    pub const INBOUND: [MessageKind; 11] = [
        MessageKind::PlayerConnected,
        MessageKind::PlayerDisconnected,
        MessageKind::Chat,
        MessageKind::GameStart,
        MessageKind::RoundStart,
        MessageKind::AnswerSubmitted,
        MessageKind::RoundEnd,
        MessageKind::GameEnd,
        MessageKind::ScoreboardUpdate,
        MessageKind::CategoryAdded,
        MessageKind::CategoryDeleted,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::PlayerConnected => "player_connected",
            MessageKind::PlayerDisconnected => "player_disconnected",
            MessageKind::Chat => "chat",
            MessageKind::GameStart => "game_start",
            MessageKind::RoundStart => "round_start",
            MessageKind::AnswerSubmitted => "answer_submitted",
            MessageKind::RoundEnd => "round_end",
            MessageKind::GameEnd => "game_end",
            MessageKind::ScoreboardUpdate => "scoreboard_update",
            MessageKind::CategoryAdded => "category_added",
            MessageKind::CategoryDeleted => "category_deleted",
            MessageKind::AnswersSubmitted => "answers_submitted",
            MessageKind::ValidationVote => "validation_vote",
            MessageKind::AddCategory => "add_category",
            MessageKind::DeleteCategory => "delete_category",
            MessageKind::CategoriesSelected => "categories_selected",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        serde_json::from_value(Value::String(tag.to_string())).ok()
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Inbound content shapes
// ---------------------------------------------------------------------------

/// `round_start` payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundStartContent {
    pub round_number: u32,
    pub total_rounds: u32,
    #[serde(default)]
    pub letter: Option<String>,
}

/// One scoreboard row as sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreEntry {
    #[serde(alias = "Pseudo", alias = "pseudo")]
    pub display_name: String,
    #[serde(alias = "Score")]
    pub score: i64,
}

/// `game_end` payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GameEndContent {
    pub scoreboard: Vec<ScoreEntry>,
}

/// `category_added` / `category_deleted` payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CategoryContent {
    pub category: String,
}

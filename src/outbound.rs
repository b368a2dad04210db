//! Commands the player sends to the room.

use std::collections::BTreeMap;

use serde_json::{Value, json};

use crate::error::ClientError;
use crate::protocol::{MessageKind, now_millis};

/// Number of categories a petit-bac game is played with.
pub const CATEGORY_COUNT: usize = 5;

/// A typed outbound game action.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundCommand {
    Chat(String),
    BlindTestAnswer(String),
    /// Category → answer.
    PetitBacAnswers(BTreeMap<String, String>),
    ValidationVote {
        category: String,
        answer: String,
        is_valid: bool,
    },
    StartGame,
    AddCategory(String),
    DeleteCategory(String),
    SelectCategories(Vec<String>),
}

impl OutboundCommand {
    pub fn kind(&self) -> MessageKind {
        match self {
            OutboundCommand::Chat(_) => MessageKind::Chat,
            OutboundCommand::BlindTestAnswer(_) => MessageKind::AnswerSubmitted,
            OutboundCommand::PetitBacAnswers(_) => MessageKind::AnswersSubmitted,
            OutboundCommand::ValidationVote { .. } => MessageKind::ValidationVote,
            OutboundCommand::StartGame => MessageKind::GameStart,
            OutboundCommand::AddCategory(_) => MessageKind::AddCategory,
            OutboundCommand::DeleteCategory(_) => MessageKind::DeleteCategory,
            OutboundCommand::SelectCategories(_) => MessageKind::CategoriesSelected,
        }
    }

    /// Check the command before it goes on the wire.
    pub fn validate(&self) -> Result<(), ClientError> {
        match self {
            OutboundCommand::Chat(text) if text.trim().is_empty() => {
                Err(ClientError::InvalidCommand("empty chat message".into()))
            }
            OutboundCommand::BlindTestAnswer(answer) if answer.trim().is_empty() => {
                Err(ClientError::InvalidCommand("empty answer".into()))
            }
            OutboundCommand::AddCategory(name) if name.trim().is_empty() => {
                Err(ClientError::InvalidCommand("empty category name".into()))
            }
            OutboundCommand::SelectCategories(list) if list.len() != CATEGORY_COUNT => {
                Err(ClientError::InvalidCommand(format!(
                    "exactly {CATEGORY_COUNT} categories must be selected, got {}",
                    list.len()
                )))
            }
            _ => Ok(()),
        }
    }

    /// The `content` value of the envelope.
    pub fn content(&self) -> Value {
        match self {
            OutboundCommand::Chat(text) => Value::String(text.trim().to_string()),
            OutboundCommand::BlindTestAnswer(answer) => json!({
                "answer": answer.trim(),
                "timestamp": now_millis(),
            }),
            OutboundCommand::PetitBacAnswers(answers) => json!({
                "answers": answers,
                "timestamp": now_millis(),
            }),
            OutboundCommand::ValidationVote {
                category,
                answer,
                is_valid,
            } => json!({
                "category": category,
                "answer": answer,
                "isValid": is_valid,
            }),
            OutboundCommand::StartGame => json!({ "message": "The host started the game" }),
            OutboundCommand::AddCategory(name) | OutboundCommand::DeleteCategory(name) => {
                json!({ "category": name.trim() })
            }
            OutboundCommand::SelectCategories(list) => json!({ "categories": list }),
        }
    }
}

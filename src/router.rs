//! Message router — custom handlers first, then the fixed built-in reaction
//! for the recognized inbound kinds.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::protocol::{
    CategoryContent, Envelope, GameEndContent, MessageKind, RoundStartContent, ScoreEntry,
};
use crate::sink::{RankedEntry, UiEvent, UiSink};

/// Callback registered for one message `type`.
pub type Handler = Box<dyn FnMut(&Envelope) + Send>;

/// Routes envelopes by `type`. One custom handler per type; built-ins always run.
pub struct MessageRouter {
    handlers: HashMap<String, Handler>,
    sink: Arc<dyn UiSink>,
}

impl MessageRouter {
    pub fn new(sink: Arc<dyn UiSink>) -> Self {
        Self {
            handlers: HashMap::new(),
            sink,
        }
    }

    /// Register `handler` for `kind`, replacing any previous one.
    pub fn register<F>(&mut self, kind: impl Into<String>, handler: F)
    where
        F: FnMut(&Envelope) + Send + 'static,
    {
        let kind = kind.into();
        if self.handlers.insert(kind.clone(), Box::new(handler)).is_some() {
            debug!(kind, "replaced message handler");
        }
    }

    /// Drop the custom handler for `kind`, if any.
    pub fn unregister(&mut self, kind: &str) -> bool {
        self.handlers.remove(kind).is_some()
    }

    pub fn has_handler(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    /// Forget every custom handler.
    pub fn clear(&mut self) {
        self.handlers.clear();
    }

    /// Run the custom handler, then the built-in one. Unknown kinds are ignored.
    pub fn dispatch(&mut self, message: &Envelope) {
        if let Some(handler) = self.handlers.get_mut(&message.kind) {
            if catch_unwind(AssertUnwindSafe(|| handler(message))).is_err() {
                error!(kind = %message.kind, "custom message handler panicked");
            }
        }

        let Some(kind) = message.message_kind() else {
            return;
        };
        let event = match built_in(kind, message) {
            Ok(Some(event)) => event,
            Ok(None) => return,
            Err(e) => {
                warn!(%kind, error = %e, "built-in skipped, unexpected content");
                return;
            }
        };
        let sink = &self.sink;
        if catch_unwind(AssertUnwindSafe(|| sink.notify(event))).is_err() {
            error!(%kind, "ui sink panicked");
        }
    }
}

impl std::fmt::Debug for MessageRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<&String> = self.handlers.keys().collect();
        kinds.sort();
        f.debug_struct("MessageRouter")
            .field("handlers", &kinds)
            .finish_non_exhaustive()
    }
}

/// The UI effect of a recognized inbound kind. `None` for outbound-only kinds.
fn built_in(kind: MessageKind, message: &Envelope) -> Result<Option<UiEvent>, serde_json::Error> {
    let from = || message.from.clone().unwrap_or_default();
    let event = match kind {
        MessageKind::PlayerConnected => UiEvent::PlayerJoined {
            name: from(),
            user_id: message.user_id.clone(),
        },
        MessageKind::PlayerDisconnected => UiEvent::PlayerLeft {
            name: from(),
            user_id: message.user_id.clone(),
        },
        MessageKind::Chat => UiEvent::ChatMessage {
            from: from(),
            text: match &message.content {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            },
        },
        MessageKind::GameStart => UiEvent::GameStarted,
        MessageKind::RoundStart => {
            let c: RoundStartContent = content(message)?;
            UiEvent::RoundStarted {
                round: c.round_number,
                total: c.total_rounds,
                letter: c.letter,
            }
        }
        MessageKind::AnswerSubmitted => UiEvent::PlayerAnswered { name: from() },
        MessageKind::RoundEnd => UiEvent::RoundEnded {
            results: message.content.clone(),
        },
        MessageKind::GameEnd => {
            let c: GameEndContent = content(message)?;
            UiEvent::FinalScoreboard(RankedEntry::rank_all(c.scoreboard))
        }
        MessageKind::ScoreboardUpdate => {
            let rows: Vec<ScoreEntry> = content(message)?;
            UiEvent::Scoreboard(RankedEntry::rank_all(rows))
        }
        MessageKind::CategoryAdded => {
            let c: CategoryContent = content(message)?;
            UiEvent::CategoryAdded {
                category: c.category,
            }
        }
        MessageKind::CategoryDeleted => {
            let c: CategoryContent = content(message)?;
            UiEvent::CategoryDeleted {
                category: c.category,
            }
        }
        MessageKind::AnswersSubmitted
        | MessageKind::ValidationVote
        | MessageKind::AddCategory
        | MessageKind::DeleteCategory
        | MessageKind::CategoriesSelected => return Ok(None),
    };
    Ok(Some(event))
}

fn content<T: DeserializeOwned>(message: &Envelope) -> Result<T, serde_json::Error> {
    T::deserialize(&message.content)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    /// Records every call, UI or custom, in the order it happened.
    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
        events: Mutex<Vec<UiEvent>>,
    }

    impl UiSink for Recorder {
        fn notify(&self, event: UiEvent) {
            self.calls.lock().unwrap().push("built-in".into());
            self.events.lock().unwrap().push(event);
        }
    }

    fn router() -> (MessageRouter, Arc<Recorder>) {
        let rec = Arc::new(Recorder::default());
        (MessageRouter::new(rec.clone()), rec)
    }

    fn msg(kind: &str, content: Value) -> Envelope {
        Envelope {
            kind: kind.into(),
            content,
            timestamp: 1,
            from: Some("ana".into()),
            user_id: Some("3".into()),
        }
    }

    #[test]
    fn chat_runs_custom_then_built_in_once_each() {
        let (mut router, rec) = router();
        let rec2 = rec.clone();
        router.register("chat", move |_m: &Envelope| {
            rec2.calls.lock().unwrap().push("custom".into());
        });

        router.dispatch(&msg("chat", json!("bonjour")));

        assert_eq!(*rec.calls.lock().unwrap(), vec!["custom", "built-in"]);
        assert_eq!(
            *rec.events.lock().unwrap(),
            vec![UiEvent::ChatMessage {
                from: "ana".into(),
                text: "bonjour".into()
            }]
        );
    }

    #[test]
    fn unknown_kind_invokes_nothing() {
        let (mut router, rec) = router();
        router.dispatch(&msg("mystery", json!({"a": 1})));
        assert!(rec.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn custom_handler_for_unknown_kind_still_runs() {
        let (mut router, rec) = router();
        let hits = Arc::new(Mutex::new(0));
        let h = hits.clone();
        router.register("ping", move |_m: &Envelope| *h.lock().unwrap() += 1);
        router.dispatch(&msg("ping", Value::Null));
        assert_eq!(*hits.lock().unwrap(), 1);
        assert!(rec.events.lock().unwrap().is_empty());
    }

    #[test]
    fn last_registration_wins() {
        let (mut router, _rec) = router();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (a, b) = (seen.clone(), seen.clone());
        router.register("chat", move |_m: &Envelope| a.lock().unwrap().push("first"));
        router.register("chat", move |_m: &Envelope| b.lock().unwrap().push("second"));
        router.dispatch(&msg("chat", json!("x")));
        assert_eq!(*seen.lock().unwrap(), vec!["second"]);
    }

    #[test]
    fn unregister_leaves_built_in() {
        let (mut router, rec) = router();
        router.register("game_start", |_m: &Envelope| panic!("should be gone"));
        assert!(router.unregister("game_start"));
        assert!(!router.has_handler("game_start"));
        router.dispatch(&msg("game_start", json!({})));
        assert_eq!(*rec.events.lock().unwrap(), vec![UiEvent::GameStarted]);
    }

    #[test]
    fn panicking_handler_is_isolated() {
        let (mut router, rec) = router();
        router.register("chat", |_m: &Envelope| panic!("boom"));

        router.dispatch(&msg("chat", json!("first")));
        router.dispatch(&msg("chat", json!("second")));

        let events = rec.events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[1], UiEvent::ChatMessage { text, .. } if text == "second"));
    }

    #[test]
    fn panicking_sink_still_gets_later_events() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let failed_once = Mutex::new(false);
        let sink = {
            let seen = seen.clone();
            move |event: UiEvent| {
                let mut failed = failed_once.lock().unwrap();
                if !*failed {
                    *failed = true;
                    drop(failed);
                    panic!("render failed");
                }
                seen.lock().unwrap().push(event);
            }
        };
        let mut router = MessageRouter::new(Arc::new(sink));

        router.dispatch(&msg("chat", json!("first")));
        router.dispatch(&msg("chat", json!("second")));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(matches!(&seen[0], UiEvent::ChatMessage { text, .. } if text == "second"));
    }

    #[test]
    fn scoreboard_is_ranked_in_input_order() {
        let (mut router, rec) = router();
        let custom_hits = Arc::new(Mutex::new(0));
        let h = custom_hits.clone();
        router.register("scoreboard_update", move |_m: &Envelope| *h.lock().unwrap() += 1);

        router.dispatch(&msg(
            "scoreboard_update",
            json!([
                {"displayName": "Ana", "score": 10},
                {"displayName": "Bo", "score": 7}
            ]),
        ));

        assert_eq!(*custom_hits.lock().unwrap(), 1);
        assert_eq!(
            *rec.events.lock().unwrap(),
            vec![UiEvent::Scoreboard(vec![
                RankedEntry { rank: 1, display_name: "Ana".into(), score: 10 },
                RankedEntry { rank: 2, display_name: "Bo".into(), score: 7 },
            ])]
        );
    }

    #[test]
    fn router_does_not_resort_scoreboard() {
        let (mut router, rec) = router();
        router.dispatch(&msg(
            "scoreboard_update",
            json!([{"Pseudo": "Low", "Score": 1}, {"Pseudo": "High", "Score": 99}]),
        ));
        let events = rec.events.lock().unwrap();
        let UiEvent::Scoreboard(rows) = &events[0] else {
            panic!("expected scoreboard, got {events:?}");
        };
        assert_eq!(rows[0].display_name, "Low");
        assert_eq!(rows[1].display_name, "High");
    }

    #[test]
    fn built_ins_map_to_one_event_each() {
        let (mut router, rec) = router();
        router.dispatch(&msg("player_connected", Value::Null));
        router.dispatch(&msg("player_disconnected", Value::Null));
        router.dispatch(&msg("game_start", json!({"message": "go"})));
        router.dispatch(&msg(
            "round_start",
            json!({"roundNumber": 1, "totalRounds": 3, "letter": "B"}),
        ));
        router.dispatch(&msg("answer_submitted", json!({"answer": "x"})));
        router.dispatch(&msg("round_end", json!({"winner": "ana"})));
        router.dispatch(&msg(
            "game_end",
            json!({"scoreboard": [{"displayName": "ana", "score": 3}]}),
        ));
        router.dispatch(&msg("category_added", json!({"category": "Jazz"})));
        router.dispatch(&msg("category_deleted", json!({"category": "Jazz"})));

        assert_eq!(
            *rec.events.lock().unwrap(),
            vec![
                UiEvent::PlayerJoined { name: "ana".into(), user_id: Some("3".into()) },
                UiEvent::PlayerLeft { name: "ana".into(), user_id: Some("3".into()) },
                UiEvent::GameStarted,
                UiEvent::RoundStarted { round: 1, total: 3, letter: Some("B".into()) },
                UiEvent::PlayerAnswered { name: "ana".into() },
                UiEvent::RoundEnded { results: json!({"winner": "ana"}) },
                UiEvent::FinalScoreboard(vec![RankedEntry {
                    rank: 1,
                    display_name: "ana".into(),
                    score: 3
                }]),
                UiEvent::CategoryAdded { category: "Jazz".into() },
                UiEvent::CategoryDeleted { category: "Jazz".into() },
            ]
        );
    }

    #[test]
    fn mismatched_content_drops_only_that_event() {
        let (mut router, rec) = router();
        router.dispatch(&msg("round_start", json!("not an object")));
        router.dispatch(&msg("category_added", json!({"category": "Rock"})));
        assert_eq!(
            *rec.events.lock().unwrap(),
            vec![UiEvent::CategoryAdded { category: "Rock".into() }]
        );
    }

    #[test]
    fn outbound_only_kinds_have_no_built_in() {
        let (mut router, rec) = router();
        router.dispatch(&msg("add_category", json!({"category": "Rock"})));
        assert!(rec.events.lock().unwrap().is_empty());
    }

    #[test]
    fn clear_drops_custom_handlers() {
        let (mut router, _rec) = router();
        router.register("chat", |_m: &Envelope| {});
        router.clear();
        assert!(!router.has_handler("chat"));
    }
}

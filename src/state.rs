use serde_json::Value;
use thiserror::Error;

use crate::stream::{ChatMessage, MessageAssembler};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("a deliberation turn is already streaming")]
    TurnInProgress,
}

/// Client side view of one deliberation: the session being discussed and
/// the transcript assembled from its streams.
#[derive(Debug, Clone, Default)]
pub struct CouncilState {
    pub session_id: Option<String>,
    pub case_facts: Option<Value>,
    pub messages: Vec<ChatMessage>,
    pub opinion: Option<Value>,
    pub is_streaming: bool,
}

impl CouncilState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Marks a turn as in flight and hands out an assembler over the
    /// transcript. Only one turn may stream at a time.
    pub fn begin_turn(&mut self) -> Result<MessageAssembler<'_>, StateError> {
        if self.is_streaming {
            return Err(StateError::TurnInProgress);
        }
        self.is_streaming = true;
        Ok(MessageAssembler::new(&mut self.messages))
    }

    pub fn finish_turn(&mut self) {
        self.is_streaming = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::StreamEvent;

    #[test]
    fn test_single_turn_at_a_time() {
        let mut state = CouncilState::new();
        {
            let mut assembler = state.begin_turn().unwrap();
            assembler.apply(StreamEvent::UserMessage {
                id: "u1".to_string(),
                content: "Mulai".to_string(),
            });
        }
        assert!(state.is_streaming);
        assert_eq!(state.begin_turn().err(), Some(StateError::TurnInProgress));

        state.finish_turn();
        assert!(state.begin_turn().is_ok());
        assert_eq!(state.messages.len(), 1);
    }

    #[test]
    fn test_reset_restores_initial_values() {
        let mut state = CouncilState {
            session_id: Some("s1".to_string()),
            case_facts: Some(serde_json::json!({"case_type": "narcotics"})),
            messages: vec![ChatMessage::from_user("u1", "halo")],
            opinion: Some(serde_json::json!({})),
            is_streaming: true,
        };
        state.reset();
        assert!(state.session_id.is_none());
        assert!(state.case_facts.is_none());
        assert!(state.messages.is_empty());
        assert!(state.opinion.is_none());
        assert!(!state.is_streaming);
    }
}

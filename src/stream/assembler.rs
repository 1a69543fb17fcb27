use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Citations, StreamEvent};

pub const USER_SENDER: &str = "user";
pub const USER_SENDER_NAME: &str = "Presiding Judge";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub id: String,
    pub sender: String,
    pub sender_name: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citations: Option<Citations>,
    /// True while chunks are still being appended.
    #[serde(default)]
    pub streaming: bool,
}

impl ChatMessage {
    pub fn from_user(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sender: USER_SENDER.to_string(),
            sender_name: USER_SENDER_NAME.to_string(),
            content: content.into(),
            timestamp: Utc::now(),
            citations: None,
            streaming: false,
        }
    }

    fn placeholder(agent_id: String, agent_name: String) -> Self {
        Self {
            id: format!("pending-{}", Uuid::now_v7()),
            sender: agent_id,
            sender_name: agent_name,
            content: String::new(),
            timestamp: Utc::now(),
            citations: None,
            streaming: true,
        }
    }

    pub fn is_from_user(&self) -> bool {
        self.sender == USER_SENDER
    }
}

/// What applying a single event did to the transcript.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    /// The message at this index was appended or changed.
    Updated(usize),
    Ignored,
    Done,
    Failed(String),
}

/// Rebuilds per-sender chat messages from stream events.
///
/// Each sender has at most one open message. Chunks and completions are
/// routed by sender, so interleaved agent streams never overwrite each other.
pub struct MessageAssembler<'a> {
    messages: &'a mut Vec<ChatMessage>,
    open: HashMap<String, usize>,
}

impl<'a> MessageAssembler<'a> {
    pub fn new(messages: &'a mut Vec<ChatMessage>) -> Self {
        Self {
            messages,
            open: HashMap::new(),
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.messages
    }

    pub fn apply(&mut self, event: StreamEvent) -> Applied {
        match event {
            StreamEvent::UserMessage { id, content } => {
                self.messages.push(ChatMessage::from_user(id, content));
                Applied::Updated(self.messages.len() - 1)
            }
            StreamEvent::AgentStart {
                agent_id,
                agent_name,
            } => {
                if let Some(previous) = self.open.remove(&agent_id) {
                    log::debug!("{} restarted before completing; closing previous message", agent_id);
                    self.messages[previous].streaming = false;
                }
                self.messages
                    .push(ChatMessage::placeholder(agent_id.clone(), agent_name));
                let index = self.messages.len() - 1;
                self.open.insert(agent_id, index);
                Applied::Updated(index)
            }
            StreamEvent::AgentChunk { agent_id, content } => match self.open.get(&agent_id) {
                Some(&index) => {
                    self.messages[index].content.push_str(&content);
                    Applied::Updated(index)
                }
                None => {
                    log::debug!("Ignoring chunk for {} with no open message", agent_id);
                    Applied::Ignored
                }
            },
            StreamEvent::AgentComplete {
                agent_id,
                message_id,
                citations,
            } => match self.open.remove(&agent_id) {
                Some(index) => {
                    let message = &mut self.messages[index];
                    message.id = message_id;
                    message.citations = citations.and_then(Citations::normalized);
                    message.streaming = false;
                    Applied::Updated(index)
                }
                None => {
                    log::debug!("Ignoring completion for {} with no open message", agent_id);
                    Applied::Ignored
                }
            },
            StreamEvent::Done => Applied::Done,
            StreamEvent::Error { message } => Applied::Failed(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start(agent: &str) -> StreamEvent {
        StreamEvent::AgentStart {
            agent_id: agent.to_string(),
            agent_name: format!("Judge {}", agent),
        }
    }

    fn complete(agent: &str, id: &str) -> StreamEvent {
        StreamEvent::AgentComplete {
            agent_id: agent.to_string(),
            message_id: id.to_string(),
            citations: None,
        }
    }

    #[test]
    fn test_chunks_accumulate_until_complete() {
        let mut messages = Vec::new();
        let mut assembler = MessageAssembler::new(&mut messages);

        assembler.apply(start("A"));
        assert!(assembler.messages()[0].streaming);
        assert!(assembler.messages()[0].id.starts_with("pending-"));

        assembler.apply(StreamEvent::chunk("A", "foo"));
        assembler.apply(StreamEvent::chunk("A", "bar"));
        assert_eq!(assembler.apply(complete("A", "m1")), Applied::Updated(0));
        assert!(!assembler.messages()[0].streaming);

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "foobar");
        assert_eq!(messages[0].id, "m1");
        assert!(!messages[0].streaming);
    }

    #[test]
    fn test_finalized_message_is_frozen() {
        let mut messages = Vec::new();
        let mut assembler = MessageAssembler::new(&mut messages);
        assembler.apply(start("A"));
        assembler.apply(StreamEvent::chunk("A", "done"));
        assembler.apply(complete("A", "m1"));

        assert_eq!(assembler.apply(StreamEvent::chunk("A", "late")), Applied::Ignored);
        assert_eq!(assembler.apply(complete("A", "m2")), Applied::Ignored);
        assert_eq!(messages[0].content, "done");
        assert_eq!(messages[0].id, "m1");
    }

    #[test]
    fn test_chunk_without_open_message_ignored() {
        let mut messages = Vec::new();
        let mut assembler = MessageAssembler::new(&mut messages);
        assert_eq!(assembler.apply(StreamEvent::chunk("ghost", "boo")), Applied::Ignored);
        assert!(messages.is_empty());
    }

    #[test]
    fn test_interleaved_senders_keep_their_text() {
        let mut messages = Vec::new();
        let mut assembler = MessageAssembler::new(&mut messages);
        assembler.apply(start("strict"));
        assembler.apply(start("humanist"));
        assembler.apply(StreamEvent::chunk("strict", "Pasal "));
        assembler.apply(StreamEvent::chunk("humanist", "Rehabilitasi "));
        assembler.apply(StreamEvent::chunk("strict", "112"));
        assembler.apply(complete("humanist", "h1"));
        assembler.apply(complete("strict", "s1"));

        assert_eq!(messages[0].sender, "strict");
        assert_eq!(messages[0].content, "Pasal 112");
        assert_eq!(messages[0].id, "s1");
        assert_eq!(messages[1].sender, "humanist");
        assert_eq!(messages[1].content, "Rehabilitasi ");
        assert_eq!(messages[1].id, "h1");
    }

    #[test]
    fn test_user_message_is_final() {
        let mut messages = Vec::new();
        let mut assembler = MessageAssembler::new(&mut messages);
        assembler.apply(StreamEvent::UserMessage {
            id: "u1".into(),
            content: "hi".into(),
        });
        assert!(messages[0].is_from_user());
        assert!(!messages[0].streaming);
        assert_eq!(messages[0].sender_name, USER_SENDER_NAME);
    }

    #[test]
    fn test_citations_attached_on_complete() {
        let mut messages = Vec::new();
        let mut assembler = MessageAssembler::new(&mut messages);
        assembler.apply(start("historian"));
        assembler.apply(StreamEvent::AgentComplete {
            agent_id: "historian".into(),
            message_id: "m9".into(),
            citations: Some(Citations::new(
                vec!["1/Pid.Sus/2021/PN Bdg".into(), "1/Pid.Sus/2021/PN Bdg".into()],
                vec![],
            )),
        });
        let citations = messages[0].citations.as_ref().unwrap();
        assert_eq!(citations.cases.len(), 1);
        assert!(citations.laws.is_empty());
    }

    #[test]
    fn test_terminal_events() {
        let mut messages = Vec::new();
        let mut assembler = MessageAssembler::new(&mut messages);
        assert_eq!(assembler.apply(StreamEvent::Done), Applied::Done);
        assert_eq!(
            assembler.apply(StreamEvent::error("model offline")),
            Applied::Failed("model offline".to_string())
        );
        assert!(messages.is_empty());
    }

    #[test]
    fn test_existing_transcript_is_extended() {
        let mut messages = vec![ChatMessage::from_user("u0", "earlier")];
        let mut assembler = MessageAssembler::new(&mut messages);
        assert_eq!(assembler.apply(start("strict")), Applied::Updated(1));
        assert_eq!(messages.len(), 2);
    }
}

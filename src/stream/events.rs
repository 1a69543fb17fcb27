use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    // Echo of the persisted user turn
    UserMessage {
        id: String,
        content: String,
    },

    // Agent lifecycle events
    AgentStart {
        agent_id: String,
        agent_name: String,
    },

    AgentChunk {
        agent_id: String,
        content: String,
    },

    AgentComplete {
        agent_id: String,
        message_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        citations: Option<Citations>,
    },

    // Terminal events
    Done,

    Error {
        message: String,
    },
}

impl StreamEvent {
    pub fn chunk(agent_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::AgentChunk {
            agent_id: agent_id.into(),
            content: content.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error { .. })
    }
}

/// Law articles and precedent cases referenced by a finalized agent message.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Citations {
    #[serde(default)]
    pub cases: Vec<String>,
    #[serde(default)]
    pub laws: Vec<String>,
}

impl Citations {
    pub fn new(cases: Vec<String>, laws: Vec<String>) -> Self {
        Self { cases, laws }
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty() && self.laws.is_empty()
    }

    /// Trims entries, drops blanks and repeated references (first occurrence
    /// wins). Returns `None` when nothing is left.
    pub fn normalized(self) -> Option<Self> {
        let normalized = Self {
            cases: dedup_trimmed(self.cases),
            laws: dedup_trimmed(self.laws),
        };
        if normalized.is_empty() {
            None
        } else {
            Some(normalized)
        }
    }
}

fn dedup_trimmed(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        let item = item.trim();
        if item.is_empty() || out.iter().any(|seen| seen == item) {
            continue;
        }
        out.push(item.to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_tags() {
        let event: StreamEvent = serde_json::from_str(
            r#"{"type":"agent_start","agent_id":"strict","agent_name":"Judge A"}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            StreamEvent::AgentStart {
                agent_id: "strict".to_string(),
                agent_name: "Judge A".to_string(),
            }
        );

        let done: StreamEvent = serde_json::from_str(r#"{"type":"done"}"#).unwrap();
        assert_eq!(done, StreamEvent::Done);
        assert_eq!(serde_json::to_string(&done).unwrap(), r#"{"type":"done"}"#);
    }

    #[test]
    fn test_complete_without_citations() {
        let event: StreamEvent = serde_json::from_str(
            r#"{"type":"agent_complete","agent_id":"strict","message_id":"m1"}"#,
        )
        .unwrap();
        match event {
            StreamEvent::AgentComplete { citations, .. } => assert!(citations.is_none()),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_citations_normalized() {
        let citations = Citations::new(
            vec![" 12/Pid.Sus/2020/PN Jkt ".into(), "12/Pid.Sus/2020/PN Jkt".into()],
            vec!["".into(), "Pasal 112".into()],
        );
        let normalized = citations.normalized().unwrap();
        assert_eq!(normalized.cases, vec!["12/Pid.Sus/2020/PN Jkt"]);
        assert_eq!(normalized.laws, vec!["Pasal 112"]);

        assert!(Citations::new(vec![" ".into()], vec![]).normalized().is_none());
    }
}

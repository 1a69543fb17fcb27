use super::StreamEvent;

const DATA_PREFIX: &str = "data: ";

/// Parses one line of the event stream.
///
/// Blank lines, `: ping` style comments and anything else without the
/// `data: ` prefix yield `None`. A payload that is not a valid event is
/// logged and dropped so one bad line never ends the turn.
pub fn parse_line(line: &str) -> Option<StreamEvent> {
    let payload = line.strip_prefix(DATA_PREFIX)?;

    match serde_json::from_str::<StreamEvent>(payload) {
        Ok(event) => Some(event),
        Err(e) => {
            log::warn!("Dropping malformed stream event ({}): {}", e, payload);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ignored_lines() {
        assert!(parse_line("").is_none());
        assert!(parse_line(": ping").is_none());
        assert!(parse_line("event: message").is_none());
        assert!(parse_line("data:{\"type\":\"done\"}").is_none());
    }

    #[test]
    fn test_data_line() {
        let event = parse_line(r#"data: {"type":"user_message","id":"u1","content":"hi"}"#);
        assert_eq!(
            event,
            Some(StreamEvent::UserMessage {
                id: "u1".to_string(),
                content: "hi".to_string(),
            })
        );
    }

    #[test]
    fn test_malformed_payload_dropped() {
        assert!(parse_line("data: {not json").is_none());
        assert!(parse_line(r#"data: {"type":"verdict"}"#).is_none());
    }
}

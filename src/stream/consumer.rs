use futures::{Stream, StreamExt};

use super::{parse_line, Applied, ChatMessage, MessageAssembler, StreamError};
use crate::cancel::CancellationToken;

/// Drives one deliberation turn: reads lines, parses events and applies them
/// to the transcript until `done`, an error, cancellation or end of stream.
///
/// `on_update` sees every message, with its index in the transcript, as it
/// is appended or grows. Messages already appended stay in place when the
/// turn fails.
pub async fn drive<S>(
    lines: S,
    assembler: &mut MessageAssembler<'_>,
    cancel: &CancellationToken,
    mut on_update: impl FnMut(usize, &ChatMessage),
) -> Result<(), StreamError>
where
    S: Stream<Item = Result<String, StreamError>>,
{
    let mut lines = std::pin::pin!(lines);

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StreamError::Cancelled),
            line = lines.next() => line,
        };

        let line = match next {
            Some(line) => line?,
            // Stream ended without an explicit `done`
            None => return Ok(()),
        };

        let Some(event) = parse_line(&line) else {
            continue;
        };

        match assembler.apply(event) {
            Applied::Updated(index) => on_update(index, &assembler.messages()[index]),
            Applied::Ignored => {}
            Applied::Done => return Ok(()),
            Applied::Failed(message) => return Err(StreamError::Remote(message)),
        }
    }
}

/// Callback flavour of [`drive`]: exactly one of `on_complete` or `on_error`
/// runs, exactly once.
pub async fn run_turn<S>(
    lines: S,
    assembler: &mut MessageAssembler<'_>,
    cancel: &CancellationToken,
    on_update: impl FnMut(usize, &ChatMessage),
    on_complete: impl FnOnce(),
    on_error: impl FnOnce(StreamError),
) where
    S: Stream<Item = Result<String, StreamError>>,
{
    let result = drive(lines, assembler, cancel, on_update).await;
    settle(result, on_complete, on_error);
}

/// Hands the outcome of a turn to one of the callbacks.
pub fn settle(
    result: Result<(), StreamError>,
    on_complete: impl FnOnce(),
    on_error: impl FnOnce(StreamError),
) {
    match result {
        Ok(()) => on_complete(),
        Err(e) => {
            log::warn!("Deliberation stream ended with error: {}", e);
            on_error(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::lines;
    use futures::stream;
    use std::cell::Cell;

    const SCENARIO: &str = "data: {\"type\":\"user_message\",\"id\":\"u1\",\"content\":\"hi\"}\n\n\
data: {\"type\":\"agent_start\",\"agent_id\":\"strict\",\"agent_name\":\"Judge A\"}\n\n\
data: {\"type\":\"agent_chunk\",\"agent_id\":\"strict\",\"content\":\"Hello\"}\n\n\
data: {\"type\":\"agent_complete\",\"agent_id\":\"strict\",\"message_id\":\"m1\"}\n\n\
data: {\"type\":\"done\"}\n";

    fn body(
        chunks: Vec<Vec<u8>>,
    ) -> impl Stream<Item = Result<String, StreamError>> {
        lines(stream::iter(
            chunks.into_iter().map(Ok::<Vec<u8>, std::io::Error>),
        ))
    }

    fn chunked(input: &str, size: usize) -> Vec<Vec<u8>> {
        input.as_bytes().chunks(size).map(|c| c.to_vec()).collect()
    }

    struct Outcome {
        messages: Vec<ChatMessage>,
        completed: usize,
        errors: Vec<String>,
    }

    async fn run(chunks: Vec<Vec<u8>>, cancel: &CancellationToken) -> Outcome {
        let mut messages = Vec::new();
        let completed = Cell::new(0);
        let errors = std::cell::RefCell::new(Vec::new());
        {
            let mut assembler = MessageAssembler::new(&mut messages);
            run_turn(
                body(chunks),
                &mut assembler,
                cancel,
                |_, _| {},
                || completed.set(completed.get() + 1),
                |e| errors.borrow_mut().push(e.to_string()),
            )
            .await;
        }
        Outcome {
            messages,
            completed: completed.get(),
            errors: errors.into_inner(),
        }
    }

    #[tokio::test]
    async fn test_scenario_transcript() {
        let outcome = run(chunked(SCENARIO, SCENARIO.len()), &CancellationToken::new()).await;

        assert_eq!(outcome.completed, 1);
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.messages.len(), 2);
        assert_eq!(outcome.messages[0].sender, "user");
        assert_eq!(outcome.messages[0].content, "hi");
        assert_eq!(outcome.messages[1].sender, "strict");
        assert_eq!(outcome.messages[1].id, "m1");
        assert_eq!(outcome.messages[1].content, "Hello");
    }

    #[tokio::test]
    async fn test_scenario_independent_of_chunking() {
        let cancel = CancellationToken::new();
        let reference = run(chunked(SCENARIO, SCENARIO.len()), &cancel).await;
        for size in [1, 2, 3, 7, 16, 61] {
            let outcome = run(chunked(SCENARIO, size), &cancel).await;
            let contents: Vec<_> = outcome.messages.iter().map(|m| (&m.sender, &m.id, &m.content)).collect();
            let expected: Vec<_> = reference.messages.iter().map(|m| (&m.sender, &m.id, &m.content)).collect();
            assert_eq!(contents, expected, "chunk size {}", size);
            assert_eq!(outcome.completed, 1);
        }
    }

    #[tokio::test]
    async fn test_keepalive_and_malformed_lines_skipped() {
        let input = ": ping\n\n\
data: {not json\n\
data: {\"type\":\"agent_start\",\"agent_id\":\"humanist\",\"agent_name\":\"Judge B\"}\n\
: ping\n\
data: {\"type\":\"agent_chunk\",\"agent_id\":\"humanist\",\"content\":\"ok\"}\n";
        let outcome = run(chunked(input, 5), &CancellationToken::new()).await;

        assert_eq!(outcome.completed, 1);
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.messages.len(), 1);
        assert_eq!(outcome.messages[0].content, "ok");
        // No completion event arrived, so the message is still open
        assert!(outcome.messages[0].streaming);
    }

    #[tokio::test]
    async fn test_final_event_without_newline() {
        let input = "data: {\"type\":\"user_message\",\"id\":\"u1\",\"content\":\"last\"}";
        let outcome = run(chunked(input, 4), &CancellationToken::new()).await;
        assert_eq!(outcome.messages.len(), 1);
        assert_eq!(outcome.completed, 1);
    }

    #[tokio::test]
    async fn test_transport_error_reported_once() {
        let mut messages = Vec::new();
        let completed = Cell::new(0);
        let errors = Cell::new(0);
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> = vec![
            Ok(b"data: {\"type\":\"agent_start\",\"agent_id\":\"strict\",\"agent_name\":\"A\"}\n".to_vec()),
            Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "connection closed")),
        ];
        {
            let mut assembler = MessageAssembler::new(&mut messages);
            run_turn(
                lines(stream::iter(chunks)),
                &mut assembler,
                &CancellationToken::new(),
                |_, _| {},
                || completed.set(completed.get() + 1),
                |e| {
                    assert!(matches!(e, StreamError::Io(_)));
                    errors.set(errors.get() + 1)
                },
            )
            .await;
        }
        assert_eq!(completed.get(), 0);
        assert_eq!(errors.get(), 1);
        // Partial transcript is kept
        assert_eq!(messages.len(), 1);
    }

    #[tokio::test]
    async fn test_remote_error_event() {
        let input = "data: {\"type\":\"error\",\"message\":\"model offline\"}\n\
data: {\"type\":\"done\"}\n";
        let outcome = run(chunked(input, input.len()), &CancellationToken::new()).await;
        assert_eq!(outcome.completed, 0);
        assert_eq!(outcome.errors, vec!["deliberation failed: model offline"]);
    }

    #[tokio::test]
    async fn test_events_after_done_not_applied() {
        let input = "data: {\"type\":\"done\"}\n\
data: {\"type\":\"user_message\",\"id\":\"u2\",\"content\":\"late\"}\n";
        let outcome = run(chunked(input, 3), &CancellationToken::new()).await;
        assert_eq!(outcome.completed, 1);
        assert!(outcome.messages.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_turn_reports_error() {
        let cancel = CancellationToken::new();
        cancel.cancel().await;
        let pending = lines(stream::pending::<Result<Vec<u8>, std::io::Error>>());

        let mut messages = Vec::new();
        let mut assembler = MessageAssembler::new(&mut messages);
        let result = drive(pending, &mut assembler, &cancel, |_, _| {}).await;
        assert!(matches!(result, Err(StreamError::Cancelled)));
    }

    #[tokio::test]
    async fn test_updates_observed() {
        let mut messages = Vec::new();
        let mut seen = Vec::new();
        {
            let mut assembler = MessageAssembler::new(&mut messages);
            drive(
                body(chunked(SCENARIO, 9)),
                &mut assembler,
                &CancellationToken::new(),
                |i, m| seen.push((i, m.content.clone())),
            )
            .await
            .unwrap();
        }
        let expected = [(0, "hi"), (1, ""), (1, "Hello"), (1, "Hello")];
        let expected: Vec<(usize, String)> =
            expected.iter().map(|(i, c)| (*i, c.to_string())).collect();
        assert_eq!(seen, expected);
    }
}

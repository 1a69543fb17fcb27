use futures::{Stream, StreamExt};

use super::StreamError;

/// Incremental UTF-8 decoder and `\n` splitter.
///
/// Bytes are pushed in whatever chunks the transport delivers. Complete lines
/// come back immediately; a trailing fragment (and any partial multi-byte
/// sequence) is carried over to the next push.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
    text: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        self.decode_pending();

        let mut lines = Vec::new();
        while let Some(pos) = self.text.find('\n') {
            let line: String = self.text.drain(..=pos).collect();
            lines.push(trim_line_ending(line));
        }
        lines
    }

    /// Flushes the carry-over at end of stream. Returns the last line when the
    /// body did not end with a newline.
    pub fn finish(&mut self) -> Option<String> {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.text.push_str(&String::from_utf8_lossy(&rest));
        }
        let rest = std::mem::take(&mut self.text);
        if rest.is_empty() {
            None
        } else {
            Some(trim_line_ending(rest))
        }
    }

    fn decode_pending(&mut self) {
        let mut start = 0;
        loop {
            let rest = &self.pending[start..];
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    self.text.push_str(valid);
                    self.pending.clear();
                    return;
                }
                Err(e) => {
                    let valid_up_to = e.valid_up_to();
                    self.text
                        .push_str(&String::from_utf8_lossy(&rest[..valid_up_to]));
                    match e.error_len() {
                        // Incomplete sequence at the end: wait for more bytes
                        None => {
                            self.pending.drain(..start + valid_up_to);
                            return;
                        }
                        Some(invalid) => {
                            self.text.push(char::REPLACEMENT_CHARACTER);
                            start += valid_up_to + invalid;
                        }
                    }
                }
            }
        }
    }
}

fn trim_line_ending(mut line: String) -> String {
    if line.ends_with('\n') {
        line.pop();
    }
    if line.ends_with('\r') {
        line.pop();
    }
    line
}

/// Turns a response body into a lazy sequence of decoded lines.
///
/// A read error ends the sequence with that error; nothing is retried here.
pub fn lines<S, B, E>(body: S) -> impl Stream<Item = Result<String, StreamError>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<StreamError>,
{
    async_stream::try_stream! {
        let mut body = std::pin::pin!(body);
        let mut buffer = LineBuffer::new();

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(Into::<StreamError>::into)?;
            for line in buffer.push(chunk.as_ref()) {
                yield line;
            }
        }

        if let Some(last) = buffer.finish() {
            yield last;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn split_all(input: &[u8], chunk_size: usize) -> Vec<String> {
        let mut buffer = LineBuffer::new();
        let mut out = Vec::new();
        for chunk in input.chunks(chunk_size) {
            out.extend(buffer.push(chunk));
        }
        out.extend(buffer.finish());
        out
    }

    #[test]
    fn test_split_lines() {
        let mut buffer = LineBuffer::new();
        assert_eq!(buffer.push(b"one\ntwo\n\nthr"), vec!["one", "two", ""]);
        assert_eq!(buffer.push(b"ee\n"), vec!["three"]);
        assert_eq!(buffer.finish(), None);
    }

    #[test]
    fn test_trailing_fragment_flushed() {
        let mut buffer = LineBuffer::new();
        assert!(buffer.push(b"data: {\"type\":\"done\"}").is_empty());
        assert_eq!(buffer.finish().as_deref(), Some("data: {\"type\":\"done\"}"));
    }

    #[test]
    fn test_crlf_endings() {
        let mut buffer = LineBuffer::new();
        assert_eq!(buffer.push(b"a\r\nb\r\n"), vec!["a", "b"]);
    }

    #[test]
    fn test_chunk_boundaries_do_not_matter() {
        let input = "data: {\"type\":\"agent_chunk\",\"agent_id\":\"strict\",\"content\":\"Pasal 112 — ayat (1) ⚖️\"}\n\n: ping\ndata: {\"type\":\"done\"}"
            .as_bytes();
        let whole = split_all(input, input.len());
        for size in 1..input.len() {
            assert_eq!(split_all(input, size), whole, "chunk size {}", size);
        }
    }

    #[test]
    fn test_multibyte_split_across_reads() {
        let text = "é⚖";
        let bytes = text.as_bytes();
        let mut buffer = LineBuffer::new();
        assert!(buffer.push(&bytes[..1]).is_empty());
        assert!(buffer.push(&bytes[1..3]).is_empty());
        assert_eq!(buffer.push(&[&bytes[3..], b"\n".as_slice()].concat()), vec![text]);
    }

    #[test]
    fn test_invalid_bytes_replaced() {
        let mut buffer = LineBuffer::new();
        assert_eq!(buffer.push(b"a\xffb\n"), vec!["a\u{FFFD}b"]);
    }

    #[tokio::test]
    async fn test_lines_stream() {
        let chunks: Vec<Result<&'static [u8], std::io::Error>> =
            vec![Ok(&b"first\nsec"[..]), Ok(&b"ond\nlast"[..])];
        let collected: Vec<String> = lines(stream::iter(chunks))
            .map(|line| line.unwrap())
            .collect()
            .await;
        assert_eq!(collected, vec!["first", "second", "last"]);
    }

    #[tokio::test]
    async fn test_read_error_ends_sequence() {
        let chunks: Vec<Result<&'static [u8], std::io::Error>> = vec![
            Ok(&b"first\n"[..]),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
            Ok(&b"never\n"[..]),
        ];
        let mut lines = std::pin::pin!(lines(stream::iter(chunks)));
        assert_eq!(lines.next().await.unwrap().unwrap(), "first");
        assert!(matches!(lines.next().await, Some(Err(StreamError::Io(_)))));
        assert!(lines.next().await.is_none());
    }

    #[tokio::test]
    async fn test_lines_from_bytes_chunks() {
        use bytes::Bytes;

        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"data: {\"type\":\"do")),
            Ok(Bytes::from_static(b"ne\"}\n\n")),
        ];
        let mut lines = std::pin::pin!(lines(stream::iter(chunks)));
        let first = tokio_test::assert_ok!(lines.next().await.unwrap());
        assert_eq!(first, "data: {\"type\":\"done\"}");
        assert_eq!(tokio_test::assert_ok!(lines.next().await.unwrap()), "");
        assert!(lines.next().await.is_none());
    }
}

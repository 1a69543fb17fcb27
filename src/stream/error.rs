use thiserror::Error;

/// Failures that end a streamed deliberation turn. Exactly one of these (or
/// a completion) is reported per turn.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("server responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("response has no body")]
    MissingBody,

    #[error("stream read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("deliberation failed: {0}")]
    Remote(String),

    #[error("stream cancelled")]
    Cancelled,
}

impl StreamError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

use serde::Serialize;
use serde_json::Value;

use crate::cancel::CancellationToken;
use crate::handlers::REQUEST_ID_HEADER;
use crate::models::{
    CreateSessionRequest, GenerateOpinionRequest, ListSessionsQuery, MessagesQuery,
    SearchCasesRequest, SendMessageRequest, StatisticsQuery,
};
use crate::stream::{drive, lines, settle, ChatMessage, MessageAssembler, StreamError};

const API_PREFIX: &str = "/api/v1";

/// HTTP client for the deliberation server.
#[derive(Debug, Clone)]
pub struct CouncilClient {
    http: reqwest::Client,
    base_url: String,
}

impl CouncilClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, API_PREFIX, path)
    }

    /// Sends one turn and assembles the streamed answers into the
    /// assembler's transcript. Returns once the server says `done`, the body
    /// ends, the turn fails or `cancel` fires.
    pub async fn send_message_stream(
        &self,
        session_id: &str,
        request: &SendMessageRequest,
        assembler: &mut MessageAssembler<'_>,
        on_update: impl FnMut(usize, &ChatMessage),
        cancel: &CancellationToken,
    ) -> Result<(), StreamError> {
        let send = self
            .http
            .post(self.url(&format!("/sessions/{}/messages/stream", session_id)))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(request)
            .send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StreamError::Cancelled),
            response = send => response?,
        };

        let response = check_status(response).await?;
        if response.content_length() == Some(0) {
            return Err(StreamError::MissingBody);
        }
        if let Some(request_id) = response.headers().get(REQUEST_ID_HEADER) {
            log::debug!("Streaming turn {:?}", request_id);
        }

        drive(lines(response.bytes_stream()), assembler, cancel, on_update).await
    }

    /// Callback flavour of [`Self::send_message_stream`]. A refused request,
    /// an error status or an empty body reach `on_error` the same way a
    /// broken stream does. Exactly one of `on_complete` or `on_error` runs.
    #[allow(clippy::too_many_arguments)]
    pub async fn stream_turn(
        &self,
        session_id: &str,
        request: &SendMessageRequest,
        assembler: &mut MessageAssembler<'_>,
        cancel: &CancellationToken,
        on_update: impl FnMut(usize, &ChatMessage),
        on_complete: impl FnOnce(),
        on_error: impl FnOnce(StreamError),
    ) {
        let result = self
            .send_message_stream(session_id, request, assembler, on_update, cancel)
            .await;
        settle(result, on_complete, on_error);
    }

    /// Asks the server to stop a running turn.
    pub async fn cancel_stream(&self, request_id: &str) -> Result<Value, StreamError> {
        let response = self
            .http
            .delete(self.url(&format!("/streams/{}", request_id)))
            .send()
            .await?;
        read_json(response).await
    }

    pub async fn create_session(&self, request: &CreateSessionRequest) -> Result<Value, StreamError> {
        self.post_json("/sessions", request).await
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Value, StreamError> {
        self.get_json(&format!("/sessions/{}", session_id), &()).await
    }

    pub async fn list_sessions(&self, query: &ListSessionsQuery) -> Result<Value, StreamError> {
        self.get_json("/sessions", query).await
    }

    /// Archives a session; it stays readable but accepts no more turns.
    pub async fn archive_session(&self, session_id: &str) -> Result<Value, StreamError> {
        let response = self
            .http
            .delete(self.url(&format!("/sessions/{}", session_id)))
            .send()
            .await?;
        read_json(response).await
    }

    pub async fn get_messages(
        &self,
        session_id: &str,
        query: &MessagesQuery,
    ) -> Result<Value, StreamError> {
        self.get_json(&format!("/sessions/{}/messages", session_id), query)
            .await
    }

    /// Drafts the legal opinion and concludes the session.
    pub async fn generate_opinion(
        &self,
        session_id: &str,
        request: &GenerateOpinionRequest,
    ) -> Result<Value, StreamError> {
        self.post_json(&format!("/sessions/{}/opinion", session_id), request)
            .await
    }

    pub async fn search_cases(&self, request: &SearchCasesRequest) -> Result<Value, StreamError> {
        self.post_json("/cases/search", request).await
    }

    pub async fn get_case(&self, case_id: &str) -> Result<Value, StreamError> {
        self.get_json(&format!("/cases/{}", case_id), &()).await
    }

    pub async fn case_statistics(&self, query: &StatisticsQuery) -> Result<Value, StreamError> {
        self.get_json("/cases/statistics", query).await
    }

    async fn get_json<Q: Serialize + ?Sized>(&self, path: &str, query: &Q) -> Result<Value, StreamError> {
        let response = self.http.get(self.url(path)).query(query).send().await?;
        read_json(response).await
    }

    async fn post_json<B: Serialize>(&self, path: &str, body: &B) -> Result<Value, StreamError> {
        let response = self.http.post(self.url(path)).json(body).send().await?;
        read_json(response).await
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, StreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StreamError::Status {
        status: status.as_u16(),
        body,
    })
}

async fn read_json(response: reqwest::Response) -> Result<Value, StreamError> {
    Ok(check_status(response).await?.json::<Value>().await?)
}

use futures::{Stream, StreamExt};
use rig::completion::CompletionModel;
use rig::prelude::CompletionClient;
use rig::providers::ollama;
use rig::streaming::StreamedAssistantContent;
use std::fmt::Display;
use tokio::sync::mpsc;

use crate::cancel::CancellationToken;
use crate::models::AgentId;
use crate::stream::StreamEvent;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub const APOLOGY: &str =
    "Mohon maaf, saya mengalami kendala dalam merumuskan pendapat saya. Silakan coba lagi.";

/// One judge answering one turn.
pub struct DeliberationAgent {
    client: ollama::Client,
    model: String,
    agent_id: AgentId,
    event_tx: mpsc::Sender<StreamEvent>,
}

impl DeliberationAgent {
    pub fn new(
        client: ollama::Client,
        model: impl Into<String>,
        agent_id: AgentId,
        event_tx: mpsc::Sender<StreamEvent>,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            agent_id,
            event_tx,
        }
    }

    /// Streams the judge's answer token by token and returns the full text.
    /// A model that cannot be reached is reported to the chamber as an apology.
    pub async fn execute(&self, prompt: &str, cancel: &CancellationToken) -> Result<String, BoxError> {
        let model = self.client.completion_model(self.model.as_str());
        let request = model
            .completion_request(prompt)
            .preamble(self.agent_id.system_prompt());

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err("Deliberation cancelled".into()),
            response = request.stream() => response,
        };

        match response {
            Ok(response) => {
                let tokens = response.filter_map(|item| futures::future::ready(text_delta(item)));
                forward_tokens(tokens, &self.event_tx, self.agent_id, cancel).await
            }
            Err(e) => {
                log::error!("{} failed to open a completion stream: {}", self.agent_id.name(), e);
                forward_tokens(
                    futures::stream::empty::<Result<String, BoxError>>(),
                    &self.event_tx,
                    self.agent_id,
                    cancel,
                )
                .await
            }
        }
    }
}

fn text_delta<R, E>(item: Result<StreamedAssistantContent<R>, E>) -> Option<Result<String, E>>
where
    R: Clone + Unpin,
{
    match item {
        Ok(StreamedAssistantContent::Text(text)) => Some(Ok(text.text)),
        Ok(_) => None,
        Err(e) => Some(Err(e)),
    }
}

/// Sends every token as an `agent_chunk` and returns what was said.
///
/// A model error before the first token becomes the apology; an error after
/// it ends the answer with what was already streamed.
pub async fn forward_tokens<S, E>(
    tokens: S,
    event_tx: &mpsc::Sender<StreamEvent>,
    agent_id: AgentId,
    cancel: &CancellationToken,
) -> Result<String, BoxError>
where
    S: Stream<Item = Result<String, E>>,
    E: Display,
{
    let mut tokens = std::pin::pin!(tokens);
    let mut text = String::new();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err("Deliberation cancelled".into()),
            next = tokens.next() => next,
        };

        match next {
            Some(Ok(token)) if token.is_empty() => {}
            Some(Ok(token)) => {
                send_chunk(event_tx, agent_id, &token).await?;
                text.push_str(&token);
            }
            Some(Err(e)) => {
                log::warn!("{} stream broke off: {}", agent_id.name(), e);
                break;
            }
            None => break,
        }
    }

    if text.trim().is_empty() {
        send_chunk(event_tx, agent_id, APOLOGY).await?;
        text = APOLOGY.to_string();
    }
    Ok(text)
}

async fn send_chunk(
    event_tx: &mpsc::Sender<StreamEvent>,
    agent_id: AgentId,
    content: &str,
) -> Result<(), BoxError> {
    event_tx
        .send(StreamEvent::chunk(agent_id.as_ref(), content))
        .await
        .map_err(|_| "Stream receiver closed".into())
}

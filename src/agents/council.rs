use rig::providers::ollama;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::agents::citations::extract_citations;
use crate::agents::deliberation_agent::DeliberationAgent;
use crate::agents::orchestrator::{build_case_summary, build_prompt, AgentContext, Orchestrator};
use crate::cancel::{CancellationToken, RequestManager};
use crate::db::{self, NewMessage};
use crate::error::AppError;
use crate::models::{AgentId, DeliberationSession, SendMessageRequest};
use crate::stream::StreamEvent;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const HISTORY_LIMIT: i64 = 50;
pub const SIMILAR_CASES_LIMIT: usize = 5;

/// Runs deliberation turns: picks the judges, streams their answers and
/// stores the transcript.
pub struct Council {
    client: ollama::Client,
    chat_model: String,
    orchestrator: Orchestrator,
    request_manager: Arc<RequestManager>,
}

impl Council {
    pub fn new(client: ollama::Client, chat_model: &str) -> Result<Self, AppError> {
        let orchestrator = Orchestrator::new()
            .map_err(|e| AppError::internal(format!("Trigger matcher: {}", e)))?;

        Ok(Self {
            client,
            chat_model: chat_model.to_string(),
            orchestrator,
            request_manager: Arc::new(RequestManager::new()),
        })
    }

    pub fn request_manager(&self) -> &RequestManager {
        &self.request_manager
    }

    /// Starts a turn in the background. Returns the request id that
    /// `cancel_request` accepts and the receiving end of the event stream.
    pub async fn handle_turn_stream(
        self: Arc<Self>,
        db: PgPool,
        session: DeliberationSession,
        request: SendMessageRequest,
    ) -> (String, mpsc::Receiver<StreamEvent>) {
        let (tx, rx) = mpsc::channel(100);

        let request_id = Uuid::now_v7().to_string();
        let cancellation_token = self.request_manager.register(request_id.clone()).await;

        let id = request_id.clone();
        tokio::spawn(async move {
            log::info!("Turn {} started for session {}", id, session.id);

            let result = self
                .process_turn(&db, &session, &request, &cancellation_token, &tx)
                .await;

            let cancelled = cancellation_token.is_cancelled().await;
            let final_event = match result {
                Ok(()) => StreamEvent::Done,
                Err(_) if cancelled => {
                    log::info!("Turn {} cancelled", id);
                    StreamEvent::error("Deliberation cancelled")
                }
                Err(e) => {
                    log::error!("Turn {} failed: {}", id, e);
                    StreamEvent::error(e.to_string())
                }
            };
            let _ = tx.send(final_event).await;

            self.request_manager.unregister(&id).await;
        });

        (request_id, rx)
    }

    async fn process_turn(
        &self,
        db: &PgPool,
        session: &DeliberationSession,
        request: &SendMessageRequest,
        cancel: &CancellationToken,
        event_tx: &mpsc::Sender<StreamEvent>,
    ) -> Result<(), BoxError> {
        let intent = request.intent.map(|i| i.to_string());
        let user_message = db::create_message(
            db,
            NewMessage::user(session.id, &request.content, intent.as_deref()),
        )
        .await?;

        send(
            event_tx,
            StreamEvent::UserMessage {
                id: user_message.id.to_string(),
                content: user_message.content.clone(),
            },
        )
        .await?;

        let history = db::get_messages(db, session.id, HISTORY_LIMIT, None).await?;
        let parsed_case = session.parsed_case();
        let similar_cases =
            db::get_similar_cases(db, &session.similar_case_ids, SIMILAR_CASES_LIMIT).await;
        let statistics = match &parsed_case {
            Some(case) => match db::get_case_statistics(db, Some(case.case_type)).await {
                Ok(stats) => Some(stats),
                Err(e) => {
                    log::warn!("Case statistics unavailable: {}", e);
                    None
                }
            },
            None => None,
        };

        let agents =
            self.orchestrator
                .responding_agents(&request.content, request.target_agent, &history);
        log::info!("Agents responding: {:?}", agents);

        let context = AgentContext {
            case_summary: build_case_summary(parsed_case.as_ref()),
            similar_cases: &similar_cases,
            statistics: statistics.as_ref(),
            history: &history,
            user_message: &request.content,
        };
        let prompt = build_prompt(&context);

        for agent_id in agents {
            cancel.check().await?;

            send(
                event_tx,
                StreamEvent::AgentStart {
                    agent_id: agent_id.to_string(),
                    agent_name: agent_id.name().to_string(),
                },
            )
            .await?;

            let agent = DeliberationAgent::new(
                self.client.clone(),
                &self.chat_model,
                agent_id,
                event_tx.clone(),
            );
            let content = agent.execute(&prompt, cancel).await?;

            let citations = extract_citations(&content);
            let stored = db::create_message(
                db,
                NewMessage::agent(
                    session.id,
                    agent_id,
                    &content,
                    &citations.cases,
                    &citations.laws,
                ),
            )
            .await?;

            send(event_tx, complete_event(agent_id, stored.id, citations.normalized())).await?;
        }

        Ok(())
    }

    pub async fn cancel_request(&self, request_id: &str) -> bool {
        self.request_manager.cancel(request_id).await
    }
}

fn complete_event(
    agent_id: AgentId,
    message_id: Uuid,
    citations: Option<crate::stream::Citations>,
) -> StreamEvent {
    StreamEvent::AgentComplete {
        agent_id: agent_id.to_string(),
        message_id: message_id.to_string(),
        citations,
    }
}

async fn send(tx: &mpsc::Sender<StreamEvent>, event: StreamEvent) -> Result<(), BoxError> {
    tx.send(event)
        .await
        .map_err(|_| "Stream receiver closed".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::Citations;

    #[test]
    fn test_complete_event_shape() {
        let id = Uuid::now_v7();
        let citations = Citations::new(vec![], vec!["Pasal 127".to_string()]).normalized();
        let event = complete_event(AgentId::Strict, id, citations);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "agent_complete");
        assert_eq!(json["agent_id"], "strict");
        assert_eq!(json["message_id"], id.to_string());
        assert_eq!(json["citations"]["laws"][0], "Pasal 127");
    }

    #[test]
    fn test_complete_event_without_citations() {
        let event = complete_event(AgentId::Historian, Uuid::now_v7(), None);
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("citations"));
    }

    #[tokio::test]
    async fn test_send_fails_when_receiver_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        assert!(send(&tx, StreamEvent::Done).await.is_err());
    }

    #[tokio::test]
    async fn test_council_builds_from_client() {
        let client = ollama::Client::builder()
            .api_key(rig::client::Nothing)
            .base_url("http://127.0.0.1:11434")
            .build()
            .unwrap();
        let council = Council::new(client, "llama3.2").unwrap();
        assert_eq!(council.request_manager().active_count().await, 0);
        assert!(!council.cancel_request("missing").await);
    }
}

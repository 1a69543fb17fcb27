use axum::{
    extract::{Path, Query, State},
    http::HeaderValue,
    response::{
        sse::{Event, KeepAlive},
        IntoResponse, Response, Sse,
    },
    Json,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use uuid::Uuid;

use crate::agents::council::SIMILAR_CASES_LIMIT;
use crate::agents::orchestrator::initial_message_content;
use crate::db::{self, NewMessage};
use crate::embeddings::build_search_text;
use crate::error::*;
use crate::models::*;
use crate::stream::StreamEvent;
use crate::AppState;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

const DEFAULT_MESSAGE_LIMIT: i64 = 50;
const MAX_MESSAGE_LIMIT: i64 = 200;
const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;
const OPINION_TRANSCRIPT_LIMIT: i64 = 100;
const MAX_SEARCH_LIMIT: i64 = 100;

// ============================================================================
// RESPONSE TYPES
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct CancelResponse {
    pub success: bool,
    pub request_id: String,
    pub message: String,
}

// ============================================================================
// HEALTH
// ============================================================================

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthStatus> {
    Json(HealthStatus::new(db::ping(&state.db).await))
}

// ============================================================================
// SESSIONS
// ============================================================================

/// POST /api/v1/sessions
pub async fn create_session_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<Json<CreateSessionResponse>> {
    if request.case_summary.trim().is_empty() {
        return Err(AppError::validation("case_summary must not be empty"));
    }

    let parsed_case = state
        .case_parser
        .parse(
            &request.case_summary,
            request.case_type,
            request.structured_data.as_ref(),
        )
        .await;

    let similar_cases = find_similar_cases(&state, &parsed_case).await;
    let similar_case_ids: Vec<String> = similar_cases.iter().map(|c| c.case_id.clone()).collect();

    let case_input = CaseInput {
        input_type: request.input_type,
        raw_input: request.case_summary.clone(),
        parsed_case: parsed_case.clone(),
    };
    let session_id = db::create_session(
        &state.db,
        None,
        &serde_json::to_value(&case_input)?,
        &similar_case_ids,
    )
    .await
    .context("Creating session")?;

    let content = initial_message_content(&parsed_case, similar_cases.len());
    let initial_message = db::create_message(&state.db, NewMessage::system(session_id, &content))
        .await
        .context("Storing opening message")?;

    Ok(Json(CreateSessionResponse {
        session_id,
        parsed_case,
        similar_cases,
        initial_message,
    }))
}

/// Nearest cases by embedding. Embedding or search failures leave the
/// session without precedents rather than failing it.
async fn find_similar_cases(state: &AppState, case: &ParsedCaseInput) -> Vec<SimilarCase> {
    let embedding = match state.embeddings.embed(&build_search_text(case)).await {
        Ok(embedding) => embedding,
        Err(e) => {
            log::warn!("Skipping similar case lookup: {}", e);
            return Vec::new();
        }
    };

    match db::search_cases_by_vector(
        &state.db,
        &embedding,
        None,
        state.search.vector_limit,
        state.search.min_similarity,
    )
    .await
    {
        Ok(records) => records
            .iter()
            .take(SIMILAR_CASES_LIMIT)
            .map(|r| r.to_similar_case("Vector similarity match"))
            .collect(),
        Err(e) => {
            log::warn!("Similar case search failed: {}", e);
            Vec::new()
        }
    }
}

async fn load_session(state: &AppState, session_id: Uuid) -> Result<DeliberationSession> {
    db::get_session(&state.db, session_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Session {}", session_id)))
}

fn page_bounds(query: &ListSessionsQuery) -> Result<(i64, i64)> {
    let page = query.page.unwrap_or(1);
    if page < 1 {
        return Err(AppError::validation("page must be at least 1"));
    }
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    if !(1..=MAX_PAGE_SIZE).contains(&limit) {
        return Err(AppError::validation(format!(
            "limit must be between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }
    Ok((page, limit))
}

/// GET /api/v1/sessions
pub async fn list_sessions_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListSessionsQuery>,
) -> Result<Json<ListSessionsResponse>> {
    let (page, limit) = page_bounds(&query)?;
    let (sessions, total) =
        db::list_sessions(&state.db, query.status.status(), page, limit).await?;
    Ok(Json(ListSessionsResponse {
        sessions,
        pagination: Pagination { total, page, limit },
    }))
}

/// GET /api/v1/sessions/{id}
pub async fn get_session_handler(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<DeliberationSession>> {
    let mut session = load_session(&state, session_id).await?;
    session.messages = db::get_messages(&state.db, session_id, MAX_MESSAGE_LIMIT, None).await?;
    session.legal_opinion = db::get_legal_opinion(&state.db, session_id).await?;
    Ok(Json(session))
}

/// DELETE /api/v1/sessions/{id}
pub async fn archive_session_handler(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<ArchiveSessionResponse>> {
    if !db::archive_session(&state.db, session_id).await? {
        return Err(AppError::not_found(format!("Session {}", session_id)));
    }
    Ok(Json(ArchiveSessionResponse {
        message: format!("Session {} archived", session_id),
    }))
}

fn message_limit(query: &MessagesQuery) -> Result<i64> {
    let limit = query.limit.unwrap_or(DEFAULT_MESSAGE_LIMIT);
    if !(1..=MAX_MESSAGE_LIMIT).contains(&limit) {
        return Err(AppError::validation(format!(
            "limit must be between 1 and {}",
            MAX_MESSAGE_LIMIT
        )));
    }
    Ok(limit)
}

/// GET /api/v1/sessions/{id}/messages
///
/// `before` pages backwards from a message id; an id that is not part of
/// the session yields an empty page.
pub async fn get_messages_handler(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<GetMessagesResponse>> {
    let limit = message_limit(&query)?;
    load_session(&state, session_id).await?;
    let messages = db::get_messages(&state.db, session_id, limit, query.before).await?;
    Ok(Json(GetMessagesResponse { messages }))
}

/// POST /api/v1/sessions/{id}/opinion
///
/// Drafts the legal opinion from the transcript, stores it and concludes
/// the session. Archived sessions are refused.
pub async fn generate_opinion_handler(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
    request: Option<Json<GenerateOpinionRequest>>,
) -> Result<Json<GenerateOpinionResponse>> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let session = load_session(&state, session_id).await?;
    if session.status == SessionStatus::Archived {
        return Err(AppError::session_inactive(session_id));
    }

    let messages =
        db::get_messages(&state.db, session_id, OPINION_TRANSCRIPT_LIMIT, None).await?;
    let parsed_case = session.parsed_case();
    let similar_cases =
        db::get_similar_cases(&state.db, &session.similar_case_ids, SIMILAR_CASES_LIMIT).await;

    let opinion = state
        .opinions
        .draft(
            session_id,
            parsed_case.as_ref(),
            &similar_cases,
            &messages,
            request.include_dissent,
        )
        .await;

    db::save_legal_opinion(&state.db, session_id, &opinion)
        .await
        .context("Storing legal opinion")?;
    db::update_session_status(&state.db, session_id, SessionStatus::Concluded).await?;

    Ok(Json(GenerateOpinionResponse { opinion }))
}

// ============================================================================
// SSE STREAM HANDLER
// ============================================================================

/// POST /api/v1/sessions/{id}/messages/stream
///
/// Streams one `data: {json}` line per `StreamEvent` until `done` or
/// `error`. The request id for cancellation is returned in `x-request-id`.
pub async fn message_stream_handler(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<SendMessageRequest>,
) -> Result<Response> {
    if request.content.trim().is_empty() {
        return Err(AppError::validation("content must not be empty"));
    }

    let session = load_session(&state, session_id).await?;
    if !session.is_active() {
        return Err(AppError::session_inactive(session_id));
    }

    let (request_id, mut rx) = state
        .council
        .clone()
        .handle_turn_stream(state.db.clone(), session, request)
        .await;

    let stream = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            let terminal = event.is_terminal();
            match serde_json::to_string(&event) {
                Ok(json_data) => yield Ok::<_, Infallible>(Event::default().data(json_data)),
                Err(e) => {
                    log::error!("Failed to serialize stream event: {}", e);
                    if let Ok(json_data) = serde_json::to_string(&StreamEvent::error("Serialization error")) {
                        yield Ok(Event::default().data(json_data));
                    }
                    break;
                }
            }
            if terminal {
                break;
            }
        }
    };

    let sse = Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(std::time::Duration::from_secs(15))
            .text("ping"),
    );

    let mut response = sse.into_response();
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    Ok(response)
}

// ============================================================================
// CANCEL HANDLER
// ============================================================================

/// DELETE /api/v1/streams/{request_id}
pub async fn cancel_stream_handler(
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<String>,
) -> Result<Json<CancelResponse>> {
    if state.council.cancel_request(&request_id).await {
        Ok(Json(CancelResponse {
            success: true,
            message: format!("Request {} cancelled successfully", request_id),
            request_id,
        }))
    } else {
        Err(AppError::not_found(format!("Request {}", request_id)))
    }
}

// ============================================================================
// CASES
// ============================================================================

/// POST /api/v1/cases/search
pub async fn search_cases_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SearchCasesRequest>,
) -> Result<Json<SearchCasesResponse>> {
    if request.query.trim().is_empty() {
        return Err(AppError::validation("query must not be empty"));
    }
    if !(1..=MAX_SEARCH_LIMIT).contains(&request.limit) {
        return Err(AppError::validation(format!(
            "limit must be between 1 and {}",
            MAX_SEARCH_LIMIT
        )));
    }

    let filters = request.filters.as_ref();
    let mut cases = Vec::new();

    if request.semantic_search {
        match state.embeddings.embed(&request.query).await {
            Ok(embedding) => {
                cases = db::search_cases_by_vector(
                    &state.db,
                    &embedding,
                    filters,
                    request.limit,
                    state.search.min_similarity,
                )
                .await?;
            }
            Err(e) => log::warn!("Semantic search unavailable, using text search: {}", e),
        }
    }

    if cases.is_empty() {
        cases = db::search_cases_by_text(&state.db, &request.query, filters, request.limit).await?;
    }

    let total = cases.len();
    Ok(Json(SearchCasesResponse { cases, total }))
}

/// GET /api/v1/cases/statistics
pub async fn case_statistics_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatisticsQuery>,
) -> Result<Json<CaseStatistics>> {
    let statistics = db::get_case_statistics(&state.db, query.case_type)
        .await
        .context("Computing case statistics")?;
    Ok(Json(statistics))
}

/// GET /api/v1/cases/{id}
pub async fn get_case_handler(
    State(state): State<Arc<AppState>>,
    Path(case_id): Path<String>,
) -> Result<Json<CaseRecord>> {
    db::get_case_by_id(&state.db, &case_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("Case {}", case_id)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limit(limit: Option<i64>) -> MessagesQuery {
        MessagesQuery { limit, before: None }
    }

    #[test]
    fn test_message_limit() {
        assert_eq!(message_limit(&limit(None)).unwrap(), 50);
        assert_eq!(message_limit(&limit(Some(200))).unwrap(), 200);
        assert!(message_limit(&limit(Some(0))).is_err());
        assert!(message_limit(&limit(Some(201))).is_err());
    }

    #[test]
    fn test_page_bounds() {
        let query = |page, limit| ListSessionsQuery {
            status: SessionStatusFilter::All,
            page,
            limit,
        };
        assert_eq!(page_bounds(&query(None, None)).unwrap(), (1, 20));
        assert_eq!(page_bounds(&query(Some(3), Some(100))).unwrap(), (3, 100));

        let err = page_bounds(&query(Some(0), None)).unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
        assert!(page_bounds(&query(Some(1), Some(0))).is_err());
        assert!(page_bounds(&query(Some(1), Some(101))).is_err());
    }

    #[test]
    fn test_list_query_from_url() {
        let uri: axum::http::Uri = "/api/v1/sessions?status=concluded&page=2&limit=5"
            .parse()
            .unwrap();
        let Query(query) = Query::<ListSessionsQuery>::try_from_uri(&uri).unwrap();
        assert_eq!(query.status.status(), Some(SessionStatus::Concluded));
        assert_eq!(page_bounds(&query).unwrap(), (2, 5));

        let uri: axum::http::Uri = "/api/v1/sessions/x/messages?before=0192a5d0-3c4e-7f00-8000-000000000001"
            .parse()
            .unwrap();
        let Query(query) = Query::<MessagesQuery>::try_from_uri(&uri).unwrap();
        assert!(query.before.is_some());
        assert_eq!(message_limit(&query).unwrap(), 50);
    }

    #[test]
    fn test_cancel_response_shape() {
        let response = CancelResponse {
            success: true,
            request_id: "r1".to_string(),
            message: "Request r1 cancelled successfully".to_string(),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["request_id"], "r1");
        assert_eq!(json["success"], true);
    }
}

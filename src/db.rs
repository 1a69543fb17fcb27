use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{
    AgentId, CaseRecord, CaseSearchFilters, CaseStatistics, CaseType, DeliberationMessage,
    DeliberationSession, LegalOpinionDraft, MessageSender, SentenceDistribution,
    SentencePercentiles, SessionStatus, SimilarCase, VerdictDistribution,
};

// ============================================================================
// Rows
// ============================================================================

#[derive(Debug, FromRow)]
struct SessionRow {
    id: Uuid,
    user_id: Option<String>,
    status: String,
    case_input: Value,
    similar_case_ids: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    concluded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, FromRow)]
struct MessageRow {
    id: Uuid,
    session_id: Uuid,
    sender_type: String,
    agent_id: Option<String>,
    content: String,
    intent: Option<String>,
    cited_cases: Vec<String>,
    cited_laws: Vec<String>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct CaseRow {
    id: Uuid,
    case_number: String,
    extraction_result: Option<Value>,
    extraction_confidence: Option<f64>,
    summary_en: Option<String>,
    summary_id: Option<String>,
    similarity: Option<f64>,
    created_at: DateTime<Utc>,
}

fn session_row_to_model(row: SessionRow) -> Result<DeliberationSession> {
    let status = row
        .status
        .parse::<SessionStatus>()
        .map_err(|_| AppError::internal(format!("Unknown session status '{}'", row.status)))?;
    Ok(DeliberationSession {
        id: row.id,
        user_id: row.user_id,
        status,
        case_input: row.case_input,
        similar_case_ids: row.similar_case_ids,
        messages: Vec::new(),
        legal_opinion: None,
        created_at: row.created_at,
        updated_at: row.updated_at,
        concluded_at: row.concluded_at,
    })
}

#[derive(Debug, FromRow)]
struct StatsRow {
    total_cases: i64,
    min_months: Option<i64>,
    max_months: Option<i64>,
    avg_months: Option<f64>,
    median_months: Option<f64>,
    p25: Option<f64>,
    p75: Option<f64>,
    guilty_count: i64,
    not_guilty_count: i64,
    acquitted_count: i64,
}

fn stats_row_to_model(row: StatsRow) -> CaseStatistics {
    if row.total_cases == 0 {
        return CaseStatistics::default();
    }
    let median = row.median_months.unwrap_or(0.0);
    CaseStatistics {
        total_cases: row.total_cases,
        sentence_distribution: SentenceDistribution {
            min_months: row.min_months.unwrap_or(0),
            max_months: row.max_months.unwrap_or(0),
            median_months: median,
            average_months: (row.avg_months.unwrap_or(0.0) * 100.0).round() / 100.0,
            percentiles: SentencePercentiles {
                p25: row.p25.unwrap_or(0.0),
                p50: median,
                p75: row.p75.unwrap_or(0.0),
            },
        },
        verdict_distribution: VerdictDistribution {
            guilty: row.guilty_count,
            not_guilty: row.not_guilty_count,
            rehabilitation: row.acquitted_count,
        },
    }
}

fn message_row_to_model(row: MessageRow) -> DeliberationMessage {
    DeliberationMessage {
        id: row.id,
        session_id: row.session_id,
        sender: MessageSender::from_columns(&row.sender_type, row.agent_id.as_deref()),
        content: row.content,
        intent: row.intent,
        cited_cases: row.cited_cases,
        cited_laws: row.cited_laws,
        timestamp: row.created_at,
    }
}

impl From<CaseRow> for CaseRecord {
    fn from(row: CaseRow) -> Self {
        Self {
            id: row.id,
            case_number: row.case_number,
            extraction_result: row.extraction_result,
            extraction_confidence: row.extraction_confidence,
            summary_en: row.summary_en,
            summary_id: row.summary_id,
            similarity: row.similarity,
            created_at: row.created_at,
        }
    }
}

/// Fields of a message about to be stored.
#[derive(Debug, Clone)]
pub struct NewMessage<'a> {
    pub session_id: Uuid,
    pub sender: MessageSender,
    pub content: &'a str,
    pub intent: Option<&'a str>,
    pub cited_cases: &'a [String],
    pub cited_laws: &'a [String],
}

impl<'a> NewMessage<'a> {
    pub fn user(session_id: Uuid, content: &'a str, intent: Option<&'a str>) -> Self {
        Self {
            session_id,
            sender: MessageSender::User,
            content,
            intent,
            cited_cases: &[],
            cited_laws: &[],
        }
    }

    pub fn system(session_id: Uuid, content: &'a str) -> Self {
        Self {
            sender: MessageSender::System,
            ..Self::user(session_id, content, None)
        }
    }

    pub fn agent(
        session_id: Uuid,
        agent_id: AgentId,
        content: &'a str,
        cited_cases: &'a [String],
        cited_laws: &'a [String],
    ) -> Self {
        Self {
            session_id,
            sender: MessageSender::Agent { agent_id },
            content,
            intent: Some("provide_analysis"),
            cited_cases,
            cited_laws,
        }
    }
}

// ============================================================================
// Sessions and messages
// ============================================================================

pub async fn create_session(
    db: &PgPool,
    user_id: Option<&str>,
    case_input: &Value,
    similar_case_ids: &[String],
) -> Result<Uuid> {
    let id = Uuid::now_v7();
    sqlx::query(
        r#"
        INSERT INTO deliberation_sessions
            (id, user_id, status, case_input, similar_case_ids, created_at, updated_at)
        VALUES ($1, $2, 'active', $3, $4, NOW(), NOW())
        "#,
    )
    .bind(id)
    .bind(user_id)
    .bind(case_input)
    .bind(similar_case_ids)
    .execute(db)
    .await?;

    log::info!("Created session {}", id);
    Ok(id)
}

pub async fn get_session(db: &PgPool, session_id: Uuid) -> Result<Option<DeliberationSession>> {
    let row = sqlx::query_as::<_, SessionRow>(
        r#"
        SELECT id, user_id, status, case_input, similar_case_ids,
               created_at, updated_at, concluded_at
        FROM deliberation_sessions
        WHERE id = $1
        "#,
    )
    .bind(session_id)
    .fetch_optional(db)
    .await?;

    row.map(session_row_to_model).transpose()
}

/// One page of sessions, newest first, and the total matching `status`.
pub async fn list_sessions(
    db: &PgPool,
    status: Option<SessionStatus>,
    page: i64,
    limit: i64,
) -> Result<(Vec<DeliberationSession>, i64)> {
    let status = status.map(|s| s.to_string());

    let total = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM deliberation_sessions WHERE ($1::text IS NULL OR status = $1)",
    )
    .bind(status.as_deref())
    .fetch_one(db)
    .await?;

    let rows = sqlx::query_as::<_, SessionRow>(
        r#"
        SELECT id, user_id, status, case_input, similar_case_ids,
               created_at, updated_at, concluded_at
        FROM deliberation_sessions
        WHERE ($1::text IS NULL OR status = $1)
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(status.as_deref())
    .bind(limit)
    .bind((page - 1).max(0) * limit)
    .fetch_all(db)
    .await?;

    let sessions = rows
        .into_iter()
        .map(session_row_to_model)
        .collect::<Result<Vec<_>>>()?;
    Ok((sessions, total))
}

/// Moves a session to `status`. Concluding stamps `concluded_at`.
/// Returns false when the session does not exist.
pub async fn update_session_status(
    db: &PgPool,
    session_id: Uuid,
    status: SessionStatus,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE deliberation_sessions
        SET status = $2,
            updated_at = NOW(),
            concluded_at = CASE WHEN $2 = 'concluded' THEN NOW() ELSE concluded_at END
        WHERE id = $1
        "#,
    )
    .bind(session_id)
    .bind(status.to_string())
    .execute(db)
    .await?;

    log::info!("Session {} is now {}", session_id, status);
    Ok(result.rows_affected() > 0)
}

pub async fn archive_session(db: &PgPool, session_id: Uuid) -> Result<bool> {
    update_session_status(db, session_id, SessionStatus::Archived).await
}

/// Stores a message and touches the session's `updated_at`.
pub async fn create_message(db: &PgPool, message: NewMessage<'_>) -> Result<DeliberationMessage> {
    let id = Uuid::now_v7();
    let mut tx = db.begin().await?;

    let row = sqlx::query_as::<_, MessageRow>(
        r#"
        INSERT INTO deliberation_messages
            (id, session_id, sender_type, agent_id, content, intent, cited_cases, cited_laws, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
        RETURNING id, session_id, sender_type, agent_id, content, intent,
                  cited_cases, cited_laws, created_at
        "#,
    )
    .bind(id)
    .bind(message.session_id)
    .bind(message.sender.kind())
    .bind(message.sender.agent_id().map(|a| a.to_string()))
    .bind(message.content)
    .bind(message.intent)
    .bind(message.cited_cases)
    .bind(message.cited_laws)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("UPDATE deliberation_sessions SET updated_at = NOW() WHERE id = $1")
        .bind(message.session_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(message_row_to_model(row))
}

/// The latest `limit` messages of a session, oldest first. With `before`,
/// only messages written before that message are considered.
pub async fn get_messages(
    db: &PgPool,
    session_id: Uuid,
    limit: i64,
    before: Option<Uuid>,
) -> Result<Vec<DeliberationMessage>> {
    let rows = sqlx::query_as::<_, MessageRow>(
        r#"
        SELECT * FROM (
            SELECT id, session_id, sender_type, agent_id, content, intent,
                   cited_cases, cited_laws, created_at
            FROM deliberation_messages
            WHERE session_id = $1
              AND ($3::uuid IS NULL
                   OR created_at < (SELECT created_at FROM deliberation_messages WHERE id = $3))
            ORDER BY created_at DESC, id DESC
            LIMIT $2
        ) recent
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(session_id)
    .bind(limit)
    .bind(before)
    .fetch_all(db)
    .await?;

    Ok(rows.into_iter().map(message_row_to_model).collect())
}

// ============================================================================
// Legal opinions
// ============================================================================

/// Stores the session's opinion, replacing an earlier draft.
pub async fn save_legal_opinion(
    db: &PgPool,
    session_id: Uuid,
    opinion: &LegalOpinionDraft,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO legal_opinions (id, session_id, opinion_data, created_at)
        VALUES ($1, $2, $3, NOW())
        ON CONFLICT (session_id)
        DO UPDATE SET opinion_data = EXCLUDED.opinion_data, created_at = NOW()
        "#,
    )
    .bind(Uuid::now_v7())
    .bind(session_id)
    .bind(serde_json::to_value(opinion)?)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn get_legal_opinion(db: &PgPool, session_id: Uuid) -> Result<Option<LegalOpinionDraft>> {
    let data = sqlx::query_scalar::<_, Value>(
        "SELECT opinion_data FROM legal_opinions WHERE session_id = $1",
    )
    .bind(session_id)
    .fetch_optional(db)
    .await?;

    match data.map(serde_json::from_value::<LegalOpinionDraft>) {
        Some(Ok(opinion)) => Ok(Some(opinion)),
        Some(Err(e)) => {
            log::warn!("Stored opinion for session {} is unreadable: {}", session_id, e);
            Ok(None)
        }
        None => Ok(None),
    }
}

// ============================================================================
// Cases
// ============================================================================

/// Looks a case up by uuid or by its court register number.
pub async fn get_case_by_id(db: &PgPool, case_id: &str) -> Result<Option<CaseRecord>> {
    let row = sqlx::query_as::<_, CaseRow>(
        r#"
        SELECT id, extraction_id AS case_number, extraction_result, extraction_confidence,
               summary_en, summary_id, NULL::float8 AS similarity, created_at
        FROM llm_extractions
        WHERE id::text = $1 OR extraction_id = $1
        LIMIT 1
        "#,
    )
    .bind(case_id)
    .fetch_optional(db)
    .await?;

    Ok(row.map(CaseRecord::from))
}

/// Resolves the precedents stored with a session. Lookups that fail are
/// skipped.
pub async fn get_similar_cases(db: &PgPool, case_ids: &[String], limit: usize) -> Vec<SimilarCase> {
    let mut cases = Vec::new();
    for case_id in case_ids.iter().take(limit) {
        match get_case_by_id(db, case_id).await {
            Ok(Some(record)) => cases.push(record.to_similar_case("Retrieved from session")),
            Ok(None) => log::debug!("Similar case {} no longer exists", case_id),
            Err(e) => log::warn!("Failed to load similar case {}: {}", case_id, e),
        }
    }
    cases
}

/// `%term%` for ILIKE, with the wildcards inside `term` escaped.
fn contains_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

fn case_type_pattern(case_type: Option<CaseType>) -> Option<String> {
    case_type.map(|case_type| contains_pattern(&case_type.to_string()))
}

fn filter_case_type(filters: Option<&CaseSearchFilters>) -> Option<CaseType> {
    filters.and_then(|f| f.case_type)
}

pub async fn search_cases_by_text(
    db: &PgPool,
    query: &str,
    filters: Option<&CaseSearchFilters>,
    limit: i64,
) -> Result<Vec<CaseRecord>> {
    let rows = sqlx::query_as::<_, CaseRow>(
        r#"
        SELECT id, extraction_id AS case_number, extraction_result, extraction_confidence,
               summary_en, summary_id, NULL::float8 AS similarity, created_at
        FROM llm_extractions
        WHERE status = 'completed'
          AND (summary_en ILIKE $1 ESCAPE '\'
               OR summary_id ILIKE $1 ESCAPE '\'
               OR extraction_result::text ILIKE $1 ESCAPE '\')
          AND ($3::text IS NULL
               OR extraction_result->'case_metadata'->>'crime_category' ILIKE $3 ESCAPE '\')
        ORDER BY extraction_confidence DESC NULLS LAST
        LIMIT $2
        "#,
    )
    .bind(contains_pattern(query))
    .bind(limit)
    .bind(case_type_pattern(filter_case_type(filters)))
    .fetch_all(db)
    .await?;

    Ok(rows.into_iter().map(CaseRecord::from).collect())
}

/// pgvector text literal, e.g. `[0.1,0.2]`.
pub fn format_vector(embedding: &[f32]) -> String {
    let values: Vec<String> = embedding.iter().map(|v| v.to_string()).collect();
    format!("[{}]", values.join(","))
}

pub async fn search_cases_by_vector(
    db: &PgPool,
    embedding: &[f32],
    filters: Option<&CaseSearchFilters>,
    limit: i64,
    min_similarity: f64,
) -> Result<Vec<CaseRecord>> {
    let rows = sqlx::query_as::<_, CaseRow>(
        r#"
        SELECT id, extraction_id AS case_number, extraction_result, extraction_confidence,
               summary_en, summary_id,
               1 - (summary_embedding <=> $1::text::vector) AS similarity,
               created_at
        FROM llm_extractions
        WHERE summary_embedding IS NOT NULL
          AND status = 'completed'
          AND 1 - (summary_embedding <=> $1::text::vector) >= $2
          AND ($4::text IS NULL
               OR extraction_result->'case_metadata'->>'crime_category' ILIKE $4 ESCAPE '\')
        ORDER BY summary_embedding <=> $1::text::vector
        LIMIT $3
        "#,
    )
    .bind(format_vector(embedding))
    .bind(min_similarity)
    .bind(limit)
    .bind(case_type_pattern(filter_case_type(filters)))
    .fetch_all(db)
    .await?;

    Ok(rows.into_iter().map(CaseRecord::from).collect())
}

/// Sentence and verdict distribution over completed judgments, optionally
/// restricted to one case type.
pub async fn get_case_statistics(db: &PgPool, case_type: Option<CaseType>) -> Result<CaseStatistics> {
    let row = sqlx::query_as::<_, StatsRow>(
        r#"
        WITH case_sentences AS (
            SELECT (extraction_result #>> '{verdict,sentences,imprisonment,duration_months}')::numeric
                       AS sentence_months,
                   extraction_result #>> '{verdict,result}' AS verdict_result
            FROM llm_extractions
            WHERE status = 'completed'
              AND extraction_result #>> '{verdict,sentences,imprisonment,duration_months}' IS NOT NULL
              AND ($1::text IS NULL
                   OR extraction_result->'case_metadata'->>'crime_category' ILIKE $1 ESCAPE '\')
        )
        SELECT COUNT(*) AS total_cases,
               MIN(sentence_months)::bigint AS min_months,
               MAX(sentence_months)::bigint AS max_months,
               AVG(sentence_months)::float8 AS avg_months,
               (PERCENTILE_CONT(0.5) WITHIN GROUP (ORDER BY sentence_months))::float8 AS median_months,
               (PERCENTILE_CONT(0.25) WITHIN GROUP (ORDER BY sentence_months))::float8 AS p25,
               (PERCENTILE_CONT(0.75) WITHIN GROUP (ORDER BY sentence_months))::float8 AS p75,
               COUNT(*) FILTER (WHERE verdict_result = 'guilty') AS guilty_count,
               COUNT(*) FILTER (WHERE verdict_result = 'not_guilty') AS not_guilty_count,
               COUNT(*) FILTER (WHERE verdict_result = 'acquitted') AS acquitted_count
        FROM case_sentences
        "#,
    )
    .bind(case_type_pattern(case_type))
    .fetch_one(db)
    .await?;

    Ok(stats_row_to_model(row))
}

pub async fn ping(db: &PgPool) -> bool {
    match sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(db).await {
        Ok(_) => true,
        Err(e) => {
            log::warn!("Database health check failed: {}", e);
            false
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use uuid::Uuid;

// ============================================================================
// Agents and intents
// ============================================================================

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString, EnumIter, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AgentId {
    Strict,
    Humanist,
    Historian,
}

/// Who a turn is addressed to: every judge or one of them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TargetAgent {
    All,
    Strict,
    Humanist,
    Historian,
}

impl TargetAgent {
    pub fn agent(&self) -> Option<AgentId> {
        match self {
            Self::All => None,
            Self::Strict => Some(AgentId::Strict),
            Self::Humanist => Some(AgentId::Humanist),
            Self::Historian => Some(AgentId::Historian),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MessageIntent {
    PresentCase,
    AskOpinion,
    AskPrecedent,
    ChallengeArgument,
    RequestClarification,
    ProvideAnalysis,
    CitePrecedent,
    Summarize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SendMessageRequest {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<MessageIntent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_agent: Option<TargetAgent>,
}

impl SendMessageRequest {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }
}

// ============================================================================
// Case input
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CaseType {
    Narcotics,
    Corruption,
    GeneralCriminal,
    Other,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NarcoticsIntent {
    PersonalUse,
    Distribution,
    Unknown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    TextSummary,
    StructuredForm,
    PdfUpload,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DefendantProfile {
    pub is_first_offender: bool,
    pub age: Option<i32>,
    pub occupation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NarcoticsDetails {
    pub substance: String,
    pub weight_grams: f64,
    pub intent: NarcoticsIntent,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CorruptionDetails {
    pub state_loss_idr: f64,
    pub position: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParsedCaseInput {
    pub case_type: CaseType,
    pub summary: String,
    pub defendant_profile: DefendantProfile,
    #[serde(default)]
    pub key_facts: Vec<String>,
    #[serde(default)]
    pub charges: Vec<String>,
    pub narcotics: Option<NarcoticsDetails>,
    pub corruption: Option<CorruptionDetails>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StructuredCaseData {
    pub defendant_first_offender: Option<bool>,
    pub defendant_age: Option<i32>,
    pub substance_type: Option<String>,
    pub weight_grams: Option<f64>,
    pub state_loss_idr: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseInput {
    pub input_type: InputType,
    pub raw_input: String,
    pub parsed_case: ParsedCaseInput,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarCase {
    pub case_id: String,
    pub case_number: String,
    pub similarity_score: f64,
    pub similarity_reason: String,
    pub verdict_summary: String,
    pub sentence_months: i64,
}

// ============================================================================
// Sessions and messages
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Concluded,
    Archived,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageSender {
    User,
    Agent { agent_id: AgentId },
    System,
}

impl MessageSender {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Agent { .. } => "agent",
            Self::System => "system",
        }
    }

    pub fn agent_id(&self) -> Option<AgentId> {
        match self {
            Self::Agent { agent_id } => Some(*agent_id),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::User => "Presiding Judge",
            Self::Agent { agent_id: AgentId::Strict } => "Judge Strict",
            Self::Agent { agent_id: AgentId::Humanist } => "Judge Humanist",
            Self::Agent { agent_id: AgentId::Historian } => "Judge Historian",
            Self::System => "System",
        }
    }

    /// Rebuilds a sender from its stored columns; unknown agents read as system.
    pub fn from_columns(sender_type: &str, agent_id: Option<&str>) -> Self {
        match (sender_type, agent_id) {
            ("user", _) => Self::User,
            ("agent", Some(id)) => id
                .parse::<AgentId>()
                .map(|agent_id| Self::Agent { agent_id })
                .unwrap_or(Self::System),
            _ => Self::System,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliberationMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    pub sender: MessageSender,
    pub content: String,
    pub intent: Option<String>,
    #[serde(default)]
    pub cited_cases: Vec<String>,
    #[serde(default)]
    pub cited_laws: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliberationSession {
    pub id: Uuid,
    pub user_id: Option<String>,
    pub status: SessionStatus,
    pub case_input: serde_json::Value,
    #[serde(default)]
    pub similar_case_ids: Vec<String>,
    #[serde(default)]
    pub messages: Vec<DeliberationMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legal_opinion: Option<LegalOpinionDraft>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub concluded_at: Option<DateTime<Utc>>,
}

impl DeliberationSession {
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// The parsed case stored with the session, if it still deserializes.
    pub fn parsed_case(&self) -> Option<ParsedCaseInput> {
        self.case_input
            .get("parsed_case")
            .cloned()
            .and_then(|value| serde_json::from_value(value).ok())
    }
}

// ============================================================================
// Requests / responses
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    pub input_type: InputType,
    pub case_summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_type: Option<CaseType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured_data: Option<StructuredCaseData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub session_id: Uuid,
    pub parsed_case: ParsedCaseInput,
    pub similar_cases: Vec<SimilarCase>,
    pub initial_message: DeliberationMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetMessagesResponse {
    pub messages: Vec<DeliberationMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MessagesQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    /// Only messages older than this one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionStatusFilter {
    Active,
    Concluded,
    Archived,
    #[default]
    All,
}

impl SessionStatusFilter {
    pub fn status(&self) -> Option<SessionStatus> {
        match self {
            Self::Active => Some(SessionStatus::Active),
            Self::Concluded => Some(SessionStatus::Concluded),
            Self::Archived => Some(SessionStatus::Archived),
            Self::All => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ListSessionsQuery {
    #[serde(default)]
    pub status: SessionStatusFilter,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Pagination {
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListSessionsResponse {
    pub sessions: Vec<DeliberationSession>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveSessionResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CaseSearchFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_type: Option<CaseType>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchCasesRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<CaseSearchFilters>,
    #[serde(default = "default_search_limit")]
    pub limit: i64,
    #[serde(default = "default_semantic_search")]
    pub semantic_search: bool,
}

fn default_search_limit() -> i64 {
    10
}

fn default_semantic_search() -> bool {
    true
}

impl SearchCasesRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            filters: None,
            limit: default_search_limit(),
            semantic_search: default_semantic_search(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseRecord {
    pub id: Uuid,
    pub case_number: String,
    pub extraction_result: Option<serde_json::Value>,
    pub extraction_confidence: Option<f64>,
    pub summary_en: Option<String>,
    pub summary_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl CaseRecord {
    /// Court verdict text, as extracted from the judgment PDF.
    pub fn verdict_summary(&self) -> String {
        self.extraction_result
            .as_ref()
            .and_then(|r| r.pointer("/verdict/result"))
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown")
            .to_string()
    }

    pub fn sentence_months(&self) -> i64 {
        self.extraction_result
            .as_ref()
            .and_then(|r| r.pointer("/verdict/sentences/imprisonment/duration_months"))
            .and_then(|v| v.as_i64())
            .unwrap_or(0)
    }

    pub fn to_similar_case(&self, reason: impl Into<String>) -> SimilarCase {
        SimilarCase {
            case_id: self.id.to_string(),
            case_number: self.case_number.clone(),
            similarity_score: self.similarity.unwrap_or(0.7).clamp(0.0, 1.0),
            similarity_reason: reason.into(),
            verdict_summary: self.verdict_summary(),
            sentence_months: self.sentence_months(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchCasesResponse {
    pub cases: Vec<CaseRecord>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub database: String,
    pub version: String,
}

impl HealthStatus {
    pub fn new(database_ok: bool) -> Self {
        Self {
            status: if database_ok { "healthy" } else { "degraded" }.to_string(),
            database: if database_ok { "connected" } else { "unavailable" }.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

}

// ============================================================================
// Legal opinion
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VerdictDecision {
    #[default]
    Guilty,
    NotGuilty,
    Acquitted,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Confidence {
    High,
    #[default]
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ArgumentStrength {
    Strong,
    #[default]
    Moderate,
    Weak,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VerdictRecommendation {
    pub decision: VerdictDecision,
    pub confidence: Confidence,
    pub reasoning: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SentenceRange {
    pub minimum: i64,
    pub maximum: i64,
    pub recommended: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SentenceRecommendation {
    pub imprisonment_months: SentenceRange,
    pub fine_idr: SentenceRange,
    #[serde(default)]
    pub additional_penalties: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArgumentPoint {
    pub argument: String,
    pub source_agent: AgentId,
    #[serde(default)]
    pub supporting_cases: Vec<String>,
    pub strength: ArgumentStrength,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LegalArguments {
    #[serde(default)]
    pub for_conviction: Vec<ArgumentPoint>,
    #[serde(default)]
    pub for_leniency: Vec<ArgumentPoint>,
    #[serde(default)]
    pub for_severity: Vec<ArgumentPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct CitedPrecedent {
    pub case_id: String,
    pub case_number: String,
    pub relevance: String,
    pub verdict_summary: String,
    pub how_it_applies: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ApplicableLaw {
    pub law_reference: String,
    pub description: String,
    pub how_it_applies: String,
}

/// Synthesis of a deliberation, drafted once the judges have spoken.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LegalOpinionDraft {
    pub session_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub case_summary: String,
    pub verdict_recommendation: VerdictRecommendation,
    pub sentence_recommendation: SentenceRecommendation,
    pub legal_arguments: LegalArguments,
    #[serde(default)]
    pub cited_precedents: Vec<CitedPrecedent>,
    #[serde(default)]
    pub applicable_laws: Vec<ApplicableLaw>,
    #[serde(default)]
    pub dissenting_views: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GenerateOpinionRequest {
    #[serde(default = "default_include_dissent")]
    pub include_dissent: bool,
}

fn default_include_dissent() -> bool {
    true
}

impl Default for GenerateOpinionRequest {
    fn default() -> Self {
        Self {
            include_dissent: default_include_dissent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateOpinionResponse {
    pub opinion: LegalOpinionDraft,
}

// ============================================================================
// Case statistics
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StatisticsQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_type: Option<CaseType>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct SentencePercentiles {
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct SentenceDistribution {
    pub min_months: i64,
    pub max_months: i64,
    pub median_months: f64,
    pub average_months: f64,
    pub percentiles: SentencePercentiles,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct VerdictDistribution {
    pub guilty: i64,
    pub not_guilty: i64,
    pub rehabilitation: i64,
}

/// Sentencing outcomes over the completed judgments of one case type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct CaseStatistics {
    pub total_cases: i64,
    pub sentence_distribution: SentenceDistribution,
    pub verdict_distribution: VerdictDistribution,
}

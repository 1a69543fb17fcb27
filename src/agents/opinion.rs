use chrono::Utc;
use rig::completion::Prompt;
use rig::prelude::CompletionClient;
use rig::providers::ollama;
use serde::Deserialize;
use uuid::Uuid;

use crate::agents::case_parser::json_payload;
use crate::agents::orchestrator::{build_case_summary, format_similar_cases};
use crate::models::{
    AgentId, ApplicableLaw, ArgumentPoint, CitedPrecedent, Confidence, DeliberationMessage,
    LegalArguments, LegalOpinionDraft, ParsedCaseInput, SentenceRange, SentenceRecommendation,
    SimilarCase, VerdictDecision, VerdictRecommendation,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const TRANSCRIPT_WINDOW: usize = 20;
const TRANSCRIPT_MESSAGE_LIMIT: usize = 500;
const FALLBACK_SPREAD_MONTHS: i64 = 12;
const FALLBACK_DISSENT: &str = "Opinion generation encountered an error. Manual review required.";

const OPINION_PREAMBLE: &str = "You are a senior Indonesian judge drafting the legal opinion \
of a judicial deliberation. Weigh every judge's view and answer with a single JSON object only.";

const OPINION_PROMPT: &str = r#"## Case
{case}

## Similar Cases
{similar}

## Deliberation Transcript
{transcript}

Draft the legal opinion as this JSON object and nothing else:
{
  "case_summary": "short restatement of the case",
  "verdict_recommendation": {"decision": "guilty" | "not_guilty" | "acquitted", "confidence": "high" | "medium" | "low", "reasoning": "..."},
  "sentence_recommendation": {
    "imprisonment_months": {"minimum": 0, "maximum": 0, "recommended": 0},
    "fine_idr": {"minimum": 0, "maximum": 0, "recommended": 0},
    "additional_penalties": []
  },
  "legal_arguments": {
    "for_conviction": [{"argument": "...", "source_agent": "strict" | "humanist" | "historian", "supporting_cases": [], "strength": "strong" | "moderate" | "weak"}],
    "for_leniency": [],
    "for_severity": []
  },
  "cited_precedents": [{"case_id": "", "case_number": "", "relevance": "", "verdict_summary": "", "how_it_applies": ""}],
  "applicable_laws": [{"law_reference": "", "description": "", "how_it_applies": ""}],
  "dissenting_views": []
}
Write every text field in Bahasa Indonesia."#;

/// Drafts the legal opinion that concludes a session.
#[derive(Clone)]
pub struct OpinionWriter {
    client: ollama::Client,
    model: String,
}

impl OpinionWriter {
    pub fn new(client: ollama::Client, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    /// Never fails: a model error yields a low confidence draft built from
    /// the precedents that asks for manual review.
    pub async fn draft(
        &self,
        session_id: Uuid,
        case: Option<&ParsedCaseInput>,
        similar_cases: &[SimilarCase],
        messages: &[DeliberationMessage],
        include_dissent: bool,
    ) -> LegalOpinionDraft {
        let prompt = opinion_prompt(case, similar_cases, messages);
        let mut opinion = match self.ask(&prompt).await {
            Ok(answer) => match parse_opinion(&answer, session_id) {
                Ok(opinion) => opinion,
                Err(e) => {
                    log::warn!("Unreadable opinion for session {}: {}", session_id, e);
                    fallback_opinion(session_id, case, similar_cases)
                }
            },
            Err(e) => {
                log::error!("Opinion generation failed for session {}: {}", session_id, e);
                fallback_opinion(session_id, case, similar_cases)
            }
        };

        if !include_dissent {
            opinion.dissenting_views.clear();
        }
        opinion
    }

    async fn ask(&self, prompt: &str) -> Result<String, BoxError> {
        let agent = self
            .client
            .agent(&self.model)
            .preamble(OPINION_PREAMBLE)
            .temperature(0.3)
            .build();
        Ok(agent.prompt(prompt).await?)
    }
}

fn format_transcript(messages: &[DeliberationMessage]) -> String {
    let start = messages.len().saturating_sub(TRANSCRIPT_WINDOW);
    messages[start..]
        .iter()
        .map(|m| {
            let content: String = m.content.chars().take(TRANSCRIPT_MESSAGE_LIMIT).collect();
            format!("{}: {}", m.sender.display_name(), content)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn opinion_prompt(
    case: Option<&ParsedCaseInput>,
    similar_cases: &[SimilarCase],
    messages: &[DeliberationMessage],
) -> String {
    let similar = format_similar_cases(similar_cases);
    let transcript = format_transcript(messages);
    OPINION_PROMPT
        .replace(
            "{similar}",
            if similar.is_empty() {
                "No similar cases found."
            } else {
                &similar
            },
        )
        .replace(
            "{transcript}",
            if transcript.is_empty() {
                "No deliberation took place."
            } else {
                &transcript
            },
        )
        .replace("{case}", &build_case_summary(case))
}

// Lenient shapes of the model answer. Missing fields take defaults and
// labels outside the known set are mapped in `parse_opinion`.

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OpinionPayload {
    case_summary: Option<String>,
    verdict_recommendation: VerdictPayload,
    sentence_recommendation: SentencePayload,
    legal_arguments: ArgumentsPayload,
    cited_precedents: Vec<CitedPrecedent>,
    applicable_laws: Vec<ApplicableLaw>,
    dissenting_views: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VerdictPayload {
    decision: Option<String>,
    confidence: Option<String>,
    reasoning: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SentencePayload {
    imprisonment_months: RangePayload,
    fine_idr: RangePayload,
    additional_penalties: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RangePayload {
    minimum: Option<f64>,
    maximum: Option<f64>,
    recommended: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ArgumentsPayload {
    for_conviction: Vec<ArgumentPayload>,
    for_leniency: Vec<ArgumentPayload>,
    for_severity: Vec<ArgumentPayload>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ArgumentPayload {
    argument: String,
    source_agent: Option<String>,
    supporting_cases: Vec<String>,
    strength: Option<String>,
}

fn label<T: std::str::FromStr>(value: Option<&str>) -> Option<T> {
    value.and_then(|v| v.trim().to_lowercase().parse().ok())
}

impl From<RangePayload> for SentenceRange {
    fn from(range: RangePayload) -> Self {
        let months = |v: Option<f64>| v.unwrap_or(0.0).max(0.0).round() as i64;
        Self {
            minimum: months(range.minimum),
            maximum: months(range.maximum),
            recommended: months(range.recommended),
        }
    }
}

fn arguments(points: Vec<ArgumentPayload>) -> Vec<ArgumentPoint> {
    points
        .into_iter()
        .filter(|p| !p.argument.trim().is_empty())
        .map(|p| ArgumentPoint {
            strength: label(p.strength.as_deref()).unwrap_or_default(),
            source_agent: label(p.source_agent.as_deref()).unwrap_or(AgentId::Historian),
            argument: p.argument,
            supporting_cases: p.supporting_cases,
        })
        .collect()
}

pub fn parse_opinion(text: &str, session_id: Uuid) -> Result<LegalOpinionDraft, serde_json::Error> {
    let payload: OpinionPayload = serde_json::from_str(json_payload(text))?;
    let verdict = payload.verdict_recommendation;

    Ok(LegalOpinionDraft {
        session_id,
        generated_at: Utc::now(),
        case_summary: payload.case_summary.unwrap_or_default(),
        verdict_recommendation: VerdictRecommendation {
            decision: label(verdict.decision.as_deref()).unwrap_or_default(),
            confidence: label(verdict.confidence.as_deref()).unwrap_or_default(),
            reasoning: verdict.reasoning.unwrap_or_default(),
        },
        sentence_recommendation: SentenceRecommendation {
            imprisonment_months: payload.sentence_recommendation.imprisonment_months.into(),
            fine_idr: payload.sentence_recommendation.fine_idr.into(),
            additional_penalties: payload.sentence_recommendation.additional_penalties,
        },
        legal_arguments: LegalArguments {
            for_conviction: arguments(payload.legal_arguments.for_conviction),
            for_leniency: arguments(payload.legal_arguments.for_leniency),
            for_severity: arguments(payload.legal_arguments.for_severity),
        },
        cited_precedents: payload.cited_precedents,
        applicable_laws: payload.applicable_laws,
        dissenting_views: payload.dissenting_views,
    })
}

/// Draft used when the model gives nothing usable: a guilty finding of low
/// confidence around the average sentence of the precedents.
pub fn fallback_opinion(
    session_id: Uuid,
    case: Option<&ParsedCaseInput>,
    similar_cases: &[SimilarCase],
) -> LegalOpinionDraft {
    let sentences: Vec<i64> = similar_cases.iter().map(|c| c.sentence_months).collect();
    let average = if sentences.is_empty() {
        0
    } else {
        sentences.iter().sum::<i64>() / sentences.len() as i64
    };

    LegalOpinionDraft {
        session_id,
        generated_at: Utc::now(),
        case_summary: case
            .map(|c| c.summary.clone())
            .unwrap_or_else(|| "Case summary unavailable".to_string()),
        verdict_recommendation: VerdictRecommendation {
            decision: VerdictDecision::Guilty,
            confidence: Confidence::Low,
            reasoning: "Unable to generate detailed analysis. Please review manually.".to_string(),
        },
        sentence_recommendation: SentenceRecommendation {
            imprisonment_months: SentenceRange {
                minimum: (average - FALLBACK_SPREAD_MONTHS).max(0),
                maximum: average + FALLBACK_SPREAD_MONTHS,
                recommended: average,
            },
            fine_idr: SentenceRange::default(),
            additional_penalties: Vec::new(),
        },
        legal_arguments: LegalArguments::default(),
        cited_precedents: Vec::new(),
        applicable_laws: Vec::new(),
        dissenting_views: vec![FALLBACK_DISSENT.to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::case_parser::parse_case;
    use crate::models::{ArgumentStrength, MessageSender};

    fn similar(months: i64) -> SimilarCase {
        SimilarCase {
            case_id: format!("case-{}", months),
            case_number: format!("{}/Pid.Sus/2023/PN Jkt.Sel", months),
            similarity_score: 0.8,
            similarity_reason: "Vector similarity match".to_string(),
            verdict_summary: "Pidana penjara".to_string(),
            sentence_months: months,
        }
    }

    fn message(sender: MessageSender, content: &str) -> DeliberationMessage {
        DeliberationMessage {
            id: Uuid::now_v7(),
            session_id: Uuid::nil(),
            sender,
            content: content.to_string(),
            intent: None,
            cited_cases: Vec::new(),
            cited_laws: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_parse_opinion_answer() {
        let answer = r#"```json
{
  "case_summary": "Kepemilikan sabu 1,2 gram",
  "verdict_recommendation": {"decision": "Guilty", "confidence": "high", "reasoning": "Unsur terpenuhi"},
  "sentence_recommendation": {
    "imprisonment_months": {"minimum": 36, "maximum": 60, "recommended": 48.4},
    "fine_idr": {"minimum": 800000000, "maximum": 1000000000, "recommended": 800000000}
  },
  "legal_arguments": {
    "for_conviction": [{"argument": "Barang bukti sah", "source_agent": "strict", "strength": "strong"}],
    "for_leniency": [{"argument": "Pelaku pertama", "source_agent": "judge_x", "strength": "unclear"}, {"argument": " "}]
  },
  "applicable_laws": [{"law_reference": "Pasal 112 ayat (1)"}],
  "dissenting_views": ["Rehabilitasi lebih tepat"]
}
```"#;
        let id = Uuid::now_v7();
        let opinion = parse_opinion(answer, id).unwrap();

        assert_eq!(opinion.session_id, id);
        assert_eq!(opinion.verdict_recommendation.decision, VerdictDecision::Guilty);
        assert_eq!(opinion.verdict_recommendation.confidence, Confidence::High);
        assert_eq!(opinion.sentence_recommendation.imprisonment_months.recommended, 48);
        assert_eq!(opinion.sentence_recommendation.fine_idr.minimum, 800_000_000);

        let conviction = &opinion.legal_arguments.for_conviction[0];
        assert_eq!(conviction.source_agent, AgentId::Strict);
        assert_eq!(conviction.strength, ArgumentStrength::Strong);

        assert_eq!(opinion.legal_arguments.for_leniency.len(), 1);
        let leniency = &opinion.legal_arguments.for_leniency[0];
        assert_eq!(leniency.source_agent, AgentId::Historian);
        assert_eq!(leniency.strength, ArgumentStrength::Moderate);

        assert_eq!(opinion.applicable_laws[0].law_reference, "Pasal 112 ayat (1)");
        assert!(opinion.applicable_laws[0].description.is_empty());
        assert_eq!(opinion.dissenting_views, vec!["Rehabilitasi lebih tepat"]);
    }

    #[test]
    fn test_parse_opinion_rejects_prose() {
        assert!(parse_opinion("Saya tidak dapat menyusun pendapat.", Uuid::nil()).is_err());
    }

    #[test]
    fn test_fallback_centres_on_average_sentence() {
        let case = parse_case("Terdakwa membawa sabu", None, None);
        let opinion = fallback_opinion(Uuid::nil(), Some(&case), &[similar(6), similar(18)]);

        let range = opinion.sentence_recommendation.imprisonment_months;
        assert_eq!(range.recommended, 12);
        assert_eq!(range.minimum, 0);
        assert_eq!(range.maximum, 24);
        assert_eq!(opinion.verdict_recommendation.confidence, Confidence::Low);
        assert_eq!(opinion.case_summary, "Terdakwa membawa sabu");
        assert_eq!(opinion.dissenting_views, vec![FALLBACK_DISSENT]);
    }

    #[test]
    fn test_fallback_without_case_or_precedents() {
        let opinion = fallback_opinion(Uuid::nil(), None, &[]);
        assert_eq!(opinion.case_summary, "Case summary unavailable");
        assert_eq!(
            opinion.sentence_recommendation.imprisonment_months,
            SentenceRange { minimum: 0, maximum: 12, recommended: 0 }
        );
    }

    #[test]
    fn test_prompt_keeps_recent_transcript() {
        let mut messages: Vec<DeliberationMessage> = (0..25)
            .map(|i| message(MessageSender::User, &format!("pesan-{:02}", i)))
            .collect();
        messages.push(message(
            MessageSender::Agent { agent_id: AgentId::Humanist },
            &"a".repeat(800),
        ));

        let prompt = opinion_prompt(None, &[similar(24)], &messages);
        assert!(!prompt.contains("pesan-05"));
        assert!(prompt.contains("pesan-06"));
        assert!(prompt.contains(&format!("Judge Humanist: {}", "a".repeat(500))));
        assert!(!prompt.contains(&"a".repeat(501)));
        assert!(prompt.contains("24/Pid.Sus/2023/PN Jkt.Sel"));
        assert!(prompt.contains("No case details provided yet."));
    }

    #[tokio::test]
    async fn test_unreachable_model_drafts_fallback() {
        let client = ollama::Client::builder()
            .api_key(rig::client::Nothing)
            .base_url("http://127.0.0.1:9")
            .build()
            .unwrap();
        let writer = OpinionWriter::new(client, "llama3.2");
        let opinion = writer.draft(Uuid::nil(), None, &[similar(30)], &[], false).await;

        assert_eq!(opinion.verdict_recommendation.confidence, Confidence::Low);
        assert_eq!(opinion.sentence_recommendation.imprisonment_months.recommended, 30);
        assert!(opinion.dissenting_views.is_empty());
    }
}

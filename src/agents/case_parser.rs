use rig::completion::Prompt;
use rig::prelude::CompletionClient;
use rig::providers::ollama;
use serde::Deserialize;

use crate::models::{
    CaseType, CorruptionDetails, DefendantProfile, NarcoticsDetails, NarcoticsIntent,
    ParsedCaseInput, StructuredCaseData,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const SUMMARY_LIMIT: usize = 500;

const PARSER_PREAMBLE: &str = "You are a legal case analyzer for Indonesian criminal courts. \
Extract structured information from case summaries and answer with a single JSON object only.";

const PARSER_PROMPT: &str = r#"Read the case below and extract its structure.

Case summary:
{summary}

Structured form data:
{structured}

Answer with this JSON object and nothing else:
{
  "case_type": "narcotics" | "corruption" | "general_criminal" | "other",
  "summary": "one paragraph restating the case",
  "defendant_profile": {"is_first_offender": true, "age": null, "occupation": null},
  "key_facts": ["fact", "..."],
  "charges": ["article charged", "..."],
  "narcotics": {"substance": "name", "weight_grams": 0.0, "intent": "personal_use" | "distribution" | "unknown"},
  "corruption": {"state_loss_idr": 0, "position": "defendant's office"}
}
Use null for narcotics or corruption when they do not apply."#;

const NARCOTICS_KEYWORDS: &[&str] = &["narkotika", "narcotics", "sabu", "ganja", "heroin"];
const CORRUPTION_KEYWORDS: &[&str] = &["korupsi", "corruption", "kerugian negara", "suap"];

pub fn detect_case_type(summary: &str) -> CaseType {
    let lower = summary.to_lowercase();
    if NARCOTICS_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        CaseType::Narcotics
    } else if CORRUPTION_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        CaseType::Corruption
    } else {
        CaseType::Other
    }
}

/// Builds the case record the judges deliberate on. An explicit case type
/// wins over keyword detection; structured form fields fill the defendant
/// profile and the type specific details.
pub fn parse_case(
    summary: &str,
    case_type: Option<CaseType>,
    structured: Option<&StructuredCaseData>,
) -> ParsedCaseInput {
    let case_type = case_type.unwrap_or_else(|| detect_case_type(summary));
    let data = structured.cloned().unwrap_or_default();

    let defendant_profile = DefendantProfile {
        is_first_offender: data.defendant_first_offender.unwrap_or(true),
        age: data.defendant_age,
        occupation: None,
    };

    let narcotics = (case_type == CaseType::Narcotics && structured.is_some()).then(|| {
        NarcoticsDetails {
            substance: data
                .substance_type
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
            weight_grams: data.weight_grams.unwrap_or(0.0),
            intent: NarcoticsIntent::Unknown,
        }
    });

    let corruption = (case_type == CaseType::Corruption && structured.is_some()).then(|| {
        CorruptionDetails {
            state_loss_idr: data.state_loss_idr.unwrap_or(0.0),
            position: None,
        }
    });

    ParsedCaseInput {
        case_type,
        summary: summary.chars().take(SUMMARY_LIMIT).collect(),
        defendant_profile,
        key_facts: Vec::new(),
        charges: Vec::new(),
        narcotics,
        corruption,
    }
}

/// Structures a case summary with the chat model. Keyword parsing takes
/// over whenever the model is unreachable or answers with something that is
/// not the expected JSON.
#[derive(Clone)]
pub struct CaseParser {
    client: ollama::Client,
    model: String,
}

impl CaseParser {
    pub fn new(client: ollama::Client, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    pub async fn parse(
        &self,
        summary: &str,
        case_type: Option<CaseType>,
        structured: Option<&StructuredCaseData>,
    ) -> ParsedCaseInput {
        match self.extract(summary, structured).await {
            Ok(extraction) => merge_extraction(extraction, summary, case_type, structured),
            Err(e) => {
                log::warn!("LLM case parsing failed, using keyword detection: {}", e);
                parse_case(summary, case_type, structured)
            }
        }
    }

    async fn extract(
        &self,
        summary: &str,
        structured: Option<&StructuredCaseData>,
    ) -> Result<CaseExtraction, BoxError> {
        let structured = match structured {
            Some(data) => serde_json::to_string_pretty(data)?,
            None => "None provided".to_string(),
        };
        let prompt = PARSER_PROMPT
            .replace("{structured}", &structured)
            .replace("{summary}", summary);

        let agent = self
            .client
            .agent(&self.model)
            .preamble(PARSER_PREAMBLE)
            .temperature(0.1)
            .build();
        let response = agent.prompt(prompt.as_str()).await?;
        Ok(parse_extraction(&response)?)
    }
}

/// The outermost JSON object in a model answer, ignoring code fences and
/// any prose around it.
pub fn json_payload(text: &str) -> &str {
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text.trim(),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CaseExtraction {
    case_type: Option<String>,
    summary: Option<String>,
    defendant_profile: Option<ExtractedDefendant>,
    key_facts: Option<Vec<String>>,
    charges: Option<Vec<String>>,
    narcotics: Option<ExtractedNarcotics>,
    corruption: Option<ExtractedCorruption>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ExtractedDefendant {
    is_first_offender: Option<bool>,
    age: Option<f64>,
    occupation: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ExtractedNarcotics {
    substance: Option<String>,
    weight_grams: Option<f64>,
    intent: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ExtractedCorruption {
    state_loss_idr: Option<f64>,
    position: Option<String>,
}

fn parse_extraction(text: &str) -> Result<CaseExtraction, serde_json::Error> {
    serde_json::from_str(json_payload(text))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Combines the model's reading with the request. An explicit case type and
/// the form fields win over what the model inferred.
fn merge_extraction(
    extraction: CaseExtraction,
    summary: &str,
    case_type: Option<CaseType>,
    structured: Option<&StructuredCaseData>,
) -> ParsedCaseInput {
    let data = structured.cloned().unwrap_or_default();
    let case_type = case_type
        .or_else(|| extraction.case_type.as_deref().and_then(|t| t.trim().parse().ok()))
        .unwrap_or_else(|| detect_case_type(summary));

    let defendant = extraction.defendant_profile.unwrap_or_default();
    let defendant_profile = DefendantProfile {
        is_first_offender: data
            .defendant_first_offender
            .or(defendant.is_first_offender)
            .unwrap_or(true),
        age: data
            .defendant_age
            .or_else(|| defendant.age.filter(|a| *a > 0.0).map(|a| a.round() as i32)),
        occupation: non_blank(defendant.occupation),
    };

    let narcotics = match (case_type, extraction.narcotics) {
        (CaseType::Narcotics, extracted) if extracted.is_some() || structured.is_some() => {
            let extracted = extracted.unwrap_or_default();
            Some(NarcoticsDetails {
                substance: data
                    .substance_type
                    .clone()
                    .or_else(|| non_blank(extracted.substance))
                    .unwrap_or_else(|| "unknown".to_string()),
                weight_grams: data.weight_grams.or(extracted.weight_grams).unwrap_or(0.0),
                intent: extracted
                    .intent
                    .and_then(|i| i.trim().parse().ok())
                    .unwrap_or(NarcoticsIntent::Unknown),
            })
        }
        _ => None,
    };

    let corruption = match (case_type, extraction.corruption) {
        (CaseType::Corruption, extracted) if extracted.is_some() || structured.is_some() => {
            let extracted = extracted.unwrap_or_default();
            Some(CorruptionDetails {
                state_loss_idr: data
                    .state_loss_idr
                    .or(extracted.state_loss_idr)
                    .unwrap_or(0.0),
                position: non_blank(extracted.position),
            })
        }
        _ => None,
    };

    ParsedCaseInput {
        case_type,
        summary: non_blank(extraction.summary)
            .unwrap_or_else(|| summary.to_string())
            .chars()
            .take(SUMMARY_LIMIT)
            .collect(),
        defendant_profile,
        key_facts: extraction.key_facts.unwrap_or_default(),
        charges: extraction.charges.unwrap_or_default(),
        narcotics,
        corruption,
    }
}

use serde::{Deserialize, Serialize};

use crate::error::{AppError, ErrorCode, Result};
use crate::init::AiConfig;
use crate::models::ParsedCaseInput;

const MAX_INPUT_CHARS: usize = 8000;

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

/// Text embeddings from the Ollama `/api/embeddings` endpoint.
#[derive(Clone)]
pub struct EmbeddingService {
    client: reqwest::Client,
    url: String,
    model: String,
    dimension: usize,
}

impl EmbeddingService {
    pub fn new(config: &AiConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: config.url.trim_end_matches('/').to_string(),
            model: config.embedding_model.clone(),
            dimension: config.embedding_dimension,
        }
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let prompt = truncate(text);
        let response = self
            .client
            .post(format!("{}/api/embeddings", self.url))
            .json(&EmbeddingRequest {
                model: &self.model,
                prompt: &prompt,
            })
            .send()
            .await?
            .error_for_status()?
            .json::<EmbeddingResponse>()
            .await?;

        check_dimension(response.embedding, self.dimension)
    }
}

fn truncate(text: &str) -> String {
    text.chars().take(MAX_INPUT_CHARS).collect()
}

fn check_dimension(embedding: Vec<f32>, expected: usize) -> Result<Vec<f32>> {
    if embedding.is_empty() {
        return Err(AppError::new(
            ErrorCode::EmbeddingGenerationError,
            "No embedding returned from model",
        ));
    }
    if embedding.len() != expected {
        return Err(AppError::new(
            ErrorCode::EmbeddingGenerationError,
            format!(
                "Embedding has {} dimensions, expected {}",
                embedding.len(),
                expected
            ),
        ));
    }
    Ok(embedding)
}

/// Flattens a parsed case into the text that gets embedded for similarity search.
pub fn build_search_text(case: &ParsedCaseInput) -> String {
    let mut parts = vec![format!("Case type: {}", case.case_type)];

    if !case.summary.is_empty() {
        parts.push(format!("Summary: {}", case.summary));
    }

    let profile = &case.defendant_profile;
    parts.push(format!(
        "Defendant: {}",
        if profile.is_first_offender {
            "first offender"
        } else {
            "repeat offender"
        }
    ));
    if let Some(age) = profile.age {
        parts.push(format!("Age: {}", age));
    }

    if !case.key_facts.is_empty() {
        let facts: Vec<&str> = case.key_facts.iter().take(5).map(String::as_str).collect();
        parts.push(format!("Facts: {}", facts.join(". ")));
    }
    if !case.charges.is_empty() {
        let charges: Vec<&str> = case.charges.iter().take(3).map(String::as_str).collect();
        parts.push(format!("Charges: {}", charges.join(", ")));
    }

    if let Some(n) = &case.narcotics {
        parts.push(format!("Substance: {}", n.substance));
        parts.push(format!("Weight: {} grams", n.weight_grams));
        parts.push(format!("Intent: {}", n.intent));
    }
    if let Some(c) = &case.corruption {
        parts.push(format!("State loss: {} IDR", c.state_loss_idr));
        if let Some(position) = &c.position {
            parts.push(format!("Position: {}", position));
        }
    }

    parts.join(". ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::case_parser::parse_case;
    use crate::models::StructuredCaseData;

    #[test]
    fn test_truncate_counts_chars() {
        let text = "é".repeat(MAX_INPUT_CHARS + 10);
        assert_eq!(truncate(&text).chars().count(), MAX_INPUT_CHARS);
        assert_eq!(truncate("pendek"), "pendek");
    }

    #[test]
    fn test_check_dimension() {
        assert!(check_dimension(vec![], 3).is_err());
        assert!(check_dimension(vec![0.1, 0.2], 3).is_err());
        assert_eq!(check_dimension(vec![0.1, 0.2, 0.3], 3).unwrap().len(), 3);
    }

    #[test]
    fn test_search_text() {
        let data = StructuredCaseData {
            substance_type: Some("ganja".to_string()),
            weight_grams: Some(12.0),
            ..Default::default()
        };
        let case = parse_case("Terdakwa menanam ganja", None, Some(&data));
        let text = build_search_text(&case);
        assert!(text.starts_with("Case type: narcotics. Summary: Terdakwa menanam ganja"));
        assert!(text.contains("Defendant: first offender"));
        assert!(text.contains("Substance: ganja. Weight: 12 grams. Intent: unknown"));
    }
}

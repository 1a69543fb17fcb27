use rig::client::Nothing;
use rig::providers::ollama;
use sqlx::postgres::PgPoolOptions;
use std::error::Error;
use std::sync::Arc;

use crate::agents::{CaseParser, Council, OpinionWriter};
use crate::embeddings::EmbeddingService;
use crate::error::AppError;

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub max_connections: u32,
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Copy)]
pub struct SearchConfig {
    pub vector_limit: i64,
    pub min_similarity: f64,
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn Error>> {
        Ok(Self {
            database_url: std::env::var("DATABASE_URL")?,
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_or("PORT", "3000").parse()?,
            max_connections: env_or("DATABASE_MAX_CONNECTIONS", "10").parse()?,
            search: SearchConfig {
                vector_limit: env_or("VECTOR_SEARCH_LIMIT", "10").parse()?,
                min_similarity: env_or("VECTOR_SEARCH_MIN_SIMILARITY", "0.5").parse()?,
            },
        })
    }
}

#[derive(Debug, Clone)]
pub struct AiConfig {
    pub url: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub embedding_dimension: usize,
}

impl AiConfig {
    pub fn from_env() -> Result<Self, Box<dyn Error>> {
        Ok(Self {
            url: env_or("AI_URL", "http://127.0.0.1:11434"),
            chat_model: env_or("CHAT_MODEL", "llama3.2"),
            embedding_model: env_or("EMBEDDING_MODEL", "nomic-embed-text"),
            embedding_dimension: env_or("EMBEDDING_DIMENSION", "768").parse()?,
        })
    }
}

/// Client shared by every agent talking to the chat model.
pub fn ollama_client(config: &AiConfig) -> Result<ollama::Client, AppError> {
    ollama::Client::builder()
        .api_key(Nothing)
        .base_url(&config.url)
        .build()
        .map_err(|e| AppError::model(format!("Ollama client for {}: {}", config.url, e)))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

// ============================================================================
// Application state
// ============================================================================

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub council: Arc<Council>,
    pub case_parser: CaseParser,
    pub opinions: OpinionWriter,
    pub embeddings: EmbeddingService,
    pub search: SearchConfig,
}

pub async fn app_init() -> Result<(Config, Arc<AppState>), Box<dyn Error>> {
    let config = Config::from_env()?;
    log::info!("✅ Configuration loaded");
    let ai_config = AiConfig::from_env()?;
    log::info!("✅ AI configuration loaded ({})", ai_config.url);

    log::info!("📊 Connecting to PostgreSQL...");
    let db = setup_database(&config).await?;
    log::info!("✅ PostgreSQL connected");

    log::info!("🔄 Running migrations...");
    sqlx::migrate!("./migrations").run(&db).await?;
    log::info!("✅ Migrations completed");

    let client = ollama_client(&ai_config)?;
    let council = Arc::new(Council::new(client.clone(), &ai_config.chat_model)?);
    log::info!("⚖️  Council ready (model {})", ai_config.chat_model);
    let case_parser = CaseParser::new(client.clone(), &ai_config.chat_model);
    let opinions = OpinionWriter::new(client, &ai_config.chat_model);

    let embeddings = EmbeddingService::new(&ai_config);

    let state = Arc::new(AppState {
        db,
        council,
        case_parser,
        opinions,
        embeddings,
        search: config.search,
    });
    Ok((config, state))
}

async fn setup_database(config: &Config) -> Result<sqlx::PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_or_default() {
        assert_eq!(env_or("COUNCIL_TEST_SURELY_UNSET", "fallback"), "fallback");
    }

    #[test]
    fn test_ollama_client_from_config() {
        let config = AiConfig {
            url: "http://127.0.0.1:11434".to_string(),
            chat_model: "llama3.2".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            embedding_dimension: 768,
        };
        assert!(ollama_client(&config).is_ok());
    }
}

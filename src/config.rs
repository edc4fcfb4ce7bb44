//! Environment-driven settings for the pipeline and its remote services.

use std::env;
use std::path::PathBuf;

use crate::types::RagError;

pub const DEFAULT_OPENROUTER_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_EMBEDDING_MODEL: &str = "openai/text-embedding-3-small";

/// Ordered generation candidates: first is preferred, the rest are fallbacks.
pub const DEFAULT_CHAT_MODELS: &[&str] = &["google/gemma-3-27b-it:free", "openrouter/free"];

/// Runtime configuration resolved once at startup and handed to the service
/// constructors. Nothing here is re-read after construction.
#[derive(Clone, Debug)]
pub struct Settings {
    pub api_key: String,
    pub base_url: String,
    pub embedding_model: String,
    pub chat_models: Vec<String>,
    pub db_path: PathBuf,
    pub pdf_path: PathBuf,
}

impl Settings {
    /// Loads settings from the environment (reading a `.env` file when
    /// present). Fails with [`RagError::Configuration`] when the OpenRouter
    /// API key is missing.
    pub fn from_env() -> Result<Self, RagError> {
        let _ = dotenvy::dotenv();

        let api_key = env::var("OPENROUTER_API_KEY")
            .map_err(|_| RagError::Configuration("OPENROUTER_API_KEY is not set".into()))?;
        if api_key.trim().is_empty() {
            return Err(RagError::Configuration("OPENROUTER_API_KEY is empty".into()));
        }

        let base_url = env::var("SAMVIDHAN_OPENROUTER_URL")
            .unwrap_or_else(|_| DEFAULT_OPENROUTER_URL.to_string());
        let embedding_model = env::var("SAMVIDHAN_EMBEDDING_MODEL")
            .unwrap_or_else(|_| DEFAULT_EMBEDDING_MODEL.to_string());

        let chat_models = env::var("SAMVIDHAN_CHAT_MODELS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|model| !model.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .ok()
            .filter(|models| !models.is_empty())
            .unwrap_or_else(|| DEFAULT_CHAT_MODELS.iter().map(|m| m.to_string()).collect());

        let db_path = env::var("SAMVIDHAN_DB")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./samvidhan_chunks.sqlite"));
        let pdf_path = env::var("SAMVIDHAN_PDF")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./public/constitution.pdf"));

        Ok(Self {
            api_key,
            base_url,
            embedding_model,
            chat_models,
            db_path,
            pdf_path,
        })
    }
}

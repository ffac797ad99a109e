//! Factory for creating LLM providers from configuration

use std::sync::Arc;

use crate::config::{LLMProviderConfig, LLMProviderKind};
use crate::error::Result;
use crate::llm::LLMProvider;

#[cfg(feature = "llm-openai")]
use crate::llm::providers::openai::{DEFAULT_BASE_URL, DEFAULT_MODEL, OpenAIProvider};

const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";
const OLLAMA_MODEL: &str = "llama3.1";
const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
const GROQ_MODEL: &str = "llama-3.3-70b-versatile";

/// Factory for creating LLM providers
pub struct LLMProviderFactory;

impl LLMProviderFactory {
    /// Create an LLM provider from configuration.
    ///
    /// Missing fields fall back to provider-specific environment variables
    /// (`OPENAI_API_KEY`, `GROQ_API_KEY`, `OLLAMA_BASE_URL`, ...) and then
    /// to built-in defaults.
    #[cfg(feature = "llm-openai")]
    pub fn create(config: &LLMProviderConfig) -> Result<Arc<dyn LLMProvider>> {
        let model = Some(config.model.clone()).filter(|m| !m.is_empty());

        let provider = match config.provider {
            LLMProviderKind::OpenAI => {
                let model = model
                    .or_else(|| std::env::var("OPENAI_MODEL").ok())
                    .unwrap_or_else(|| DEFAULT_MODEL.to_string());
                match &config.api_key {
                    Some(key) => OpenAIProvider::with_base_url(
                        Some(key.clone()),
                        model,
                        config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL),
                    ),
                    None => OpenAIProvider::from_env(Some(model))?,
                }
            }
            LLMProviderKind::Ollama => {
                let base_url = config
                    .base_url
                    .clone()
                    .or_else(|| std::env::var("OLLAMA_BASE_URL").ok())
                    .unwrap_or_else(|| OLLAMA_BASE_URL.to_string());
                OpenAIProvider::with_base_url(
                    config.api_key.clone(),
                    model.unwrap_or_else(|| OLLAMA_MODEL.to_string()),
                    base_url,
                )
            }
            LLMProviderKind::Groq => {
                let api_key = config
                    .api_key
                    .clone()
                    .or_else(|| std::env::var("GROQ_API_KEY").ok())
                    .ok_or_else(|| {
                        crate::error::FlockError::Configuration(
                            "GROQ_API_KEY environment variable not set".to_string(),
                        )
                    })?;
                OpenAIProvider::with_base_url(
                    Some(api_key),
                    model
                        .or_else(|| std::env::var("GROQ_MODEL").ok())
                        .unwrap_or_else(|| GROQ_MODEL.to_string()),
                    config.base_url.as_deref().unwrap_or(GROQ_BASE_URL),
                )
            }
        };

        tracing::info!(
            provider = ?config.provider,
            model = %provider.model(),
            base_url = %provider.base_url(),
            "Created LLM provider"
        );
        Ok(Arc::new(provider))
    }

    #[cfg(not(feature = "llm-openai"))]
    pub fn create(_config: &LLMProviderConfig) -> Result<Arc<dyn LLMProvider>> {
        Err(crate::error::FlockError::Configuration(
            "HTTP LLM providers require the 'llm-openai' feature".to_string(),
        ))
    }

    /// Create from an optional config section
    pub fn from_config(config: Option<&LLMProviderConfig>) -> Result<Option<Arc<dyn LLMProvider>>> {
        match config {
            Some(cfg) => Ok(Some(Self::create(cfg)?)),
            None => Ok(None),
        }
    }
}

#[cfg(all(test, feature = "llm-openai"))]
mod tests {
    use super::*;

    #[test]
    fn test_ollama_needs_no_key() {
        let config = LLMProviderConfig {
            provider: LLMProviderKind::Ollama,
            model: "qwen3".to_string(),
            api_key: None,
            base_url: Some("http://gpu-box:11434/v1".to_string()),
        };
        let provider = LLMProviderFactory::create(&config).unwrap();
        let info = provider.model_info();
        assert_eq!(info.model_name, "qwen3");
    }

    #[test]
    fn test_explicit_key_skips_env() {
        let config = LLMProviderConfig {
            provider: LLMProviderKind::OpenAI,
            model: "gpt-4o".to_string(),
            api_key: Some("sk-test".to_string()),
            base_url: None,
        };
        assert!(LLMProviderFactory::create(&config).is_ok());
    }

    #[test]
    fn test_absent_section_yields_none() {
        assert!(LLMProviderFactory::from_config(None).unwrap().is_none());
    }
}

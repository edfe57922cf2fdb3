//! Runtime configuration assembled once from the command line and environment.

use log::{ info, warn };
use url::Url;

use crate::cli::Args;
use crate::error::{ GatewayError, Result };
use crate::llm::{ normalize_api_key, LlmConfig, LlmType };
use crate::store::{ StoreConfig, StoreType };

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub chat: LlmConfig,
    pub embedding: LlmConfig,
    pub store: StoreConfig,
}

impl GatewayConfig {
    pub fn from_args(args: &Args) -> Result<Self> {
        let chat = LlmConfig {
            llm_type: parse_llm_type(&args.chat_llm_type)?,
            api_key: non_empty(&args.chat_api_key),
            completion_model: args.chat_model.clone(),
            embedding_model: None,
            base_url: validate_url(args.chat_base_url.as_deref())?,
            embedding_dimension: None,
        };

        let embedding = LlmConfig {
            llm_type: parse_llm_type(&args.embedding_llm_type)?,
            api_key: non_empty(&args.embedding_api_key),
            completion_model: None,
            embedding_model: args.embedding_model.clone(),
            base_url: validate_url(args.embedding_base_url.as_deref())?,
            embedding_dimension: args.embedding_dimension,
        };

        let store = StoreConfig {
            store_type: args.store_type.parse::<StoreType>()?,
            redis_url: args.store_host.clone(),
            key_prefix: args.store_prefix.clone(),
        };

        let config = Self { chat, embedding, store };
        config.warn_missing_credentials();
        Ok(config)
    }

    fn warn_missing_credentials(&self) {
        for (purpose, llm) in [("chat", &self.chat), ("embedding", &self.embedding)] {
            if !llm.llm_type.is_local() && llm.credential().is_none() {
                warn!("{} provider {} has no usable API key configured", purpose, llm.llm_type);
            }
        }
    }

    pub fn log_summary(&self) {
        info!("--- Core Configuration ---");
        info!("Chat LLM Type: {}", self.chat.llm_type);
        info!("Chat Model: {}", self.chat.completion_model.as_deref().unwrap_or("adapter default"));
        info!("Chat Base URL: {}", self.chat.base_url.as_deref().unwrap_or("adapter default"));
        info!("Embedding LLM Type: {}", self.embedding.llm_type);
        info!(
            "Embedding Model: {}",
            self.embedding.embedding_model.as_deref().unwrap_or("adapter default")
        );
        info!("Store Type: {}", self.store.store_type);
        if self.store.store_type == StoreType::Redis {
            info!("Store Host: {}", self.store.redis_url);
        }
        info!("-------------------------");
    }
}

fn parse_llm_type(value: &str) -> Result<LlmType> {
    value.parse().map_err(|e| GatewayError::Config(format!("{}", e)))
}

fn non_empty(key: &str) -> Option<String> {
    normalize_api_key(Some(key)).map(str::to_string)
}

fn validate_url(value: Option<&str>) -> Result<Option<String>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => {
            Url::parse(raw).map_err(|e| GatewayError::Config(format!("invalid base URL '{}': {}", raw, e)))?;
            Ok(Some(raw.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use pretty_assertions::assert_eq;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["llm-gateway"];
        argv.extend_from_slice(extra);
        argv.push("conversations");
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn builds_config_from_args() {
        let config = GatewayConfig::from_args(
            &args(&[
                "--chat-llm-type",
                "Groq",
                "--chat-api-key",
                "gsk-1",
                "--chat-base-url",
                "https://proxy.local/v1",
                "--embedding-llm-type",
                "ollama",
                "--embedding-model",
                "nomic-embed-text",
                "--store-type",
                "memory",
            ])
        ).unwrap();

        assert_eq!(config.chat.llm_type, LlmType::Groq);
        assert_eq!(config.chat.api_key.as_deref(), Some("gsk-1"));
        assert_eq!(config.chat.base_url.as_deref(), Some("https://proxy.local/v1"));
        assert_eq!(config.embedding.llm_type, LlmType::Ollama);
        assert_eq!(config.embedding.embedding_model.as_deref(), Some("nomic-embed-text"));
        assert_eq!(config.store.store_type, StoreType::Memory);
    }

    #[test]
    fn placeholder_key_is_dropped() {
        let config = GatewayConfig::from_args(
            &args(&["--chat-llm-type", "openai", "--chat-api-key", "your-api-key-here"])
        ).unwrap();
        assert_eq!(config.chat.api_key, None);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(GatewayConfig::from_args(&args(&["--chat-llm-type", "mystery"])).is_err());
        assert!(GatewayConfig::from_args(&args(&["--chat-base-url", "not a url"])).is_err());
        assert!(GatewayConfig::from_args(&args(&["--store-type", "sqlite"])).is_err());
    }
}

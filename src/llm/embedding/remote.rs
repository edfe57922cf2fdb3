use async_trait::async_trait;
use log::{ debug, warn };
use rllm::{ builder::LLMBuilder, LLMProvider };

use super::{ known_dimension, EmbeddingClient, DEFAULT_DIMENSION };
use crate::error::{ GatewayError, Result };
use crate::llm::{ LlmConfig, LlmType, DEFAULT_EMBEDDING_MODEL };

/// Embedding client that calls the configured backend's embedding endpoint.
pub struct RemoteEmbeddingClient {
    llm_type: LlmType,
    /// `None` when a hosted backend has no API key.
    llm: Option<Box<dyn LLMProvider>>,
    model: String,
    dimension: usize,
    check_dimension: bool,
}

impl RemoteEmbeddingClient {
    pub fn new(
        llm_type: LlmType,
        api_key: Option<String>,
        model: Option<String>,
        base_url: Option<String>,
        dimension: Option<usize>
    ) -> Result<Self> {
        let model_name = model.unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string());
        let expected = dimension.or_else(|| known_dimension(&model_name));
        let api_key = crate::llm::normalize_api_key(api_key.as_deref()).map(str::to_string);

        let llm = match api_key {
            None if !llm_type.is_local() => {
                warn!(
                    "No API key configured for {} embeddings. Embedding calls will return zero vectors.",
                    llm_type
                );
                None
            }
            key => {
                let mut builder = LLMBuilder::new().backend(llm_type.backend()).model(&model_name);
                if let Some(key) = key {
                    builder = builder.api_key(key);
                }
                if let Some(url) = base_url {
                    builder = builder.base_url(url);
                }
                if let Some(dims) = dimension {
                    builder = builder.embedding_dimensions(dims as u32);
                }
                let llm = builder.build().map_err(|e| GatewayError::Config(e.to_string()))?;
                Some(llm)
            }
        };

        Ok(Self {
            llm_type,
            llm,
            model: model_name,
            dimension: expected.unwrap_or(DEFAULT_DIMENSION),
            check_dimension: expected.is_some(),
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        Self::new(
            config.llm_type,
            config.api_key.clone(),
            config.embedding_model.clone(),
            config.base_url.clone(),
            config.embedding_dimension
        )
    }
}

#[async_trait]
impl EmbeddingClient for RemoteEmbeddingClient {
    async fn try_embed(&self, text: &str) -> Result<Vec<f32>> {
        let llm = self.llm
            .as_ref()
            .ok_or_else(|| GatewayError::AuthenticationMissing(self.llm_type.to_string()))?;

        debug!("Generating embedding with model: {}", self.model);
        let mut embeddings = llm
            .embed(vec![text.to_string()]).await
            .map_err(|e| GatewayError::ProviderUnavailable(e.to_string()))?;
        let embedding = embeddings
            .pop()
            .ok_or_else(|| {
                GatewayError::ProviderUnavailable(
                    format!("{} embedding generation returned no results", self.llm_type)
                )
            })?;

        if self.check_dimension && embedding.len() != self.dimension {
            return Err(GatewayError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }

        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn missing_key_yields_zero_vector_of_model_dimension() {
        let client = RemoteEmbeddingClient::new(LlmType::OpenAI, None, None, None, None).unwrap();
        assert_eq!(client.dimension(), 1536);

        let embedding = client.embed_one("hello").await;
        assert_eq!(embedding.len(), 1536);
        assert!(embedding.iter().all(|x| *x == 0.0));

        let err = client.try_embed("hello").await.unwrap_err();
        assert!(matches!(err, GatewayError::AuthenticationMissing(_)));
    }

    #[tokio::test]
    async fn unreachable_backend_yields_zero_vector() {
        let client = RemoteEmbeddingClient::new(
            LlmType::Ollama,
            None,
            Some("nomic-embed-text".into()),
            Some("http://127.0.0.1:9".into()),
            None
        ).unwrap();

        let embeddings = client.embed_many(&["a".to_string(), "b".to_string()]).await;
        assert_eq!(embeddings.len(), 2);
        assert!(embeddings.iter().all(|e| e.len() == 768 && e.iter().all(|x| *x == 0.0)));
    }

    #[test]
    fn configured_dimension_overrides_model_table() {
        let client = RemoteEmbeddingClient::new(
            LlmType::OpenAI,
            Some("sk-test".into()),
            Some("text-embedding-3-large".into()),
            None,
            Some(256)
        ).unwrap();
        assert_eq!(client.dimension(), 256);
        assert_eq!(client.model(), "text-embedding-3-large");
    }
}

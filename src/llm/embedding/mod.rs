pub mod remote;

use async_trait::async_trait;
use log::{ info, warn };
use std::sync::Arc;

use super::LlmConfig;
use self::remote::RemoteEmbeddingClient;
use crate::error::Result;

/// Dimension assumed for models missing from [`known_dimension`] when none is configured.
pub const DEFAULT_DIMENSION: usize = 1536;

/// Output dimension of well-known embedding models.
pub fn known_dimension(model: &str) -> Option<usize> {
    let name = model.split(':').next().unwrap_or(model);
    match name {
        "text-embedding-3-small" | "text-embedding-ada-002" => Some(1536),
        "text-embedding-3-large" => Some(3072),
        "nomic-embed-text" => Some(768),
        "mxbai-embed-large" => Some(1024),
        "all-minilm" => Some(384),
        _ => None,
    }
}

#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Embeds `text`, propagating every failure.
    async fn try_embed(&self, text: &str) -> Result<Vec<f32>>;

    fn dimension(&self) -> usize;

    fn model(&self) -> &str;

    /// Embeds `text`, substituting a zero vector of [`dimension`](Self::dimension) on any
    /// failure. A zero result is indistinguishable from a failed call; use
    /// [`try_embed`](Self::try_embed) when that matters.
    async fn embed_one(&self, text: &str) -> Vec<f32> {
        match self.try_embed(text).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!(
                    "Embedding with {} failed ({}), using a zero vector of dimension {}",
                    self.model(),
                    e,
                    self.dimension()
                );
                vec![0.0; self.dimension()]
            }
        }
    }

    /// One embedding per input, in input order. Requests are sent one at a time.
    async fn embed_many(&self, texts: &[String]) -> Vec<Vec<f32>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed_one(text).await);
        }
        results
    }
}

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn EmbeddingClient>> {
    let client = RemoteEmbeddingClient::from_config(config)?;
    info!(
        "Embedding client configured: Type={}, Model={}, Dimension={}",
        config.llm_type,
        client.model(),
        client.dimension()
    );
    Ok(Arc::new(client))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    /// Fails for any text containing "fail", otherwise embeds the text length.
    struct ScriptedClient {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EmbeddingClient for ScriptedClient {
        async fn try_embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.lock().unwrap().push(text.to_string());
            if text.contains("fail") {
                return Err(GatewayError::ProviderUnavailable("boom".into()));
            }
            Ok(vec![text.len() as f32, 1.0, 0.0])
        }

        fn dimension(&self) -> usize {
            3
        }

        fn model(&self) -> &str {
            "scripted"
        }
    }

    fn scripted() -> ScriptedClient {
        ScriptedClient { calls: Mutex::new(Vec::new()) }
    }

    #[tokio::test]
    async fn embed_one_substitutes_zero_vector_on_failure() {
        let client = scripted();
        assert_eq!(client.embed_one("ok").await, vec![2.0, 1.0, 0.0]);
        assert_eq!(client.embed_one("fail").await, vec![0.0, 0.0, 0.0]);
        assert!(client.try_embed("fail").await.is_err());
    }

    #[tokio::test]
    async fn embed_many_preserves_order_and_calls_sequentially() {
        let client = scripted();
        let texts = vec!["a".to_string(), "will fail".to_string(), "ccc".to_string()];
        let out = client.embed_many(&texts).await;

        assert_eq!(out, vec![vec![1.0, 1.0, 0.0], vec![0.0, 0.0, 0.0], vec![3.0, 1.0, 0.0]]);
        assert_eq!(*client.calls.lock().unwrap(), texts);
    }

    #[test]
    fn known_dimensions() {
        assert_eq!(known_dimension("text-embedding-3-small"), Some(1536));
        assert_eq!(known_dimension("text-embedding-3-large"), Some(3072));
        assert_eq!(known_dimension("nomic-embed-text:latest"), Some(768));
        assert_eq!(known_dimension("custom"), None);
    }
}

//! Persistence for stored embeddings and conversations.
//!
//! Both stores sit behind traits so the in-memory and Redis backends are interchangeable.
//! Nearest-neighbour search is a provided method on [`EmbeddingStore`]: it reads every
//! record through [`EmbeddingStore::get_all`] and ranks them by cosine similarity, so
//! all backends share one brute-force scan and one tie-breaking rule.

mod memory;
mod redis;

pub use self::memory::{ MemoryConversationStore, MemoryEmbeddingStore };
pub use self::redis::{ RedisConversationStore, RedisEmbeddingStore };

use async_trait::async_trait;
use chrono::{ DateTime, Utc };
use log::info;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{ GatewayError, Result };
use crate::models::{ Conversation, Message, Role, StoredEmbedding };
use crate::similarity::rank_by_similarity;

pub const DEFAULT_SEARCH_LIMIT: i64 = 5;
pub const DEFAULT_CONVERSATION_MODEL: &str = "gpt-4-turbo";

#[async_trait]
pub trait EmbeddingStore: Send + Sync {
    async fn store(&self, text: &str, embedding: Vec<f32>, model_name: &str) -> Result<StoredEmbedding>;

    /// All records, newest first.
    async fn get_all(&self) -> Result<Vec<StoredEmbedding>>;

    async fn get_by_id(&self, id: u64) -> Result<Option<StoredEmbedding>>;

    async fn delete(&self, id: u64) -> Result<()>;

    /// Up to `k` records ranked by descending cosine similarity to `query`.
    ///
    /// Records whose dimension differs from the query score 0.0. Ties keep the
    /// [`get_all`](Self::get_all) order. The scan reads a point-in-time snapshot;
    /// concurrent writes may or may not be reflected.
    async fn search(&self, query: &[f32], k: i64) -> Result<Vec<StoredEmbedding>> {
        if k <= 0 {
            return Ok(Vec::new());
        }
        let records = self.get_all().await?;
        Ok(rank_by_similarity(query, records, k, |record| record.embedding.as_slice()))
    }
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Creates an empty conversation. A missing title gets a timestamped default.
    async fn create(&self, title: Option<String>, model_name: &str) -> Result<Conversation>;

    /// The conversation with its messages in creation order.
    async fn get_by_id(&self, id: u64) -> Result<Option<Conversation>>;

    /// All conversations with their messages, newest first.
    async fn get_all(&self) -> Result<Vec<Conversation>>;

    /// Replaces the title when a non-empty one is given and refreshes `updated_at`.
    async fn update(&self, id: u64, title: Option<String>) -> Result<Conversation>;

    /// Deletes the conversation and all of its messages.
    async fn delete(&self, id: u64) -> Result<()>;

    async fn add_message(&self, conversation_id: u64, role: Role, content: &str) -> Result<Message>;

    async fn get_messages(&self, conversation_id: u64) -> Result<Vec<Message>>;
}

pub(crate) fn default_title(now: DateTime<Utc>) -> String {
    format!("Conversation at {}", now.format("%Y-%m-%d %H:%M:%S"))
}

pub(crate) fn apply_title(conversation: &mut Conversation, title: Option<String>) {
    if let Some(title) = title.filter(|t| !t.is_empty()) {
        conversation.title = Some(title);
    }
    conversation.updated_at = Utc::now();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreType {
    Memory,
    Redis,
}

impl fmt::Display for StoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreType::Memory => f.write_str("memory"),
            StoreType::Redis => f.write_str("redis"),
        }
    }
}

impl FromStr for StoreType {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(StoreType::Memory),
            "redis" => Ok(StoreType::Redis),
            _ => Err(GatewayError::Config(format!("Unsupported store type: {}", s))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub store_type: StoreType,
    pub redis_url: String,
    pub key_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_type: StoreType::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "gateway:".to_string(),
        }
    }
}

pub fn create_stores(
    config: &StoreConfig
) -> Result<(Arc<dyn EmbeddingStore>, Arc<dyn ConversationStore>)> {
    info!("Records will be stored in: {}", config.store_type);
    match config.store_type {
        StoreType::Memory => {
            Ok((Arc::new(MemoryEmbeddingStore::new()), Arc::new(MemoryConversationStore::new())))
        }
        StoreType::Redis => {
            info!("Redis store at {} with prefix '{}'", config.redis_url, config.key_prefix);
            let embeddings = RedisEmbeddingStore::new(&config.redis_url, &config.key_prefix)?;
            let conversations = RedisConversationStore::new(&config.redis_url, &config.key_prefix)?;
            Ok((Arc::new(embeddings), Arc::new(conversations)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_title_uses_utc_timestamp() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(default_title(now), "Conversation at 2024-03-09 07:05:01");
    }

    #[test]
    fn parses_store_type() {
        assert_eq!("Redis".parse::<StoreType>().unwrap(), StoreType::Redis);
        assert_eq!("memory".parse::<StoreType>().unwrap(), StoreType::Memory);
        assert!("sqlite".parse::<StoreType>().is_err());
    }
}

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::{ apply_title, default_title, ConversationStore, EmbeddingStore };
use crate::error::{ GatewayError, Result };
use crate::models::{ Conversation, Message, Role, StoredEmbedding };

/// In-process embedding store. Ids increase with insertion, so map order is creation order.
#[derive(Default)]
pub struct MemoryEmbeddingStore {
    table: RwLock<EmbeddingTable>,
}

#[derive(Default)]
struct EmbeddingTable {
    last_id: u64,
    rows: BTreeMap<u64, StoredEmbedding>,
}

impl MemoryEmbeddingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EmbeddingStore for MemoryEmbeddingStore {
    async fn store(&self, text: &str, embedding: Vec<f32>, model_name: &str) -> Result<StoredEmbedding> {
        let mut table = self.table.write().await;
        table.last_id += 1;
        let now = Utc::now();
        let record = StoredEmbedding {
            id: table.last_id,
            text: text.to_string(),
            embedding,
            model_name: model_name.to_string(),
            created_at: now,
            updated_at: now,
        };
        table.rows.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_all(&self) -> Result<Vec<StoredEmbedding>> {
        let table = self.table.read().await;
        Ok(table.rows.values().rev().cloned().collect())
    }

    async fn get_by_id(&self, id: u64) -> Result<Option<StoredEmbedding>> {
        Ok(self.table.read().await.rows.get(&id).cloned())
    }

    async fn delete(&self, id: u64) -> Result<()> {
        self.table.write().await.rows
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| GatewayError::not_found("embedding", id))
    }
}

/// In-process conversation store. Messages live inside their conversation.
#[derive(Default)]
pub struct MemoryConversationStore {
    table: RwLock<ConversationTable>,
}

#[derive(Default)]
struct ConversationTable {
    last_conversation_id: u64,
    last_message_id: u64,
    rows: BTreeMap<u64, Conversation>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn create(&self, title: Option<String>, model_name: &str) -> Result<Conversation> {
        let mut table = self.table.write().await;
        table.last_conversation_id += 1;
        let now = Utc::now();
        let conversation = Conversation {
            id: table.last_conversation_id,
            title: Some(title.unwrap_or_else(|| default_title(now))),
            model_name: model_name.to_string(),
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
        };
        table.rows.insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn get_by_id(&self, id: u64) -> Result<Option<Conversation>> {
        Ok(self.table.read().await.rows.get(&id).cloned())
    }

    async fn get_all(&self) -> Result<Vec<Conversation>> {
        let table = self.table.read().await;
        Ok(table.rows.values().rev().cloned().collect())
    }

    async fn update(&self, id: u64, title: Option<String>) -> Result<Conversation> {
        let mut table = self.table.write().await;
        let conversation = table.rows
            .get_mut(&id)
            .ok_or_else(|| GatewayError::not_found("conversation", id))?;
        apply_title(conversation, title);
        Ok(conversation.clone())
    }

    async fn delete(&self, id: u64) -> Result<()> {
        self.table.write().await.rows
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| GatewayError::not_found("conversation", id))
    }

    async fn add_message(&self, conversation_id: u64, role: Role, content: &str) -> Result<Message> {
        let mut table = self.table.write().await;
        if !table.rows.contains_key(&conversation_id) {
            return Err(GatewayError::not_found("conversation", conversation_id));
        }
        table.last_message_id += 1;
        let message = Message {
            id: table.last_message_id,
            conversation_id,
            role,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        if let Some(conversation) = table.rows.get_mut(&conversation_id) {
            conversation.messages.push(message.clone());
            conversation.updated_at = message.created_at;
        }
        Ok(message)
    }

    async fn get_messages(&self, conversation_id: u64) -> Result<Vec<Message>> {
        let table = self.table.read().await;
        let conversation = table.rows
            .get(&conversation_id)
            .ok_or_else(|| GatewayError::not_found("conversation", conversation_id))?;
        let mut messages = conversation.messages.clone();
        messages.sort_by_key(|m| (m.created_at, m.id));
        Ok(messages)
    }
}

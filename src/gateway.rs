use log::{ debug, info };
use serde_json::Value;
use std::sync::Arc;

use crate::config::GatewayConfig;
use crate::error::{ GatewayError, Result };
use crate::llm::chat::{ new_client as new_chat_client, ChatClient };
use crate::llm::embedding::{ new_client as new_embedding_client, EmbeddingClient };
use crate::llm::stream::ChatStream;
use crate::models::{ ChatMessage, Role, StoredEmbedding };
use crate::similarity::cosine_similarity;
use crate::store::{ create_stores, ConversationStore, EmbeddingStore };

const JSON_SYSTEM_PROMPT: &str =
    "You MUST respond with ONLY valid JSON that conforms to the provided schema, no other text.";

/// Per-call options for [`Gateway::chat`].
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub system: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Stored conversation to replay and extend with this turn.
    pub conversation_id: Option<u64>,
}

/// Ties the configured providers to the record stores.
#[derive(Clone)]
pub struct Gateway {
    chat_client: Arc<dyn ChatClient>,
    embedding_client: Arc<dyn EmbeddingClient>,
    embedding_store: Arc<dyn EmbeddingStore>,
    conversation_store: Arc<dyn ConversationStore>,
}

impl Gateway {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let chat_client = new_chat_client(&config.chat)?;
        let embedding_client = new_embedding_client(&config.embedding)?;
        let (embedding_store, conversation_store) = create_stores(&config.store)?;

        Ok(Self::from_parts(chat_client, embedding_client, embedding_store, conversation_store))
    }

    pub fn from_parts(
        chat_client: Arc<dyn ChatClient>,
        embedding_client: Arc<dyn EmbeddingClient>,
        embedding_store: Arc<dyn EmbeddingStore>,
        conversation_store: Arc<dyn ConversationStore>
    ) -> Self {
        Self { chat_client, embedding_client, embedding_store, conversation_store }
    }

    pub fn embedding_store(&self) -> &Arc<dyn EmbeddingStore> {
        &self.embedding_store
    }

    pub fn conversation_store(&self) -> &Arc<dyn ConversationStore> {
        &self.conversation_store
    }

    /// Sends `prompt` and returns the full reply.
    ///
    /// With a conversation id the stored history goes ahead of the prompt and both the
    /// prompt and the reply are appended to the conversation afterwards. A failed
    /// completion leaves the conversation untouched.
    pub async fn chat(&self, prompt: &str, options: ChatOptions) -> Result<String> {
        let history = match options.conversation_id {
            Some(id) => {
                let conversation = self.conversation_store
                    .get_by_id(id).await?
                    .ok_or_else(|| GatewayError::not_found("conversation", id))?;
                debug!("Replaying {} messages from conversation {}", conversation.messages.len(), id);
                conversation.chat_history()
            }
            None => Vec::new(),
        };

        let messages = build_messages(options.system.as_deref(), history, prompt);
        let reply = self.chat_client.complete(
            &messages,
            options.temperature,
            options.max_tokens
        ).await?;

        if let Some(id) = options.conversation_id {
            self.conversation_store.add_message(id, Role::User, prompt).await?;
            self.conversation_store.add_message(id, Role::Assistant, &reply).await?;
        }
        Ok(reply)
    }

    pub fn chat_stream(&self, prompt: &str, system: Option<&str>) -> ChatStream {
        let messages = build_messages(system, Vec::new(), prompt);
        self.chat_client.complete_stream(&messages)
    }

    /// Asks for a JSON reply shaped by `schema` (free-form instructions or a JSON Schema)
    /// and parses it. Replies wrapped in a markdown code fence are accepted.
    pub async fn chat_json(&self, prompt: &str, schema: &str) -> Result<Value> {
        let system = format!("{}\n\n{}", JSON_SYSTEM_PROMPT, schema);
        let options = ChatOptions { system: Some(system), temperature: Some(0.0), ..Default::default() };
        let reply = self.chat(prompt, options).await?;
        Ok(serde_json::from_str(strip_code_fence(&reply))?)
    }

    /// Embeds each text and stores it under the embedding model's name.
    pub async fn embed_and_store(&self, texts: &[String]) -> Result<Vec<StoredEmbedding>> {
        let embeddings = self.embedding_client.embed_many(texts).await;
        let model = self.embedding_client.model();

        let mut stored = Vec::with_capacity(texts.len());
        for (text, embedding) in texts.iter().zip(embeddings) {
            stored.push(self.embedding_store.store(text, embedding, model).await?);
        }
        info!("Stored {} embeddings with {}", stored.len(), model);
        Ok(stored)
    }

    pub async fn search(&self, query: &str, k: i64) -> Result<Vec<StoredEmbedding>> {
        let query = self.embedding_client.embed_one(query).await;
        self.embedding_store.search(&query, k).await
    }

    pub async fn similarity(&self, first: &str, second: &str) -> Result<f32> {
        let a = self.embedding_client.embed_one(first).await;
        let b = self.embedding_client.embed_one(second).await;
        cosine_similarity(&a, &b)
    }
}

fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    // drop the language tag on the opening fence
    match inner.split_once('\n') {
        Some((tag, body)) if !tag.trim_start().starts_with(&['{', '['][..]) => body.trim(),
        _ => inner.trim(),
    }
}

fn build_messages(system: Option<&str>, history: Vec<ChatMessage>, prompt: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    if let Some(system) = system.filter(|s| !s.is_empty()) {
        messages.push(ChatMessage::system(system));
    }
    messages.extend(history);
    messages.push(ChatMessage::user(prompt));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::chat::full_response_as_stream;
    use crate::store::{ MemoryConversationStore, MemoryEmbeddingStore };
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    /// Replies with the number of messages it was sent.
    #[derive(Default)]
    struct CountingChat {
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    #[async_trait]
    impl ChatClient for CountingChat {
        async fn complete(
            &self,
            messages: &[ChatMessage],
            _temperature: Option<f32>,
            _max_tokens: Option<u32>
        ) -> Result<String> {
            self.seen.lock().unwrap().push(messages.to_vec());
            Ok(format!("{} messages", messages.len()))
        }

        fn complete_stream(&self, messages: &[ChatMessage]) -> ChatStream {
            let text = format!("{} messages", messages.len());
            full_response_as_stream(async move { Ok(text) })
        }

        fn name(&self) -> &str {
            "counting"
        }

        fn model(&self) -> &str {
            "counting"
        }
    }

    /// Maps a few known words onto fixed axes.
    struct AxisEmbedder;

    #[async_trait]
    impl EmbeddingClient for AxisEmbedder {
        async fn try_embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(match text {
                "cat" | "kitten" => vec![1.0, 0.0],
                "dog" => vec![0.9, 0.1],
                _ => vec![0.0, 1.0],
            })
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model(&self) -> &str {
            "axis"
        }
    }

    fn gateway(chat: Arc<CountingChat>) -> Gateway {
        Gateway::from_parts(
            chat,
            Arc::new(AxisEmbedder),
            Arc::new(MemoryEmbeddingStore::new()),
            Arc::new(MemoryConversationStore::new())
        )
    }

    #[tokio::test]
    async fn chat_replays_and_extends_conversation() {
        let chat = Arc::new(CountingChat::default());
        let gateway = gateway(chat.clone());
        let conversation = gateway.conversation_store().create(None, "counting").await.unwrap();
        let options = ChatOptions { conversation_id: Some(conversation.id), ..Default::default() };

        assert_eq!(gateway.chat("hi", options.clone()).await.unwrap(), "1 messages");
        let with_system = ChatOptions { system: Some("be brief".into()), ..options };
        assert_eq!(gateway.chat("again", with_system).await.unwrap(), "4 messages");

        let sent = chat.seen.lock().unwrap().last().cloned().unwrap();
        assert_eq!(sent[0], ChatMessage::system("be brief"));
        assert_eq!(sent[1], ChatMessage::user("hi"));
        assert_eq!(sent[2], ChatMessage::assistant("1 messages"));
        assert_eq!(sent[3], ChatMessage::user("again"));

        let stored = gateway.conversation_store().get_messages(conversation.id).await.unwrap();
        assert_eq!(stored.len(), 4);
    }

    #[tokio::test]
    async fn chat_with_unknown_conversation_fails_before_calling_provider() {
        let chat = Arc::new(CountingChat::default());
        let gateway = gateway(chat.clone());
        let options = ChatOptions { conversation_id: Some(42), ..Default::default() };

        let err = gateway.chat("hi", options).await.unwrap_err();
        assert!(matches!(err, GatewayError::NotFound { entity: "conversation", id: 42 }));
        assert!(chat.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn search_finds_stored_neighbours() {
        let gateway = gateway(Arc::new(CountingChat::default()));
        let texts = vec!["cat".to_string(), "dog".to_string(), "car".to_string()];
        let stored = gateway.embed_and_store(&texts).await.unwrap();
        assert_eq!(stored[0].model_name, "axis");

        let results = gateway.search("kitten", 2).await.unwrap();
        let found: Vec<&str> = results.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(found, vec!["cat", "dog"]);
    }

    #[test]
    fn code_fences_are_stripped() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fence("```{\"a\":1}```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("  {\"a\":1} "), "{\"a\":1}");
    }

    #[tokio::test]
    async fn chat_json_rejects_prose() {
        let gateway = gateway(Arc::new(CountingChat::default()));
        let err = gateway.chat_json("who?", "{\"type\":\"object\"}").await.unwrap_err();
        assert!(matches!(err, GatewayError::Serialization(_)));
    }

    #[tokio::test]
    async fn similarity_of_identical_meanings_is_one() {
        let gateway = gateway(Arc::new(CountingChat::default()));
        let score = gateway.similarity("cat", "kitten").await.unwrap();
        assert!((score - 1.0).abs() < 1e-6);
    }
}

use async_trait::async_trait;
use chrono::{ DateTime, SecondsFormat, Utc };
use log::{ debug, error };
use redis::{ aio::MultiplexedConnection, AsyncCommands, Client, Script };
use serde::de::DeserializeOwned;

use super::{ default_title, ConversationStore, EmbeddingStore };
use crate::error::{ GatewayError, Result };
use crate::models::{ Conversation, Message, Role, StoredEmbedding };

/// Appends ARGV[1] to the message list and stamps ARGV[2] as the header's `updated_at`,
/// only while the header exists. Returns 0 when it does not.
const ADD_MESSAGE_SCRIPT: &str =
    r"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return 0
end
redis.call('RPUSH', KEYS[2], ARGV[1])
local header = cjson.decode(redis.call('GET', KEYS[1]))
header['updated_at'] = ARGV[2]
header['messages'] = nil
redis.call('SET', KEYS[1], cjson.encode(header))
return 1
";

/// Replaces the title with ARGV[1] when non-empty and stamps ARGV[2] as `updated_at`.
/// Returns the new header, or nil when the conversation does not exist.
const UPDATE_SCRIPT: &str =
    r"
local raw = redis.call('GET', KEYS[1])
if not raw then
    return false
end
local header = cjson.decode(raw)
if ARGV[1] ~= '' then
    header['title'] = ARGV[1]
end
header['updated_at'] = ARGV[2]
header['messages'] = nil
local encoded = cjson.encode(header)
redis.call('SET', KEYS[1], encoded)
return encoded
";

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Key layout shared by both Redis stores.
#[derive(Debug, Clone)]
struct Keys {
    prefix: String,
}

impl Keys {
    fn seq(&self, entity: &str) -> String {
        format!("{}{}:seq", self.prefix, entity)
    }

    fn embedding(&self, id: u64) -> String {
        format!("{}embedding:{}", self.prefix, id)
    }

    fn embeddings(&self) -> String {
        format!("{}embeddings", self.prefix)
    }

    fn conversation(&self, id: u64) -> String {
        format!("{}conversation:{}", self.prefix, id)
    }

    fn messages(&self, conversation_id: u64) -> String {
        format!("{}conversation:{}:messages", self.prefix, conversation_id)
    }

    fn conversations(&self) -> String {
        format!("{}conversations", self.prefix)
    }
}

async fn connect(client: &Client) -> Result<MultiplexedConnection> {
    Ok(client.get_multiplexed_async_connection().await?)
}

fn decode<T: DeserializeOwned>(raw: &str) -> Option<T> {
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            error!("Skipping unreadable record: {}", e);
            None
        }
    }
}

/// Ids of an index sorted set, newest first. Scores are the ids themselves.
async fn newest_ids(conn: &mut MultiplexedConnection, index: &str) -> Result<Vec<u64>> {
    Ok(conn.zrevrange(index, 0, -1).await?)
}

async fn fetch_many<T: DeserializeOwned>(
    conn: &mut MultiplexedConnection,
    keys: Vec<String>
) -> Result<Vec<T>> {
    if keys.is_empty() {
        return Ok(Vec::new());
    }
    let raw: Vec<Option<String>> = redis::cmd("MGET").arg(&keys).query_async(conn).await?;
    Ok(raw.iter().flatten().filter_map(|r| decode(r)).collect())
}

/// Embedding records as JSON strings, indexed by a sorted set scored by id.
pub struct RedisEmbeddingStore {
    client: Client,
    keys: Keys,
}

impl RedisEmbeddingStore {
    pub fn new(url: &str, key_prefix: &str) -> Result<Self> {
        Ok(Self {
            client: Client::open(url)?,
            keys: Keys { prefix: key_prefix.to_string() },
        })
    }
}

#[async_trait]
impl EmbeddingStore for RedisEmbeddingStore {
    async fn store(&self, text: &str, embedding: Vec<f32>, model_name: &str) -> Result<StoredEmbedding> {
        let mut conn = connect(&self.client).await?;
        let id: u64 = conn.incr(self.keys.seq("embedding"), 1).await?;
        let now = Utc::now();
        let record = StoredEmbedding {
            id,
            text: text.to_string(),
            embedding,
            model_name: model_name.to_string(),
            created_at: now,
            updated_at: now,
        };

        let json = serde_json::to_string(&record)?;
        redis::pipe()
            .atomic()
            .set(self.keys.embedding(id), json)
            .ignore()
            .zadd(self.keys.embeddings(), id, id as f64)
            .ignore()
            .query_async::<_, ()>(&mut conn).await?;
        debug!("Stored embedding {} ({} dims)", id, record.embedding.len());
        Ok(record)
    }

    async fn get_all(&self) -> Result<Vec<StoredEmbedding>> {
        let mut conn = connect(&self.client).await?;
        let ids = newest_ids(&mut conn, &self.keys.embeddings()).await?;
        let keys = ids
            .into_iter()
            .map(|id| self.keys.embedding(id))
            .collect();
        fetch_many(&mut conn, keys).await
    }

    async fn get_by_id(&self, id: u64) -> Result<Option<StoredEmbedding>> {
        let mut conn = connect(&self.client).await?;
        let raw: Option<String> = conn.get(self.keys.embedding(id)).await?;
        Ok(raw.as_deref().and_then(decode))
    }

    async fn delete(&self, id: u64) -> Result<()> {
        let mut conn = connect(&self.client).await?;
        let (removed, _): (i64, i64) = redis::pipe()
            .atomic()
            .del(self.keys.embedding(id))
            .zrem(self.keys.embeddings(), id)
            .query_async(&mut conn).await?;
        if removed == 0 {
            return Err(GatewayError::not_found("embedding", id));
        }
        Ok(())
    }
}

/// Conversations as JSON strings plus one list of JSON messages per conversation.
pub struct RedisConversationStore {
    client: Client,
    keys: Keys,
}

impl RedisConversationStore {
    pub fn new(url: &str, key_prefix: &str) -> Result<Self> {
        Ok(Self {
            client: Client::open(url)?,
            keys: Keys { prefix: key_prefix.to_string() },
        })
    }

    async fn load(&self, conn: &mut MultiplexedConnection, id: u64) -> Result<Option<Conversation>> {
        let raw: Option<String> = conn.get(self.keys.conversation(id)).await?;
        Ok(raw.as_deref().and_then(decode))
    }

    async fn load_messages(&self, conn: &mut MultiplexedConnection, id: u64) -> Result<Vec<Message>> {
        let entries: Vec<String> = conn.lrange(self.keys.messages(id), 0, -1).await?;
        Ok(
            entries
                .iter()
                .filter_map(|e| decode(e))
                .collect()
        )
    }
}

#[async_trait]
impl ConversationStore for RedisConversationStore {
    async fn create(&self, title: Option<String>, model_name: &str) -> Result<Conversation> {
        let mut conn = connect(&self.client).await?;
        let id: u64 = conn.incr(self.keys.seq("conversation"), 1).await?;
        let now = Utc::now();
        let conversation = Conversation {
            id,
            title: Some(title.unwrap_or_else(|| default_title(now))),
            model_name: model_name.to_string(),
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
        };

        let json = serde_json::to_string(&conversation)?;
        redis::pipe()
            .atomic()
            .set(self.keys.conversation(id), json)
            .ignore()
            .zadd(self.keys.conversations(), id, id as f64)
            .ignore()
            .query_async::<_, ()>(&mut conn).await?;
        Ok(conversation)
    }

    async fn get_by_id(&self, id: u64) -> Result<Option<Conversation>> {
        let mut conn = connect(&self.client).await?;
        let Some(mut conversation) = self.load(&mut conn, id).await? else {
            return Ok(None);
        };
        conversation.messages = self.load_messages(&mut conn, id).await?;
        Ok(Some(conversation))
    }

    async fn get_all(&self) -> Result<Vec<Conversation>> {
        let mut conn = connect(&self.client).await?;
        let ids = newest_ids(&mut conn, &self.keys.conversations()).await?;
        let keys = ids
            .into_iter()
            .map(|id| self.keys.conversation(id))
            .collect();
        let mut conversations: Vec<Conversation> = fetch_many(&mut conn, keys).await?;
        if conversations.is_empty() {
            return Ok(conversations);
        }

        let mut pipe = redis::pipe();
        for conversation in &conversations {
            pipe.lrange(self.keys.messages(conversation.id), 0, -1);
        }
        let lists: Vec<Vec<String>> = pipe.query_async(&mut conn).await?;
        for (conversation, entries) in conversations.iter_mut().zip(lists) {
            conversation.messages = entries
                .iter()
                .filter_map(|e| decode(e))
                .collect();
        }
        Ok(conversations)
    }

    async fn update(&self, id: u64, title: Option<String>) -> Result<Conversation> {
        let mut conn = connect(&self.client).await?;
        let raw: Option<String> = Script::new(UPDATE_SCRIPT)
            .key(self.keys.conversation(id))
            .arg(title.unwrap_or_default())
            .arg(timestamp(Utc::now()))
            .invoke_async(&mut conn).await?;
        let raw = raw.ok_or_else(|| GatewayError::not_found("conversation", id))?;
        let mut conversation: Conversation = decode(&raw).ok_or_else(|| {
            GatewayError::Storage(format!("conversation {} has an unreadable header", id))
        })?;
        conversation.messages = self.load_messages(&mut conn, id).await?;
        Ok(conversation)
    }

    async fn delete(&self, id: u64) -> Result<()> {
        let mut conn = connect(&self.client).await?;
        let (removed, _, _): (i64, i64, i64) = redis::pipe()
            .atomic()
            .del(self.keys.conversation(id))
            .del(self.keys.messages(id))
            .zrem(self.keys.conversations(), id)
            .query_async(&mut conn).await?;
        if removed == 0 {
            return Err(GatewayError::not_found("conversation", id));
        }
        Ok(())
    }

    async fn add_message(&self, conversation_id: u64, role: Role, content: &str) -> Result<Message> {
        let mut conn = connect(&self.client).await?;
        let exists: bool = conn.exists(self.keys.conversation(conversation_id)).await?;
        if !exists {
            return Err(GatewayError::not_found("conversation", conversation_id));
        }

        let id: u64 = conn.incr(self.keys.seq("message"), 1).await?;
        let message = Message {
            id,
            conversation_id,
            role,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&message)?;

        // the header may be deleted after the check above; the script re-checks atomically
        let appended: i64 = Script::new(ADD_MESSAGE_SCRIPT)
            .key(self.keys.conversation(conversation_id))
            .key(self.keys.messages(conversation_id))
            .arg(json)
            .arg(timestamp(message.created_at))
            .invoke_async(&mut conn).await?;
        if appended == 0 {
            return Err(GatewayError::not_found("conversation", conversation_id));
        }
        Ok(message)
    }

    async fn get_messages(&self, conversation_id: u64) -> Result<Vec<Message>> {
        let mut conn = connect(&self.client).await?;
        let exists: bool = conn.exists(self.keys.conversation(conversation_id)).await?;
        if !exists {
            return Err(GatewayError::not_found("conversation", conversation_id));
        }
        let mut messages = self.load_messages(&mut conn, conversation_id).await?;
        messages.sort_by_key(|m| (m.created_at, m.id));
        Ok(messages)
    }
}

use chrono::{ DateTime, Utc };
use serde::{ Deserialize, Serialize };

/// Default embedding model name recorded with stored vectors.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredEmbedding {
    pub id: u64,
    pub text: String,
    pub embedding: Vec<f32>,
    pub model_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

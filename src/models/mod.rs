pub mod chat;
pub mod embedding;

pub use chat::{ ChatMessage, Conversation, Message, Role };
pub use embedding::StoredEmbedding;

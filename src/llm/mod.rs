pub mod chat;
pub mod embedding;
pub mod stream;

use rllm::builder::LLMBackend;
use serde::{ Deserialize, Serialize };
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_CHAT_MODEL: &str = "mistral";
pub const DEFAULT_HOSTED_CHAT_MODEL: &str = "gpt-4-turbo";
pub const DEFAULT_EMBEDDING_MODEL: &str = crate::models::embedding::DEFAULT_EMBEDDING_MODEL;

const PLACEHOLDER_API_KEY: &str = "your-api-key-here";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmType {
    Ollama,
    OpenAI,
    Anthropic,
    Gemini,
    DeepSeek,
    XAI,
    Groq,
}

impl LlmType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmType::Ollama => "ollama",
            LlmType::OpenAI => "openai",
            LlmType::Anthropic => "anthropic",
            LlmType::Gemini => "gemini",
            LlmType::DeepSeek => "deepseek",
            LlmType::XAI => "xai",
            LlmType::Groq => "groq",
        }
    }

    /// Whether the backend is the locally addressed inference daemon.
    pub fn is_local(&self) -> bool {
        matches!(self, LlmType::Ollama)
    }

    /// Base URL of the OpenAI-compatible chat API, for backends that expose one.
    pub fn openai_compatible_url(&self) -> Option<&'static str> {
        match self {
            LlmType::OpenAI => Some("https://api.openai.com/v1"),
            LlmType::DeepSeek => Some("https://api.deepseek.com/v1"),
            LlmType::XAI => Some("https://api.x.ai/v1"),
            LlmType::Groq => Some("https://api.groq.com/openai/v1"),
            _ => None,
        }
    }

    pub fn backend(&self) -> LLMBackend {
        match self {
            LlmType::Ollama => LLMBackend::Ollama,
            LlmType::OpenAI => LLMBackend::OpenAI,
            LlmType::Anthropic => LLMBackend::Anthropic,
            LlmType::Gemini => LLMBackend::Google,
            LlmType::DeepSeek => LLMBackend::DeepSeek,
            LlmType::XAI => LLMBackend::XAI,
            LlmType::Groq => LLMBackend::Groq,
        }
    }
}

impl fmt::Display for LlmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseLlmTypeError {
    message: String,
}

impl fmt::Display for ParseLlmTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseLlmTypeError {}

impl FromStr for LlmType {
    type Err = ParseLlmTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(LlmType::Ollama),
            "openai" => Ok(LlmType::OpenAI),
            "anthropic" => Ok(LlmType::Anthropic),
            "gemini" => Ok(LlmType::Gemini),
            "deepseek" => Ok(LlmType::DeepSeek),
            "xai" => Ok(LlmType::XAI),
            "groq" => Ok(LlmType::Groq),
            _ =>
                Err(ParseLlmTypeError {
                    message: format!("Invalid LLM type: '{}'", s),
                }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub llm_type: LlmType,
    pub api_key: Option<String>,
    pub completion_model: Option<String>,
    pub embedding_model: Option<String>,
    pub base_url: Option<String>,
    pub embedding_dimension: Option<usize>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            llm_type: LlmType::Ollama,
            api_key: None,
            completion_model: None,
            embedding_model: None,
            base_url: None,
            embedding_dimension: None,
        }
    }
}

impl LlmConfig {
    /// The configured key, unless it is blank or the sample placeholder.
    pub fn credential(&self) -> Option<&str> {
        normalize_api_key(self.api_key.as_deref())
    }
}

pub fn normalize_api_key(key: Option<&str>) -> Option<&str> {
    key.map(str::trim).filter(|k| !k.is_empty() && *k != PLACEHOLDER_API_KEY)
}

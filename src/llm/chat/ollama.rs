use async_trait::async_trait;
use log::{ debug, info };
use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };

use super::{ lazy_stream, ChatClient };
use crate::error::{ GatewayError, Result };
use crate::llm::stream::{ ChatStream, DecodedLine, LineDecoder };
use crate::llm::{ LlmConfig, LlmType, DEFAULT_OLLAMA_CHAT_MODEL, DEFAULT_OLLAMA_URL };
use crate::models::ChatMessage;

const DEFAULT_TEMPERATURE: f32 = 0.7;
/// `num_predict` value the daemon reads as "no limit".
const UNBOUNDED_PREDICT: i64 = -1;
const EMPTY_RESPONSE: &str = "No response from Ollama";

/// Chat client for a locally running Ollama daemon.
#[derive(Debug, Clone)]
pub struct OllamaChatClient {
    http: HttpClient,
    base_url: String,
    completion_model: String,
}

#[derive(Serialize)]
struct OllamaMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage<'a>>,
    stream: bool,
    temperature: f32,
    num_predict: i64,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: Option<ResponseMessage>,
    #[serde(default)]
    done: bool,
}

impl OllamaChatClient {
    pub fn new(base_url: Option<String>, completion_model: Option<String>) -> Self {
        let model = completion_model.unwrap_or_else(|| DEFAULT_OLLAMA_CHAT_MODEL.to_string());
        let url = base_url.unwrap_or_else(|| DEFAULT_OLLAMA_URL.into());

        Self {
            http: HttpClient::new(),
            base_url: url.trim_end_matches('/').to_string(),
            completion_model: model,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        if config.llm_type != LlmType::Ollama {
            return Err(GatewayError::Config("Invalid config type for OllamaChatClient".into()));
        }

        Ok(Self::new(config.base_url.clone(), config.completion_model.clone()))
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }

    fn request<'a>(
        &'a self,
        messages: &'a [ChatMessage],
        stream: bool,
        temperature: Option<f32>,
        max_tokens: Option<u32>
    ) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.completion_model,
            messages: messages
                .iter()
                .map(|m| OllamaMessage { role: m.role.as_str(), content: &m.content })
                .collect(),
            stream,
            temperature: temperature.unwrap_or(DEFAULT_TEMPERATURE),
            num_predict: max_tokens.map(i64::from).unwrap_or(UNBOUNDED_PREDICT),
        }
    }
}

/// Line parser for the daemon's NDJSON stream.
pub fn parse_chat_line(line: &str) -> Option<DecodedLine> {
    let parsed: ChatResponse = serde_json::from_str(line).ok()?;
    Some(DecodedLine {
        fragment: parsed.message.map(|m| m.content),
        done: parsed.done,
    })
}

#[async_trait]
impl ChatClient for OllamaChatClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: Option<f32>,
        max_tokens: Option<u32>
    ) -> Result<String> {
        let req = self.request(messages, false, temperature, max_tokens);
        debug!("OllamaChatClient::complete() → model={} messages={}", self.completion_model, messages.len());

        let resp = self.http.post(self.chat_url()).json(&req).send().await?.error_for_status()?;
        let body = resp.text().await?;
        let data: ChatResponse = serde_json::from_str(&body).map_err(|e| {
            GatewayError::ProviderUnavailable(format!("unreadable response from Ollama: {}", e))
        })?;

        Ok(
            data.message
                .map(|m| m.content)
                .unwrap_or_else(|| EMPTY_RESPONSE.to_string())
        )
    }

    fn complete_stream(&self, messages: &[ChatMessage]) -> ChatStream {
        let request = self.http
            .post(self.chat_url())
            .json(&self.request(messages, true, None, None));
        info!("Streaming chat from Ollama model {}", self.completion_model);

        lazy_stream(async move {
            let resp = request.send().await?.error_for_status()?;
            Ok(LineDecoder::new(resp.bytes_stream(), parse_chat_line))
        })
    }

    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.completion_model
    }
}

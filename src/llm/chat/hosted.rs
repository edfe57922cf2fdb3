use async_trait::async_trait;
use log::{ debug, info, warn };
use reqwest::Client as HttpClient;
use rllm::builder::LLMBuilder;
use rllm::chat::{ ChatMessage as LlmMessage, ChatRole, MessageType };
use serde::{ Deserialize, Serialize };

use super::{ full_response_as_stream, lazy_stream, ChatClient };
use crate::error::{ GatewayError, Result };
use crate::llm::stream::{ ChatStream, DecodedLine, LineDecoder };
use crate::llm::{ LlmConfig, LlmType, DEFAULT_HOSTED_CHAT_MODEL };
use crate::models::{ ChatMessage, Role };

const SSE_FIELDS: [&str; 3] = ["event:", "id:", "retry:"];

/// Chat client for a remote hosted API, keyed by model and API key.
///
/// Construction never fails for a missing key, so start-up wiring stays intact; every
/// call then fails with [`GatewayError::AuthenticationMissing`].
#[derive(Debug, Clone)]
pub struct HostedChatClient {
    llm_type: LlmType,
    http: HttpClient,
    api_key: Option<String>,
    model: String,
    base_url: Option<String>,
}

#[derive(Serialize)]
struct StreamMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct StreamRequest<'a> {
    model: &'a str,
    messages: Vec<StreamMessage<'a>>,
    stream: bool,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    content: Option<String>,
}

impl HostedChatClient {
    pub fn new(
        llm_type: LlmType,
        api_key: Option<String>,
        model: Option<String>,
        base_url: Option<String>
    ) -> Self {
        let api_key = crate::llm::normalize_api_key(api_key.as_deref()).map(str::to_string);
        if api_key.is_none() {
            warn!("No API key configured for {}. Chat requests will fail until one is set.", llm_type);
        }

        Self {
            llm_type,
            http: HttpClient::new(),
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_HOSTED_CHAT_MODEL.to_string()),
            base_url,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        if config.llm_type.is_local() {
            return Err(GatewayError::Config("Invalid config type for HostedChatClient".into()));
        }

        Ok(
            Self::new(
                config.llm_type,
                config.api_key.clone(),
                config.completion_model.clone(),
                config.base_url.clone()
            )
        )
    }

    fn credential(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| GatewayError::AuthenticationMissing(self.llm_type.to_string()))
    }

    /// Chat completions endpoint for backends that speak the OpenAI streaming protocol.
    fn stream_url(&self) -> Option<String> {
        let default_url = self.llm_type.openai_compatible_url()?;
        let base = self.base_url.as_deref().unwrap_or(default_url);
        Some(format!("{}/chat/completions", base.trim_end_matches('/')))
    }
}

/// Splits off system messages, which the SDK takes as a separate prompt.
fn to_sdk_messages(messages: &[ChatMessage]) -> (Option<String>, Vec<LlmMessage>) {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();

    let history = messages
        .iter()
        .filter_map(|m| {
            let role = match m.role {
                Role::User => ChatRole::User,
                Role::Assistant => ChatRole::Assistant,
                Role::System => {
                    return None;
                }
            };
            Some(LlmMessage {
                role,
                content: m.content.clone(),
                message_type: MessageType::Text,
            })
        })
        .collect();

    let system = if system.is_empty() { None } else { Some(system.join("\n\n")) };
    (system, history)
}

/// Line parser for `text/event-stream` chat completion bodies.
pub fn parse_sse_line(line: &str) -> Option<DecodedLine> {
    let Some(data) = line.strip_prefix("data:") else {
        // comments and non-data fields carry no text
        return if line.starts_with(':') || SSE_FIELDS.iter().any(|f| line.starts_with(f)) {
            Some(DecodedLine::default())
        } else {
            None
        };
    };

    let data = data.trim();
    if data == "[DONE]" {
        return Some(DecodedLine { fragment: None, done: true });
    }

    let chunk: StreamChunk = serde_json::from_str(data).ok()?;
    let mut fragment = String::new();
    let mut done = false;
    for choice in chunk.choices {
        if let Some(content) = choice.delta.content {
            fragment.push_str(&content);
        }
        done |= choice.finish_reason.is_some();
    }

    Some(DecodedLine {
        fragment: Some(fragment),
        done,
    })
}

#[async_trait]
impl ChatClient for HostedChatClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: Option<f32>,
        max_tokens: Option<u32>
    ) -> Result<String> {
        let api_key = self.credential()?;
        let (system, history) = to_sdk_messages(messages);

        let mut builder = LLMBuilder::new()
            .backend(self.llm_type.backend())
            .api_key(api_key)
            .model(&self.model)
            .stream(false);

        if let Some(url) = &self.base_url {
            builder = builder.base_url(url);
        }
        if let Some(temp) = temperature {
            builder = builder.temperature(temp);
        }
        if let Some(tokens) = max_tokens {
            builder = builder.max_tokens(tokens);
        }
        if let Some(system) = system {
            builder = builder.system(system);
        }

        let provider = builder
            .build()
            .map_err(|e| GatewayError::ProviderUnavailable(e.to_string()))?;

        debug!(
            "HostedChatClient::complete() → backend={} model={} base_url={:?}",
            self.llm_type,
            self.model,
            self.base_url
        );
        let resp = provider
            .chat(&history).await
            .map_err(|e| GatewayError::ProviderUnavailable(e.to_string()))?;

        Ok(
            resp
                .text()
                .map(|s| s.to_string())
                .unwrap_or_else(|| resp.to_string())
        )
    }

    fn complete_stream(&self, messages: &[ChatMessage]) -> ChatStream {
        let api_key = match self.credential() {
            Ok(key) => key.to_string(),
            Err(e) => {
                return full_response_as_stream(async move { Err(e) });
            }
        };

        let Some(url) = self.stream_url() else {
            info!("{} has no native stream, delivering the full completion at once", self.llm_type);
            let client = self.clone();
            let messages = messages.to_vec();
            return full_response_as_stream(async move {
                client.complete(&messages, None, None).await
            });
        };

        let body = StreamRequest {
            model: &self.model,
            messages: messages
                .iter()
                .map(|m| StreamMessage { role: m.role.as_str(), content: &m.content })
                .collect(),
            stream: true,
        };
        let request = self.http.post(url).bearer_auth(api_key).json(&body);

        lazy_stream(async move {
            let resp = request.send().await?.error_for_status()?;
            Ok(LineDecoder::new(resp.bytes_stream(), parse_sse_line))
        })
    }

    fn name(&self) -> &str {
        self.llm_type.as_str()
    }

    fn model(&self) -> &str {
        &self.model
    }
}

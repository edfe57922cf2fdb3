pub mod hosted;
pub mod ollama;

use async_trait::async_trait;
use futures::{ stream, Future, StreamExt, TryStreamExt };
use log::info;
use std::sync::Arc;

use super::stream::ChatStream;
use super::LlmConfig;
use self::hosted::HostedChatClient;
use self::ollama::OllamaChatClient;
use crate::error::Result;
use crate::models::ChatMessage;

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Sends the whole message history and waits for the full reply.
    ///
    /// `temperature` and `max_tokens` are passed to the backend as given.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: Option<f32>,
        max_tokens: Option<u32>
    ) -> Result<String>;

    /// Returns the reply as a lazy stream of text fragments.
    ///
    /// No request is sent until the stream is first polled, so connection and status
    /// errors surface as the first item. Dropping the stream closes the connection.
    fn complete_stream(&self, messages: &[ChatMessage]) -> ChatStream;

    fn name(&self) -> &str;

    fn model(&self) -> &str;
}

/// Builds a stream that runs `open` on first poll and then yields from the stream it
/// opened. An error from `open` becomes the only item.
pub fn lazy_stream<F, S>(open: F) -> ChatStream
    where
        F: Future<Output = Result<S>> + Send + 'static,
        S: futures::Stream<Item = Result<String>> + Send + 'static
{
    Box::pin(stream::once(open).try_flatten())
}

/// Wraps a single full completion as a one-fragment stream, for backends without a
/// native streaming protocol.
pub fn full_response_as_stream<F>(response: F) -> ChatStream
    where F: Future<Output = Result<String>> + Send + 'static
{
    lazy_stream(async move {
        let text = response.await?;
        Ok(stream::iter(Some(text).filter(|t| !t.is_empty()).map(Ok)))
    })
}

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn ChatClient>> {
    let client: Arc<dyn ChatClient> = if config.llm_type.is_local() {
        Arc::new(OllamaChatClient::from_config(config)?)
    } else {
        Arc::new(HostedChatClient::from_config(config)?)
    };
    info!("Chat client configured: Type={}, Model={}", client.name(), client.model());
    Ok(client)
}

/// Drains a stream into one string, stopping at the first error.
pub async fn collect_stream(mut stream: ChatStream) -> Result<String> {
    let mut text = String::new();
    while let Some(fragment) = stream.next().await {
        text.push_str(&fragment?);
    }
    Ok(text)
}

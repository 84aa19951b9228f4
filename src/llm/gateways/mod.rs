//! Concrete [`LlmGateway`](crate::llm::LlmGateway) implementations
//!
//! Each provider sits behind a cargo feature of the same name; both are on by default.

#[cfg(feature = "ollama")]
pub mod ollama;
#[cfg(feature = "openai")]
pub mod openai;
#[cfg(feature = "openai")]
pub mod openai_messages_adapter;

#[cfg(feature = "ollama")]
pub use ollama::{OllamaConfig, OllamaGateway};
#[cfg(feature = "openai")]
pub use openai::{OpenAIConfig, OpenAIGateway};

#[cfg(any(feature = "ollama", feature = "openai"))]
use crate::{
    error::{BrokerError, Result},
    llm::gateway::{FragmentStream, StreamFragment},
};
#[cfg(any(feature = "ollama", feature = "openai"))]
use base64::Engine;
#[cfg(any(feature = "ollama", feature = "openai"))]
use futures::stream;
#[cfg(any(feature = "ollama", feature = "openai"))]
use reqwest::Response;

/// Stream whose only item is `error`, for requests that fail before they are sent
#[cfg(any(feature = "ollama", feature = "openai"))]
pub(crate) fn failed_stream<'a>(error: BrokerError) -> FragmentStream<'a> {
    let item: Result<StreamFragment> = Err(error);
    Box::pin(stream::iter([item]))
}

/// Pass successful responses through; turn any other status into a gateway error
/// carrying the response body
#[cfg(any(feature = "ollama", feature = "openai"))]
pub(crate) async fn ensure_success(response: Response, context: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = format!("{}: {} {}", context, status, body);
    Err(BrokerError::GatewayError(message.trim_end().to_string()))
}

/// Read an image file and base64-encode it
#[cfg(any(feature = "ollama", feature = "openai"))]
pub(crate) fn encode_image(path: &str) -> Result<String> {
    std::fs::read(path)
        .map(|bytes| base64::engine::general_purpose::STANDARD.encode(bytes))
        .map_err(|e| {
            let message = format!("Failed to read image file {}: {}", path, e);
            BrokerError::IoError(std::io::Error::new(e.kind(), message))
        })
}

use crate::error::Result;
use crate::llm::models::{LlmGatewayResponse, LlmMessage};
use crate::llm::tools::LlmTool;
use async_trait::async_trait;
use futures::stream::Stream;
use serde_json::Value;
use std::pin::Pin;
use std::time::Duration;

/// Output format requested from the model
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseFormat {
    Text,
    JsonObject { schema: Option<Value> },
}

/// Configuration for LLM completion
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub temperature: f32,
    pub num_ctx: usize,
    pub max_tokens: usize,
    pub num_predict: Option<i32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub response_format: Option<ResponseFormat>,
    /// Per-request timeout, enforced by the gateway on each network call
    pub timeout: Option<Duration>,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            num_ctx: 32768,
            max_tokens: 16384,
            num_predict: None,
            top_p: None,
            top_k: None,
            response_format: None,
            timeout: None,
        }
    }
}

/// Partial tool call carried by one stream fragment.
///
/// Fragments for the same call share an `index`. The name and the arguments string may
/// each be split across any number of fragments; they are only meaningful once all
/// fragments for the index have been concatenated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCallDelta {
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

/// One incrementally delivered unit of a streaming completion
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamFragment {
    pub content: Option<String>,
    pub tool_call: Option<ToolCallDelta>,
}

impl StreamFragment {
    /// Fragment carrying only a text delta
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            tool_call: None,
        }
    }

    /// Fragment carrying only a tool call delta
    pub fn tool_call(delta: ToolCallDelta) -> Self {
        Self {
            content: None,
            tool_call: Some(delta),
        }
    }
}

/// Stream of fragments returned by [`LlmGateway::complete_stream`]
pub type FragmentStream<'a> = Pin<Box<dyn Stream<Item = Result<StreamFragment>> + Send + 'a>>;

/// Abstract interface for LLM providers
///
/// Implementations must be safe to share between concurrent broker invocations.
#[async_trait]
pub trait LlmGateway: Send + Sync {
    /// Complete an LLM request with text response
    async fn complete(
        &self,
        model: &str,
        messages: &[LlmMessage],
        tools: Option<&[Box<dyn LlmTool>]>,
        config: &CompletionConfig,
    ) -> Result<LlmGatewayResponse>;

    /// Stream an LLM completion as a finite sequence of fragments.
    ///
    /// The request is prepared before this returns, so the stream borrows only the
    /// gateway. Transport failures are delivered as an `Err` item, after which the
    /// stream ends.
    fn complete_stream<'a>(
        &'a self,
        model: &str,
        messages: &[LlmMessage],
        tools: Option<&[Box<dyn LlmTool>]>,
        config: &CompletionConfig,
    ) -> FragmentStream<'a>;

    /// Complete an LLM request constrained to a JSON schema.
    ///
    /// On success the response's `object` is populated.
    async fn complete_object(
        &self,
        model: &str,
        messages: &[LlmMessage],
        schema: Value,
        config: &CompletionConfig,
    ) -> Result<LlmGatewayResponse>;

    /// Get list of available models
    async fn get_available_models(&self) -> Result<Vec<String>>;
}

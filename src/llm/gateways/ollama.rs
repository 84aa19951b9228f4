use super::{encode_image, ensure_success, failed_stream};
use crate::error::{BrokerError, Result};
use crate::llm::gateway::{
    CompletionConfig, FragmentStream, LlmGateway, ResponseFormat, StreamFragment, ToolCallDelta,
};
use crate::llm::models::{LlmGatewayResponse, LlmMessage, LlmToolCall, MessageRole};
use crate::llm::tools::LlmTool;
use async_trait::async_trait;
use futures::stream::StreamExt;
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Configuration for connecting to Ollama server
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub host: String,
    /// Default timeout for every request; [`CompletionConfig::timeout`] overrides it
    pub timeout: Option<Duration>,
    pub headers: HashMap<String, String>,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("OLLAMA_HOST")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
            timeout: None,
            headers: HashMap::new(),
        }
    }
}

/// Gateway for Ollama local LLM service
///
/// Supports text generation, NDJSON streaming, structured output, tool calling and
/// image attachments.
pub struct OllamaGateway {
    client: Client,
    config: OllamaConfig,
}

impl OllamaGateway {
    /// Create a new Ollama gateway with default configuration
    pub fn new() -> Self {
        Self::with_config(OllamaConfig::default())
    }

    /// Create a new Ollama gateway with custom configuration
    pub fn with_config(config: OllamaConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Create gateway with custom host
    pub fn with_host(host: impl Into<String>) -> Self {
        Self::with_config(OllamaConfig {
            host: host.into(),
            ..Default::default()
        })
    }

    /// Pull a model from Ollama library
    pub async fn pull_model(&self, model: &str) -> Result<()> {
        info!("Pulling Ollama model: {}", model);

        let response = self
            .request(self.client.post(format!("{}/api/pull", self.config.host)), None)
            .json(&json!({ "name": model, "stream": false }))
            .send()
            .await?;
        ensure_success(response, "Failed to pull model").await?;

        Ok(())
    }

    /// Apply configured headers and the effective timeout
    fn request(&self, builder: RequestBuilder, timeout: Option<Duration>) -> RequestBuilder {
        let builder = self
            .config
            .headers
            .iter()
            .fold(builder, |builder, (name, value)| builder.header(name, value));

        match timeout.or(self.config.timeout) {
            Some(timeout) => builder.timeout(timeout),
            None => builder,
        }
    }

    fn chat_request(&self, body: &Value, config: &CompletionConfig) -> RequestBuilder {
        self.request(self.client.post(format!("{}/api/chat", self.config.host)), config.timeout)
            .json(body)
    }
}

impl Default for OllamaGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmGateway for OllamaGateway {
    async fn complete(
        &self,
        model: &str,
        messages: &[LlmMessage],
        tools: Option<&[Box<dyn LlmTool>]>,
        config: &CompletionConfig,
    ) -> Result<LlmGatewayResponse> {
        info!("Delegating to Ollama for completion");
        debug!("Model: {}, Message count: {}", model, messages.len());

        let body = build_chat_body(model, messages, tools, config, false)?;
        let response = self.chat_request(&body, config).send().await?;
        let response_body: Value =
            ensure_success(response, "Ollama API error").await?.json().await?;

        let message = &response_body["message"];
        Ok(LlmGatewayResponse {
            content: message["content"].as_str().map(String::from),
            object: None,
            tool_calls: parse_tool_calls(&message["tool_calls"]),
        })
    }

    fn complete_stream<'a>(
        &'a self,
        model: &str,
        messages: &[LlmMessage],
        tools: Option<&[Box<dyn LlmTool>]>,
        config: &CompletionConfig,
    ) -> FragmentStream<'a> {
        info!("Starting Ollama streaming completion");
        debug!("Model: {}, Message count: {}", model, messages.len());

        let request = match build_chat_body(model, messages, tools, config, true) {
            Ok(body) => self.chat_request(&body, config),
            Err(e) => return failed_stream(e),
        };

        Box::pin(async_stream::stream! {
            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    yield Err(e.into());
                    return;
                }
            };
            let response = match ensure_success(response, "Ollama API error").await {
                Ok(response) => response,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            let mut bytes = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();
            let mut next_index = 0;

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(e.into());
                        return;
                    }
                };
                buffer.extend_from_slice(&chunk);

                while let Some(newline) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=newline).collect();
                    let json = match parse_line(&line) {
                        Some(json) => json,
                        None => continue,
                    };

                    if let Some(error) = json["error"].as_str() {
                        yield Err(BrokerError::GatewayError(error.to_string()));
                        return;
                    }

                    for fragment in line_fragments(&json, &mut next_index) {
                        yield Ok(fragment);
                    }

                    if json["done"].as_bool().unwrap_or(false) {
                        return;
                    }
                }
            }

            if let Some(json) = parse_line(&buffer) {
                for fragment in line_fragments(&json, &mut next_index) {
                    yield Ok(fragment);
                }
            }
        })
    }

    async fn complete_object(
        &self,
        model: &str,
        messages: &[LlmMessage],
        schema: Value,
        config: &CompletionConfig,
    ) -> Result<LlmGatewayResponse> {
        info!("Requesting structured output from Ollama");

        let mut body = build_chat_body(model, messages, None, config, false)?;
        body["format"] = schema;

        let response = self.chat_request(&body, config).send().await?;
        let response_body: Value =
            ensure_success(response, "Ollama API error").await?.json().await?;

        let content = response_body["message"]["content"].as_str().map(String::from);
        let object = content.as_deref().and_then(|text| match serde_json::from_str(text) {
            Ok(object) => Some(object),
            Err(e) => {
                warn!("Structured response was not valid JSON: {}", e);
                None
            }
        });

        Ok(LlmGatewayResponse {
            content,
            object,
            tool_calls: vec![],
        })
    }

    async fn get_available_models(&self) -> Result<Vec<String>> {
        debug!("Fetching available Ollama models");

        let response = self
            .request(self.client.get(format!("{}/api/tags", self.config.host)), None)
            .send()
            .await?;
        let body: Value = ensure_success(response, "Failed to get models").await?.json().await?;

        let models = body["models"]
            .as_array()
            .ok_or_else(|| BrokerError::GatewayError("Invalid response format".to_string()))?
            .iter()
            .filter_map(|m| m["name"].as_str().map(String::from))
            .collect::<Vec<_>>();

        Ok(models)
    }
}

fn build_chat_body(
    model: &str,
    messages: &[LlmMessage],
    tools: Option<&[Box<dyn LlmTool>]>,
    config: &CompletionConfig,
    stream: bool,
) -> Result<Value> {
    let mut body = json!({
        "model": model,
        "messages": adapt_messages_to_ollama(messages)?,
        "options": extract_ollama_options(config),
        "stream": stream
    });

    if let Some(tools) = tools.filter(|t| !t.is_empty()) {
        let tool_defs: Vec<_> = tools.iter().map(|t| t.descriptor()).collect();
        body["tools"] = serde_json::to_value(tool_defs)?;
    }

    add_response_format(&mut body, config);
    Ok(body)
}

fn parse_line(line: &[u8]) -> Option<Value> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    match serde_json::from_str(text) {
        Ok(json) => Some(json),
        Err(e) => {
            warn!("Failed to parse streaming chunk: {}", e);
            None
        }
    }
}

/// Fragments carried by one NDJSON line.
///
/// Ollama sends complete tool calls, so each becomes a single delta with its own index.
fn line_fragments(json: &Value, next_index: &mut usize) -> Vec<StreamFragment> {
    let message = &json["message"];
    let mut fragments = Vec::new();

    if let Some(content) = message["content"].as_str().filter(|c| !c.is_empty()) {
        fragments.push(StreamFragment::content(content));
    }

    for call in message["tool_calls"].as_array().into_iter().flatten() {
        let function = &call["function"];
        let arguments = match &function["arguments"] {
            Value::Null => None,
            Value::String(raw) => Some(raw.clone()),
            other => Some(other.to_string()),
        };

        fragments.push(StreamFragment::tool_call(ToolCallDelta {
            index: *next_index,
            id: call["id"].as_str().map(String::from),
            name: function["name"].as_str().map(String::from),
            arguments,
        }));
        *next_index += 1;
    }

    fragments
}

fn parse_tool_calls(calls: &Value) -> Vec<LlmToolCall> {
    calls
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|call| {
            let function = &call["function"];
            let name = function["name"].as_str()?.to_string();
            let arguments = match &function["arguments"] {
                Value::Object(args) => args.clone().into_iter().collect(),
                Value::String(raw) if !raw.trim().is_empty() => serde_json::from_str(raw)
                    .map_err(|e| warn!("Dropping unparseable arguments for {}: {}", name, e))
                    .unwrap_or_default(),
                _ => HashMap::new(),
            };

            Some(LlmToolCall {
                id: call["id"].as_str().map(String::from),
                name,
                arguments,
            })
        })
        .collect()
}

// Message adapter for Ollama format
fn adapt_messages_to_ollama(messages: &[LlmMessage]) -> Result<Vec<Value>> {
    messages
        .iter()
        .map(|msg| {
            let mut ollama_msg = json!({
                "role": match msg.role {
                    MessageRole::System => "system",
                    MessageRole::User => "user",
                    MessageRole::Assistant => "assistant",
                    MessageRole::Tool => "tool",
                },
                "content": msg.content.as_deref().unwrap_or("")
            });

            if let Some(image_paths) = &msg.image_paths {
                let images: Vec<String> =
                    image_paths.iter().map(|path| encode_image(path)).collect::<Result<_>>()?;
                ollama_msg["images"] = json!(images);
            }

            match msg.role {
                MessageRole::Tool => {
                    if let Some(call) = msg.calls().first() {
                        ollama_msg["tool_name"] = json!(call.name);
                    }
                }
                _ if !msg.calls().is_empty() => {
                    let calls: Vec<_> = msg
                        .calls()
                        .iter()
                        .map(|tc| {
                            json!({
                                "type": "function",
                                "function": {
                                    "name": tc.name,
                                    "arguments": tc.arguments
                                }
                            })
                        })
                        .collect();
                    ollama_msg["tool_calls"] = json!(calls);
                }
                _ => {}
            }

            Ok(ollama_msg)
        })
        .collect()
}

// Extract Ollama-specific options from config
fn extract_ollama_options(config: &CompletionConfig) -> Value {
    let mut options = json!({
        "temperature": config.temperature,
        "num_ctx": config.num_ctx,
    });

    if let Some(num_predict) = config.num_predict {
        if num_predict > 0 {
            options["num_predict"] = json!(num_predict);
        }
    } else if config.max_tokens > 0 {
        options["num_predict"] = json!(config.max_tokens);
    }

    if let Some(top_p) = config.top_p {
        options["top_p"] = json!(top_p);
    }

    if let Some(top_k) = config.top_k {
        options["top_k"] = json!(top_k);
    }

    options
}

fn add_response_format(body: &mut Value, config: &CompletionConfig) {
    match &config.response_format {
        Some(ResponseFormat::JsonObject { schema: Some(schema) }) => {
            body["format"] = schema.clone();
        }
        Some(ResponseFormat::JsonObject { schema: None }) => {
            body["format"] = json!("json");
        }
        Some(ResponseFormat::Text) | None => {}
    }
}

//! OpenAI Gateway for LLM interactions.
//!
//! Talks to `/chat/completions` and `/models` on any OpenAI-compatible endpoint.
//! Streaming uses server-sent events; tool call deltas are forwarded with the
//! provider's own `index`.

use super::openai_messages_adapter::{
    adapt_messages_to_openai, convert_tool_call_deltas, convert_tool_calls,
};
use super::{ensure_success, failed_stream};
use crate::error::{BrokerError, Result};
use crate::llm::gateway::{
    CompletionConfig, FragmentStream, LlmGateway, ResponseFormat, StreamFragment,
};
use crate::llm::models::{LlmGatewayResponse, LlmMessage};
use crate::llm::tools::LlmTool;
use async_trait::async_trait;
use futures::stream::StreamExt;
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Configuration for connecting to OpenAI API.
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    pub api_key: String,
    pub base_url: String,
    /// Default timeout for every request; [`CompletionConfig::timeout`] overrides it
    pub timeout: Option<Duration>,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY").unwrap_or_default(),
            base_url: std::env::var("OPENAI_API_ENDPOINT")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            timeout: None,
        }
    }
}

/// Gateway for OpenAI LLM service.
pub struct OpenAIGateway {
    client: Client,
    config: OpenAIConfig,
}

impl OpenAIGateway {
    /// Create a new OpenAI gateway with default configuration.
    pub fn new() -> Self {
        Self::with_config(OpenAIConfig::default())
    }

    /// Create a new OpenAI gateway with custom configuration.
    pub fn with_config(config: OpenAIConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Create gateway with custom API key.
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self::with_config(OpenAIConfig {
            api_key: api_key.into(),
            ..Default::default()
        })
    }

    /// Create gateway with custom API key and base URL.
    pub fn with_api_key_and_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self::with_config(OpenAIConfig {
            api_key: api_key.into(),
            base_url: base_url.into(),
            ..Default::default()
        })
    }

    fn authorized(&self, builder: RequestBuilder, timeout: Option<Duration>) -> RequestBuilder {
        let builder = builder.bearer_auth(&self.config.api_key);
        match timeout.or(self.config.timeout) {
            Some(timeout) => builder.timeout(timeout),
            None => builder,
        }
    }

    fn completion_request(&self, body: &Value, config: &CompletionConfig) -> RequestBuilder {
        let url = format!("{}/chat/completions", self.config.base_url);
        self.authorized(self.client.post(url), config.timeout).json(body)
    }
}

impl Default for OpenAIGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmGateway for OpenAIGateway {
    async fn complete(
        &self,
        model: &str,
        messages: &[LlmMessage],
        tools: Option<&[Box<dyn LlmTool>]>,
        config: &CompletionConfig,
    ) -> Result<LlmGatewayResponse> {
        info!("Delegating to OpenAI for completion");
        debug!("Model: {}, Message count: {}", model, messages.len());

        let body = build_completion_body(model, messages, tools, config, false)?;
        let response = self.completion_request(&body, config).send().await?;
        let response_body: Value =
            ensure_success(response, "OpenAI API error").await?.json().await?;

        let message = &response_body["choices"][0]["message"];
        let tool_calls = message["tool_calls"]
            .as_array()
            .map(|calls| convert_tool_calls(calls))
            .unwrap_or_default();

        Ok(LlmGatewayResponse {
            content: message["content"].as_str().map(String::from),
            object: None,
            tool_calls,
        })
    }

    fn complete_stream<'a>(
        &'a self,
        model: &str,
        messages: &[LlmMessage],
        tools: Option<&[Box<dyn LlmTool>]>,
        config: &CompletionConfig,
    ) -> FragmentStream<'a> {
        info!("Starting OpenAI streaming completion");
        debug!("Model: {}, Message count: {}", model, messages.len());

        let request = match build_completion_body(model, messages, tools, config, true) {
            Ok(body) => self.completion_request(&body, config),
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
            let response = match ensure_success(response, "OpenAI API error").await {
                Ok(response) => response,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            let mut bytes = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();

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
                    match parse_event(&line) {
                        SseEvent::Skip => {}
                        SseEvent::Done => return,
                        SseEvent::Failed(e) => {
                            yield Err(e);
                            return;
                        }
                        SseEvent::Fragments(fragments) => {
                            for fragment in fragments {
                                yield Ok(fragment);
                            }
                        }
                    }
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
        info!("Requesting structured output from OpenAI");

        let mut body = build_completion_body(model, messages, None, config, false)?;
        body["response_format"] = json_schema_format(schema);

        let response = self.completion_request(&body, config).send().await?;
        let response_body: Value =
            ensure_success(response, "OpenAI API error").await?.json().await?;

        let content = response_body["choices"][0]["message"]["content"].as_str().map(String::from);
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
        debug!("Fetching available OpenAI models");

        let url = format!("{}/models", self.config.base_url);
        let response = self.authorized(self.client.get(url), None).send().await?;
        let body: Value = ensure_success(response, "Failed to get models").await?.json().await?;

        let mut models = body["data"]
            .as_array()
            .ok_or_else(|| BrokerError::GatewayError("Invalid response format".to_string()))?
            .iter()
            .filter_map(|m| m["id"].as_str().map(String::from))
            .collect::<Vec<_>>();

        models.sort();
        Ok(models)
    }
}

fn build_completion_body(
    model: &str,
    messages: &[LlmMessage],
    tools: Option<&[Box<dyn LlmTool>]>,
    config: &CompletionConfig,
    stream: bool,
) -> Result<Value> {
    let max_tokens = match config.num_predict {
        Some(n) if n > 0 => n as usize,
        _ => config.max_tokens,
    };

    let mut body = json!({
        "model": model,
        "messages": adapt_messages_to_openai(messages)?,
        "temperature": config.temperature,
        "stream": stream
    });

    if max_tokens > 0 {
        body["max_tokens"] = json!(max_tokens);
    }
    if let Some(top_p) = config.top_p {
        body["top_p"] = json!(top_p);
    }
    if let Some(tools) = tools.filter(|t| !t.is_empty()) {
        let tool_defs: Vec<_> = tools.iter().map(|t| t.descriptor()).collect();
        body["tools"] = serde_json::to_value(tool_defs)?;
    }

    match &config.response_format {
        Some(ResponseFormat::JsonObject { schema: Some(schema) }) => {
            body["response_format"] = json_schema_format(schema.clone());
        }
        Some(ResponseFormat::JsonObject { schema: None }) => {
            body["response_format"] = json!({ "type": "json_object" });
        }
        Some(ResponseFormat::Text) | None => {}
    }

    Ok(body)
}

fn json_schema_format(schema: Value) -> Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": "response",
            "schema": schema
        }
    })
}

enum SseEvent {
    Skip,
    Done,
    Failed(BrokerError),
    Fragments(Vec<StreamFragment>),
}

/// Interpret one server-sent-event line
fn parse_event(line: &[u8]) -> SseEvent {
    let line = String::from_utf8_lossy(line);
    let Some(data) = line.trim().strip_prefix("data:").map(str::trim) else {
        return SseEvent::Skip;
    };
    if data == "[DONE]" {
        return SseEvent::Done;
    }

    let json: Value = match serde_json::from_str(data) {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to parse streaming chunk: {}", e);
            return SseEvent::Skip;
        }
    };

    if let Some(error) = json.get("error") {
        let message = error["message"].as_str().map_or_else(|| error.to_string(), String::from);
        return SseEvent::Failed(BrokerError::ApiError(message));
    }

    let delta = &json["choices"][0]["delta"];
    let mut fragments = Vec::new();

    if let Some(content) = delta["content"].as_str().filter(|c| !c.is_empty()) {
        fragments.push(StreamFragment::content(content));
    }
    if let Some(tool_calls) = delta["tool_calls"].as_array() {
        fragments.extend(convert_tool_call_deltas(tool_calls).into_iter().map(StreamFragment::tool_call));
    }

    SseEvent::Fragments(fragments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::tools::ToolDescriptor;
    use std::collections::HashMap;

    struct MockTool;

    impl LlmTool for MockTool {
        fn run(&self, _args: &HashMap<String, Value>) -> Result<Value> {
            Ok(json!({}))
        }

        fn descriptor(&self) -> ToolDescriptor {
            ToolDescriptor::function("get_weather", "Weather lookup", json!({"type": "object"}))
        }
    }

    fn gateway(server: &mockito::Server) -> OpenAIGateway {
        OpenAIGateway::with_api_key_and_base_url("test-key", server.url())
    }

    #[test]
    fn test_gateway_with_api_key_and_base_url() {
        let gateway = OpenAIGateway::with_api_key_and_base_url("key", "https://custom.com");
        assert_eq!(gateway.config.api_key, "key");
        assert_eq!(gateway.config.base_url, "https://custom.com");
    }

    #[test]
    fn test_build_body_token_limits() {
        let config = CompletionConfig {
            temperature: 0.2,
            max_tokens: 1000,
            top_p: Some(0.5),
            ..Default::default()
        };
        let body = build_completion_body("gpt-4o", &[], None, &config, false).unwrap();
        assert_eq!(body["max_tokens"], 1000);
        assert!((body["temperature"].as_f64().unwrap() - 0.2).abs() < 0.01);
        assert!((body["top_p"].as_f64().unwrap() - 0.5).abs() < 0.01);
        assert!(body.get("tools").is_none());

        let config = CompletionConfig {
            num_predict: Some(64),
            ..Default::default()
        };
        let body = build_completion_body("gpt-4o", &[], None, &config, true).unwrap();
        assert_eq!(body["max_tokens"], 64);
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn test_build_body_response_format() {
        let config = CompletionConfig {
            response_format: Some(ResponseFormat::JsonObject { schema: None }),
            ..Default::default()
        };
        let body = build_completion_body("gpt-4o", &[], None, &config, false).unwrap();
        assert_eq!(body["response_format"]["type"], "json_object");

        let config = CompletionConfig {
            response_format: Some(ResponseFormat::JsonObject {
                schema: Some(json!({"type": "object"})),
            }),
            ..Default::default()
        };
        let body = build_completion_body("gpt-4o", &[], None, &config, false).unwrap();
        assert_eq!(body["response_format"]["json_schema"]["schema"]["type"], "object");
    }

    #[test]
    fn test_parse_event() {
        assert!(matches!(parse_event(b": keep-alive\n"), SseEvent::Skip));
        assert!(matches!(parse_event(b"data: [DONE]\n"), SseEvent::Done));
        assert!(matches!(parse_event(b"data: {not json\n"), SseEvent::Skip));
        assert!(matches!(
            parse_event(br#"data: {"error":{"message":"rate limited"}}"#),
            SseEvent::Failed(BrokerError::ApiError(msg)) if msg == "rate limited"
        ));

        let SseEvent::Fragments(fragments) = parse_event(
            br#"data: {"choices":[{"delta":{"content":"Hi","tool_calls":[{"index":2,"function":{"arguments":"{}"}}]}}]}"#,
        ) else {
            panic!("expected fragments");
        };
        assert_eq!(fragments[0].content.as_deref(), Some("Hi"));
        assert_eq!(fragments[1].tool_call.as_ref().unwrap().index, 2);
    }

    #[tokio::test]
    async fn test_complete_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"Hello!"}}]}"#)
            .create_async()
            .await;

        let response = gateway(&server)
            .complete("gpt-4o", &[LlmMessage::user("Hi")], None, &CompletionConfig::default())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.content.as_deref(), Some("Hello!"));
    }

    #[tokio::test]
    async fn test_complete_with_tool_calls() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"tools":[{"type":"function","function":{"name":"get_weather"}}]}"#.to_string(),
            ))
            .with_status(200)
            .with_body(
                r#"{"choices":[{"message":{"role":"assistant","content":null,"tool_calls":[
                    {"id":"call_1","type":"function","function":{"name":"get_weather","arguments":"{\"location\":\"Paris\"}"}}
                ]}}]}"#,
            )
            .create_async()
            .await;

        let tools: Vec<Box<dyn LlmTool>> = vec![Box::new(MockTool)];
        let response = gateway(&server)
            .complete("gpt-4o", &[LlmMessage::user("Weather?")], Some(&tools), &CompletionConfig::default())
            .await
            .unwrap();

        mock.assert_async().await;
        assert!(response.content.is_none());
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].id.as_deref(), Some("call_1"));
        assert_eq!(response.tool_calls[0].arguments.get("location"), Some(&json!("Paris")));
    }

    #[tokio::test]
    async fn test_complete_error() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body(r#"{"error":{"message":"bad key"}}"#)
            .create_async()
            .await;

        let result = gateway(&server)
            .complete("gpt-4o", &[LlmMessage::user("Hi")], None, &CompletionConfig::default())
            .await;

        mock.assert_async().await;
        assert!(matches!(result, Err(BrokerError::GatewayError(msg)) if msg.contains("401")));
    }

    #[tokio::test]
    async fn test_complete_object() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"response_format":{"type":"json_schema"}}"#.to_string(),
            ))
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":"{\"name\":\"test\",\"value\":42}"}}]}"#)
            .create_async()
            .await;

        let response = gateway(&server)
            .complete_object(
                "gpt-4o",
                &[LlmMessage::user("Generate JSON")],
                json!({"type": "object"}),
                &CompletionConfig::default(),
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.object, Some(json!({"name": "test", "value": 42})));
    }

    #[tokio::test]
    async fn test_complete_stream_passes_deltas_through() {
        let mut server = mockito::Server::new_async().await;
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\",\"content\":\"Checking\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_1\",\"type\":\"function\",\"function\":{\"name\":\"get_weather\",\"arguments\":\"\"}}]}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"{\\\"location\\\":\"}}]}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"\\\"Paris\\\"}\"}}]}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"tool_calls\"}]}\n\n",
            "data: [DONE]\n\n",
        );
        let mock = server
            .mock("POST", "/chat/completions")
            .match_body(mockito::Matcher::PartialJsonString(r#"{"stream":true}"#.to_string()))
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .create_async()
            .await;

        let gw = gateway(&server);
        let fragments: Vec<StreamFragment> = gw
            .complete_stream("gpt-4o", &[LlmMessage::user("Weather?")], None, &CompletionConfig::default())
            .map(|f| f.unwrap())
            .collect()
            .await;

        mock.assert_async().await;
        assert_eq!(fragments.len(), 4);
        assert_eq!(fragments[0].content.as_deref(), Some("Checking"));
        let deltas: Vec<_> = fragments[1..].iter().map(|f| f.tool_call.clone().unwrap()).collect();
        assert_eq!(deltas[0].id.as_deref(), Some("call_1"));
        assert_eq!(deltas[0].name.as_deref(), Some("get_weather"));
        let arguments: String = deltas.iter().filter_map(|d| d.arguments.clone()).collect();
        assert_eq!(arguments, "{\"location\":\"Paris\"}");
        assert!(deltas.iter().all(|d| d.index == 0));
    }

    #[tokio::test]
    async fn test_complete_stream_http_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(503)
            .create_async()
            .await;

        let gw = gateway(&server);
        let items: Vec<Result<StreamFragment>> = gw
            .complete_stream("gpt-4o", &[], None, &CompletionConfig::default())
            .collect()
            .await;

        assert_eq!(items.len(), 1);
        assert!(matches!(&items[0], Err(BrokerError::GatewayError(msg)) if msg.contains("503")));
    }

    #[tokio::test]
    async fn test_get_available_models_sorted() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/models")
            .with_status(200)
            .with_body(r#"{"data":[{"id":"gpt-4o"},{"id":"gpt-3.5-turbo"}]}"#)
            .create_async()
            .await;

        let models = gateway(&server).get_available_models().await.unwrap();

        mock.assert_async().await;
        assert_eq!(models, vec!["gpt-3.5-turbo".to_string(), "gpt-4o".to_string()]);
    }

    #[test]
    fn test_request_timeout_prefers_per_call_value() {
        let gateway = OpenAIGateway::with_config(OpenAIConfig {
            api_key: "k".to_string(),
            base_url: "http://localhost".to_string(),
            timeout: Some(Duration::from_secs(30)),
        });

        let fallback = gateway
            .authorized(gateway.client.get("http://localhost/models"), None)
            .build()
            .unwrap();
        assert_eq!(fallback.timeout(), Some(&Duration::from_secs(30)));

        let config = CompletionConfig {
            timeout: Some(Duration::from_secs(2)),
            ..Default::default()
        };
        let request = gateway.completion_request(&json!({}), &config).build().unwrap();
        assert_eq!(request.timeout(), Some(&Duration::from_secs(2)));
    }
}

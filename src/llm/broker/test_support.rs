//! Scripted gateway and tools shared by the broker tests.

use crate::error::{BrokerError, Result};
use crate::llm::gateway::{CompletionConfig, FragmentStream, LlmGateway, StreamFragment, ToolCallDelta};
use crate::llm::models::{LlmGatewayResponse, LlmMessage, LlmToolCall};
use crate::llm::tools::{LlmTool, ToolDescriptor};
use crate::tracer::{Tracer, TracerSystem};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Gateway that replays canned responses and records every conversation it receives.
#[derive(Default)]
pub struct ScriptedGateway {
    responses: Mutex<VecDeque<Result<LlmGatewayResponse>>>,
    streams: Mutex<VecDeque<Vec<Result<StreamFragment>>>>,
    objects: Mutex<VecDeque<Result<LlmGatewayResponse>>>,
    pub conversations: Mutex<Vec<Vec<LlmMessage>>>,
    pub fragments_pulled: Arc<AtomicUsize>,
}

impl ScriptedGateway {
    pub fn with_responses(responses: Vec<LlmGatewayResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Ok).collect()),
            ..Default::default()
        }
    }

    pub fn with_streams(streams: Vec<Vec<Result<StreamFragment>>>) -> Self {
        Self {
            streams: Mutex::new(streams.into()),
            ..Default::default()
        }
    }

    pub fn with_objects(objects: Vec<Result<LlmGatewayResponse>>) -> Self {
        Self {
            objects: Mutex::new(objects.into()),
            ..Default::default()
        }
    }

    pub fn push_response(&self, response: Result<LlmGatewayResponse>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn call_count(&self) -> usize {
        self.conversations.lock().unwrap().len()
    }

    pub fn conversation(&self, index: usize) -> Vec<LlmMessage> {
        self.conversations.lock().unwrap()[index].clone()
    }

    fn record(&self, messages: &[LlmMessage]) {
        self.conversations.lock().unwrap().push(messages.to_vec());
    }
}

#[async_trait]
impl LlmGateway for ScriptedGateway {
    async fn complete(
        &self,
        _model: &str,
        messages: &[LlmMessage],
        _tools: Option<&[Box<dyn LlmTool>]>,
        _config: &CompletionConfig,
    ) -> Result<LlmGatewayResponse> {
        self.record(messages);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(BrokerError::GatewayError("script exhausted".to_string())))
    }

    fn complete_stream<'a>(
        &'a self,
        _model: &str,
        messages: &[LlmMessage],
        _tools: Option<&[Box<dyn LlmTool>]>,
        _config: &CompletionConfig,
    ) -> FragmentStream<'a> {
        self.record(messages);
        let fragments = self.streams.lock().unwrap().pop_front().unwrap_or_else(|| {
            vec![Err(BrokerError::GatewayError("script exhausted".to_string()))]
        });
        let pulled = self.fragments_pulled.clone();
        Box::pin(stream::iter(fragments).inspect(move |_| {
            pulled.fetch_add(1, Ordering::SeqCst);
        }))
    }

    async fn complete_object(
        &self,
        _model: &str,
        messages: &[LlmMessage],
        _schema: Value,
        _config: &CompletionConfig,
    ) -> Result<LlmGatewayResponse> {
        self.record(messages);
        self.objects
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(BrokerError::GatewayError("script exhausted".to_string())))
    }

    async fn get_available_models(&self) -> Result<Vec<String>> {
        Ok(vec!["test-model".to_string()])
    }
}

pub fn text(content: &str) -> LlmGatewayResponse {
    LlmGatewayResponse {
        content: Some(content.to_string()),
        ..Default::default()
    }
}

pub fn calls(tool_calls: Vec<LlmToolCall>) -> LlmGatewayResponse {
    LlmGatewayResponse {
        tool_calls,
        ..Default::default()
    }
}

pub fn call(id: &str, name: &str, arguments: Value) -> LlmToolCall {
    LlmToolCall {
        id: Some(id.to_string()),
        name: name.to_string(),
        arguments: serde_json::from_value(arguments).unwrap(),
    }
}

pub fn chunk(content: &str) -> Result<StreamFragment> {
    Ok(StreamFragment::content(content))
}

pub fn delta(index: usize, name: Option<&str>, arguments: Option<&str>) -> Result<StreamFragment> {
    Ok(StreamFragment::tool_call(ToolCallDelta {
        index,
        id: None,
        name: name.map(String::from),
        arguments: arguments.map(String::from),
    }))
}

enum Reply {
    Value(Value),
    Error(String),
    Panic,
}

/// Tool with a fixed reply that logs the arguments of every invocation
pub struct MockTool {
    name: String,
    reply: Reply,
    log: Arc<Mutex<Vec<HashMap<String, Value>>>>,
}

impl MockTool {
    pub fn returning(name: &str, value: Value) -> Self {
        Self::new(name, Reply::Value(value))
    }

    pub fn failing(name: &str, message: &str) -> Self {
        Self::new(name, Reply::Error(message.to_string()))
    }

    pub fn panicking(name: &str) -> Self {
        Self::new(name, Reply::Panic)
    }

    fn new(name: &str, reply: Reply) -> Self {
        Self {
            name: name.to_string(),
            reply,
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn log(&self) -> Arc<Mutex<Vec<HashMap<String, Value>>>> {
        self.log.clone()
    }
}

impl LlmTool for MockTool {
    fn run(&self, args: &HashMap<String, Value>) -> Result<Value> {
        self.log.lock().unwrap().push(args.clone());
        match &self.reply {
            Reply::Value(value) => Ok(value.clone()),
            Reply::Error(message) => Err(BrokerError::ToolError(message.clone())),
            Reply::Panic => panic!("{} blew up", self.name),
        }
    }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::function(self.name.clone(), "A mock tool", json!({"type": "object"}))
    }
}

/// Event type names in recording order, e.g. `["LlmCallTracerEvent", ...]`
pub fn event_kinds(tracer: &TracerSystem) -> Vec<String> {
    tracer
        .get_event_summaries(None, None, None)
        .iter()
        .filter_map(|summary| summary.split_whitespace().nth(1).map(String::from))
        .collect()
}

/// Tracer that panics on every recording
pub struct PanickingTracer;

impl Tracer for PanickingTracer {
    fn record_llm_call(&self, _: &str, _: &[LlmMessage], _: f32, _: &[String], _: &str, _: &str) {
        panic!("sink down");
    }

    fn record_llm_response(
        &self,
        _: &str,
        _: &str,
        _: &[LlmToolCall],
        _: Option<f64>,
        _: &str,
        _: &str,
    ) {
        panic!("sink down");
    }

    fn record_tool_call(
        &self,
        _: &str,
        _: &HashMap<String, Value>,
        _: &Value,
        _: Option<f64>,
        _: &str,
        _: &str,
    ) {
        panic!("sink down");
    }
}

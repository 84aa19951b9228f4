//! Provider-agnostic orchestration of model calls and tool execution
//!
//! [`LlmBroker`] sends a conversation to a gateway, runs any tools the model asks for,
//! appends the results, and asks again until the model answers without tool calls.
//! The same loop is available as a one-shot call ([`LlmBroker::generate`]) and as a
//! stream of text chunks ([`LlmBroker::generate_stream`]).

mod accumulator;
mod stream;
#[cfg(test)]
pub(crate) mod test_support;

use crate::error::{BrokerError, Result};
use crate::llm::gateway::{CompletionConfig, LlmGateway};
use crate::llm::models::{LlmMessage, LlmToolCall};
use crate::llm::tools::{LlmTool, ToolOutcome};
use crate::tracer::{NullTracer, Tracer};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

const DEFAULT_SOURCE: &str = "llm_broker";

/// Main interface for LLM interactions
pub struct LlmBroker {
    model: String,
    gateway: Arc<dyn LlmGateway>,
    tracer: Arc<dyn Tracer>,
    source: String,
    max_tool_rounds: Option<usize>,
}

impl LlmBroker {
    /// Create a new LLM broker
    ///
    /// Without a tracer, observations go to a [`NullTracer`].
    pub fn new(
        model: impl Into<String>,
        gateway: Arc<dyn LlmGateway>,
        tracer: Option<Arc<dyn Tracer>>,
    ) -> Self {
        Self {
            model: model.into(),
            gateway,
            tracer: tracer.unwrap_or_else(|| Arc::new(NullTracer)),
            source: DEFAULT_SOURCE.to_string(),
            max_tool_rounds: None,
        }
    }

    /// Fail with [`BrokerError::ToolLoopLimit`] once the model has requested tools
    /// more than `rounds` times in one invocation
    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = Some(rounds);
        self
    }

    /// Label attached to every tracer event this broker records
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Generate text response from LLM
    ///
    /// The caller's `messages` are left untouched; tool rounds are appended to a
    /// private copy. Tool failures are reported to the model as `{"error": ...}`
    /// results, while gateway failures end the invocation.
    pub async fn generate(
        &self,
        messages: &[LlmMessage],
        tools: Option<&[Box<dyn LlmTool>]>,
        config: Option<CompletionConfig>,
        correlation_id: Option<String>,
    ) -> Result<String> {
        let config = config.unwrap_or_default();
        let correlation_id = correlation_id.unwrap_or_else(new_correlation_id);
        let mut conversation = messages.to_vec();
        let mut rounds = 0;

        loop {
            self.record_call(&conversation, tools, &config, &correlation_id);

            let started = Instant::now();
            let response =
                self.gateway.complete(&self.model, &conversation, tools, &config).await?;
            self.record_response(
                response.content.as_deref().unwrap_or_default(),
                &response.tool_calls,
                started,
                &correlation_id,
            );

            if response.tool_calls.is_empty() {
                return Ok(response.content.unwrap_or_default());
            }
            let Some(available) = tools.filter(|t| !t.is_empty()) else {
                warn!("LLM requested tool calls but no tools provided");
                return Ok(response.content.unwrap_or_default());
            };

            rounds += 1;
            self.check_round_limit(rounds)?;
            info!(round = rounds, "Tool calls requested: {}", response.tool_calls.len());

            let outcomes = response
                .tool_calls
                .iter()
                .map(|call| self.execute_tool_call(call, available, &correlation_id))
                .collect();
            append_tool_round(&mut conversation, response.content, response.tool_calls, outcomes);
        }
    }

    /// Generate structured object response from LLM
    ///
    /// The JSON schema of `T` is sent to the gateway, and the returned object is
    /// deserialized into `T`.
    pub async fn generate_object<T>(
        &self,
        messages: &[LlmMessage],
        config: Option<CompletionConfig>,
        correlation_id: Option<String>,
    ) -> Result<T>
    where
        T: DeserializeOwned + JsonSchema,
    {
        let config = config.unwrap_or_default();
        let correlation_id = correlation_id.unwrap_or_else(new_correlation_id);
        let schema = serde_json::to_value(schemars::schema_for!(T))?;

        self.record_call(messages, None, &config, &correlation_id);
        let started = Instant::now();
        let response =
            self.gateway.complete_object(&self.model, messages, schema, &config).await?;

        let summary = match (&response.object, &response.content) {
            (Some(object), _) => object.to_string(),
            (None, Some(content)) => content.clone(),
            (None, None) => String::new(),
        };
        self.record_response(&summary, &[], started, &correlation_id);

        let object = response.object.ok_or(BrokerError::NoObjectInResponse)?;
        Ok(serde_json::from_value(object)?)
    }

    /// Models the gateway can serve
    pub async fn list_models(&self) -> Result<Vec<String>> {
        self.gateway.get_available_models().await
    }

    fn record_call(
        &self,
        messages: &[LlmMessage],
        tools: Option<&[Box<dyn LlmTool>]>,
        config: &CompletionConfig,
        correlation_id: &str,
    ) {
        let tool_names: Vec<String> = tools
            .unwrap_or_default()
            .iter()
            .map(|t| t.descriptor().function.name)
            .collect();

        self.observe(|tracer| {
            tracer.record_llm_call(
                &self.model,
                messages,
                config.temperature,
                &tool_names,
                &self.source,
                correlation_id,
            )
        });
    }

    fn record_response(
        &self,
        content: &str,
        tool_calls: &[LlmToolCall],
        started: Instant,
        correlation_id: &str,
    ) {
        let duration = elapsed_ms(started);
        self.observe(|tracer| {
            tracer.record_llm_response(
                &self.model,
                content,
                tool_calls,
                Some(duration),
                &self.source,
                correlation_id,
            )
        });
    }

    /// Hand one observation to the tracer; a panicking tracer is logged and ignored
    fn observe(&self, record: impl FnOnce(&dyn Tracer)) {
        let tracer = self.tracer.as_ref();
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| record(tracer))) {
            warn!("Tracer failed: {}", panic_message(payload.as_ref()));
        }
    }

    fn check_round_limit(&self, rounds: usize) -> Result<()> {
        match self.max_tool_rounds {
            Some(limit) if rounds > limit => {
                warn!("Tool loop limit of {} rounds exceeded", limit);
                Err(BrokerError::ToolLoopLimit(limit))
            }
            _ => Ok(()),
        }
    }

    /// Run one requested call, turning every failure into a [`ToolOutcome::Failure`]
    fn execute_tool_call(
        &self,
        call: &LlmToolCall,
        tools: &[Box<dyn LlmTool>],
        correlation_id: &str,
    ) -> ToolOutcome {
        let Some(tool) = tools.iter().find(|t| t.matches(&call.name)) else {
            warn!("Tool not found: {}", call.name);
            return BrokerError::ToolNotFound(call.name.clone()).into();
        };

        info!("Executing tool: {}", call.name);
        let started = Instant::now();
        let outcome = match catch_unwind(AssertUnwindSafe(|| tool.run(&call.arguments))) {
            Ok(result) => ToolOutcome::from(result),
            Err(payload) => BrokerError::ToolPanicked(panic_message(payload.as_ref())).into(),
        };
        let duration = elapsed_ms(started);

        match &outcome {
            ToolOutcome::Success(_) => debug!("Tool {} finished in {:.1}ms", call.name, duration),
            ToolOutcome::Failure(error) => warn!("Tool execution failed: {}", error),
        }

        self.observe(|tracer| {
            tracer.record_tool_call(
                &call.name,
                &call.arguments,
                &outcome.to_json(),
                Some(duration),
                &self.source,
                correlation_id,
            )
        });

        outcome
    }
}

/// Append one assistant turn with its calls, then one tool message per call in order
fn append_tool_round(
    conversation: &mut Vec<LlmMessage>,
    content: Option<String>,
    calls: Vec<LlmToolCall>,
    outcomes: Vec<ToolOutcome>,
) {
    let results: Vec<LlmMessage> = calls
        .iter()
        .zip(outcomes)
        .map(|(call, outcome)| LlmMessage::tool_result(call, outcome.to_json().to_string()))
        .collect();

    conversation.push(LlmMessage::assistant_tool_calls(content, calls));
    conversation.extend(results);
}

fn new_correlation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

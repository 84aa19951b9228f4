//! Null tracer implementation following the Null Object Pattern

use super::Tracer;
use crate::llm::models::{LlmMessage, LlmToolCall};
use serde_json::Value;
use std::collections::HashMap;

/// A tracer that discards everything
///
/// This is the broker's default, so call sites never need to check whether tracing
/// is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTracer;

impl NullTracer {
    pub fn new() -> Self {
        Self
    }

    pub fn is_enabled(&self) -> bool {
        false
    }
}

impl Tracer for NullTracer {
    fn record_llm_call(
        &self,
        _model: &str,
        _messages: &[LlmMessage],
        _temperature: f32,
        _tool_names: &[String],
        _source: &str,
        _correlation_id: &str,
    ) {
    }

    fn record_llm_response(
        &self,
        _model: &str,
        _content: &str,
        _tool_calls: &[LlmToolCall],
        _call_duration_ms: Option<f64>,
        _source: &str,
        _correlation_id: &str,
    ) {
    }

    fn record_tool_call(
        &self,
        _tool_name: &str,
        _arguments: &HashMap<String, Value>,
        _result: &Value,
        _call_duration_ms: Option<f64>,
        _source: &str,
        _correlation_id: &str,
    ) {
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_tracer_accepts_everything() {
        let tracer = NullTracer::new();
        assert!(!tracer.is_enabled());

        tracer.record_llm_call("llama3.2", &[LlmMessage::user("hi")], 0.7, &[], "test", "c");
        tracer.record_llm_response("llama3.2", "Hello", &[], Some(150.5), "test", "c");
        tracer.record_tool_call(
            "example_tool",
            &HashMap::new(),
            &serde_json::json!({"output": "result"}),
            Some(25.0),
            "test",
            "c",
        );
    }

    #[test]
    fn test_usable_as_trait_object() {
        let tracer: std::sync::Arc<dyn Tracer> = std::sync::Arc::new(NullTracer);
        tracer.record_llm_response("m", "", &[], None, "test", "c");
    }
}

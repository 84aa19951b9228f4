//! Recording tracer backed by an [`EventStore`]

use super::event_store::EventStore;
use super::tracer_events::*;
use super::Tracer;
use crate::llm::models::{LlmMessage, LlmToolCall};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Central system for capturing and querying tracer events
///
/// Recording can be switched off and on at runtime; while disabled, record calls
/// are dropped.
pub struct TracerSystem {
    event_store: Arc<EventStore>,
    enabled: AtomicBool,
}

impl TracerSystem {
    /// Create a tracer over `event_store` (a fresh store when `None`)
    pub fn new(event_store: Option<Arc<EventStore>>, enabled: bool) -> Self {
        Self {
            event_store: event_store.unwrap_or_default(),
            enabled: AtomicBool::new(enabled),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    /// The underlying store
    pub fn event_store(&self) -> &Arc<EventStore> {
        &self.event_store
    }

    /// Record an arbitrary tracer event
    pub fn record_event(&self, event: Box<dyn TracerEvent>) {
        if !self.is_enabled() {
            return;
        }
        self.event_store.store(event);
    }

    pub fn get_event_summaries(
        &self,
        start_time: Option<f64>,
        end_time: Option<f64>,
        filter_func: Option<&dyn EventFilterFn>,
    ) -> Vec<String> {
        self.event_store.get_event_summaries(start_time, end_time, filter_func)
    }

    pub fn get_last_n_summaries(
        &self,
        n: usize,
        filter_func: Option<&dyn EventFilterFn>,
    ) -> Vec<String> {
        self.event_store.get_last_n_summaries(n, filter_func)
    }

    pub fn count_events(
        &self,
        start_time: Option<f64>,
        end_time: Option<f64>,
        filter_func: Option<&dyn EventFilterFn>,
    ) -> usize {
        self.event_store.count_events(start_time, end_time, filter_func)
    }

    pub fn clear(&self) {
        self.event_store.clear();
    }

    pub fn len(&self) -> usize {
        self.event_store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.event_store.is_empty()
    }
}

impl Default for TracerSystem {
    fn default() -> Self {
        Self::new(None, true)
    }
}

impl Tracer for TracerSystem {
    fn record_llm_call(
        &self,
        model: &str,
        messages: &[LlmMessage],
        temperature: f32,
        tool_names: &[String],
        source: &str,
        correlation_id: &str,
    ) {
        self.record_event(Box::new(LlmCallTracerEvent {
            timestamp: current_timestamp(),
            correlation_id: correlation_id.to_string(),
            source: source.to_string(),
            model: model.to_string(),
            messages: messages.to_vec(),
            temperature: f64::from(temperature),
            tools: tool_names.to_vec(),
        }));
    }

    fn record_llm_response(
        &self,
        model: &str,
        content: &str,
        tool_calls: &[LlmToolCall],
        call_duration_ms: Option<f64>,
        source: &str,
        correlation_id: &str,
    ) {
        self.record_event(Box::new(LlmResponseTracerEvent {
            timestamp: current_timestamp(),
            correlation_id: correlation_id.to_string(),
            source: source.to_string(),
            model: model.to_string(),
            content: content.to_string(),
            tool_calls: tool_calls.to_vec(),
            call_duration_ms,
        }));
    }

    fn record_tool_call(
        &self,
        tool_name: &str,
        arguments: &HashMap<String, Value>,
        result: &Value,
        call_duration_ms: Option<f64>,
        source: &str,
        correlation_id: &str,
    ) {
        self.record_event(Box::new(ToolCallTracerEvent {
            timestamp: current_timestamp(),
            correlation_id: correlation_id.to_string(),
            source: source.to_string(),
            tool_name: tool_name.to_string(),
            arguments: arguments.clone(),
            result: result.clone(),
            call_duration_ms,
        }));
    }
}

/// Seconds since the Unix epoch
fn current_timestamp() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or_default()
}

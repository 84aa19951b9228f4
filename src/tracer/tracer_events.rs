//! Tracer event types for tracking broker interactions
//!
//! Every event carries a timestamp, the correlation ID of the top-level broker call
//! that caused it, and a source label. Events can be rendered with
//! [`TracerEvent::printable_summary`] and selected with an [`EventFilterFn`].

use crate::llm::models::{LlmMessage, LlmToolCall};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;

const PREVIEW_CHARS: usize = 100;

/// Trait for filtering tracer events
///
/// Implemented for any `Fn(&dyn TracerEvent) -> bool`, so closures work directly.
pub trait EventFilterFn: Send + Sync {
    /// Test whether an event passes the filter
    fn matches(&self, event: &dyn TracerEvent) -> bool;
}

impl<F> EventFilterFn for F
where
    F: Fn(&dyn TracerEvent) -> bool + Send + Sync,
{
    fn matches(&self, event: &dyn TracerEvent) -> bool {
        self(event)
    }
}

/// Filter selecting events of concrete type `T`
pub fn of_type<T: TracerEvent + 'static>() -> impl EventFilterFn {
    |event: &dyn TracerEvent| event.as_any().is::<T>()
}

/// Filter selecting events that belong to one correlation ID
pub fn with_correlation_id(correlation_id: impl Into<String>) -> impl EventFilterFn {
    let correlation_id = correlation_id.into();
    move |event: &dyn TracerEvent| event.correlation_id() == correlation_id
}

/// Base trait for all tracer events
pub trait TracerEvent: Send + Sync {
    /// Unix timestamp (seconds) when the event occurred
    fn timestamp(&self) -> f64;

    /// Correlation ID shared by all events of one broker invocation
    fn correlation_id(&self) -> &str;

    /// Component that recorded the event
    fn source(&self) -> &str;

    /// Human-readable multi-line summary
    fn printable_summary(&self) -> String;

    /// Access to the concrete event type
    fn as_any(&self) -> &dyn Any;
}

/// Records when an LLM is called with specific messages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmCallTracerEvent {
    pub timestamp: f64,
    pub correlation_id: String,
    pub source: String,
    pub model: String,
    /// Snapshot of the conversation sent to the model
    pub messages: Vec<LlmMessage>,
    pub temperature: f64,
    /// Names of the tools offered to the model
    pub tools: Vec<String>,
}

impl TracerEvent for LlmCallTracerEvent {
    fn timestamp(&self) -> f64 {
        self.timestamp
    }

    fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    fn source(&self) -> &str {
        &self.source
    }

    fn printable_summary(&self) -> String {
        let mut summary = format!(
            "[{}] LlmCallTracerEvent (correlation_id: {})\n   Model: {}",
            format_timestamp(self.timestamp),
            self.correlation_id,
            self.model
        );

        if !self.messages.is_empty() {
            let count = self.messages.len();
            let plural = if count != 1 { "s" } else { "" };
            summary.push_str(&format!("\n   Messages: {} message{}", count, plural));
        }

        if (self.temperature - 1.0).abs() > f64::EPSILON {
            summary.push_str(&format!("\n   Temperature: {}", self.temperature));
        }

        if !self.tools.is_empty() {
            summary.push_str(&format!("\n   Available Tools: {}", self.tools.join(", ")));
        }

        summary
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Records when an LLM responds to a call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponseTracerEvent {
    pub timestamp: f64,
    pub correlation_id: String,
    pub source: String,
    pub model: String,
    pub content: String,
    pub tool_calls: Vec<LlmToolCall>,
    pub call_duration_ms: Option<f64>,
}

impl TracerEvent for LlmResponseTracerEvent {
    fn timestamp(&self) -> f64 {
        self.timestamp
    }

    fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    fn source(&self) -> &str {
        &self.source
    }

    fn printable_summary(&self) -> String {
        let mut summary = format!(
            "[{}] LlmResponseTracerEvent (correlation_id: {})\n   Model: {}",
            format_timestamp(self.timestamp),
            self.correlation_id,
            self.model
        );

        if !self.content.is_empty() {
            summary.push_str(&format!("\n   Content: {}", preview(&self.content)));
        }

        if !self.tool_calls.is_empty() {
            let names: Vec<&str> = self.tool_calls.iter().map(|c| c.name.as_str()).collect();
            let count = names.len();
            let plural = if count != 1 { "s" } else { "" };
            summary.push_str(&format!(
                "\n   Tool Calls: {} call{} ({})",
                count,
                plural,
                names.join(", ")
            ));
        }

        if let Some(duration) = self.call_duration_ms {
            summary.push_str(&format!("\n   Duration: {:.2}ms", duration));
        }

        summary
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Records when the broker executes a tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallTracerEvent {
    pub timestamp: f64,
    pub correlation_id: String,
    pub source: String,
    pub tool_name: String,
    pub arguments: HashMap<String, Value>,
    /// JSON payload reported back to the model, success or failure
    pub result: Value,
    pub call_duration_ms: Option<f64>,
}

impl TracerEvent for ToolCallTracerEvent {
    fn timestamp(&self) -> f64 {
        self.timestamp
    }

    fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    fn source(&self) -> &str {
        &self.source
    }

    fn printable_summary(&self) -> String {
        let mut summary = format!(
            "[{}] ToolCallTracerEvent (correlation_id: {})\n   Tool: {}",
            format_timestamp(self.timestamp),
            self.correlation_id,
            self.tool_name
        );

        if !self.arguments.is_empty() {
            summary.push_str(&format!("\n   Arguments: {:?}", self.arguments));
        }

        summary.push_str(&format!("\n   Result: {}", preview(&self.result.to_string())));

        if let Some(duration) = self.call_duration_ms {
            summary.push_str(&format!("\n   Duration: {:.2}ms", duration));
        }

        summary
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn format_timestamp(timestamp: f64) -> String {
    DateTime::from_timestamp_micros((timestamp * 1_000_000.0) as i64)
        .map(|dt| dt.with_timezone(&Local).format("%H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| format!("{:.3}", timestamp))
}

fn preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_CHARS {
        format!("{}...", text.chars().take(PREVIEW_CHARS).collect::<String>())
    } else {
        text.to_string()
    }
}

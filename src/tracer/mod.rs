//! Observability for broker invocations
//!
//! The broker reports three kinds of observations through the [`Tracer`] trait: a
//! model call, the model's response, and each tool execution. Every observation
//! carries the correlation ID of the top-level `generate`/`generate_stream` call, so
//! a whole tool-augmented exchange can be grouped after the fact.
//!
//! - [`NullTracer`] discards everything and is the broker's default.
//! - [`TracerSystem`] stores typed events in an [`EventStore`] that can be queried by
//!   time range or with an [`EventFilterFn`].
//!
//! Recording methods return nothing, so a sink cannot change the broker's control
//! flow.
//!
//! ```rust,ignore
//! use llm_broker::tracer::{of_type, LlmCallTracerEvent, TracerSystem};
//!
//! let tracer = Arc::new(TracerSystem::default());
//! let broker = LlmBroker::new("qwen3:32b", gateway, Some(tracer.clone()));
//! broker.generate(&messages, Some(&tools), None, None).await?;
//!
//! let calls = tracer.count_events(None, None, Some(&of_type::<LlmCallTracerEvent>()));
//! ```

pub mod event_store;
pub mod null_tracer;
pub mod tracer_events;
pub mod tracer_system;

use crate::llm::models::{LlmMessage, LlmToolCall};
use serde_json::Value;
use std::collections::HashMap;

pub use event_store::{EventCallback, EventStore};
pub use null_tracer::NullTracer;
pub use tracer_events::{
    of_type, with_correlation_id, EventFilterFn, LlmCallTracerEvent, LlmResponseTracerEvent,
    ToolCallTracerEvent, TracerEvent,
};
pub use tracer_system::TracerSystem;

/// Sink for broker observations
///
/// Implementations must be safe for concurrent use by independent invocations.
pub trait Tracer: Send + Sync {
    /// A conversation is about to be sent to `model`
    fn record_llm_call(
        &self,
        model: &str,
        messages: &[LlmMessage],
        temperature: f32,
        tool_names: &[String],
        source: &str,
        correlation_id: &str,
    );

    /// `model` answered, possibly with tool calls
    fn record_llm_response(
        &self,
        model: &str,
        content: &str,
        tool_calls: &[LlmToolCall],
        call_duration_ms: Option<f64>,
        source: &str,
        correlation_id: &str,
    );

    /// A tool was executed; `result` is the payload reported back to the model
    fn record_tool_call(
        &self,
        tool_name: &str,
        arguments: &HashMap<String, Value>,
        result: &Value,
        call_duration_ms: Option<f64>,
        source: &str,
        correlation_id: &str,
    );
}

//! Provider-agnostic LLM client
//!
//! An [`LlmBroker`](llm::LlmBroker) drives a conversation against any
//! [`LlmGateway`](llm::LlmGateway), executing tool calls the model requests and
//! feeding results back until the model answers in plain text. Streaming is
//! supported with the same tool semantics, and every call can be observed through a
//! [`Tracer`](tracer::Tracer).

pub mod error;
pub mod llm;
pub mod tracer;

pub use error::{BrokerError, Result};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::error::{BrokerError, Result};
    #[cfg(feature = "ollama")]
    pub use crate::llm::gateways::OllamaGateway;
    #[cfg(feature = "openai")]
    pub use crate::llm::gateways::OpenAIGateway;
    pub use crate::llm::tools::{FunctionDescriptor, LlmTool, ToolDescriptor, ToolOutcome};
    pub use crate::llm::{
        CompletionConfig, LlmBroker, LlmGateway, LlmMessage, LlmToolCall, MessageRole,
    };
    pub use crate::tracer::{NullTracer, Tracer, TracerSystem};
}

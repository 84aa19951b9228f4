pub mod broker;
pub mod gateway;
pub mod gateways;
pub mod models;
pub mod tools;

pub use broker::LlmBroker;
pub use gateway::{
    CompletionConfig, FragmentStream, LlmGateway, ResponseFormat, StreamFragment, ToolCallDelta,
};
pub use models::{validate_conversation, LlmGatewayResponse, LlmMessage, LlmToolCall, MessageRole};
pub use tools::{FunctionDescriptor, LlmTool, ToolDescriptor, ToolOutcome};

//! Error types and result aliases for the broker.
//!
//! [`BrokerError`] covers both failures that end an invocation (gateway and transport
//! problems, a missing structured object, the tool-round limit) and tool-level failures
//! that the broker absorbs into the conversation as data. [`BrokerError::is_fatal`] tells
//! the two apart.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("LLM gateway error: {0}")]
    GatewayError(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Tool error: {0}")]
    ToolError(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid arguments for tool {tool}: {message}")]
    ArgumentParse { tool: String, message: String },

    #[error("Tool panicked: {0}")]
    ToolPanicked(String),

    #[error("No object in response")]
    NoObjectInResponse,

    #[error("Tool loop exceeded {0} rounds")]
    ToolLoopLimit(usize),

    #[error("Invalid conversation: {0}")]
    InvalidConversation(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl BrokerError {
    /// Whether this error terminates a broker invocation.
    ///
    /// Tool-level failures are recorded in the conversation so the model can react to
    /// them; everything else propagates to the caller.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            BrokerError::ToolError(_)
                | BrokerError::ToolNotFound(_)
                | BrokerError::ArgumentParse { .. }
                | BrokerError::ToolPanicked(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, BrokerError>;

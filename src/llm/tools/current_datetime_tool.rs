use crate::error::{BrokerError, Result};
use crate::llm::tools::{LlmTool, ToolDescriptor};
use chrono::Local;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt::Write;

const DEFAULT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Tool that reports the current local date and time
///
/// Accepts an optional chrono `format_string`. A malformed format string is reported
/// as a tool error rather than a panic.
#[derive(Debug, Clone, Copy, Default)]
pub struct CurrentDatetimeTool;

impl CurrentDatetimeTool {
    pub fn new() -> Self {
        Self
    }
}

impl LlmTool for CurrentDatetimeTool {
    fn run(&self, args: &HashMap<String, Value>) -> Result<Value> {
        let format_string =
            args.get("format_string").and_then(|v| v.as_str()).unwrap_or(DEFAULT_FORMAT);

        let now = Local::now();
        let mut formatted = String::new();
        write!(formatted, "{}", now.format(format_string)).map_err(|_| {
            BrokerError::ToolError(format!("Invalid format string: {}", format_string))
        })?;

        Ok(json!({
            "current_datetime": formatted,
            "timestamp": now.timestamp(),
            "timezone": now.offset().to_string()
        }))
    }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::function(
            "get_current_datetime",
            "Get the current date and time. Useful when you need to know the current time or date.",
            json!({
                "type": "object",
                "properties": {
                    "format_string": {
                        "type": "string",
                        "description": "strftime-style format for the datetime (e.g. '%Y-%m-%d %H:%M:%S', '%A, %B %d, %Y')."
                    }
                },
                "required": []
            }),
        )
    }
}

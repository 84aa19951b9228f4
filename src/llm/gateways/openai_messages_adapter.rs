//! Conversion between broker messages and the OpenAI chat-completions wire format.

use super::encode_image;
use crate::error::Result;
use crate::llm::gateway::ToolCallDelta;
use crate::llm::models::{LlmMessage, LlmToolCall, MessageRole};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

/// Determine image type from file extension.
fn get_image_type(file_path: &str) -> &'static str {
    let ext = Path::new(file_path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "png" => "png",
        "gif" => "gif",
        "webp" => "webp",
        _ => "jpeg",
    }
}

fn image_data_url(file_path: &str) -> Result<String> {
    Ok(format!("data:image/{};base64,{}", get_image_type(file_path), encode_image(file_path)?))
}

fn user_content(msg: &LlmMessage) -> Result<Value> {
    let text = msg.content.as_deref().unwrap_or("");
    let images = msg.image_paths.as_deref().unwrap_or(&[]);
    if images.is_empty() {
        return Ok(json!(text));
    }

    let mut parts = Vec::with_capacity(images.len() + 1);
    if !text.is_empty() {
        parts.push(json!({ "type": "text", "text": text }));
    }
    for path in images {
        parts.push(json!({
            "type": "image_url",
            "image_url": { "url": image_data_url(path)? }
        }));
    }

    Ok(Value::Array(parts))
}

/// Adapt LLM messages to OpenAI format.
///
/// Images are inlined as data URLs; an unreadable image fails the whole request.
pub fn adapt_messages_to_openai(messages: &[LlmMessage]) -> Result<Vec<Value>> {
    messages
        .iter()
        .map(|msg| {
            Ok(match msg.role {
                MessageRole::System => json!({
                    "role": "system",
                    "content": msg.content.as_deref().unwrap_or("")
                }),
                MessageRole::User => json!({
                    "role": "user",
                    "content": user_content(msg)?
                }),
                MessageRole::Assistant => {
                    let mut assistant_msg = json!({
                        "role": "assistant",
                        "content": msg.content
                    });

                    if !msg.calls().is_empty() {
                        let formatted: Vec<Value> = msg
                            .calls()
                            .iter()
                            .map(|tc| {
                                json!({
                                    "id": tc.id.as_deref().unwrap_or(""),
                                    "type": "function",
                                    "function": {
                                        "name": tc.name,
                                        "arguments": json!(tc.arguments).to_string()
                                    }
                                })
                            })
                            .collect();
                        assistant_msg["tool_calls"] = json!(formatted);
                    }

                    assistant_msg
                }
                MessageRole::Tool => {
                    let tool_call_id =
                        msg.calls().first().and_then(|tc| tc.id.as_deref()).unwrap_or("");

                    json!({
                        "role": "tool",
                        "content": msg.content.as_deref().unwrap_or(""),
                        "tool_call_id": tool_call_id
                    })
                }
            })
        })
        .collect()
}

/// Convert complete tool calls from an OpenAI response.
///
/// Calls without a function name are dropped. Arguments that are not a JSON object
/// are logged and replaced with an empty map.
pub fn convert_tool_calls(tool_calls: &[Value]) -> Vec<LlmToolCall> {
    tool_calls
        .iter()
        .filter_map(|tc| {
            let name = tc["function"]["name"].as_str()?.to_string();
            let raw = tc["function"]["arguments"].as_str().unwrap_or("");

            let arguments = if raw.trim().is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str(raw).unwrap_or_else(|e| {
                    warn!("Unparseable arguments for {}: {}", name, e);
                    HashMap::new()
                })
            };

            Some(LlmToolCall {
                id: tc["id"].as_str().map(String::from),
                name,
                arguments,
            })
        })
        .collect()
}

/// Convert the `tool_calls` array of one streamed `delta` into fragments.
///
/// OpenAI numbers parallel calls with `index`; when it is missing the position in the
/// array is used.
pub fn convert_tool_call_deltas(tool_calls: &[Value]) -> Vec<ToolCallDelta> {
    tool_calls
        .iter()
        .enumerate()
        .map(|(position, tc)| ToolCallDelta {
            index: tc["index"].as_u64().map_or(position, |i| i as usize),
            id: tc["id"].as_str().map(String::from),
            name: tc["function"]["name"].as_str().map(String::from),
            arguments: tc["function"]["arguments"].as_str().map(String::from),
        })
        .collect()
}

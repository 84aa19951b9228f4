use crate::error::BrokerError;
use crate::llm::gateway::ToolCallDelta;
use crate::llm::models::LlmToolCall;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Per-level state of a streaming completion.
///
/// Text deltas are kept as received and joined only when the level ends. Tool call
/// fragments are merged by index; a call is not usable until [`finish`](Self::finish).
#[derive(Debug, Default)]
pub(crate) struct StreamAccumulator {
    content: Vec<String>,
    pending: BTreeMap<usize, PendingToolCall>,
}

#[derive(Debug, Default)]
struct PendingToolCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// A tool call reassembled from its fragments.
///
/// When the concatenated arguments were not a JSON object, `call.arguments` is empty
/// and `parse_error` says why. The call is still answered in the conversation.
#[derive(Debug)]
pub(crate) struct FinalizedCall {
    pub call: LlmToolCall,
    pub parse_error: Option<BrokerError>,
}

impl StreamAccumulator {
    pub fn push_content(&mut self, text: &str) {
        self.content.push(text.to_string());
    }

    pub fn merge(&mut self, delta: ToolCallDelta) {
        let pending = self.pending.entry(delta.index).or_default();

        if let Some(id) = delta.id.filter(|id| !id.is_empty()) {
            pending.id = Some(id);
        }
        if let Some(name) = delta.name {
            pending.name.push_str(&name);
        }
        if let Some(arguments) = delta.arguments {
            pending.arguments.push_str(&arguments);
        }
    }

    /// Text received so far for this level
    pub fn content(&self) -> String {
        self.content.concat()
    }

    /// Finalize every pending call, in index order
    pub fn finish(self) -> Vec<FinalizedCall> {
        self.pending.into_values().map(PendingToolCall::finish).collect()
    }
}

impl PendingToolCall {
    fn finish(self) -> FinalizedCall {
        let raw = self.arguments.trim();

        let (arguments, parse_error) = if raw.is_empty() {
            (HashMap::new(), None)
        } else {
            match serde_json::from_str::<HashMap<String, Value>>(raw) {
                Ok(arguments) => (arguments, None),
                Err(e) => (
                    HashMap::new(),
                    Some(BrokerError::ArgumentParse {
                        tool: self.name.clone(),
                        message: e.to_string(),
                    }),
                ),
            }
        };

        FinalizedCall {
            call: LlmToolCall {
                id: self.id,
                name: self.name,
                arguments,
            },
            parse_error,
        }
    }
}

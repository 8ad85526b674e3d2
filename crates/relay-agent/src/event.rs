//! Agent stream event model.
//!
//! The backend emits semi-structured JSON records discriminated by
//! `message_type`. Decoding is total: anything the relay does not act on,
//! including records without a discriminant, becomes [`AgentEvent::Unknown`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const ASSISTANT_MESSAGE_TYPE: &str = "assistant_message";
pub const REASONING_MESSAGE_TYPE: &str = "reasoning_message";
pub const SYSTEM_ALERT_TYPE: &str = "system_alert";
pub const TOOL_CALL_MESSAGE_TYPE: &str = "tool_call_message";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// Tool invocation carried by a `tool_call_message` event. `arguments` is the
/// JSON-encoded argument string exactly as the backend sent it.
pub struct ToolCallDescriptor {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Enumerates the agent stream events the relay distinguishes.
pub enum AgentEvent {
    AssistantMessage { content: String },
    ReasoningMessage { reasoning: String },
    SystemAlert { message: String },
    ToolCallMessage { tool_call: ToolCallDescriptor },
    Unknown { message_type: Option<String> },
}

impl AgentEvent {
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::AssistantMessage {
            content: content.into(),
        }
    }

    pub fn reasoning(reasoning: impl Into<String>) -> Self {
        Self::ReasoningMessage {
            reasoning: reasoning.into(),
        }
    }

    pub fn system_alert(message: impl Into<String>) -> Self {
        Self::SystemAlert {
            message: message.into(),
        }
    }

    pub fn tool_call(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self::ToolCallMessage {
            tool_call: ToolCallDescriptor {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }

    pub fn unknown(message_type: Option<&str>) -> Self {
        Self::Unknown {
            message_type: message_type.map(str::to_string),
        }
    }

    pub fn message_type(&self) -> &str {
        match self {
            Self::AssistantMessage { .. } => ASSISTANT_MESSAGE_TYPE,
            Self::ReasoningMessage { .. } => REASONING_MESSAGE_TYPE,
            Self::SystemAlert { .. } => SYSTEM_ALERT_TYPE,
            Self::ToolCallMessage { .. } => TOOL_CALL_MESSAGE_TYPE,
            Self::Unknown { message_type } => message_type.as_deref().unwrap_or("unknown"),
        }
    }

    /// Decodes one raw stream record.
    pub fn from_value(value: &Value) -> Self {
        let Some(message_type) = value.get("message_type").and_then(Value::as_str) else {
            return Self::unknown(None);
        };
        match message_type {
            ASSISTANT_MESSAGE_TYPE => Self::assistant(text_content(value.get("content"))),
            REASONING_MESSAGE_TYPE => Self::reasoning(string_field(value, "reasoning")),
            SYSTEM_ALERT_TYPE => Self::system_alert(string_field(value, "message")),
            TOOL_CALL_MESSAGE_TYPE => match tool_call_descriptor(value) {
                Some(tool_call) => Self::ToolCallMessage { tool_call },
                None => Self::unknown(Some(message_type)),
            },
            other => Self::unknown(Some(other)),
        }
    }
}

fn string_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

// Assistant content is either a plain string or a list of typed parts.
fn text_content(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|part| match part {
                Value::String(text) => Some(text.as_str()),
                Value::Object(_) => part.get("text").and_then(Value::as_str),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(""),
        _ => String::new(),
    }
}

fn tool_call_descriptor(value: &Value) -> Option<ToolCallDescriptor> {
    let tool_call = value.get("tool_call").filter(|call| call.is_object()).or_else(|| {
        value
            .get("tool_calls")
            .and_then(Value::as_array)
            .and_then(|calls| calls.first())
    })?;
    let name = tool_call.get("name").and_then(Value::as_str)?.trim();
    if name.is_empty() {
        return None;
    }
    let arguments = match tool_call.get("arguments") {
        Some(Value::String(raw)) => raw.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    Some(ToolCallDescriptor {
        name: name.to_string(),
        arguments,
    })
}

//! Maps agent stream events to delivery actions.
//!
//! `classify` is pure: no I/O and no clock. Rendering problems for a single
//! tool call degrade to the raw-argument summary and are logged.

use relay_agent::{AgentEvent, ToolCallDescriptor};
use serde_json::Value;

const REASONING_HEADER: &str = "Reasoning:";
const TOOL_SUMMARY_PREFIX: &str = "🔧 Using tool:";

#[derive(Debug, Clone, PartialEq, Eq)]
/// What the delivery pipeline should do with one agent event.
pub enum ClassifiedAction {
    EmitText(String),
    EmitToolSummary { name: String, rendered: String },
    EmitAlert(String),
    Ignore,
}

impl ClassifiedAction {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmitText(_) => "text",
            Self::EmitToolSummary { .. } => "tool_summary",
            Self::EmitAlert(_) => "alert",
            Self::Ignore => "ignore",
        }
    }

    pub fn is_ignore(&self) -> bool {
        matches!(self, Self::Ignore)
    }
}

pub fn classify(event: &AgentEvent) -> ClassifiedAction {
    match event {
        AgentEvent::AssistantMessage { content } if !content.trim().is_empty() => {
            ClassifiedAction::EmitText(content.clone())
        }
        AgentEvent::ReasoningMessage { reasoning } => {
            ClassifiedAction::EmitText(format!("{REASONING_HEADER}\n{}", blockquote(reasoning)))
        }
        AgentEvent::SystemAlert { message } if !message.trim().is_empty() => {
            ClassifiedAction::EmitAlert(message.clone())
        }
        AgentEvent::ToolCallMessage { tool_call } => classify_tool_call(tool_call),
        AgentEvent::AssistantMessage { .. }
        | AgentEvent::SystemAlert { .. }
        | AgentEvent::Unknown { .. } => ClassifiedAction::Ignore,
    }
}

/// Prefixes every line, empty ones included, with `> `.
pub fn blockquote(text: &str) -> String {
    text.split('\n')
        .map(|line| format!("> {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

type ToolRenderer = fn(&Value) -> Option<String>;

const TOOL_RENDERERS: &[(&str, ToolRenderer)] = &[
    ("archival_memory_insert", render_archival_memory_insert),
    ("archival_memory_search", render_archival_memory_search),
    ("memory_insert", render_memory_insert),
    ("memory_replace", render_memory_replace),
];

fn classify_tool_call(tool_call: &ToolCallDescriptor) -> ClassifiedAction {
    let name = tool_call.name.as_str();
    let raw = tool_call.arguments.trim();
    let rendered = if raw.is_empty() {
        format!("{TOOL_SUMMARY_PREFIX} {name}")
    } else {
        match serde_json::from_str::<Value>(raw) {
            Ok(arguments) => render_tool(name, &arguments).unwrap_or_else(|| {
                tracing::warn!(
                    tool = name,
                    "tool arguments did not match renderer; using raw summary"
                );
                render_raw(name, raw)
            }),
            Err(error) => {
                tracing::warn!(tool = name, error = %error, "tool arguments are not valid JSON");
                render_raw(name, raw)
            }
        }
    };
    ClassifiedAction::EmitToolSummary {
        name: name.to_string(),
        rendered,
    }
}

fn render_tool(name: &str, arguments: &Value) -> Option<String> {
    match TOOL_RENDERERS
        .iter()
        .find(|(tool, _)| *tool == name)
        .map(|(_, renderer)| renderer)
    {
        Some(renderer) => renderer(arguments),
        None => render_default(name, arguments),
    }
}

fn render_raw(name: &str, raw: &str) -> String {
    format!("{TOOL_SUMMARY_PREFIX} {name}\n```\n{raw}\n```")
}

fn render_default(name: &str, arguments: &Value) -> Option<String> {
    let pretty = serde_json::to_string_pretty(arguments).ok()?;
    Some(format!("{TOOL_SUMMARY_PREFIX} {name}\n```json\n{pretty}\n```"))
}

fn str_arg<'a>(arguments: &'a Value, key: &str) -> Option<&'a str> {
    arguments.get(key).and_then(Value::as_str)
}

fn render_archival_memory_insert(arguments: &Value) -> Option<String> {
    let content = str_arg(arguments, "content")?;
    Some(format!("**Remembered**\n{}", blockquote(content)))
}

fn render_archival_memory_search(arguments: &Value) -> Option<String> {
    let query = str_arg(arguments, "query")?;
    Some(format!("**Remembering** `{query}`"))
}

fn render_memory_insert(arguments: &Value) -> Option<String> {
    let label = str_arg(arguments, "label")?;
    let new_str = str_arg(arguments, "new_str")?;
    Some(format!(
        "**Inserting into `{label}`**\n\n{}",
        blockquote(new_str)
    ))
}

fn render_memory_replace(arguments: &Value) -> Option<String> {
    let label = str_arg(arguments, "label")?;
    let old_str = str_arg(arguments, "old_str")?;
    let new_str = str_arg(arguments, "new_str")?;
    Some(format!(
        "**Modifying memory block `{label}`**\n\n**New:**\n{}\n\n**Old:**\n{}",
        blockquote(new_str),
        blockquote(old_str)
    ))
}

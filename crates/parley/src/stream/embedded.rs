use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};

use crate::errors::{AgentError, AgentResult};
use crate::models::tool::{ToolCall, ToolInvocation};

lazy_static! {
    static ref FENCED_JSON: Regex = Regex::new(r"(?s)```json\s*(.*?)```").unwrap();
}

/// Tool calls recovered from free text, and the text left to display
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedCalls {
    pub text: String,
    pub invocations: Vec<ToolInvocation>,
}

/// Best-effort recovery of tool calls written into the reply text by models without a
/// native tool channel.
///
/// Fenced ```json blocks shaped `{"tool": .., "parameters": ..}` become invocations and are
/// removed from the text. Other blocks are matched by their top-level keys against
/// `known_tools` and left in place. When no block yields a call, a reply that is exactly one
/// `tool`/`parameters` object is recognised without altering the text. This is heuristic: any
/// JSON that happens to have one of these shapes is treated as a call.
pub fn extract_tool_calls(text: &str, known_tools: &[String]) -> EmbeddedCalls {
    let mut invocations = Vec::new();
    let mut stripped = Vec::new();

    for captures in FENCED_JSON.captures_iter(text) {
        let (Some(block), Some(body)) = (captures.get(0), captures.get(1)) else {
            continue;
        };

        let value: Value = match serde_json::from_str(body.as_str().trim()) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(error = %e, "skipping malformed json block");
                continue;
            }
        };
        let Some(object) = value.as_object() else {
            continue;
        };

        let id = format!("embedded_{}", invocations.len());
        if let Some(tool_call) = tool_and_parameters(object) {
            invocations.push(ToolInvocation::new(id, tool_call));
            stripped.push(block.range());
        } else if let Some((name, parameters)) = object.iter().find(|(key, value)| {
            value.is_object() && known_tools.iter().any(|tool| tool == *key)
        }) {
            invocations.push(ToolInvocation::new(
                id,
                Ok(ToolCall::new(name.clone(), parameters.clone())),
            ));
        }
    }

    if !invocations.is_empty() {
        return EmbeddedCalls {
            text: strip_ranges(text, &stripped),
            invocations,
        };
    }

    let trimmed = text.trim();
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(trimmed) {
            if let Some(tool_call) = tool_and_parameters(&object) {
                invocations.push(ToolInvocation::new("embedded_0", tool_call));
            }
        }
    }

    EmbeddedCalls {
        text: text.to_string(),
        invocations,
    }
}

/// Read a `{"tool": name, "parameters": {..}}` object. Parameters that are not an object
/// make the call invalid rather than ignored.
fn tool_and_parameters(object: &Map<String, Value>) -> Option<AgentResult<ToolCall>> {
    let name = object.get("tool")?.as_str()?;
    let parameters = object.get("parameters")?;

    Some(match parameters {
        Value::Object(_) => Ok(ToolCall::new(name, parameters.clone())),
        other => Err(AgentError::InvalidParameters(format!(
            "parameters for {} must be an object, got {}",
            name, other
        ))),
    })
}

fn strip_ranges(text: &str, ranges: &[std::ops::Range<usize>]) -> String {
    let mut output = String::with_capacity(text.len());
    let mut cursor = 0;
    for range in ranges {
        output.push_str(&text[cursor..range.start]);
        cursor = range.end;
    }
    output.push_str(&text[cursor..]);
    output.trim().to_string()
}

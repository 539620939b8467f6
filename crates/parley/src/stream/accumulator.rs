use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use super::embedded::extract_tool_calls;
use crate::errors::AgentError;
use crate::models::tool::{ToolCall, ToolInvocation};
use crate::providers::base::{StreamChunk, ToolCallDelta};

#[derive(Debug, Clone, Default, PartialEq)]
struct ToolCallFragment {
    id: String,
    name: String,
    args: String,
}

/// Text, tool calls and citations of one generation, once the stream has ended
#[derive(Debug, Clone, PartialEq)]
pub struct Accumulated {
    pub text: String,
    pub tool_invocations: Vec<ToolInvocation>,
    pub citations: Option<Value>,
    pub token_count: usize,
}

/// Owned state of a single streaming call. Chunks are folded in with `push` and the result is
/// taken once with `finish`.
#[derive(Debug)]
pub struct StreamAccumulator {
    text: String,
    fragments: BTreeMap<u32, ToolCallFragment>,
    tool_calls: Vec<ToolInvocation>,
    citations: Option<Value>,
    token_count: usize,
    started: Instant,
    last_sample: Instant,
    rate_window: Duration,
}

impl StreamAccumulator {
    pub fn new(rate_window: Duration) -> Self {
        let now = Instant::now();
        Self {
            text: String::new(),
            fragments: BTreeMap::new(),
            tool_calls: Vec::new(),
            citations: None,
            token_count: 0,
            started: now,
            last_sample: now,
            rate_window,
        }
    }

    /// The text received so far
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn token_count(&self) -> usize {
        self.token_count
    }

    pub fn push(&mut self, chunk: StreamChunk) {
        let text = flatten_content(&chunk.content);
        self.token_count += estimate_tokens(&text);
        self.text.push_str(&text);

        if chunk.citations.is_some() {
            self.citations = chunk.citations;
        }

        for delta in chunk.tool_call_chunks {
            self.merge_delta(delta);
        }

        for invocation in chunk.tool_calls {
            let repeated = !invocation.id.is_empty()
                && self.tool_calls.iter().any(|known| known.id == invocation.id);
            if !repeated {
                self.tool_calls.push(invocation);
            }
        }
    }

    fn merge_delta(&mut self, delta: ToolCallDelta) {
        let fragment = self.fragments.entry(delta.index).or_default();
        if let Some(id) = delta.id.filter(|id| !id.is_empty()) {
            fragment.id = id;
        }
        if let Some(name) = delta.name.filter(|name| !name.is_empty()) {
            fragment.name = name;
        }
        if let Some(args) = delta.args {
            fragment.args.push_str(&args);
        }
    }

    /// Tokens per second since the stream opened, at most once per rate window
    pub fn sample_rate(&mut self) -> Option<f64> {
        let now = Instant::now();
        if now.duration_since(self.last_sample) < self.rate_window {
            return None;
        }
        self.last_sample = now;

        let elapsed = now.duration_since(self.started).as_secs_f64();
        (elapsed > 0.0).then(|| self.token_count as f64 / elapsed)
    }

    /// Resolve the tool calls of the generation.
    ///
    /// Complete calls from the provider win. Otherwise every fragment with a name and
    /// arguments becomes an invocation. Failing both, calls written into the text are
    /// recovered using `known_tools` as the allow-list.
    pub fn finish(self, known_tools: &[String]) -> Accumulated {
        let mut text = self.text;
        let tool_invocations = if !self.tool_calls.is_empty() {
            self.tool_calls
        } else {
            let assembled: Vec<ToolInvocation> = self
                .fragments
                .into_iter()
                .filter(|(_, fragment)| !fragment.name.is_empty() && !fragment.args.is_empty())
                .map(|(index, fragment)| assemble(index, fragment))
                .collect();

            if assembled.is_empty() {
                let embedded = extract_tool_calls(&text, known_tools);
                text = embedded.text;
                embedded.invocations
            } else {
                assembled
            }
        };

        Accumulated {
            text,
            tool_invocations,
            citations: self.citations,
            token_count: self.token_count,
        }
    }
}

fn assemble(index: u32, fragment: ToolCallFragment) -> ToolInvocation {
    let id = if fragment.id.is_empty() {
        format!("call_{}", index)
    } else {
        fragment.id
    };

    let tool_call = match serde_json::from_str::<Value>(&fragment.args) {
        Ok(parameters @ Value::Object(_)) => Ok(ToolCall::new(&fragment.name, parameters)),
        Ok(other) => Err(AgentError::InvalidParameters(format!(
            "arguments for {} must be an object, got {}",
            fragment.name, other
        ))),
        Err(e) => Err(AgentError::InvalidParameters(format!(
            "could not parse arguments for {}: {}",
            fragment.name, e
        ))),
    };

    ToolInvocation::new(id, tool_call)
}

/// Rough token estimate for a piece of streamed text. Every chunk counts for at least one.
pub fn estimate_tokens(text: &str) -> usize {
    (text.chars().count() / 4).max(1)
}

/// Normalize chunk content to a flat string. Strings pass through; arrays and objects
/// contribute the `text` field of each block; anything else is empty.
pub fn flatten_content(content: &Value) -> String {
    match content {
        Value::String(text) => text.clone(),
        Value::Array(blocks) => blocks
            .iter()
            .filter_map(|block| block.get("text").and_then(Value::as_str))
            .collect(),
        Value::Object(block) => block
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    }
}

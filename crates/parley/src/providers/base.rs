use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::adapter::AdaptedTurn;
use crate::models::tool::{Tool, ToolInvocation};

/// A streamed piece of a tool call. Pieces sharing an `index` belong to the same call and
/// their `args` strings are concatenated in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    pub index: u32,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub args: Option<String>,
}

impl ToolCallDelta {
    pub fn new(index: u32) -> Self {
        Self {
            index,
            ..Default::default()
        }
    }

    pub fn with_id<S: Into<String>>(mut self, id: S) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_args<S: Into<String>>(mut self, args: S) -> Self {
        self.args = Some(args.into());
        self
    }
}

/// One chunk of a streaming generation.
///
/// `content` is whatever the provider SDK emits: a string, an array of blocks or a single
/// block object. Complete tool calls and streamed deltas arrive on separate channels.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamChunk {
    pub content: Value,
    pub tool_call_chunks: Vec<ToolCallDelta>,
    pub tool_calls: Vec<ToolInvocation>,
    pub citations: Option<Value>,
}

impl StreamChunk {
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self {
            content: Value::String(text.into()),
            ..Default::default()
        }
    }

    pub fn with_content(content: Value) -> Self {
        Self {
            content,
            ..Default::default()
        }
    }

    pub fn with_tool_call_chunk(mut self, delta: ToolCallDelta) -> Self {
        self.tool_call_chunks.push(delta);
        self
    }

    pub fn with_tool_call(mut self, invocation: ToolInvocation) -> Self {
        self.tool_calls.push(invocation);
        self
    }

    pub fn with_citations(mut self, citations: Value) -> Self {
        self.citations = Some(citations);
        self
    }
}

/// A complete, non-streamed response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelResponse {
    pub content: Value,
    pub tool_calls: Vec<ToolInvocation>,
    pub citations: Option<Value>,
}

impl From<ModelResponse> for StreamChunk {
    fn from(response: ModelResponse) -> Self {
        StreamChunk {
            content: response.content,
            tool_call_chunks: Vec::new(),
            tool_calls: response.tool_calls,
            citations: response.citations,
        }
    }
}

/// The provider's stream of chunks. `None` marks the end of the generation.
pub type ChunkStream = BoxStream<'static, Result<StreamChunk>>;

/// Handle to a configured model (OpenAI-compatible, Anthropic, etc). The wire protocol
/// behind it belongs to the provider SDK.
#[async_trait]
pub trait ModelHandle: Send + Sync {
    /// Open a streaming generation over the adapted turns
    async fn stream(&self, turns: &[AdaptedTurn]) -> Result<ChunkStream>;

    /// Generate a single complete response
    async fn invoke(&self, turns: &[AdaptedTurn]) -> Result<ModelResponse>;

    /// A handle configured to request tool calls natively
    fn bind_tools(&self, tools: &[Tool]) -> Result<Arc<dyn ModelHandle>>;

    fn supports_streaming(&self) -> bool {
        true
    }
}

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::AgentResult;

/// A tool that can be used by a model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tool {
    /// The name of the tool
    pub name: String,
    /// A description of what the tool does
    pub description: String,
    /// JSON schema of the parameters that the tool accepts
    pub parameters: Value,
}

impl Tool {
    /// Create a new tool with the given name and description
    pub fn new<N, D>(name: N, description: D, parameters: Value) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        Tool {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// A tool call request that the executor can run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// The name of the tool to execute
    pub name: String,
    /// The parameters for the execution, always structured data
    pub parameters: Value,
}

impl ToolCall {
    pub fn new<S: Into<String>>(name: S, parameters: Value) -> Self {
        Self {
            name: name.into(),
            parameters,
        }
    }
}

/// A tool invocation requested by the model. A call whose arguments did not parse is kept
/// as an error so it can be reported back to the model instead of failing the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub id: String,
    pub tool_call: AgentResult<ToolCall>,
}

impl ToolInvocation {
    pub fn new<S: Into<String>>(id: S, tool_call: AgentResult<ToolCall>) -> Self {
        Self {
            id: id.into(),
            tool_call,
        }
    }

    /// The tool name, if the invocation parsed
    pub fn name(&self) -> Option<&str> {
        self.tool_call.as_ref().ok().map(|call| call.name.as_str())
    }
}

/// The display form of one executed invocation, persisted on the assistant turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolOutcome {
    pub id: String,
    pub name: String,
    pub output: String,
    pub is_error: bool,
}

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::errors::{AgentError, AgentResult};
use crate::models::tool::{Tool, ToolInvocation, ToolOutcome};

const RESULTS_HEADER: &str = "Tool execution results:";
const RESULTS_INSTRUCTION: &str =
    "Please use these results to respond to the user's last message.";

/// Runs tools on behalf of the model
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Tools that can be bound to a model
    fn tools(&self) -> Vec<Tool>;

    async fn execute(&self, name: &str, parameters: Value) -> AgentResult<Value>;
}

/// An executor with no tools, for agents that only chat
pub struct NoTools;

#[async_trait]
impl ToolExecutor for NoTools {
    fn tools(&self) -> Vec<Tool> {
        Vec::new()
    }

    async fn execute(&self, name: &str, _parameters: Value) -> AgentResult<Value> {
        Err(AgentError::ToolNotFound(name.to_string()))
    }
}

/// Execute invocations one at a time, in order. Stops early if `cancel` fires between
/// invocations. Failures become error outcomes rather than aborting the batch.
pub async fn execute_all(
    executor: &dyn ToolExecutor,
    invocations: &[ToolInvocation],
    cancel: &CancellationToken,
) -> Vec<ToolOutcome> {
    let mut outcomes = Vec::with_capacity(invocations.len());

    for invocation in invocations {
        if cancel.is_cancelled() {
            tracing::info!(
                remaining = invocations.len() - outcomes.len(),
                "tool execution cancelled"
            );
            break;
        }

        let outcome = match &invocation.tool_call {
            Ok(call) => {
                tracing::debug!(tool = %call.name, id = %invocation.id, "executing tool");
                match executor.execute(&call.name, call.parameters.clone()).await {
                    Ok(result) => ToolOutcome {
                        id: invocation.id.clone(),
                        name: call.name.clone(),
                        output: display_result(&result),
                        is_error: false,
                    },
                    Err(e) => {
                        tracing::warn!(tool = %call.name, error = %e, "tool execution failed");
                        error_outcome(invocation, &call.name, &e.to_string())
                    }
                }
            }
            Err(e) => error_outcome(invocation, "unknown", &e.to_string()),
        };
        outcomes.push(outcome);
    }

    outcomes
}

fn error_outcome(invocation: &ToolInvocation, name: &str, error: &str) -> ToolOutcome {
    ToolOutcome {
        id: invocation.id.clone(),
        name: name.to_string(),
        output: format!("Error: {}", error),
        is_error: true,
    }
}

/// Render a tool result for the model: an explicit `content` or `text` string, then an
/// `error` field, then `key: value` pairs, else the JSON itself
pub fn display_result(result: &Value) -> String {
    let object = match result {
        Value::String(text) => return text.clone(),
        Value::Object(object) if !object.is_empty() => object,
        other => return other.to_string(),
    };

    for key in ["content", "text"] {
        if let Some(text) = object.get(key).and_then(Value::as_str) {
            return text.to_string();
        }
    }

    if let Some(error) = object.get("error") {
        return format!("Error: {}", scalar(error));
    }

    object
        .iter()
        .map(|(key, value)| format!("{}: {}", key, scalar(value)))
        .collect::<Vec<_>>()
        .join(", ")
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// The text of the synthetic user turn that hands tool results back to the model
pub fn follow_up_text(outcomes: &[ToolOutcome]) -> String {
    let lines = outcomes
        .iter()
        .map(|outcome| format!("[{}] {}", outcome.name, outcome.output))
        .collect::<Vec<_>>()
        .join("\n");

    format!("{}\n{}\n\n{}", RESULTS_HEADER, lines, RESULTS_INSTRUCTION)
}

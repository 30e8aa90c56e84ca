//! Narrow contract for the external agent runtime.
//!
//! The runtime owns language understanding and tool selection. This crate
//! only hands it an [`AgentDefinition`], the conversation so far and the
//! request's [`RunContext`], which the runtime must thread into every
//! [`ToolRegistry::invoke`] call.

use std::sync::Arc;

use async_trait::async_trait;
use copilot_core::errors::AgentError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::RunContext;
use crate::tools::ToolRegistry;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Developer,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// The string content, or the first `text`/`output_text` part; trimmed, `None` when blank.
    pub fn text(&self) -> Option<&str> {
        let raw = match self {
            Self::Text(text) => Some(text.as_str()),
            Self::Parts(parts) => parts
                .iter()
                .find(|part| part.kind == "output_text" || part.kind == "text")
                .and_then(|part| part.text.as_deref()),
        };
        raw.map(str::trim).filter(|text| !text.is_empty())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationItem {
    Message {
        role: MessageRole,
        content: MessageContent,
    },
    FunctionCall {
        call_id: String,
        name: String,
        arguments: String,
    },
    FunctionCallOutput {
        call_id: String,
        output: String,
    },
    /// Item kinds this crate does not replay (reasoning, web search, ...).
    #[serde(other)]
    Unsupported,
}

impl ConversationItem {
    pub fn user(prompt: &str) -> Self {
        Self::Message { role: MessageRole::User, content: MessageContent::Text(prompt.to_string()) }
    }

    pub fn assistant(text: &str) -> Self {
        Self::Message {
            role: MessageRole::Assistant,
            content: MessageContent::Text(text.to_string()),
        }
    }

    pub fn assistant_text(&self) -> Option<&str> {
        match self {
            Self::Message { role: MessageRole::Assistant, content } => content.text(),
            _ => None,
        }
    }
}

/// True when every tool output answers a tool call that precedes it.
pub fn is_well_formed(history: &[ConversationItem]) -> bool {
    let mut open_calls = Vec::new();
    for item in history {
        match item {
            ConversationItem::FunctionCall { call_id, .. } => open_calls.push(call_id.as_str()),
            ConversationItem::FunctionCallOutput { call_id, .. } => {
                if !open_calls.contains(&call_id.as_str()) {
                    return false;
                }
            }
            ConversationItem::Message { .. } => {}
            ConversationItem::Unsupported => return false,
        }
    }
    true
}

#[derive(Clone)]
pub struct AgentDefinition {
    pub name: String,
    pub model: String,
    pub instructions: String,
    pub tools: Arc<ToolRegistry>,
}

pub struct RunOptions<'a> {
    pub context: &'a mut RunContext,
    pub previous_response_id: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunOutcome {
    pub final_output: Option<String>,
    /// Input items followed by every item produced during the run.
    pub history: Vec<ConversationItem>,
    pub last_response_id: Option<String>,
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("tool `{tool}` failed: {source}")]
    Tool {
        tool: String,
        #[source]
        source: AgentError,
    },
    #[error("agent runtime transport failed: {0}")]
    Transport(String),
    #[error("agent runtime returned an unexpected payload: {0}")]
    Protocol(String),
    #[error("agent runtime exceeded {0} tool round trips")]
    TurnLimit(u32),
    #[error("agent runtime is not configured: {0}")]
    Configuration(String),
}

#[async_trait]
pub trait AgentRuntime: Send + Sync {
    async fn run(
        &self,
        agent: &AgentDefinition,
        input: Vec<ConversationItem>,
        options: RunOptions<'_>,
    ) -> Result<RunOutcome, RuntimeError>;
}

#[cfg(test)]
mod tests {
    use copilot_core::errors::{access_failure, AgentError};
    use serde_json::json;

    use super::{is_well_formed, ConversationItem, MessageContent, RuntimeError};

    #[test]
    fn items_use_the_responses_wire_shape() {
        let call = ConversationItem::FunctionCall {
            call_id: "call_1".to_string(),
            name: "view_assets".to_string(),
            arguments: "{}".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&call).expect("serialize"),
            json!({"type": "function_call", "call_id": "call_1", "name": "view_assets", "arguments": "{}"})
        );
        assert_eq!(
            serde_json::to_value(ConversationItem::user("hi")).expect("serialize"),
            json!({"type": "message", "role": "user", "content": "hi"})
        );
    }

    #[test]
    fn assistant_parts_and_unknown_items_deserialize() {
        let item: ConversationItem = serde_json::from_value(json!({
            "type": "message",
            "id": "msg_1",
            "role": "assistant",
            "status": "completed",
            "content": [{"type": "output_text", "text": " Hello Ava ", "annotations": []}]
        }))
        .expect("message");
        assert_eq!(item.assistant_text(), Some("Hello Ava"));

        let reasoning: ConversationItem =
            serde_json::from_value(json!({"type": "reasoning", "summary": []})).expect("other");
        assert_eq!(reasoning, ConversationItem::Unsupported);

        assert_eq!(MessageContent::Text("   ".to_string()).text(), None);
    }

    #[test]
    fn orphaned_tool_outputs_are_not_well_formed() {
        let output = ConversationItem::FunctionCallOutput {
            call_id: "call_9".to_string(),
            output: "{}".to_string(),
        };
        assert!(!is_well_formed(&[ConversationItem::user("hi"), output.clone()]));
        assert!(is_well_formed(&[
            ConversationItem::user("hi"),
            ConversationItem::FunctionCall {
                call_id: "call_9".to_string(),
                name: "view_assets".to_string(),
                arguments: "{}".to_string(),
            },
            output,
            ConversationItem::assistant("done"),
        ]));
    }

    #[test]
    fn tool_failures_expose_access_errors_through_the_source_chain() {
        let error = RuntimeError::Tool {
            tool: "view_work_orders".to_string(),
            source: AgentError::rbac("User is not authorised to use tool view_work_orders"),
        };
        assert!(matches!(access_failure(&error), Some(AgentError::Rbac(_))));
        assert!(access_failure(&RuntimeError::TurnLimit(8)).is_none());
    }
}

//! Request-scoped state threaded through every tool call of one orchestration.
//! Nothing here is persisted; only the conversation history survives a turn.

use std::collections::HashMap;
use std::fmt;

use copilot_core::domain::asset::AssetSummary;
use copilot_core::domain::draft::DraftAction;
use copilot_core::domain::work_order::WorkOrderSummary;
use copilot_core::identity::UserContext;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Success,
    Error,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolLogEntry {
    pub tool_name: String,
    pub arguments: Value,
    pub result_count: usize,
    pub status: ToolStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub session_id: String,
}

/// Latest normalized output per tool, readable by later tools in the same turn.
#[derive(Clone, Debug, Default)]
pub struct ToolResults {
    pub work_orders: Option<Vec<WorkOrderSummary>>,
    pub assets: Option<Vec<AssetSummary>>,
    pub work_order_details: HashMap<String, Value>,
    pub created_work_order: Option<Value>,
    pub updated_work_order: Option<Value>,
}

pub struct RunContext {
    authorization_header: Option<SecretString>,
    pub user_context: Option<UserContext>,
    pub session_id: String,
    pub tool_logs: Vec<ToolLogEntry>,
    pub tool_results: ToolResults,
    pub drafts: Vec<DraftAction>,
    pub insights: Vec<String>,
}

impl RunContext {
    pub fn new(
        session_id: impl Into<String>,
        authorization_header: Option<String>,
        user_context: Option<UserContext>,
    ) -> Self {
        Self {
            authorization_header: authorization_header.map(SecretString::from),
            user_context,
            session_id: session_id.into(),
            tool_logs: Vec::new(),
            tool_results: ToolResults::default(),
            drafts: Vec::new(),
            insights: Vec::new(),
        }
    }

    pub fn authorization_header(&self) -> Option<&str> {
        self.authorization_header.as_ref().map(|header| header.expose_secret())
    }

    pub fn user(&self) -> Option<&UserContext> {
        self.user_context.as_ref()
    }

    pub(crate) fn record(
        &mut self,
        tool_name: &str,
        arguments: Value,
        result_count: usize,
        error: Option<String>,
    ) {
        let status = if error.is_some() { ToolStatus::Error } else { ToolStatus::Success };
        self.tool_logs.push(ToolLogEntry {
            tool_name: tool_name.to_string(),
            arguments,
            result_count,
            status,
            error,
            session_id: self.session_id.clone(),
        });
    }
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("session_id", &self.session_id)
            .field("has_authorization", &self.authorization_header.is_some())
            .field("user_context", &self.user_context)
            .field("tool_logs", &self.tool_logs.len())
            .field("drafts", &self.drafts.len())
            .finish()
    }
}

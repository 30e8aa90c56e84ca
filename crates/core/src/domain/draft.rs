//! Staged actions proposed by the agent. Drafts are never applied here; the
//! backend confirms or declines them later.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::work_order::WorkOrderSummary;
use crate::identity::UserContext;
use crate::text::{headline, scalar_text, sentence};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftOperation {
    CreateWorkOrder,
    CompleteWorkOrder,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftAction {
    pub agent_session_id: String,
    pub operation_type: DraftOperation,
    pub payload: Value,
    pub summary: String,
}

/// Normalized fields of a work-order creation draft. Priority is always `LOW`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreationDraftData {
    pub title: String,
    pub priority: String,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NormalizedCreation {
    pub data: CreationDraftData,
    pub summary_override: Option<String>,
}

/// Returns `None` when the title is blank after trimming.
pub fn normalize_creation_input(
    title: &str,
    description: Option<&str>,
    summary: Option<&str>,
) -> Option<NormalizedCreation> {
    let title = headline(title)?;
    let description = description
        .and_then(sentence)
        .unwrap_or_else(|| format!("{title} (details pending update)."));

    Some(NormalizedCreation {
        data: CreationDraftData { title, priority: "LOW".to_string(), description },
        summary_override: summary.and_then(headline),
    })
}

pub fn creation_draft(session_id: &str, creation: NormalizedCreation) -> DraftAction {
    let summary = creation
        .summary_override
        .unwrap_or_else(|| format!("Create work order: {}", creation.data.title));
    DraftAction {
        agent_session_id: session_id.to_string(),
        operation_type: DraftOperation::CreateWorkOrder,
        payload: json!({
            "title": creation.data.title,
            "priority": creation.data.priority,
            "description": creation.data.description,
        }),
        summary,
    }
}

pub fn completion_draft(
    session_id: &str,
    work_order: &WorkOrderSummary,
    user: &UserContext,
    summary: Option<&str>,
) -> DraftAction {
    let work_order_id = if work_order.id.is_null() {
        work_order.code.clone().map(Value::String).unwrap_or(Value::Null)
    } else {
        work_order.id.clone()
    };
    let reference = work_order
        .code
        .clone()
        .or_else(|| scalar_text(&work_order_id))
        .unwrap_or_else(|| "unknown".to_string());
    let summary = summary
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Complete work order {reference}"));

    DraftAction {
        agent_session_id: session_id.to_string(),
        operation_type: DraftOperation::CompleteWorkOrder,
        payload: json!({
            "workOrderId": work_order_id,
            "status": "COMPLETED",
            "completedBy": user.id,
            "completedByName": user.display_name,
        }),
        summary,
    }
}

/// Placeholder used when the order was not listed earlier in the turn.
pub fn stub_work_order(reference: &Value, title: Option<&str>) -> WorkOrderSummary {
    WorkOrderSummary {
        id: reference.clone(),
        code: scalar_text(reference),
        title: title
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or("Work order")
            .to_string(),
        priority: None,
        status: None,
        due_date: None,
        asset: None,
        custom_id: None,
    }
}

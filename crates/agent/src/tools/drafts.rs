//! Draft staging tools. Neither touches the backend; the staged
//! [`DraftAction`](copilot_core::domain::draft::DraftAction)s are returned to
//! the caller for confirmation.

use async_trait::async_trait;
use copilot_core::domain::draft::{
    completion_draft, creation_draft, normalize_creation_input, stub_work_order,
};
use copilot_core::errors::AgentError;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{authorize_tool, parameters_schema, parse_input, Reference, Tool, ToolDescriptor, ToolOutput};
use crate::context::RunContext;

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct CreationDraftInput {
    title: String,
    description: Option<String>,
    /// Optional one-line summary shown on the draft card.
    summary: Option<String>,
}

pub struct PrepareCreationDraft;

impl PrepareCreationDraft {
    pub const NAME: &'static str = "prepare_work_order_creation_draft";
}

#[async_trait]
impl Tool for PrepareCreationDraft {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: Self::NAME,
            description: "Stage a new work order for the user to confirm. Priority is always LOW \
                          until a supervisor reviews it.",
            parameters: parameters_schema::<CreationDraftInput>(),
        }
    }

    async fn execute(
        &self,
        input: Value,
        context: &mut RunContext,
    ) -> Result<ToolOutput, AgentError> {
        let input: CreationDraftInput = parse_input(Self::NAME, input)?;
        authorize_tool(context, Self::NAME)?;
        let normalized = normalize_creation_input(
            &input.title,
            input.description.as_deref(),
            input.summary.as_deref(),
        )
        .ok_or_else(|| AgentError::tool_input(Self::NAME, "title is required"))?;

        let arguments = serde_json::to_value(&normalized.data).unwrap_or_default();
        let draft = creation_draft(&context.session_id, normalized);
        let output = json!({ "status": "draft_created", "draft": draft });
        context.drafts.push(draft);

        Ok(ToolOutput { arguments, result_count: 1, output })
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct CompletionDraftInput {
    /// Work order id, code or custom id.
    work_order_id: Reference,
    summary: Option<String>,
}

pub struct PrepareCompletionDraft;

impl PrepareCompletionDraft {
    pub const NAME: &'static str = "prepare_work_order_completion_draft";
}

#[async_trait]
impl Tool for PrepareCompletionDraft {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: Self::NAME,
            description: "Create a completion draft for a work order after confirming the correct \
                          record. Provide the work order id or code.",
            parameters: parameters_schema::<CompletionDraftInput>(),
        }
    }

    async fn execute(
        &self,
        input: Value,
        context: &mut RunContext,
    ) -> Result<ToolOutput, AgentError> {
        let input: CompletionDraftInput = parse_input(Self::NAME, input)?;
        let (user, _) = authorize_tool(context, Self::NAME)?;
        let reference = input.work_order_id.as_text();
        if reference.is_empty() {
            return Err(AgentError::tool_input(Self::NAME, "workOrderId is required"));
        }

        let listed = context
            .tool_results
            .work_orders
            .as_deref()
            .unwrap_or_default()
            .iter()
            .find(|order| order.matches_reference(&reference))
            .cloned();
        let target = listed.unwrap_or_else(|| {
            stub_work_order(&input.work_order_id.to_value(), input.summary.as_deref())
        });
        let draft =
            completion_draft(&context.session_id, &target, user, input.summary.as_deref());

        let arguments = json!({
            "workOrderId": input.work_order_id.to_value(),
            "summary": input.summary,
        });
        let output = json!({ "status": "draft_created", "draft": draft });
        context.drafts.push(draft);

        Ok(ToolOutput { arguments, result_count: 1, output })
    }
}

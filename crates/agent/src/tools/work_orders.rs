use std::sync::Arc;

use async_trait::async_trait;
use copilot_core::domain::work_order::{
    normalize_work_orders, summarize_work_orders, WorkOrderSummary, DEFAULT_OPEN_STATUSES,
};
use copilot_core::errors::AgentError;
use copilot_core::text::{scalar_text, string_field};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{
    authorize_tool, parameters_schema, parse_input, path_identifier, resolve_limit, trimmed,
    Reference, Tool, ToolDescriptor, ToolOutput,
};
use crate::backend::Backend;
use crate::context::RunContext;

pub const SEARCH_PATH: &str = "/api/agent/tools/work-orders/search";
pub const CREATE_PATH: &str = "/api/agent/tools/work-orders/create";

const SORT_FIELDS: [&str; 5] = ["dueDate", "priority", "status", "createdAt", "updatedAt"];

fn details_path(id: &str) -> String {
    format!("/api/agent/tools/work-orders/{id}/details")
}

fn update_path(id: &str) -> String {
    format!("/api/agent/tools/work-orders/{id}/update")
}

#[derive(Clone, Debug, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        let values = match self {
            Self::One(value) => vec![value],
            Self::Many(values) => values,
        };
        values.into_iter().filter_map(|value| trimmed(Some(value))).collect()
    }
}

/// Numeric filter accepted as a JSON number or a numeric string.
#[derive(Clone, Debug, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum NumericFilter {
    Number(f64),
    Text(String),
}

impl NumericFilter {
    /// Non-finite, non-integral or unparsable values are dropped.
    fn coerce(&self) -> Option<i64> {
        let numeric = match self {
            Self::Number(number) => *number,
            Self::Text(raw) => raw.trim().parse::<f64>().ok()?,
        };
        (numeric.is_finite() && numeric.fract() == 0.0 && numeric.abs() < i64::MAX as f64)
            .then_some(numeric as i64)
    }
}

fn coerce_filter(filter: Option<NumericFilter>) -> Option<i64> {
    filter.as_ref().and_then(NumericFilter::coerce)
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct ViewWorkOrdersInput {
    /// Maximum number of work orders to return.
    limit: Option<i64>,
    /// Status or list of statuses; defaults to open work.
    statuses: Option<OneOrMany>,
    /// Free-text search over title, description and code.
    search: Option<String>,
    due_date_before: Option<String>,
    due_date_after: Option<String>,
    created_at_before: Option<String>,
    created_at_after: Option<String>,
    updated_at_before: Option<String>,
    updated_at_after: Option<String>,
    assigned_to_user_id: Option<NumericFilter>,
    primary_user_id: Option<NumericFilter>,
    team_id: Option<NumericFilter>,
    asset_id: Option<NumericFilter>,
    location_id: Option<NumericFilter>,
    category_id: Option<NumericFilter>,
    priorities: Option<OneOrMany>,
    /// One of dueDate, priority, status, createdAt, updatedAt.
    sort_by: Option<String>,
    /// ASC or DESC.
    sort_direction: Option<String>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct WorkOrderSearchCriteria {
    limit: usize,
    statuses: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    due_date_before: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    due_date_after: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_at_before: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_at_after: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_at_before: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_at_after: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    assigned_to_user_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    primary_user_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    team_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    asset_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    location_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    category_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    priorities: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sort_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sort_direction: Option<String>,
}

impl WorkOrderSearchCriteria {
    fn from_input(input: ViewWorkOrdersInput, limit: usize) -> Self {
        let statuses = input.statuses.map(OneOrMany::into_vec).unwrap_or_default();
        let statuses = if statuses.is_empty() {
            DEFAULT_OPEN_STATUSES.iter().map(|status| status.to_string()).collect()
        } else {
            statuses
        };
        let priorities = input
            .priorities
            .map(OneOrMany::into_vec)
            .map(|values| values.into_iter().map(|value| value.to_uppercase()).collect::<Vec<_>>())
            .filter(|values| !values.is_empty());
        let sort_by =
            trimmed(input.sort_by).filter(|field| SORT_FIELDS.contains(&field.as_str()));
        let sort_direction = trimmed(input.sort_direction)
            .map(|direction| direction.to_uppercase())
            .filter(|direction| direction == "ASC" || direction == "DESC");

        Self {
            limit,
            statuses,
            search: trimmed(input.search),
            due_date_before: trimmed(input.due_date_before),
            due_date_after: trimmed(input.due_date_after),
            created_at_before: trimmed(input.created_at_before),
            created_at_after: trimmed(input.created_at_after),
            updated_at_before: trimmed(input.updated_at_before),
            updated_at_after: trimmed(input.updated_at_after),
            assigned_to_user_id: coerce_filter(input.assigned_to_user_id),
            primary_user_id: coerce_filter(input.primary_user_id),
            team_id: coerce_filter(input.team_id),
            asset_id: coerce_filter(input.asset_id),
            location_id: coerce_filter(input.location_id),
            category_id: coerce_filter(input.category_id),
            priorities,
            sort_by,
            sort_direction,
        }
    }
}

pub struct ViewWorkOrders {
    backend: Arc<dyn Backend>,
    max_results: usize,
}

impl ViewWorkOrders {
    pub const NAME: &'static str = "view_work_orders";

    pub fn new(backend: Arc<dyn Backend>, max_results: usize) -> Self {
        Self { backend, max_results }
    }
}

#[async_trait]
impl Tool for ViewWorkOrders {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: Self::NAME,
            description: "Retrieve work orders for the current tenant. Provide an optional search \
                          term, statuses, dates, assignees or priorities to filter results.",
            parameters: parameters_schema::<ViewWorkOrdersInput>(),
        }
    }

    async fn execute(
        &self,
        input: Value,
        context: &mut RunContext,
    ) -> Result<ToolOutput, AgentError> {
        let input: ViewWorkOrdersInput = parse_input(Self::NAME, input)?;
        authorize_tool(context, Self::NAME)?;
        let limit = resolve_limit(Self::NAME, input.limit, self.max_results)?;
        let criteria = WorkOrderSearchCriteria::from_input(input, limit);
        let arguments = serde_json::to_value(&criteria).unwrap_or_default();

        let response = self
            .backend
            .post_tool_request(SEARCH_PATH, context.authorization_header(), &arguments)
            .await?;
        let work_orders = normalize_work_orders(&response, limit);

        if !work_orders.is_empty() {
            context.insights.push(summarize_work_orders(&work_orders));
        }
        let output = json!({
            "type": "work_orders",
            "total": work_orders.len(),
            "items": work_orders,
        });
        let result_count = work_orders.len();
        context.tool_results.work_orders = Some(work_orders);

        Ok(ToolOutput { arguments, result_count, output })
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct WorkOrderReferenceInput {
    /// Work order id or code.
    work_order_id: Reference,
}

pub struct ViewWorkOrderDetails {
    backend: Arc<dyn Backend>,
}

impl ViewWorkOrderDetails {
    pub const NAME: &'static str = "view_work_order_details";

    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for ViewWorkOrderDetails {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: Self::NAME,
            description: "Fetch full details (tasks, labor, history, assignees) for one work order.",
            parameters: parameters_schema::<WorkOrderReferenceInput>(),
        }
    }

    async fn execute(
        &self,
        input: Value,
        context: &mut RunContext,
    ) -> Result<ToolOutput, AgentError> {
        let input: WorkOrderReferenceInput = parse_input(Self::NAME, input)?;
        authorize_tool(context, Self::NAME)?;
        let id = path_identifier(Self::NAME, &input.work_order_id)?;
        let arguments = json!({ "workOrderId": input.work_order_id.to_value() });

        let cached = context.tool_results.work_order_details.get(&id).cloned();
        let details = match cached {
            Some(cached) => cached,
            None => {
                let fetched = self
                    .backend
                    .post_tool_request(&details_path(&id), context.authorization_header(), &json!({}))
                    .await?;
                context.tool_results.work_order_details.insert(id, fetched.clone());
                fetched
            }
        };

        let result_count = usize::from(details.is_object());
        let output = json!({ "type": "work_order_details", "workOrder": details });
        Ok(ToolOutput { arguments, result_count, output })
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct CreateWorkOrderInput {
    title: String,
    description: Option<String>,
    /// NONE, LOW, MEDIUM or HIGH.
    priority: Option<String>,
    /// ISO-8601 date or date-time.
    due_date: Option<String>,
    estimated_start_date: Option<String>,
    estimated_duration_hours: Option<f64>,
    require_signature: Option<bool>,
    location_id: Option<i64>,
    asset_id: Option<i64>,
    team_id: Option<i64>,
    primary_user_id: Option<i64>,
    assigned_user_ids: Option<Vec<i64>>,
    category_id: Option<i64>,
    summary: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct UpdateWorkOrderInput {
    /// Work order id or code.
    work_order_id: Reference,
    title: Option<String>,
    description: Option<String>,
    priority: Option<String>,
    due_date: Option<String>,
    estimated_start_date: Option<String>,
    estimated_duration_hours: Option<f64>,
    require_signature: Option<bool>,
    location_id: Option<i64>,
    asset_id: Option<i64>,
    team_id: Option<i64>,
    primary_user_id: Option<i64>,
    assigned_user_ids: Option<Vec<i64>>,
    category_id: Option<i64>,
}

/// Sparse field set sent to the create and update endpoints.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct WorkOrderFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    priority: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    due_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    estimated_start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    estimated_duration_hours: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    require_signature: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    location_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    asset_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    team_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    primary_user_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    assigned_user_ids: Option<Vec<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    category_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<String>,
}

impl WorkOrderFields {
    fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.priority.is_none()
            && self.due_date.is_none()
            && self.estimated_start_date.is_none()
            && self.estimated_duration_hours.is_none()
            && self.require_signature.is_none()
            && self.location_id.is_none()
            && self.asset_id.is_none()
            && self.team_id.is_none()
            && self.primary_user_id.is_none()
            && self.assigned_user_ids.is_none()
            && self.category_id.is_none()
    }
}

impl From<CreateWorkOrderInput> for WorkOrderFields {
    fn from(input: CreateWorkOrderInput) -> Self {
        Self {
            title: trimmed(Some(input.title)),
            description: trimmed(input.description),
            priority: trimmed(input.priority).map(|priority| priority.to_uppercase()),
            due_date: trimmed(input.due_date),
            estimated_start_date: trimmed(input.estimated_start_date),
            estimated_duration_hours: input.estimated_duration_hours.filter(|hours| hours.is_finite()),
            require_signature: input.require_signature,
            location_id: input.location_id,
            asset_id: input.asset_id,
            team_id: input.team_id,
            primary_user_id: input.primary_user_id,
            assigned_user_ids: input.assigned_user_ids,
            category_id: input.category_id,
            summary: trimmed(input.summary),
        }
    }
}

impl From<UpdateWorkOrderInput> for WorkOrderFields {
    fn from(input: UpdateWorkOrderInput) -> Self {
        Self {
            title: trimmed(input.title),
            description: trimmed(input.description),
            priority: trimmed(input.priority).map(|priority| priority.to_uppercase()),
            due_date: trimmed(input.due_date),
            estimated_start_date: trimmed(input.estimated_start_date),
            estimated_duration_hours: input.estimated_duration_hours.filter(|hours| hours.is_finite()),
            require_signature: input.require_signature,
            location_id: input.location_id,
            asset_id: input.asset_id,
            team_id: input.team_id,
            primary_user_id: input.primary_user_id,
            assigned_user_ids: input.assigned_user_ids,
            category_id: input.category_id,
            summary: None,
        }
    }
}

/// `{success, workOrder, message, updatedFields?}` regardless of how sparse the backend reply is.
fn normalize_mutation(response: &Value, include_updated_fields: bool) -> Value {
    let work_order = response.get("workOrder").cloned().unwrap_or(Value::Null);
    let success = response.get("success").and_then(Value::as_bool).unwrap_or(!work_order.is_null());
    let mut normalized = json!({
        "success": success,
        "workOrder": work_order,
        "message": string_field(response, "message"),
    });
    if include_updated_fields {
        let updated_fields = response
            .get("updatedFields")
            .and_then(Value::as_array)
            .map(|fields| fields.iter().filter_map(scalar_text).collect::<Vec<_>>())
            .unwrap_or_default();
        normalized["updatedFields"] = json!(updated_fields);
    }
    normalized
}

fn mutation_insight(verb: &str, normalized: &Value) -> Option<String> {
    let work_order = WorkOrderSummary::from_backend(normalized.get("workOrder")?)?;
    Some(format!("{verb} work order {}: {}", work_order.display_code(), work_order.title))
}

pub struct CreateWorkOrder {
    backend: Arc<dyn Backend>,
}

impl CreateWorkOrder {
    pub const NAME: &'static str = "create_work_order_immediately";

    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for CreateWorkOrder {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: Self::NAME,
            description: "Create a work order right away. Only use this when the user explicitly \
                          asks for immediate creation; otherwise stage a creation draft.",
            parameters: parameters_schema::<CreateWorkOrderInput>(),
        }
    }

    async fn execute(
        &self,
        input: Value,
        context: &mut RunContext,
    ) -> Result<ToolOutput, AgentError> {
        let input: CreateWorkOrderInput = parse_input(Self::NAME, input)?;
        authorize_tool(context, Self::NAME)?;
        let fields = WorkOrderFields::from(input);
        if fields.title.is_none() {
            return Err(AgentError::tool_input(Self::NAME, "title is required"));
        }
        let arguments = serde_json::to_value(&fields).unwrap_or_default();

        let response = self
            .backend
            .post_tool_request(CREATE_PATH, context.authorization_header(), &arguments)
            .await?;
        let normalized = normalize_mutation(&response, false);

        if let Some(insight) = mutation_insight("Created", &normalized) {
            context.insights.push(insight);
        }
        let result_count = usize::from(normalized["workOrder"].is_object());
        context.tool_results.created_work_order = Some(normalized.clone());

        Ok(ToolOutput { arguments, result_count, output: normalized })
    }
}

pub struct UpdateWorkOrder {
    backend: Arc<dyn Backend>,
}

impl UpdateWorkOrder {
    pub const NAME: &'static str = "update_work_order";

    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for UpdateWorkOrder {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: Self::NAME,
            description: "Update fields of an existing work order. Only the supplied fields change.",
            parameters: parameters_schema::<UpdateWorkOrderInput>(),
        }
    }

    async fn execute(
        &self,
        input: Value,
        context: &mut RunContext,
    ) -> Result<ToolOutput, AgentError> {
        let input: UpdateWorkOrderInput = parse_input(Self::NAME, input)?;
        authorize_tool(context, Self::NAME)?;
        let id = path_identifier(Self::NAME, &input.work_order_id)?;
        let reference = input.work_order_id.to_value();
        let fields = WorkOrderFields::from(input);
        if fields.is_empty() {
            return Err(AgentError::tool_input(Self::NAME, "at least one field must be updated"));
        }
        let body = serde_json::to_value(&fields).unwrap_or_default();

        let response = self
            .backend
            .post_tool_request(&update_path(&id), context.authorization_header(), &body)
            .await?;
        let normalized = normalize_mutation(&response, true);

        if let Some(insight) = mutation_insight("Updated", &normalized) {
            context.insights.push(insight);
        }
        let result_count = usize::from(normalized["workOrder"].is_object());
        context.tool_results.updated_work_order = Some(normalized.clone());

        let mut arguments = body;
        arguments["workOrderId"] = reference;
        Ok(ToolOutput { arguments, result_count, output: normalized })
    }
}

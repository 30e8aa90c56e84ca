//! Tool registry exposed to the agent runtime.
//!
//! Every tool validates its arguments against a strict schema, re-runs the
//! access guard, and only then talks to the backend. The registry records one
//! [`ToolLogEntry`](crate::context::ToolLogEntry) per invocation, success or
//! failure, so a failed turn still shows which call broke.

pub mod assets;
pub mod drafts;
pub mod profile;
pub mod work_orders;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use copilot_core::errors::AgentError;
use copilot_core::identity::UserContext;
use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::backend::Backend;
use crate::context::RunContext;
use crate::guardrails::{ensure_role_access, require_tenant_id, Role};

pub const DEFAULT_RESULT_LIMIT: usize = 5;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ToolOutput {
    /// Normalized request as it was sent (or would have been sent) downstream.
    pub arguments: Value,
    pub result_count: usize,
    pub output: Value,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn descriptor(&self) -> ToolDescriptor;
    async fn execute(&self, input: Value, context: &mut RunContext)
        -> Result<ToolOutput, AgentError>;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    /// The full maintenance tool set.
    pub fn maintenance(backend: Arc<dyn Backend>, max_results: usize) -> Self {
        let mut registry = Self::default();
        registry.register(work_orders::ViewWorkOrders::new(backend.clone(), max_results));
        registry.register(assets::ViewAssets::new(backend.clone(), max_results));
        registry.register(work_orders::ViewWorkOrderDetails::new(backend.clone()));
        registry.register(profile::GetUserContext);
        registry.register(drafts::PrepareCreationDraft);
        registry.register(drafts::PrepareCompletionDraft);
        registry.register(work_orders::CreateWorkOrder::new(backend.clone()));
        registry.register(work_orders::UpdateWorkOrder::new(backend));
        registry
    }

    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.name().to_string(), Box::new(tool));
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Descriptors sorted by name so the advertised tool list is stable.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        let mut descriptors = self.tools.values().map(|tool| tool.descriptor()).collect::<Vec<_>>();
        descriptors.sort_by(|left, right| left.name.cmp(right.name));
        descriptors
    }

    pub async fn invoke(
        &self,
        name: &str,
        input: Value,
        context: &mut RunContext,
    ) -> Result<Value, AgentError> {
        let Some(tool) = self.tools.get(name) else {
            let error = AgentError::tool_input(name, "unknown tool");
            context.record(name, input, 0, Some(error.to_string()));
            return Err(error);
        };

        let raw_input = input.clone();
        match tool.execute(input, context).await {
            Ok(ToolOutput { arguments, result_count, output }) => {
                info!(
                    event_name = "agent.tool.succeeded",
                    session_id = %context.session_id,
                    tool_name = name,
                    result_count,
                    "tool call succeeded"
                );
                context.record(name, arguments, result_count, None);
                Ok(output)
            }
            Err(error) => {
                warn!(
                    event_name = "agent.tool.failed",
                    session_id = %context.session_id,
                    tool_name = name,
                    error_kind = error.kind(),
                    error = %error,
                    "tool call failed"
                );
                context.record(name, raw_input, 0, Some(error.to_string()));
                Err(error)
            }
        }
    }
}

/// Strict argument parsing: unknown fields and wrong types are tool input errors.
/// `null` is read as an empty object.
pub(crate) fn parse_input<T: DeserializeOwned>(tool: &str, input: Value) -> Result<T, AgentError> {
    let input = if input.is_null() { Value::Object(Default::default()) } else { input };
    serde_json::from_value(input)
        .map_err(|error| AgentError::tool_input(tool, format!("invalid arguments: {error}")))
}

/// Self-contained JSON Schema for a tool's argument type (no `$ref`s, no header).
pub(crate) fn parameters_schema<T: JsonSchema>() -> Value {
    let root = SchemaSettings::draft07()
        .with(|settings| settings.inline_subschemas = true)
        .into_generator()
        .into_root_schema_for::<T>();
    let mut schema = serde_json::to_value(root).unwrap_or_default();
    if let Some(object) = schema.as_object_mut() {
        object.remove("$schema");
        object.remove("title");
    }
    schema
}

/// Guard and tenant checks every tool runs before doing anything else.
pub(crate) fn authorize_tool<'a>(
    context: &'a RunContext,
    tool: &str,
) -> Result<(&'a UserContext, i64), AgentError> {
    ensure_role_access(context.user(), &Role::ALL, tool)?;
    let tenant_id = require_tenant_id(context.user())?;
    let user = context.user().ok_or_else(|| {
        AgentError::authentication("Authenticated user context is required for agent access.")
    })?;
    Ok((user, tenant_id))
}

/// Resolves the effective result limit. An explicit limit outside `1..=max` is rejected.
pub(crate) fn resolve_limit(
    tool: &str,
    requested: Option<i64>,
    max_results: usize,
) -> Result<usize, AgentError> {
    match requested {
        None => Ok(DEFAULT_RESULT_LIMIT.min(max_results)),
        Some(limit) if limit >= 1 && (limit as u64) <= max_results as u64 => Ok(limit as usize),
        Some(_) => Err(AgentError::tool_input(
            tool,
            format!("limit must be between 1 and {max_results}"),
        )),
    }
}

pub(crate) fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|raw| raw.trim().to_string()).filter(|raw| !raw.is_empty())
}

/// Identifier given either as a number or as a string code.
#[derive(Clone, Debug, PartialEq, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Reference {
    Number(i64),
    Text(String),
}

impl Reference {
    pub fn as_text(&self) -> String {
        match self {
            Self::Number(number) => number.to_string(),
            Self::Text(text) => text.trim().to_string(),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Number(number) => Value::from(*number),
            Self::Text(text) => Value::String(text.trim().to_string()),
        }
    }
}

/// Identifiers that end up in a URL path must be plain `[A-Za-z0-9_-]` tokens.
pub(crate) fn path_identifier(tool: &str, reference: &Reference) -> Result<String, AgentError> {
    let text = reference.as_text();
    if text.is_empty() {
        return Err(AgentError::tool_input(tool, "workOrderId is required"));
    }
    if !text.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_') {
        return Err(AgentError::tool_input(
            tool,
            format!("workOrderId `{text}` contains unsupported characters"),
        ));
    }
    Ok(text)
}

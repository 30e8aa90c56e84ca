use async_trait::async_trait;
use copilot_core::errors::AgentError;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{authorize_tool, parameters_schema, parse_input, Tool, ToolDescriptor, ToolOutput};
use crate::context::RunContext;

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct NoArguments {}

/// Returns the caller's redacted profile; the raw identity payload never reaches the model.
pub struct GetUserContext;

impl GetUserContext {
    pub const NAME: &'static str = "get_user_context";
}

#[async_trait]
impl Tool for GetUserContext {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: Self::NAME,
            description: "Return the authenticated user's profile information and role for \
                          grounding responses.",
            parameters: parameters_schema::<NoArguments>(),
        }
    }

    async fn execute(
        &self,
        input: Value,
        context: &mut RunContext,
    ) -> Result<ToolOutput, AgentError> {
        let _: NoArguments = parse_input(Self::NAME, input)?;
        let (user, _) = authorize_tool(context, Self::NAME)?;
        let output = serde_json::to_value(user).unwrap_or_default();
        Ok(ToolOutput { arguments: json!({}), result_count: 1, output })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use crate::test_support::{admin, run_context, StubBackend};
    use crate::tools::ToolRegistry;

    #[tokio::test]
    async fn profile_is_the_redacted_projection() {
        let backend = Arc::new(StubBackend::new());
        let registry = ToolRegistry::maintenance(backend.clone(), 10);
        let mut context = run_context(admin());

        let output = registry
            .invoke("get_user_context", json!({}), &mut context)
            .await
            .expect("profile");

        assert_eq!(
            output,
            json!({"id": "7", "displayName": "Ava Agent", "role": "ADMIN", "tenantId": 42})
        );
        assert!(backend.requests().is_empty());
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use copilot_core::domain::asset::{normalize_assets, summarize_assets};
use copilot_core::errors::AgentError;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{
    authorize_tool, parameters_schema, parse_input, resolve_limit, trimmed, Tool, ToolDescriptor,
    ToolOutput,
};
use crate::backend::Backend;
use crate::context::RunContext;

pub const SEARCH_PATH: &str = "/api/agent/tools/assets/search";

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct ViewAssetsInput {
    /// Maximum number of assets to return.
    limit: Option<i64>,
    /// Free-text search over asset name and id.
    search: Option<String>,
}

#[derive(Debug, Serialize)]
struct AssetSearchCriteria {
    limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    search: Option<String>,
}

pub struct ViewAssets {
    backend: Arc<dyn Backend>,
    max_results: usize,
}

impl ViewAssets {
    pub const NAME: &'static str = "view_assets";

    pub fn new(backend: Arc<dyn Backend>, max_results: usize) -> Self {
        Self { backend, max_results }
    }
}

#[async_trait]
impl Tool for ViewAssets {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: Self::NAME,
            description: "Retrieve assets for the current tenant. Use when the user asks about \
                          assets, equipment, or machines.",
            parameters: parameters_schema::<ViewAssetsInput>(),
        }
    }

    async fn execute(
        &self,
        input: Value,
        context: &mut RunContext,
    ) -> Result<ToolOutput, AgentError> {
        let input: ViewAssetsInput = parse_input(Self::NAME, input)?;
        authorize_tool(context, Self::NAME)?;
        let limit = resolve_limit(Self::NAME, input.limit, self.max_results)?;
        let criteria = AssetSearchCriteria { limit, search: trimmed(input.search) };
        let arguments = serde_json::to_value(&criteria).unwrap_or_default();

        let response = self
            .backend
            .post_tool_request(SEARCH_PATH, context.authorization_header(), &arguments)
            .await?;
        let assets = normalize_assets(&response, limit);

        if !assets.is_empty() {
            context.insights.push(summarize_assets(&assets));
        }
        let output = json!({ "type": "assets", "total": assets.len(), "items": assets });
        let result_count = assets.len();
        context.tool_results.assets = Some(assets);

        Ok(ToolOutput { arguments, result_count, output })
    }
}

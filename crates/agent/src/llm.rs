//! [`AgentRuntime`] over the OpenAI Responses API.
//!
//! One prompt may take several round trips: whenever the model answers with
//! `function_call` items, each call runs through the tool registry and the
//! outputs are sent back with `previous_response_id` until the model replies
//! with plain text or `max_turns` is exhausted.

use std::time::Duration;

use async_trait::async_trait;
use copilot_core::config::LlmConfig;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::runtime::{
    AgentDefinition, AgentRuntime, ConversationItem, RunOptions, RunOutcome, RuntimeError,
};
use crate::tools::ToolDescriptor;

pub struct OpenAiResponsesRuntime {
    client: Client,
    api_key: SecretString,
    base_url: String,
    max_turns: u32,
}

#[derive(Serialize)]
struct FunctionTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

#[derive(Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    instructions: &'a str,
    input: &'a [ConversationItem],
    tools: Vec<FunctionTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    previous_response_id: Option<&'a str>,
}

#[derive(Deserialize)]
struct ResponsesReply {
    id: String,
    #[serde(default)]
    output: Vec<ConversationItem>,
}

#[derive(Deserialize)]
struct ErrorReply {
    error: Option<ErrorBody>,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

impl OpenAiResponsesRuntime {
    pub fn new(config: &LlmConfig) -> Result<Self, RuntimeError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.expose_secret().trim().is_empty())
            .ok_or_else(|| RuntimeError::Configuration("OPENAI_API_KEY is not set".to_string()))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| RuntimeError::Configuration(error.to_string()))?;

        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.trim().trim_end_matches('/').to_string(),
            max_turns: config.max_turns,
        })
    }

    async fn create_response(
        &self,
        agent: &AgentDefinition,
        descriptors: &[ToolDescriptor],
        input: &[ConversationItem],
        previous_response_id: Option<&str>,
    ) -> Result<ResponsesReply, RuntimeError> {
        let request = ResponsesRequest {
            model: &agent.model,
            instructions: &agent.instructions,
            input,
            tools: descriptors
                .iter()
                .map(|descriptor| FunctionTool {
                    kind: "function",
                    name: descriptor.name,
                    description: descriptor.description,
                    parameters: &descriptor.parameters,
                })
                .collect(),
            previous_response_id,
        };

        let response = self
            .client
            .post(format!("{}/responses", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|error| RuntimeError::Transport(error.to_string()))?;

        let status = response.status();
        let body = response.bytes().await.map_err(|error| RuntimeError::Transport(error.to_string()))?;
        if !status.is_success() {
            let detail = serde_json::from_slice::<ErrorReply>(&body)
                .ok()
                .and_then(|reply| reply.error)
                .and_then(|error| error.message)
                .unwrap_or_else(|| "no error detail".to_string());
            warn!(
                event_name = "agent.runtime.request_failed",
                status = status.as_u16(),
                error = %detail,
                "responses API rejected the request"
            );
            return Err(RuntimeError::Transport(format!("responses API returned {status}: {detail}")));
        }

        serde_json::from_slice(&body).map_err(|error| RuntimeError::Protocol(error.to_string()))
    }
}

#[async_trait]
impl AgentRuntime for OpenAiResponsesRuntime {
    async fn run(
        &self,
        agent: &AgentDefinition,
        input: Vec<ConversationItem>,
        options: RunOptions<'_>,
    ) -> Result<RunOutcome, RuntimeError> {
        let RunOptions { context, previous_response_id } = options;
        let descriptors = agent.tools.descriptors();
        let mut history = input.clone();
        let mut pending = input;
        let mut previous = previous_response_id;

        for turn in 0..self.max_turns {
            let reply =
                self.create_response(agent, &descriptors, &pending, previous.as_deref()).await?;
            previous = Some(reply.id);

            let produced = reply
                .output
                .into_iter()
                .filter(|item| !matches!(item, ConversationItem::Unsupported))
                .collect::<Vec<_>>();
            let calls = produced
                .iter()
                .filter_map(|item| match item {
                    ConversationItem::FunctionCall { call_id, name, arguments } => {
                        Some((call_id.clone(), name.clone(), arguments.clone()))
                    }
                    _ => None,
                })
                .collect::<Vec<_>>();
            let final_output = produced.iter().rev().find_map(ConversationItem::assistant_text).map(str::to_string);
            history.extend(produced);

            if calls.is_empty() {
                return Ok(RunOutcome { final_output, history, last_response_id: previous });
            }

            debug!(
                event_name = "agent.runtime.tool_round",
                session_id = %context.session_id,
                turn,
                calls = calls.len(),
                "executing requested tool calls"
            );

            pending = Vec::with_capacity(calls.len());
            for (call_id, name, arguments) in calls {
                // Unparsable arguments are handed over as a string so the registry rejects and logs them.
                let arguments = serde_json::from_str::<Value>(&arguments)
                    .unwrap_or(Value::String(arguments));
                let output = agent
                    .tools
                    .invoke(&name, arguments, context)
                    .await
                    .map_err(|source| RuntimeError::Tool { tool: name.clone(), source })?;
                let item = ConversationItem::FunctionCallOutput { call_id, output: output.to_string() };
                history.push(item.clone());
                pending.push(item);
            }
        }

        Err(RuntimeError::TurnLimit(self.max_turns))
    }
}

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use copilot_agent::{
    context::ToolLogEntry,
    conversation::session_id_from_metadata,
    guardrails::authorize,
    identity::IdentityResolver,
    ConversationOrchestrator, ConversationRequest,
};
use copilot_core::{access_failure, AgentError, DraftAction, UserContext};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::health;

#[derive(Clone)]
pub struct AppState {
    pub default_agent_id: String,
    pub identity: Arc<IdentityResolver>,
    /// `None` when no model credentials are configured; chat answers offline.
    pub orchestrator: Option<Arc<ConversationOrchestrator>>,
}

impl AppState {
    pub fn llm_configured(&self) -> bool {
        self.orchestrator.is_some()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/v1/chat", post(chat))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest {
    prompt: Option<Value>,
    agent_id: Option<Value>,
    metadata: Option<Value>,
}

#[derive(Clone, Debug, Serialize)]
pub struct AssistantMessage {
    pub role: &'static str,
    pub content: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub agent_id: String,
    pub session_id: String,
    pub messages: Vec<AssistantMessage>,
    pub tool_calls: Vec<ToolLogEntry>,
    pub drafts: Vec<DraftAction>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
}

#[derive(Debug)]
enum ChatError {
    MissingPrompt,
    Unauthorized { message: String, agent_id: Option<String> },
    Forbidden { message: String, agent_id: String },
    Internal(&'static str),
}

impl ChatError {
    /// Maps an access failure raised during the run; everything else is a 500.
    fn from_run(error: Option<&AgentError>, agent_id: &str) -> Self {
        match error {
            Some(AgentError::Authentication(message)) => Self::Unauthorized {
                message: message.clone(),
                agent_id: Some(agent_id.to_string()),
            },
            Some(AgentError::Rbac(message) | AgentError::TenantContext(message)) => {
                Self::Forbidden { message: message.clone(), agent_id: agent_id.to_string() }
            }
            Some(AgentError::ToolInput { .. } | AgentError::Upstream { .. }) | None => {
                Self::Internal("Failed to process agent request.")
            }
        }
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::MissingPrompt => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({ "error": "prompt is required" })),
                )
                    .into_response();
            }
            Self::Unauthorized { message, agent_id } => {
                (StatusCode::UNAUTHORIZED, ErrorBody { status: "error", message, agent_id })
            }
            Self::Forbidden { message, agent_id } => (
                StatusCode::FORBIDDEN,
                ErrorBody { status: "error", message, agent_id: Some(agent_id) },
            ),
            Self::Internal(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody { status: "error", message: message.to_string(), agent_id: None },
            ),
        };
        (status, Json(body)).into_response()
    }
}

fn non_blank_string(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).map(str::trim).filter(|text| !text.is_empty())
}

fn metadata_keys(metadata: Option<&Value>) -> Vec<String> {
    metadata
        .and_then(Value::as_object)
        .map(|object| object.keys().cloned().collect())
        .unwrap_or_default()
}

pub fn offline_message(user: &UserContext) -> String {
    format!(
        "Hi {}, the Atlas AI assistant is offline because no OpenAI API key is configured. \
         Ask an administrator to set OPENAI_API_KEY to enable agent responses.",
        user.greeting_name()
    )
}

async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ChatResponse>, ChatError> {
    let request: ChatRequest = serde_json::from_slice(&body).unwrap_or_default();
    let Some(prompt) = non_blank_string(request.prompt.as_ref()).map(str::to_string) else {
        return Err(ChatError::MissingPrompt);
    };

    let authorization = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string);
    let Some(authorization) = authorization else {
        warn!(event_name = "chat.request.unauthenticated", "chat request missing Authorization header");
        return Err(ChatError::Unauthorized {
            message: "Authorization header is required for agent access.".to_string(),
            agent_id: None,
        });
    };

    let agent_id = non_blank_string(request.agent_id.as_ref())
        .map(str::to_string)
        .unwrap_or_else(|| state.default_agent_id.clone());
    let metadata = request.metadata;
    let session_id = session_id_from_metadata(metadata.as_ref());

    let user = state
        .identity
        .resolve(Some(&authorization))
        .await
        .and_then(|user| authorize(Some(&user)).map(|_| user))
        .map_err(|error| match error {
            AgentError::Authentication(message) => {
                warn!(
                    event_name = "chat.request.unauthenticated",
                    agent_id = %agent_id,
                    error = %message,
                    "authentication failed for agent request"
                );
                ChatError::Unauthorized { message, agent_id: None }
            }
            AgentError::Rbac(message) | AgentError::TenantContext(message) => {
                warn!(
                    event_name = "chat.request.forbidden",
                    agent_id = %agent_id,
                    error = %message,
                    "authorisation failed for agent request"
                );
                ChatError::Forbidden { message, agent_id: agent_id.clone() }
            }
            other @ (AgentError::ToolInput { .. } | AgentError::Upstream { .. }) => {
                error!(
                    event_name = "chat.request.identity_failed",
                    agent_id = %agent_id,
                    error = %other,
                    "unexpected error while resolving user context"
                );
                ChatError::Internal("Failed to resolve user context.")
            }
        })?;

    info!(
        event_name = "chat.request.authorized",
        agent_id = %agent_id,
        session_id = %session_id,
        role = user.role.as_deref().unwrap_or("unknown"),
        tenant_id = user.tenant_id,
        metadata_keys = ?metadata_keys(metadata.as_ref()),
        openai_configured = state.llm_configured(),
        "resolved agent user context"
    );

    let Some(orchestrator) = state.orchestrator.as_ref() else {
        return Ok(Json(ChatResponse {
            status: "success",
            message: "Atlas assistant is not configured",
            agent_id,
            session_id,
            messages: vec![AssistantMessage { role: "assistant", content: offline_message(&user) }],
            tool_calls: Vec::new(),
            drafts: Vec::new(),
        }));
    };

    let response = orchestrator
        .run(ConversationRequest {
            prompt,
            agent_id: agent_id.clone(),
            authorization_header: Some(authorization),
            user_context: user,
            metadata,
            session_override: Some(session_id.clone()),
        })
        .await
        .map_err(|run_error| {
            let root = access_failure(&run_error);
            match root {
                Some(access) => warn!(
                    event_name = "chat.request.forbidden",
                    agent_id = %agent_id,
                    session_id = %session_id,
                    kind = access.kind(),
                    error = %access,
                    "access control prevented tool execution"
                ),
                None => error!(
                    event_name = "chat.request.failed",
                    agent_id = %agent_id,
                    session_id = %session_id,
                    error = %run_error,
                    "failed to process prompt"
                ),
            }
            ChatError::from_run(root, &agent_id)
        })?;

    info!(
        event_name = "chat.request.completed",
        agent_id = %agent_id,
        session_id = %response.session_id,
        tool_calls = response.tool_calls.len(),
        drafts = response.drafts.len(),
        "agent response generated"
    );

    Ok(Json(ChatResponse {
        status: "success",
        message: "Agent response generated",
        agent_id,
        session_id: response.session_id,
        messages: vec![AssistantMessage { role: "assistant", content: response.final_output }],
        tool_calls: response.tool_calls,
        drafts: response.drafts,
    }))
}

#[cfg(test)]
mod tests {
    use copilot_core::{AgentError, UserContext};

    use super::{offline_message, ChatError};

    #[test]
    fn run_errors_map_by_root_cause() {
        let rbac = AgentError::rbac("User is not authorised to use tool view_assets");
        assert!(matches!(
            ChatError::from_run(Some(&rbac), "agent-1"),
            ChatError::Forbidden { agent_id, .. } if agent_id == "agent-1"
        ));

        let auth = AgentError::authentication("Authorization header is required for agent tool execution.");
        assert!(matches!(
            ChatError::from_run(Some(&auth), "agent-1"),
            ChatError::Unauthorized { agent_id: Some(_), .. }
        ));

        assert!(matches!(ChatError::from_run(None, "agent-1"), ChatError::Internal(_)));
        let upstream = AgentError::upstream("boom", Some(502));
        assert!(matches!(ChatError::from_run(Some(&upstream), "agent-1"), ChatError::Internal(_)));
    }

    #[test]
    fn offline_message_falls_back_to_a_generic_greeting() {
        assert!(offline_message(&UserContext::default()).starts_with("Hi there, the Atlas AI"));
    }
}

//! HTTP collaborator for the maintenance backend: the `/auth/me` identity
//! endpoint and the agent tool endpoints under `/api/agent/tools`.

use std::time::Duration;

use async_trait::async_trait;
use copilot_core::config::BackendConfig;
use copilot_core::errors::AgentError;
use reqwest::{Client, Response};
use serde_json::Value;
use tracing::{error, warn};

pub const IDENTITY_PATH: &str = "/auth/me";

#[async_trait]
pub trait Backend: Send + Sync {
    /// Raw identity payload for the caller. Non-success statuses surface as
    /// `AgentError::Upstream` carrying the status code.
    async fn fetch_identity(&self, authorization: &str) -> Result<Value, AgentError>;

    async fn post_tool_request(
        &self,
        path: &str,
        authorization: Option<&str>,
        body: &Value,
    ) -> Result<Value, AgentError>;
}

#[derive(Clone, Debug)]
pub struct HttpBackend {
    client: Client,
    api_base: String,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;
        Ok(Self::with_client(client, &config.api_base))
    }

    pub fn with_client(client: Client, api_base: &str) -> Self {
        Self { client, api_base: api_base.trim().trim_end_matches('/').to_string() }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.api_base)
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn fetch_identity(&self, authorization: &str) -> Result<Value, AgentError> {
        let url = self.url(IDENTITY_PATH);
        let response = self
            .client
            .get(&url)
            .header("Authorization", authorization)
            .send()
            .await
            .map_err(|error| {
                warn!(
                    event_name = "agent.identity.transport_failed",
                    path = %url,
                    error = %error,
                    "identity request failed"
                );
                AgentError::upstream(format!("identity request failed: {error}"), None)
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(
                event_name = "agent.identity.rejected",
                path = %url,
                status = status.as_u16(),
                "identity service rejected the caller"
            );
            return Err(AgentError::upstream(
                format!("identity request returned {status}"),
                Some(status.as_u16()),
            ));
        }

        Ok(read_json(response).await.unwrap_or(Value::Null))
    }

    async fn post_tool_request(
        &self,
        path: &str,
        authorization: Option<&str>,
        body: &Value,
    ) -> Result<Value, AgentError> {
        let Some(authorization) = authorization.filter(|value| !value.trim().is_empty()) else {
            return Err(AgentError::authentication(
                "Authorization header is required for agent tool execution.",
            ));
        };

        let url = self.url(path);
        let response = match self
            .client
            .post(&url)
            .header("Authorization", authorization)
            .json(body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(transport) => {
                error!(
                    event_name = "agent.tool.request_failed",
                    path = %url,
                    timeout = transport.is_timeout(),
                    error = %transport,
                    "agent tool request failed"
                );
                return Err(AgentError::upstream(
                    format!("request to {path} failed: {transport}"),
                    None,
                ));
            }
        };

        let status = response.status();
        if !status.is_success() {
            error!(
                event_name = "agent.tool.request_failed",
                path = %url,
                status = status.as_u16(),
                "agent tool request failed"
            );
            return Err(AgentError::upstream(
                format!("request to {path} returned {status}"),
                Some(status.as_u16()),
            ));
        }

        read_json(response).await.map_err(|message| {
            error!(
                event_name = "agent.tool.invalid_response",
                path = %url,
                error = %message,
                "agent tool response was not valid JSON"
            );
            AgentError::upstream(format!("response from {path} was not valid JSON"), None)
        })
    }
}

/// Empty bodies read as `null`.
async fn read_json(response: Response) -> Result<Value, String> {
    let bytes = response.bytes().await.map_err(|error| error.to_string())?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&bytes).map_err(|error| error.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use copilot_core::errors::AgentError;
    use serde_json::{json, Value};

    use super::{Backend, HttpBackend};

    #[derive(Clone, Default)]
    struct Seen {
        authorization: Arc<Mutex<Vec<String>>>,
        bodies: Arc<Mutex<Vec<Value>>>,
    }

    async fn me(State(seen): State<Seen>, headers: HeaderMap) -> (StatusCode, Json<Value>) {
        let authorization =
            headers.get("authorization").and_then(|value| value.to_str().ok()).unwrap_or_default();
        seen.authorization.lock().expect("lock").push(authorization.to_string());
        if authorization == "Bearer good" {
            (StatusCode::OK, Json(json!({"id": 1, "role": "ADMIN", "companyId": 3})))
        } else {
            (StatusCode::UNAUTHORIZED, Json(json!({"error": "nope"})))
        }
    }

    async fn search(State(seen): State<Seen>, Json(body): Json<Value>) -> Json<Value> {
        seen.bodies.lock().expect("lock").push(body);
        Json(json!({"results": [{"id": 1}], "total": 1}))
    }

    async fn broken() -> StatusCode {
        StatusCode::BAD_GATEWAY
    }

    async fn spawn_backend() -> (HttpBackend, Seen) {
        let seen = Seen::default();
        let app = Router::new()
            .route("/auth/me", get(me))
            .route("/api/agent/tools/work-orders/search", post(search))
            .route("/api/agent/tools/assets/search", post(broken))
            .with_state(seen.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let address = listener.local_addr().expect("address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("fake backend");
        });

        (HttpBackend::with_client(reqwest::Client::new(), &format!("http://{address}/")), seen)
    }

    #[tokio::test]
    async fn identity_forwards_authorization_header() {
        let (backend, seen) = spawn_backend().await;

        let payload = backend.fetch_identity("Bearer good").await.expect("identity");
        assert_eq!(payload["role"], json!("ADMIN"));
        assert_eq!(seen.authorization.lock().expect("lock").as_slice(), ["Bearer good"]);

        let error = backend.fetch_identity("Bearer bad").await.expect_err("rejected");
        assert!(matches!(error, AgentError::Upstream { status: Some(401), .. }));
    }

    #[tokio::test]
    async fn tool_request_posts_json_body() {
        let (backend, seen) = spawn_backend().await;

        let response = backend
            .post_tool_request(
                "/api/agent/tools/work-orders/search",
                Some("Bearer good"),
                &json!({"limit": 5}),
            )
            .await
            .expect("search");

        assert_eq!(response["total"], json!(1));
        assert_eq!(seen.bodies.lock().expect("lock").as_slice(), [json!({"limit": 5})]);
    }

    #[tokio::test]
    async fn tool_request_without_authorization_never_reaches_backend() {
        let (backend, seen) = spawn_backend().await;

        let error = backend
            .post_tool_request("/api/agent/tools/work-orders/search", None, &json!({}))
            .await
            .expect_err("missing header");

        assert_eq!(
            error,
            AgentError::authentication("Authorization header is required for agent tool execution.")
        );
        assert!(seen.bodies.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn upstream_status_is_preserved() {
        let (backend, _) = spawn_backend().await;

        let error = backend
            .post_tool_request("/api/agent/tools/assets/search", Some("Bearer good"), &json!({}))
            .await
            .expect_err("bad gateway");

        assert!(matches!(error, AgentError::Upstream { status: Some(502), .. }));
    }
}

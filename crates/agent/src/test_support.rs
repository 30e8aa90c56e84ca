use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use copilot_core::errors::AgentError;
use copilot_core::identity::UserContext;
use serde_json::{json, Value};

use crate::backend::Backend;
use crate::context::RunContext;

pub(crate) struct StubBackend {
    identity: Result<Value, AgentError>,
    responses: HashMap<String, Result<Value, AgentError>>,
    requests: Mutex<Vec<(String, Value)>>,
    identity_calls: AtomicUsize,
}

impl StubBackend {
    pub(crate) fn new() -> Self {
        Self::with_identity(Ok(json!({"id": 1, "role": "ADMIN", "companyId": 42})))
    }

    pub(crate) fn with_identity(identity: Result<Value, AgentError>) -> Self {
        Self {
            identity,
            responses: HashMap::new(),
            requests: Mutex::new(Vec::new()),
            identity_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn respond(mut self, path: &str, response: Result<Value, AgentError>) -> Self {
        self.responses.insert(path.to_string(), response);
        self
    }

    pub(crate) fn requests(&self) -> Vec<(String, Value)> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub(crate) fn identity_calls(&self) -> usize {
        self.identity_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for StubBackend {
    async fn fetch_identity(&self, _authorization: &str) -> Result<Value, AgentError> {
        self.identity_calls.fetch_add(1, Ordering::SeqCst);
        self.identity.clone()
    }

    async fn post_tool_request(
        &self,
        path: &str,
        authorization: Option<&str>,
        body: &Value,
    ) -> Result<Value, AgentError> {
        if authorization.is_none() {
            return Err(AgentError::authentication(
                "Authorization header is required for agent tool execution.",
            ));
        }
        self.requests.lock().expect("requests lock").push((path.to_string(), body.clone()));
        self.responses.get(path).cloned().unwrap_or_else(|| Ok(json!({"results": []})))
    }
}

pub(crate) fn user(role: Option<&str>, tenant_id: Option<i64>) -> UserContext {
    UserContext {
        id: Some("7".to_string()),
        display_name: Some("Ava Agent".to_string()),
        role: role.map(str::to_string),
        tenant_id,
    }
}

pub(crate) fn admin() -> UserContext {
    user(Some("ADMIN"), Some(42))
}

pub(crate) fn run_context(user: UserContext) -> RunContext {
    RunContext::new("session-test", Some("Bearer test-token".to_string()), Some(user))
}

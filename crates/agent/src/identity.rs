use std::sync::Arc;

use copilot_core::errors::AgentError;
use copilot_core::identity::UserContext;
use tracing::warn;

use crate::backend::Backend;

/// Resolves the caller's [`UserContext`] with a single `/auth/me` round trip.
/// Every failure is an authentication failure; nothing is retried.
#[derive(Clone)]
pub struct IdentityResolver {
    backend: Arc<dyn Backend>,
}

impl IdentityResolver {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    pub async fn resolve(&self, authorization: Option<&str>) -> Result<UserContext, AgentError> {
        let Some(authorization) = authorization.filter(|value| !value.trim().is_empty()) else {
            return Err(AgentError::authentication(
                "Authorization header is required for agent access.",
            ));
        };

        let payload = match self.backend.fetch_identity(authorization).await {
            Ok(payload) => payload,
            Err(AgentError::Upstream { status: Some(401 | 403), .. }) => {
                return Err(AgentError::authentication(
                    "User authentication failed when calling /auth/me.",
                ));
            }
            Err(error) => {
                warn!(
                    event_name = "agent.identity.unavailable",
                    error = %error,
                    "unable to fetch user context"
                );
                return Err(AgentError::authentication("Unable to verify user identity."));
            }
        };

        UserContext::from_payload(&payload).ok_or_else(|| {
            warn!(
                event_name = "agent.identity.empty",
                "identity service returned an empty user context"
            );
            AgentError::authentication("Identity verification failed; no user context available.")
        })
    }
}

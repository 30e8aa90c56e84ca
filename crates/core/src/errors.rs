use std::error::Error as StdError;

use thiserror::Error;

/// Failures raised by identity resolution, access checks and tool execution.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AgentError {
    #[error("{0}")]
    Authentication(String),
    #[error("{0}")]
    Rbac(String),
    #[error("{0}")]
    TenantContext(String),
    #[error("{tool}: {message}")]
    ToolInput { tool: String, message: String },
    #[error("{message}")]
    Upstream { message: String, status: Option<u16> },
}

impl AgentError {
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication(message.into())
    }

    pub fn rbac(message: impl Into<String>) -> Self {
        Self::Rbac(message.into())
    }

    pub fn tenant_context(message: impl Into<String>) -> Self {
        Self::TenantContext(message.into())
    }

    pub fn tool_input(tool: &str, message: impl Into<String>) -> Self {
        Self::ToolInput { tool: tool.to_string(), message: message.into() }
    }

    pub fn upstream(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::Upstream { message: message.into(), status }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::Authentication(_) => 401,
            Self::Rbac(_) | Self::TenantContext(_) => 403,
            Self::ToolInput { .. } | Self::Upstream { .. } => 500,
        }
    }

    pub fn is_access_failure(&self) -> bool {
        matches!(self, Self::Authentication(_) | Self::Rbac(_) | Self::TenantContext(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Authentication(_) => "authentication",
            Self::Rbac(_) => "rbac",
            Self::TenantContext(_) => "tenant_context",
            Self::ToolInput { .. } => "tool_input",
            Self::Upstream { .. } => "upstream",
        }
    }
}

/// Walks a wrapped error chain and returns the first authentication, RBAC or
/// tenant failure found, starting with `error` itself.
pub fn access_failure<'a>(error: &'a (dyn StdError + 'static)) -> Option<&'a AgentError> {
    let mut current: Option<&(dyn StdError + 'static)> = Some(error);
    while let Some(candidate) = current {
        if let Some(agent_error) = candidate.downcast_ref::<AgentError>() {
            if agent_error.is_access_failure() {
                return Some(agent_error);
            }
        }
        current = candidate.source();
    }
    None
}

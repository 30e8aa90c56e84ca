//! Role and tenant gates. The same checks run at the HTTP boundary and again
//! inside every tool, so a tool call never trusts context captured earlier in
//! the turn.

use std::fmt;

use copilot_core::errors::AgentError;
use copilot_core::identity::UserContext;
use tracing::warn;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Admin,
    Manager,
    Technician,
    Supervisor,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Admin, Role::Manager, Role::Technician, Role::Supervisor];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::Manager => "MANAGER",
            Self::Technician => "TECHNICIAN",
            Self::Supervisor => "SUPERVISOR",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Some(Self::Admin),
            "MANAGER" => Some(Self::Manager),
            "TECHNICIAN" => Some(Self::Technician),
            "SUPERVISOR" => Some(Self::Supervisor),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authenticated, role-checked and tenant-scoped caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AuthorizedUser {
    pub role: Role,
    pub tenant_id: i64,
}

pub fn authorize(user: Option<&UserContext>) -> Result<AuthorizedUser, AgentError> {
    let Some(user) = user else {
        return Err(AgentError::authentication(
            "Authenticated user context is required for agent access.",
        ));
    };
    let Some(role_name) = user.role.as_deref().filter(|role| !role.trim().is_empty()) else {
        return Err(AgentError::authentication(
            "Authenticated user has no role assigned; contact an administrator.",
        ));
    };
    let Some(role) = Role::parse(role_name) else {
        return Err(AgentError::rbac(format!(
            "User role {} is not authorised for agent access.",
            role_name.to_uppercase()
        )));
    };
    let tenant_id = require_tenant_id(Some(user))?;

    Ok(AuthorizedUser { role, tenant_id })
}

/// Full authorization plus a per-tool allow-list. An empty list allows every role.
pub fn ensure_role_access(
    user: Option<&UserContext>,
    allowed: &[Role],
    tool: &str,
) -> Result<AuthorizedUser, AgentError> {
    let authorized = authorize(user)?;
    if !allowed.is_empty() && !allowed.contains(&authorized.role) {
        warn!(
            event_name = "agent.tool.rbac_mismatch",
            tool_name = tool,
            role = %authorized.role,
            "role is not on the tool allow-list"
        );
        return Err(AgentError::rbac(format!("User is not authorised to use tool {tool}")));
    }
    Ok(authorized)
}

pub fn require_tenant_id(user: Option<&UserContext>) -> Result<i64, AgentError> {
    user.and_then(|user| user.tenant_id).ok_or_else(|| {
        AgentError::tenant_context(
            "Tenant context missing or invalid; unable to execute tool safely.",
        )
    })
}

//! Normalization of the identity service's `/auth/me` payload.
//!
//! The payload shape varies between deployments: the role may be a plain
//! string, an object carrying `code`/`name`, or live under `roleName` /
//! `role_key`; the tenant may be `companyId`, `company.id`, `company_id` or the
//! first entry of `companies`. Each extractor walks its candidates in a fixed
//! order and returns `None` instead of failing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::text::{non_blank, scalar_text};

/// Identity record derived for one request. Only these fields ever leave the
/// proxy; the raw identity payload is dropped after normalization.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserContext {
    pub id: Option<String>,
    pub display_name: Option<String>,
    pub role: Option<String>,
    pub tenant_id: Option<i64>,
}

impl UserContext {
    pub fn from_payload(payload: &Value) -> Option<Self> {
        IdentityDocument::parse(payload).map(|document| document.normalize())
    }

    pub fn greeting_name(&self) -> &str {
        self.display_name.as_deref().filter(|name| !name.trim().is_empty()).unwrap_or("there")
    }
}

#[derive(Debug)]
enum RoleClaim {
    Name(String),
    Structured { code: Option<Value>, name: Option<Value> },
    Other,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentityDocument {
    id: Option<Value>,
    user_id: Option<Value>,
    full_name: Option<Value>,
    first_name: Option<Value>,
    last_name: Option<Value>,
    name: Option<Value>,
    email: Option<Value>,
    username: Option<Value>,
    role: Option<Value>,
    role_name: Option<Value>,
    #[serde(rename = "role_key")]
    role_key: Option<Value>,
    company_id: Option<Value>,
    company: Option<Value>,
    #[serde(rename = "company_id")]
    company_id_snake: Option<Value>,
    companies: Option<Value>,
}

impl IdentityDocument {
    fn parse(payload: &Value) -> Option<Self> {
        let object = payload.as_object()?;
        if object.is_empty() {
            return None;
        }
        serde_json::from_value(payload.clone()).ok()
    }

    fn normalize(&self) -> UserContext {
        UserContext {
            id: self.user_id(),
            display_name: self.display_name(),
            role: self.role_name(),
            tenant_id: self.tenant_id(),
        }
    }

    fn user_id(&self) -> Option<String> {
        self.id.as_ref().and_then(scalar_text).or_else(|| self.user_id.as_ref().and_then(scalar_text))
    }

    fn role_name(&self) -> Option<String> {
        let from_claim = match self.role.as_ref().map(classify_role) {
            Some(RoleClaim::Name(name)) => non_blank(&name),
            Some(RoleClaim::Structured { code, name }) => code
                .as_ref()
                .and_then(scalar_text)
                .or_else(|| name.as_ref().and_then(scalar_text)),
            Some(RoleClaim::Other) | None => None,
        };

        from_claim
            .or_else(|| self.role_name.as_ref().and_then(scalar_text))
            .or_else(|| self.role_key.as_ref().and_then(scalar_text))
            .map(|role| role.to_uppercase())
    }

    fn tenant_id(&self) -> Option<i64> {
        self.company_id
            .as_ref()
            .and_then(coerce_tenant_id)
            .or_else(|| {
                self.company.as_ref().and_then(|company| company.get("id")).and_then(coerce_tenant_id)
            })
            .or_else(|| self.company_id_snake.as_ref().and_then(coerce_tenant_id))
            .or_else(|| {
                let first = self.companies.as_ref()?.as_array()?.first()?;
                match first {
                    Value::Object(company) => company.get("id").and_then(coerce_tenant_id),
                    Value::Number(_) => coerce_tenant_id(first),
                    _ => None,
                }
            })
    }

    fn display_name(&self) -> Option<String> {
        if let Some(full_name) = self.full_name.as_ref().and_then(text) {
            return Some(full_name);
        }

        let parts = [self.first_name.as_ref(), self.last_name.as_ref()]
            .into_iter()
            .flatten()
            .filter_map(text)
            .collect::<Vec<_>>();
        if !parts.is_empty() {
            return Some(parts.join(" "));
        }

        self.name
            .as_ref()
            .and_then(text)
            .or_else(|| self.email.as_ref().and_then(text))
            .or_else(|| self.username.as_ref().and_then(text))
    }
}

fn classify_role(value: &Value) -> RoleClaim {
    match value {
        Value::String(name) => RoleClaim::Name(name.clone()),
        Value::Object(object) => RoleClaim::Structured {
            code: object.get("code").cloned(),
            name: object.get("name").cloned(),
        },
        _ => RoleClaim::Other,
    }
}

fn text(value: &Value) -> Option<String> {
    value.as_str().and_then(non_blank)
}

/// Tenant ids must be finite, integral and non-zero; anything else counts as absent.
pub fn coerce_tenant_id(value: &Value) -> Option<i64> {
    let numeric = match value {
        Value::Number(number) => number.as_f64()?,
        Value::String(raw) => raw.trim().parse::<f64>().ok()?,
        _ => return None,
    };

    if !numeric.is_finite() || numeric.fract() != 0.0 {
        return None;
    }
    if numeric.abs() > i64::MAX as f64 {
        return None;
    }
    let integral = numeric as i64;
    (integral != 0).then_some(integral)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{coerce_tenant_id, UserContext};

    fn context(payload: serde_json::Value) -> UserContext {
        UserContext::from_payload(&payload).expect("payload should normalize")
    }

    #[test]
    fn role_precedence_prefers_plain_string() {
        let user = context(json!({"role": "technician", "roleName": "ADMIN"}));
        assert_eq!(user.role.as_deref(), Some("TECHNICIAN"));
    }

    #[test]
    fn role_object_code_wins_over_name() {
        let user = context(json!({"role": {"code": "manager", "name": "Admin"}}));
        assert_eq!(user.role.as_deref(), Some("MANAGER"));

        let user = context(json!({"role": {"name": "supervisor"}}));
        assert_eq!(user.role.as_deref(), Some("SUPERVISOR"));
    }

    #[test]
    fn role_falls_back_to_role_name_then_role_key() {
        let user = context(json!({"role": "   ", "roleName": "admin"}));
        assert_eq!(user.role.as_deref(), Some("ADMIN"));

        let user = context(json!({"role_key": "technician"}));
        assert_eq!(user.role.as_deref(), Some("TECHNICIAN"));

        let user = context(json!({"role": 17, "fullName": "Odd Role"}));
        assert_eq!(user.role, None);
    }

    #[test]
    fn tenant_precedence_follows_company_fields() {
        assert_eq!(context(json!({"companyId": "42", "company": {"id": 7}})).tenant_id, Some(42));
        assert_eq!(context(json!({"company": {"id": 7}})).tenant_id, Some(7));
        assert_eq!(context(json!({"company_id": 9})).tenant_id, Some(9));
        assert_eq!(context(json!({"companies": [{"id": 11}, {"id": 12}]})).tenant_id, Some(11));
        assert_eq!(context(json!({"companies": [13]})).tenant_id, Some(13));
        assert_eq!(context(json!({"companies": ["14"]})).tenant_id, None);
    }

    #[test]
    fn invalid_tenant_field_falls_through_to_next_candidate() {
        let user = context(json!({"companyId": "not-a-number", "company": {"id": 5}}));
        assert_eq!(user.tenant_id, Some(5));
    }

    #[test]
    fn tenant_coercion_rejects_non_integral_and_zero() {
        assert_eq!(coerce_tenant_id(&json!(0)), None);
        assert_eq!(coerce_tenant_id(&json!(4.5)), None);
        assert_eq!(coerce_tenant_id(&json!("")), None);
        assert_eq!(coerce_tenant_id(&json!("inf")), None);
        assert_eq!(coerce_tenant_id(&json!(" 12 ")), Some(12));
    }

    #[test]
    fn display_name_precedence() {
        assert_eq!(
            context(json!({"fullName": "Ava Agent", "name": "ava"})).display_name.as_deref(),
            Some("Ava Agent")
        );
        assert_eq!(
            context(json!({"firstName": "Ava", "lastName": ""})).display_name.as_deref(),
            Some("Ava")
        );
        assert_eq!(
            context(json!({"email": "ava@example.com"})).display_name.as_deref(),
            Some("ava@example.com")
        );
    }

    #[test]
    fn user_id_accepts_numbers_and_user_id_alias() {
        assert_eq!(context(json!({"id": 7})).id.as_deref(), Some("7"));
        assert_eq!(context(json!({"userId": "u-9"})).id.as_deref(), Some("u-9"));
    }

    #[test]
    fn empty_or_non_object_payloads_are_rejected() {
        assert!(UserContext::from_payload(&json!({})).is_none());
        assert!(UserContext::from_payload(&json!([1, 2])).is_none());
        assert!(UserContext::from_payload(&json!("ADMIN")).is_none());
    }

    #[test]
    fn mistyped_fields_do_not_discard_the_document() {
        let user = context(json!({"companies": "bogus", "role": {"name": "admin"}, "company": {"id": 3}}));
        assert_eq!(user.role.as_deref(), Some("ADMIN"));
        assert_eq!(user.tenant_id, Some(3));
    }

    #[test]
    fn greeting_name_defaults_to_there() {
        assert_eq!(UserContext::default().greeting_name(), "there");
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token claims and the verified identity derived from them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::roles::{has_any_role, Role};

/// Claims decoded from a verified token.
///
/// Only the claims the gateway reads are declared. `roles` and `dataScope`
/// are kept as raw JSON because issuers are loose about their shape.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenClaims {
    /// Subject (user id)
    #[serde(default)]
    pub sub: Option<String>,
    /// A single role name or a list of them
    #[serde(default)]
    pub roles: Option<Value>,
    /// Organizational scope, `{"schoolIds": [...]}`
    #[serde(default, rename = "dataScope")]
    pub data_scope: Option<Value>,
}

/// Verified identity of the caller.
///
/// Lives for one request only: it is attached to the request's extensions by
/// the gateway filter and never stored anywhere else.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IdentityClaims {
    /// User id (`sub`)
    pub subject: Option<String>,
    /// Role names, first-seen order, no duplicates
    pub roles: Vec<String>,
    /// Schools the user may access, first-seen order, no duplicates
    pub school_ids: Vec<i64>,
}

impl IdentityClaims {
    pub fn from_claims(claims: TokenClaims) -> Self {
        Self {
            subject: claims.sub,
            roles: roles_from(claims.roles.as_ref()),
            school_ids: school_ids_from(claims.data_scope.as_ref()),
        }
    }

    pub fn has_any_role(&self, required: &[Role]) -> bool {
        has_any_role(&self.roles, required)
    }
}

/// Absent → empty, scalar → one role, list → each element.
fn roles_from(value: Option<&Value>) -> Vec<String> {
    let mut roles: Vec<String> = Vec::new();
    let mut push = |v: &Value| {
        if let Some(role) = scalar_text(v) {
            if !roles.contains(&role) {
                roles.push(role);
            }
        }
    };

    match value {
        Some(Value::Array(items)) => items.iter().for_each(&mut push),
        Some(other) => push(other),
        None => {}
    }
    roles
}

/// `dataScope.schoolIds`, keeping only values that coerce to integers.
fn school_ids_from(data_scope: Option<&Value>) -> Vec<i64> {
    let Some(Value::Array(items)) = data_scope.and_then(|scope| scope.get("schoolIds")) else {
        return Vec::new();
    };

    let mut ids: Vec<i64> = Vec::new();
    for id in items.iter().filter_map(coerce_i64) {
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn coerce_i64(value: &Value) -> Option<i64> {
    scalar_text(value)?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn identity(claims: Value) -> IdentityClaims {
        IdentityClaims::from_claims(serde_json::from_value(claims).unwrap())
    }

    #[test]
    fn extracts_subject() {
        let id = identity(json!({"sub": "42"}));
        assert_eq!(id.subject.as_deref(), Some("42"));
        assert!(id.roles.is_empty());
        assert!(id.school_ids.is_empty());
    }

    #[test]
    fn absent_roles_are_empty() {
        assert!(identity(json!({"sub": "1", "roles": null})).roles.is_empty());
    }

    #[test]
    fn scalar_role_becomes_single_entry() {
        let id = identity(json!({"sub": "1", "roles": "ADMIN"}));
        assert_eq!(id.roles, vec!["ADMIN"]);
    }

    #[test]
    fn role_list_keeps_first_seen_order() {
        let id = identity(json!({
            "sub": "1",
            "roles": ["STUDENT", "ADMIN", "STUDENT", null, 7]
        }));
        assert_eq!(id.roles, vec!["STUDENT", "ADMIN", "7"]);
        assert!(id.has_any_role(&[Role::Admin]));
        assert!(!id.has_any_role(&[Role::SchoolManager]));
    }

    #[test]
    fn school_ids_drop_values_that_are_not_integers() {
        let id = identity(json!({
            "sub": "1",
            "dataScope": {
                "schoolIds": [3, "4", " 5 ", "x", 6.5, null, true, 3],
                "classIds": [99]
            }
        }));
        assert_eq!(id.school_ids, vec![3, 4, 5]);
    }

    #[test]
    fn malformed_scope_yields_no_schools() {
        assert!(identity(json!({"dataScope": "all"})).school_ids.is_empty());
        assert!(identity(json!({"dataScope": {"schoolIds": 3}})).school_ids.is_empty());
        assert!(identity(json!({"dataScope": {}})).school_ids.is_empty());
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Platform roles known to the gateway.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Roles issued by the identity service.
///
/// Tokens carry roles as plain strings; this enum names the ones the
/// gateway's rule table and the downstream helpers refer to. Unknown role
/// strings are still carried through to downstream services untouched.
///
/// - `Admin` - platform-wide access, bypasses school scope
/// - `SchoolManager` - manages the schools listed in the data scope
/// - `Student` - reads own records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Full administrative access
    Admin,
    /// School-scoped management
    SchoolManager,
    /// Student (own records only)
    Student,
}

impl Role {
    /// Wire name of the role, as it appears in tokens and `X-Roles`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::SchoolManager => "SCHOOL_MANAGER",
            Role::Student => "STUDENT",
        }
    }

    /// Parse a role name. Matching is exact, like the rule table.
    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "ADMIN" => Some(Role::Admin),
            "SCHOOL_MANAGER" => Some(Role::SchoolManager),
            "STUDENT" => Some(Role::Student),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check whether `held` contains any of `required`.
pub fn has_any_role<S: AsRef<str>>(held: &[S], required: &[Role]) -> bool {
    required
        .iter()
        .any(|r| held.iter().any(|h| h.as_ref() == r.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_exact() {
        assert_eq!(Role::parse("ADMIN"), Some(Role::Admin));
        assert_eq!(Role::parse("SCHOOL_MANAGER"), Some(Role::SchoolManager));
        assert_eq!(Role::parse("admin"), None);
        assert_eq!(Role::parse("TEACHER"), None);
    }

    #[test]
    fn display_matches_wire_name() {
        assert_eq!(Role::Student.to_string(), "STUDENT");
        assert_eq!(
            serde_json::to_string(&Role::SchoolManager).unwrap(),
            r#""SCHOOL_MANAGER""#
        );
    }

    #[test]
    fn any_of_semantics() {
        let held = vec!["TEACHER".to_string(), "STUDENT".to_string()];
        assert!(has_any_role(&held, &[Role::Admin, Role::Student]));
        assert!(!has_any_role(&held, &[Role::Admin, Role::SchoolManager]));
        assert!(!has_any_role::<String>(&[], &[Role::Admin]));
    }
}

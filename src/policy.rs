// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Coarse access rules evaluated at the edge.
//!
//! The policy is plain data: a public-path allowlist and an ordered rule
//! table. [`AccessPolicy::authorize`] is the only place the gateway decides
//! whether a verified identity may proceed. Finer checks (ownership, data
//! scope) stay with the downstream services, which receive the identity in
//! trust headers.

use axum::http::Method;

use crate::auth::Role;

/// How a rule or allowlist entry matches a request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathMatcher {
    Exact(String),
    Prefix(String),
}

impl PathMatcher {
    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathMatcher::Exact(p) => path == p,
            PathMatcher::Prefix(p) => path.starts_with(p.as_str()),
        }
    }
}

/// Which HTTP methods a rule applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodMatcher {
    Any,
    OneOf(Vec<Method>),
}

impl MethodMatcher {
    pub fn matches(&self, method: &Method) -> bool {
        match self {
            MethodMatcher::Any => true,
            MethodMatcher::OneOf(methods) => methods.contains(method),
        }
    }
}

/// One row of the rule table. `required_roles` uses "any of" semantics.
#[derive(Debug, Clone)]
pub struct AccessRule {
    pub path: PathMatcher,
    pub methods: MethodMatcher,
    pub required_roles: Vec<Role>,
    /// Text returned to the client when the rule denies a request
    pub reason: String,
}

impl AccessRule {
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self {
            path: PathMatcher::Prefix(prefix.into()),
            methods: MethodMatcher::Any,
            required_roles: Vec::new(),
            reason: String::new(),
        }
    }

    pub fn methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.methods = MethodMatcher::OneOf(methods.into_iter().collect());
        self
    }

    pub fn require_any(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.required_roles = roles.into_iter().collect();
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    fn applies_to(&self, path: &str, method: &Method) -> bool {
        self.path.matches(path) && self.methods.matches(method)
    }

    fn admits(&self, roles: &[String]) -> bool {
        crate::auth::roles::has_any_role(roles, &self.required_roles)
    }
}

/// Outcome of evaluating the rule table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Forbidden(String),
}

/// Public allowlist plus ordered rule table.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    public: Vec<PathMatcher>,
    rules: Vec<AccessRule>,
}

impl AccessPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn public_exact(mut self, path: impl Into<String>) -> Self {
        self.public.push(PathMatcher::Exact(path.into()));
        self
    }

    pub fn public_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.public.push(PathMatcher::Prefix(prefix.into()));
        self
    }

    pub fn rule(mut self, rule: AccessRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// The school platform's policy.
    pub fn school_platform() -> Self {
        let managers = [Role::Admin, Role::SchoolManager];
        let members = [Role::Admin, Role::SchoolManager, Role::Student];

        Self::new()
            .public_exact("/api/v1/auth/ping")
            .public_exact("/api/v1/auth/login")
            .public_exact("/api/v1/auth/register")
            .public_exact("/api/v1/auth/refresh")
            .public_exact("/api/v1/auth/logout")
            .public_prefix("/api/v1/gateway")
            .public_prefix("/actuator")
            .rule(
                AccessRule::prefix("/api/v1/students/")
                    .require_any(members)
                    .reason("Insufficient role for student-service"),
            )
            .rule(
                AccessRule::prefix("/api/v1/grades")
                    .methods(write_methods())
                    .require_any(managers)
                    .reason("Only ADMIN/SCHOOL_MANAGER can write grades"),
            )
            .rule(
                AccessRule::prefix("/api/v1/grades")
                    .require_any(members)
                    .reason("Insufficient role for grade-service"),
            )
    }

    /// Public paths skip token validation and the rule table entirely.
    pub fn is_public(&self, path: &str) -> bool {
        self.public.iter().any(|m| m.matches(path))
    }

    /// First matching rule decides; no match allows.
    pub fn authorize(&self, path: &str, method: &Method, roles: &[String]) -> Decision {
        match self.rules.iter().find(|rule| rule.applies_to(path, method)) {
            Some(rule) if !rule.admits(roles) => Decision::Forbidden(rule.reason.clone()),
            _ => Decision::Allow,
        }
    }

    pub fn rules(&self) -> &[AccessRule] {
        &self.rules
    }
}

/// Whether `path` has a `.` or `..` segment, literal or percent-encoded.
///
/// Rules match the raw path while the forwarded URL is normalized, so such
/// paths never pass the gate.
pub fn has_dot_segment(path: &str) -> bool {
    path.split(['/', '\\']).any(|segment| {
        let decoded = segment.to_ascii_lowercase().replace("%2e", ".");
        decoded == "." || decoded == ".."
    })
}

/// Methods that create, update or delete.
pub fn write_methods() -> [Method; 4] {
    [Method::POST, Method::PUT, Method::PATCH, Method::DELETE]
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The service side of the trust boundary.
//!
//! Services behind the gateway do not see tokens. They read the identity the
//! gateway injected into trust headers, and only believe it when the
//! gateway's internal secret came along with it.
//!
//! Use the extractors in handlers:
//!
//! ```rust,ignore
//! async fn list_grades(identity: RequestIdentity) -> Result<Json<Vec<Grade>>, AuthError> {
//!     identity.require_any_role(&[Role::Admin, Role::SchoolManager])?;
//!     // ...
//! }
//! ```

use axum::{
    extract::{FromRef, FromRequestParts, OptionalFromRequestParts},
    http::{request::Parts, HeaderMap},
};
use subtle::ConstantTimeEq;

use crate::auth::{AuthError, Role};
use crate::headers::{X_INTERNAL_AUTH, X_ROLES, X_SCHOOL_IDS, X_USER_ID};

/// The shared secret a service expects in `X-Internal-Auth`.
#[derive(Debug, Clone, Default)]
pub struct InternalTrust {
    secret: Option<String>,
}

impl InternalTrust {
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.filter(|s| !s.trim().is_empty()),
        }
    }

    /// Whether the request came through the gateway.
    ///
    /// Without a configured secret every caller is trusted.
    pub fn verify(&self, headers: &HeaderMap) -> Result<(), AuthError> {
        let Some(expected) = &self.secret else {
            return Ok(());
        };
        let presented = headers
            .get(X_INTERNAL_AUTH)
            .map(|v| v.as_bytes())
            .unwrap_or_default();

        if bool::from(presented.ct_eq(expected.as_bytes())) {
            Ok(())
        } else {
            Err(AuthError::UntrustedCaller)
        }
    }
}

/// Identity of the caller as asserted by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestIdentity {
    pub user_id: i64,
    pub roles: Vec<String>,
    pub school_ids: Vec<i64>,
}

impl RequestIdentity {
    /// Read the identity from trust headers.
    ///
    /// Returns `Ok(None)` for anonymous requests, including requests whose
    /// identity headers are malformed.
    pub fn from_headers(headers: &HeaderMap, trust: &InternalTrust) -> Result<Option<Self>, AuthError> {
        trust.verify(headers)?;

        let Some(user_id) = header_text(headers, &X_USER_ID).filter(|s| !s.trim().is_empty()) else {
            return Ok(None);
        };
        let Ok(user_id) = user_id.trim().parse::<i64>() else {
            tracing::warn!(user_id, "Malformed X-User-Id, treating request as anonymous");
            return Ok(None);
        };

        let roles: Vec<String> = split_list(header_text(headers, &X_ROLES).unwrap_or_default())
            .map(str::to_owned)
            .collect();

        let school_ids = match split_list(header_text(headers, &X_SCHOOL_IDS).unwrap_or_default())
            .map(str::parse::<i64>)
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Malformed X-School-Ids, treating request as anonymous");
                return Ok(None);
            }
        };

        Ok(Some(Self {
            user_id,
            roles,
            school_ids,
        }))
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.iter().any(|r| r == role.as_str())
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }

    pub fn is_school_manager(&self) -> bool {
        self.has_role(Role::SchoolManager)
    }

    pub fn is_student(&self) -> bool {
        self.has_role(Role::Student)
    }

    /// Admins reach every school.
    pub fn has_school_access(&self, school_id: i64) -> bool {
        self.is_admin() || self.school_ids.contains(&school_id)
    }

    pub fn require_any_role(&self, roles: &[Role]) -> Result<(), AuthError> {
        if crate::auth::roles::has_any_role(&self.roles, roles) {
            Ok(())
        } else {
            let names: Vec<&str> = roles.iter().map(|r| r.as_str()).collect();
            Err(AuthError::InsufficientRole(format!(
                "Requires one of: {}",
                names.join(", ")
            )))
        }
    }

    pub fn require_school_access(&self, school_id: i64) -> Result<(), AuthError> {
        if self.has_school_access(school_id) {
            Ok(())
        } else {
            Err(AuthError::OutOfScope(format!(
                "School {school_id} is outside your data scope"
            )))
        }
    }

    /// Whether the caller may read a student's records.
    ///
    /// Students see only themselves; managers see students of schools in
    /// their scope (when the student's school is known); admins see all.
    pub fn authorize_student_record(
        &self,
        student_id: i64,
        school_id: Option<i64>,
    ) -> Result<(), AuthError> {
        if self.is_admin() {
            return Ok(());
        }
        if self.is_school_manager() {
            return match school_id {
                Some(school_id) => self.require_school_access(school_id),
                None => Ok(()),
            };
        }
        if self.is_student() {
            return if self.user_id == student_id {
                Ok(())
            } else {
                Err(AuthError::OutOfScope(
                    "Students may only access their own records".to_string(),
                ))
            };
        }
        Err(AuthError::InsufficientRole(
            "Insufficient role for student records".to_string(),
        ))
    }
}

fn header_text<'a>(headers: &'a HeaderMap, name: &axum::http::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

impl<S> FromRequestParts<S> for RequestIdentity
where
    InternalTrust: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(identity) = parts.extensions.get::<RequestIdentity>().cloned() {
            return Ok(identity);
        }

        let trust = InternalTrust::from_ref(state);
        let identity = RequestIdentity::from_headers(&parts.headers, &trust)?
            .ok_or(AuthError::MissingToken)?;
        parts.extensions.insert(identity.clone());
        Ok(identity)
    }
}

impl<S> OptionalFromRequestParts<S> for RequestIdentity
where
    InternalTrust: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        let trust = InternalTrust::from_ref(state);
        RequestIdentity::from_headers(&parts.headers, &trust)
    }
}

/// Optional identity; anonymous requests yield `MaybeIdentity(None)`.
///
/// An untrusted caller is still rejected.
#[derive(Debug, Clone)]
pub struct MaybeIdentity(pub Option<RequestIdentity>);

impl<S> FromRequestParts<S> for MaybeIdentity
where
    InternalTrust: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let trust = InternalTrust::from_ref(state);
        Ok(MaybeIdentity(RequestIdentity::from_headers(&parts.headers, &trust)?))
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication and authorization errors.
//!
//! These are produced locally (token validation, the rule table, or a
//! downstream scope check) and answered where they are detected. They use
//! the platform's shared codes, never the gateway's `9xxx` range.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::error::ErrorEnvelope;

/// Local rejection of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No usable `Authorization: Bearer` header
    MissingToken,
    /// Token expiry has passed
    TokenExpired,
    /// Bad signature, malformed structure or unusable claims
    TokenInvalid,
    /// Verified identity lacks every role the matching rule accepts
    InsufficientRole(String),
    /// Verified identity is outside the data scope of the resource
    OutOfScope(String),
    /// Trust headers arrived without the gateway's internal secret
    UntrustedCaller,
}

impl AuthError {
    /// Platform error code for this rejection.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "1001",
            AuthError::TokenExpired => "1002",
            AuthError::TokenInvalid => "1003",
            AuthError::InsufficientRole(_) | AuthError::OutOfScope(_) => "1004",
            AuthError::UntrustedCaller => "1005",
        }
    }

    /// Category shown in the envelope's `message`.
    pub fn category(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "Unauthorized",
            AuthError::TokenExpired => "Token expired",
            AuthError::TokenInvalid => "Token invalid",
            AuthError::InsufficientRole(_) | AuthError::OutOfScope(_) => "Forbidden",
            AuthError::UntrustedCaller => "Untrusted caller",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingToken
            | AuthError::TokenExpired
            | AuthError::TokenInvalid
            | AuthError::UntrustedCaller => StatusCode::UNAUTHORIZED,
            AuthError::InsufficientRole(_) | AuthError::OutOfScope(_) => StatusCode::FORBIDDEN,
        }
    }

    /// Whether the failure happened while establishing identity (as opposed
    /// to checking what that identity may do).
    pub fn is_authentication(&self) -> bool {
        self.status_code() == StatusCode::UNAUTHORIZED
    }

    pub fn envelope(&self, request_id: Option<String>) -> ErrorEnvelope {
        ErrorEnvelope::new(
            self.error_code(),
            self.category(),
            self.status_code(),
            Some(self.to_string()),
        )
        .with_request_id(request_id)
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingToken => write!(f, "Missing token"),
            AuthError::TokenExpired => write!(f, "Token expired"),
            AuthError::TokenInvalid => write!(f, "Invalid token"),
            AuthError::InsufficientRole(reason) | AuthError::OutOfScope(reason) => {
                write!(f, "{reason}")
            }
            AuthError::UntrustedCaller => {
                write!(f, "Request did not pass through the gateway")
            }
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        self.envelope(None).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn missing_token_returns_401() {
        let response = AuthError::MissingToken.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();
        assert_eq!(body["code"], "1001");
        assert_eq!(body["details"], "Missing token");
        assert_eq!(body["httpStatus"], 401);
    }

    #[tokio::test]
    async fn insufficient_role_returns_403() {
        let response = AuthError::InsufficientRole("no".into()).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn expired_and_invalid_are_distinct() {
        let expired = AuthError::TokenExpired.envelope(None);
        let invalid = AuthError::TokenInvalid.envelope(None);
        assert_eq!(expired.http_status, 401);
        assert_eq!(invalid.http_status, 401);
        assert_ne!(expired.code, invalid.code);
        assert_ne!(expired.message, invalid.message);
    }

    #[test]
    fn codes_never_use_gateway_range() {
        for err in [
            AuthError::MissingToken,
            AuthError::TokenExpired,
            AuthError::TokenInvalid,
            AuthError::InsufficientRole(String::new()),
            AuthError::OutOfScope(String::new()),
            AuthError::UntrustedCaller,
        ] {
            assert!(!err.error_code().starts_with('9'));
        }
    }

    #[test]
    fn forbidden_details_carry_reason() {
        let envelope = AuthError::OutOfScope("schoolId not in scope".into())
            .envelope(Some("abc".into()));
        assert_eq!(envelope.details.as_deref(), Some("schoolId not in scope"));
        assert_eq!(envelope.request_id.as_deref(), Some("abc"));
        assert!(!AuthError::OutOfScope(String::new()).is_authentication());
        assert!(AuthError::TokenExpired.is_authentication());
    }
}

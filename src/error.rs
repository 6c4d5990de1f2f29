// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Gateway failures and the error envelope returned to clients.
//!
//! Every failure that reaches a client is rendered as an [`ErrorEnvelope`].
//! Failures produced by routing and forwarding are modelled as
//! [`GatewayError`] variants and mapped to a stable gateway code by
//! [`GatewayError::classify`]. Gateway codes (`9xxx`) never overlap with the
//! codes business services return.

use std::error::Error as StdError;
use std::io;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Stable gateway error codes.
pub mod codes {
    pub const INTERNAL: &str = "9000";
    pub const ROUTE_NOT_FOUND: &str = "9001";
    pub const SERVICE_UNAVAILABLE: &str = "9002";
    pub const GATEWAY_TIMEOUT: &str = "9003";
}

/// JSON body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    /// Stable code, independent of the HTTP status
    #[schema(example = "9002")]
    pub code: String,
    /// Human-readable failure category
    #[schema(example = "Service not available")]
    pub message: String,
    /// HTTP status of the response
    #[schema(example = 503)]
    pub http_status: u16,
    /// The failure's own message, never a stack trace
    pub details: Option<String>,
    /// Correlation id echoed from `X-Request-ID`
    pub request_id: Option<String>,
}

impl ErrorEnvelope {
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
        details: Option<String>,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            http_status: status.as_u16(),
            details,
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.http_status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for ErrorEnvelope {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

/// Failures raised after the auth gate: routing, forwarding and anything
/// unexpected.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    /// A rejection that already carries its HTTP status
    #[error("{message}")]
    Status { status: StatusCode, message: String },
    /// The downstream call timed out
    #[error("{0}")]
    Timeout(String),
    /// The downstream instance could not be reached
    #[error("{0}")]
    Connection(String),
    /// The routing layer found nothing for the request
    #[error("{0}")]
    NotFound(String),
    /// A route matched but has no instance to serve it
    #[error("{0}")]
    NoInstance(String),
    /// Anything not otherwise classified
    #[error("{0}")]
    Internal(String),
}

/// Outcome of classifying a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub code: &'static str,
    pub status: StatusCode,
    pub message: &'static str,
}

impl Classification {
    /// Gateway code and category for a final HTTP status.
    pub fn for_status(status: StatusCode) -> Self {
        let (code, message) = match status {
            StatusCode::NOT_FOUND => (codes::ROUTE_NOT_FOUND, "Route not found"),
            StatusCode::SERVICE_UNAVAILABLE => (codes::SERVICE_UNAVAILABLE, "Service not available"),
            StatusCode::GATEWAY_TIMEOUT => (codes::GATEWAY_TIMEOUT, "Gateway timeout"),
            _ => (codes::INTERNAL, "Gateway internal error"),
        };
        Self {
            code,
            status,
            message,
        }
    }
}

impl GatewayError {
    pub fn status(status: StatusCode, message: impl Into<String>) -> Self {
        GatewayError::Status {
            status,
            message: message.into(),
        }
    }

    /// Map this failure to its gateway code, status and category.
    pub fn classify(&self) -> Classification {
        let status = match self {
            GatewayError::Status { status, .. } => *status,
            GatewayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Connection(_) | GatewayError::NoInstance(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            GatewayError::NotFound(message) if mentions_missing_instance(message) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Classification::for_status(status)
    }

    /// Build the client-facing envelope for this failure.
    pub fn envelope(&self, request_id: Option<String>) -> ErrorEnvelope {
        let class = self.classify();
        ErrorEnvelope::new(class.code, class.message, class.status, Some(self.to_string()))
            .with_request_id(request_id)
    }

    /// Build a gateway error from an arbitrary failure by walking its whole
    /// `source()` chain.
    ///
    /// Transport clients wrap the root cause (a refused socket, an elapsed
    /// deadline) in several layers, so the outermost type says little. A
    /// timeout anywhere in the chain wins over a connection failure anywhere
    /// in the chain. The outermost message is kept as the details.
    pub fn from_cause_chain(err: &(dyn StdError + 'static)) -> Self {
        if let Some(gateway) = err.downcast_ref::<GatewayError>() {
            return gateway.clone();
        }

        let message = err.to_string();
        if chain(err).any(is_timeout) {
            GatewayError::Timeout(message)
        } else if chain(err).any(is_connection_failure) {
            GatewayError::Connection(message)
        } else {
            GatewayError::Internal(message)
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::from_cause_chain(&err)
    }
}

impl From<io::Error> for GatewayError {
    fn from(err: io::Error) -> Self {
        GatewayError::from_cause_chain(&err)
    }
}

impl IntoResponse for GatewayError {
    /// Renders a provisional envelope and carries the failure itself in the
    /// response extensions, where the error boundary picks it up and writes
    /// the final, request-aware envelope.
    fn into_response(self) -> Response {
        let mut response = self.envelope(None).into_response();
        response.extensions_mut().insert(self);
        response
    }
}

/// Routing collaborators report a missing instance only in free text.
fn mentions_missing_instance(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("unable to find instance") || lower.contains("no instance")
}

/// Iterate over an error and every error beneath it.
fn chain<'a>(err: &'a (dyn StdError + 'static)) -> impl Iterator<Item = &'a (dyn StdError + 'static)> {
    std::iter::successors(Some(err), |current| next_cause(*current))
}

fn next_cause<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a (dyn StdError + 'static)> {
    // io::Error::source() skips over a custom payload; descend into it directly.
    if let Some(io_err) = err.downcast_ref::<io::Error>() {
        if let Some(inner) = io_err.get_ref() {
            let inner: &(dyn StdError + 'static) = inner;
            return Some(inner);
        }
    }
    err.source()
}

fn is_timeout(err: &(dyn StdError + 'static)) -> bool {
    if let Some(e) = err.downcast_ref::<reqwest::Error>() {
        return e.is_timeout();
    }
    if let Some(e) = err.downcast_ref::<io::Error>() {
        return e.kind() == io::ErrorKind::TimedOut;
    }
    err.is::<tokio::time::error::Elapsed>()
}

fn is_connection_failure(err: &(dyn StdError + 'static)) -> bool {
    if let Some(e) = err.downcast_ref::<reqwest::Error>() {
        return e.is_connect();
    }
    if let Some(e) = err.downcast_ref::<io::Error>() {
        return matches!(
            e.kind(),
            io::ErrorKind::ConnectionRefused
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::NotConnected
        );
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use std::time::Duration;

    #[derive(Debug, thiserror::Error)]
    #[error("{context}")]
    struct Wrapped {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    }

    fn wrap(context: &str, source: impl StdError + Send + Sync + 'static) -> Wrapped {
        Wrapped {
            context: context.to_string(),
            source: Box::new(source),
        }
    }

    #[test]
    fn timeout_three_levels_deep_is_gateway_timeout() {
        let root = io::Error::new(io::ErrorKind::TimedOut, "read timed out");
        let err = wrap("request failed", wrap("exchange failed", wrap("pool error", root)));

        let gateway = GatewayError::from_cause_chain(&err);
        assert!(matches!(gateway, GatewayError::Timeout(_)));

        let class = gateway.classify();
        assert_eq!(class.code, "9003");
        assert_eq!(class.status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(class.message, "Gateway timeout");
        assert_eq!(gateway.to_string(), "request failed");
    }

    #[test]
    fn connection_refused_is_service_unavailable() {
        let err = io::Error::new(io::ErrorKind::ConnectionRefused, "Connection refused");
        let gateway = GatewayError::from(err);

        let class = gateway.classify();
        assert_eq!(class.code, "9002");
        assert_eq!(class.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(class.message, "Service not available");
    }

    #[test]
    fn io_payload_is_searched() {
        let inner = io::Error::new(io::ErrorKind::TimedOut, "deadline");
        let outer = io::Error::new(io::ErrorKind::Other, wrap("handshake", inner));
        assert!(matches!(
            GatewayError::from(outer),
            GatewayError::Timeout(_)
        ));
    }

    #[test]
    fn timeout_wins_over_connection_failure() {
        let root = io::Error::new(io::ErrorKind::TimedOut, "connect timed out");
        let err = io::Error::new(io::ErrorKind::ConnectionReset, wrap("reset", root));
        assert!(matches!(
            GatewayError::from_cause_chain(&err),
            GatewayError::Timeout(_)
        ));
    }

    #[tokio::test]
    async fn elapsed_deadline_is_timeout() {
        let elapsed = tokio::time::timeout(Duration::from_millis(1), std::future::pending::<()>())
            .await
            .unwrap_err();
        let err = wrap("upstream call", elapsed);
        assert_eq!(GatewayError::from_cause_chain(&err).classify().code, "9003");
    }

    #[test]
    fn no_instance_text_is_service_unavailable() {
        for message in [
            "Unable to find instance for grade-service",
            "503 SERVICE_UNAVAILABLE \"No Instance available\"",
        ] {
            let class = GatewayError::NotFound(message.to_string()).classify();
            assert_eq!(class.code, "9002", "{message}");
            assert_eq!(class.status, StatusCode::SERVICE_UNAVAILABLE);
        }
        assert_eq!(
            GatewayError::NoInstance("grade-service".into()).classify().code,
            "9002"
        );
    }

    #[test]
    fn other_not_found_is_route_not_found() {
        let class = GatewayError::NotFound("No route matched GET /api/v9/x".into()).classify();
        assert_eq!(class.code, "9001");
        assert_eq!(class.status, StatusCode::NOT_FOUND);
        assert_eq!(class.message, "Route not found");
    }

    #[test]
    fn unclassified_failure_is_internal() {
        let err = wrap("decoder exploded", io::Error::new(io::ErrorKind::InvalidData, "bad"));
        let class = GatewayError::from_cause_chain(&err).classify();
        assert_eq!(class.code, "9000");
        assert_eq!(class.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(class.message, "Gateway internal error");
    }

    #[test]
    fn explicit_status_is_used_verbatim() {
        let class = GatewayError::status(StatusCode::PAYLOAD_TOO_LARGE, "too big").classify();
        assert_eq!(class.status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(class.code, "9000");

        let class = GatewayError::status(StatusCode::NOT_FOUND, "gone").classify();
        assert_eq!(class.code, "9001");
    }

    #[test]
    fn explicit_status_survives_chain_walk() {
        let err = GatewayError::status(StatusCode::BAD_REQUEST, "bad body");
        let rebuilt = GatewayError::from_cause_chain(&err);
        assert_eq!(rebuilt.classify().status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn envelope_uses_own_message_as_details() {
        let envelope = GatewayError::Connection("tcp connect error".into())
            .envelope(Some("req-1".into()));
        assert_eq!(envelope.code, "9002");
        assert_eq!(envelope.http_status, 503);
        assert_eq!(envelope.details.as_deref(), Some("tcp connect error"));
        assert_eq!(envelope.request_id.as_deref(), Some("req-1"));
    }

    #[tokio::test]
    async fn into_response_renders_envelope_and_keeps_failure() {
        let response = GatewayError::Timeout("slow".into()).into_response();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert!(response.extensions().get::<GatewayError>().is_some());

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], "9003");
        assert_eq!(json["httpStatus"], 504);
        assert_eq!(json["details"], "slow");
        assert!(json["requestId"].is_null());
    }
}

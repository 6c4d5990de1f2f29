// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The gateway filter: authentication and coarse authorization at the edge.
//!
//! Every request not on the public allowlist must carry a valid bearer token
//! and pass the access policy before it is forwarded. The first failing step
//! answers the request locally and nothing reaches downstream.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::auth::{AuthError, TokenValidator};
use crate::error::GatewayError;
use crate::headers::{sanitize_public, TrustHeaders};
use crate::policy::{has_dot_segment, AccessPolicy, Decision};
use crate::response::{abort_committed, AlreadyCommitted, ResponseWriter};

/// Outcome of a request that passed the gate.
#[derive(Debug)]
pub enum Admission {
    /// Public path: no token was read and no identity was attached
    PublicBypass(Request),
    /// Verified identity, trust headers rewritten
    Forward(Request),
}

impl Admission {
    pub fn into_request(self) -> Request {
        match self {
            Admission::PublicBypass(request) | Admission::Forward(request) => request,
        }
    }
}

/// Validator, policy and header rewriting combined into one decision.
#[derive(Debug, Clone)]
pub struct GatewayGate {
    validator: TokenValidator,
    policy: AccessPolicy,
    internal_secret: Option<String>,
}

impl GatewayGate {
    pub fn new(
        validator: TokenValidator,
        policy: AccessPolicy,
        internal_secret: Option<String>,
    ) -> Self {
        Self {
            validator,
            policy,
            internal_secret,
        }
    }

    pub fn validator(&self) -> &TokenValidator {
        &self.validator
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    /// Run the request through the gate.
    ///
    /// Never suspends. On success the returned request carries the rewritten
    /// trust headers and, unless public, the verified
    /// [`IdentityClaims`](crate::auth::IdentityClaims) in its extensions.
    pub fn admit(&self, mut request: Request) -> Result<Admission, AuthError> {
        let path = request.uri().path().to_owned();

        if self.policy.is_public(&path) {
            sanitize_public(request.headers_mut(), self.internal_secret.as_deref());
            return Ok(Admission::PublicBypass(request));
        }

        let authorization = request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        let identity = self.validator.validate(authorization)?;

        if let Decision::Forbidden(reason) =
            self.policy.authorize(&path, request.method(), &identity.roles)
        {
            return Err(AuthError::InsufficientRole(reason));
        }

        TrustHeaders::from_claims(&identity, self.internal_secret.as_deref(), request.headers())
            .apply(request.headers_mut())?;

        tracing::debug!(
            user_id = identity.subject.as_deref(),
            roles = ?identity.roles,
            %path,
            "Request admitted"
        );
        request.extensions_mut().insert(identity);

        Ok(Admission::Forward(request))
    }
}

/// Middleware wrapping [`GatewayGate::admit`].
///
/// Paths with dot segments are refused with a 400 before the gate runs, so
/// the path the rules see is the path that is forwarded. Rejections are
/// written through the request's [`ResponseWriter`] and the chain stops
/// there.
pub async fn gateway_filter(
    State(gate): State<Arc<GatewayGate>>,
    request: Request,
    next: Next,
) -> Response {
    let writer = request
        .extensions()
        .get::<ResponseWriter>()
        .cloned()
        .unwrap_or_else(|| ResponseWriter::for_request(&request));
    let method = request.method().clone();
    let path = request.uri().path().to_owned();

    if has_dot_segment(&path) {
        return GatewayError::status(
            StatusCode::BAD_REQUEST,
            format!("Path {path} contains dot segments"),
        )
        .into_response();
    }

    match gate.admit(request) {
        Ok(admission) => next.run(admission.into_request()).await,
        Err(rejection) => {
            tracing::warn!(
                request_id = writer.request_id(),
                %method,
                %path,
                status = rejection.status_code().as_u16(),
                code = rejection.error_code(),
                authentication = rejection.is_authentication(),
                reason = %rejection,
                "Request rejected at gateway"
            );
            match writer.write(rejection.envelope(None)) {
                Ok(written) => written,
                Err(AlreadyCommitted) => {
                    tracing::warn!(
                        request_id = writer.request_id(),
                        %path,
                        "Response already committed, dropping rejection"
                    );
                    abort_committed(StatusCode::INTERNAL_SERVER_ERROR.into_response())
                }
            }
        }
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Trust headers exchanged between the gateway and downstream services.
//!
//! Downstream services believe these headers only because the gateway sets
//! them. Whatever a client sends under these names is dropped before the
//! verified values are written.

use axum::http::{
    header::{HeaderName, AUTHORIZATION},
    HeaderMap, HeaderValue,
};

use crate::auth::{AuthError, IdentityClaims};

pub const X_USER_ID: HeaderName = HeaderName::from_static("x-user-id");
pub const X_ROLES: HeaderName = HeaderName::from_static("x-roles");
pub const X_SCHOOL_IDS: HeaderName = HeaderName::from_static("x-school-ids");
pub const X_INTERNAL_AUTH: HeaderName = HeaderName::from_static("x-internal-auth");
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Headers only the gateway may set.
pub const IDENTITY_HEADERS: [HeaderName; 4] = [X_USER_ID, X_ROLES, X_SCHOOL_IDS, X_INTERNAL_AUTH];

/// Headers removed from every authenticated request before forwarding.
pub const STRIPPED_HEADERS: [HeaderName; 5] =
    [AUTHORIZATION, X_USER_ID, X_ROLES, X_SCHOOL_IDS, X_INTERNAL_AUTH];

/// Correlation id of a request, if the client (or an upstream hop) sent one.
pub fn request_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .map(str::to_owned)
}

/// The header set handed to downstream services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustHeaders {
    pub user_id: Option<String>,
    pub roles: String,
    pub school_ids: String,
    pub internal_secret: Option<String>,
    pub request_id: Option<String>,
}

impl TrustHeaders {
    /// Compute the trust headers from verified claims.
    ///
    /// `inbound` is only consulted for the correlation id, which is passed
    /// through as-is and never generated here.
    pub fn from_claims(
        claims: &IdentityClaims,
        internal_secret: Option<&str>,
        inbound: &HeaderMap,
    ) -> Self {
        let school_ids = claims
            .school_ids
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(",");

        Self {
            user_id: claims
                .subject
                .clone()
                .filter(|s| !s.trim().is_empty()),
            roles: claims.roles.join(","),
            school_ids,
            internal_secret: internal_secret
                .filter(|s| !s.trim().is_empty())
                .map(str::to_owned),
            request_id: request_id(inbound),
        }
    }

    /// Strip client-supplied trust headers, then write the verified ones.
    ///
    /// A claim that cannot be carried in a header means the token carried
    /// unusable claims, which is reported as an invalid token.
    pub fn apply(&self, headers: &mut HeaderMap) -> Result<(), AuthError> {
        for name in STRIPPED_HEADERS {
            headers.remove(name);
        }

        if let Some(user_id) = &self.user_id {
            headers.insert(X_USER_ID, header_value(user_id)?);
        }
        headers.insert(X_ROLES, header_value(&self.roles)?);
        headers.insert(X_SCHOOL_IDS, header_value(&self.school_ids)?);

        if let Some(secret) = &self.internal_secret {
            headers.insert(X_INTERNAL_AUTH, header_value(secret)?);
        }
        if let Some(request_id) = &self.request_id {
            headers.insert(X_REQUEST_ID, header_value(request_id)?);
        }

        Ok(())
    }
}

/// Sanitize a request on the public allowlist.
///
/// `Authorization` is kept (refresh and logout read it) but identity headers
/// are dropped, so an anonymous request can never claim an identity.
pub fn sanitize_public(headers: &mut HeaderMap, internal_secret: Option<&str>) {
    for name in IDENTITY_HEADERS {
        headers.remove(name);
    }
    if let Some(secret) = internal_secret
        .filter(|s| !s.trim().is_empty())
        .and_then(|s| HeaderValue::from_str(s).ok())
    {
        headers.insert(X_INTERNAL_AUTH, secret);
    }
}

fn header_value(value: &str) -> Result<HeaderValue, AuthError> {
    HeaderValue::from_str(value).map_err(|_| AuthError::TokenInvalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims() -> IdentityClaims {
        IdentityClaims {
            subject: Some("42".into()),
            roles: vec!["SCHOOL_MANAGER".into(), "STUDENT".into()],
            school_ids: vec![3, 8],
        }
    }

    fn spoofed() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        headers.insert(X_USER_ID, HeaderValue::from_static("1"));
        headers.append(X_USER_ID, HeaderValue::from_static("2"));
        headers.insert(X_ROLES, HeaderValue::from_static("ADMIN"));
        headers.insert(X_SCHOOL_IDS, HeaderValue::from_static("1,2,3,4"));
        headers.insert(X_INTERNAL_AUTH, HeaderValue::from_static("guess"));
        headers.insert("accept", HeaderValue::from_static("application/json"));
        headers
    }

    #[test]
    fn spoofed_headers_are_replaced() {
        let mut headers = spoofed();
        TrustHeaders::from_claims(&claims(), Some("s3cret"), &headers)
            .apply(&mut headers)
            .unwrap();

        assert!(headers.get(AUTHORIZATION).is_none());
        assert_eq!(headers.get_all(X_USER_ID).iter().count(), 1);
        assert_eq!(headers[X_USER_ID], "42");
        assert_eq!(headers[X_ROLES], "SCHOOL_MANAGER,STUDENT");
        assert_eq!(headers[X_SCHOOL_IDS], "3,8");
        assert_eq!(headers[X_INTERNAL_AUTH], "s3cret");
        assert_eq!(headers["accept"], "application/json");
    }

    #[test]
    fn optional_headers_are_not_invented() {
        let mut headers = spoofed();
        let claims = IdentityClaims {
            subject: Some("  ".into()),
            roles: Vec::new(),
            school_ids: Vec::new(),
        };
        TrustHeaders::from_claims(&claims, Some(""), &headers)
            .apply(&mut headers)
            .unwrap();

        assert!(headers.get(X_USER_ID).is_none());
        assert!(headers.get(X_INTERNAL_AUTH).is_none());
        assert!(headers.get(X_REQUEST_ID).is_none());
        assert_eq!(headers[X_ROLES], "");
        assert_eq!(headers[X_SCHOOL_IDS], "");
    }

    #[test]
    fn request_id_is_passed_through_unchanged() {
        let mut headers = HeaderMap::new();
        headers.insert(X_REQUEST_ID, HeaderValue::from_static("req-7f3a"));
        let trust = TrustHeaders::from_claims(&claims(), None, &headers);
        assert_eq!(trust.request_id.as_deref(), Some("req-7f3a"));

        trust.apply(&mut headers).unwrap();
        assert_eq!(headers[X_REQUEST_ID], "req-7f3a");
    }

    #[test]
    fn blank_request_id_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(X_REQUEST_ID, HeaderValue::from_static("  "));
        assert_eq!(request_id(&headers), None);
    }

    #[test]
    fn public_requests_keep_authorization_only() {
        let mut headers = spoofed();
        sanitize_public(&mut headers, Some("s3cret"));

        assert_eq!(headers[AUTHORIZATION], "Bearer abc");
        assert!(headers.get(X_USER_ID).is_none());
        assert!(headers.get(X_ROLES).is_none());
        assert!(headers.get(X_SCHOOL_IDS).is_none());
        assert_eq!(headers[X_INTERNAL_AUTH], "s3cret");

        let mut headers = spoofed();
        sanitize_public(&mut headers, None);
        assert!(headers.get(X_INTERNAL_AUTH).is_none());
    }

    #[test]
    fn unrepresentable_claim_is_invalid_token() {
        let claims = IdentityClaims {
            subject: Some("4\n2".into()),
            ..Default::default()
        };
        let mut headers = HeaderMap::new();
        assert_eq!(
            TrustHeaders::from_claims(&claims, None, &headers).apply(&mut headers),
            Err(AuthError::TokenInvalid)
        );
    }
}

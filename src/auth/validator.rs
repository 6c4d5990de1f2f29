// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bearer token verification.
//!
//! Tokens are HMAC-signed by the identity service with the shared secret held
//! in [`KeyMaterialCache`]. Verification is synchronous and never suspends:
//! the key is derived in memory and no key set is fetched over the network.

use std::sync::Arc;

use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, Validation};

use super::claims::{IdentityClaims, TokenClaims};
use super::error::AuthError;
use super::key::KeyMaterialCache;

/// Literal scheme prefix of the `Authorization` header.
pub const BEARER_PREFIX: &str = "Bearer ";

/// Verifies bearer tokens and extracts the caller's identity.
#[derive(Clone)]
pub struct TokenValidator {
    keys: Arc<KeyMaterialCache>,
    validation: Validation,
}

impl TokenValidator {
    pub fn new(keys: Arc<KeyMaterialCache>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        // Expiry is checked when present but not demanded, and without skew.
        validation.leeway = 0;
        validation.set_required_spec_claims::<&str>(&[]);
        validation.validate_aud = false;

        Self { keys, validation }
    }

    pub fn keys(&self) -> &KeyMaterialCache {
        &self.keys
    }

    /// Validate the raw `Authorization` header value.
    pub fn validate(&self, authorization: Option<&str>) -> Result<IdentityClaims, AuthError> {
        let token = authorization
            .filter(|value| !value.trim().is_empty())
            .and_then(|value| value.strip_prefix(BEARER_PREFIX))
            .ok_or(AuthError::MissingToken)?
            .trim();

        self.verify(token)
    }

    /// Verify a bare token (no scheme prefix).
    pub fn verify(&self, token: &str) -> Result<IdentityClaims, AuthError> {
        let key = self.keys.get_key().map_err(|e| {
            tracing::error!(error = %e, "Token key material unavailable");
            AuthError::TokenInvalid
        })?;

        let data = decode::<TokenClaims>(token, key.decoding_key(), &self.validation).map_err(
            |e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => {
                    tracing::debug!(error = %e, "Token rejected");
                    AuthError::TokenInvalid
                }
            },
        )?;

        Ok(IdentityClaims::from_claims(data.claims))
    }
}

impl std::fmt::Debug for TokenValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenValidator")
            .field("keys", &self.keys)
            .field("algorithms", &self.validation.algorithms)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::key::decode_secret;
    use crate::test_support::{sign_token, TEST_SECRET};
    use base64ct::{Base64, Encoding};
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    fn validator(secret: &str) -> TokenValidator {
        TokenValidator::new(Arc::new(KeyMaterialCache::new(secret)))
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    #[test]
    fn missing_or_foreign_scheme_is_missing_token() {
        let v = validator(TEST_SECRET);
        assert_eq!(v.validate(None), Err(AuthError::MissingToken));
        assert_eq!(v.validate(Some("   ")), Err(AuthError::MissingToken));
        assert_eq!(v.validate(Some("Basic dXNlcjpwYXNz")), Err(AuthError::MissingToken));
        assert_eq!(v.validate(Some("bearer abc")), Err(AuthError::MissingToken));
        assert_eq!(v.validate(Some("Bearer")), Err(AuthError::MissingToken));
    }

    #[test]
    fn valid_token_yields_identity() {
        let token = sign_token(json!({
            "sub": "17",
            "roles": ["SCHOOL_MANAGER"],
            "dataScope": {"schoolIds": [1, 2]},
            "exp": now() + 600
        }));

        let id = validator(TEST_SECRET)
            .validate(Some(&format!("Bearer {token}")))
            .unwrap();
        assert_eq!(id.subject.as_deref(), Some("17"));
        assert_eq!(id.roles, vec!["SCHOOL_MANAGER"]);
        assert_eq!(id.school_ids, vec![1, 2]);
    }

    #[test]
    fn token_text_is_trimmed() {
        let token = sign_token(json!({"sub": "1", "exp": now() + 600}));
        let id = validator(TEST_SECRET)
            .validate(Some(&format!("Bearer   {token}  ")))
            .unwrap();
        assert_eq!(id.subject.as_deref(), Some("1"));
    }

    #[test]
    fn expired_token_is_distinct_from_invalid() {
        let token = sign_token(json!({"sub": "1", "exp": now() - 5}));
        assert_eq!(
            validator(TEST_SECRET).validate(Some(&format!("Bearer {token}"))),
            Err(AuthError::TokenExpired)
        );
    }

    #[test]
    fn token_without_expiry_is_accepted() {
        let token = sign_token(json!({"sub": "9"}));
        assert!(validator(TEST_SECRET).verify(&token).is_ok());
    }

    #[test]
    fn garbage_and_bad_signatures_are_invalid() {
        let v = validator(TEST_SECRET);
        assert_eq!(v.verify("not-a-jwt"), Err(AuthError::TokenInvalid));

        let other_secret = "ffeeddccbbaa99887766554433221100ffeeddccbbaa99887766554433221100";
        let forged = encode(
            &Header::default(),
            &json!({"sub": "1", "exp": now() + 600}),
            &EncodingKey::from_secret(&decode_secret(other_secret).unwrap()),
        )
        .unwrap();
        assert_eq!(v.verify(&forged), Err(AuthError::TokenInvalid));
    }

    #[test]
    fn hs512_tokens_are_accepted() {
        let raw = decode_secret(TEST_SECRET).unwrap();
        let token = encode(
            &Header::new(Algorithm::HS512),
            &json!({"sub": "5", "exp": now() + 600}),
            &EncodingKey::from_secret(&raw),
        )
        .unwrap();
        assert!(validator(TEST_SECRET).verify(&token).is_ok());
    }

    #[test]
    fn hex_and_base64_secrets_verify_tokens_signed_with_raw_bytes() {
        let raw: Vec<u8> = (100u8..148).collect();
        let hex_secret = hex::encode(&raw);
        let b64_secret = Base64::encode_string(&raw);
        assert_eq!(decode_secret(&hex_secret).unwrap(), raw);
        assert_eq!(hex::encode(decode_secret(&hex_secret).unwrap()), hex_secret);
        assert_eq!(decode_secret(&b64_secret).unwrap(), raw);

        let token = encode(
            &Header::default(),
            &json!({"sub": "3", "exp": now() + 600}),
            &EncodingKey::from_secret(&raw),
        )
        .unwrap();

        assert!(validator(&hex_secret).verify(&token).is_ok());
        assert!(validator(&b64_secret).verify(&token).is_ok());
    }

    #[test]
    fn unusable_key_rejects_without_panicking() {
        let token = sign_token(json!({"sub": "1"}));
        assert_eq!(validator("short").verify(&token), Err(AuthError::TokenInvalid));
    }
}

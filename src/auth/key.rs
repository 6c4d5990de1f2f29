// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Verification key derivation and caching.
//!
//! The identity issuer signs tokens with an HMAC secret shared with the
//! gateway. The secret is configured as text and decoded as follows:
//!
//! - an even-length string made only of hex digits is decoded as raw hex;
//! - anything else is decoded as standard (padded) base64.
//!
//! The key is derived once per process and shared read-only afterwards.

use std::sync::OnceLock;

use base64ct::{Base64, Base64Unpadded, Encoding};
use jsonwebtoken::DecodingKey;
use thiserror::Error;

/// Minimum HMAC key length accepted by the issuer (256 bits).
pub const MIN_KEY_BYTES: usize = 32;

/// Errors raised while deriving the verification key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    /// The configured secret is empty
    #[error("token secret is empty")]
    Empty,
    /// The secret is neither hex nor valid base64
    #[error("token secret is not valid hex or base64: {0}")]
    Undecodable(String),
    /// The decoded key is shorter than the HMAC-SHA minimum
    #[error("token secret decodes to {bits} bits, at least 256 are required")]
    TooShort { bits: usize },
}

/// Key material used to verify token signatures.
pub struct KeyMaterial {
    decoding: DecodingKey,
    len: usize,
}

impl KeyMaterial {
    /// Derive key material from a configured secret.
    pub fn derive(secret: &str) -> Result<Self, KeyError> {
        let raw = decode_secret(secret)?;
        if raw.len() < MIN_KEY_BYTES {
            return Err(KeyError::TooShort {
                bits: raw.len() * 8,
            });
        }

        Ok(Self {
            decoding: DecodingKey::from_secret(&raw),
            len: raw.len(),
        })
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }

    /// Key length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

/// Lazily derived, process-wide verification key.
///
/// The first call to [`KeyMaterialCache::get_key`] derives the key; every
/// later call (from any task) observes the same outcome. A failed derivation
/// is cached as well, since the secret cannot change at runtime.
pub struct KeyMaterialCache {
    secret: String,
    cell: OnceLock<Result<KeyMaterial, KeyError>>,
}

impl KeyMaterialCache {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            cell: OnceLock::new(),
        }
    }

    /// Get the cached key, deriving it on first access.
    pub fn get_key(&self) -> Result<&KeyMaterial, KeyError> {
        self.cell
            .get_or_init(|| KeyMaterial::derive(&self.secret))
            .as_ref()
            .map_err(Clone::clone)
    }

    /// Whether a usable key has already been derived.
    pub fn is_ready(&self) -> bool {
        matches!(self.cell.get(), Some(Ok(_)))
    }
}

impl std::fmt::Debug for KeyMaterialCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterialCache")
            .field("ready", &self.is_ready())
            .finish_non_exhaustive()
    }
}

/// Decode a configured secret into raw key bytes.
pub fn decode_secret(secret: &str) -> Result<Vec<u8>, KeyError> {
    let trimmed = secret.trim();
    if trimmed.is_empty() {
        return Err(KeyError::Empty);
    }

    if looks_like_hex(trimmed) {
        return hex::decode(trimmed).map_err(|e| KeyError::Undecodable(e.to_string()));
    }

    // Padding is optional.
    Base64::decode_vec(trimmed)
        .or_else(|_| Base64Unpadded::decode_vec(trimmed))
        .map_err(|e| KeyError::Undecodable(e.to_string()))
}

fn looks_like_hex(s: &str) -> bool {
    s.len() % 2 == 0 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

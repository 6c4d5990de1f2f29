// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Bearer token verification for the gateway.
//!
//! ## Auth Flow
//!
//! 1. The identity service issues an HMAC-signed token at login
//! 2. Clients send `Authorization: Bearer <token>`
//! 3. The gateway:
//!    - derives the verification key once from `JWT_SECRET` (hex or base64)
//!    - verifies signature and expiry
//!    - extracts:
//!      - `sub` → user id
//!      - `roles` → role names
//!      - `dataScope.schoolIds` → schools the user may access
//!
//! ## Security
//!
//! - All non-public paths require a valid token
//! - No clock skew tolerance on expiry
//! - Verification never blocks or touches the network

pub mod claims;
pub mod error;
pub mod key;
pub mod roles;
pub mod validator;

pub use claims::IdentityClaims;
pub use error::AuthError;
pub use key::{KeyError, KeyMaterialCache};
pub use roles::Role;
pub use validator::TokenValidator;

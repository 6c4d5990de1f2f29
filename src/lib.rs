// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! School Gateway - authenticating edge gateway for the school platform
//!
//! Every request is authenticated with a bearer token, checked against a
//! coarse role policy, stripped of client-supplied trust headers and
//! forwarded with the verified identity. Every failure, local or downstream,
//! is answered with one stable JSON error envelope.
//!
//! ## Modules
//!
//! - `auth` - Token key, validation, claims and roles
//! - `policy` - Public allowlist and role rules
//! - `headers` - Trust header sanitizing and injection
//! - `filter` - The gateway filter middleware
//! - `error` - Gateway error model and classification
//! - `response` - At-most-once response writer and error boundary
//! - `proxy` - Route table and downstream forwarding
//! - `identity` - Trust header consumer for services behind the gateway
//! - `api` - Router, status and health endpoints

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod filter;
pub mod headers;
pub mod identity;
pub mod logging;
pub mod policy;
pub mod proxy;
pub mod response;
pub mod state;

#[cfg(test)]
pub(crate) mod test_support;

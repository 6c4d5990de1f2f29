// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared helpers for unit tests.

use std::net::SocketAddr;

use axum::{body::to_bytes, response::Response, Router};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::Value;

use crate::auth::key::decode_secret;
use crate::config::{GatewayConfig, JWT_SECRET_ENV, ROUTES_ENV};

/// 256-bit hex secret.
pub(crate) const TEST_SECRET: &str =
    "00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff";

/// Sign `claims` with [`TEST_SECRET`] using HS256.
pub(crate) fn sign_token(claims: Value) -> String {
    let key = decode_secret(TEST_SECRET).unwrap();
    encode(&Header::default(), &claims, &EncodingKey::from_secret(&key)).unwrap()
}

/// Configuration with the test secret and the default routes.
pub(crate) fn test_config() -> GatewayConfig {
    test_config_with_routes("")
}

/// Configuration with the test secret and `routes` as `GATEWAY_ROUTES`.
pub(crate) fn test_config_with_routes(routes: &str) -> GatewayConfig {
    let routes = routes.to_string();
    GatewayConfig::from_lookup(|name| match name {
        JWT_SECRET_ENV => Some(TEST_SECRET.to_string()),
        ROUTES_ENV => Some(routes.clone()),
        _ => None,
    })
    .unwrap()
}

/// Serve `router` on a loopback port and return its address.
pub(crate) async fn spawn_downstream(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

pub(crate) async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

/// Health check response with individual component status.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReadyResponse {
    /// Overall health status ("ok" or "degraded").
    pub status: String,
    /// Individual health checks and their results.
    pub checks: HealthChecks,
}

/// Individual health check results.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthChecks {
    /// Whether the service process is running.
    pub service: String,
    /// Token verification key ("ok" or "unavailable").
    pub key_material: String,
    /// Route table ("ok" when at least one route has an instance).
    pub routes: String,
}

/// Simple health check response for liveness probes.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

fn check(ok: bool, failed: &str) -> String {
    let text = if ok { "ok" } else { failed };
    text.to_string()
}

/// Health check endpoint handler.
///
/// Returns 200 if all checks pass, 503 if any check fails.
#[utoipa::path(
    get,
    path = "/actuator/health",
    tag = "Health",
    responses(
        (status = 200, description = "Gateway is healthy", body = ReadyResponse),
        (status = 503, description = "Gateway is degraded", body = ReadyResponse)
    )
)]
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let key_ok = state.keys.is_ready();
    let routes_ok = state.proxy.routes().has_instances();
    let all_ok = key_ok && routes_ok;

    let response = ReadyResponse {
        status: check(all_ok, "degraded"),
        checks: HealthChecks {
            service: "ok".to_string(),
            key_material: check(key_ok, "unavailable"),
            routes: check(routes_ok, "no instances"),
        },
    };

    let status = if all_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response))
}

/// Liveness probe handler.
///
/// Always returns 200 if the process is running.
#[utoipa::path(
    get,
    path = "/actuator/health/liveness",
    tag = "Health",
    responses(
        (status = 200, description = "Gateway is alive", body = HealthResponse)
    )
)]
pub async fn liveness() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Readiness probe handler.
///
/// Returns 200 only if the gateway can verify tokens and reach a route.
#[utoipa::path(
    get,
    path = "/actuator/health/readiness",
    tag = "Health",
    responses(
        (status = 200, description = "Gateway is ready", body = ReadyResponse),
        (status = 503, description = "Gateway is not ready", body = ReadyResponse)
    )
)]
pub async fn readiness(state: State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    health(state).await
}

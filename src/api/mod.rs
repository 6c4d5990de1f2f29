// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{middleware, routing::get, Json, Router};
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;

use crate::{
    error::ErrorEnvelope,
    filter::gateway_filter,
    proxy,
    response::{error_boundary, panic_envelope},
    state::AppState,
};

pub mod health;
pub mod status;

/// Gateway endpoints, with everything else forwarded downstream.
///
/// Layer order, outermost first: CORS, tracing, error boundary, panic
/// catcher, gateway filter.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/gateway/status", get(status::gateway_status))
        .route("/api/v1/gateway/openapi.json", get(openapi_json))
        .route("/actuator/health", get(health::health))
        .route("/actuator/health/liveness", get(health::liveness))
        .route("/actuator/health/readiness", get(health::readiness))
        .fallback(proxy::forward)
        .layer(middleware::from_fn_with_state(state.gate.clone(), gateway_filter))
        .with_state(state)
        .layer(CatchPanicLayer::custom(panic_envelope))
        .layer(middleware::from_fn(error_boundary))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        status::gateway_status,
        health::health,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            ErrorEnvelope,
            status::GatewayStatus,
            status::RouteSummary,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    tags(
        (name = "Gateway", description = "Gateway status and route table"),
        (name = "Health", description = "Liveness and readiness probes")
    )
)]
struct ApiDoc;

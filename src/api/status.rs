// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

/// One entry of the route table.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouteSummary {
    #[schema(example = "grade-service")]
    pub service: String,
    #[schema(example = "/api/v1/grades")]
    pub prefix: String,
    /// Number of configured instances
    pub instances: usize,
}

/// Gateway identity and route table.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GatewayStatus {
    pub service: String,
    pub version: String,
    pub started_at: DateTime<Utc>,
    pub uptime_seconds: i64,
    pub routes: Vec<RouteSummary>,
}

#[utoipa::path(
    get,
    path = "/api/v1/gateway/status",
    tag = "Gateway",
    responses(
        (status = 200, description = "Gateway status", body = GatewayStatus)
    )
)]
pub async fn gateway_status(State(state): State<AppState>) -> Json<GatewayStatus> {
    let routes = state
        .proxy
        .routes()
        .routes()
        .iter()
        .map(|route| RouteSummary {
            service: route.service().to_string(),
            prefix: route.prefix().to_string(),
            instances: route.instances().len(),
        })
        .collect();

    Json(GatewayStatus {
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        started_at: state.started_at,
        uptime_seconds: (Utc::now() - state.started_at).num_seconds(),
        routes,
    })
}

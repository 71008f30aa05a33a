// src/routes/health.rs
//! Node health check endpoint.
//!
//! This module defines the `/health` route used by collectors and monitoring
//! to verify that the node is serving requests, and to see its connectivity
//! state and how much history it currently retains. It is a sibling module in
//! the `routes` directory:
//! - Internal to this file: endpoint handler(s) and related types
//! - Exports to the gateway (`mod.rs`): a subrouter containing the `/health` route

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::connectivity::ConnectivitySnapshot;
use crate::QueryService;

/// JSON response body for the `/health` endpoint.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    connectivity: ConnectivitySnapshot,
    records: usize,
    capacity: usize,
    sensors: usize,
}

/// Handle `GET /health`.
///
/// Reports `"ok"` whenever the node answers at all. Degraded sensors or a
/// failing clock sync show up in the data, never as an error status.
async fn health(State(service): State<QueryService>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        connectivity: service.connectivity(),
        records: service.record_count(),
        capacity: service.config().history_capacity,
        sensors: service.config().sensor_count(),
    })
}

/// Create a subrouter containing the `/health` route.
pub fn router() -> Router<QueryService> {
    Router::new().route("/health", get(health))
}

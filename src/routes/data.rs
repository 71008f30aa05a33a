//! `/get_data` and `/get_data_all`: history as JSON arrays, newest-first.

use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    routing::get,
    Router,
};
use tracing::debug;

use crate::QueryService;

// ---

pub fn router() -> Router<QueryService> {
    // ---
    Router::new()
        .route("/get_data", get(latest))
        .route("/get_data_all", get(all))
}

fn json(body: String) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/json")], body)
}

async fn latest(State(service): State<QueryService>) -> impl IntoResponse {
    // ---
    debug!("GET /get_data");
    json(service.get_latest())
}

async fn all(State(service): State<QueryService>) -> impl IntoResponse {
    // ---
    let body = service.get_all();
    debug!("GET /get_data_all - {} bytes", body.len());
    json(body)
}

//! `/purge`: drop the retained history.

use axum::{extract::State, routing::get, Router};

use crate::QueryService;

// ---

pub fn router() -> Router<QueryService> {
    Router::new().route("/purge", get(purge))
}

/// Handle `GET /purge`. Responds with a plain-text confirmation.
async fn purge(State(service): State<QueryService>) -> String {
    service.purge()
}

//! Route gateway for the node's query interface.
//!
//! Each sibling module exports a subrouter over [`QueryService`]; this gateway
//! merges them and binds the shared state, so the node loop never needs to
//! know about individual endpoints.

use axum::Router;

use crate::QueryService;

mod data;
mod health;
mod pages;
mod purge;

// ---

pub fn router(service: QueryService) -> Router {
    // ---
    Router::new()
        .merge(data::router())
        .merge(purge::router())
        .merge(pages::router())
        .merge(health::router())
        .with_state(service)
}

//! Liveness probe.
//!
//! GET /_ping - 200 with an empty body

use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;

/// Build the health router.
pub fn router() -> Router {
    Router::new().route("/_ping", get(ping))
}

async fn ping() -> StatusCode {
    StatusCode::OK
}

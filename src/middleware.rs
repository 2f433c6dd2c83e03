//! Cross-cutting request processing.
//!
//! Layers are added from the innermost (closest to the handlers) outwards,
//! since in axum the last `.layer` call wraps everything before it. The
//! resulting request path is: CORS (optional), compression, body limit,
//! tracing, panic translation, handler.

use axum::body::Body;
use axum::extract::{DefaultBodyLimit, MatchedPath};
use axum::http::Request;
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tower_http::LatencyUnit;
use tracing::{Level, Span};

use crate::config::ServerOptions;
use crate::error::panic_response;

/// Wrap the composed routes in the fixed middleware stack.
///
/// Request spans are children of `log`; each response is logged once at INFO
/// with its status and latency.
pub fn configure_middleware(router: Router, options: &ServerOptions, log: &Span) -> Router {
    let parent = log.clone();
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(move |req: &Request<Body>| {
            let matched = req
                .extensions()
                .get::<MatchedPath>()
                .map(|p| p.as_str().to_string())
                .unwrap_or_default();
            tracing::info_span!(
                parent: &parent,
                "http",
                method = %req.method(),
                uri = %req.uri(),
                matched_path = %matched,
            )
        })
        .on_response(
            DefaultOnResponse::new()
                .level(Level::INFO)
                .latency_unit(LatencyUnit::Millis),
        );

    let router = router
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(trace_layer)
        .layer(DefaultBodyLimit::max(options.body_limit_bytes))
        .layer(CompressionLayer::new());

    if options.cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

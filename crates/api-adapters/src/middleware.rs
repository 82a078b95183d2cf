//! mindmap/crates/api-adapters/src/middleware.rs Middleware
//!
//! Request tracing and cross-origin policy for the map API.

use axum::http::{header, HeaderName, Method};
use std::time::Duration;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::{FILE_NAME_HEADER, OWNER_HEADER};

/// Spans every request; failures (5xx) are logged at error level.
pub fn trace_layer() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>> {
    TraceLayer::new_for_http()
}

// The editor UI may be served from another origin.
pub fn cors_policy() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(OWNER_HEADER),
            HeaderName::from_static(FILE_NAME_HEADER),
        ])
        .expose_headers([header::CONTENT_DISPOSITION])
        .max_age(Duration::from_secs(3600))
}

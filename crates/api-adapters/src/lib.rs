//! # api-adapters
//!
//! The HTTP routing layer for the map services.

#[cfg(feature = "web-axum")]
pub mod error;
#[cfg(feature = "web-axum")]
pub mod handlers;
#[cfg(feature = "web-axum")]
pub mod middleware;

#[cfg(feature = "web-axum")]
pub use error::ApiError;
#[cfg(feature = "web-axum")]
pub use handlers::AppState;

#[cfg(feature = "web-axum")]
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};

/// Builds the map API.
///
/// `max_upload_bytes` caps the import body; larger uploads get `413`.
#[cfg(feature = "web-axum")]
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/maps", get(handlers::list_maps).post(handlers::create_map))
        .route(
            "/maps/import",
            post(handlers::import_map).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route(
            "/maps/{map_id}",
            get(handlers::get_map)
                .patch(handlers::update_map)
                .delete(handlers::delete_map),
        )
        .route("/maps/{map_id}/export", get(handlers::export_map))
        .route("/maps/{map_id}/duplicate", post(handlers::duplicate_map))
        .route("/maps/{map_id}/nodes", post(handlers::add_node))
        .route(
            "/maps/{map_id}/nodes/{node_id}",
            put(handlers::set_node_title).delete(handlers::delete_node),
        )
        .layer(middleware::cors_policy())
        .layer(middleware::trace_layer())
        .with_state(state)
}

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::models::AppState;

// sets up all the routes for the dashboard api
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handlers::index))
        .route("/status", get(handlers::status))
        .route("/fetch", post(handlers::fetch))
        .route("/history", get(handlers::history))
        .route("/stats", get(handlers::stats))
        .route("/clear", post(handlers::clear))
        .route("/continuous/start", post(handlers::start_continuous))
        .route("/continuous/stop", post(handlers::stop_continuous))
        .route("/sites/{icao}", get(handlers::site_detail))
        .route("/regions/{icao}", get(handlers::region))
        .route("/diagnostics", get(handlers::diagnostics))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

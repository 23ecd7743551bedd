pub mod handlers;
pub mod realtime;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/posts", post(handlers::create_post).get(handlers::list_posts))
        .route("/search", get(handlers::search_posts))
        .route("/test/start", post(handlers::start_workload))
        .route("/test/stop", post(handlers::stop_workload))
        .route("/test/status", get(handlers::workload_status))
        .route("/realtime", get(realtime::realtime))
        .route("/healthz", get(handlers::healthcheck))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

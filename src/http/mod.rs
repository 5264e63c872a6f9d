//! HTTP surface (§6) — route table wiring axum to the handlers module.

pub mod handlers;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::core::app_state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/crawl", post(handlers::start_crawl))
        .route("/crawl/stream-status/{search_id}", get(handlers::stream_status))
        .route("/crawl/status/{search_id}", get(handlers::poll_status))
        .route("/history", get(handlers::list_history))
        .route("/history/{search_id}/articles", get(handlers::paged_articles))
        .route("/chatbot/retrieve-context", post(handlers::retrieve_context))
        .route("/topics/init-from-html", post(handlers::init_topics_from_html))
        .route("/admin/auto-crawl/{website}", post(handlers::trigger_auto_crawl))
        .route("/admin/schedule", post(handlers::reschedule))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

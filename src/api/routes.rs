use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{
    create_urls, get_url, health_check, list_clicks, list_urls, prune_expired, AppState,
};

pub fn create_api_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route("/urls", post(create_urls).get(list_urls))
        .route("/urls/{code}", get(get_url))
        .route("/urls/{code}/clicks", get(list_clicks))
        .route("/maintenance/prune", post(prune_expired))
        .route("/health", get(health_check))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

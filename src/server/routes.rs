//! Router configuration for the web server.

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::AppState;
use super::handlers;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        // Manga
        .route("/api/search", get(handlers::search))
        .route("/api/details/:id", get(handlers::details))
        .route("/api/chapters/:id", get(handlers::chapters))
        .route("/api/pages", get(handlers::pages))
        .route("/api/prefetch", post(handlers::prefetch))
        .route("/api/spotlight", get(handlers::spotlight))
        .route("/api/hot", get(handlers::hot_updates))
        // Anime
        .route("/api/anime/spotlight", get(handlers::anime_spotlight))
        .route("/api/anime/trending", get(handlers::anime_trending))
        .route("/api/anime/resolve/:catalog_id", get(handlers::resolve_stream_source))
        .route("/api/episodes/:id", get(handlers::episodes))
        .route("/api/streams/:anime_id/:episode_id", get(handlers::streams))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

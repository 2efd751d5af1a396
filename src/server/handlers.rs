//! API endpoint handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use super::AppState;
use crate::types::{
    AnimeSpotlight, Chapter, EpisodePage, HotUpdate, MediaDetails, Page, SearchResult,
    SpotlightEntry, StreamCandidate, TrendingAnime,
};

/// Health check endpoint for container orchestration.
pub async fn health() -> impl IntoResponse {
    StatusCode::OK
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PagesParams {
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EpisodeParams {
    pub page: Option<u32>,
}

pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Json<Vec<SearchResult>> {
    let query = params.q.unwrap_or_default();
    Json(state.resolver.unified_search(&query).await)
}

pub async fn details(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MediaDetails>, StatusCode> {
    state
        .resolver
        .unified_get_details(&id)
        .await
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

pub async fn chapters(State(state): State<AppState>, Path(id): Path<String>) -> Json<Vec<Chapter>> {
    Json(state.resolver.unified_get_chapters(&id).await)
}

/// Page images of the chapter at `?url=`.
pub async fn pages(
    State(state): State<AppState>,
    Query(params): Query<PagesParams>,
) -> Result<Json<Vec<Page>>, StatusCode> {
    let url = params
        .url
        .filter(|u| !u.trim().is_empty())
        .ok_or(StatusCode::BAD_REQUEST)?;
    Ok(Json(state.resolver.get_chapter_pages_cached(&url).await))
}

/// Schedules page-cache warming for a JSON array of chapter URLs.
pub async fn prefetch(
    State(state): State<AppState>,
    Json(urls): Json<Vec<String>>,
) -> impl IntoResponse {
    let scheduled = state.resolver.prefetch(urls);
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "scheduled": scheduled })),
    )
}

pub async fn spotlight(State(state): State<AppState>) -> Json<Vec<SpotlightEntry>> {
    Json(state.resolver.get_enriched_spotlight().await)
}

pub async fn hot_updates(State(state): State<AppState>) -> Json<Vec<HotUpdate>> {
    Json(state.resolver.get_hot_updates().await)
}

pub async fn anime_spotlight(State(state): State<AppState>) -> Json<Vec<AnimeSpotlight>> {
    Json(state.resolver.get_anime_spotlight().await)
}

pub async fn anime_trending(State(state): State<AppState>) -> Json<Vec<TrendingAnime>> {
    Json(state.resolver.get_anime_trending().await)
}

/// Video-site entry for a metadata catalog id.
pub async fn resolve_stream_source(
    State(state): State<AppState>,
    Path(catalog_id): Path<i64>,
) -> Result<Json<SearchResult>, StatusCode> {
    state
        .resolver
        .resolve_catalog_anime(catalog_id)
        .await
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

pub async fn episodes(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<EpisodeParams>,
) -> Json<EpisodePage> {
    let page = params.page.unwrap_or(1);
    Json(state.resolver.get_episodes(&id, page).await)
}

pub async fn streams(
    State(state): State<AppState>,
    Path((anime_id, episode_id)): Path<(String, String)>,
) -> Json<Vec<StreamCandidate>> {
    Json(state.resolver.get_stream_links(&anime_id, &episode_id).await)
}

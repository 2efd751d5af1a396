//! Client for the curated metadata catalog (AniList GraphQL).
//!
//! The catalog is ground truth for titles, scores and genres. Scraped results are
//! matched against it, never the other way round.
//!
//! ```rust,no_run
//! use shiori::metadata::{AniListClient, MediaType};
//!
//! # async fn example() -> shiori::Result<()> {
//! let client = AniListClient::new("https://graphql.anilist.co");
//! let trending = client.trending(MediaType::Manga, 1, 10).await?;
//! for media in &trending.media {
//!     println!("{} ({:?})", media.preferred_title(), media.year());
//! }
//! # Ok(())
//! # }
//! ```

use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::net::HttpClient;

pub mod queries;
pub mod types;

pub use types::*;

/// Spacing between catalog requests. The public endpoint allows 90 per minute.
const RATE_LIMIT_MS: u64 = 700;

/// Sort used by [`AniListClient::trending`].
pub const TRENDING_SORT: &str = "TRENDING_DESC";
/// Sort used by [`AniListClient::search`].
pub const SEARCH_SORT: &str = "SEARCH_MATCH";
/// Sort used by [`AniListClient::seasonal`].
pub const SEASONAL_SORT: &str = "POPULARITY_DESC";

#[derive(Debug, Clone)]
pub struct AniListClient {
    client: HttpClient,
    endpoint: String,
}

#[derive(serde::Serialize)]
struct GraphQlRequest<'a> {
    query: String,
    variables: &'a MediaQuery,
}

impl AniListClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: HttpClient::new("anilist")
                .with_rate_limit(RATE_LIMIT_MS)
                .with_header("Accept", "application/json"),
            endpoint: endpoint.into(),
        }
    }

    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.client = self.client.with_timeout(timeout);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Sends one of the fixed documents in [`queries`] with `variables`.
    ///
    /// # Errors
    ///
    /// GraphQL-level errors become [`Error::Source`] (or [`Error::NotFound`] for a
    /// 404 status); a response without `data` is a parse error.
    pub async fn query<T>(&self, document: &str, variables: &MediaQuery) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let request = GraphQlRequest {
            query: queries::document(document),
            variables,
        };
        let response: GraphQlResponse<T> = self.client.post_json(&self.endpoint, &request).await?;

        if let Some(error) = response.errors.first() {
            return Err(match error.status {
                Some(404) => Error::not_found(error.message.clone()),
                _ => Error::source("anilist", error.message.clone()),
            });
        }
        response
            .data
            .ok_or_else(|| Error::parse("GraphQL response without data"))
    }

    async fn page(&self, document: &str, variables: MediaQuery) -> Result<MediaPage> {
        let data: PageData = self.query(document, &variables).await?;
        Ok(data.page)
    }

    /// Currently trending titles of `media_type`.
    pub async fn trending(&self, media_type: MediaType, page: u32, per_page: u32) -> Result<MediaPage> {
        self.page(
            queries::TRENDING,
            MediaQuery {
                page: Some(page),
                per_page: Some(per_page),
                media_type: Some(media_type),
                sort: Some(vec![TRENDING_SORT.to_string()]),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn search(
        &self,
        search: &str,
        media_type: MediaType,
        page: u32,
        per_page: u32,
    ) -> Result<MediaPage> {
        self.page(
            queries::SEARCH,
            MediaQuery {
                page: Some(page),
                per_page: Some(per_page),
                search: Some(search.to_string()),
                media_type: Some(media_type),
                sort: Some(vec![SEARCH_SORT.to_string()]),
                ..Default::default()
            },
        )
        .await
    }

    /// A single title by catalog id.
    pub async fn media(&self, id: i64, media_type: MediaType) -> Result<Media> {
        let variables = MediaQuery {
            id: Some(id),
            media_type: Some(media_type),
            ..Default::default()
        };
        let data: MediaData = self.query(queries::MEDIA_BY_ID, &variables).await?;
        data.media
            .ok_or_else(|| Error::not_found(format!("media {}", id)))
    }

    /// Anime airing in `season` of `year`, most popular first.
    pub async fn seasonal(
        &self,
        season: MediaSeason,
        year: i32,
        page: u32,
        per_page: u32,
    ) -> Result<MediaPage> {
        self.page(
            queries::SEASONAL,
            MediaQuery {
                page: Some(page),
                per_page: Some(per_page),
                season: Some(season),
                season_year: Some(year),
                media_type: Some(MediaType::Anime),
                sort: Some(vec![SEASONAL_SORT.to_string()]),
                ..Default::default()
            },
        )
        .await
    }

    /// Titles by MyAnimeList id.
    pub async fn by_mal_ids(&self, ids: &[i64], media_type: MediaType) -> Result<MediaPage> {
        self.page(
            queries::BY_MAL_IDS,
            MediaQuery {
                page: Some(1),
                per_page: Some(ids.len().clamp(1, 50) as u32),
                id_mal_in: Some(ids.to_vec()),
                media_type: Some(media_type),
                ..Default::default()
            },
        )
        .await
    }
}

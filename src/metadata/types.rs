//! Query variables and response shapes of the metadata catalog.

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// `MediaType` enum of the catalog schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaType {
    Anime,
    Manga,
}

/// `MediaSeason` enum of the catalog schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaSeason {
    Winter,
    Spring,
    Summer,
    Fall,
}

/// Variables for the fixed query documents.
///
/// Unset fields are omitted from the request, so one struct serves every document.
///
/// ```rust
/// use shiori::metadata::{MediaQueryBuilder, MediaType};
///
/// let vars = MediaQueryBuilder::default()
///     .page(1u32)
///     .per_page(10u32)
///     .media_type(MediaType::Manga)
///     .sort(vec!["TRENDING_DESC".to_string()])
///     .build()
///     .unwrap();
///
/// let json = serde_json::to_value(&vars).unwrap();
/// assert_eq!(json["perPage"], 10);
/// assert_eq!(json["type"], "MANGA");
/// assert!(json.get("search").is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Builder)]
#[builder(setter(into, strip_option), default)]
pub struct MediaQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(rename = "perPage", skip_serializing_if = "Option::is_none")]
    pub per_page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub season: Option<MediaSeason>,
    #[serde(rename = "seasonYear", skip_serializing_if = "Option::is_none")]
    pub season_year: Option<i32>,
    #[serde(rename = "idMal_in", skip_serializing_if = "Option::is_none")]
    pub id_mal_in: Option<Vec<i64>>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub media_type: Option<MediaType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub total: Option<u32>,
    pub current_page: Option<u32>,
    pub last_page: Option<u32>,
    #[serde(default)]
    pub has_next_page: bool,
    pub per_page: Option<u32>,
}

/// A `Page { pageInfo, media }` selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaPage {
    #[serde(default)]
    pub page_info: PageInfo,
    #[serde(default)]
    pub media: Vec<Media>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaTitle {
    pub romaji: Option<String>,
    pub english: Option<String>,
    pub native: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverImage {
    pub extra_large: Option<String>,
    pub large: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FuzzyDate {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub day: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiringEpisode {
    pub airing_at: i64,
    pub episode: u32,
    pub time_until_airing: i64,
}

/// A catalog entry as selected by the `mediaFields` fragment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    pub id: i64,
    pub id_mal: Option<i64>,
    #[serde(rename = "type")]
    pub media_type: Option<MediaType>,
    #[serde(default)]
    pub title: MediaTitle,
    pub description: Option<String>,
    pub cover_image: Option<CoverImage>,
    pub banner_image: Option<String>,
    pub format: Option<String>,
    pub status: Option<String>,
    pub episodes: Option<u32>,
    pub chapters: Option<u32>,
    #[serde(default)]
    pub genres: Vec<String>,
    pub average_score: Option<u32>,
    pub popularity: Option<u32>,
    pub season: Option<MediaSeason>,
    pub season_year: Option<i32>,
    pub start_date: Option<FuzzyDate>,
    pub next_airing_episode: Option<AiringEpisode>,
}

impl Media {
    /// English title, then romaji, then native. Empty when none is set.
    pub fn preferred_title(&self) -> &str {
        [&self.title.english, &self.title.romaji, &self.title.native]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|t| !t.trim().is_empty())
            .unwrap_or_default()
    }

    /// Start year, falling back to the season year.
    pub fn year(&self) -> Option<i32> {
        self.start_date
            .as_ref()
            .and_then(|d| d.year)
            .or(self.season_year)
    }

    /// Largest available cover image.
    pub fn cover_url(&self) -> Option<&str> {
        self.cover_image
            .as_ref()
            .and_then(|c| c.extra_large.as_deref().or(c.large.as_deref()))
    }
}

/// GraphQL response envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphQlResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphQlError {
    pub message: String,
    pub status: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PageData {
    #[serde(rename = "Page")]
    pub page: MediaPage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaData {
    #[serde(rename = "Media")]
    pub media: Option<Media>,
}

//! Core data types shared by the extractors, the resolver and the route handlers.
//!
//! - [`SearchResult`] - A hit from a scraped catalog search
//! - [`MediaDetails`] - A title's detail page
//! - [`Chapter`] / [`Episode`] - Ordered entries of a title
//! - [`Page`] / [`StreamCandidate`] - Playable locations inside an entry
//! - [`HotUpdate`], [`SpotlightEntry`], [`AnimeSpotlight`], [`TrendingAnime`] - Aggregate feeds
//!
//! All types serialize with camelCase field names, which is the shape the route
//! handlers expose.
//!
//! # Examples
//!
//! ```rust
//! use shiori::types::Page;
//!
//! let page = Page {
//!     index: 0,
//!     image_url: "https://cdn.example/1.jpg".to_string(),
//! };
//! assert_eq!(page.index, 0);
//! ```

use serde::{Deserialize, Serialize};

/// A single hit from a scraped catalog search.
///
/// `id` is site-local when produced by an extractor. The resolver rewrites it to the
/// source-prefixed form (`mk:some-slug`) before it leaves the crate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    /// Identifier within the source (prefixed once tagged by the resolver)
    pub id: String,

    /// Display title
    pub title: String,

    /// Canonical URL on the source site
    pub url: String,

    /// Thumbnail image URL
    pub thumbnail_url: Option<String>,

    /// Latest chapter/episode label as printed by the site ("Chapter 112")
    pub latest_label: Option<String>,

    /// Author, when the listing shows one
    pub author: Option<String>,

    /// Alternative titles
    #[serde(default)]
    pub alt_names: Vec<String>,

    /// Release year, when the source exposes it
    pub year: Option<i32>,

    /// Declared format ("TV", "Movie", "OVA"), when the source exposes it
    pub media_type: Option<String>,

    /// Prefix of the source this result came from
    #[serde(default)]
    pub source: String,
}

/// Full metadata scraped from a title's detail page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaDetails {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub alt_names: Vec<String>,
    pub author: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    pub synopsis: Option<String>,
    pub cover_url: Option<String>,
    pub canonical_url: String,
}

/// A manga chapter.
///
/// `order_index` is the position in the source document. Sources do not guarantee a
/// sequence field, so document order is the authoritative ordering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    /// Last path segment of the chapter link (prefixed once tagged by the resolver)
    pub id: String,

    /// Position in document order
    pub order_index: usize,

    /// Chapter number parsed from the title, if any (can be decimal for .5 chapters)
    pub number: Option<f64>,

    /// Chapter title
    pub title: String,

    /// Absolute chapter URL
    pub url: String,

    /// Upload date label as printed by the site
    pub uploaded_at: Option<String>,
}

/// An anime episode from a paginated release listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Episode {
    /// Episode session identifier
    pub id: String,

    /// Position in listing order
    pub order_index: usize,

    /// Episode number
    pub number: f64,

    /// Episode title (often empty upstream)
    pub title: String,

    /// Play page URL
    pub url: String,

    /// Duration label ("00:23:40")
    pub duration_label: Option<String>,

    /// Snapshot image URL
    pub snapshot_url: Option<String>,
}

/// One page of an episode listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodePage {
    pub episodes: Vec<Episode>,
    pub current_page: u32,
    pub last_page: u32,
}

/// A single manga page image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub index: usize,
    pub image_url: String,
}

/// A playable stream option discovered on an episode's play page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamCandidate {
    /// Vertical resolution label ("1080")
    pub quality: String,

    /// Audio language code ("jpn", "eng")
    pub audio_track: String,

    /// Fansub group, when shown
    pub fansub: Option<String>,

    /// Embed player URL
    pub embed_url: String,

    /// Direct media URL recovered from the embed page
    pub resolved_direct_url: Option<String>,

    /// Whether `resolved_direct_url` can be handed to a player as-is
    pub is_direct_playable: bool,
}

/// An entry of the manga site's "hot updates" feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotUpdate {
    pub title: String,
    pub latest_chapter: Option<String>,
    pub thumbnail_url: Option<String>,
    pub url: String,
}

/// A promoted title as served by the spotlight endpoint.
///
/// Built from the curated metadata catalog when it answers, otherwise from the
/// scraped hot-updates feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpotlightEntry {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub cover_url: Option<String>,
    pub banner_url: Option<String>,
    /// Total chapter count declared by the catalog
    pub chapters: Option<u32>,
    /// Latest chapter number seen on the scraped site
    pub latest_chapter: Option<f64>,
    pub average_score: Option<u32>,
    #[serde(default)]
    pub genres: Vec<String>,
    pub status: Option<String>,
    pub year: Option<i32>,
    pub format: Option<String>,
    /// Where the entry came from ("anilist" or a scraped source prefix)
    pub source: String,
}

/// A slide of the anime catalog's spotlight carousel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimeSpotlight {
    pub rank: u32,
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub poster_url: Option<String>,
    #[serde(default)]
    pub details: Vec<String>,
    pub url: String,
}

/// An entry of the anime catalog's trending list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendingAnime {
    pub rank: u32,
    pub id: String,
    pub title: String,
    pub poster_url: Option<String>,
    pub url: String,
}

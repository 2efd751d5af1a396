//! Source trait, source registry and id prefixing.
//!
//! Every scraped site is a [`Source`] identified by a short prefix (`mk`, `ap`, `hi`).
//! Ids leave the crate in prefixed form (`mk:solo-leveling`) so that two sources can
//! emit the same bare id without colliding. [`apply_prefix`] and [`strip_prefix`] are
//! the two halves of that round trip.
//!
//! # Examples
//!
//! ```rust
//! use shiori::source::{apply_prefix, split_prefix, strip_prefix};
//!
//! let id = apply_prefix("mk", "solo-leveling");
//! assert_eq!(id, "mk:solo-leveling");
//! assert_eq!(strip_prefix(&id), "solo-leveling");
//! assert_eq!(split_prefix(&id), (Some("mk"), "solo-leveling"));
//!
//! // Strings that merely contain a colon are not prefixed ids.
//! assert_eq!(split_prefix("https://site/x"), (None, "https://site/x"));
//! assert_eq!(split_prefix("http://site/x"), (None, "http://site/x"));
//! ```

use async_trait::async_trait;
use futures::future;
use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    error::{Error, Result},
    types::{
        AnimeSpotlight, Chapter, EpisodePage, HotUpdate, MediaDetails, Page, SearchResult,
        StreamCandidate, TrendingAnime,
    },
};

/// Separator between a source prefix and a site-local id.
pub const PREFIX_SEPARATOR: char = ':';

/// Longest string accepted as a source prefix.
const MAX_PREFIX_LEN: usize = 4;

/// Namespaces a site-local id with a source prefix.
pub fn apply_prefix(prefix: &str, id: &str) -> String {
    format!("{}{}{}", prefix, PREFIX_SEPARATOR, id)
}

/// Splits `P:X` into `(Some(P), X)`.
///
/// Only a short alphanumeric head counts as a prefix, so URLs and other strings that
/// happen to contain a colon come back unchanged as `(None, input)`.
pub fn split_prefix(id: &str) -> (Option<&str>, &str) {
    match id.split_once(PREFIX_SEPARATOR) {
        Some((prefix, rest))
            if !prefix.is_empty()
                && prefix.len() <= MAX_PREFIX_LEN
                && prefix.chars().all(|c| c.is_ascii_alphanumeric())
                && !rest.starts_with("//") =>
        {
            (Some(prefix), rest)
        }
        _ => (None, id),
    }
}

/// Removes the source prefix from an id, if it has one.
pub fn strip_prefix(id: &str) -> &str {
    split_prefix(id).1
}

/// What a source catalogs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Manga,
    Anime,
}

/// A scraped site.
///
/// Only [`search`](Source::search) is required. The remaining operations default to
/// [`Error::NotFound`], so a source implements exactly what its site offers.
///
/// Implementations return site-local ids and surface transport and parse failures as
/// errors. Zero results is `Ok(vec![])`, not an error.
///
/// # Examples
///
/// ```rust
/// use shiori::prelude::*;
/// use async_trait::async_trait;
///
/// struct Fixed;
///
/// #[async_trait]
/// impl Source for Fixed {
///     fn id(&self) -> &'static str { "fx" }
///     fn name(&self) -> &'static str { "Fixed" }
///     fn base_url(&self) -> &str { "https://fixed.example" }
///     fn kind(&self) -> MediaKind { MediaKind::Manga }
///
///     async fn search(&self, _query: &str) -> shiori::Result<Vec<SearchResult>> {
///         Ok(vec![])
///     }
/// }
/// ```
#[async_trait]
pub trait Source: Send + Sync {
    /// Short prefix used to namespace ids from this source.
    fn id(&self) -> &'static str;

    fn name(&self) -> &'static str;

    /// Site root, without trailing slash.
    fn base_url(&self) -> &str;

    fn kind(&self) -> MediaKind;

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>>;

    async fn get_details(&self, id: &str) -> Result<MediaDetails> {
        Err(unsupported(self.id(), "details", id))
    }

    /// Chapters in document order.
    async fn get_chapters(&self, id: &str) -> Result<Vec<Chapter>> {
        Err(unsupported(self.id(), "chapters", id))
    }

    /// Page images of a chapter, addressed by its full URL.
    async fn get_pages(&self, chapter_url: &str) -> Result<Vec<Page>> {
        Err(unsupported(self.id(), "pages", chapter_url))
    }

    async fn get_hot_updates(&self) -> Result<Vec<HotUpdate>> {
        Err(unsupported(self.id(), "hot updates", ""))
    }

    /// One page of a title's episode listing. Pages start at 1.
    async fn get_episodes(&self, id: &str, page: u32) -> Result<EpisodePage> {
        let _ = page;
        Err(unsupported(self.id(), "episodes", id))
    }

    async fn get_stream_links(
        &self,
        anime_id: &str,
        episode_id: &str,
    ) -> Result<Vec<StreamCandidate>> {
        let _ = anime_id;
        Err(unsupported(self.id(), "streams", episode_id))
    }

    async fn get_spotlight(&self) -> Result<Vec<AnimeSpotlight>> {
        Err(unsupported(self.id(), "spotlight", ""))
    }

    async fn get_trending(&self) -> Result<Vec<TrendingAnime>> {
        Err(unsupported(self.id(), "trending", ""))
    }
}

fn unsupported(source: &str, operation: &str, target: &str) -> Error {
    Error::not_found(format!("{} has no {} ({})", source, operation, target))
}

/// Registry of sources, addressable by prefix.
///
/// Sources are stored behind `Arc` so the resolver can hand them to background tasks.
pub struct Sources {
    sources: Vec<Arc<dyn Source>>,
    by_id: HashMap<&'static str, usize>,
}

impl Sources {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            by_id: HashMap::new(),
        }
    }

    /// Adds a source. A later source with the same prefix replaces the earlier one.
    pub fn add(&mut self, source: impl Source + 'static) -> &mut Self {
        self.add_shared(Arc::new(source))
    }

    pub fn add_shared(&mut self, source: Arc<dyn Source>) -> &mut Self {
        let id = source.id();
        match self.by_id.get(id) {
            Some(&index) => self.sources[index] = source,
            None => {
                self.by_id.insert(id, self.sources.len());
                self.sources.push(source);
            }
        }
        self
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Source>> {
        self.by_id
            .get(id)
            .and_then(|&index| self.sources.get(index))
            .cloned()
    }

    /// Prefixes of all registered sources, in registration order.
    pub fn list_ids(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.id()).collect()
    }

    /// Searches every source of `kind` concurrently.
    ///
    /// Results are grouped by prefix in registration order. Each result's `source`
    /// field is set and its `id` prefixed.
    pub async fn search_grouped(
        &self,
        query: &str,
        kind: MediaKind,
    ) -> Vec<(&'static str, Result<Vec<SearchResult>>)> {
        let futures = self
            .sources
            .iter()
            .filter(|source| source.kind() == kind)
            .map(|source| async move {
                let prefix = source.id();
                let result = source.search(query).await.map(|mut results| {
                    for r in &mut results {
                        r.id = apply_prefix(prefix, &r.id);
                        r.source = prefix.to_string();
                    }
                    results
                });
                (prefix, result)
            });

        future::join_all(futures).await
    }

    /// Searches every source of `kind` and flattens the results.
    ///
    /// # Errors
    ///
    /// Fails only if every searched source failed. Individual failures are logged.
    pub async fn search_flat(&self, query: &str, kind: MediaKind) -> Result<Vec<SearchResult>> {
        let grouped = self.search_grouped(query, kind).await;

        let mut all_results = Vec::new();
        let mut errors = Vec::new();

        for (prefix, result) in grouped {
            match result {
                Ok(mut results) => all_results.append(&mut results),
                Err(e) => {
                    tracing::warn!(source = prefix, query, kind = ?e.kind(), error = %e, "search failed");
                    errors.push(format!("{}: {}", prefix, e));
                }
            }
        }

        if all_results.is_empty() && !errors.is_empty() {
            return Err(Error::Other(format!(
                "All sources failed: {}",
                errors.join(", ")
            )));
        }

        Ok(all_results)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl Default for Sources {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Sources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sources")
            .field("ids", &self.list_ids())
            .finish()
    }
}

//! Resolution and caching service.
//!
//! [`Resolver`] sits between the route handlers and the extractors. It routes
//! source-prefixed ids to the right extractor, caches every operation class in its
//! own [`TtlCache`], pairs catalog entries with scraped results and warms caches in
//! the background.
//!
//! Every public operation degrades instead of failing: an extractor error is logged
//! with its kind and the caller gets the last cached value if there is one, otherwise
//! an empty collection or `None`.
//!
//! ```rust,no_run
//! use shiori::prelude::*;
//!
//! # async fn example() {
//! let resolver = Resolver::from_config(&Config::from_env());
//!
//! for hit in resolver.unified_search("one piece").await {
//!     println!("{} [{}]", hit.title, hit.id);
//! }
//! # }
//! ```

use futures::future;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    browser::BrowserSessionProvider,
    cache::{Clock, SystemClock, TtlCache},
    config::CacheSettings,
    error::Error,
    matching::{self, TitleInfo},
    metadata::{AniListClient, Media, MediaType},
    net::html,
    source::{MediaKind, Source, Sources, apply_prefix, split_prefix},
    sources::{animepahe, hianime, mangakakalot},
    types::{
        AnimeSpotlight, Chapter, EpisodePage, HotUpdate, MediaDetails, Page, SearchResult,
        SpotlightEntry, StreamCandidate, TrendingAnime,
    },
};

/// Number of catalog titles requested for the spotlight.
pub const SPOTLIGHT_SIZE: u32 = 10;

/// Cheap-to-clone handle to the shared service state.
#[derive(Clone)]
pub struct Resolver {
    inner: Arc<Inner>,
}

struct Inner {
    sources: Sources,
    metadata: Option<AniListClient>,
    browser: Option<Arc<BrowserSessionProvider>>,
    roles: Roles,
    spotlight_size: u32,
    /// Bumped on every spotlight write; enrichment only lands on the list it started from.
    spotlight_generation: Mutex<u64>,

    search: TtlCache<String, Vec<SearchResult>>,
    video_search: TtlCache<String, Vec<SearchResult>>,
    pages: TtlCache<String, Vec<Page>>,
    streams: TtlCache<String, Vec<StreamCandidate>>,
    episodes: TtlCache<String, EpisodePage>,
    spotlight: TtlCache<(), Vec<SpotlightEntry>>,
    hot: TtlCache<(), Vec<HotUpdate>>,
    anime_spotlight: TtlCache<(), Vec<AnimeSpotlight>>,
    anime_trending: TtlCache<(), Vec<TrendingAnime>>,
}

/// Which registered source serves each role when an id carries no prefix.
#[derive(Debug, Clone, Copy)]
struct Roles {
    manga: &'static str,
    video: &'static str,
    anime: &'static str,
}

/// Builder for [`Resolver`].
pub struct ResolverBuilder {
    sources: Sources,
    metadata: Option<AniListClient>,
    browser: Option<Arc<BrowserSessionProvider>>,
    roles: Roles,
    cache: CacheSettings,
    clock: Arc<dyn Clock>,
    spotlight_size: u32,
}

impl Default for ResolverBuilder {
    fn default() -> Self {
        Self {
            sources: Sources::new(),
            metadata: None,
            browser: None,
            roles: Roles {
                manga: mangakakalot::ID,
                video: animepahe::ID,
                anime: hianime::ID,
            },
            cache: CacheSettings::default(),
            clock: Arc::new(SystemClock),
            spotlight_size: SPOTLIGHT_SIZE,
        }
    }
}

impl ResolverBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source(mut self, source: impl Source + 'static) -> Self {
        self.sources.add(source);
        self
    }

    pub fn shared_source(mut self, source: Arc<dyn Source>) -> Self {
        self.sources.add_shared(source);
        self
    }

    /// Catalog used for the spotlight. Without one the spotlight is built from the
    /// hot-updates feed.
    pub fn metadata(mut self, client: AniListClient) -> Self {
        self.metadata = Some(client);
        self
    }

    /// Browser provider to shut down with the resolver.
    pub fn browser(mut self, provider: Arc<BrowserSessionProvider>) -> Self {
        self.browser = Some(provider);
        self
    }

    /// Source serving unprefixed manga ids, chapter pages and the hot feed.
    pub fn manga_source(mut self, id: &'static str) -> Self {
        self.roles.manga = id;
        self
    }

    /// Source serving episodes, streams and catalog-to-video matching.
    pub fn video_source(mut self, id: &'static str) -> Self {
        self.roles.video = id;
        self
    }

    /// Source serving the anime spotlight and trending strip.
    pub fn anime_source(mut self, id: &'static str) -> Self {
        self.roles.anime = id;
        self
    }

    pub fn cache_settings(mut self, settings: CacheSettings) -> Self {
        self.cache = settings;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn spotlight_size(mut self, size: u32) -> Self {
        self.spotlight_size = size.max(1);
        self
    }

    pub fn build(self) -> Resolver {
        let search_ttl = Duration::from_secs(self.cache.search_ttl_secs);
        let pages_ttl = Duration::from_secs(self.cache.pages_ttl_secs);
        let feed_ttl = Duration::from_secs(self.cache.feed_ttl_secs);
        let sweep = self.cache.pages_sweep_threshold;
        let clock = &self.clock;

        Resolver {
            inner: Arc::new(Inner {
                search: cache(search_ttl, clock),
                video_search: cache(search_ttl, clock),
                pages: cache(pages_ttl, clock).with_sweep_threshold(sweep),
                streams: cache(pages_ttl, clock).with_sweep_threshold(sweep),
                episodes: cache(pages_ttl, clock).with_sweep_threshold(sweep),
                spotlight: cache(feed_ttl, clock),
                hot: cache(feed_ttl, clock),
                anime_spotlight: cache(feed_ttl, clock),
                anime_trending: cache(feed_ttl, clock),
                sources: self.sources,
                metadata: self.metadata,
                browser: self.browser,
                roles: self.roles,
                spotlight_size: self.spotlight_size,
                spotlight_generation: Mutex::new(0),
            }),
        }
    }
}

fn cache<K, V>(ttl: Duration, clock: &Arc<dyn Clock>) -> TtlCache<K, V>
where
    K: Eq + std::hash::Hash,
    V: Clone,
{
    TtlCache::new(ttl).with_clock(Arc::clone(clock))
}

fn degraded(operation: &'static str, key: &str, error: &Error) {
    tracing::warn!(operation, key, kind = ?error.kind(), error = %error, "upstream failed, degrading");
}

/// Cache key for a search query: trimmed and lower-cased.
pub fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}

impl Resolver {
    pub fn builder() -> ResolverBuilder {
        ResolverBuilder::new()
    }

    /// Wires the three site extractors, the metadata catalog and a Chromium-backed
    /// browser provider from configuration.
    #[cfg(feature = "browser")]
    pub fn from_config(config: &crate::config::Config) -> Self {
        use crate::sources::{AnimePaheSource, HiAnimeSource, MangakakalotSource};

        let browser = Arc::new(BrowserSessionProvider::chrome(&config.browser));
        let sources = &config.sources;

        let mut video = AnimePaheSource::new(&sources.video_base_url, Arc::clone(&browser))
            .with_settle_delay(config.browser.settle_delay());
        if let Some(referer) = &sources.video_embed_referer {
            video = video.with_embed_referer(referer);
        }

        Self::builder()
            .source(
                MangakakalotSource::new(&sources.manga_base_url, Arc::clone(&browser))
                    .with_settle_delay(config.browser.settle_delay())
                    .with_http_settings(&config.http),
            )
            .source(video)
            .source(HiAnimeSource::new(&sources.anime_base_url).with_http_settings(&config.http))
            .metadata(
                AniListClient::new(&sources.anilist_endpoint)
                    .with_timeout(Duration::from_secs(config.http.timeout_secs)),
            )
            .browser(browser)
            .cache_settings(config.cache.clone())
            .build()
    }

    pub fn sources(&self) -> &Sources {
        &self.inner.sources
    }

    /// Closes the shared browser, if any.
    pub async fn shutdown(&self) {
        if let Some(browser) = &self.inner.browser {
            browser.shutdown().await;
        }
    }

    /// Resolves a possibly prefixed id to its source and site-local id.
    ///
    /// Unprefixed ids go to the source registered for `role`.
    fn route<'a>(&self, id: &'a str, role: &'static str) -> Option<(Arc<dyn Source>, &'a str)> {
        let (prefix, local) = split_prefix(id);
        let prefix = prefix.unwrap_or(role);
        match self.inner.sources.get(prefix) {
            Some(source) => Some((source, local)),
            None => {
                tracing::warn!(id, prefix, "no source registered for prefix");
                None
            }
        }
    }

    /// Searches the manga catalogs. Results carry prefixed ids and their source.
    ///
    /// Queries are cached case- and whitespace-insensitively.
    pub async fn unified_search(&self, query: &str) -> Vec<SearchResult> {
        let key = normalize_query(query);
        if key.is_empty() {
            return Vec::new();
        }
        if let Some(hit) = self.inner.search.get(&key) {
            return hit;
        }

        match self.inner.sources.search_flat(query.trim(), MediaKind::Manga).await {
            Ok(results) => {
                self.inner.search.insert_if_stale(key, results.clone());
                results
            }
            Err(e) => {
                degraded("search", &key, &e);
                self.inner.search.get_stale(&key).unwrap_or_default()
            }
        }
    }

    /// Details of a prefixed manga id, with the id re-prefixed.
    pub async fn unified_get_details(&self, id: &str) -> Option<MediaDetails> {
        let (source, local) = self.route(id, self.inner.roles.manga)?;

        match source.get_details(local).await {
            Ok(mut details) => {
                details.id = apply_prefix(source.id(), &details.id);
                Some(details)
            }
            Err(e) => {
                degraded("details", id, &e);
                None
            }
        }
    }

    /// Chapters of a prefixed manga id in document order, with ids re-prefixed.
    pub async fn unified_get_chapters(&self, id: &str) -> Vec<Chapter> {
        let Some((source, local)) = self.route(id, self.inner.roles.manga) else {
            return Vec::new();
        };

        match source.get_chapters(local).await {
            Ok(mut chapters) => {
                for chapter in &mut chapters {
                    chapter.id = apply_prefix(source.id(), &chapter.id);
                }
                chapters
            }
            Err(e) => {
                degraded("chapters", id, &e);
                Vec::new()
            }
        }
    }

    /// Page images of a chapter, cached by chapter URL.
    pub async fn get_chapter_pages_cached(&self, url: &str) -> Vec<Page> {
        let key = url.to_string();
        if let Some(hit) = self.inner.pages.get(&key) {
            return hit;
        }
        let Some(source) = self.inner.sources.get(self.inner.roles.manga) else {
            return Vec::new();
        };

        match source.get_pages(url).await {
            Ok(pages) => {
                if !pages.is_empty() {
                    self.inner.pages.insert_if_stale(key, pages.clone());
                }
                pages
            }
            Err(e) => {
                degraded("pages", url, &e);
                self.inner.pages.get_stale(&key).unwrap_or_default()
            }
        }
    }

    /// Warms the page cache for `urls` without waiting for it.
    ///
    /// URLs with a fresh entry are skipped. Returns how many fetches were scheduled.
    pub fn prefetch<I, S>(&self, urls: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut scheduled = 0;
        for url in urls {
            let url = url.into();
            if url.trim().is_empty() || self.inner.pages.is_fresh(&url) {
                continue;
            }

            let this = self.clone();
            tokio::spawn(async move {
                let pages = this.get_chapter_pages_cached(&url).await;
                tracing::debug!(url = %url, pages = pages.len(), "prefetched chapter");
            });
            scheduled += 1;
        }
        scheduled
    }

    /// Trending manga from the metadata catalog, enriched with the latest chapter
    /// seen on the scraped site.
    ///
    /// The catalog list is returned as soon as it arrives; enrichment runs in the
    /// background and replaces the cached list when done, so callers in between see
    /// entries without `latest_chapter`. When the catalog has nothing, entries are
    /// built from the hot-updates feed instead.
    pub async fn get_enriched_spotlight(&self) -> Vec<SpotlightEntry> {
        if let Some(hit) = self.inner.spotlight.get(&()) {
            return hit;
        }

        if let Some(metadata) = &self.inner.metadata {
            match metadata
                .trending(MediaType::Manga, 1, self.inner.spotlight_size)
                .await
            {
                Ok(page) if !page.media.is_empty() => {
                    let entries: Vec<SpotlightEntry> = page.media.iter().map(spotlight_entry).collect();
                    let generation = self.publish_spotlight(entries.clone());

                    let this = self.clone();
                    let pending = entries.clone();
                    tokio::spawn(async move {
                        this.enrich_spotlight(page.media, pending, generation).await;
                    });
                    return entries;
                }
                Ok(_) => tracing::info!("catalog trending list empty, using hot updates"),
                Err(e) => {
                    degraded("spotlight", "trending", &e);
                    if let Some(stale) = self.inner.spotlight.get_stale(&()) {
                        return stale;
                    }
                }
            }
        }

        let entries: Vec<SpotlightEntry> = self
            .get_hot_updates()
            .await
            .iter()
            .filter_map(|update| spotlight_from_hot(update, self.inner.roles.manga))
            .collect();
        if !entries.is_empty() {
            self.publish_spotlight(entries.clone());
        }
        entries
    }

    fn publish_spotlight(&self, entries: Vec<SpotlightEntry>) -> u64 {
        let mut generation = self.inner.spotlight_generation.lock();
        *generation += 1;
        self.inner.spotlight.insert((), entries);
        *generation
    }

    async fn enrich_spotlight(&self, media: Vec<Media>, entries: Vec<SpotlightEntry>, generation: u64) {
        let enriched = future::join_all(
            media
                .iter()
                .zip(entries)
                .map(|(media, entry)| self.enrich_entry(media, entry)),
        )
        .await;

        let matched = enriched.iter().filter(|e| e.latest_chapter.is_some()).count();
        let current = self.inner.spotlight_generation.lock();
        if *current != generation {
            tracing::debug!(generation, current = *current, "newer spotlight cached, dropping enrichment");
            return;
        }
        tracing::info!(entries = enriched.len(), matched, "spotlight enriched");
        self.inner.spotlight.insert((), enriched);
    }

    async fn enrich_entry(&self, media: &Media, mut entry: SpotlightEntry) -> SpotlightEntry {
        for title in catalog_titles(media) {
            let results = self.unified_search(title).await;
            let target = TitleInfo {
                title: title.to_string(),
                year: media.year(),
                media_type: None,
            };

            if let Some((hit, scored)) = matching::find_usable(&target, &results) {
                tracing::debug!(title, matched = %hit.title, score = scored.score, "spotlight match");
                entry.latest_chapter = hit
                    .latest_label
                    .as_deref()
                    .and_then(mangakakalot::chapter_number);
                return entry;
            }
        }

        tracing::warn!(
            catalog_id = media.id,
            title = media.preferred_title(),
            "ambiguous match: no usable scraped result, serving catalog data only"
        );
        entry
    }

    /// Recently updated manga from the scraped catalog.
    pub async fn get_hot_updates(&self) -> Vec<HotUpdate> {
        if let Some(hit) = self.inner.hot.get(&()) {
            return hit;
        }
        let Some(source) = self.inner.sources.get(self.inner.roles.manga) else {
            return Vec::new();
        };

        match source.get_hot_updates().await {
            Ok(updates) => {
                if !updates.is_empty() {
                    self.inner.hot.insert((), updates.clone());
                }
                updates
            }
            Err(e) => {
                degraded("hot updates", source.id(), &e);
                self.inner.hot.get_stale(&()).unwrap_or_default()
            }
        }
    }

    pub async fn get_anime_spotlight(&self) -> Vec<AnimeSpotlight> {
        if let Some(hit) = self.inner.anime_spotlight.get(&()) {
            return hit;
        }
        let Some(source) = self.inner.sources.get(self.inner.roles.anime) else {
            return Vec::new();
        };

        match source.get_spotlight().await {
            Ok(slides) => {
                if !slides.is_empty() {
                    self.inner.anime_spotlight.insert((), slides.clone());
                }
                slides
            }
            Err(e) => {
                degraded("anime spotlight", source.id(), &e);
                self.inner.anime_spotlight.get_stale(&()).unwrap_or_default()
            }
        }
    }

    pub async fn get_anime_trending(&self) -> Vec<TrendingAnime> {
        if let Some(hit) = self.inner.anime_trending.get(&()) {
            return hit;
        }
        let Some(source) = self.inner.sources.get(self.inner.roles.anime) else {
            return Vec::new();
        };

        match source.get_trending().await {
            Ok(entries) => {
                if !entries.is_empty() {
                    self.inner.anime_trending.insert((), entries.clone());
                }
                entries
            }
            Err(e) => {
                degraded("anime trending", source.id(), &e);
                self.inner.anime_trending.get_stale(&()).unwrap_or_default()
            }
        }
    }

    /// One page of a video title's episodes. A routing prefix on `id` is stripped.
    pub async fn get_episodes(&self, id: &str, page: u32) -> EpisodePage {
        let page = page.max(1);
        let empty = EpisodePage {
            episodes: Vec::new(),
            current_page: page,
            last_page: page,
        };
        let Some((source, local)) = self.route(id, self.inner.roles.video) else {
            return empty;
        };

        let key = format!("{}:{}#{}", source.id(), local, page);
        if let Some(hit) = self.inner.episodes.get(&key) {
            return hit;
        }

        match source.get_episodes(local, page).await {
            Ok(listing) => {
                if !listing.episodes.is_empty() {
                    self.inner.episodes.insert(key, listing.clone());
                }
                listing
            }
            Err(e) => {
                degraded("episodes", &key, &e);
                self.inner.episodes.get_stale(&key).unwrap_or(empty)
            }
        }
    }

    /// Playable stream candidates of an episode. Routing prefixes are stripped.
    pub async fn get_stream_links(&self, anime_id: &str, episode_id: &str) -> Vec<StreamCandidate> {
        let Some((source, anime)) = self.route(anime_id, self.inner.roles.video) else {
            return Vec::new();
        };
        let episode = split_prefix(episode_id).1;

        let key = format!("{}:{}/{}", source.id(), anime, episode);
        if let Some(hit) = self.inner.streams.get(&key) {
            return hit;
        }

        match source.get_stream_links(anime, episode).await {
            Ok(candidates) => {
                if !candidates.is_empty() {
                    self.inner.streams.insert(key, candidates.clone());
                }
                candidates
            }
            Err(e) => {
                degraded("streams", &key, &e);
                self.inner.streams.get_stale(&key).unwrap_or_default()
            }
        }
    }

    /// Finds the video-site entry for a catalog title.
    ///
    /// Searches the video source under each catalog title and keeps the best usable
    /// candidate. The returned result carries a prefixed id.
    pub async fn resolve_stream_source(&self, media: &Media) -> Option<SearchResult> {
        let source = self.inner.sources.get(self.inner.roles.video)?;

        for title in catalog_titles(media) {
            let results = self.video_search(&source, title).await;
            let target = TitleInfo {
                title: title.to_string(),
                year: media.year(),
                media_type: media.format.clone(),
            };

            if let Some((hit, scored)) = matching::find_usable(&target, &results) {
                tracing::debug!(title, matched = %hit.title, score = scored.score, "stream source match");
                let mut hit = hit.clone();
                hit.id = apply_prefix(source.id(), &hit.id);
                hit.source = source.id().to_string();
                return Some(hit);
            }
        }

        tracing::warn!(
            catalog_id = media.id,
            title = media.preferred_title(),
            "ambiguous match: no usable video result"
        );
        None
    }

    /// [`resolve_stream_source`](Self::resolve_stream_source) for a catalog anime id.
    pub async fn resolve_catalog_anime(&self, catalog_id: i64) -> Option<SearchResult> {
        let metadata = self.inner.metadata.as_ref()?;
        match metadata.media(catalog_id, MediaType::Anime).await {
            Ok(media) => self.resolve_stream_source(&media).await,
            Err(e) => {
                degraded("catalog media", &catalog_id.to_string(), &e);
                None
            }
        }
    }

    async fn video_search(&self, source: &Arc<dyn Source>, title: &str) -> Vec<SearchResult> {
        let key = normalize_query(title);
        if let Some(hit) = self.inner.video_search.get(&key) {
            return hit;
        }

        match source.search(title).await {
            Ok(results) => {
                self.inner.video_search.insert(key, results.clone());
                results
            }
            Err(e) => {
                degraded("video search", &key, &e);
                self.inner.video_search.get_stale(&key).unwrap_or_default()
            }
        }
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("sources", &self.inner.sources)
            .field("roles", &self.inner.roles)
            .field("search", &self.inner.search)
            .field("pages", &self.inner.pages)
            .finish_non_exhaustive()
    }
}

/// Distinct non-empty catalog titles, preferred first.
fn catalog_titles(media: &Media) -> Vec<&str> {
    let mut titles: Vec<&str> = Vec::new();
    for title in [media.preferred_title(), media.title.romaji.as_deref().unwrap_or_default()] {
        let title = title.trim();
        if !title.is_empty() && !titles.iter().any(|t| t.eq_ignore_ascii_case(title)) {
            titles.push(title);
        }
    }
    titles
}

fn spotlight_entry(media: &Media) -> SpotlightEntry {
    SpotlightEntry {
        id: media.id.to_string(),
        title: media.preferred_title().to_string(),
        description: media.description.clone(),
        cover_url: media.cover_url().map(String::from),
        banner_url: media.banner_image.clone(),
        chapters: media.chapters,
        latest_chapter: None,
        average_score: media.average_score,
        genres: media.genres.clone(),
        status: media.status.clone(),
        year: media.year(),
        format: media.format.clone(),
        source: "anilist".to_string(),
    }
}

fn spotlight_from_hot(update: &HotUpdate, prefix: &str) -> Option<SpotlightEntry> {
    let latest = update
        .latest_chapter
        .as_deref()
        .and_then(mangakakalot::chapter_number);

    Some(SpotlightEntry {
        id: apply_prefix(prefix, &html::last_path_segment(&update.url)?),
        title: update.title.clone(),
        description: Some(match &update.latest_chapter {
            Some(label) => format!("Recently updated: {}", label),
            None => "Recently updated".to_string(),
        }),
        cover_url: update.thumbnail_url.clone(),
        chapters: latest.map(|n| n.floor() as u32),
        latest_chapter: latest,
        source: prefix.to_string(),
        ..Default::default()
    })
}

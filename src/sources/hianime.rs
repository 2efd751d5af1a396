//! Secondary anime catalog (HiAnime layout): spotlight carousel, trending strip and
//! search. Server-rendered, so plain HTTP + scraper.

use async_trait::async_trait;
use scraper::ElementRef;

use crate::{
    config::HttpSettings,
    error::Result,
    net::{HttpClient, html},
    source::{MediaKind, Source},
    types::{AnimeSpotlight, SearchResult, TrendingAnime},
};

pub const ID: &str = "hi";

const SPOTLIGHT_ITEM: &str = "#slider .swiper-slide";
const TRENDING_ITEM: &str = "#trending-home .swiper-slide";
const SEARCH_ITEM: &str = ".flw-item";

pub struct HiAnimeSource {
    base_url: String,
    client: HttpClient,
}

impl HiAnimeSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = HttpClient::new(ID)
            .with_rate_limit(500)
            .with_header("Accept", "text/html,application/xhtml+xml")
            .with_header("Referer", &format!("{}/", base_url));
        Self { base_url, client }
    }

    pub fn with_client(mut self, client: HttpClient) -> Self {
        self.client = client;
        self
    }

    pub fn with_http_settings(mut self, settings: &HttpSettings) -> Self {
        self.client = self.client.with_settings(settings);
        self
    }

    async fn home(&self) -> Result<String> {
        self.client.get_text(&format!("{}/home", self.base_url)).await
    }
}

#[async_trait]
impl Source for HiAnimeSource {
    fn id(&self) -> &'static str {
        ID
    }

    fn name(&self) -> &'static str {
        "HiAnime"
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn kind(&self) -> MediaKind {
        MediaKind::Anime
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let url = format!("{}/search?keyword={}", self.base_url, urlencoding::encode(query));
        let body = self.client.get_text(&url).await?;
        Ok(parse_search(&body, &self.base_url))
    }

    async fn get_spotlight(&self) -> Result<Vec<AnimeSpotlight>> {
        Ok(parse_spotlight(&self.home().await?, &self.base_url))
    }

    async fn get_trending(&self) -> Result<Vec<TrendingAnime>> {
        Ok(parse_trending(&self.home().await?, &self.base_url))
    }
}

/// Detail-page slug of a catalog link (`/watch/x?ep=1` and `/x` both give `x`).
fn slug(href: &str) -> Option<String> {
    html::last_path_segment(href)
}

fn poster(item: ElementRef<'_>, base_url: &str) -> Option<String> {
    scraper::Selector::parse("img")
        .ok()
        .and_then(|sel| item.select(&sel).next())
        .and_then(html::image_source)
        .and_then(|src| html::normalize_url(&src, Some(base_url)))
}

fn leading_number(text: &str) -> Option<u32> {
    text.chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect::<String>()
        .parse()
        .ok()
}

/// Parses the home page spotlight carousel.
pub fn parse_spotlight(body: &str, base_url: &str) -> Vec<AnimeSpotlight> {
    let document = html::parse(body);

    html::parse_items(&document, SPOTLIGHT_ITEM, |item| {
        let title = html::child_text(item, ".desi-head-title")?;
        let href = detail_href(item)?;
        let url = html::normalize_url(&href, Some(base_url))?;

        Some(AnimeSpotlight {
            rank: html::child_text(item, ".desi-sub-text")
                .and_then(|t| leading_number(&t))
                .unwrap_or_default(),
            id: slug(&url)?,
            title,
            description: html::child_text(item, ".desi-description"),
            poster_url: poster(item, base_url),
            details: scraper::Selector::parse(".sc-detail .scd-item")
                .map(|sel| {
                    item.select(&sel)
                        .map(|el| html::collapse_whitespace(&el.text().collect::<String>()))
                        .filter(|t| !t.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            url,
        })
    })
    .into_iter()
    .enumerate()
    .map(|(i, mut entry)| {
        if entry.rank == 0 {
            entry.rank = i as u32 + 1;
        }
        entry
    })
    .collect()
}

/// Parses the home page trending strip.
pub fn parse_trending(body: &str, base_url: &str) -> Vec<TrendingAnime> {
    let document = html::parse(body);

    html::parse_items(&document, TRENDING_ITEM, |item| {
        let href = html::child_attr(item, "a.film-poster, a", "href")?;
        let url = html::normalize_url(&href, Some(base_url))?;

        Some(TrendingAnime {
            rank: html::child_text(item, ".number span, .number")
                .and_then(|t| leading_number(&t))
                .unwrap_or_default(),
            id: slug(&url)?,
            title: html::child_text(item, ".film-title, .film-name")
                .or_else(|| html::child_attr(item, "img", "alt"))?,
            poster_url: poster(item, base_url),
            url,
        })
    })
    .into_iter()
    .enumerate()
    .map(|(i, mut entry)| {
        if entry.rank == 0 {
            entry.rank = i as u32 + 1;
        }
        entry
    })
    .collect()
}

/// Parses a search result grid.
pub fn parse_search(body: &str, base_url: &str) -> Vec<SearchResult> {
    let document = html::parse(body);

    html::parse_items(&document, SEARCH_ITEM, |item| {
        let href = html::child_attr(item, ".film-name a", "href")?;
        let url = html::normalize_url(&href, Some(base_url))?;
        let infos = scraper::Selector::parse(".fd-infor .fdi-item")
            .map(|sel| {
                item.select(&sel)
                    .map(|el| html::collapse_whitespace(&el.text().collect::<String>()))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        Some(SearchResult {
            id: slug(&url)?,
            title: html::child_text(item, ".film-name a")?,
            url,
            thumbnail_url: poster(item, base_url),
            latest_label: html::child_text(item, ".tick-sub, .tick-eps").map(|n| format!("Episode {}", n)),
            media_type: infos.into_iter().next().filter(|t| !t.is_empty()),
            source: ID.to_string(),
            ..Default::default()
        })
    })
}

/// The carousel's detail link; the sibling button points at the player.
fn detail_href(item: ElementRef<'_>) -> Option<String> {
    let selector = scraper::Selector::parse(".desi-buttons a").ok()?;
    item.select(&selector)
        .filter_map(|a| a.value().attr("href"))
        .map(str::trim)
        .find(|href| !href.is_empty() && !href.starts_with("/watch"))
        .map(String::from)
}

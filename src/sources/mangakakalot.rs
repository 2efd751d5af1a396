//! Manga catalog extractor (Mangakakalot layout).
//!
//! Search, details and chapter lists are plain HTTP + scraper. Chapter pages try the
//! raw document first and only fall back to a browser when it yields nothing. The
//! hot-updates feed is rendered client-side and always needs a browser.
//!
//! Parsing is split into pure `parse_*` functions over HTML strings so it can be
//! exercised against fixtures.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::ElementRef;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    browser::{BrowserHandle, BrowserPage, BrowserSessionProvider, NON_ESSENTIAL_RESOURCES, ResourceKind},
    config::HttpSettings,
    error::{Error, Result},
    extract::{Strategy, first_non_empty},
    net::{HttpClient, html},
    source::{MediaKind, Source},
    types::{Chapter, HotUpdate, MediaDetails, Page, SearchResult},
};

pub const ID: &str = "mk";

/// Most entries returned by the hot-updates feed.
pub const MAX_HOT_UPDATES: usize = 15;

/// Global variables the reader script stores page URLs in.
pub const PAGE_ARRAY_VARS: &[&str] = &["chapterImages", "chapImages", "images", "imgs", "pages"];

const SEARCH_ITEM: &str = ".story_item, .panel_story_list .story_item, .search-story-item";
const DETAIL_HEADING: &str = ".manga-info-text h1, .story-info-right h1";
const READER_IMAGES: &str = ".container-chapter-reader img, .reading-content img, #vungdoc img";
const CHAPTER_ROWS: &str = ".chapter-list .row, .row-content-chapter li, table.chapter-table tr, table tr";

const HOT_PRIMARY: &str = "#contentstory .itemupdate";
const HOT_FALLBACK: &str = ".truyen-list .list-truyen-item-wrap";

const SELECTOR_TIMEOUT: Duration = Duration::from_secs(10);
const FALLBACK_SELECTOR_TIMEOUT: Duration = Duration::from_secs(3);

static PAGE_ARRAY: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?s)\b(?:{})\s*=\s*(\[[^\]]*\])",
        PAGE_ARRAY_VARS.join("|")
    ))
    .ok()
});
static STRING_LITERAL: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r#""((?:[^"\\]|\\.)*)"|'((?:[^'\\]|\\.)*)'"#).ok());
static INLINE_ASSIGNMENT: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"(?s)(?:var|let|const)?\s*[A-Za-z_$][\w$]*\s*=\s*(\[[^\]]*(?:\.jpe?g|\.png|\.webp)[^\]]*\])")
        .ok()
});
static CHAPTER_NUMBER: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)(?:chapter|ch\.?)[\s-]*(\d+(?:\.\d+)?)").ok());

pub struct MangakakalotSource {
    base_url: String,
    client: HttpClient,
    browser: Arc<BrowserSessionProvider>,
    settle_delay: Duration,
    search_limit: Option<usize>,
}

impl MangakakalotSource {
    pub fn new(base_url: impl Into<String>, browser: Arc<BrowserSessionProvider>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = HttpClient::new(ID)
            .with_rate_limit(500)
            .with_header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .with_header("Accept-Language", "en-US,en;q=0.9")
            .with_header("Referer", &format!("{}/", base_url));

        Self {
            base_url,
            client,
            browser,
            settle_delay: Duration::from_secs(2),
            search_limit: None,
        }
    }

    /// Fixed wait after navigation before reading the hydrated reader.
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_search_limit(mut self, limit: usize) -> Self {
        self.search_limit = Some(limit);
        self
    }

    pub fn with_client(mut self, client: HttpClient) -> Self {
        self.client = client;
        self
    }

    pub fn with_http_settings(mut self, settings: &HttpSettings) -> Self {
        self.client = self.client.with_settings(settings);
        self
    }

    fn search_url(&self, query: &str) -> String {
        let slug = query
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect::<Vec<_>>()
            .join("_")
            .to_lowercase();
        format!("{}/search/story/{}", self.base_url, urlencoding::encode(&slug))
    }

    async fn http_page_urls(&self, chapter_url: &str) -> Result<Vec<String>> {
        let body = self.client.get_text(chapter_url).await?;
        Ok(parse_page_urls(&body))
    }

    async fn browser_page_urls(&self, chapter_url: &str) -> Result<Vec<String>> {
        let handle = self.browser.session().await?;
        let result = self.browser_page_urls_inner(&handle, chapter_url).await;
        self.browser.release(handle).await;
        result
    }

    async fn browser_page_urls_inner(
        &self,
        handle: &BrowserHandle,
        chapter_url: &str,
    ) -> Result<Vec<String>> {
        let page = handle.open_page().await?;

        let result = async {
            let referer = format!("{}/", self.base_url);
            page.set_extra_headers(&[("Referer", referer.as_str())]).await?;
            page.block_resources(NON_ESSENTIAL_RESOURCES).await?;
            page.goto(chapter_url).await?;
            tokio::time::sleep(self.settle_delay).await;

            let globals = globals_script();
            let reader: &dyn BrowserPage = &*page;
            first_non_empty(vec![
                Strategy::new("browser-globals", || evaluate_urls(reader, globals)),
                Strategy::new("browser-img", || evaluate_urls(reader, reader_images_script())),
                Strategy::new("browser-inline-script", || inline_script_urls(reader)),
            ])
            .await
        }
        .await;

        page.close().await;
        result
    }

    async fn hot_updates_inner(&self, handle: &BrowserHandle) -> Result<Vec<HotUpdate>> {
        let page = handle.open_page().await?;

        let result = async {
            page.block_resources(&[ResourceKind::Stylesheet, ResourceKind::Font, ResourceKind::Media])
                .await?;
            page.goto(&self.base_url).await?;

            if !page.wait_for_selector(HOT_PRIMARY, SELECTOR_TIMEOUT).await?
                && !page
                    .wait_for_selector(HOT_FALLBACK, FALLBACK_SELECTOR_TIMEOUT)
                    .await?
            {
                tracing::warn!(source = ID, "no hot-updates container rendered");
            }

            let body = page.content().await?;
            Ok(parse_hot_updates(&body, &self.base_url))
        }
        .await;

        page.close().await;
        result
    }
}

#[async_trait]
impl Source for MangakakalotSource {
    fn id(&self) -> &'static str {
        ID
    }

    fn name(&self) -> &'static str {
        "Mangakakalot"
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn kind(&self) -> MediaKind {
        MediaKind::Manga
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let (final_url, body) = self.client.get_text_with_url(&self.search_url(query)).await?;
        let mut results = parse_search(&body, &final_url, &self.base_url);

        if let Some(limit) = self.search_limit {
            results.truncate(limit);
        }
        Ok(results)
    }

    async fn get_details(&self, id: &str) -> Result<MediaDetails> {
        let url = format!("{}/manga/{}", self.base_url, id);
        let body = self.client.get_text(&url).await?;
        parse_details(&body, id, &url, &self.base_url)
    }

    async fn get_chapters(&self, id: &str) -> Result<Vec<Chapter>> {
        let url = format!("{}/manga/{}", self.base_url, id);
        let body = self.client.get_text(&url).await?;
        Ok(parse_chapters(&body, &self.base_url))
    }

    /// Fast path over the raw document, browser fallback when it finds nothing.
    async fn get_pages(&self, chapter_url: &str) -> Result<Vec<Page>> {
        let urls = first_non_empty(vec![
            Strategy::new("http", || self.http_page_urls(chapter_url)),
            Strategy::new("browser", || self.browser_page_urls(chapter_url)),
        ])
        .await?;

        Ok(to_pages(urls, chapter_url))
    }

    async fn get_hot_updates(&self) -> Result<Vec<HotUpdate>> {
        let handle = self.browser.session().await?;
        let result = self.hot_updates_inner(&handle).await;
        self.browser.release(handle).await;
        result
    }
}

async fn evaluate_urls(page: &dyn BrowserPage, script: String) -> Result<Vec<String>> {
    Ok(string_array(&page.evaluate(&script).await?))
}

/// Finds an inline array assignment of image URLs and evaluates it in the page.
async fn inline_script_urls(page: &dyn BrowserPage) -> Result<Vec<String>> {
    let body = page.content().await?;
    let literal = INLINE_ASSIGNMENT
        .as_ref()
        .and_then(|re| re.captures(&body))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| Error::parse("no inline image array in reader scripts"))?;

    let script = format!(
        "(() => {{ const v = {}; return Array.isArray(v) ? v.filter(x => typeof x === 'string') : []; }})()",
        literal
    );
    Ok(string_array(&page.evaluate(&script).await?))
}

fn globals_script() -> String {
    let names = serde_json::to_string(PAGE_ARRAY_VARS).unwrap_or_else(|_| "[]".to_string());
    format!(
        r#"(() => {{
  for (const name of {names}) {{
    let v;
    try {{ v = window[name] !== undefined ? window[name] : eval(name); }} catch (e) {{ v = undefined; }}
    if (Array.isArray(v) && v.length && v.every(x => typeof x === "string")) return v;
  }}
  return [];
}})()"#
    )
}

fn reader_images_script() -> String {
    format!(
        r#"Array.from(document.querySelectorAll({selector}))
  .map(img => img.getAttribute("data-src") || img.getAttribute("src") || "")
  .filter(src => src && !src.startsWith("data:"))"#,
        selector = serde_json::to_string(READER_IMAGES).unwrap_or_else(|_| "\"img\"".to_string())
    )
}

fn string_array(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Normalizes, de-duplicates and indexes page image URLs, keeping their order.
pub fn to_pages(urls: Vec<String>, chapter_url: &str) -> Vec<Page> {
    let mut seen = HashSet::new();
    urls.iter()
        .filter_map(|raw| html::normalize_url(raw, Some(chapter_url)))
        .filter(|url| seen.insert(url.clone()))
        .enumerate()
        .map(|(index, image_url)| Page { index, image_url })
        .collect()
}

/// Chapter number from a "Chapter 12.5" style label.
pub fn chapter_number(label: &str) -> Option<f64> {
    CHAPTER_NUMBER
        .as_ref()?
        .captures(label)?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}

/// Parses a search listing.
///
/// A single-hit search redirects straight to the detail page; in that case the
/// listing is empty and one result is built from the detail heading and `final_url`.
pub fn parse_search(body: &str, final_url: &str, base_url: &str) -> Vec<SearchResult> {
    let document = html::parse(body);

    let results = html::parse_items(&document, SEARCH_ITEM, |item| parse_search_item(item, base_url));
    if !results.is_empty() {
        return results;
    }

    let Some(title) = html::select_text(&document, DETAIL_HEADING) else {
        return Vec::new();
    };
    let Some(id) = html::last_path_segment(final_url) else {
        return Vec::new();
    };

    vec![SearchResult {
        id,
        title,
        url: final_url.to_string(),
        thumbnail_url: cover_url(&document, base_url),
        alt_names: alt_names(&document),
        author: labelled_value(&document, "author"),
        source: ID.to_string(),
        ..Default::default()
    }]
}

fn parse_search_item(item: ElementRef<'_>, base_url: &str) -> Option<SearchResult> {
    let href = html::child_attr(item, ".story_name a, h3 a", "href")?;
    let url = html::normalize_url(&href, Some(base_url))?;
    let title = html::child_text(item, ".story_name a, h3 a")?;
    let thumbnail_url = scraper::Selector::parse("img")
        .ok()
        .and_then(|sel| item.select(&sel).next())
        .and_then(html::image_source)
        .and_then(|src| html::normalize_url(&src, Some(base_url)));
    let author = item_spans(item)
        .into_iter()
        .find(|text| text.to_lowercase().starts_with("author"))
        .and_then(|text| after_colon(&text));

    Some(SearchResult {
        id: html::last_path_segment(&url)?,
        title,
        url,
        thumbnail_url,
        latest_label: html::child_text(item, ".story_chapter a, .item-chapter a"),
        author,
        source: ID.to_string(),
        ..Default::default()
    })
}

fn item_spans(item: ElementRef<'_>) -> Vec<String> {
    scraper::Selector::parse("span")
        .map(|sel| {
            item.select(&sel)
                .map(|el| html::collapse_whitespace(&el.text().collect::<String>()))
                .collect()
        })
        .unwrap_or_default()
}

fn after_colon(text: &str) -> Option<String> {
    text.split_once(':')
        .map(|(_, value)| value.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// `li`/`td` text following a label such as "Author(s) :" or "Status :".
fn labelled_value(document: &scraper::Html, label: &str) -> Option<String> {
    html::select_all_text(document, ".manga-info-text li, .variations-tableInfo tr")
        .into_iter()
        .find(|text| text.to_lowercase().starts_with(label))
        .and_then(|text| after_colon(&text))
}

fn alt_names(document: &scraper::Html) -> Vec<String> {
    html::select_text(document, ".story-alternative, h2.story-alternative")
        .or_else(|| labelled_value(document, "alternative"))
        .map(|raw| {
            let raw = after_colon(&raw).unwrap_or(raw);
            raw.split(';')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

fn cover_url(document: &scraper::Html, base_url: &str) -> Option<String> {
    scraper::Selector::parse(".manga-info-pic img, .story-info-left .info-image img")
        .ok()
        .and_then(|sel| document.select(&sel).next())
        .and_then(html::image_source)
        .and_then(|src| html::normalize_url(&src, Some(base_url)))
}

/// Parses a title's detail page.
///
/// # Errors
///
/// [`Error::Parse`] when the page has no detail heading.
pub fn parse_details(body: &str, id: &str, url: &str, base_url: &str) -> Result<MediaDetails> {
    let document = html::parse(body);
    let title = html::select_text(&document, DETAIL_HEADING)
        .ok_or_else(|| Error::parse(format!("no detail heading at {}", url)))?;

    let synopsis = html::select_text(&document, "#contentBox, #panel-story-info-description").map(|text| {
        let heading = html::select_text(&document, "#contentBox h2, #panel-story-info-description h3");
        match heading {
            Some(h) => text.strip_prefix(&h).unwrap_or(&text).trim().to_string(),
            None => text,
        }
    });

    Ok(MediaDetails {
        id: id.to_string(),
        title,
        alt_names: alt_names(&document),
        author: labelled_value(&document, "author"),
        status: labelled_value(&document, "status"),
        genres: html::select_all_text(&document, ".manga-info-text li.genres a, .variations-tableInfo a[href*='genre']"),
        synopsis: synopsis.filter(|s| !s.is_empty()),
        cover_url: cover_url(&document, base_url),
        canonical_url: url.to_string(),
    })
}

/// Parses the chapter table, keeping document order.
///
/// Only rows with a link mentioning "chapter" count. The chapter id is the last path
/// segment of its link.
pub fn parse_chapters(body: &str, base_url: &str) -> Vec<Chapter> {
    let document = html::parse(body);
    let (Ok(rows), Ok(link), Ok(cell)) = (
        scraper::Selector::parse(CHAPTER_ROWS),
        scraper::Selector::parse("a"),
        scraper::Selector::parse("span, td"),
    ) else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    document
        .select(&rows)
        .filter_map(|row| {
            let anchor = row.select(&link).find(|a| {
                let text = a.text().collect::<String>().to_lowercase();
                let href = a.value().attr("href").unwrap_or_default().to_lowercase();
                text.contains("chapter") || href.contains("chapter")
            })?;
            let url = html::normalize_url(anchor.value().attr("href")?, Some(base_url))?;
            let title = html::collapse_whitespace(&anchor.text().collect::<String>());
            let uploaded_at = row
                .select(&cell)
                .filter(|c| c.value().attr("title").is_some() || c.value().name() == "td")
                .last()
                .map(|c| html::collapse_whitespace(&c.text().collect::<String>()))
                .filter(|t| !t.is_empty() && *t != title);

            seen.insert(url.clone()).then(|| (url, title, uploaded_at))
        })
        .enumerate()
        .filter_map(|(order_index, (url, title, uploaded_at))| {
            Some(Chapter {
                id: html::last_path_segment(&url)?,
                order_index,
                number: chapter_number(&title),
                title,
                url,
                uploaded_at,
            })
        })
        .collect()
}

/// Fast-path page extraction from a raw chapter document.
///
/// Looks for a known JS array variable holding URL string literals first, then for
/// reader `img` tags.
pub fn parse_page_urls(body: &str) -> Vec<String> {
    let from_scripts: Vec<String> = PAGE_ARRAY
        .as_ref()
        .into_iter()
        .flat_map(|re| re.captures_iter(body))
        .filter_map(|caps| caps.get(1))
        .map(|array| string_literals(array.as_str()))
        .find(|urls| !urls.is_empty())
        .unwrap_or_default();
    if !from_scripts.is_empty() {
        return from_scripts;
    }

    let document = html::parse(body);
    scraper::Selector::parse(READER_IMAGES)
        .map(|sel| document.select(&sel).filter_map(html::image_source).collect())
        .unwrap_or_default()
}

fn string_literals(array: &str) -> Vec<String> {
    STRING_LITERAL
        .as_ref()
        .map(|re| {
            re.captures_iter(array)
                .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
                .map(|m| m.as_str().replace("\\/", "/"))
                .filter(|s| s.starts_with("http") || s.starts_with("//") || s.starts_with('/'))
                .collect()
        })
        .unwrap_or_default()
}

/// Parses the rendered home page's latest-updates block, at most [`MAX_HOT_UPDATES`].
pub fn parse_hot_updates(body: &str, base_url: &str) -> Vec<HotUpdate> {
    let document = html::parse(body);

    let parse = |item: ElementRef<'_>| {
        let href = html::child_attr(item, "h3 a", "href")?;
        let thumbnail_url = scraper::Selector::parse("img")
            .ok()
            .and_then(|sel| item.select(&sel).next())
            .and_then(html::image_source)
            .and_then(|src| html::normalize_url(&src, Some(base_url)));

        Some(HotUpdate {
            title: html::child_text(item, "h3 a")?,
            latest_chapter: html::child_text(item, "ul li span a, a.list-story-item-wrap-chapter"),
            thumbnail_url,
            url: html::normalize_url(&href, Some(base_url))?,
        })
    };

    let mut updates = html::parse_items(&document, HOT_PRIMARY, parse);
    if updates.is_empty() {
        updates = html::parse_items(&document, HOT_FALLBACK, parse);
    }
    updates.truncate(MAX_HOT_UPDATES);
    updates
}

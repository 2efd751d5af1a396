//! Video catalog extractor (AnimePahe layout).
//!
//! The site's JSON API sits behind a bot-mitigation interstitial, so every call goes
//! through a browser page and polls until the body turns into JSON. Stream discovery
//! reads the play page's resolution menu, then resolves each embed player to a direct
//! media URL.
//!
//! Embed resolution is best-effort per candidate. Its outcome is logged as one of:
//!
//! - `no packed script` (debug): the embed page has no `eval(function(p,a,c,k,e,d)…)` payload
//! - `packed script without source` (warn): the payload ran but no media URL came out, which
//!   usually means the obfuscation changed
//! - `embed resolution failed` (warn): navigation or evaluation failed, usually transient

use async_trait::async_trait;
use futures::future;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    browser::{BrowserHandle, BrowserPage, BrowserSessionProvider, NON_ESSENTIAL_RESOURCES, wait_for_json_body},
    error::Result,
    net::{html, json},
    source::{MediaKind, Source},
    types::{Episode, EpisodePage, SearchResult, StreamCandidate},
};

pub const ID: &str = "ap";

/// Upper bound on waiting for the bot-mitigation page to hand over JSON.
pub const JSON_WAIT: Duration = Duration::from_secs(8);

const RESOLUTION_MENU: &str = "#resolutionMenu button";
const MENU_WAIT: Duration = Duration::from_secs(10);

const PLAYER_SOURCE_SCRIPT: &str = r#"(() => {
  const el = document.querySelector("video source[src], video[src], source[src]");
  if (el && el.src) return el.src;
  if (typeof source === "string") return source;
  return null;
})()"#;

static PACKED_SCRIPT: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?s)eval\(function\(p,a,c,k,e,d\).*?\.split\('\|'\).*?\)\)").ok());
static SOURCE_ASSIGNMENT: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r#"(?:source|file|src)\s*[=:]\s*['"](https?://[^'"]+)['"]"#).ok());
static MEDIA_URL: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r#"https?://[^'"\s\\]+\.(?:m3u8|mp4)[^'"\s\\]*"#).ok());

pub struct AnimePaheSource {
    base_url: String,
    embed_referer: String,
    browser: Arc<BrowserSessionProvider>,
    json_wait: Duration,
    settle_delay: Duration,
}

impl AnimePaheSource {
    pub fn new(base_url: impl Into<String>, browser: Arc<BrowserSessionProvider>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            embed_referer: format!("{}/", base_url),
            base_url,
            browser,
            json_wait: JSON_WAIT,
            settle_delay: Duration::from_secs(2),
        }
    }

    /// `Referer`/`Origin` sent to embed players.
    pub fn with_embed_referer(mut self, referer: impl Into<String>) -> Self {
        self.embed_referer = referer.into();
        self
    }

    pub fn with_json_wait(mut self, wait: Duration) -> Self {
        self.json_wait = wait;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Opens `url` in a fresh session and returns the JSON payload behind the guard.
    async fn fetch_json(&self, url: &str) -> Result<Value> {
        let handle = self.browser.session().await?;
        let result = self.fetch_json_inner(&handle, url).await;
        self.browser.release(handle).await;
        result
    }

    async fn fetch_json_inner(&self, handle: &BrowserHandle, url: &str) -> Result<Value> {
        let page = handle.open_page().await?;

        let result = async {
            page.block_resources(NON_ESSENTIAL_RESOURCES).await?;
            page.goto(url).await?;
            let body = wait_for_json_body(&*page, self.json_wait).await?;
            json::parse_embedded_object(&body)
        }
        .await;

        page.close().await;
        result
    }

    async fn streams_inner(&self, handle: &BrowserHandle, play_url: &str) -> Result<Vec<StreamCandidate>> {
        let page = handle.open_page().await?;

        let result: Result<Vec<StreamCandidate>> = async {
            page.block_resources(NON_ESSENTIAL_RESOURCES).await?;
            page.goto(play_url).await?;
            if !page.wait_for_selector(RESOLUTION_MENU, MENU_WAIT).await? {
                tracing::warn!(source = ID, url = play_url, "resolution menu never rendered");
            }
            Ok(parse_stream_options(&page.content().await?))
        }
        .await;

        page.close().await;
        let mut candidates = result?;

        let resolutions = future::join_all(
            candidates
                .iter()
                .map(|candidate| self.resolve_embed(handle, &candidate.embed_url)),
        )
        .await;

        for (candidate, resolution) in candidates.iter_mut().zip(resolutions) {
            match resolution {
                Ok(Some(url)) => {
                    candidate.resolved_direct_url = Some(url);
                    candidate.is_direct_playable = true;
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(
                    source = ID,
                    url = %candidate.embed_url,
                    kind = ?e.kind(),
                    error = %e,
                    "embed resolution failed"
                ),
            }
        }

        Ok(candidates)
    }

    /// Recovers the media URL behind one embed player.
    async fn resolve_embed(&self, handle: &BrowserHandle, embed_url: &str) -> Result<Option<String>> {
        let page = handle.open_page().await?;
        let result = self.resolve_embed_inner(&*page, embed_url).await;
        page.close().await;
        result
    }

    async fn resolve_embed_inner(&self, page: &dyn BrowserPage, embed_url: &str) -> Result<Option<String>> {
        let origin = self.embed_referer.trim_end_matches('/');
        page.set_extra_headers(&[("Referer", self.embed_referer.as_str()), ("Origin", origin)])
            .await?;
        page.goto(embed_url).await?;
        tokio::time::sleep(self.settle_delay).await;

        match page.evaluate(PLAYER_SOURCE_SCRIPT).await {
            Ok(value) => {
                if let Some(url) = value.as_str().filter(|url| url.starts_with("http")) {
                    return Ok(Some(url.to_string()));
                }
            }
            Err(e) => tracing::debug!(
                source = ID,
                url = embed_url,
                error = %e,
                "player source lookup failed, trying packed script"
            ),
        }

        let Some(packed) = find_packed_script(&page.content().await?) else {
            tracing::debug!(source = ID, url = embed_url, "no packed script");
            return Ok(None);
        };

        let unpacked = page.evaluate(&capture_eval_script(&packed)?).await?;
        let found = unpacked.as_str().and_then(extract_source_url);
        if found.is_none() {
            tracing::warn!(
                source = ID,
                url = embed_url,
                unpacked_len = unpacked.as_str().map_or(0, str::len),
                "packed script without source"
            );
        }
        Ok(found)
    }
}

#[async_trait]
impl Source for AnimePaheSource {
    fn id(&self) -> &'static str {
        ID
    }

    fn name(&self) -> &'static str {
        "AnimePahe"
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn kind(&self) -> MediaKind {
        MediaKind::Anime
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let url = format!("{}/api?m=search&q={}", self.base_url, urlencoding::encode(query));
        let payload = self.fetch_json(&url).await?;
        Ok(parse_search(&payload, &self.base_url))
    }

    async fn get_episodes(&self, id: &str, page: u32) -> Result<EpisodePage> {
        let url = format!(
            "{}/api?m=release&id={}&sort=episode_asc&page={}",
            self.base_url,
            urlencoding::encode(id),
            page.max(1)
        );
        let payload = self.fetch_json(&url).await?;
        Ok(parse_episodes(&payload, id, &self.base_url))
    }

    async fn get_stream_links(&self, anime_id: &str, episode_id: &str) -> Result<Vec<StreamCandidate>> {
        let play_url = format!("{}/play/{}/{}", self.base_url, anime_id, episode_id);
        let handle = self.browser.session().await?;
        let result = self.streams_inner(&handle, &play_url).await;
        self.browser.release(handle).await;
        result
    }
}

/// Parses the search API payload.
pub fn parse_search(payload: &Value, base_url: &str) -> Vec<SearchResult> {
    json::extract_array(payload, "data")
        .iter()
        .filter_map(|item| {
            let session = json::extract_string(item, "session")?;
            let episodes = json::extract_path(item, "episodes").and_then(Value::as_u64);

            Some(SearchResult {
                url: format!("{}/anime/{}", base_url, session),
                id: session,
                title: json::extract_string(item, "title")?,
                thumbnail_url: json::extract_string(item, "poster"),
                latest_label: episodes.filter(|&n| n > 0).map(|n| format!("{} episodes", n)),
                year: json::extract_path(item, "year")
                    .and_then(Value::as_i64)
                    .map(|y| y as i32),
                media_type: json::extract_string(item, "type"),
                source: ID.to_string(),
                ..Default::default()
            })
        })
        .collect()
}

/// Parses one page of the release API payload.
pub fn parse_episodes(payload: &Value, anime_id: &str, base_url: &str) -> EpisodePage {
    let episodes = json::extract_array(payload, "data")
        .iter()
        .filter_map(|item| {
            let session = json::extract_string(item, "session")?;
            let number = json::extract_string(item, "episode")?.parse::<f64>().ok()?;
            Some((session, number, item))
        })
        .enumerate()
        .map(|(order_index, (session, number, item))| Episode {
            url: format!("{}/play/{}/{}", base_url, anime_id, session),
            id: session,
            order_index,
            number,
            title: json::extract_string(item, "title").unwrap_or_default(),
            duration_label: json::extract_string(item, "duration"),
            snapshot_url: json::extract_string(item, "snapshot"),
        })
        .collect();

    let page_number = |path: &str| {
        json::extract_path(payload, path)
            .and_then(Value::as_u64)
            .map(|n| n as u32)
    };
    let current_page = page_number("current_page").unwrap_or(1);

    EpisodePage {
        episodes,
        current_page,
        last_page: page_number("last_page").unwrap_or(current_page),
    }
}

/// Reads stream options from a rendered play page's resolution menu.
pub fn parse_stream_options(body: &str) -> Vec<StreamCandidate> {
    let document = html::parse(body);
    let Ok(selector) = scraper::Selector::parse(RESOLUTION_MENU) else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter_map(|button| {
            let attr = |name: &str| {
                button
                    .value()
                    .attr(name)
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(String::from)
            };

            Some(StreamCandidate {
                embed_url: html::normalize_url(&attr("data-src")?, None)?,
                quality: attr("data-resolution").unwrap_or_default(),
                audio_track: attr("data-audio").unwrap_or_else(|| "jpn".to_string()),
                fansub: attr("data-fansub"),
                resolved_direct_url: None,
                is_direct_playable: false,
            })
        })
        .collect()
}

/// The first `eval(function(p,a,c,k,e,d)…)` payload in a document.
pub fn find_packed_script(body: &str) -> Option<String> {
    PACKED_SCRIPT
        .as_ref()?
        .find(body)
        .map(|m| m.as_str().to_string())
}

/// Builds a page script that runs `packed` with `eval` swapped out, returning the
/// source text the packer would have evaluated.
pub fn capture_eval_script(packed: &str) -> Result<String> {
    let literal = serde_json::to_string(packed)?;
    Ok(format!(
        r#"(() => {{
  let captured = null;
  const original = window.eval;
  window.eval = (code) => {{ captured = String(code); }};
  try {{ original({literal}); }} catch (e) {{}} finally {{ window.eval = original; }}
  return captured;
}})()"#
    ))
}

/// Media URL in unpacked player source.
pub fn extract_source_url(unpacked: &str) -> Option<String> {
    SOURCE_ASSIGNMENT
        .as_ref()
        .and_then(|re| re.captures(unpacked))
        .and_then(|caps| caps.get(1))
        .or_else(|| MEDIA_URL.as_ref().and_then(|re| re.find(unpacked)))
        .map(|m| m.as_str().to_string())
}

//! Runtime configuration.
//!
//! Every setting has a default, so `Config::default()` is a working development
//! configuration. [`Config::from_env`] overlays `SHIORI_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub browser: BrowserSettings,
    #[serde(default)]
    pub sources: SourceSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub http: HttpSettings,
}

/// Deployment environment. Decides which browser binary path is used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    /// Serverless-compatible Chromium at an explicit path.
    Production,
    /// Locally installed Chrome/Chromium.
    #[default]
    Development,
}

/// Headless browser configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserSettings {
    #[serde(default)]
    pub environment: Environment,

    /// Chromium executable. Required in production.
    #[serde(default)]
    pub executable: Option<PathBuf>,

    #[serde(default = "default_headless")]
    pub headless: bool,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Additional Chrome arguments.
    #[serde(default)]
    pub chrome_args: Vec<String>,

    /// Fixed delay after navigation before reading hydrated globals.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Navigation timeout in seconds.
    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout_secs: u64,

    /// Reuse one browser process across extractor calls instead of launching per call.
    #[serde(default = "default_shared")]
    pub shared: bool,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            executable: None,
            headless: default_headless(),
            user_agent: default_user_agent(),
            chrome_args: Vec::new(),
            settle_delay_ms: default_settle_delay_ms(),
            navigation_timeout_secs: default_navigation_timeout(),
            shared: default_shared(),
        }
    }
}

impl BrowserSettings {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }
}

/// Upstream site locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSettings {
    #[serde(default = "default_manga_url")]
    pub manga_base_url: String,
    #[serde(default = "default_video_url")]
    pub video_base_url: String,
    /// `Referer`/`Origin` sent when opening embed players. Defaults to the video site.
    #[serde(default)]
    pub video_embed_referer: Option<String>,
    #[serde(default = "default_anime_url")]
    pub anime_base_url: String,
    #[serde(default = "default_anilist_url")]
    pub anilist_endpoint: String,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            manga_base_url: default_manga_url(),
            video_base_url: default_video_url(),
            video_embed_referer: None,
            anime_base_url: default_anime_url(),
            anilist_endpoint: default_anilist_url(),
        }
    }
}

/// Cache lifetimes, per operation class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_search_ttl")]
    pub search_ttl_secs: u64,
    #[serde(default = "default_pages_ttl")]
    pub pages_ttl_secs: u64,
    #[serde(default = "default_feed_ttl")]
    pub feed_ttl_secs: u64,
    /// Entry count above which a write sweeps expired page/stream entries.
    #[serde(default = "default_sweep_threshold")]
    pub pages_sweep_threshold: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            search_ttl_secs: default_search_ttl(),
            pages_ttl_secs: default_pages_ttl(),
            feed_ttl_secs: default_feed_ttl(),
            pages_sweep_threshold: default_sweep_threshold(),
        }
    }
}

/// Plain HTTP fetch behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSettings {
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_ms: u64,
    #[serde(default)]
    pub max_retries: u32,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout(),
            rate_limit_ms: default_rate_limit(),
            max_retries: 0,
        }
    }
}

pub fn default_headless() -> bool {
    true
}

pub fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36".to_string()
}

pub fn default_settle_delay_ms() -> u64 {
    2000
}

pub fn default_navigation_timeout() -> u64 {
    15
}

pub fn default_shared() -> bool {
    true
}

pub fn default_manga_url() -> String {
    "https://www.mangakakalot.gg".to_string()
}

pub fn default_video_url() -> String {
    "https://animepahe.si".to_string()
}

pub fn default_anime_url() -> String {
    "https://hianime.to".to_string()
}

pub fn default_anilist_url() -> String {
    "https://graphql.anilist.co".to_string()
}

pub fn default_search_ttl() -> u64 {
    5 * 60
}

pub fn default_pages_ttl() -> u64 {
    30 * 60
}

pub fn default_feed_ttl() -> u64 {
    15 * 60
}

pub fn default_sweep_threshold() -> usize {
    100
}

pub fn default_http_timeout() -> u64 {
    15
}

pub fn default_rate_limit() -> u64 {
    250
}

impl Config {
    /// Builds a configuration from defaults overlaid with `SHIORI_*` environment variables.
    ///
    /// Unparseable numeric or boolean values are ignored and the default is kept.
    pub fn from_env() -> Self {
        let mut config = Config::default();

        if let Some(env) = env_var("SHIORI_ENV") {
            config.browser.environment = match env.to_ascii_lowercase().as_str() {
                "production" | "prod" => Environment::Production,
                _ => Environment::Development,
            };
        }
        if let Some(path) = env_var("SHIORI_CHROMIUM_PATH") {
            config.browser.executable = Some(PathBuf::from(path));
        }
        if let Some(headless) = env_var("SHIORI_HEADLESS") {
            config.browser.headless = headless != "0" && !headless.eq_ignore_ascii_case("false");
        }
        if let Some(shared) = env_var("SHIORI_SHARED_BROWSER") {
            config.browser.shared = shared != "0" && !shared.eq_ignore_ascii_case("false");
        }
        if let Some(ua) = env_var("SHIORI_USER_AGENT") {
            config.browser.user_agent = ua;
        }
        if let Some(delay) = env_var("SHIORI_SETTLE_DELAY_MS").and_then(|v| v.parse().ok()) {
            config.browser.settle_delay_ms = delay;
        }
        if let Some(url) = env_var("SHIORI_MANGA_URL") {
            config.sources.manga_base_url = url;
        }
        if let Some(url) = env_var("SHIORI_VIDEO_URL") {
            config.sources.video_base_url = url;
        }
        if let Some(referer) = env_var("SHIORI_EMBED_REFERER") {
            config.sources.video_embed_referer = Some(referer);
        }
        if let Some(url) = env_var("SHIORI_ANIME_URL") {
            config.sources.anime_base_url = url;
        }
        if let Some(url) = env_var("SHIORI_ANILIST_URL") {
            config.sources.anilist_endpoint = url;
        }
        if let Some(timeout) = env_var("SHIORI_HTTP_TIMEOUT").and_then(|v| v.parse().ok()) {
            config.http.timeout_secs = timeout;
        }

        config
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

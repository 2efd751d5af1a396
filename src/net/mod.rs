//! Network utilities for HTTP requests, rate limiting, and content parsing.
//!
//! This module provides the plain-HTTP side of the extractors:
//!
//! - **HTTP Client**: A global, configured reqwest client with connection pooling
//! - **Rate Limiting**: Per-source spacing of requests to bound load on upstream sites
//! - **Content Parsing**: HTML and JSON helpers in [`html`] and [`json`]
//!
//! Transport failures are not retried automatically unless a client opts in with
//! [`HttpClient::with_max_retries`].
//!
//! # Examples
//!
//! ```rust
//! use shiori::net::HttpClient;
//!
//! # async fn example() -> shiori::Result<()> {
//! let client = HttpClient::new("mk")
//!     .with_rate_limit(500)
//!     .with_header("Referer", "https://example.com/");
//!
//! let html = client.get_text("https://example.com").await?;
//! # Ok(())
//! # }
//! ```

use bytes::Bytes;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use reqwest::{Client, Response, header::HeaderMap};
use serde::{Serialize, de::DeserializeOwned};
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub mod html;
pub mod json;

/// Fixed request timeout for bare network fetches.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Global HTTP client instance.
///
/// This client is configured with:
/// - 15-second request timeout
/// - Connection pooling (10 idle connections per host)
/// - Compression support (gzip, brotli)
/// - Redirect following (the manga search relies on the final URL)
static CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(concat!("Shiori/", env!("CARGO_PKG_VERSION")))
        .pool_max_idle_per_host(10)
        .gzip(true)
        .brotli(true)
        .build()
        .unwrap_or_else(|_| Client::new())
});

/// Per-source rate limiter to prevent overwhelming upstream sites.
///
/// Tracks the last request time for each source and enforces a minimum delay
/// between requests. Safe to share across tasks.
#[derive(Debug)]
pub struct RateLimiter {
    last_request: Mutex<HashMap<String, Instant>>,
    default_delay: Duration,
}

impl Clone for RateLimiter {
    fn clone(&self) -> Self {
        Self {
            last_request: Mutex::new(HashMap::new()),
            default_delay: self.default_delay,
        }
    }
}

impl RateLimiter {
    /// Creates a new rate limiter with the specified default delay in milliseconds.
    pub fn new(delay_ms: u64) -> Self {
        Self {
            last_request: Mutex::new(HashMap::new()),
            default_delay: Duration::from_millis(delay_ms),
        }
    }

    /// Waits if necessary before allowing a request for the specified source.
    pub async fn wait(&self, source_id: &str) {
        let now = Instant::now();
        let wait_duration = {
            let last_map = self.last_request.lock();
            last_map.get(source_id).and_then(|&last| {
                let elapsed = now.duration_since(last);
                (elapsed < self.default_delay).then(|| self.default_delay - elapsed)
            })
        };

        if let Some(duration) = wait_duration {
            tokio::time::sleep(duration).await;
        }

        self.last_request
            .lock()
            .insert(source_id.to_string(), Instant::now());
    }
}

/// HTTP client wrapper with per-source rate limiting and default headers.
///
/// Each client is associated with a source prefix, which is used both as the
/// rate-limit key and as the `src` of [`Error::Source`](crate::Error::Source) errors.
///
/// # Examples
///
/// ```rust
/// use shiori::net::HttpClient;
///
/// # async fn example() -> shiori::Result<()> {
/// let client = HttpClient::new("ap").with_rate_limit(1000);
/// let (final_url, html) = client.get_text_with_url("https://example.com/search?q=x").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct HttpClient {
    source_id: String,
    rate_limiter: RateLimiter,
    max_retries: u32,
    timeout: Option<Duration>,
    headers: HeaderMap,
}

impl HttpClient {
    /// Creates a new HTTP client for the specified source.
    ///
    /// Defaults: 250ms between requests, no automatic retries.
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            rate_limiter: RateLimiter::new(250),
            max_retries: 0,
            timeout: None,
            headers: HeaderMap::new(),
        }
    }

    /// Sets the rate limit delay for this client.
    pub fn with_rate_limit(mut self, delay_ms: u64) -> Self {
        self.rate_limiter = RateLimiter::new(delay_ms);
        self
    }

    /// Sets the maximum number of retries for failed requests.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Overrides the global request timeout for this client.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Applies the configured timeout, retry count and request spacing.
    pub fn with_settings(self, settings: &crate::config::HttpSettings) -> Self {
        self.with_rate_limit(settings.rate_limit_ms)
            .with_max_retries(settings.max_retries)
            .with_timeout(Duration::from_secs(settings.timeout_secs))
    }

    /// Adds a custom header to all requests made by this client.
    ///
    /// Invalid header names or values are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            name.parse::<reqwest::header::HeaderName>(),
            value.parse::<reqwest::header::HeaderValue>(),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Returns the source prefix this client was created for.
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Performs a GET request with rate limiting and optional retries.
    ///
    /// 429 responses are retried with exponential backoff while retries remain and
    /// otherwise surface as [`Error::RateLimit`](crate::Error::RateLimit).
    async fn send_get(&self, url: &str) -> crate::Result<Response> {
        let mut attempts = 0;

        loop {
            self.rate_limiter.wait(&self.source_id).await;
            tracing::debug!(source = %self.source_id, url, "GET");

            let mut request = CLIENT.get(url).headers(self.headers.clone());
            if let Some(timeout) = self.timeout {
                request = request.timeout(timeout);
            }

            match request.send().await {
                Ok(response) => {
                    if response.status().is_success() {
                        return Ok(response);
                    }

                    if response.status() == 429 {
                        if attempts < self.max_retries {
                            attempts += 1;
                            let delay = Duration::from_secs(2_u64.pow(attempts));
                            tokio::time::sleep(delay).await;
                            continue;
                        }

                        let retry_after = response
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse::<u64>().ok());

                        return Err(crate::Error::rate_limit(retry_after));
                    }

                    return Err(crate::Error::source(
                        &self.source_id,
                        format!("HTTP {} for {}", response.status(), url),
                    ));
                }
                Err(e) => {
                    if attempts < self.max_retries {
                        attempts += 1;
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        continue;
                    }
                    return Err(e.into());
                }
            }
        }
    }

    /// Performs a GET request and returns the raw body.
    ///
    /// # Errors
    ///
    /// * [`Error::RateLimit`](crate::Error::RateLimit) - If rate limited after retries
    /// * [`Error::Source`](crate::Error::Source) - For HTTP errors (4xx, 5xx)
    /// * [`Error::Network`](crate::Error::Network) - For network/connection errors
    pub async fn get(&self, url: &str) -> crate::Result<Bytes> {
        let response = self.send_get(url).await?;
        Ok(response.bytes().await?)
    }

    /// Performs a GET request and returns the response as a UTF-8 string.
    pub async fn get_text(&self, url: &str) -> crate::Result<String> {
        let bytes = self.get(url).await?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| crate::Error::parse(format!("Invalid UTF-8: {}", e)))
    }

    /// Performs a GET request and returns the final URL (after redirects) with the body.
    pub async fn get_text_with_url(&self, url: &str) -> crate::Result<(String, String)> {
        let response = self.send_get(url).await?;
        let final_url = response.url().to_string();
        let body = response.text().await?;
        Ok((final_url, body))
    }

    /// Performs a GET request and deserializes the response as JSON.
    pub async fn get_json<T>(&self, url: &str) -> crate::Result<T>
    where
        T: DeserializeOwned,
    {
        let bytes = self.get(url).await?;
        serde_json::from_slice(&bytes).map_err(Into::into)
    }

    /// Performs a POST request with a JSON body and deserializes the JSON response.
    ///
    /// Used by the GraphQL metadata gateway. Not retried.
    pub async fn post_json<B, T>(&self, url: &str, body: &B) -> crate::Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.rate_limiter.wait(&self.source_id).await;
        tracing::debug!(source = %self.source_id, url, "POST");

        let mut request = CLIENT.post(url).headers(self.headers.clone()).json(body);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await?;

        if response.status() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            return Err(crate::Error::rate_limit(retry_after));
        }
        if !response.status().is_success() {
            return Err(crate::Error::source(
                &self.source_id,
                format!("HTTP {} for {}", response.status(), url),
            ));
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(Into::into)
    }
}

//! Headless browser sessions for JS-rendered and bot-protected pages.
//!
//! The extractors only see three narrow traits:
//!
//! - [`BrowserLauncher`] starts a browser process
//! - [`Browser`] opens pages and is closed when its owner is done with it
//! - [`BrowserPage`] navigates, waits, and evaluates script in page context
//!
//! [`BrowserSessionProvider`] hands out [`BrowserHandle`]s, either an owned process
//! ([`acquire`](BrowserSessionProvider::acquire), closed by
//! [`release`](BrowserSessionProvider::release)) or the lazily launched shared instance
//! ([`shared`](BrowserSessionProvider::shared)). Pages are always wrapped in a
//! [`PageGuard`], which closes the page on every exit path.
//!
//! The Chromium backend lives in [`chrome`] behind the `browser` feature.

use async_trait::async_trait;
use serde_json::Value;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::error::Result;

#[cfg(feature = "browser")]
pub mod chrome;
pub mod wait;

pub use wait::{POLL_INTERVAL, wait_for_json_body};

/// Request resource types that can be blocked to speed up page loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Image,
    Stylesheet,
    Font,
    Media,
}

/// Resource types that extractors never need.
pub const NON_ESSENTIAL_RESOURCES: &[ResourceKind] = &[
    ResourceKind::Image,
    ResourceKind::Stylesheet,
    ResourceKind::Font,
    ResourceKind::Media,
];

/// A single browser tab.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    /// Overrides the user agent for subsequent requests.
    async fn set_user_agent(&self, user_agent: &str) -> Result<()>;

    /// Sends these headers with every subsequent request from the page.
    async fn set_extra_headers(&self, headers: &[(&str, &str)]) -> Result<()>;

    /// Aborts requests of the given resource types.
    async fn block_resources(&self, kinds: &[ResourceKind]) -> Result<()>;

    /// Navigates to `url`, bounded by the backend's navigation timeout.
    async fn goto(&self, url: &str) -> Result<()>;

    /// Polls until `selector` matches an element or `timeout` expires.
    ///
    /// Returns `Ok(false)` on timeout.
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<bool> {
        wait::wait_for_selector(self, selector, timeout).await
    }

    /// Evaluates `script` as an expression in page context and returns its value.
    ///
    /// Promises are awaited. Exceptions thrown by the script surface as
    /// [`Error::Parse`](crate::Error::Parse).
    async fn evaluate(&self, script: &str) -> Result<Value>;

    /// Serialized DOM of the current document.
    async fn content(&self) -> Result<String>;

    /// Current URL, after any client-side redirects.
    async fn url(&self) -> Result<Option<String>>;

    /// Closes the tab.
    async fn close(&self) -> Result<()>;
}

/// A running browser process.
#[async_trait]
pub trait Browser: Send + Sync {
    async fn new_page(&self) -> Result<Box<dyn BrowserPage>>;

    /// Terminates the process.
    async fn close(&self) -> Result<()>;
}

/// Starts browser processes.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Launches a new browser.
    ///
    /// # Errors
    ///
    /// [`Error::BrowserLaunch`](crate::Error::BrowserLaunch) when the configured binary
    /// is missing or refuses to start. Implementations must not fall back to a
    /// different binary.
    async fn launch(&self) -> Result<Arc<dyn Browser>>;
}

/// Produces ready-to-use browser handles and tracks open pages.
pub struct BrowserSessionProvider {
    launcher: Arc<dyn BrowserLauncher>,
    shared: Mutex<Option<Arc<dyn Browser>>>,
    open_pages: Arc<AtomicUsize>,
    user_agent: Option<String>,
    reuse: bool,
}

impl BrowserSessionProvider {
    pub fn new(launcher: Arc<dyn BrowserLauncher>) -> Self {
        Self {
            launcher,
            shared: Mutex::new(None),
            open_pages: Arc::new(AtomicUsize::new(0)),
            user_agent: None,
            reuse: false,
        }
    }

    /// Makes [`session`](Self::session) hand out the shared browser instead of
    /// launching one per call.
    pub fn with_shared(mut self, reuse: bool) -> Self {
        self.reuse = reuse;
        self
    }

    /// Applies this user agent to every page opened through the provider.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Builds a provider backed by Chromium from the given settings.
    #[cfg(feature = "browser")]
    pub fn chrome(settings: &crate::config::BrowserSettings) -> Self {
        Self::new(Arc::new(chrome::ChromeLauncher::new(settings.clone())))
            .with_user_agent(settings.user_agent.clone())
            .with_shared(settings.shared)
    }

    /// A handle per the provider's reuse policy: shared, or owned by the caller.
    ///
    /// Always pass the handle back to [`release`](Self::release).
    pub async fn session(&self) -> Result<BrowserHandle> {
        if self.reuse {
            self.shared().await
        } else {
            self.acquire().await
        }
    }

    /// Launches a browser owned by the caller. Pair with [`release`](Self::release).
    pub async fn acquire(&self) -> Result<BrowserHandle> {
        let browser = self.launcher.launch().await?;
        tracing::debug!("launched owned browser");
        Ok(self.handle(browser, true))
    }

    /// Returns the shared browser, launching it on first use.
    ///
    /// Releasing a shared handle only drops the reference; the process stays up
    /// until [`shutdown`](Self::shutdown).
    pub async fn shared(&self) -> Result<BrowserHandle> {
        let mut guard = self.shared.lock().await;
        if let Some(browser) = guard.as_ref() {
            return Ok(self.handle(Arc::clone(browser), false));
        }

        let browser = self.launcher.launch().await?;
        tracing::info!("launched shared browser");
        *guard = Some(Arc::clone(&browser));
        Ok(self.handle(browser, false))
    }

    /// Releases a handle, terminating the process when the handle owns it.
    pub async fn release(&self, handle: BrowserHandle) {
        handle.release().await;
    }

    /// Closes the shared browser, if one was launched.
    pub async fn shutdown(&self) {
        if let Some(browser) = self.shared.lock().await.take() {
            if let Err(e) = browser.close().await {
                tracing::warn!(error = %e, "failed to close shared browser");
            }
        }
    }

    /// Number of pages opened through this provider that are not yet closed.
    pub fn open_page_count(&self) -> usize {
        self.open_pages.load(Ordering::SeqCst)
    }

    fn handle(&self, browser: Arc<dyn Browser>, owned: bool) -> BrowserHandle {
        BrowserHandle {
            browser,
            owned,
            released: false,
            open_pages: Arc::clone(&self.open_pages),
            user_agent: self.user_agent.clone(),
        }
    }
}

impl std::fmt::Debug for BrowserSessionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserSessionProvider")
            .field("open_pages", &self.open_page_count())
            .finish_non_exhaustive()
    }
}

/// A browser lent to one extractor flow.
pub struct BrowserHandle {
    browser: Arc<dyn Browser>,
    owned: bool,
    released: bool,
    open_pages: Arc<AtomicUsize>,
    user_agent: Option<String>,
}

impl BrowserHandle {
    /// Opens a fresh page scoped to a single operation.
    pub async fn open_page(&self) -> Result<PageGuard> {
        let page: Arc<dyn BrowserPage> = Arc::from(self.browser.new_page().await?);
        self.open_pages.fetch_add(1, Ordering::SeqCst);
        let guard = PageGuard {
            page,
            open_pages: Arc::clone(&self.open_pages),
            closed: false,
        };

        if let Some(ua) = &self.user_agent {
            if let Err(e) = guard.set_user_agent(ua).await {
                tracing::debug!(error = %e, "user agent override skipped");
            }
        }

        Ok(guard)
    }

    /// Whether releasing this handle terminates the browser process.
    pub fn is_owned(&self) -> bool {
        self.owned
    }

    async fn release(mut self) {
        self.released = true;
        if self.owned {
            if let Err(e) = self.browser.close().await {
                tracing::warn!(error = %e, "failed to close browser");
            }
        }
    }
}

impl Drop for BrowserHandle {
    fn drop(&mut self) {
        if self.owned && !self.released {
            let browser = Arc::clone(&self.browser);
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn(async move {
                    if let Err(e) = browser.close().await {
                        tracing::warn!(error = %e, "dropped browser cleanup failed");
                    }
                });
            }
        }
    }
}

/// Owns one page for the duration of one extractor operation.
///
/// Call [`close`](PageGuard::close) on normal exits. If the guard is dropped
/// instead (early return, cancellation, panic), the page is closed on a background
/// task and the open-page count is decremented immediately.
pub struct PageGuard {
    page: Arc<dyn BrowserPage>,
    open_pages: Arc<AtomicUsize>,
    closed: bool,
}

impl PageGuard {
    /// Closes the page, logging rather than returning close failures.
    pub async fn close(mut self) {
        self.closed = true;
        self.open_pages.fetch_sub(1, Ordering::SeqCst);
        if let Err(e) = self.page.close().await {
            tracing::warn!(error = %e, "failed to close page");
        }
    }
}

impl Deref for PageGuard {
    type Target = dyn BrowserPage;

    fn deref(&self) -> &Self::Target {
        self.page.as_ref()
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.open_pages.fetch_sub(1, Ordering::SeqCst);

        let page = Arc::clone(&self.page);
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                if let Err(e) = page.close().await {
                    tracing::warn!(error = %e, "page drop cleanup failed");
                }
            });
        }
    }
}

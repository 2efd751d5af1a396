//! Common test utilities
//!
//! An in-memory browser backend with scripted documents and evaluation results, and
//! a local axum server for fixture pages.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use shiori::browser::{Browser, BrowserLauncher, BrowserPage, BrowserSessionProvider, ResourceKind};
use shiori::{Error, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A scripted `evaluate` answer.
///
/// Matches when the script contains `needle` and, if `url` is set, the page's current
/// URL contains it.
#[derive(Debug, Clone)]
pub struct EvalRule {
    pub url: Option<String>,
    pub needle: String,
    pub value: Value,
}

/// Everything the mock browser records and answers with.
#[derive(Debug, Default)]
pub struct MockState {
    pub launches: AtomicUsize,
    pub browser_closes: AtomicUsize,
    pub pages_opened: AtomicUsize,
    pub pages_closed: AtomicUsize,
    pub fail_launch: AtomicBool,
    pub fail_goto: AtomicBool,
    pub visited: Mutex<Vec<String>>,
    pub blocked: Mutex<Vec<ResourceKind>>,
    pub headers: Mutex<Vec<(String, String)>>,
    documents: Mutex<HashMap<String, String>>,
    rules: Mutex<Vec<EvalRule>>,
    eval_failures: Mutex<Vec<(String, usize)>>,
}

impl MockState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Serves `html` as the DOM of `url`.
    pub fn document(&self, url: &str, html: &str) {
        self.documents
            .lock()
            .unwrap()
            .insert(url.to_string(), html.to_string());
    }

    /// Answers scripts containing `needle` with `value` on every page.
    pub fn on_eval(&self, needle: &str, value: Value) {
        self.rules.lock().unwrap().push(EvalRule {
            url: None,
            needle: needle.to_string(),
            value,
        });
    }

    /// Answers scripts containing `needle` with `value` on pages whose URL contains `url`.
    pub fn on_eval_at(&self, url: &str, needle: &str, value: Value) {
        self.rules.lock().unwrap().push(EvalRule {
            url: Some(url.to_string()),
            needle: needle.to_string(),
            value,
        });
    }

    /// Fails the next `times` evaluations of scripts containing `needle`, the way a
    /// navigation mid-poll destroys the execution context.
    pub fn fail_eval(&self, needle: &str, times: usize) {
        self.eval_failures
            .lock()
            .unwrap()
            .push((needle.to_string(), times));
    }

    fn take_eval_failure(&self, script: &str) -> bool {
        let mut failures = self.eval_failures.lock().unwrap();
        match failures
            .iter_mut()
            .find(|(needle, left)| *left > 0 && script.contains(needle.as_str()))
        {
            Some((_, left)) => {
                *left -= 1;
                true
            }
            None => false,
        }
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn browser_closes(&self) -> usize {
        self.browser_closes.load(Ordering::SeqCst)
    }

    pub fn pages_opened(&self) -> usize {
        self.pages_opened.load(Ordering::SeqCst)
    }

    pub fn pages_closed(&self) -> usize {
        self.pages_closed.load(Ordering::SeqCst)
    }

    pub fn visited(&self) -> Vec<String> {
        self.visited.lock().unwrap().clone()
    }

    fn answer(&self, url: Option<&str>, script: &str) -> Value {
        self.rules
            .lock()
            .unwrap()
            .iter()
            .find(|rule| {
                script.contains(&rule.needle)
                    && match (&rule.url, url) {
                        (Some(filter), Some(current)) => current.contains(filter.as_str()),
                        (Some(_), None) => false,
                        (None, _) => true,
                    }
            })
            .map(|rule| rule.value.clone())
            .unwrap_or(Value::Null)
    }
}

pub struct MockLauncher {
    pub state: Arc<MockState>,
}

#[async_trait]
impl BrowserLauncher for MockLauncher {
    async fn launch(&self) -> Result<Arc<dyn Browser>> {
        if self.state.fail_launch.load(Ordering::SeqCst) {
            return Err(Error::launch("mock launch refused"));
        }
        self.state.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockBrowser {
            state: Arc::clone(&self.state),
        }))
    }
}

pub struct MockBrowser {
    state: Arc<MockState>,
}

#[async_trait]
impl Browser for MockBrowser {
    async fn new_page(&self) -> Result<Box<dyn BrowserPage>> {
        self.state.pages_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockPage {
            state: Arc::clone(&self.state),
            url: Mutex::new(None),
        }))
    }

    async fn close(&self) -> Result<()> {
        self.state.browser_closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct MockPage {
    state: Arc<MockState>,
    url: Mutex<Option<String>>,
}

impl MockPage {
    fn current_url(&self) -> Option<String> {
        self.url.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrowserPage for MockPage {
    async fn set_user_agent(&self, _user_agent: &str) -> Result<()> {
        Ok(())
    }

    async fn set_extra_headers(&self, headers: &[(&str, &str)]) -> Result<()> {
        self.state.headers.lock().unwrap().extend(
            headers
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string())),
        );
        Ok(())
    }

    async fn block_resources(&self, kinds: &[ResourceKind]) -> Result<()> {
        self.state.blocked.lock().unwrap().extend_from_slice(kinds);
        Ok(())
    }

    async fn goto(&self, url: &str) -> Result<()> {
        self.state.visited.lock().unwrap().push(url.to_string());
        if self.state.fail_goto.load(Ordering::SeqCst) {
            return Err(Error::timeout(format!("navigation to {}", url)));
        }
        *self.url.lock().unwrap() = Some(url.to_string());
        Ok(())
    }

    async fn wait_for_selector(&self, _selector: &str, _timeout: Duration) -> Result<bool> {
        Ok(true)
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        if self.state.take_eval_failure(script) {
            return Err(Error::browser("Execution context was destroyed"));
        }
        Ok(self.state.answer(self.current_url().as_deref(), script))
    }

    async fn content(&self) -> Result<String> {
        let url = self.current_url().unwrap_or_default();
        Ok(self
            .state
            .documents
            .lock()
            .unwrap()
            .get(&url)
            .cloned()
            .unwrap_or_else(|| "<html><body></body></html>".to_string()))
    }

    async fn url(&self) -> Result<Option<String>> {
        Ok(self.current_url())
    }

    async fn close(&self) -> Result<()> {
        self.state.pages_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A provider over the mock backend that launches an owned browser per session.
pub fn mock_provider(state: &Arc<MockState>) -> Arc<BrowserSessionProvider> {
    Arc::new(BrowserSessionProvider::new(Arc::new(MockLauncher {
        state: Arc::clone(state),
    })))
}

/// Serves `router` on an ephemeral local port and returns its base URL.
pub async fn serve(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// A base URL nothing listens on.
pub async fn dead_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

pub mod fixtures {
    pub const SEARCH_PAGE: &str = r#"<html><body>
<div class="panel_story_list">
  <div class="story_item">
    <a href="/manga/solo-leveling"><img data-src="//cdn.example/covers/solo.jpg" src="data:image/gif;base64,AAAA"></a>
    <div class="story_item_right">
      <h3 class="story_name"><a href="https://manga.example/manga/solo-leveling">Solo Leveling</a></h3>
      <em class="story_chapter"><a href="/chapter/solo-leveling/chapter-200">Chapter 200</a></em>
      <span>Author(s) : Chugong</span>
      <span>Updated : Jan 02,2024</span>
    </div>
  </div>
  <div class="story_item">
    <a href="/manga/solo-leveling-ragnarok"><img src="https://cdn.example/covers/ragnarok.jpg"></a>
    <div class="story_item_right">
      <h3 class="story_name"><a href="/manga/solo-leveling-ragnarok">Solo Leveling: Ragnarok</a></h3>
      <em class="story_chapter"><a href="/chapter/solo-leveling-ragnarok/chapter-12-5">Chapter 12.5</a></em>
    </div>
  </div>
</div>
</body></html>"#;

    pub const DETAIL_PAGE: &str = r#"<html><body>
<div class="manga-info-top">
  <div class="manga-info-pic"><img src="//cdn.example/covers/solo.jpg"></div>
  <ul class="manga-info-text">
    <li><h1>Solo Leveling</h1><h2 class="story-alternative">Alternative : Na Honjaman Level Up ; 나 혼자만 레벨업; Ore Dake Level Up na Ken</h2></li>
    <li>Author(s) : Chugong</li>
    <li>Status : Completed</li>
    <li class="genres">Genres : <a href="/genre/action">Action</a>, <a href="/genre/fantasy">Fantasy</a></li>
  </ul>
</div>
<div id="contentBox"><h2>Solo Leveling summary:</h2> Ten years ago, the Gate appeared.</div>
<div class="chapter-list">
  <div class="row"><span><a href="https://manga.example/chapter/solo-leveling/chapter-2/">Chapter 2: Rise</a></span><span>120</span><span title="Jan 03,2024">Jan 03,24</span></div>
  <div class="row"><span><a href="/chapter/solo-leveling/chapter-1">Chapter 1</a></span><span>300</span><span title="Jan 01,2024">Jan 01,24</span></div>
  <div class="row"><span><a href="/genre/action">Action</a></span></div>
</div>
</body></html>"#;

    pub const HOT_PAGE: &str = r#"<html><body>
<div id="contentstory">
  <div class="itemupdate first">
    <a href="/manga/solo-leveling"><img src="//cdn.example/covers/solo.jpg"></a>
    <ul>
      <li><h3><a href="https://manga.example/manga/solo-leveling">Solo Leveling</a></h3></li>
      <li><span><a href="/chapter/solo-leveling/chapter-201">Chapter 201</a></span></li>
    </ul>
  </div>
  <div class="itemupdate">
    <a href="/manga/omniscient-reader"><img data-src="https://cdn.example/covers/orv.jpg"></a>
    <ul>
      <li><h3><a href="/manga/omniscient-reader">Omniscient Reader</a></h3></li>
      <li><span><a href="/chapter/omniscient-reader/chapter-180-5">Chapter 180.5</a></span></li>
    </ul>
  </div>
</div>
</body></html>"#;

    pub const READER_WITH_SCRIPT: &str = r#"<html><body>
<div class="container-chapter-reader"></div>
<script>
  var chapterImages = ["//cdn.example/ch1/01.jpg", "https:\/\/cdn.example\/ch1\/02.jpg", "//cdn.example/ch1/01.jpg"];
</script>
</body></html>"#;

    pub const READER_WITH_IMAGES: &str = r#"<html><body>
<div class="container-chapter-reader">
  <img data-src="//cdn.example/ch2/01.jpg" src="data:image/gif;base64,AAAA">
  <img src="https://cdn.example/ch2/02.jpg">
</div>
</body></html>"#;

    pub const READER_EMPTY: &str = r#"<html><body>
<div class="container-chapter-reader"><p>Loading...</p></div>
<script src="/js/reader.min.js"></script>
</body></html>"#;
}

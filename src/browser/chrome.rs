//! Chromium backend over the DevTools protocol (chromiumoxide).

use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::fetch::{
    EnableParams, EventRequestPaused, FailRequestParams, RequestPattern, RequestStage,
};
use chromiumoxide::cdp::browser_protocol::network::{
    ErrorReason, Headers, ResourceType, SetExtraHttpHeadersParams, SetUserAgentOverrideParams,
};
use futures::StreamExt;
use parking_lot::Mutex as SyncMutex;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::{Browser, BrowserLauncher, BrowserPage, ResourceKind};
use crate::config::{BrowserSettings, Environment};
use crate::error::{Error, Result};

/// Well-known local Chrome/Chromium locations probed in development.
const CHROME_PATHS: &[&str] = &[
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/opt/google/chrome/google-chrome",
];

const CHROME_COMMANDS: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
];

/// Launches Chromium according to [`BrowserSettings`].
#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    settings: BrowserSettings,
}

impl ChromeLauncher {
    pub fn new(settings: BrowserSettings) -> Self {
        Self { settings }
    }

    /// Picks the executable for the configured environment.
    ///
    /// Production uses the configured path and nothing else. Development prefers the
    /// configured path, then well-known install locations, then `$PATH`.
    pub fn resolve_executable(&self) -> Result<PathBuf> {
        let configured = self.settings.executable.as_deref();

        match self.settings.environment {
            Environment::Production => match configured {
                Some(path) if path.exists() => Ok(path.to_path_buf()),
                Some(path) => Err(Error::launch(format!(
                    "production chromium not found at {}",
                    path.display()
                ))),
                None => Err(Error::launch(
                    "production requires SHIORI_CHROMIUM_PATH to be set",
                )),
            },
            Environment::Development => {
                if let Some(path) = configured.filter(|p| p.exists()) {
                    return Ok(path.to_path_buf());
                }
                find_local_chrome().ok_or_else(|| {
                    Error::launch("Chrome/Chromium not found in known locations or PATH")
                })
            }
        }
    }
}

fn find_local_chrome() -> Option<PathBuf> {
    CHROME_PATHS
        .iter()
        .map(Path::new)
        .find(|p| p.exists())
        .map(Path::to_path_buf)
        .or_else(|| CHROME_COMMANDS.iter().find_map(|cmd| which::which(cmd).ok()))
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self) -> Result<Arc<dyn Browser>> {
        let executable = self.resolve_executable()?;
        tracing::info!(
            executable = %executable.display(),
            headless = self.settings.headless,
            "launching chromium"
        );

        let mut builder = chromiumoxide::BrowserConfig::builder().chrome_executable(executable);
        if !self.settings.headless {
            builder = builder.with_head();
        }
        builder = builder
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--mute-audio");
        for arg in &self.settings.chrome_args {
            builder = builder.arg(arg.as_str());
        }

        let config = builder.build().map_err(Error::launch)?;
        let (browser, mut handler) = chromiumoxide::Browser::launch(config)
            .await
            .map_err(|e| Error::launch(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while handler.next().await.is_some() {}
        });

        Ok(Arc::new(ChromeBrowser {
            browser: Mutex::new(Some(browser)),
            handler_task,
            navigation_timeout: self.settings.navigation_timeout(),
        }))
    }
}

struct ChromeBrowser {
    browser: Mutex<Option<chromiumoxide::Browser>>,
    handler_task: JoinHandle<()>,
    navigation_timeout: Duration,
}

#[async_trait]
impl Browser for ChromeBrowser {
    async fn new_page(&self) -> Result<Box<dyn BrowserPage>> {
        let guard = self.browser.lock().await;
        let browser = guard
            .as_ref()
            .ok_or_else(|| Error::browser("browser already closed"))?;
        let page = browser.new_page("about:blank").await.map_err(cdp)?;

        Ok(Box::new(ChromePage {
            page,
            interceptor: SyncMutex::new(None),
            navigation_timeout: self.navigation_timeout,
        }))
    }

    async fn close(&self) -> Result<()> {
        let Some(mut browser) = self.browser.lock().await.take() else {
            return Ok(());
        };
        let result = browser.close().await.map(|_| ()).map_err(cdp);
        let _ = browser.wait().await;
        self.handler_task.abort();
        tracing::debug!("chromium closed");
        result
    }
}

struct ChromePage {
    page: Page,
    interceptor: SyncMutex<Option<JoinHandle<()>>>,
    navigation_timeout: Duration,
}

#[async_trait]
impl BrowserPage for ChromePage {
    async fn set_user_agent(&self, user_agent: &str) -> Result<()> {
        self.page
            .execute(SetUserAgentOverrideParams::new(user_agent.to_string()))
            .await
            .map_err(cdp)?;
        Ok(())
    }

    async fn set_extra_headers(&self, headers: &[(&str, &str)]) -> Result<()> {
        let map: serde_json::Map<String, Value> = headers
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect();
        self.page
            .execute(SetExtraHttpHeadersParams::new(Headers::new(Value::Object(
                map,
            ))))
            .await
            .map_err(cdp)?;
        Ok(())
    }

    async fn block_resources(&self, kinds: &[ResourceKind]) -> Result<()> {
        if kinds.is_empty() {
            return Ok(());
        }

        let mut paused = self
            .page
            .event_listener::<EventRequestPaused>()
            .await
            .map_err(cdp)?;

        let patterns: Vec<RequestPattern> = kinds
            .iter()
            .map(|kind| {
                RequestPattern::builder()
                    .url_pattern("*")
                    .resource_type(resource_type(*kind))
                    .request_stage(RequestStage::Request)
                    .build()
            })
            .collect();
        self.page
            .execute(EnableParams::builder().patterns(patterns).build())
            .await
            .map_err(cdp)?;

        // Only blocked types are paused, so every paused request is failed.
        let page = self.page.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                let fail =
                    FailRequestParams::new(event.request_id.clone(), ErrorReason::BlockedByClient);
                if page.execute(fail).await.is_err() {
                    break;
                }
            }
        });

        if let Some(previous) = self.interceptor.lock().replace(task) {
            previous.abort();
        }
        Ok(())
    }

    async fn goto(&self, url: &str) -> Result<()> {
        match tokio::time::timeout(self.navigation_timeout, self.page.goto(url)).await {
            Ok(result) => result.map(|_| ()).map_err(cdp),
            Err(_) => Err(Error::timeout(format!("navigation to {}", url))),
        }
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        let result = self
            .page
            .evaluate(script.to_string())
            .await
            .map_err(|e| Error::parse(format!("script evaluation failed: {}", e)))?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn content(&self) -> Result<String> {
        self.page.content().await.map_err(cdp)
    }

    async fn url(&self) -> Result<Option<String>> {
        self.page.url().await.map_err(cdp)
    }

    async fn close(&self) -> Result<()> {
        if let Some(task) = self.interceptor.lock().take() {
            task.abort();
        }
        self.page.clone().close().await.map_err(cdp)
    }
}

fn resource_type(kind: ResourceKind) -> ResourceType {
    match kind {
        ResourceKind::Image => ResourceType::Image,
        ResourceKind::Stylesheet => ResourceType::Stylesheet,
        ResourceKind::Font => ResourceType::Font,
        ResourceKind::Media => ResourceType::Media,
    }
}

fn cdp(e: chromiumoxide::error::CdpError) -> Error {
    Error::browser(e.to_string())
}

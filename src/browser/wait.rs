//! Bounded polling waits over a live page.

use std::time::Duration;
use tokio::time::Instant;

use super::BrowserPage;
use crate::error::Result;

/// Interval between polls of a page condition.
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

const BODY_TEXT: &str = "document.body ? document.body.innerText : ''";

/// Polls until `selector` matches an element in the page, for at most `timeout`.
///
/// A failed evaluation counts as "not there yet": interstitials reload the page and
/// destroy the execution context mid-poll.
pub async fn wait_for_selector<P>(page: &P, selector: &str, timeout: Duration) -> Result<bool>
where
    P: BrowserPage + ?Sized,
{
    let script = format!(
        "document.querySelector({}) !== null",
        serde_json::to_string(selector)?
    );
    let deadline = Instant::now() + timeout;

    loop {
        match page.evaluate(&script).await {
            Ok(value) if value.as_bool().unwrap_or(false) => return Ok(true),
            Ok(_) => {}
            Err(e) => tracing::debug!(selector, error = %e, "selector poll failed, retrying"),
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Waits for a bot-mitigation interstitial to give way to a JSON body.
///
/// Polls the rendered body text until it starts with `{`. When `timeout` expires the
/// last body text read is returned anyway: the guard sometimes serves the payload in a
/// shape the predicate misses, so the caller always gets to attempt a parse. Failed
/// reads while the guard reloads the page are retried until the deadline.
pub async fn wait_for_json_body<P>(page: &P, timeout: Duration) -> Result<String>
where
    P: BrowserPage + ?Sized,
{
    let deadline = Instant::now() + timeout;
    let mut text = String::new();

    loop {
        match body_text(page).await {
            Ok(current) => text = current,
            Err(e) => tracing::debug!(error = %e, "body poll failed, retrying"),
        }
        if text.trim_start().starts_with('{') {
            return Ok(text);
        }
        if Instant::now() >= deadline {
            tracing::warn!(
                timeout_ms = timeout.as_millis() as u64,
                "bot mitigation wait expired, parsing body as-is"
            );
            return Ok(text);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

async fn body_text<P>(page: &P) -> Result<String>
where
    P: BrowserPage + ?Sized,
{
    Ok(page
        .evaluate(BODY_TEXT)
        .await?
        .as_str()
        .unwrap_or_default()
        .to_string())
}

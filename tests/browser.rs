//! Browser session provider lifecycle tests over the in-memory backend.

mod common;

use common::{MockLauncher, MockState, mock_provider};
use serde_json::json;
use shiori::browser::{BrowserPage, BrowserSessionProvider, wait_for_json_body};
use shiori::error::ErrorKind;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

fn shared_provider(state: &Arc<MockState>) -> BrowserSessionProvider {
    BrowserSessionProvider::new(Arc::new(MockLauncher {
        state: Arc::clone(state),
    }))
    .with_shared(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_owned_session_closes_browser_on_release() {
        let state = MockState::new();
        let provider = mock_provider(&state);

        let handle = provider.session().await.unwrap();
        assert!(handle.is_owned());
        provider.release(handle).await;

        assert_eq!(state.launches(), 1);
        assert_eq!(state.browser_closes(), 1);
    }

    #[tokio::test]
    async fn test_shared_session_launches_once() {
        let state = MockState::new();
        let provider = shared_provider(&state);

        for _ in 0..3 {
            let handle = provider.session().await.unwrap();
            assert!(!handle.is_owned());
            provider.release(handle).await;
        }

        assert_eq!(state.launches(), 1);
        assert_eq!(state.browser_closes(), 0);

        provider.shutdown().await;
        assert_eq!(state.browser_closes(), 1);

        // A second shutdown has nothing left to close.
        provider.shutdown().await;
        assert_eq!(state.browser_closes(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_shared_sessions_share_one_launch() {
        let state = MockState::new();
        let provider = Arc::new(shared_provider(&state));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let provider = Arc::clone(&provider);
                tokio::spawn(async move {
                    let handle = provider.session().await.unwrap();
                    provider.release(handle).await;
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(state.launches(), 1);
    }

    #[tokio::test]
    async fn test_acquire_is_owned_even_when_sharing() {
        let state = MockState::new();
        let provider = shared_provider(&state);

        let handle = provider.acquire().await.unwrap();
        assert!(handle.is_owned());
        provider.release(handle).await;

        assert_eq!(state.browser_closes(), 1);
    }

    #[tokio::test]
    async fn test_launch_failure_surfaces_as_launch_error() {
        let state = MockState::new();
        state.fail_launch.store(true, Ordering::SeqCst);
        let provider = mock_provider(&state);

        let error = provider.session().await.err().unwrap();

        assert_eq!(error.kind(), ErrorKind::Launch);
        assert_eq!(state.launches(), 0);
    }

    #[tokio::test]
    async fn test_page_close_updates_open_count() {
        let state = MockState::new();
        let provider = mock_provider(&state);
        let handle = provider.session().await.unwrap();

        let first = handle.open_page().await.unwrap();
        let second = handle.open_page().await.unwrap();
        assert_eq!(provider.open_page_count(), 2);

        first.close().await;
        assert_eq!(provider.open_page_count(), 1);
        second.close().await;
        assert_eq!(provider.open_page_count(), 0);
        assert_eq!(state.pages_closed(), 2);

        provider.release(handle).await;
    }

    #[tokio::test]
    async fn test_dropped_page_is_closed_in_background() {
        let state = MockState::new();
        let provider = mock_provider(&state);
        let handle = provider.session().await.unwrap();

        {
            let page = handle.open_page().await.unwrap();
            page.goto("https://manga.example/").await.unwrap();
        }
        assert_eq!(provider.open_page_count(), 0);

        for _ in 0..50 {
            if state.pages_closed() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(state.pages_closed(), 1);

        provider.release(handle).await;
    }

    #[tokio::test]
    async fn test_dropped_owned_handle_closes_browser() {
        let state = MockState::new();
        let provider = mock_provider(&state);

        drop(provider.session().await.unwrap());

        for _ in 0..50 {
            if state.browser_closes() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(state.browser_closes(), 1);
    }

    #[tokio::test]
    async fn test_json_body_returned_once_it_appears() {
        let state = MockState::new();
        state.on_eval("innerText", json!(r#"{"total":0,"data":[]}"#));
        let provider = mock_provider(&state);
        let handle = provider.session().await.unwrap();
        let page = handle.open_page().await.unwrap();

        let body = wait_for_json_body(&*page, Duration::from_secs(5)).await.unwrap();

        assert_eq!(body, r#"{"total":0,"data":[]}"#);
        page.close().await;
        provider.release(handle).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_json_wait_survives_destroyed_context() {
        let state = MockState::new();
        state.on_eval("innerText", json!(r#"{"data":[]}"#));
        state.fail_eval("innerText", 2);
        let provider = mock_provider(&state);
        let handle = provider.session().await.unwrap();
        let page = handle.open_page().await.unwrap();

        let body = wait_for_json_body(&*page, Duration::from_secs(8)).await.unwrap();

        assert_eq!(body, r#"{"data":[]}"#);
        page.close().await;
        provider.release(handle).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_json_wait_failing_until_deadline_returns_empty_body() {
        let state = MockState::new();
        state.fail_eval("innerText", usize::MAX);
        let provider = mock_provider(&state);
        let handle = provider.session().await.unwrap();
        let page = handle.open_page().await.unwrap();

        let started = tokio::time::Instant::now();
        let body = wait_for_json_body(&*page, Duration::from_secs(8)).await.unwrap();

        assert_eq!(body, "");
        assert!(started.elapsed() >= Duration::from_secs(8));
        page.close().await;
        provider.release(handle).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_selector_wait_retries_failed_evaluations() {
        let state = MockState::new();
        state.on_eval("querySelector", json!(true));
        state.fail_eval("querySelector", 3);
        let provider = mock_provider(&state);
        let handle = provider.session().await.unwrap();
        let page = handle.open_page().await.unwrap();

        let found = page
            .wait_for_selector("#resolutionMenu button", Duration::from_secs(10))
            .await
            .unwrap();

        assert!(found);
        page.close().await;
        provider.release(handle).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_json_wait_is_bounded() {
        let state = MockState::new();
        state.on_eval("innerText", json!("Checking your browser before accessing"));
        let provider = mock_provider(&state);
        let handle = provider.session().await.unwrap();
        let page = handle.open_page().await.unwrap();

        let started = tokio::time::Instant::now();
        let body = wait_for_json_body(&*page, Duration::from_secs(8)).await.unwrap();

        assert_eq!(body, "Checking your browser before accessing");
        assert!(started.elapsed() >= Duration::from_secs(8));
        assert!(started.elapsed() < Duration::from_secs(9));
        page.close().await;
        provider.release(handle).await;
    }
}

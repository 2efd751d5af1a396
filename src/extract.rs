//! Ordered fallback between extraction strategies.
//!
//! Extractors often have a cheap way and an expensive way to get the same data. Each
//! way is a [`Strategy`]; [`first_non_empty`] runs them in order and stops at the first
//! one that produces something. Strategies are lazy, so a later tier only does work
//! (and only opens a browser) when every earlier tier came back empty or unparseable.
//!
//! # Examples
//!
//! ```rust
//! use shiori::extract::{Strategy, first_non_empty};
//!
//! # async fn example() -> shiori::Result<()> {
//! let urls = first_non_empty(vec![
//!     Strategy::new("cheap", || async { Ok(Vec::<String>::new()) }),
//!     Strategy::new("expensive", || async { Ok(vec!["https://cdn/1.jpg".to_string()]) }),
//! ])
//! .await?;
//! assert_eq!(urls.len(), 1);
//! # Ok(())
//! # }
//! ```

use futures::future::BoxFuture;
use std::future::Future;

use crate::error::{ErrorKind, Result};

/// A named, lazily started extraction attempt.
pub struct Strategy<'a, T> {
    name: &'static str,
    run: Box<dyn FnOnce() -> BoxFuture<'a, Result<Vec<T>>> + Send + 'a>,
}

impl<'a, T> Strategy<'a, T> {
    pub fn new<F, Fut>(name: &'static str, run: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = Result<Vec<T>>> + Send + 'a,
    {
        Self {
            name,
            run: Box::new(move || Box::pin(run())),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Runs `strategies` in order until one yields a non-empty result.
///
/// A parse error from any strategy but the last is logged and treated like an empty
/// result. Any other error (transport, timeout, launch) is returned at once without
/// trying later strategies, as is an error from the last strategy. When every
/// strategy comes back empty the result is `Ok(vec![])`.
pub async fn first_non_empty<T>(strategies: Vec<Strategy<'_, T>>) -> Result<Vec<T>> {
    let count = strategies.len();

    for (position, strategy) in strategies.into_iter().enumerate() {
        let name = strategy.name;
        match (strategy.run)().await {
            Ok(items) if !items.is_empty() => {
                tracing::debug!(strategy = name, items = items.len(), "strategy succeeded");
                return Ok(items);
            }
            Ok(_) => tracing::debug!(strategy = name, "strategy came back empty"),
            Err(e) if position + 1 < count && e.kind() == ErrorKind::Parse => {
                tracing::debug!(strategy = name, error = %e, "strategy found nothing to parse, trying next");
            }
            Err(e) => return Err(e),
        }
    }

    Ok(Vec::new())
}

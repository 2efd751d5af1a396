//! # Shiori - anime and manga source resolution
//!
//! Shiori pairs a curated metadata catalog (AniList) with page and stream locations
//! scraped from sites that offer no API. It provides:
//!
//! - **Extractors** for a manga catalog, a video catalog behind bot mitigation and an
//!   anime catalog, each hard-wired to one site's markup
//! - **Browser sessions** for pages that need JavaScript, with scoped page cleanup
//! - **TTL caches** per operation class with an injectable clock
//! - **Cross-catalog matching** of catalog titles against scraped search results
//! - **A resolver** that ties these together and degrades to empty values instead of
//!   failing
//! - **Route handlers** (feature `server`) exposing the resolver as a JSON API
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use shiori::prelude::*;
//!
//! #[tokio::main]
//! async fn main() {
//!     let resolver = Resolver::from_config(&Config::from_env());
//!
//!     let results = resolver.unified_search("solo leveling").await;
//!     if let Some(first) = results.first() {
//!         for chapter in resolver.unified_get_chapters(&first.id).await.iter().take(3) {
//!             println!("{} -> {}", chapter.title, chapter.url);
//!         }
//!     }
//! }
//! ```
//!
//! ## Ids
//!
//! Ids leaving the resolver carry a source prefix (`mk:solo-leveling`), so ids from
//! different sites never collide. See [`source::apply_prefix`].
//!
//! ## Architecture
//!
//! - [`browser`]: browser session provider and the Chromium backend
//! - [`net`]: HTTP client, rate limiting and parsing helpers
//! - [`extract`]: ordered fallback between extraction strategies
//! - [`sources`]: the site extractors
//! - [`metadata`]: the AniList GraphQL gateway
//! - [`matching`]: title scoring across catalogs
//! - [`cache`]: TTL caches
//! - [`resolver`]: the caching and resolution service
//! - [`config`]: settings with `SHIORI_*` environment overrides
//! - [`error`]: error type and taxonomy

pub mod browser;
pub mod cache;
pub mod config;
pub mod error;
pub mod extract;
pub mod matching;
pub mod metadata;
pub mod net;
pub mod resolver;
pub mod source;
pub mod sources;
pub mod types;

#[cfg(feature = "server")]
pub mod server;

/// Prelude module for convenient imports.
///
/// ```rust
/// use shiori::prelude::*;
///
/// let id = apply_prefix("mk", "solo-leveling");
/// assert_eq!(strip_prefix(&id), "solo-leveling");
/// ```
pub mod prelude {
    pub use crate::{
        browser::{Browser, BrowserHandle, BrowserLauncher, BrowserPage, BrowserSessionProvider},
        cache::{Clock, ManualClock, SystemClock, TtlCache},
        config::Config,
        error::{Error, ErrorKind, Result},
        matching::TitleInfo,
        metadata::{AniListClient, MediaType},
        resolver::{Resolver, ResolverBuilder},
        source::{MediaKind, Source, Sources, apply_prefix, split_prefix, strip_prefix},
        types::*,
    };
}

// Re-export main types at crate root for direct access
pub use error::{Error, Result};
pub use resolver::Resolver;
pub use source::{Source, Sources};

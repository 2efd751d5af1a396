//! Site extractors.
//!
//! Each extractor is hard-wired to one site's markup and implements [`Source`] for the
//! operations that site offers:
//!
//! - [`MangakakalotSource`] (`mk`): manga search, details, chapters, page images and
//!   the hot-updates feed
//! - [`AnimePaheSource`] (`ap`): video search, episode listings and stream discovery
//!   behind a bot-mitigation layer
//! - [`HiAnimeSource`] (`hi`): anime spotlight and trending strips
//!
//! [`Source`]: crate::source::Source

pub mod animepahe;
pub mod hianime;
pub mod mangakakalot;

pub use animepahe::AnimePaheSource;
pub use hianime::HiAnimeSource;
pub use mangakakalot::MangakakalotSource;

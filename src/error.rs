//! Error types and result handling for Shiori operations.
//!
//! All fallible operations return a [`Result<T>`], an alias for
//! `std::result::Result<T, Error>`.
//!
//! # Error Categories
//!
//! Errors fall into a small internal taxonomy, exposed through [`Error::kind`]:
//!
//! - **Transport**: the upstream site could not be reached or answered with an HTTP error
//! - **Parse**: the expected structure (selector, JSON shape, script variable) was absent
//! - **Timeout**: a bounded wait expired, e.g. while a bot-mitigation page resolves
//! - **Launch**: the headless browser could not be started
//! - **NotFound**: an unknown source prefix or a missing entity
//!
//! Extractors surface these to the [`Resolver`](crate::resolver::Resolver), which is the
//! only layer that collapses them into empty values for callers. The kind is kept for
//! logging, not for branching.
//!
//! # Examples
//!
//! ```rust
//! use shiori::error::{Error, ErrorKind};
//!
//! let error = Error::parse("missing chapter table");
//! assert_eq!(error.kind(), ErrorKind::Parse);
//! ```

use thiserror::Error;

/// Type alias for Results with Shiori errors.
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error type for all Shiori operations.
///
/// # Variants
///
/// * [`Network`](Error::Network) - HTTP client and connection errors
/// * [`Source`](Error::Source) - Source-specific HTTP failures with context
/// * [`RateLimit`](Error::RateLimit) - Rate limiting responses
/// * [`Parse`](Error::Parse) - Data parsing and format errors
/// * [`Json`](Error::Json) - JSON deserialization errors
/// * [`Timeout`](Error::Timeout) - A bounded wait expired
/// * [`BrowserLaunch`](Error::BrowserLaunch) - The browser binary could not be started
/// * [`Browser`](Error::Browser) - Page-level browser automation failures
/// * [`NotFound`](Error::NotFound) - Missing resources
/// * [`Io`](Error::Io) - Local I/O failures
/// * [`Other`](Error::Other) - Generic error messages
#[derive(Error, Debug)]
pub enum Error {
    /// Network-related errors from HTTP operations.
    ///
    /// Wraps errors from reqwest: connection timeouts, DNS failures, TLS errors.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Source-specific errors with contextual information.
    ///
    /// # Fields
    ///
    /// * `src` - The identifier of the source that encountered the error
    /// * `message` - Descriptive error message explaining what went wrong
    #[error("Source error [{src}]: {message}")]
    Source { src: String, message: String },

    /// Rate limiting errors from upstream sites.
    ///
    /// Carries the `Retry-After` value in seconds when the site provided one.
    #[error("Rate limited, retry after {retry_after:?} seconds")]
    RateLimit { retry_after: Option<u64> },

    /// HTML/JSON/script parsing and data format errors.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use shiori::Error;
    ///
    /// let error = Error::parse("no chapter rows in document");
    /// ```
    #[error("Parse error: {0}")]
    Parse(String),

    /// JSON serialization and deserialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A bounded wait expired before its condition was met.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The headless browser could not be located or launched.
    ///
    /// This is fatal for the current request. No alternate browser binary is tried.
    #[error("Browser launch failed: {0}")]
    BrowserLaunch(String),

    /// Browser automation errors after launch (navigation, evaluation, page lifecycle).
    #[error("Browser error: {0}")]
    Browser(String),

    /// Resource not found errors.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use shiori::Error;
    ///
    /// let error = Error::not_found("source prefix 'zz'");
    /// ```
    #[error("Not found: {0}")]
    NotFound(String),

    /// I/O errors, such as binding the server socket.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error messages.
    #[error("{0}")]
    Other(String),
}

/// Coarse classification of an [`Error`], used for structured logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Parse,
    Timeout,
    Launch,
    NotFound,
}

impl Error {
    /// Creates a parse error with the given message.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use shiori::Error;
    ///
    /// let error = Error::parse(format!("Expected {} pages, found {}", 10, 0));
    /// ```
    pub fn parse(msg: impl Into<String>) -> Self {
        Error::Parse(msg.into())
    }

    /// Creates a source-specific error with source ID and message.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use shiori::Error;
    ///
    /// let error = Error::source("mk", "HTTP 503 Service Unavailable");
    /// ```
    pub fn source(src: impl Into<String>, msg: impl Into<String>) -> Self {
        Error::Source {
            src: src.into(),
            message: msg.into(),
        }
    }

    /// Creates a not found error with the given message.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    /// Creates a rate limit error with optional retry-after time.
    pub fn rate_limit(retry_after: Option<u64>) -> Self {
        Error::RateLimit { retry_after }
    }

    /// Creates a timeout error describing the wait that expired.
    pub fn timeout(msg: impl Into<String>) -> Self {
        Error::Timeout(msg.into())
    }

    /// Creates a browser launch error.
    pub fn launch(msg: impl Into<String>) -> Self {
        Error::BrowserLaunch(msg.into())
    }

    /// Creates a page-level browser error.
    pub fn browser(msg: impl Into<String>) -> Self {
        Error::Browser(msg.into())
    }

    /// Returns the taxonomy bucket this error belongs to.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use shiori::error::{Error, ErrorKind};
    ///
    /// assert_eq!(Error::launch("no chromium").kind(), ErrorKind::Launch);
    /// assert_eq!(Error::source("ap", "HTTP 502").kind(), ErrorKind::Transport);
    /// ```
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Network(_)
            | Error::Source { .. }
            | Error::RateLimit { .. }
            | Error::Browser(_)
            | Error::Io(_)
            | Error::Other(_) => ErrorKind::Transport,
            Error::Parse(_) | Error::Json(_) => ErrorKind::Parse,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::BrowserLaunch(_) => ErrorKind::Launch,
            Error::NotFound(_) => ErrorKind::NotFound,
        }
    }
}

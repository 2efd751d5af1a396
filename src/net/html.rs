//! HTML parsing utilities for the scraped sources.
//!
//! Thin helpers over the `scraper` crate for CSS selector-based extraction, plus URL
//! normalization shared by every extractor.
//!
//! # Examples
//!
//! ```rust
//! use shiori::net::html;
//!
//! let document = html::parse(r#"<h1 class="title">Solo Leveling</h1><img src="//cdn.example/c.jpg">"#);
//! assert_eq!(html::select_text(&document, ".title"), Some("Solo Leveling".to_string()));
//! assert_eq!(
//!     html::normalize_url("//cdn.example/c.jpg", None),
//!     Some("https://cdn.example/c.jpg".to_string())
//! );
//! ```

use rayon::prelude::*;
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Parses an HTML document from a string.
pub fn parse(html: &str) -> Html {
    Html::parse_document(html)
}

/// Extracts trimmed text content from the first element matching a CSS selector.
///
/// Returns `None` when nothing matches, the selector is invalid, or the text is empty.
pub fn select_text(html: &Html, selector: &str) -> Option<String> {
    Selector::parse(selector).ok().and_then(|sel| {
        html.select(&sel)
            .next()
            .map(|el| collapse_whitespace(&el.text().collect::<String>()))
            .filter(|text| !text.is_empty())
    })
}

/// Extracts an attribute value from the first element matching a CSS selector.
pub fn select_attr(html: &Html, selector: &str, attr: &str) -> Option<String> {
    Selector::parse(selector).ok().and_then(|sel| {
        html.select(&sel)
            .next()
            .and_then(|el| el.value().attr(attr).map(|v| v.trim().to_string()))
    })
}

/// Extracts text content from all elements matching a CSS selector, in document order.
pub fn select_all_text(html: &Html, selector: &str) -> Vec<String> {
    Selector::parse(selector)
        .ok()
        .map(|sel| {
            html.select(&sel)
                .map(|el| collapse_whitespace(&el.text().collect::<String>()))
                .filter(|text| !text.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Extracts attribute values from all elements matching a CSS selector, in document order.
pub fn select_all_attr(html: &Html, selector: &str, attr: &str) -> Vec<String> {
    Selector::parse(selector)
        .ok()
        .map(|sel| {
            html.select(&sel)
                .filter_map(|el| el.value().attr(attr).map(|v| v.trim().to_string()))
                .collect()
        })
        .unwrap_or_default()
}

/// Text of the first descendant of `element` matching `selector`.
pub fn child_text(element: ElementRef<'_>, selector: &str) -> Option<String> {
    Selector::parse(selector).ok().and_then(|sel| {
        element
            .select(&sel)
            .next()
            .map(|el| collapse_whitespace(&el.text().collect::<String>()))
            .filter(|text| !text.is_empty())
    })
}

/// Attribute of the first descendant of `element` matching `selector`.
pub fn child_attr(element: ElementRef<'_>, selector: &str, attr: &str) -> Option<String> {
    Selector::parse(selector).ok().and_then(|sel| {
        element
            .select(&sel)
            .next()
            .and_then(|el| el.value().attr(attr).map(|v| v.trim().to_string()))
            .filter(|v| !v.is_empty())
    })
}

/// First non-empty lazy-load aware image source of an `img` element.
pub fn image_source(img: ElementRef<'_>) -> Option<String> {
    ["data-src", "data-lazy-src", "data-original", "src"]
        .iter()
        .filter_map(|attr| img.value().attr(attr))
        .map(|v| v.trim().replace(['\n', '\t'], ""))
        .find(|v| !v.is_empty() && !v.starts_with("data:"))
}

/// Parses repeated item blocks in parallel using rayon.
///
/// Every element matching `selector` is serialized and re-parsed as a fragment on the
/// rayon pool, then handed to `parser`. Results keep document order; items for which
/// the parser returns `None` are dropped.
///
/// Only use this for block-level items (`div`, `li`, `article`). Table rows lose their
/// structure when parsed as standalone fragments.
pub fn parse_items<T, F>(html: &Html, selector: &str, parser: F) -> Vec<T>
where
    T: Send,
    F: Fn(ElementRef<'_>) -> Option<T> + Sync,
{
    Selector::parse(selector)
        .ok()
        .map(|sel| {
            let elements: Vec<String> = html.select(&sel).map(|el| el.html()).collect();

            elements
                .into_par_iter()
                .filter_map(|html_str| {
                    let doc = Html::parse_fragment(&html_str);
                    let element = doc
                        .root_element()
                        .children()
                        .find_map(ElementRef::wrap)?;
                    parser(element)
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Normalizes a URL found in scraped markup.
///
/// - Protocol-relative URLs (`//host/path`) become `https://host/path`
/// - Absolute `http(s)` URLs are returned unchanged
/// - Relative URLs are joined onto `base` when one is given
///
/// Returns `None` for empty input or relative input without a base.
pub fn normalize_url(raw: &str, base: Option<&str>) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Some(rest) = raw.strip_prefix("//") {
        return Some(format!("https://{}", rest));
    }
    if raw.starts_with("http://") || raw.starts_with("https://") {
        return Some(raw.to_string());
    }

    let base = Url::parse(base?).ok()?;
    base.join(raw).ok().map(|u| u.to_string())
}

/// Last non-empty path segment of a URL, with any trailing slash ignored.
///
/// ```rust
/// use shiori::net::html::last_path_segment;
///
/// assert_eq!(last_path_segment("https://site/manga/abc/chapter-12/"), Some("chapter-12".to_string()));
/// ```
pub fn last_path_segment(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty() && !s.contains(':'))
        .map(String::from)
}

/// Collapses runs of whitespace into single spaces and trims the result.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

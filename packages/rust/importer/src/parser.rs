//! Netscape bookmark file parser.
//!
//! Browser exports look like:
//! - `<DT><H3>Folder</H3>` followed by a `<DL>` holding the folder contents
//! - `<DT><A HREF="..." ADD_DATE="..." ICON="...">Title</A>` for each bookmark
//!
//! The markup is not well-formed (unclosed `<DT>` and `<p>`), so we let the
//! HTML5 parser in `scraper` repair it and derive folder paths from the
//! repaired tree: every `<DL>` ancestor whose previous sibling is an `<H3>`
//! contributes one folder name.

use std::path::Path;
use std::sync::LazyLock;

use cleanbook_shared::Bookmark;
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Schemes that never make sense as a bookmark to classify.
const REJECTED_SCHEMES: &[&str] = &[
    "javascript:",
    "data:",
    "chrome:",
    "about:",
    "file:",
    "mailto:",
    "place:",
];

static ANCHOR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("anchor selector"));

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parse a Netscape bookmark export into bookmarks, in document order.
///
/// Anchors with a non-http(s) target are dropped. Anchors with empty text
/// use their URL as title.
pub fn parse_bookmarks_html(html: &str, source: Option<&Path>) -> Vec<Bookmark> {
    let document = Html::parse_document(html);
    let mut bookmarks = Vec::new();

    for anchor in document.select(&ANCHOR_SELECTOR) {
        let el = anchor.value();
        let Some(href) = el.attr("href").map(str::trim) else {
            continue;
        };
        if !is_valid_url(href) {
            tracing::trace!(href, "skipping non-web bookmark");
            continue;
        }

        let text = anchor.text().collect::<String>();
        let text = text.trim();
        let title = if text.is_empty() { href } else { text };

        bookmarks.push(Bookmark {
            url: href.to_string(),
            title: title.to_string(),
            add_date: attr_owned(&anchor, "add_date"),
            last_modified: attr_owned(&anchor, "last_modified"),
            icon: attr_owned(&anchor, "icon"),
            source_file: source.map(Path::to_path_buf),
            folder_path: folder_path(&anchor),
        });
    }

    bookmarks
}

/// Whether `url` is an http(s) URL worth keeping.
pub fn is_valid_url(url: &str) -> bool {
    let lower = url.trim().to_ascii_lowercase();
    if lower.is_empty() || REJECTED_SCHEMES.iter().any(|s| lower.starts_with(s)) {
        return false;
    }
    match Url::parse(url.trim()) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some(),
        Err(_) => false,
    }
}

fn attr_owned(el: &ElementRef<'_>, name: &str) -> Option<String> {
    el.value()
        .attr(name)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Folder names enclosing `anchor`, outermost first.
fn folder_path(anchor: &ElementRef<'_>) -> Vec<String> {
    let mut path = Vec::new();

    for node in anchor.ancestors() {
        let Some(dl) = ElementRef::wrap(node) else {
            continue;
        };
        if dl.value().name() != "dl" {
            continue;
        }
        let heading = dl
            .prev_siblings()
            .filter_map(ElementRef::wrap)
            .next()
            .filter(|el| el.value().name() == "h3");
        if let Some(h3) = heading {
            let name = h3.text().collect::<String>().trim().to_string();
            if !name.is_empty() {
                path.push(name);
            }
        }
    }

    path.reverse();
    path
}

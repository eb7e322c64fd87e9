//! Input discovery and file loading.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use cleanbook_shared::{Bookmark, CleanbookError, Result};
use tracing::{debug, instrument};

use crate::parser::parse_bookmarks_html;

/// Expand the given paths into a list of bookmark files.
///
/// Directories contribute their `*.html` / `*.htm` children (non-recursive,
/// sorted by name). Plain files are kept as given. A file reached twice is
/// kept once, at its first position. Missing paths are an error.
pub fn collect_inputs(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_dir() {
            let entries = std::fs::read_dir(path).map_err(|e| CleanbookError::io(path, e))?;
            let mut found: Vec<PathBuf> = entries
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_html_file(p))
                .collect();
            found.sort();
            debug!(dir = %path.display(), count = found.len(), "expanded input directory");
            files.extend(found);
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            return Err(CleanbookError::validation(format!(
                "input not found: {}",
                path.display()
            )));
        }
    }

    let mut seen = HashSet::new();
    files.retain(|p| seen.insert(std::fs::canonicalize(p).unwrap_or_else(|_| p.clone())));
    Ok(files)
}

fn is_html_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("html") || e.eq_ignore_ascii_case("htm"))
        .unwrap_or(false)
}

/// Read and parse one bookmark export. Invalid UTF-8 is replaced lossily.
#[instrument(skip_all, fields(path = %path.display()))]
pub async fn load_file(path: &Path) -> Result<Vec<Bookmark>> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| CleanbookError::io(path, e))?;
    let html = String::from_utf8_lossy(&bytes);
    let bookmarks = parse_bookmarks_html(&html, Some(path));
    debug!(count = bookmarks.len(), "parsed bookmark file");
    Ok(bookmarks)
}

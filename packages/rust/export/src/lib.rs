//! Renderers for the organized bookmark tree.
//!
//! Every renderer is a pure function from the tree (plus run statistics
//! and [`ExportMeta`]) to a string. [`export_all`] writes the requested
//! formats side by side, each on a blocking task.

pub mod csv;
pub mod format;
pub mod html;
pub mod json;
pub mod markdown;
pub mod opml;
pub mod xml;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use cleanbook_shared::{CategoryTree, CleanbookError, ProcessingStats, Result, RunId};
use tracing::{info, instrument, warn};

pub use csv::render_csv;
pub use format::ExportFormat;
pub use html::{TOOLBAR_FOLDER, confidence_indicator, render_html};
pub use json::render_json;
pub use markdown::render_markdown;
pub use opml::render_opml;
pub use xml::render_xml;

/// Generator string embedded in exports.
pub const GENERATOR: &str = concat!("CleanBook ", env!("CARGO_PKG_VERSION"));

/// Run-level facts shared by all renderers.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportMeta {
    pub run_id: RunId,
    pub generated_at: DateTime<Utc>,
    /// Prefix HTML titles with a confidence emoji.
    pub show_confidence_indicator: bool,
}

impl Default for ExportMeta {
    fn default() -> Self {
        Self {
            run_id: RunId::new(),
            generated_at: Utc::now(),
            show_confidence_indicator: true,
        }
    }
}

/// Escape text for HTML/XML content and double-quoted attributes.
pub(crate) fn escape_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Render one format to a string.
pub fn render(
    format: ExportFormat,
    tree: &CategoryTree,
    stats: &ProcessingStats,
    meta: &ExportMeta,
) -> Result<String> {
    Ok(match format {
        ExportFormat::Html => render_html(tree, meta),
        ExportFormat::Json => render_json(tree, stats, meta)?,
        ExportFormat::Markdown => render_markdown(tree, stats, meta),
        ExportFormat::Csv => render_csv(tree),
        ExportFormat::Xml => render_xml(tree, stats, meta),
        ExportFormat::Opml => render_opml(tree, meta),
    })
}

/// `bookmarks_{stamp}.{ext}`
pub fn output_file_name(format: ExportFormat, stamp: &str) -> String {
    format!("bookmarks_{stamp}.{}", format.extension())
}

/// Write to a temp file next to `path`, then rename over it.
fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = path.with_file_name(format!(".{file_name}.tmp"));
    std::fs::write(&temp, content).map_err(|e| CleanbookError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| CleanbookError::io(path, e))
}

/// Render and write every format in `formats` to `out_dir`.
///
/// Formats are written in parallel. A failing format is logged and left
/// out of the returned paths; the others still complete.
#[instrument(skip_all, fields(out_dir = %out_dir.display(), formats = formats.len()))]
pub async fn export_all(
    tree: Arc<CategoryTree>,
    stats: Arc<ProcessingStats>,
    meta: Arc<ExportMeta>,
    out_dir: &Path,
    formats: &[ExportFormat],
    stamp: &str,
) -> Result<Vec<PathBuf>> {
    tokio::fs::create_dir_all(out_dir)
        .await
        .map_err(|e| CleanbookError::io(out_dir, e))?;

    let handles: Vec<_> = formats
        .iter()
        .map(|&format| {
            let path = out_dir.join(output_file_name(format, stamp));
            let (tree, stats, meta) = (tree.clone(), stats.clone(), meta.clone());
            let task = tokio::task::spawn_blocking(move || {
                let content = render(format, &tree, &stats, &meta)?;
                write_atomic(&path, &content)?;
                Ok::<_, CleanbookError>(path)
            });
            (format, task)
        })
        .collect();

    let mut written = Vec::with_capacity(handles.len());
    for (format, handle) in handles {
        match handle.await {
            Ok(Ok(path)) => {
                info!(%format, path = %path.display(), "export written");
                written.push(path);
            }
            Ok(Err(e)) => warn!(%format, error = %e, "export failed"),
            Err(e) => warn!(%format, error = %e, "export task panicked"),
        }
    }
    Ok(written)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use cleanbook_shared::{Bookmark, CategoryNode, ClassifiedBookmark};

    pub fn classified(url: &str, title: &str, category: &str, confidence: f64) -> ClassifiedBookmark {
        ClassifiedBookmark {
            bookmark: Bookmark::new(url, title),
            category: category.into(),
            subcategory: None,
            confidence,
            reasoning: vec![],
            alternatives: vec![],
            method: "rule_engine+semantic".into(),
        }
    }

    /// 技术 › 编程 › Rust, 技术 › Tom & Jerry, 未分类 › Mystery.
    pub fn sample_tree() -> CategoryTree {
        let mut rust = classified("https://github.com/rust-lang/rust", "Rust", "技术/编程", 0.95);
        rust.bookmark.add_date = Some("1600000000".into());
        rust.bookmark.source_file = Some("in/bookmarks.html".into());

        let mut tech = CategoryNode::new("技术");
        tech.items
            .push(classified("https://example.com/tj?a=1&b=2", "Tom & Jerry <3", "技术", 0.6));
        tech.subcategory_mut("编程").items.push(rust);

        let mut other = CategoryNode::new("未分类");
        let mut mystery = classified("https://mystery.example/", "Mystery, \"quoted\"", "未分类", 0.0);
        mystery.method = "fallback".into();
        other.items.push(mystery);

        CategoryTree {
            categories: vec![tech, other],
        }
    }

    pub fn sample_stats() -> ProcessingStats {
        ProcessingStats {
            files_processed: 1,
            total_bookmarks: 4,
            duplicates_removed: 1,
            processed_bookmarks: 3,
            errors: 0,
            processing_time_secs: 1.5,
            categories_found: [("技术".to_string(), 2), ("未分类".to_string(), 1)].into(),
            method_counts: [("rule_engine".to_string(), 2), ("fallback".to_string(), 1)].into(),
            average_confidence: 0.5167,
        }
    }

    pub fn meta() -> ExportMeta {
        ExportMeta {
            run_id: "01890a5d-ac96-774b-bcce-b302099a8057".parse().expect("run id"),
            generated_at: DateTime::from_timestamp(1_700_000_000, 0).expect("timestamp"),
            show_confidence_indicator: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_support::{meta, sample_stats, sample_tree};

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_markup(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn file_names_use_stamp_and_extension() {
        assert_eq!(
            output_file_name(ExportFormat::Markdown, "20240101_120000"),
            "bookmarks_20240101_120000.md"
        );
    }

    #[tokio::test]
    async fn export_all_writes_every_format() {
        let dir = std::env::temp_dir().join(format!("cleanbook-export-{}", uuid::Uuid::now_v7()));
        let written = export_all(
            Arc::new(sample_tree()),
            Arc::new(sample_stats()),
            Arc::new(meta()),
            &dir,
            &ExportFormat::ALL,
            "test",
        )
        .await
        .expect("export");

        assert_eq!(written.len(), ExportFormat::ALL.len());
        for format in ExportFormat::ALL {
            let path = dir.join(output_file_name(format, "test"));
            let content = std::fs::read_to_string(&path).expect("written file");
            assert!(!content.is_empty(), "{format} export is empty");
        }
        assert!(!dir.join(".bookmarks_test.html.tmp").exists());

        let _ = std::fs::remove_dir_all(&dir);
    }
}

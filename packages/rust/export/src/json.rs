use cleanbook_shared::{
    CategoryTree, CleanbookError, EXPORT_FORMAT_VERSION, ProcessingStats, Result,
};
use serde_json::json;

use crate::{ExportMeta, GENERATOR};

/// `{metadata, statistics, bookmarks}` document, pretty-printed.
pub fn render_json(tree: &CategoryTree, stats: &ProcessingStats, meta: &ExportMeta) -> Result<String> {
    let doc = json!({
        "metadata": {
            "export_time": meta.generated_at.to_rfc3339(),
            "format_version": EXPORT_FORMAT_VERSION,
            "generator": GENERATOR,
            "run_id": meta.run_id,
            "total_categories": tree.categories.len(),
            "total_bookmarks": tree.total_bookmarks(),
        },
        "statistics": stats,
        "bookmarks": tree,
    });
    serde_json::to_string_pretty(&doc)
        .map_err(|e| CleanbookError::Export(format!("JSON serialization failed: {e}")))
}

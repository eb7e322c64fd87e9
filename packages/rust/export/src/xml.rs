use std::fmt::Write as _;

use cleanbook_shared::{
    CategoryNode, CategoryTree, ClassifiedBookmark, EXPORT_FORMAT_VERSION, ProcessingStats,
};

use crate::{ExportMeta, GENERATOR, escape_markup};

pub fn render_xml(tree: &CategoryTree, stats: &ProcessingStats, meta: &ExportMeta) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    let _ = writeln!(
        out,
        "<bookmarks version=\"{EXPORT_FORMAT_VERSION}\" generator=\"{}\" run_id=\"{}\" exported=\"{}\">",
        escape_markup(GENERATOR),
        meta.run_id,
        meta.generated_at.to_rfc3339()
    );

    out.push_str("  <statistics>\n");
    let counters = [
        ("files_processed", stats.files_processed.to_string()),
        ("total_bookmarks", stats.total_bookmarks.to_string()),
        ("duplicates_removed", stats.duplicates_removed.to_string()),
        ("processed_bookmarks", stats.processed_bookmarks.to_string()),
        ("errors", stats.errors.to_string()),
        ("processing_time_secs", format!("{:.3}", stats.processing_time_secs)),
        ("average_confidence", format!("{:.3}", stats.average_confidence)),
    ];
    for (tag, value) in counters {
        let _ = writeln!(out, "    <{tag}>{value}</{tag}>");
    }
    for (method, count) in &stats.method_counts {
        let _ = writeln!(
            out,
            "    <method name=\"{}\" count=\"{count}\"/>",
            escape_markup(method)
        );
    }
    out.push_str("  </statistics>\n");

    let _ = writeln!(out, "  <categories count=\"{}\">", tree.categories.len());
    for node in &tree.categories {
        write_category(&mut out, node, 2);
    }
    out.push_str("  </categories>\n</bookmarks>\n");
    out
}

fn write_category(out: &mut String, node: &CategoryNode, depth: usize) {
    let pad = "  ".repeat(depth);
    let _ = writeln!(
        out,
        "{pad}<category name=\"{}\" count=\"{}\">",
        escape_markup(&node.name),
        node.count()
    );
    if !node.items.is_empty() {
        let _ = writeln!(out, "{pad}  <items>");
        for item in &node.items {
            write_bookmark(out, item, depth + 2);
        }
        let _ = writeln!(out, "{pad}  </items>");
    }
    for sub in &node.subcategories {
        write_category(out, sub, depth + 1);
    }
    let _ = writeln!(out, "{pad}</category>");
}

fn write_bookmark(out: &mut String, item: &ClassifiedBookmark, depth: usize) {
    let b = &item.bookmark;
    let _ = write!(
        out,
        "{}<bookmark url=\"{}\" title=\"{}\" confidence=\"{:.3}\" method=\"{}\"",
        "  ".repeat(depth),
        escape_markup(&b.url),
        escape_markup(&b.title),
        item.confidence,
        escape_markup(&item.method)
    );
    if let Some(add_date) = &b.add_date {
        let _ = write!(out, " add_date=\"{}\"", escape_markup(add_date));
    }
    out.push_str("/>\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{meta, sample_stats, sample_tree};

    #[test]
    fn nests_categories_and_escapes_attributes() {
        let xml = render_xml(&sample_tree(), &sample_stats(), &meta());

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<bookmarks version=\"2.0\""));
        assert!(xml.contains("<duplicates_removed>1</duplicates_removed>"));
        assert!(xml.contains("<method name=\"fallback\" count=\"1\"/>"));
        assert!(xml.contains("<categories count=\"2\">"));
        assert!(xml.contains("<category name=\"技术\" count=\"2\">"));
        assert!(xml.contains("      <category name=\"编程\" count=\"1\">"));
        assert!(xml.contains("url=\"https://example.com/tj?a=1&amp;b=2\""));
        assert!(xml.contains("title=\"Mystery, &quot;quoted&quot;\""));
        assert!(xml.contains("add_date=\"1600000000\""));
        assert!(xml.trim_end().ends_with("</bookmarks>"));
    }

    #[test]
    fn tags_are_balanced() {
        let xml = render_xml(&sample_tree(), &sample_stats(), &meta());
        assert_eq!(xml.matches("<category ").count(), xml.matches("</category>").count());
        assert_eq!(xml.matches("<items>").count(), xml.matches("</items>").count());
    }
}

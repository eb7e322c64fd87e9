//! Human-readable Markdown report.

use std::collections::HashMap;
use std::fmt::Write as _;

use cleanbook_shared::{CategoryNode, CategoryTree, ProcessingStats};

use crate::{ExportMeta, GENERATOR};

/// GitHub-style heading anchor: lower-case, punctuation dropped, spaces
/// turned into dashes. CJK characters are kept.
pub fn slugify(heading: &str) -> String {
    heading
        .trim()
        .to_lowercase()
        .chars()
        .filter_map(|c| match c {
            ' ' => Some('-'),
            c if c.is_alphanumeric() || c == '-' || c == '_' => Some(c),
            _ => None,
        })
        .collect()
}

/// Hands out unique anchors, suffixing repeats with `-1`, `-2`, ...
#[derive(Default)]
struct Anchors {
    seen: HashMap<String, usize>,
}

impl Anchors {
    fn next(&mut self, heading: &str) -> String {
        let slug = slugify(heading);
        let count = self.seen.entry(slug.clone()).or_default();
        let anchor = if *count == 0 {
            slug
        } else {
            format!("{slug}-{count}")
        };
        *count += 1;
        anchor
    }
}

const FIXED_HEADINGS: [&str; 5] = [
    "Bookmark Report",
    "Statistics",
    "Classification methods",
    "Category distribution",
    "Contents",
];

fn escape_link_text(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('[', "\\[")
        .replace(']', "\\]")
}

fn escape_link_target(url: &str) -> String {
    url.replace(' ', "%20")
        .replace('(', "%28")
        .replace(')', "%29")
}

fn percent(part: usize, total: usize) -> f64 {
    part as f64 * 100.0 / total.max(1) as f64
}

pub fn render_markdown(tree: &CategoryTree, stats: &ProcessingStats, meta: &ExportMeta) -> String {
    let mut out = String::new();
    let total = tree.total_bookmarks();

    let _ = writeln!(out, "# Bookmark Report\n");
    let _ = writeln!(
        out,
        "Generated {} by {GENERATOR} (run `{}`).\n",
        meta.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
        meta.run_id
    );

    let _ = writeln!(out, "## Statistics\n");
    let _ = writeln!(out, "| Metric | Value |\n|---|---|");
    let rows = [
        ("Files processed", stats.files_processed.to_string()),
        ("Bookmarks read", stats.total_bookmarks.to_string()),
        ("Duplicates removed", stats.duplicates_removed.to_string()),
        ("Bookmarks classified", stats.processed_bookmarks.to_string()),
        ("Errors", stats.errors.to_string()),
        ("Average confidence", format!("{:.3}", stats.average_confidence)),
        ("Processing time", format!("{:.2} s", stats.processing_time_secs)),
    ];
    for (label, value) in rows {
        let _ = writeln!(out, "| {label} | {value} |");
    }

    if !stats.method_counts.is_empty() {
        let _ = writeln!(out, "\n## Classification methods\n");
        let method_total: usize = stats.method_counts.values().sum();
        for (method, count) in &stats.method_counts {
            let _ = writeln!(
                out,
                "- `{method}`: {count} ({:.1}%)",
                percent(*count, method_total)
            );
        }
    }

    let _ = writeln!(out, "\n## Category distribution\n");
    let _ = writeln!(out, "| Category | Bookmarks | Share |\n|---|---:|---:|");
    for node in &tree.categories {
        let count = node.count();
        let _ = writeln!(
            out,
            "| {} | {count} | {:.1}% |",
            node.name.replace('|', "\\|"),
            percent(count, total)
        );
    }

    // Fixed headings claim their anchors first.
    let mut anchors = Anchors::default();
    for heading in FIXED_HEADINGS {
        anchors.next(heading);
    }

    let mut sections = String::new();
    let _ = writeln!(out, "\n## Contents\n");
    for node in &tree.categories {
        write_category(&mut out, &mut sections, node, 2, &mut anchors);
    }
    out.push('\n');
    out.push_str(&sections);
    out
}

/// Append a contents entry to `toc` and the category's section to `body`.
fn write_category(
    toc: &mut String,
    body: &mut String,
    node: &CategoryNode,
    level: usize,
    anchors: &mut Anchors,
) {
    let anchor = anchors.next(&node.name);
    let indent = "  ".repeat(level - 2);
    let _ = writeln!(
        toc,
        "{indent}- [{}](#{anchor}) ({})",
        escape_link_text(&node.name),
        node.count()
    );

    let _ = writeln!(body, "{} {}\n", "#".repeat(level.min(6)), node.name);
    for item in &node.items {
        let b = &item.bookmark;
        let _ = writeln!(
            body,
            "- [{}]({}) `{:.2}`",
            escape_link_text(&b.title),
            escape_link_target(&b.url),
            item.confidence
        );
    }
    if !node.items.is_empty() {
        body.push('\n');
    }
    for sub in &node.subcategories {
        write_category(toc, body, sub, level + 1, anchors);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{meta, sample_stats, sample_tree};

    #[test]
    fn slugs_keep_cjk_and_drop_punctuation() {
        assert_eq!(slugify("AI/机器学习"), "ai机器学习");
        assert_eq!(slugify("Dev Tools & More"), "dev-tools--more");
    }

    #[test]
    fn repeated_headings_get_suffixes() {
        let mut anchors = Anchors::default();
        assert_eq!(anchors.next("Tools"), "tools");
        assert_eq!(anchors.next("Tools"), "tools-1");
    }

    #[test]
    fn report_sections() {
        let md = render_markdown(&sample_tree(), &sample_stats(), &meta());
        assert!(md.starts_with("# Bookmark Report"));
        assert!(md.contains("| Duplicates removed | 1 |"));
        assert!(md.contains("- `rule_engine`: 2 (66.7%)"));
        assert!(md.contains("| 技术 | 2 | 66.7% |"));
        assert!(md.contains("- [技术](#技术) (2)"));
        assert!(md.contains("  - [编程](#编程) (1)"));
        assert!(md.contains("## 技术\n"));
        assert!(md.contains("### 编程\n"));
        assert!(md.contains("- [Rust](https://github.com/rust-lang/rust) `0.95`"));
    }
}

//! Flat CSV, one row per bookmark, RFC 4180 quoting.

use cleanbook_shared::{CategoryNode, CategoryTree, ClassifiedBookmark};

pub const CSV_HEADER: [&str; 8] = [
    "category",
    "subcategory",
    "title",
    "url",
    "confidence",
    "method",
    "add_date",
    "source_file",
];

/// Quote a field when it contains a delimiter, quote or line break.
pub fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn row(category: &str, subcategory: &str, item: &ClassifiedBookmark) -> String {
    let b = &item.bookmark;
    let source = b
        .source_file
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    let confidence = format!("{:.3}", item.confidence);
    let fields: [&str; 8] = [
        category,
        subcategory,
        &b.title,
        &b.url,
        &confidence,
        &item.method,
        b.add_date.as_deref().unwrap_or(""),
        &source,
    ];
    fields
        .iter()
        .map(|f| csv_field(f))
        .collect::<Vec<_>>()
        .join(",")
}

fn collect_rows<'a>(
    node: &'a CategoryNode,
    category: &str,
    sub_path: &[&'a str],
    rows: &mut Vec<String>,
) {
    let subcategory = sub_path.join("/");
    for item in &node.items {
        rows.push(row(category, &subcategory, item));
    }
    for sub in &node.subcategories {
        let mut path = sub_path.to_vec();
        path.push(&sub.name);
        collect_rows(sub, category, &path, rows);
    }
}

pub fn render_csv(tree: &CategoryTree) -> String {
    let mut rows = vec![CSV_HEADER.join(",")];
    for node in &tree.categories {
        collect_rows(node, &node.name, &[], &mut rows);
    }
    let mut out = rows.join("\r\n");
    out.push_str("\r\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_tree;

    #[test]
    fn quoting_rules() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_field("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn rows_follow_the_tree() {
        let csv = render_csv(&sample_tree());
        let lines: Vec<&str> = csv.split("\r\n").filter(|l| !l.is_empty()).collect();

        assert_eq!(
            lines[0],
            "category,subcategory,title,url,confidence,method,add_date,source_file"
        );
        assert_eq!(lines.len(), 4);
        assert!(lines[1].starts_with("技术,,Tom & Jerry <3,https://example.com/tj?a=1&b=2,0.600,"));
        assert_eq!(
            lines[2],
            "技术,编程,Rust,https://github.com/rust-lang/rust,0.950,rule_engine+semantic,1600000000,in/bookmarks.html"
        );
        assert!(lines[3].contains("\"Mystery, \"\"quoted\"\"\""));
    }
}

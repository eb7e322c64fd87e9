//! OPML 2.0 outline, one outline per folder and a `type="link"` leaf per
//! bookmark.

use std::fmt::Write as _;

use cleanbook_shared::{CategoryNode, CategoryTree};

use crate::{ExportMeta, escape_markup};

pub fn render_opml(tree: &CategoryTree, meta: &ExportMeta) -> String {
    let mut out = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<opml version=\"2.0\">\n  <head>\n",
    );
    let _ = writeln!(out, "    <title>CleanBook bookmarks</title>");
    let _ = writeln!(
        out,
        "    <dateCreated>{}</dateCreated>",
        meta.generated_at.to_rfc2822()
    );
    out.push_str("  </head>\n  <body>\n");
    for node in &tree.categories {
        write_outline(&mut out, node, 2);
    }
    out.push_str("  </body>\n</opml>\n");
    out
}

fn write_outline(out: &mut String, node: &CategoryNode, depth: usize) {
    let pad = "  ".repeat(depth);
    let name = escape_markup(&node.name);
    let _ = writeln!(out, "{pad}<outline text=\"{name}\" title=\"{name}\">");
    for item in &node.items {
        let title = escape_markup(&item.bookmark.title);
        let _ = writeln!(
            out,
            "{pad}  <outline type=\"link\" text=\"{title}\" title=\"{title}\" url=\"{}\"/>",
            escape_markup(&item.bookmark.url)
        );
    }
    for sub in &node.subcategories {
        write_outline(out, sub, depth + 1);
    }
    let _ = writeln!(out, "{pad}</outline>");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{meta, sample_tree};

    #[test]
    fn outlines_mirror_the_tree() {
        let opml = render_opml(&sample_tree(), &meta());

        assert!(opml.contains("<opml version=\"2.0\">"));
        assert!(opml.contains("<dateCreated>Tue, 14 Nov 2023 22:13:20 +0000</dateCreated>"));
        assert!(opml.contains("    <outline text=\"技术\" title=\"技术\">"));
        assert!(opml.contains("      <outline text=\"编程\" title=\"编程\">"));
        assert!(opml.contains(
            "<outline type=\"link\" text=\"Rust\" title=\"Rust\" url=\"https://github.com/rust-lang/rust\"/>"
        ));
        assert_eq!(opml.matches("type=\"link\"").count(), 3);
        assert_eq!(
            opml.matches("<outline text=").count(),
            opml.matches("</outline>").count()
        );
    }
}

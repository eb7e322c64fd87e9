//! Netscape bookmark file output, importable by every major browser.

use std::fmt::Write as _;

use cleanbook_shared::{CategoryNode, CategoryTree, ClassifiedBookmark};

use crate::{ExportMeta, escape_markup};

/// Name of the toolbar folder wrapping all categories.
pub const TOOLBAR_FOLDER: &str = "书签栏";

const INDENT: &str = "    ";

/// Confidence marker prefixed to titles: 🟢 ≥ 0.9, 🟡 ≥ 0.7, 🟠 ≥ 0.5,
/// 🔴 above zero, nothing at zero.
pub fn confidence_indicator(confidence: f64) -> Option<&'static str> {
    if confidence >= 0.9 {
        Some("🟢")
    } else if confidence >= 0.7 {
        Some("🟡")
    } else if confidence >= 0.5 {
        Some("🟠")
    } else if confidence > 0.0 {
        Some("🔴")
    } else {
        None
    }
}

pub fn render_html(tree: &CategoryTree, meta: &ExportMeta) -> String {
    let now = meta.generated_at.timestamp();
    let mut out = String::from(
        "<!DOCTYPE NETSCAPE-Bookmark-file-1>\n\
         <!-- This is an automatically generated file.\n     \
         It will be read and overwritten.\n     \
         DO NOT EDIT! -->\n\
         <META HTTP-EQUIV=\"Content-Type\" CONTENT=\"text/html; charset=UTF-8\">\n\
         <TITLE>Bookmarks</TITLE>\n\
         <H1>Bookmarks</H1>\n\
         <DL><p>\n",
    );
    let _ = writeln!(
        out,
        "{INDENT}<DT><H3 ADD_DATE=\"{now}\" LAST_MODIFIED=\"{now}\" PERSONAL_TOOLBAR_FOLDER=\"true\">{}</H3>",
        escape_markup(TOOLBAR_FOLDER)
    );
    let _ = writeln!(out, "{INDENT}<DL><p>");
    for node in &tree.categories {
        write_folder(&mut out, node, 2, now, meta.show_confidence_indicator);
    }
    let _ = writeln!(out, "{INDENT}</DL><p>");
    out.push_str("</DL><p>\n");
    out
}

fn write_folder(out: &mut String, node: &CategoryNode, depth: usize, now: i64, indicator: bool) {
    let pad = INDENT.repeat(depth);
    let _ = writeln!(
        out,
        "{pad}<DT><H3 ADD_DATE=\"{now}\" LAST_MODIFIED=\"{now}\">{}</H3>",
        escape_markup(&node.name)
    );
    let _ = writeln!(out, "{pad}<DL><p>");
    for item in &node.items {
        write_bookmark(out, item, depth + 1, indicator);
    }
    for sub in &node.subcategories {
        write_folder(out, sub, depth + 1, now, indicator);
    }
    let _ = writeln!(out, "{pad}</DL><p>");
}

fn write_bookmark(out: &mut String, item: &ClassifiedBookmark, depth: usize, indicator: bool) {
    let b = &item.bookmark;
    let mut attrs = format!("HREF=\"{}\"", escape_markup(&b.url));
    if let Some(add_date) = &b.add_date {
        let _ = write!(attrs, " ADD_DATE=\"{}\"", escape_markup(add_date));
    }
    if let Some(modified) = &b.last_modified {
        let _ = write!(attrs, " LAST_MODIFIED=\"{}\"", escape_markup(modified));
    }
    if let Some(icon) = &b.icon {
        let _ = write!(attrs, " ICON=\"{}\"", escape_markup(icon));
    }

    let title = match confidence_indicator(item.confidence).filter(|_| indicator) {
        Some(mark) => format!("{mark} {}", b.title),
        None => b.title.clone(),
    };
    let _ = writeln!(
        out,
        "{}<DT><A {attrs}>{}</A>",
        INDENT.repeat(depth),
        escape_markup(&title)
    );
}

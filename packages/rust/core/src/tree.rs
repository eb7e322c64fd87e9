//! Building the nested category tree from classification results.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use cleanbook_shared::{CategoryNode, CategoryTree, ClassifiedBookmark};

/// Resolve an alias for the full name first, then for its main part.
fn resolve_alias(category: &str, aliases: &BTreeMap<String, String>) -> String {
    if let Some(target) = aliases.get(category) {
        return target.clone();
    }
    match category.split_once('/') {
        Some((main, sub)) => match aliases.get(main.trim()) {
            Some(target) => format!("{target}/{sub}"),
            None => category.to_string(),
        },
        None => category.to_string(),
    }
}

/// Main category and optional subcategory for a result.
///
/// A `main/sub` category name wins over the `subcategory` field.
fn placement(item: &ClassifiedBookmark, aliases: &BTreeMap<String, String>) -> (String, Option<String>) {
    let category = resolve_alias(&item.category, aliases);
    match category.split_once('/') {
        Some((main, sub)) if !main.trim().is_empty() && !sub.trim().is_empty() => {
            (main.trim().to_string(), Some(sub.trim().to_string()))
        }
        _ => {
            let name = category.trim_matches('/').trim().to_string();
            let sub = item
                .subcategory
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string);
            (name, sub)
        }
    }
}

fn by_confidence(a: &ClassifiedBookmark, b: &ClassifiedBookmark) -> Ordering {
    b.confidence
        .partial_cmp(&a.confidence)
        .unwrap_or(Ordering::Equal)
}

fn sort_node(node: &mut CategoryNode) {
    node.items.sort_by(by_confidence);
    node.subcategories.sort_by(|a, b| a.name.cmp(&b.name));
    for sub in &mut node.subcategories {
        sort_node(sub);
    }
}

/// Group results into a category tree.
///
/// Items are sorted by confidence (highest first, stable). Top-level
/// categories follow their first appearance in `order`; unlisted ones come
/// after, by name. Subcategories are sorted by name.
pub fn organize(
    classified: Vec<ClassifiedBookmark>,
    aliases: &BTreeMap<String, String>,
    order: &[String],
) -> CategoryTree {
    let mut tree = CategoryTree::default();

    for item in classified {
        let (main, sub) = placement(&item, aliases);
        let node = tree.category_mut(&main);
        match sub {
            Some(sub) => node.subcategory_mut(&sub).items.push(item),
            None => node.items.push(item),
        }
    }

    // Order entries may name a `main/sub` category; its main part counts.
    let rank = |name: &str| {
        order
            .iter()
            .position(|o| o == name || o.split('/').next().map(str::trim) == Some(name))
            .unwrap_or(usize::MAX)
    };
    tree.categories
        .sort_by(|a, b| rank(&a.name).cmp(&rank(&b.name)).then_with(|| a.name.cmp(&b.name)));
    for node in &mut tree.categories {
        sort_node(node);
    }
    tree
}

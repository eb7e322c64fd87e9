//! Core domain types for CleanBook runs.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Category assigned when no strategy produced a vote.
pub const FALLBACK_CATEGORY: &str = "未分类";

/// Version tag written into JSON/XML exports.
pub const EXPORT_FORMAT_VERSION: &str = "2.0";

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one processing run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Bookmark
// ---------------------------------------------------------------------------

/// A single bookmark as read from a Netscape bookmark export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bookmark {
    /// Target URL (as found in the `HREF` attribute).
    pub url: String,
    /// Anchor text.
    pub title: String,
    /// `ADD_DATE` attribute (unix seconds, kept verbatim).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_date: Option<String>,
    /// `LAST_MODIFIED` attribute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    /// `ICON` attribute (data URI favicon).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// File the bookmark was loaded from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<PathBuf>,
    /// Folder names enclosing the bookmark in the source file.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub folder_path: Vec<String>,
}

impl Bookmark {
    /// Create a bookmark with just a URL and title.
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            add_date: None,
            last_modified: None,
            icon: None,
            source_file: None,
            folder_path: Vec::new(),
        }
    }

    /// `ADD_DATE` parsed as unix seconds, if numeric.
    pub fn added_at(&self) -> Option<DateTime<Utc>> {
        let secs: i64 = self.add_date.as_deref()?.trim().parse().ok()?;
        DateTime::from_timestamp(secs, 0)
    }
}

// ---------------------------------------------------------------------------
// ClassifiedBookmark
// ---------------------------------------------------------------------------

/// A bookmark with its final classification attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedBookmark {
    #[serde(flatten)]
    pub bookmark: Bookmark,
    /// Category name; may contain a `/` separating main and sub category.
    pub category: String,
    /// Optional subcategory derived from the category hierarchy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Human-readable reasons contributed by each strategy.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasoning: Vec<String>,
    /// Runner-up categories with their normalized scores (at most three).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<(String, f64)>,
    /// `+`-joined tags of the strategies that voted, or `fallback`.
    pub method: String,
}

impl ClassifiedBookmark {
    /// Wrap a bookmark into the fallback bucket.
    pub fn fallback(bookmark: Bookmark, reason: impl Into<String>) -> Self {
        Self {
            bookmark,
            category: FALLBACK_CATEGORY.to_string(),
            subcategory: None,
            confidence: 0.0,
            reasoning: vec![reason.into()],
            alternatives: Vec::new(),
            method: "fallback".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Category tree
// ---------------------------------------------------------------------------

/// One folder of the organized output (category or subcategory).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryNode {
    /// Display name of the folder.
    pub name: String,
    /// Bookmarks directly in this folder.
    #[serde(default)]
    pub items: Vec<ClassifiedBookmark>,
    /// Nested folders, in display order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subcategories: Vec<CategoryNode>,
}

impl CategoryNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Vec::new(),
            subcategories: Vec::new(),
        }
    }

    /// Get the named subcategory, creating it at the end if missing.
    pub fn subcategory_mut(&mut self, name: &str) -> &mut CategoryNode {
        let idx = match self.subcategories.iter().position(|n| n.name == name) {
            Some(idx) => idx,
            None => {
                self.subcategories.push(CategoryNode::new(name));
                self.subcategories.len() - 1
            }
        };
        &mut self.subcategories[idx]
    }

    /// Total bookmarks in this node and all descendants.
    pub fn count(&self) -> usize {
        self.items.len() + self.subcategories.iter().map(CategoryNode::count).sum::<usize>()
    }

    /// Depth-first iterator over every bookmark under this node.
    pub fn iter_bookmarks(&self) -> Box<dyn Iterator<Item = &ClassifiedBookmark> + '_> {
        Box::new(
            self.items
                .iter()
                .chain(self.subcategories.iter().flat_map(|n| n.iter_bookmarks())),
        )
    }
}

/// The organized output: ordered top-level categories.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryTree {
    pub categories: Vec<CategoryNode>,
}

impl CategoryTree {
    /// Get the named top-level category, creating it at the end if missing.
    pub fn category_mut(&mut self, name: &str) -> &mut CategoryNode {
        let idx = match self.categories.iter().position(|n| n.name == name) {
            Some(idx) => idx,
            None => {
                self.categories.push(CategoryNode::new(name));
                self.categories.len() - 1
            }
        };
        &mut self.categories[idx]
    }

    /// Look up a top-level category by name.
    pub fn get(&self, name: &str) -> Option<&CategoryNode> {
        self.categories.iter().find(|n| n.name == name)
    }

    /// Total bookmarks in the tree.
    pub fn total_bookmarks(&self) -> usize {
        self.categories.iter().map(CategoryNode::count).sum()
    }

    /// Depth-first iterator over every bookmark in the tree.
    pub fn iter_bookmarks(&self) -> impl Iterator<Item = &ClassifiedBookmark> {
        self.categories.iter().flat_map(|n| n.iter_bookmarks())
    }
}

// ---------------------------------------------------------------------------
// ProcessingStats
// ---------------------------------------------------------------------------

/// Counters collected over one processing run, embedded in reports.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingStats {
    pub files_processed: usize,
    pub total_bookmarks: usize,
    pub duplicates_removed: usize,
    pub processed_bookmarks: usize,
    pub errors: usize,
    pub processing_time_secs: f64,
    /// Bookmarks per final category.
    #[serde(default)]
    pub categories_found: BTreeMap<String, usize>,
    /// How many final results each strategy contributed to.
    #[serde(default)]
    pub method_counts: BTreeMap<String, usize>,
    pub average_confidence: f64,
}

impl ProcessingStats {
    /// Bookmarks classified per second.
    pub fn throughput(&self) -> f64 {
        self.processed_bookmarks as f64 / self.processing_time_secs.max(0.001)
    }
}

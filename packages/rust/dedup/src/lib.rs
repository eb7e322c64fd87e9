//! Bookmark deduplication.
//!
//! Two passes:
//! 1. exact: bookmarks whose URLs normalize to the same string collapse to
//!    the first occurrence
//! 2. near (large collections or on request): same-host bookmarks with very
//!    similar URLs or titles are grouped and the best-scored one is kept

mod dedupe;
mod normalize;
mod similarity;

pub use dedupe::{DedupOutcome, Deduplicator, Duplicate, quality_score};
pub use normalize::{bare_host, has_tracking_params, normalize_url};
pub use similarity::{
    comparable_title, jaccard, levenshtein, normalized_levenshtein, path_similarity,
    title_similarity, url_similarity,
};

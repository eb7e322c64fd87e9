//! Exact and near-duplicate removal.

use std::collections::{BTreeMap, HashMap};

use cleanbook_shared::Bookmark;
use tracing::{debug, info, instrument};
use url::Url;

use crate::normalize::{bare_host, has_tracking_params, normalize_url};
use crate::similarity::{path_similarity, title_similarity, url_similarity};

/// `ADD_DATE` after which a bookmark counts as recent (2020-01-01 UTC).
const RECENT_EPOCH_SECS: i64 = 1_577_836_800;

/// A bookmark removed as a duplicate of a kept one.
#[derive(Debug, Clone, PartialEq)]
pub struct Duplicate {
    pub bookmark: Bookmark,
    /// URL of the bookmark that was kept instead.
    pub kept_url: String,
    pub reason: String,
}

/// Result of a deduplication pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DedupOutcome {
    /// Kept bookmarks, in order of first occurrence.
    pub unique: Vec<Bookmark>,
    pub duplicates: Vec<Duplicate>,
}

impl DedupOutcome {
    pub fn removed(&self) -> usize {
        self.duplicates.len()
    }
}

/// Deduplication thresholds.
#[derive(Debug, Clone)]
pub struct Deduplicator {
    /// Combined `0.6 × title + 0.4 × url` score needed for a near duplicate.
    pub similarity_threshold: f64,
    /// Minimum title similarity before the combined score is considered.
    pub title_threshold: f64,
    /// URL similarity needed for a same-host URL duplicate.
    pub url_threshold: f64,
    /// The near-duplicate pass runs automatically above this many bookmarks.
    pub near_duplicate_min: usize,
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.85,
            title_threshold: 0.8,
            url_threshold: 0.9,
            near_duplicate_min: 1000,
        }
    }
}

impl Deduplicator {
    /// Exact pass, then the near-duplicate pass when the collection is large
    /// or `force_near` is set.
    #[instrument(skip_all, fields(count = bookmarks.len(), force_near))]
    pub fn dedupe(&self, bookmarks: Vec<Bookmark>, force_near: bool) -> DedupOutcome {
        let mut outcome = self.dedupe_exact(bookmarks);

        if force_near || outcome.unique.len() > self.near_duplicate_min {
            let near = self.dedupe_near(std::mem::take(&mut outcome.unique));
            outcome.unique = near.unique;
            outcome.duplicates.extend(near.duplicates);
        }

        info!(
            kept = outcome.unique.len(),
            removed = outcome.removed(),
            "deduplication complete"
        );
        outcome
    }

    /// Keep the first bookmark for each normalized URL.
    pub fn dedupe_exact(&self, bookmarks: Vec<Bookmark>) -> DedupOutcome {
        let mut seen: HashMap<String, String> = HashMap::with_capacity(bookmarks.len());
        let mut outcome = DedupOutcome::default();

        for bookmark in bookmarks {
            let key = normalize_url(&bookmark.url);
            match seen.get(&key) {
                Some(kept_url) => outcome.duplicates.push(Duplicate {
                    kept_url: kept_url.clone(),
                    reason: format!("same normalized URL: {key}"),
                    bookmark,
                }),
                None => {
                    seen.insert(key, bookmark.url.clone());
                    outcome.unique.push(bookmark);
                }
            }
        }

        debug!(removed = outcome.removed(), "exact pass");
        outcome
    }

    /// Group near duplicates and keep the best-scored bookmark of each group.
    ///
    /// Every duplicate criterion requires a shared host, so candidates are
    /// only compared within their host bucket.
    pub fn dedupe_near(&self, bookmarks: Vec<Bookmark>) -> DedupOutcome {
        let mut buckets: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (idx, b) in bookmarks.iter().enumerate() {
            buckets.entry(host_key(&b.url)).or_default().push(idx);
        }

        // slot[i] holds the bookmark shown at position i, if any
        let mut slot: Vec<Option<usize>> = (0..bookmarks.len()).map(Some).collect();
        let mut assigned = vec![false; bookmarks.len()];
        let mut removed: Vec<(usize, usize, String)> = Vec::new();

        for members in buckets.values() {
            for (pos, &leader) in members.iter().enumerate() {
                if assigned[leader] {
                    continue;
                }
                assigned[leader] = true;
                let mut group = vec![(leader, None)];

                for &j in &members[pos + 1..] {
                    if assigned[j] {
                        continue;
                    }
                    if let Some(reason) = self.duplicate_reason(&bookmarks[leader], &bookmarks[j]) {
                        assigned[j] = true;
                        group.push((j, Some(reason)));
                    }
                }
                if group.len() == 1 {
                    continue;
                }

                let mut best = leader;
                for &(idx, _) in &group {
                    if quality_score(&bookmarks[idx]) > quality_score(&bookmarks[best]) {
                        best = idx;
                    }
                }

                for (idx, reason) in group {
                    slot[idx] = None;
                    if idx != best {
                        let reason = reason.unwrap_or_else(|| {
                            format!("lower quality duplicate of {}", bookmarks[best].url)
                        });
                        removed.push((idx, best, reason));
                    }
                }
                slot[leader] = Some(best);
            }
        }

        removed.sort_by_key(|(idx, _, _)| *idx);
        let outcome = DedupOutcome {
            unique: slot
                .into_iter()
                .flatten()
                .map(|idx| bookmarks[idx].clone())
                .collect(),
            duplicates: removed
                .into_iter()
                .map(|(idx, best, reason)| Duplicate {
                    bookmark: bookmarks[idx].clone(),
                    kept_url: bookmarks[best].url.clone(),
                    reason,
                })
                .collect(),
        };

        debug!(removed = outcome.removed(), "near-duplicate pass");
        outcome
    }

    /// Why `b` duplicates `a`, if it does.
    pub fn duplicate_reason(&self, a: &Bookmark, b: &Bookmark) -> Option<String> {
        if normalize_url(&a.url) == normalize_url(&b.url) {
            return Some("same normalized URL".to_string());
        }
        if host_key(&a.url) != host_key(&b.url) {
            return None;
        }

        let url_sim = url_similarity(&a.url, &b.url);
        if url_sim >= self.url_threshold && path_similarity(&a.url, &b.url) >= 0.9 {
            return Some(format!("similar URL ({url_sim:.2})"));
        }

        let title_sim = title_similarity(&a.title, &b.title);
        if title_sim >= self.title_threshold {
            let combined = 0.6 * title_sim + 0.4 * url_sim;
            if combined >= self.similarity_threshold {
                return Some(format!(
                    "similar title ({title_sim:.2}) and URL ({url_sim:.2})"
                ));
            }
        }
        None
    }
}

fn host_key(url: &str) -> String {
    Url::parse(url.trim())
        .ok()
        .and_then(|u| u.host_str().map(bare_host))
        .unwrap_or_default()
}

/// Heuristic quality used to pick the representative of a duplicate group.
pub fn quality_score(bookmark: &Bookmark) -> f64 {
    let title = bookmark.title.trim();
    let mut score = (title.chars().count() as f64 / 100.0).min(0.3);

    let meaningful = title
        .split_whitespace()
        .filter(|w| w.chars().count() > 2)
        .count();
    score += (meaningful as f64 / 10.0).min(0.2);

    if bookmark.url.len() < 200 {
        score += 0.1;
    }
    if bookmark.url.trim().to_ascii_lowercase().starts_with("https://") {
        score += 0.1;
    }
    if !has_tracking_params(&bookmark.url) {
        score += 0.2;
    }
    if bookmark
        .added_at()
        .is_some_and(|d| d.timestamp() > RECENT_EPOCH_SECS)
    {
        score += 0.1;
    }
    score
}

//! Learned user preferences.
//!
//! The profile is a flat JSON file of counters: how often each category
//! was chosen, and which categories each domain and title keyword went to.
//! It is read-only while a run classifies bookmarks; feedback updates it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use cleanbook_shared::{CleanbookError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::features::BookmarkFeatures;
use crate::vote::{Strategy, Vote, rank_scores};

/// Minimum personalized score before the profile votes.
const MIN_CONFIDENCE: f64 = 0.2;

/// Interaction history is trimmed to this many entries.
pub const MAX_HISTORY: usize = 1000;

/// Title keywords recorded per feedback event.
const KEYWORDS_PER_UPDATE: usize = 5;

const PROFILE_VERSION: &str = "1.0";

static PROFILE_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-zA-Z\u{4e00}-\u{9fff}]{2,}").expect("profile word regex"));

/// One recorded feedback event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub timestamp: DateTime<Utc>,
    pub url: String,
    pub title: String,
    pub domain: String,
    pub category: String,
    pub confidence: f64,
}

/// Serialized profile document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub category_preferences: BTreeMap<String, f64>,
    #[serde(default)]
    pub domain_preferences: BTreeMap<String, BTreeMap<String, f64>>,
    #[serde(default)]
    pub keyword_preferences: BTreeMap<String, BTreeMap<String, f64>>,
    /// Multiplicative confidence tweak per category (`0.1` = +10%).
    #[serde(default)]
    pub confidence_adjustments: BTreeMap<String, f64>,
    #[serde(default)]
    pub interaction_history: Vec<Interaction>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default = "default_version")]
    pub profile_version: String,
}

fn default_version() -> String {
    PROFILE_VERSION.into()
}

impl Default for UserProfile {
    fn default() -> Self {
        Self {
            category_preferences: BTreeMap::new(),
            domain_preferences: BTreeMap::new(),
            keyword_preferences: BTreeMap::new(),
            confidence_adjustments: BTreeMap::new(),
            interaction_history: Vec::new(),
            last_updated: None,
            profile_version: default_version(),
        }
    }
}

/// Words of at least three characters, lower-cased, in title order.
fn profile_words(title: &str) -> Vec<String> {
    let lower = title.to_lowercase();
    PROFILE_WORD_RE
        .find_iter(&lower)
        .map(|m| m.as_str())
        .filter(|w| w.chars().count() > 2)
        .map(str::to_string)
        .collect()
}

/// Add `share × weight` of each category in `counts` to `scores`.
fn add_shares(counts: &BTreeMap<String, f64>, weight: f64, scores: &mut BTreeMap<String, f64>) {
    let total: f64 = counts.values().sum();
    if total <= 0.0 {
        return;
    }
    for (category, count) in counts {
        *scores.entry(category.clone()).or_default() += count / total * weight;
    }
}

/// Profile-backed classifier and feedback sink.
#[derive(Debug, Default)]
pub struct UserProfiler {
    path: Option<PathBuf>,
    profile: UserProfile,
    order: Vec<String>,
}

impl UserProfiler {
    /// In-memory profiler; [`UserProfiler::save`] is a no-op.
    pub fn in_memory(profile: UserProfile) -> Self {
        Self {
            path: None,
            profile,
            order: Vec::new(),
        }
    }

    /// Load a profile from disk. A missing or unreadable file starts empty.
    pub fn load(path: &Path) -> Self {
        let profile = match std::fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "ignoring malformed user profile");
                UserProfile::default()
            }),
            Err(_) => {
                debug!(path = %path.display(), "no user profile yet");
                UserProfile::default()
            }
        };
        Self {
            path: Some(path.to_path_buf()),
            profile,
            order: Vec::new(),
        }
    }

    /// Category order used to break score ties.
    pub fn with_order(mut self, order: Vec<String>) -> Self {
        self.order = order;
        self
    }

    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }

    /// Personalized score per category.
    pub fn scores(&self, features: &BookmarkFeatures) -> BTreeMap<String, f64> {
        let mut scores = BTreeMap::new();
        add_shares(&self.profile.category_preferences, 1.0, &mut scores);

        if let Some(domain) = self.profile.domain_preferences.get(&features.domain) {
            add_shares(domain, 0.3, &mut scores);
        }
        for word in profile_words(&features.title) {
            if let Some(keyword) = self.profile.keyword_preferences.get(&word) {
                add_shares(keyword, 0.2, &mut scores);
            }
        }
        scores
    }

    pub fn classify(&self, features: &BookmarkFeatures) -> Option<Vote> {
        let scores = self.scores(features);
        let (category, score) = rank_scores(&scores, &self.order).into_iter().next()?;

        let factor = 1.0
            + self
                .profile
                .confidence_adjustments
                .get(&category)
                .copied()
                .unwrap_or(0.0);
        let confidence = (score * factor).clamp(0.0, 1.0);
        if confidence < MIN_CONFIDENCE {
            return None;
        }

        Some(
            Vote::new(Strategy::UserProfile, category.clone(), confidence)
                .with_reason(format!("user profile: {category} ({confidence:.2})")),
        )
    }

    /// Record that `features` belongs to `category`.
    pub fn learn(&mut self, features: &BookmarkFeatures, category: &str, confidence: f64) {
        let p = &mut self.profile;
        *p.category_preferences.entry(category.to_string()).or_default() += confidence;
        *p.domain_preferences
            .entry(features.domain.clone())
            .or_default()
            .entry(category.to_string())
            .or_default() += confidence;

        for word in profile_words(&features.title)
            .into_iter()
            .take(KEYWORDS_PER_UPDATE)
        {
            *p.keyword_preferences
                .entry(word)
                .or_default()
                .entry(category.to_string())
                .or_default() += confidence * 0.5;
        }

        let now = Utc::now();
        p.interaction_history.push(Interaction {
            timestamp: now,
            url: features.url.clone(),
            title: features.title.clone(),
            domain: features.domain.clone(),
            category: category.to_string(),
            confidence,
        });
        if p.interaction_history.len() > MAX_HISTORY {
            let excess = p.interaction_history.len() - MAX_HISTORY;
            p.interaction_history.drain(..excess);
        }
        p.last_updated = Some(now);
    }

    /// Write the profile back to its file, creating parent directories.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| CleanbookError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(&self.profile)
            .map_err(|e| CleanbookError::config(format!("serialize user profile: {e}")))?;
        std::fs::write(path, json).map_err(|e| CleanbookError::io(path, e))?;
        debug!(path = %path.display(), "saved user profile");
        Ok(())
    }
}

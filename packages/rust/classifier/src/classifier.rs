//! Classification facade: strategies, result cache and running statistics.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use cleanbook_shared::{Bookmark, ClassifiedBookmark, RulesConfig};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::bayes::NaiveBayes;
use crate::ensemble::combine;
use crate::features::BookmarkFeatures;
use crate::profile::UserProfiler;
use crate::rules::RuleEngine;
use crate::semantic::SemanticAnalyzer;
use crate::vote::Vote;

/// Cache key for a bookmark: SHA-256 of `url::title`.
pub fn cache_key(url: &str, title: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hasher.update(b"::");
    hasher.update(title.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Counters accumulated over the classifier's lifetime.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClassifierStats {
    pub total_classified: usize,
    pub cache_hits: usize,
    /// How often each strategy tag (or `fallback`) appeared in a result.
    pub method_counts: BTreeMap<String, usize>,
    pub average_confidence: f64,
    /// Voted results under `ai_settings.confidence_threshold`.
    pub low_confidence: usize,
}

impl ClassifierStats {
    fn record(&mut self, result: &ClassifiedBookmark, threshold: f64) {
        self.total_classified += 1;
        if result.method != "fallback" && result.confidence < threshold {
            self.low_confidence += 1;
        }
        for tag in result.method.split('+') {
            *self.method_counts.entry(tag.to_string()).or_default() += 1;
        }
        let n = self.total_classified as f64;
        self.average_confidence += (result.confidence - self.average_confidence) / n;
    }

    pub fn cache_hit_rate(&self) -> f64 {
        self.cache_hits as f64 / self.total_classified.max(1) as f64
    }
}

/// FIFO-evicting result cache.
#[derive(Debug)]
struct ResultCache {
    capacity: usize,
    entries: HashMap<String, ClassifiedBookmark>,
    insertion: VecDeque<String>,
}

impl ResultCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            insertion: VecDeque::new(),
        }
    }

    fn get(&self, key: &str) -> Option<&ClassifiedBookmark> {
        self.entries.get(key)
    }

    fn insert(&mut self, key: String, value: ClassifiedBookmark) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.contains_key(&key) {
            self.entries.insert(key, value);
            return;
        }
        while self.entries.len() >= self.capacity {
            let Some(oldest) = self.insertion.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
        }
        self.insertion.push_back(key.clone());
        self.entries.insert(key, value);
    }
}

/// Runs every enabled strategy over a bookmark and merges their votes.
///
/// Safe to share across tasks: strategies are read-only and the cache and
/// counters sit behind mutexes.
#[derive(Debug)]
pub struct Classifier {
    rules: RulesConfig,
    rule_engine: RuleEngine,
    semantic: Option<SemanticAnalyzer>,
    profiler: Option<UserProfiler>,
    model: Option<NaiveBayes>,
    cache: Mutex<ResultCache>,
    stats: Mutex<ClassifierStats>,
}

impl Classifier {
    /// Rule engine plus semantic analysis (when enabled in `ai_settings`).
    pub fn new(rules: RulesConfig) -> Self {
        let order = rules.category_order.clone();
        Self {
            rule_engine: RuleEngine::new(&rules),
            semantic: rules
                .ai_settings
                .use_semantic_analysis
                .then(|| SemanticAnalyzer::new(order)),
            profiler: None,
            model: None,
            cache: Mutex::new(ResultCache::new(rules.ai_settings.cache_size)),
            stats: Mutex::new(ClassifierStats::default()),
            rules,
        }
    }

    /// Attach a user profile; ignored when `use_user_profiling` is off.
    pub fn with_profile(mut self, profiler: UserProfiler) -> Self {
        if self.rules.ai_settings.use_user_profiling {
            self.profiler = Some(profiler.with_order(self.rules.category_order.clone()));
        }
        self
    }

    /// Attach a trained model; untrained models are ignored.
    pub fn with_model(mut self, model: NaiveBayes) -> Self {
        if model.is_trained() {
            self.model = Some(model.with_order(self.rules.category_order.clone()));
        }
        self
    }

    pub fn rules(&self) -> &RulesConfig {
        &self.rules
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    /// Previously computed result for this bookmark, if cached.
    pub fn cached(&self, bookmark: &Bookmark) -> Option<ClassifiedBookmark> {
        let key = cache_key(&bookmark.url, &bookmark.title);
        let hit = lock(&self.cache).get(&key).cloned()?;
        let mut stats = lock(&self.stats);
        stats.cache_hits += 1;
        stats.record(&hit, self.rules.ai_settings.confidence_threshold);
        Some(ClassifiedBookmark {
            bookmark: bookmark.clone(),
            ..hit
        })
    }

    /// Votes from the built-in strategies, in a fixed order.
    pub fn votes(&self, features: &BookmarkFeatures) -> Vec<Vote> {
        [
            self.rule_engine.classify(features),
            self.model.as_ref().and_then(|m| m.classify(features)),
            self.semantic.as_ref().and_then(|s| s.classify(features)),
            self.profiler.as_ref().and_then(|p| p.classify(features)),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Classify using the built-in strategies only.
    pub fn classify(&self, bookmark: &Bookmark) -> ClassifiedBookmark {
        if let Some(hit) = self.cached(bookmark) {
            return hit;
        }
        self.classify_with_votes(bookmark, Vec::new())
    }

    /// Classify with additional votes from outside strategies (the LLM).
    /// Always computes a fresh result and refreshes the cache.
    pub fn classify_with_votes(&self, bookmark: &Bookmark, extra: Vec<Vote>) -> ClassifiedBookmark {
        let features = BookmarkFeatures::extract(&bookmark.url, &bookmark.title);
        let mut votes = self.votes(&features);
        votes.extend(extra);

        let result = combine(bookmark.clone(), &votes, &self.rules);
        debug!(
            url = %bookmark.url,
            category = %result.category,
            confidence = result.confidence,
            method = %result.method,
            "classified"
        );

        lock(&self.stats).record(&result, self.rules.ai_settings.confidence_threshold);
        lock(&self.cache).insert(cache_key(&bookmark.url, &bookmark.title), result.clone());
        result
    }

    pub fn stats(&self) -> ClassifierStats {
        lock(&self.stats).clone()
    }
}

/// Lock a mutex, recovering the data if a panicking thread poisoned it.
fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

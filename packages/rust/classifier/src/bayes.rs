//! Multinomial naive Bayes over bookmark tokens.
//!
//! Tokens are title words, the domain, path segments and the content type,
//! each namespaced so a path segment never collides with a title word.
//! The model is persisted as plain JSON counts.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use cleanbook_shared::{CleanbookError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::features::BookmarkFeatures;
use crate::vote::{Strategy, Vote, rank_scores};

/// Training needs at least this many confident samples.
pub const MIN_TRAINING_SAMPLES: usize = 50;

/// Posterior a prediction must exceed before the model votes.
const MIN_CONFIDENCE: f64 = 0.3;

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z0-9\u{4e00}-\u{9fff}]+").expect("token regex"));

/// Token stream fed to the model.
pub fn tokens(features: &BookmarkFeatures) -> Vec<String> {
    let title = features.title.to_lowercase();
    let mut out: Vec<String> = TOKEN_RE
        .find_iter(&title)
        .map(|m| m.as_str())
        .filter(|w| w.chars().count() >= 2)
        .map(|w| format!("w:{w}"))
        .collect();

    if !features.domain.is_empty() {
        out.push(format!("domain:{}", features.domain));
    }
    out.extend(
        features
            .path_segments
            .iter()
            .take(3)
            .map(|s| format!("path:{}", s.to_lowercase())),
    );
    out.push(format!("type:{}", features.content_type));
    out
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NaiveBayes {
    /// Training documents per category.
    doc_counts: BTreeMap<String, u64>,
    /// category -> token -> occurrences
    token_counts: BTreeMap<String, BTreeMap<String, u64>>,
    /// category -> total token occurrences
    token_totals: BTreeMap<String, u64>,
    vocabulary: BTreeSet<String>,
    #[serde(default)]
    trained_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    order: Vec<String>,
}

impl NaiveBayes {
    /// Category order used to break probability ties.
    pub fn with_order(mut self, order: Vec<String>) -> Self {
        self.order = order;
        self
    }

    pub fn is_trained(&self) -> bool {
        !self.doc_counts.is_empty()
    }

    pub fn categories(&self) -> impl Iterator<Item = &String> {
        self.doc_counts.keys()
    }

    /// Add one labelled sample (online learning).
    pub fn add_sample(&mut self, features: &BookmarkFeatures, category: &str) {
        *self.doc_counts.entry(category.to_string()).or_default() += 1;
        let counts = self.token_counts.entry(category.to_string()).or_default();
        let total = self.token_totals.entry(category.to_string()).or_default();
        for token in tokens(features) {
            *counts.entry(token.clone()).or_default() += 1;
            *total += 1;
            self.vocabulary.insert(token);
        }
    }

    /// Retrain from scratch. Fails when there are too few samples.
    pub fn train(&mut self, samples: &[(BookmarkFeatures, String)]) -> Result<usize> {
        if samples.len() < MIN_TRAINING_SAMPLES {
            return Err(CleanbookError::validation(format!(
                "need at least {MIN_TRAINING_SAMPLES} training samples, got {}",
                samples.len()
            )));
        }

        let order = std::mem::take(&mut self.order);
        *self = Self {
            order,
            ..Self::default()
        };
        for (features, category) in samples {
            self.add_sample(features, category);
        }
        self.trained_at = Some(Utc::now());

        info!(
            samples = samples.len(),
            categories = self.doc_counts.len(),
            vocabulary = self.vocabulary.len(),
            "trained naive Bayes model"
        );
        Ok(samples.len())
    }

    /// Posterior probability per category (sums to 1 when trained).
    pub fn posteriors(&self, features: &BookmarkFeatures) -> BTreeMap<String, f64> {
        let total_docs: u64 = self.doc_counts.values().sum();
        if total_docs == 0 {
            return BTreeMap::new();
        }
        let vocab = self.vocabulary.len().max(1) as f64;
        let toks = tokens(features);

        let log_scores: BTreeMap<String, f64> = self
            .doc_counts
            .iter()
            .map(|(category, docs)| {
                let counts = self.token_counts.get(category);
                let total = self.token_totals.get(category).copied().unwrap_or(0) as f64;
                let mut score = (*docs as f64 / total_docs as f64).ln();
                for token in &toks {
                    let count = counts.and_then(|c| c.get(token)).copied().unwrap_or(0) as f64;
                    score += ((count + 1.0) / (total + vocab)).ln();
                }
                (category.clone(), score)
            })
            .collect();

        let max = log_scores
            .values()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        let exp: BTreeMap<String, f64> = log_scores
            .into_iter()
            .map(|(c, s)| (c, (s - max).exp()))
            .collect();
        let sum: f64 = exp.values().sum();
        exp.into_iter().map(|(c, v)| (c, v / sum)).collect()
    }

    pub fn classify(&self, features: &BookmarkFeatures) -> Option<Vote> {
        let posteriors = self.posteriors(features);
        let ranked = rank_scores(&posteriors, &self.order);
        let (category, confidence) = ranked.first().cloned()?;
        if confidence <= MIN_CONFIDENCE {
            return None;
        }

        let mut vote = Vote::new(Strategy::MachineLearning, category.clone(), confidence)
            .with_reason(format!("naive Bayes: {category} ({confidence:.2})"));
        vote.alternatives = ranked.into_iter().skip(1).take(3).collect();
        Some(vote)
    }

    /// Load a saved model. `Ok(None)` when the file does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            debug!(path = %path.display(), "no saved model");
            return Ok(None);
        }
        let text = std::fs::read_to_string(path).map_err(|e| CleanbookError::io(path, e))?;
        let model = serde_json::from_str(&text).map_err(|e| {
            CleanbookError::parse(format!("invalid model file {}: {e}", path.display()))
        })?;
        Ok(Some(model))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| CleanbookError::io(parent, e))?;
        }
        let json = serde_json::to_string(self)
            .map_err(|e| CleanbookError::config(format!("serialize model: {e}")))?;
        std::fs::write(path, json).map_err(|e| CleanbookError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(url: &str, title: &str, category: &str) -> (BookmarkFeatures, String) {
        (BookmarkFeatures::extract(url, title), category.to_string())
    }

    fn training_set() -> Vec<(BookmarkFeatures, String)> {
        let mut samples = Vec::new();
        for i in 0..30 {
            samples.push(sample(
                &format!("https://github.com/user{i}/repo{i}"),
                &format!("rust crate repo {i}"),
                "Code",
            ));
            samples.push(sample(
                &format!("https://www.allrecipes.com/recipe/{i}"),
                &format!("chocolate cake recipe {i}"),
                "Cooking",
            ));
        }
        samples
    }

    #[test]
    fn tokens_are_namespaced() {
        let f = BookmarkFeatures::extract("https://docs.rs/serde/latest", "Serde docs");
        let toks = tokens(&f);
        assert!(toks.contains(&"w:serde".to_string()));
        assert!(toks.contains(&"domain:docs.rs".to_string()));
        assert!(toks.contains(&"path:serde".to_string()));
        assert!(toks.contains(&"type:documentation".to_string()));
    }

    #[test]
    fn refuses_small_training_sets() {
        let mut model = NaiveBayes::default();
        let err = model
            .train(&training_set()[..10])
            .expect_err("too few samples");
        assert!(err.to_string().contains("at least 50"));
        assert!(!model.is_trained());
    }

    #[test]
    fn trained_model_predicts_confidently() {
        let mut model = NaiveBayes::default();
        assert_eq!(model.train(&training_set()).expect("train"), 60);

        let f = BookmarkFeatures::extract("https://github.com/someone/tool", "rust command line");
        let vote = model.classify(&f).expect("vote");
        assert_eq!(vote.category, "Code");
        assert!(vote.confidence > 0.9 && vote.confidence <= 1.0);
        assert_eq!(vote.strategy, Strategy::MachineLearning);

        let sum: f64 = model.posteriors(&f).values().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn untrained_model_abstains() {
        let f = BookmarkFeatures::extract("https://a.com", "x");
        assert!(NaiveBayes::default().classify(&f).is_none());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let mut model = NaiveBayes::default();
        model.train(&training_set()).expect("train");

        let dir = std::env::temp_dir().join(format!("cleanbook-model-{}", uuid::Uuid::now_v7()));
        let path = dir.join("naive_bayes.json");
        model.save(&path).expect("save");
        let loaded = NaiveBayes::load(&path).expect("load").expect("present");
        assert_eq!(loaded, model);
        assert!(NaiveBayes::load(&dir.join("missing.json")).expect("ok").is_none());

        let _ = std::fs::remove_dir_all(&dir);
    }
}

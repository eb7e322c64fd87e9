//! Strategy votes and deterministic score ranking.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A classification strategy contributing votes to the ensemble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    RuleEngine,
    MachineLearning,
    Semantic,
    UserProfile,
    Llm,
}

impl Strategy {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::RuleEngine => "rule_engine",
            Self::MachineLearning => "machine_learning",
            Self::Semantic => "semantic",
            Self::UserProfile => "user_profile",
            Self::Llm => "llm",
        }
    }

    /// Ensemble weight applied to this strategy's confidence.
    pub fn weight(&self) -> f64 {
        match self {
            Self::RuleEngine => 0.35,
            Self::MachineLearning => 0.25,
            Self::Semantic => 0.15,
            Self::UserProfile => 0.10,
            Self::Llm => 0.50,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// One strategy's proposal for a bookmark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub strategy: Strategy,
    pub category: String,
    /// In `[0, 1]`.
    pub confidence: f64,
    pub reasoning: Vec<String>,
    #[serde(default)]
    pub alternatives: Vec<(String, f64)>,
}

impl Vote {
    pub fn new(strategy: Strategy, category: impl Into<String>, confidence: f64) -> Self {
        Self {
            strategy,
            category: category.into(),
            confidence: confidence.clamp(0.0, 1.0),
            reasoning: Vec::new(),
            alternatives: Vec::new(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reasoning.push(reason.into());
        self
    }
}

/// Sort category scores best first.
///
/// Ties are broken by position in `order` (listed categories first), then
/// by name, so equal inputs always give the same winner.
pub fn rank_scores(scores: &BTreeMap<String, f64>, order: &[String]) -> Vec<(String, f64)> {
    let rank = |name: &str| order.iter().position(|c| c == name).unwrap_or(usize::MAX);
    let mut ranked: Vec<(String, f64)> = scores.iter().map(|(k, v)| (k.clone(), *v)).collect();
    ranked.sort_by(|(a, sa), (b, sb)| {
        sb.total_cmp(sa)
            .then_with(|| rank(a).cmp(&rank(b)))
            .then_with(|| a.cmp(b))
    });
    ranked
}

/// Winner, its share of the total score, and up to three runner-ups with
/// their shares. `None` when nothing scored above zero.
pub fn pick_best(
    scores: &BTreeMap<String, f64>,
    order: &[String],
) -> Option<(String, f64, Vec<(String, f64)>)> {
    let total: f64 = scores.values().filter(|v| **v > 0.0).sum();
    if total <= 0.0 {
        return None;
    }
    let mut ranked = rank_scores(scores, order).into_iter();
    let (best, best_score) = ranked.next()?;
    let alternatives = ranked
        .filter(|(_, s)| *s > 0.0)
        .take(3)
        .map(|(c, s)| (c, s / total))
        .collect();
    Some((best, (best_score / total).clamp(0.0, 1.0), alternatives))
}

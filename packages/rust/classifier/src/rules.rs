//! Weighted keyword rule engine.
//!
//! Each configured rule names a target (domain, title, url, path or content
//! type) and a list of keywords. Keywords are literal, case-insensitive,
//! with `*` and `?` as wildcards. A rule contributes its weight to its
//! category at most once per bookmark.

use std::collections::BTreeMap;

use cleanbook_shared::{MatchTarget, RulesConfig};
use regex::{Regex, RegexBuilder};
use tracing::{debug, warn};

use crate::features::BookmarkFeatures;
use crate::vote::{Strategy, Vote, pick_best};

#[derive(Debug)]
struct CompiledRule {
    category: String,
    target: MatchTarget,
    patterns: Vec<Regex>,
    exclusions: Vec<Regex>,
    weight: f64,
}

/// A rule hit, kept for the reasoning trail.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleMatch {
    pub category: String,
    pub target: MatchTarget,
    pub matched: String,
    pub weight: f64,
}

/// Compiled form of `category_rules`.
#[derive(Debug)]
pub struct RuleEngine {
    rules: Vec<CompiledRule>,
    order: Vec<String>,
}

/// Compile a keyword into a case-insensitive pattern with wildcard support.
pub fn compile_keyword(keyword: &str) -> Result<Regex, regex::Error> {
    let pattern = regex::escape(keyword)
        .replace(r"\*", ".*")
        .replace(r"\?", ".");
    RegexBuilder::new(&pattern).case_insensitive(true).build()
}

impl RuleEngine {
    pub fn new(config: &RulesConfig) -> Self {
        let mut rules = Vec::new();

        for (category, cat_rules) in &config.category_rules {
            for rule in &cat_rules.rules {
                let patterns = rule
                    .keywords
                    .iter()
                    .filter_map(|k| match compile_keyword(k) {
                        Ok(re) => Some(re),
                        Err(e) => {
                            warn!(category, keyword = %k, error = %e, "skipping invalid keyword");
                            None
                        }
                    })
                    .collect();
                let exclusions = rule
                    .must_not_contain
                    .iter()
                    .filter_map(|k| {
                        RegexBuilder::new(&regex::escape(k))
                            .case_insensitive(true)
                            .build()
                            .ok()
                    })
                    .collect();

                rules.push(CompiledRule {
                    category: category.clone(),
                    target: rule.target,
                    patterns,
                    exclusions,
                    weight: rule.weight,
                });
            }
        }

        debug!(rules = rules.len(), "compiled classification rules");
        Self {
            rules,
            order: config.category_order.clone(),
        }
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// All rule hits for a bookmark, in rule order.
    pub fn matches(&self, features: &BookmarkFeatures) -> Vec<RuleMatch> {
        let title = features.title.to_lowercase();
        let url = features.url.to_lowercase();
        let path = features.path_text();

        let mut hits = Vec::new();
        for rule in &self.rules {
            let text = match rule.target {
                MatchTarget::Domain => features.domain.as_str(),
                MatchTarget::Title => title.as_str(),
                MatchTarget::Url => url.as_str(),
                MatchTarget::Path => path.as_str(),
                MatchTarget::ContentType => features.content_type.as_str(),
            };
            if text.is_empty() {
                continue;
            }

            let Some(found) = rule.patterns.iter().find_map(|re| re.find(text)) else {
                continue;
            };
            if rule.exclusions.iter().any(|re| re.is_match(text)) {
                continue;
            }
            hits.push(RuleMatch {
                category: rule.category.clone(),
                target: rule.target,
                matched: found.as_str().to_string(),
                weight: rule.weight,
            });
        }
        hits
    }

    /// Vote for the category with the highest summed rule weight.
    pub fn classify(&self, features: &BookmarkFeatures) -> Option<Vote> {
        let hits = self.matches(features);
        if hits.is_empty() {
            return None;
        }

        let mut scores: BTreeMap<String, f64> = BTreeMap::new();
        for hit in &hits {
            *scores.entry(hit.category.clone()).or_default() += hit.weight;
        }
        let (category, confidence, alternatives) = pick_best(&scores, &self.order)?;

        let reasoning = hits
            .iter()
            .filter(|h| h.category == category)
            .map(|h| {
                format!(
                    "rule: {} contains '{}' -> {}",
                    h.target.as_str(),
                    h.matched,
                    h.category
                )
            })
            .collect();

        Some(Vote {
            strategy: Strategy::RuleEngine,
            category,
            confidence,
            reasoning,
            alternatives,
        })
    }
}

/// Problems with a rules document, one human-readable line each.
pub fn validate_rules(config: &RulesConfig) -> Vec<String> {
    let mut problems = Vec::new();

    for (category, cat_rules) in &config.category_rules {
        if cat_rules.rules.is_empty() {
            problems.push(format!("category '{category}' has no rules"));
        }
        for (idx, rule) in cat_rules.rules.iter().enumerate() {
            if rule.keywords.is_empty() {
                problems.push(format!("category '{category}' rule #{idx} has no keywords"));
            }
            for keyword in &rule.keywords {
                if let Err(e) = compile_keyword(keyword) {
                    problems.push(format!(
                        "category '{category}' rule #{idx} has invalid keyword '{keyword}': {e}"
                    ));
                }
            }
            if rule.weight <= 0.0 {
                problems.push(format!(
                    "category '{category}' rule #{idx} has non-positive weight {}",
                    rule.weight
                ));
            }
        }
        if !config.category_order.is_empty() && config.order_rank(category).is_none() {
            problems.push(format!("category '{category}' is missing from category_order"));
        }
    }

    problems
}

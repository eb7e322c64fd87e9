//! Weighted combination of strategy votes.

use std::collections::{BTreeMap, BTreeSet};

use cleanbook_shared::{Bookmark, ClassifiedBookmark, RulesConfig};

use crate::vote::{Vote, pick_best};

/// Merge votes into a final classification.
///
/// Each vote adds `confidence × strategy weight` to its category. The best
/// category's share of the total becomes the confidence. With no votes the
/// bookmark falls back to the uncategorized bucket. A result under
/// `ai_settings.confidence_threshold` keeps its category and says so in
/// its reasoning.
pub fn combine(bookmark: Bookmark, votes: &[Vote], rules: &RulesConfig) -> ClassifiedBookmark {
    let mut scores: BTreeMap<String, f64> = BTreeMap::new();
    for vote in votes {
        *scores.entry(vote.category.clone()).or_default() +=
            vote.confidence * vote.strategy.weight();
    }

    let Some((category, confidence, alternatives)) = pick_best(&scores, &rules.category_order)
    else {
        return ClassifiedBookmark::fallback(bookmark, "no strategy produced a vote");
    };

    let methods: BTreeSet<&str> = votes.iter().map(|v| v.strategy.tag()).collect();
    let subcategory = subcategory_for(&category, &bookmark.title, rules);

    let mut reasoning: Vec<String> =
        votes.iter().flat_map(|v| v.reasoning.iter().cloned()).collect();
    let threshold = rules.ai_settings.confidence_threshold;
    if confidence < threshold {
        reasoning.push(format!("low confidence: {confidence:.2} < {threshold:.2}"));
    }

    ClassifiedBookmark {
        reasoning,
        method: methods.into_iter().collect::<Vec<_>>().join("+"),
        bookmark,
        category,
        subcategory,
        confidence,
        alternatives,
    }
}

/// First known subcategory of `category` whose name appears in the title.
///
/// `category_hierarchy` may be keyed by the full category or by its main
/// part (`AI` for `AI/机器学习`).
pub fn subcategory_for(category: &str, title: &str, rules: &RulesConfig) -> Option<String> {
    let main = category.split('/').next().unwrap_or(category);
    let subs = rules
        .category_hierarchy
        .get(category)
        .or_else(|| rules.category_hierarchy.get(main))?;

    let title = title.to_lowercase();
    subs.iter()
        .find(|sub| !sub.is_empty() && title.contains(&sub.to_lowercase()))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vote::Strategy;
    use cleanbook_shared::FALLBACK_CATEGORY;

    fn bookmark(title: &str) -> Bookmark {
        Bookmark::new("https://example.com", title)
    }

    #[test]
    fn no_votes_falls_back() {
        let result = combine(bookmark("x"), &[], &RulesConfig::default());
        assert_eq!(result.category, FALLBACK_CATEGORY);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.method, "fallback");
    }

    #[test]
    fn weights_decide_between_strategies() {
        // llm 0.5 × 0.6 = 0.30 beats rules 0.35 × 0.8 = 0.28
        let votes = vec![
            Vote::new(Strategy::RuleEngine, "技术/编程", 0.8).with_reason("rule"),
            Vote::new(Strategy::Llm, "AI/机器学习", 0.6).with_reason("llm"),
        ];
        let result = combine(bookmark("x"), &votes, &RulesConfig::default());

        assert_eq!(result.category, "AI/机器学习");
        assert!((result.confidence - 0.30 / 0.58).abs() < 1e-9);
        assert_eq!(result.method, "llm+rule_engine");
        assert_eq!(result.reasoning, vec!["rule", "llm", "low confidence: 0.52 < 0.70"]);
        assert_eq!(result.alternatives[0].0, "技术/编程");
    }

    #[test]
    fn agreeing_votes_give_full_confidence() {
        let votes = vec![
            Vote::new(Strategy::RuleEngine, "技术/编程", 0.9),
            Vote::new(Strategy::Semantic, "技术/编程", 0.4),
        ];
        let result = combine(bookmark("x"), &votes, &RulesConfig::default());
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.method, "rule_engine+semantic");
        assert!(result.alternatives.is_empty());
    }

    #[test]
    fn threshold_comes_from_ai_settings() {
        let votes = vec![
            Vote::new(Strategy::RuleEngine, "技术/编程", 0.8),
            Vote::new(Strategy::Semantic, "AI/机器学习", 0.9),
        ];
        let mut rules = RulesConfig::default();
        let flagged = combine(bookmark("x"), &votes, &rules);
        assert_eq!(flagged.category, "技术/编程");
        assert!(flagged.reasoning.iter().any(|r| r.starts_with("low confidence")));

        rules.ai_settings.confidence_threshold = 0.5;
        let accepted = combine(bookmark("x"), &votes, &rules);
        assert_eq!(accepted.category, "技术/编程");
        assert!(accepted.reasoning.iter().all(|r| !r.starts_with("low confidence")));
    }

    #[test]
    fn subcategory_from_hierarchy_main_part() {
        let rules = RulesConfig::default();
        assert_eq!(
            subcategory_for("AI/机器学习", "深度学习 入门", &rules).as_deref(),
            Some("深度学习")
        );
        assert_eq!(
            subcategory_for("技术", "Intro to devops pipelines", &rules).as_deref(),
            Some("DevOps")
        );
        assert!(subcategory_for("未知", "深度学习", &rules).is_none());
    }
}

//! Keyword-library semantic scoring.
//!
//! A small built-in vocabulary per category is compared against the
//! domain, title and path words of a bookmark. Well-known domains get a
//! strong prior of their own.

use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

use crate::features::BookmarkFeatures;
use crate::vote::{Strategy, Vote, rank_scores};

/// Minimum combined score before the analyzer votes.
const MIN_CONFIDENCE: f64 = 0.3;

static LATIN_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-zA-Z]+").expect("latin word regex"));
static TITLE_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-zA-Z\u{4e00}-\u{9fff}]+").expect("title word regex"));

const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "AI/机器学习",
        &[
            "artificial", "intelligence", "machine", "learning", "neural", "network", "deep",
            "tensorflow", "pytorch", "algorithm", "model", "training", "人工智能", "机器学习",
            "深度学习", "神经网络", "模型", "算法",
        ],
    ),
    (
        "技术/编程",
        &[
            "programming", "coding", "development", "software", "code", "developer", "python",
            "javascript", "java", "github", "api", "framework", "编程", "开发", "代码", "软件",
            "技术", "程序",
        ],
    ),
    (
        "学习/教育",
        &[
            "tutorial", "course", "education", "learning", "study", "guide", "documentation",
            "reference", "manual", "book", "article", "教程", "课程", "学习", "教育", "文档",
            "指南", "手册",
        ],
    ),
    (
        "资讯",
        &[
            "news", "article", "blog", "post", "update", "information", "media", "press",
            "report", "story", "breaking", "新闻", "资讯", "博客", "文章", "报道", "媒体",
        ],
    ),
    (
        "工具/软件",
        &[
            "tool", "software", "application", "utility", "program", "service", "platform",
            "system", "interface", "dashboard", "app", "工具", "软件", "应用", "平台", "系统",
            "服务",
        ],
    ),
];

const DOMAIN_PATTERNS: &[(&str, &str)] = &[
    (r"github\.com", "技术/编程"),
    (r"stackoverflow\.com", "技术/编程"),
    (r"medium\.com", "学习/教育"),
    (r"youtube\.com", "娱乐/视频"),
    (r"news\.|bbc\.|cnn\.|reuters\.", "新闻/资讯"),
    (r"wikipedia\.org", "学习/教育"),
    (r"docs\.|documentation", "学习/教育"),
];

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "this", "that", "these", "those", "is", "are", "was", "were", "be", "been", "being", "have",
    "has", "had", "do", "does", "did", "will", "would", "could", "should", "may", "might", "的",
    "了", "在", "是", "我", "有", "和", "就", "不", "人", "都", "一", "也", "上", "他", "她", "它",
    "们", "来", "去", "说", "要",
];

/// Built-in semantic scorer.
#[derive(Debug)]
pub struct SemanticAnalyzer {
    keywords: Vec<(String, HashSet<String>)>,
    domain_patterns: Vec<(Regex, String)>,
    stopwords: HashSet<&'static str>,
    order: Vec<String>,
}

impl Default for SemanticAnalyzer {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl SemanticAnalyzer {
    /// `order` breaks ties between equally scored categories.
    pub fn new(order: Vec<String>) -> Self {
        let keywords = CATEGORY_KEYWORDS
            .iter()
            .map(|(cat, words)| {
                (
                    cat.to_string(),
                    words.iter().map(|w| w.to_lowercase()).collect(),
                )
            })
            .collect();
        let domain_patterns = DOMAIN_PATTERNS
            .iter()
            .filter_map(|(pattern, cat)| Regex::new(pattern).ok().map(|re| (re, cat.to_string())))
            .collect();

        Self {
            keywords,
            domain_patterns,
            stopwords: STOPWORDS.iter().copied().collect(),
            order,
        }
    }

    fn is_content_word(&self, word: &str) -> bool {
        word.chars().count() > 2 && !self.stopwords.contains(word)
    }

    /// Add `bonus` to every category whose vocabulary contains a content word.
    fn score_words<'a>(
        &self,
        words: impl Iterator<Item = &'a str>,
        bonus: f64,
        scores: &mut BTreeMap<String, f64>,
    ) {
        for word in words {
            if !self.is_content_word(word) {
                continue;
            }
            for (category, vocab) in &self.keywords {
                if vocab.contains(word) {
                    *scores.entry(category.clone()).or_default() += bonus;
                }
            }
        }
    }

    fn domain_scores(&self, domain: &str) -> BTreeMap<String, f64> {
        let mut scores = BTreeMap::new();
        for (re, category) in &self.domain_patterns {
            if re.is_match(domain) {
                *scores.entry(category.clone()).or_default() += 0.8;
            }
        }
        let lower = domain.to_lowercase();
        self.score_words(LATIN_WORD_RE.find_iter(&lower).map(|m| m.as_str()), 0.3, &mut scores);
        scores
    }

    fn title_scores(&self, title: &str) -> BTreeMap<String, f64> {
        let lower = title.to_lowercase();
        let words: Vec<&str> = TITLE_WORD_RE
            .find_iter(&lower)
            .map(|m| m.as_str())
            .filter(|w| self.is_content_word(w))
            .collect();
        if words.is_empty() {
            return BTreeMap::new();
        }
        let word_set: HashSet<&str> = words.iter().copied().collect();

        let mut scores = BTreeMap::new();
        for (category, vocab) in &self.keywords {
            let intersection = word_set.iter().filter(|w| vocab.contains(**w)).count();
            if intersection == 0 {
                continue;
            }
            let union = word_set.len() + vocab.len() - intersection;
            let jaccard = intersection as f64 / union as f64;
            let importance = intersection as f64 / words.len() as f64;
            scores.insert(category.clone(), (jaccard * 2.0 + importance * 0.5).min(1.0));
        }
        scores
    }

    fn path_scores(&self, features: &BookmarkFeatures) -> BTreeMap<String, f64> {
        let mut scores = BTreeMap::new();
        let path = features.path_text();
        self.score_words(LATIN_WORD_RE.find_iter(&path).map(|m| m.as_str()), 0.2, &mut scores);
        scores
    }

    /// Combined `0.4 × domain + 0.5 × title + 0.1 × path` score per category.
    pub fn scores(&self, features: &BookmarkFeatures) -> BTreeMap<String, f64> {
        let parts = [
            (self.domain_scores(&features.domain), 0.4),
            (self.title_scores(&features.title), 0.5),
            (self.path_scores(features), 0.1),
        ];
        let mut combined: BTreeMap<String, f64> = BTreeMap::new();
        for (scores, weight) in parts {
            for (category, score) in scores {
                *combined.entry(category).or_default() += score * weight;
            }
        }
        combined
    }

    /// Vote when the best combined score reaches the threshold. Alternatives
    /// are expressed relative to the winner.
    pub fn classify(&self, features: &BookmarkFeatures) -> Option<Vote> {
        let scores = self.scores(features);
        let ranked = rank_scores(&scores, &self.order);
        let (best, best_score) = ranked.first().cloned()?;
        if best_score < MIN_CONFIDENCE {
            return None;
        }

        let confidence = best_score.min(1.0);
        let alternatives = ranked
            .iter()
            .skip(1)
            .take(3)
            .map(|(c, s)| (c.clone(), s / best_score))
            .collect();

        Some(Vote {
            strategy: Strategy::Semantic,
            reasoning: vec![format!("semantic: {best} ({confidence:.2})")],
            category: best,
            confidence,
            alternatives,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_domain_gets_prior() {
        let analyzer = SemanticAnalyzer::default();
        let f = BookmarkFeatures::extract("https://github.com/tokio-rs/tokio", "tokio-rs/tokio");
        let vote = analyzer.classify(&f).expect("vote");
        assert_eq!(vote.category, "技术/编程");
        // pattern 0.8 + "github" word 0.3, weighted 0.4
        assert!((vote.confidence - 0.44).abs() < 1e-9);
        assert_eq!(vote.strategy, Strategy::Semantic);
    }

    #[test]
    fn title_keywords_drive_the_score() {
        let analyzer = SemanticAnalyzer::default();
        let f = BookmarkFeatures::extract(
            "https://example.com/post/1",
            "Deep learning with neural network models",
        );
        let vote = analyzer.classify(&f).expect("vote");
        assert_eq!(vote.category, "AI/机器学习");
        assert!(vote.confidence >= MIN_CONFIDENCE && vote.confidence <= 1.0);
    }

    #[test]
    fn weak_signal_does_not_vote() {
        let analyzer = SemanticAnalyzer::default();
        let f = BookmarkFeatures::extract("https://example.com/", "Grandma's pie recipe");
        assert!(analyzer.classify(&f).is_none());
    }

    #[test]
    fn short_words_and_stopwords_are_ignored() {
        let analyzer = SemanticAnalyzer::default();
        assert!(!analyzer.is_content_word("ai"));
        assert!(!analyzer.is_content_word("the"));
        assert!(analyzer.is_content_word("深度学习"));
    }
}

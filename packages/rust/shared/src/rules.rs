//! Classification rules document (`config.json`).
//!
//! The rules file drives the rule engine, title cleaning, category ordering
//! and the optional LLM layers. A missing file falls back to a small
//! built-in rule set.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CleanbookError, Result};
use crate::types::FALLBACK_CATEGORY;

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// Which bookmark feature a rule's keywords are matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTarget {
    Domain,
    Title,
    Url,
    Path,
    ContentType,
}

impl MatchTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Domain => "domain",
            Self::Title => "title",
            Self::Url => "url",
            Self::Path => "path",
            Self::ContentType => "content_type",
        }
    }
}

/// One weighted keyword rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(rename = "match")]
    pub target: MatchTarget,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Patterns that veto the rule when found in the same target.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub must_not_contain: Vec<String>,
}

fn default_weight() -> f64 {
    1.0
}

/// Rules attached to a single category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryRules {
    #[serde(default)]
    pub rules: Vec<Rule>,
}

/// `title_cleaning_rules` block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TitleCleaningRules {
    #[serde(default)]
    pub prefixes: Vec<String>,
    #[serde(default)]
    pub suffixes: Vec<String>,
    #[serde(default)]
    pub replacements: BTreeMap<String, String>,
}

/// `ai_settings` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiSettings {
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    #[serde(default = "default_true")]
    pub use_semantic_analysis: bool,
    #[serde(default = "default_true")]
    pub use_user_profiling: bool,
    /// Upper bound on cached classification results.
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            use_semantic_analysis: true,
            use_user_profiling: true,
            cache_size: default_cache_size(),
        }
    }
}

fn default_confidence_threshold() -> f64 {
    0.7
}
fn default_cache_size() -> usize {
    10_000
}
fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// LLM settings
// ---------------------------------------------------------------------------

/// `llm` block: OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default)]
    pub enable: bool,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub temperature: f64,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    #[serde(default = "default_llm_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Ask the endpoint for `response_format: json_object`.
    #[serde(default = "default_true")]
    pub force_json: bool,
    #[serde(default)]
    pub organizer: OrganizerSettings,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            enable: false,
            base_url: default_base_url(),
            model: default_llm_model(),
            api_key_env: default_api_key_env(),
            temperature: 0.0,
            top_p: default_top_p(),
            timeout_seconds: default_llm_timeout(),
            max_retries: default_max_retries(),
            force_json: true,
            organizer: OrganizerSettings::default(),
        }
    }
}

impl LlmSettings {
    /// The API key from the configured env var, if set and non-empty.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|v| !v.trim().is_empty())
    }
}

fn default_base_url() -> String {
    "https://api.openai.com".into()
}
fn default_llm_model() -> String {
    "gpt-4o-mini".into()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_top_p() -> f64 {
    1.0
}
fn default_llm_timeout() -> u64 {
    25
}
fn default_max_retries() -> u32 {
    1
}

/// `llm.organizer` block. Unset fields inherit from the parent `llm` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizerSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default = "default_organizer_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_organizer_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_five")]
    pub max_examples_per_category: usize,
    #[serde(default = "default_five")]
    pub max_domains_per_category: usize,
}

impl Default for OrganizerSettings {
    fn default() -> Self {
        Self {
            enable: None,
            model: None,
            timeout_seconds: default_organizer_timeout(),
            max_tokens: default_organizer_max_tokens(),
            max_examples_per_category: 5,
            max_domains_per_category: 5,
        }
    }
}

fn default_organizer_timeout() -> u64 {
    40
}
fn default_organizer_max_tokens() -> u32 {
    1800
}
fn default_five() -> usize {
    5
}

// ---------------------------------------------------------------------------
// RulesConfig
// ---------------------------------------------------------------------------

/// The whole rules document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulesConfig {
    #[serde(default)]
    pub category_rules: BTreeMap<String, CategoryRules>,
    /// Display order of top-level categories; also breaks score ties.
    #[serde(default)]
    pub category_order: Vec<String>,
    /// Main category → known subcategory names.
    #[serde(default)]
    pub category_hierarchy: BTreeMap<String, Vec<String>>,
    /// Raw category name → canonical name, applied when organizing.
    #[serde(default, alias = "category_mapping")]
    pub category_aliases: BTreeMap<String, String>,
    #[serde(default)]
    pub title_cleaning_rules: TitleCleaningRules,
    #[serde(default)]
    pub ai_settings: AiSettings,
    #[serde(default = "default_true")]
    pub show_confidence_indicator: bool,
    #[serde(default)]
    pub llm: LlmSettings,
}

impl Default for RulesConfig {
    fn default() -> Self {
        let rule = |target, keywords: &[&str], weight| Rule {
            target,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            weight,
            must_not_contain: Vec::new(),
        };

        let mut category_rules = BTreeMap::new();
        category_rules.insert(
            "AI/机器学习".to_string(),
            CategoryRules {
                rules: vec![
                    rule(MatchTarget::Domain, &["openai.com", "huggingface.co"], 20.0),
                    rule(
                        MatchTarget::Title,
                        &["machine learning", "深度学习", "neural", "AI"],
                        15.0,
                    ),
                ],
            },
        );
        category_rules.insert(
            "技术/编程".to_string(),
            CategoryRules {
                rules: vec![
                    rule(MatchTarget::Domain, &["github.com", "stackoverflow.com"], 20.0),
                    rule(MatchTarget::Title, &["programming", "code", "编程", "代码"], 10.0),
                ],
            },
        );

        let hierarchy = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let mut category_hierarchy = BTreeMap::new();
        category_hierarchy.insert(
            "AI".to_string(),
            hierarchy(&["机器学习", "深度学习", "自然语言处理", "计算机视觉"]),
        );
        category_hierarchy.insert(
            "技术".to_string(),
            hierarchy(&["编程", "前端", "后端", "DevOps", "数据库"]),
        );
        category_hierarchy.insert("学习".to_string(), hierarchy(&["教程", "文档", "课程", "书籍"]));
        category_hierarchy.insert(
            "工具".to_string(),
            hierarchy(&["在线工具", "开发工具", "设计工具"]),
        );

        Self {
            category_rules,
            category_order: vec![
                "AI/机器学习".into(),
                "技术/编程".into(),
                FALLBACK_CATEGORY.into(),
            ],
            category_hierarchy,
            category_aliases: BTreeMap::new(),
            title_cleaning_rules: TitleCleaningRules {
                prefixes: vec!["登录 |".into(), "Sign in ·".into()],
                suffixes: vec!["- V2EX".into(), "· GitHub".into()],
                replacements: BTreeMap::from([
                    ("&amp;".to_string(), "&".to_string()),
                    ("&lt;".to_string(), "<".to_string()),
                    ("&gt;".to_string(), ">".to_string()),
                ]),
            },
            ai_settings: AiSettings::default(),
            show_confidence_indicator: true,
            llm: LlmSettings::default(),
        }
    }
}

impl RulesConfig {
    /// Parse a rules document from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| CleanbookError::config(format!("invalid rules JSON: {e}")))
    }

    /// Load the rules document; a missing file yields the built-in defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!(?path, "rules file not found, using built-in rules");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|e| CleanbookError::io(path, e))?;
        serde_json::from_str(&text).map_err(|e| {
            CleanbookError::config(format!("invalid rules JSON in {}: {e}", path.display()))
        })
    }

    /// Position of `category` in `category_order`, if listed.
    pub fn order_rank(&self, category: &str) -> Option<usize> {
        self.category_order.iter().position(|c| c == category)
    }

    /// Every category name the classifiers may emit: ordered categories,
    /// then rule categories, then the fallback, without duplicates.
    pub fn known_categories(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let candidates = self
            .category_order
            .iter()
            .chain(self.category_rules.keys())
            .map(String::as_str)
            .chain(std::iter::once(FALLBACK_CATEGORY));
        for name in candidates {
            let name = name.trim();
            if !name.is_empty() && !out.iter().any(|c| c == name) {
                out.push(name.to_string());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_have_rules_and_order() {
        let rules = RulesConfig::default();
        assert!(rules.category_rules.contains_key("技术/编程"));
        assert_eq!(rules.order_rank("AI/机器学习"), Some(0));
        assert!(rules.show_confidence_indicator);
        assert_eq!(rules.llm.model, "gpt-4o-mini");
        assert_eq!(rules.llm.organizer.max_tokens, 1800);
    }

    #[test]
    fn parses_minimal_document() {
        let json = r#"{
            "category_rules": {
                "Video": { "rules": [ { "match": "content_type", "keywords": ["video"] } ] }
            },
            "category_order": ["Video"]
        }"#;
        let rules = RulesConfig::from_json(json).expect("parse");
        let video = &rules.category_rules["Video"].rules[0];
        assert_eq!(video.target, MatchTarget::ContentType);
        assert_eq!(video.weight, 1.0);
        assert!(rules.llm.organizer.enable.is_none());
        assert_eq!(rules.ai_settings.cache_size, 10_000);
    }

    #[test]
    fn rejects_unknown_match_target() {
        let json = r#"{"category_rules": {"X": {"rules": [{"match": "body", "keywords": ["a"]}]}}}"#;
        let err = RulesConfig::from_json(json).expect_err("unknown target");
        assert!(err.to_string().contains("invalid rules JSON"));
    }

    #[test]
    fn known_categories_dedupes_and_appends_fallback() {
        let mut rules = RulesConfig::default();
        rules.category_order = vec!["技术/编程".into(), "新闻/资讯".into()];
        let cats = rules.known_categories();
        assert_eq!(cats[0], "技术/编程");
        assert_eq!(cats[1], "新闻/资讯");
        assert!(cats.contains(&"AI/机器学习".to_string()));
        assert_eq!(cats.last().map(String::as_str), Some(FALLBACK_CATEGORY));
        assert_eq!(cats.iter().filter(|c| *c == "技术/编程").count(), 1);
    }

    #[test]
    fn missing_rules_file_uses_defaults() {
        let rules = RulesConfig::load(Path::new("/nonexistent/cleanbook/config.json"))
            .expect("missing file falls back");
        assert_eq!(rules, RulesConfig::default());
    }

    #[test]
    fn api_key_ignores_blank_values() {
        let llm = LlmSettings {
            api_key_env: "CLEANBOOK_TEST_NONEXISTENT_KEY_12345".into(),
            ..LlmSettings::default()
        };
        assert!(llm.api_key().is_none());
    }
}

//! Whole-collection reorganization by an LLM.
//!
//! The organizer never sees individual bookmarks beyond a few sample
//! titles: it receives per-category summaries and answers with a mapping
//! from old category names to new `primary/secondary` folders.

use std::collections::BTreeMap;
use std::time::Duration;

use cleanbook_classifier::BookmarkFeatures;
use cleanbook_shared::{
    CategoryNode, CategoryTree, ClassifiedBookmark, FALLBACK_CATEGORY, Result, RulesConfig,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use crate::client::{ChatClient, ChatMessage, LlmStats};

const MAX_SAMPLE_TITLE_CHARS: usize = 160;
const DEFAULT_FALLBACK_PRIMARY: &str = "其他";

const SYSTEM_PROMPT: &str = "You are a bookmark information architect. \
Regroup the given categories into a clear two-level folder structure. \
Answer with strict JSON containing category_mapping, primary_order, secondary_order, \
fallback_primary, fallback_secondary_label, category_insights and optionally notes. \
Only reorganize the categories provided; never invent bookmarks. \
Concise Chinese folder names are preferred.";

// ---------------------------------------------------------------------------
// Dataset summary
// ---------------------------------------------------------------------------

/// Confidence histogram: high ≥ 0.8, medium ≥ 0.5, low otherwise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConfidenceBins {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl ConfidenceBins {
    fn add(&mut self, confidence: f64) {
        if confidence >= 0.8 {
            self.high += 1;
        } else if confidence >= 0.5 {
            self.medium += 1;
        } else {
            self.low += 1;
        }
    }
}

/// What the model learns about one existing category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySummary {
    pub category: String,
    pub count: usize,
    pub avg_confidence: f64,
    pub confidence_bins: ConfidenceBins,
    pub top_domains: Vec<String>,
    pub sample_titles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetSummary {
    pub bookmark_count: usize,
    /// Largest categories first.
    pub categories: Vec<CategorySummary>,
    pub existing_category_order: Vec<String>,
}

fn category_of(item: &ClassifiedBookmark) -> &str {
    match item.category.trim() {
        "" => FALLBACK_CATEGORY,
        name => name,
    }
}

// ---------------------------------------------------------------------------
// Plan returned by the model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MappingTarget {
    #[serde(default, deserialize_with = "lenient")]
    pub primary: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub secondary: Option<String>,
}

/// The model's reorganization answer.
///
/// Every key is optional and tolerates `null` or a wrong type, so one odd
/// key never costs the rest of the plan.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct OrganizerPlan {
    #[serde(default, deserialize_with = "mapping")]
    pub category_mapping: BTreeMap<String, MappingTarget>,
    #[serde(default, deserialize_with = "lenient")]
    pub primary_order: Vec<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub secondary_order: BTreeMap<String, Vec<String>>,
    #[serde(default, deserialize_with = "lenient")]
    pub fallback_primary: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub fallback_secondary_label: Option<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub category_insights: Vec<Value>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub notes: Vec<Value>,
}

/// `T::default()` for `null` or a value of the wrong shape.
fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// A list, a single value, or nothing.
fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => Vec::new(),
        Value::Array(items) => items,
        other => vec![other],
    })
}

/// Mapping entries are objects, or a bare string naming the primary folder.
/// Entries of any other shape are dropped on their own.
fn mapping<'de, D>(
    deserializer: D,
) -> std::result::Result<BTreeMap<String, MappingTarget>, D::Error>
where
    D: Deserializer<'de>,
{
    let Value::Object(entries) = Value::deserialize(deserializer)? else {
        return Ok(BTreeMap::new());
    };
    Ok(entries
        .into_iter()
        .filter_map(|(category, target)| {
            let target = match target {
                Value::String(primary) => MappingTarget {
                    primary: Some(primary),
                    secondary: None,
                },
                Value::Object(_) => serde_json::from_value(target).ok()?,
                _ => return None,
            };
            Some((category, target))
        })
        .collect())
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Put `nodes` named in `order` first, the rest by size (largest first).
fn order_nodes(nodes: Vec<CategoryNode>, order: &[String]) -> Vec<CategoryNode> {
    let mut rest = nodes;
    let mut ordered = Vec::with_capacity(rest.len());
    for name in order {
        if let Some(idx) = rest.iter().position(|n| n.name == *name) {
            ordered.push(rest.remove(idx));
        }
    }
    rest.sort_by_key(|n| std::cmp::Reverse(n.count()));
    ordered.extend(rest);
    ordered
}

fn sort_by_confidence(items: &mut [ClassifiedBookmark]) {
    items.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
}

impl OrganizerPlan {
    /// Build the reorganized tree.
    ///
    /// Mapped categories go to their target folder (primary falls back to
    /// `fallback_primary`, then the main part of the old name). Unmapped
    /// categories go to the fallback folder, inside
    /// `fallback_secondary_label` when one is given.
    pub fn apply(&self, classified: &[ClassifiedBookmark]) -> CategoryTree {
        let fallback_primary = non_empty(self.fallback_primary.as_ref())
            .unwrap_or_else(|| DEFAULT_FALLBACK_PRIMARY.to_string());
        let fallback_secondary = non_empty(self.fallback_secondary_label.as_ref());

        let mut tree = CategoryTree::default();
        for item in classified {
            let original = category_of(item);
            let (primary, secondary) = match self.category_mapping.get(original) {
                Some(target) => (
                    non_empty(target.primary.as_ref()).unwrap_or_else(|| fallback_primary.clone()),
                    non_empty(target.secondary.as_ref()),
                ),
                None => (fallback_primary.clone(), fallback_secondary.clone()),
            };

            let node = tree.category_mut(&primary);
            match secondary {
                Some(sub) => node.subcategory_mut(&sub).items.push(item.clone()),
                None => node.items.push(item.clone()),
            }
        }

        let empty = Vec::new();
        tree.categories = order_nodes(std::mem::take(&mut tree.categories), &self.primary_order);
        for node in &mut tree.categories {
            sort_by_confidence(&mut node.items);
            let order = self.secondary_order.get(&node.name).unwrap_or(&empty);
            node.subcategories = order_nodes(std::mem::take(&mut node.subcategories), order);
            for sub in &mut node.subcategories {
                sort_by_confidence(&mut sub.items);
            }
        }
        tree
    }
}

// ---------------------------------------------------------------------------
// LlmOrganizer
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct LlmOrganizer {
    client: ChatClient,
    max_examples: usize,
    max_domains: usize,
    category_order: Vec<String>,
}

impl LlmOrganizer {
    /// `Ok(None)` unless `llm.enable` is set, the organizer is not turned
    /// off, and the API key is available.
    pub fn from_rules(rules: &RulesConfig) -> Result<Option<Self>> {
        let llm = &rules.llm;
        if !llm.enable || llm.organizer.enable == Some(false) {
            return Ok(None);
        }
        let Some(api_key) = llm.api_key() else {
            debug!(env = %llm.api_key_env, "LLM organizer skipped: API key not set");
            return Ok(None);
        };
        Ok(Some(Self::new(ChatClient::new(llm, api_key)?, rules)))
    }

    /// Wrap a client, applying the organizer's model, timeout and token cap.
    pub fn new(client: ChatClient, rules: &RulesConfig) -> Self {
        let settings = &rules.llm.organizer;
        let model = settings
            .model
            .clone()
            .unwrap_or_else(|| client.model().to_string());
        Self {
            client: client
                .with_model(model)
                .with_timeout(Duration::from_secs(settings.timeout_seconds))
                .with_max_tokens(settings.max_tokens),
            max_examples: settings.max_examples_per_category,
            max_domains: settings.max_domains_per_category,
            category_order: rules.category_order.clone(),
        }
    }

    pub fn stats(&self) -> LlmStats {
        self.client.stats()
    }

    pub fn summarize(&self, classified: &[ClassifiedBookmark]) -> DatasetSummary {
        struct Bucket<'a> {
            name: &'a str,
            confidences: Vec<f64>,
            titles: Vec<String>,
            domains: Vec<(String, usize)>,
        }

        let mut buckets: Vec<Bucket<'_>> = Vec::new();
        for item in classified {
            let name = category_of(item);
            let idx = match buckets.iter().position(|b| b.name == name) {
                Some(idx) => idx,
                None => {
                    buckets.push(Bucket {
                        name,
                        confidences: Vec::new(),
                        titles: Vec::new(),
                        domains: Vec::new(),
                    });
                    buckets.len() - 1
                }
            };
            let bucket = &mut buckets[idx];
            bucket.confidences.push(item.confidence);

            let title = &item.bookmark.title;
            if !title.is_empty() && bucket.titles.len() < self.max_examples {
                bucket
                    .titles
                    .push(title.chars().take(MAX_SAMPLE_TITLE_CHARS).collect());
            }

            let domain = BookmarkFeatures::extract(&item.bookmark.url, "").domain;
            if !domain.is_empty() {
                match bucket.domains.iter_mut().find(|(d, _)| *d == domain) {
                    Some((_, count)) => *count += 1,
                    None => bucket.domains.push((domain, 1)),
                }
            }
        }

        let mut categories: Vec<CategorySummary> = buckets
            .into_iter()
            .map(|mut b| {
                let mut bins = ConfidenceBins::default();
                b.confidences.iter().for_each(|c| bins.add(*c));
                let avg = b.confidences.iter().sum::<f64>() / b.confidences.len().max(1) as f64;
                b.domains.sort_by_key(|(_, count)| std::cmp::Reverse(*count));
                CategorySummary {
                    category: b.name.to_string(),
                    count: b.confidences.len(),
                    avg_confidence: (avg * 1000.0).round() / 1000.0,
                    confidence_bins: bins,
                    top_domains: b
                        .domains
                        .into_iter()
                        .take(self.max_domains)
                        .map(|(d, _)| d)
                        .collect(),
                    sample_titles: b.titles,
                }
            })
            .collect();
        categories.sort_by_key(|c| std::cmp::Reverse(c.count));

        DatasetSummary {
            bookmark_count: classified.len(),
            categories,
            existing_category_order: self.category_order.clone(),
        }
    }

    fn messages(&self, summary: &DatasetSummary) -> Vec<ChatMessage> {
        let request = json!({
            "task": "Reorganize bookmark categories with multi-level grouping.",
            "constraints": [
                "Aim for roughly 6 to 12 primary categories.",
                "Each primary category must group semantically coherent bookmarks.",
                "Add secondary categories only where they clarify intent or media type.",
                "Keep meaningful emoji in existing names.",
                "Merge low-confidence or mixed categories into the fallback bucket.",
            ],
            "expected_output": {
                "category_mapping": "original category -> {primary, secondary (optional)}",
                "primary_order": "primary category names in display order",
                "secondary_order": "primary -> secondary names in display order",
                "fallback_primary": "folder for anything left unmapped",
                "fallback_secondary_label": "optional sub-folder inside the fallback",
                "category_insights": "array of {primary, summary, recommendations}",
                "notes": "optional global suggestions",
            },
            "dataset": summary,
        });
        vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(request.to_string()),
        ]
    }

    /// Ask the model for a new structure. `None` on any failure, in which
    /// case the caller keeps its own tree.
    #[instrument(skip_all, fields(bookmarks = classified.len()))]
    pub async fn organize(&self, classified: &[ClassifiedBookmark]) -> Option<CategoryTree> {
        if classified.is_empty() {
            return None;
        }
        let summary = self.summarize(classified);
        let reply = self.client.complete_json(&self.messages(&summary)).await.ok()?;

        let plan: OrganizerPlan = match serde_json::from_value(Value::Object(reply)) {
            Ok(plan) => plan,
            Err(e) => {
                warn!(error = %e, "LLM organizer reply has an unexpected shape");
                return None;
            }
        };

        let tree = plan.apply(classified);
        info!(
            categories = tree.categories.len(),
            mapped = plan.category_mapping.len(),
            "LLM organizer produced a new structure"
        );
        Some(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cleanbook_shared::{Bookmark, LlmSettings};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn item(url: &str, category: &str, confidence: f64) -> ClassifiedBookmark {
        ClassifiedBookmark {
            bookmark: Bookmark::new(url, format!("title of {url}")),
            category: category.into(),
            subcategory: None,
            confidence,
            reasoning: vec![],
            alternatives: vec![],
            method: "rule_engine".into(),
        }
    }

    fn sample() -> Vec<ClassifiedBookmark> {
        vec![
            item("https://github.com/a", "技术/编程", 0.6),
            item("https://www.github.com/b", "技术/编程", 0.9),
            item("https://arxiv.org/abs/1", "AI/机器学习", 0.4),
            item("https://cooking.example/x", "美食", 0.3),
        ]
    }

    fn organizer(base_url: &str) -> LlmOrganizer {
        let rules = RulesConfig {
            llm: LlmSettings {
                enable: true,
                base_url: base_url.into(),
                max_retries: 0,
                ..LlmSettings::default()
            },
            ..RulesConfig::default()
        };
        let client = ChatClient::new(&rules.llm, "k").expect("client");
        LlmOrganizer::new(client, &rules)
    }

    #[test]
    fn summary_groups_by_category() {
        let summary = organizer("http://localhost").summarize(&sample());
        assert_eq!(summary.bookmark_count, 4);
        let first = &summary.categories[0];
        assert_eq!(first.category, "技术/编程");
        assert_eq!(first.count, 2);
        assert_eq!(first.top_domains, vec!["github.com"]);
        assert_eq!(first.avg_confidence, 0.75);
        assert_eq!(
            first.confidence_bins,
            ConfidenceBins {
                high: 1,
                medium: 1,
                low: 0
            }
        );
    }

    #[test]
    fn plan_maps_orders_and_falls_back() {
        let plan = OrganizerPlan {
            category_mapping: BTreeMap::from([
                (
                    "技术/编程".to_string(),
                    MappingTarget {
                        primary: Some("开发".into()),
                        secondary: Some("代码托管".into()),
                    },
                ),
                (
                    "AI/机器学习".to_string(),
                    MappingTarget {
                        primary: Some("AI".into()),
                        secondary: None,
                    },
                ),
            ]),
            primary_order: vec!["AI".into(), "开发".into()],
            fallback_secondary_label: Some("待整理".into()),
            ..OrganizerPlan::default()
        };

        let tree = plan.apply(&sample());
        let names: Vec<&str> = tree.categories.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["AI", "开发", "其他"]);

        let dev = tree.get("开发").expect("dev");
        let hosted = &dev.subcategories[0];
        assert_eq!(hosted.name, "代码托管");
        assert_eq!(hosted.items[0].confidence, 0.9);

        let other = tree.get("其他").expect("fallback");
        assert_eq!(other.subcategories[0].name, "待整理");
        assert_eq!(tree.total_bookmarks(), 4);
    }

    #[tokio::test]
    async fn organize_uses_model_reply() {
        let server = MockServer::start().await;
        let content = json!({
            "category_mapping": { "技术/编程": { "primary": "开发" } },
            "primary_order": ["开发"],
            "fallback_primary": "杂项"
        })
        .to_string();
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "content": content } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tree = organizer(&server.uri())
            .organize(&sample())
            .await
            .expect("tree");
        assert_eq!(tree.categories[0].name, "开发");
        assert_eq!(tree.get("杂项").map(CategoryNode::count), Some(2));
    }

    #[tokio::test]
    async fn organize_returns_none_on_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        assert!(organizer(&server.uri()).organize(&sample()).await.is_none());
    }

    #[test]
    fn plan_tolerates_null_and_odd_optional_keys() {
        let plan: OrganizerPlan = serde_json::from_value(json!({
            "category_mapping": { "技术/编程": { "primary": "开发", "secondary": null } },
            "primary_order": null,
            "secondary_order": "by size",
            "fallback_primary": 42,
            "category_insights": null,
            "notes": "reorganized by topic"
        }))
        .expect("plan");

        assert_eq!(plan.category_mapping["技术/编程"].primary.as_deref(), Some("开发"));
        assert!(plan.primary_order.is_empty());
        assert!(plan.secondary_order.is_empty());
        assert_eq!(plan.fallback_primary, None);
        assert!(plan.category_insights.is_empty());
        assert_eq!(plan.notes, vec![json!("reorganized by topic")]);
    }

    #[test]
    fn plan_keeps_good_mapping_entries() {
        let plan: OrganizerPlan = serde_json::from_value(json!({
            "category_mapping": {
                "技术/编程": "开发",
                "AI/机器学习": { "primary": "AI" },
                "美食": 7
            },
            "notes": ["a", "b"]
        }))
        .expect("plan");

        assert_eq!(plan.category_mapping.len(), 2);
        assert_eq!(plan.category_mapping["技术/编程"].primary.as_deref(), Some("开发"));
        assert_eq!(plan.category_mapping["AI/机器学习"].primary.as_deref(), Some("AI"));
        assert!(plan.primary_order.is_empty());
        assert_eq!(plan.notes.len(), 2);
    }

    #[tokio::test]
    async fn organize_accepts_null_notes() {
        let server = MockServer::start().await;
        let content = json!({
            "category_mapping": { "技术/编程": { "primary": "开发" } },
            "primary_order": ["开发"],
            "secondary_order": null,
            "fallback_primary": "杂项",
            "notes": null
        })
        .to_string();
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "content": content } }]
            })))
            .mount(&server)
            .await;

        let tree = organizer(&server.uri())
            .organize(&sample())
            .await
            .expect("tree");
        assert_eq!(tree.categories[0].name, "开发");
        assert_eq!(tree.get("开发").map(CategoryNode::count), Some(2));
        assert_eq!(tree.total_bookmarks(), 4);
    }

    #[test]
    fn organizer_can_be_switched_off() {
        let mut rules = RulesConfig::default();
        rules.llm.enable = true;
        rules.llm.organizer.enable = Some(false);
        assert!(LlmOrganizer::from_rules(&rules).expect("ok").is_none());
    }
}

//! Per-bookmark LLM classification, merged into the ensemble as a vote.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use cleanbook_classifier::{BookmarkFeatures, ContentType, Strategy, Vote, cache_key};
use cleanbook_shared::{Bookmark, FALLBACK_CATEGORY, Result, RulesConfig};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::client::{ChatClient, ChatMessage, LlmStats};

const MAX_PATH_SEGMENTS: usize = 8;
const MAX_KEYWORDS: usize = 12;
const MAX_QUERY_VALUES: usize = 5;
const MAX_PRIMARY_HINTS: usize = 12;

const SYSTEM_PROMPT: &str = "You file browser bookmarks into an existing folder taxonomy.\n\
Read the bookmark's title, URL, domain and hints, decide what the page is about, \
and pick the single best category from the provided category library.\n\
Rules:\n\
- Reply with one JSON object and nothing else.\n\
- Use only categories from the library; answer \"未分类\" when none fits.\n\
- Keep confidence in [0, 1] and consistent with your reasons; lower it when unsure.\n\
Primary categories: ";

/// Drop leading emoji or punctuation from a category label.
pub fn strip_category_prefix(label: &str) -> &str {
    let trimmed = label.trim();
    let stripped = trimmed
        .trim_start_matches(|c: char| !c.is_alphanumeric())
        .trim();
    if stripped.is_empty() { trimmed } else { stripped }
}

/// Normalize both halves of a `main/sub` label.
pub fn normalize_category(label: &str) -> String {
    match label.split_once('/') {
        Some((main, sub)) => {
            let main = strip_category_prefix(main);
            let sub = strip_category_prefix(sub);
            if sub.is_empty() {
                main.to_string()
            } else {
                format!("{main}/{sub}")
            }
        }
        None => strip_category_prefix(label).to_string(),
    }
}

/// Map a model-chosen label onto a known category.
///
/// Tries an exact match, then case-insensitive, then the main part of a
/// `main/sub` label; anything else is uncategorized.
pub fn map_to_known(label: &str, known: &[String]) -> String {
    let label = normalize_category(label);
    if label.is_empty() {
        return FALLBACK_CATEGORY.to_string();
    }
    if known.iter().any(|k| *k == label) {
        return label;
    }
    let lower = label.to_lowercase();
    if let Some(k) = known.iter().find(|k| k.trim().to_lowercase() == lower) {
        return k.clone();
    }
    if let Some((main, _)) = label.split_once('/') {
        let main = main.trim().to_lowercase();
        if let Some(k) = known.iter().find(|k| k.trim().to_lowercase() == main) {
            return k.clone();
        }
    }
    FALLBACK_CATEGORY.to_string()
}

/// Distinct lower-cased words of two or more letters, in title order.
fn keywords(title: &str) -> Vec<String> {
    let lower = title.to_lowercase();
    let mut out: Vec<String> = Vec::new();
    let words = lower.split(|c: char| {
        !(c.is_ascii_alphabetic() || ('\u{4e00}'..='\u{9fff}').contains(&c))
    });
    for word in words.filter(|w| w.chars().count() >= 2) {
        if !out.iter().any(|w| w == word) {
            out.push(word.to_string());
        }
    }
    out
}

/// Bookmark description sent to the model.
fn bookmark_payload(features: &BookmarkFeatures) -> Value {
    let mut query: Map<String, Value> = Map::new();
    for (key, value) in &features.query_params {
        let entry = query.entry(key.clone()).or_insert_with(|| json!([]));
        if let Some(values) = entry.as_array_mut().filter(|v| v.len() < MAX_QUERY_VALUES) {
            values.push(json!(value));
        }
    }
    json!({
        "url": features.url,
        "title": features.title,
        "domain": features.domain,
        "path_segments": features.path_segments.iter().take(MAX_PATH_SEGMENTS).collect::<Vec<_>>(),
        "query_params": query,
        "keywords": keywords(&features.title).into_iter().take(MAX_KEYWORDS).collect::<Vec<_>>(),
    })
}

/// Cheap signals that help the model decide.
fn hints(features: &BookmarkFeatures) -> Value {
    let title = features.title.to_lowercase();
    let title_has = |needles: &[&str]| needles.iter().any(|n| title.contains(n));
    let likely_forum = ["forum", "bbs", "community"]
        .iter()
        .any(|n| features.domain.contains(n));
    json!({
        "contains_code": title_has(&["github", "repo", "代码", "编程"]),
        "contains_doc": title_has(&["doc", "文档", "documentation"]),
        "likely_video": features.content_type == ContentType::Video,
        "likely_news": title_has(&["news", "资讯", "快讯"]),
        "likely_forum": likely_forum,
        "language": features.language.as_str(),
        "secure_scheme": features.is_secure(),
    })
}

fn category_library(categories: &[String]) -> Vec<Value> {
    categories
        .iter()
        .map(|name| match name.split_once('/') {
            Some((main, sub)) => json!({
                "name": name,
                "parent": main,
                "description": format!("{sub} under {main}"),
            }),
            None => json!({
                "name": name,
                "parent": null,
                "description": format!("primary category {name}"),
            }),
        })
        .collect()
}

/// Reasons from a reply: `reasons` array, or a single `reason(s)` string.
fn reasons(reply: &Map<String, Value>) -> Vec<String> {
    let raw = reply.get("reasons").or_else(|| reply.get("reason"));
    match raw {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

/// LLM-backed strategy producing [`Strategy::Llm`] votes.
#[derive(Debug)]
pub struct LlmClassifier {
    client: ChatClient,
    categories: Vec<String>,
    cache: Mutex<HashMap<String, Vote>>,
    cache_hits: AtomicUsize,
}

impl LlmClassifier {
    /// Build from the rules' `llm` block. `Ok(None)` when LLM use is
    /// disabled or the API key env var is unset.
    pub fn from_rules(rules: &RulesConfig) -> Result<Option<Self>> {
        if !rules.llm.enable {
            return Ok(None);
        }
        let Some(api_key) = rules.llm.api_key() else {
            debug!(env = %rules.llm.api_key_env, "LLM classifier skipped: API key not set");
            return Ok(None);
        };
        let client = ChatClient::new(&rules.llm, api_key)?;
        Ok(Some(Self::new(client, rules)))
    }

    pub fn new(client: ChatClient, rules: &RulesConfig) -> Self {
        let mut categories: Vec<String> = Vec::new();
        for name in rules.known_categories() {
            let name = normalize_category(&name);
            if !name.is_empty() && !categories.contains(&name) {
                categories.push(name);
            }
        }
        Self {
            client,
            categories,
            cache: Mutex::new(HashMap::new()),
            cache_hits: AtomicUsize::new(0),
        }
    }

    /// Categories the model may choose from.
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn stats(&self) -> LlmStats {
        LlmStats {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            ..self.client.stats()
        }
    }

    /// Messages for one bookmark.
    pub fn messages(&self, features: &BookmarkFeatures) -> Vec<ChatMessage> {
        let primaries: Vec<&str> = self
            .categories
            .iter()
            .filter(|c| !c.contains('/'))
            .take(MAX_PRIMARY_HINTS)
            .map(String::as_str)
            .collect();
        let task = json!({
            "task": "Classify this bookmark into the category library.",
            "bookmark": bookmark_payload(features),
            "hints": hints(features),
            "category_library": category_library(&self.categories),
            "expected_output_keys": {
                "category": "category name from the library, or 未分类",
                "confidence": "number between 0 and 1",
                "reasons": ["one to three short reasons"],
                "subcategory": "optional finer label",
            },
        });
        vec![
            ChatMessage::system(format!("{SYSTEM_PROMPT}{}", primaries.join(", "))),
            ChatMessage::user(task.to_string()),
        ]
    }

    /// Ask the model about one bookmark. Failures yield `None`.
    pub async fn classify(&self, bookmark: &Bookmark) -> Option<Vote> {
        let key = cache_key(&bookmark.url, &bookmark.title);
        if let Some(hit) = self.lock_cache().get(&key).cloned() {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Some(hit);
        }

        let features = BookmarkFeatures::extract(&bookmark.url, &bookmark.title);
        let reply = self.client.complete_json(&self.messages(&features)).await.ok()?;

        let label = reply
            .get("category")
            .and_then(Value::as_str)
            .unwrap_or(FALLBACK_CATEGORY);
        let category = map_to_known(label, &self.categories);
        let confidence = reply
            .get("confidence")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);

        let mut vote = Vote::new(Strategy::Llm, category, confidence);
        vote.reasoning = reasons(&reply)
            .into_iter()
            .map(|r| format!("LLM: {r}"))
            .collect();
        debug!(url = %bookmark.url, category = %vote.category, confidence = vote.confidence, "LLM vote");

        self.lock_cache().insert(key, vote.clone());
        Some(vote)
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vote>> {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cleanbook_shared::LlmSettings;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn known() -> Vec<String> {
        vec!["AI/机器学习".into(), "技术/编程".into(), "资讯".into(), "未分类".into()]
    }

    async fn classifier_for(server: &MockServer) -> LlmClassifier {
        let settings = LlmSettings {
            enable: true,
            base_url: server.uri(),
            max_retries: 0,
            ..LlmSettings::default()
        };
        let client = ChatClient::new(&settings, "k").expect("client");
        LlmClassifier::new(client, &RulesConfig::default())
    }

    #[test]
    fn strips_emoji_prefixes() {
        assert_eq!(strip_category_prefix("🤖 AI"), "AI");
        assert_eq!(normalize_category("💻 技术/ 📝 编程"), "技术/编程");
        assert_eq!(normalize_category("🔥"), "🔥");
    }

    #[test]
    fn maps_labels_onto_known_categories() {
        let known = known();
        assert_eq!(map_to_known("技术/编程", &known), "技术/编程");
        assert_eq!(map_to_known("  🤖 ai/机器学习 ", &known), "AI/机器学习");
        assert_eq!(map_to_known("资讯/科技", &known), "资讯");
        assert_eq!(map_to_known("Cooking", &known), FALLBACK_CATEGORY);
        assert_eq!(map_to_known("", &known), FALLBACK_CATEGORY);
    }

    #[test]
    fn payload_and_hints_describe_the_bookmark() {
        let f = BookmarkFeatures::extract(
            "https://www.youtube.com/watch?v=abc&v=def",
            "Rust news: 编程 tips tips",
        );
        let payload = bookmark_payload(&f);
        assert_eq!(payload["domain"], "youtube.com");
        assert_eq!(payload["query_params"]["v"], json!(["abc", "def"]));
        assert_eq!(payload["keywords"], json!(["rust", "news", "编程", "tips"]));

        let h = hints(&f);
        assert_eq!(h["likely_video"], true);
        assert_eq!(h["likely_news"], true);
        assert_eq!(h["contains_code"], true);
        assert_eq!(h["language"], "zh");
        assert_eq!(h["likely_forum"], false);

        let forum = BookmarkFeatures::extract("https://bbs.example.cn/t/1", "讨论");
        assert_eq!(hints(&forum)["likely_forum"], true);
    }

    #[tokio::test]
    async fn classify_maps_and_caches() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "content":
                    "{\"category\": \"🤖 AI/机器学习\", \"confidence\": 1.4, \"reasons\": [\"paper on transformers\"]}"
                } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let llm = classifier_for(&server).await;
        let b = Bookmark::new("https://arxiv.org/abs/1706.03762", "Attention Is All You Need");

        let vote = llm.classify(&b).await.expect("vote");
        assert_eq!(vote.category, "AI/机器学习");
        assert_eq!(vote.confidence, 1.0);
        assert_eq!(vote.strategy, Strategy::Llm);
        assert_eq!(vote.reasoning, vec!["LLM: paper on transformers"]);

        let again = llm.classify(&b).await.expect("cached vote");
        assert_eq!(again, vote);
        assert_eq!(llm.stats().cache_hits, 1);
        assert_eq!(llm.stats().calls, 1);
    }

    #[tokio::test]
    async fn failure_yields_no_vote() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let llm = classifier_for(&server).await;
        let b = Bookmark::new("https://example.com", "Example");
        assert!(llm.classify(&b).await.is_none());
        assert_eq!(llm.stats().failures, 1);
    }

    #[test]
    fn disabled_without_flag() {
        let rules = RulesConfig::default();
        assert!(LlmClassifier::from_rules(&rules).expect("ok").is_none());
    }
}

//! Minimal OpenAI-compatible chat-completions client.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use cleanbook_shared::{CleanbookError, LlmSettings, Result};
use reqwest::Client;
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("CleanBook/", env!("CARGO_PKG_VERSION"));

/// Longest slice of a bad reply kept in error messages.
const SNIPPET_LEN: usize = 200;

const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// One chat message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
}

/// Call counters for one client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LlmStats {
    /// HTTP attempts, retries included.
    pub calls: usize,
    pub cache_hits: usize,
    /// Requests that gave up after every retry.
    pub failures: usize,
}

/// Chat-completions client for one endpoint and model.
#[derive(Debug)]
pub struct ChatClient {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f64,
    top_p: f64,
    max_tokens: Option<u32>,
    timeout: Duration,
    max_retries: u32,
    /// Pause before retry `n` is `n × retry_backoff`.
    retry_backoff: Duration,
    force_json: bool,
    calls: AtomicUsize,
    failures: AtomicUsize,
}

impl ChatClient {
    pub fn new(settings: &LlmSettings, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| CleanbookError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/v1/chat/completions",
                settings.base_url.trim_end_matches('/')
            ),
            api_key: api_key.into(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            top_p: settings.top_p,
            max_tokens: None,
            timeout: Duration::from_secs(settings.timeout_seconds),
            max_retries: settings.max_retries,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            force_json: settings.force_json,
            calls: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn stats(&self) -> LlmStats {
        LlmStats {
            calls: self.calls.load(Ordering::Relaxed),
            cache_hits: 0,
            failures: self.failures.load(Ordering::Relaxed),
        }
    }

    /// Request body for `messages`.
    pub fn request_body(&self, messages: &[ChatMessage]) -> Value {
        let mut body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "top_p": self.top_p,
            "messages": messages,
        });
        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if self.force_json {
            body["response_format"] = json!({ "type": "json_object" });
        }
        body
    }

    /// Send `messages` and parse the reply as a JSON object.
    ///
    /// HTTP errors, transport errors and replies that are not a non-empty
    /// JSON object are retried up to `max_retries` times, with a linearly
    /// growing pause between attempts.
    pub async fn complete_json(&self, messages: &[ChatMessage]) -> Result<Map<String, Value>> {
        let body = self.request_body(messages);
        let mut last_error = String::from("no attempt made");

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(self.retry_backoff * attempt).await;
            }
            self.calls.fetch_add(1, Ordering::Relaxed);
            match self.attempt(&body).await {
                Ok(reply) => {
                    if let Some(parsed) = parse_json_reply(&reply) {
                        return Ok(parsed);
                    }
                    last_error = format!("invalid JSON reply: {}", snippet(&reply));
                }
                Err(e) => last_error = e.to_string(),
            }
            debug!(attempt, error = %last_error, "chat completion attempt failed");
        }

        self.failures.fetch_add(1, Ordering::Relaxed);
        warn!(model = %self.model, error = %last_error, "chat completion failed");
        Err(CleanbookError::Llm(last_error))
    }

    /// One HTTP round trip; returns the assistant message text.
    async fn attempt(&self, body: &Value) -> Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| CleanbookError::Network(format!("{}: {e}", self.endpoint)))?;

        let status = response.status();
        if status.as_u16() >= 400 {
            let text = response.text().await.unwrap_or_default();
            return Err(CleanbookError::Llm(format!(
                "HTTP {status}: {}",
                snippet(&text)
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| CleanbookError::Llm(format!("response is not JSON: {e}")))?;
        Ok(payload["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .trim()
            .to_string())
    }
}

fn snippet(text: &str) -> String {
    text.chars().take(SNIPPET_LEN).collect()
}

/// Extract a JSON object from a model reply.
///
/// Accepts bare JSON, JSON wrapped in ``` fences (with or without a `json`
/// tag), or prose around a single object. Empty objects count as failure.
pub fn parse_json_reply(text: &str) -> Option<Map<String, Value>> {
    let mut text = text.trim();
    if text.starts_with("```") {
        text = text.trim_matches('`').trim_start();
        text = text.strip_prefix("json").unwrap_or(text).trim();
    }
    if text.is_empty() {
        return None;
    }

    let parsed = serde_json::from_str::<Value>(text).ok().or_else(|| {
        let start = text.find('{')?;
        let end = text.rfind('}')?;
        (end > start)
            .then(|| serde_json::from_str(&text[start..=end]).ok())
            .flatten()
    })?;

    match parsed {
        Value::Object(map) if !map.is_empty() => Some(map),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(base_url: &str) -> LlmSettings {
        LlmSettings {
            enable: true,
            base_url: base_url.to_string(),
            max_retries: 1,
            ..LlmSettings::default()
        }
    }

    fn reply(content: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }]
        }))
    }

    #[test]
    fn parses_bare_and_fenced_json() {
        let bare = parse_json_reply(r#"{"category": "AI"}"#).expect("bare");
        assert_eq!(bare["category"], "AI");

        let fenced = parse_json_reply("```json\n{\"category\": \"AI\"}\n```").expect("fenced");
        assert_eq!(fenced["category"], "AI");

        let plain_fence = parse_json_reply("```\n{\"a\": 1}\n```").expect("plain fence");
        assert_eq!(plain_fence["a"], 1);
    }

    #[test]
    fn parses_object_embedded_in_prose() {
        let map = parse_json_reply("Sure! Here you go: {\"confidence\": 0.7} hope it helps")
            .expect("embedded");
        assert_eq!(map["confidence"], 0.7);
    }

    #[test]
    fn rejects_empty_and_non_objects() {
        assert!(parse_json_reply("").is_none());
        assert!(parse_json_reply("{}").is_none());
        assert!(parse_json_reply("[1, 2]").is_none());
        assert!(parse_json_reply("no json here").is_none());
    }

    #[test]
    fn request_body_includes_options() {
        let client = ChatClient::new(&settings("https://api.example.com/"), "k")
            .expect("client")
            .with_max_tokens(100);
        let body = client.request_body(&[ChatMessage::user("hi")]);
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["max_tokens"], 100);
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(
            client.endpoint,
            "https://api.example.com/v1/chat/completions"
        );
    }

    #[tokio::test]
    async fn sends_bearer_token_and_parses_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(reply(r#"{"category": "技术/编程", "confidence": 0.9}"#))
            .expect(1)
            .mount(&server)
            .await;

        let client = ChatClient::new(&settings(&server.uri()), "test-key").expect("client");
        let map = client
            .complete_json(&[ChatMessage::user("classify")])
            .await
            .expect("reply");
        assert_eq!(map["category"], "技术/编程");
        assert_eq!(client.stats().calls, 1);
    }

    #[tokio::test]
    async fn retries_after_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(reply(r#"{"ok": true}"#))
            .mount(&server)
            .await;

        let client = ChatClient::new(&settings(&server.uri()), "k")
            .expect("client")
            .with_retry_backoff(Duration::from_millis(50));
        let started = std::time::Instant::now();
        let map = client
            .complete_json(&[ChatMessage::user("x")])
            .await
            .expect("second attempt succeeds");
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(map["ok"], true);
        assert_eq!(client.stats().calls, 2);
        assert_eq!(client.stats().failures, 0);
    }

    #[tokio::test]
    async fn gives_up_after_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(reply("I cannot answer that."))
            .expect(2)
            .mount(&server)
            .await;

        let client = ChatClient::new(&settings(&server.uri()), "k").expect("client");
        let err = client
            .complete_json(&[ChatMessage::user("x")])
            .await
            .expect_err("never valid");
        assert!(err.to_string().contains("invalid JSON reply"));
        assert_eq!(client.stats().failures, 1);
    }
}

//! Concurrent link checker.
//!
//! Each bookmark gets a GET request. Redirects are followed by hand so the
//! hop count and final URL can be reported. Fan-out is bounded by a
//! semaphore; results come back in input order.

use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

use cleanbook_importer::clean_title;
use cleanbook_shared::{Bookmark, CleanbookError, HealthSettings, Result, TitleCleaningRules};
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::{Client, Response};
use scraper::{Html, Selector};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument};
use url::Url;

use crate::report::{HealthReport, HealthStatus};

/// User-Agent string for health check requests.
pub const USER_AGENT: &str = concat!("CleanBook/", env!("CARGO_PKG_VERSION"));

const MAX_REDIRECTS: u32 = 5;
/// More hops than this is worth a warning.
const QUIET_REDIRECTS: u32 = 3;
const SLOW_RESPONSE_MS: u64 = 5000;
/// Only the head of a page is scanned for its `<title>`.
const TITLE_SCAN_BYTES: usize = 10 * 1024;

static TITLE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("title selector"));

// ---------------------------------------------------------------------------
// HealthConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct HealthConfig {
    pub timeout_secs: u64,
    pub concurrency: usize,
    pub user_agent: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            concurrency: 20,
            user_agent: USER_AGENT.to_string(),
        }
    }
}

impl From<&HealthSettings> for HealthConfig {
    fn from(settings: &HealthSettings) -> Self {
        Self {
            timeout_secs: settings.timeout_secs,
            concurrency: settings.concurrency,
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// HealthChecker
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HealthChecker {
    config: HealthConfig,
    client: Client,
}

impl HealthChecker {
    pub fn new(config: HealthConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CleanbookError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// Check every bookmark; one report per bookmark, in input order.
    #[instrument(skip_all, fields(bookmarks = bookmarks.len(), concurrency = self.config.concurrency))]
    pub async fn check(&self, bookmarks: &[Bookmark]) -> Vec<HealthReport> {
        let started = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));

        let handles: Vec<_> = bookmarks
            .iter()
            .map(|b| {
                let client = self.client.clone();
                let sem = semaphore.clone();
                let (url, title) = (b.url.clone(), b.title.clone());
                tokio::spawn(async move {
                    let _permit = sem.acquire_owned().await;
                    check_one(&client, &url, &title).await
                })
            })
            .collect();

        let mut reports = Vec::with_capacity(handles.len());
        for (handle, bookmark) in handles.into_iter().zip(bookmarks) {
            reports.push(handle.await.unwrap_or_else(|e| {
                HealthReport::failed(&bookmark.url, &bookmark.title, format!("task failed: {e}"))
            }));
        }

        info!(
            checked = reports.len(),
            accessible = reports.iter().filter(|r| r.status.is_accessible()).count(),
            duration_ms = started.elapsed().as_millis(),
            "health check completed"
        );
        reports
    }

    /// Replace titles that are just the URL with the page `<title>`,
    /// cleaned with `rules`. Returns the bookmarks and how many titles changed.
    #[instrument(skip_all, fields(bookmarks = bookmarks.len()))]
    pub async fn fetch_titles(
        &self,
        mut bookmarks: Vec<Bookmark>,
        rules: &TitleCleaningRules,
    ) -> (Vec<Bookmark>, usize) {
        let candidates: Vec<usize> = bookmarks
            .iter()
            .enumerate()
            .filter(|(_, b)| b.title.trim() == b.url.trim())
            .map(|(i, _)| i)
            .collect();
        if candidates.is_empty() {
            return (bookmarks, 0);
        }

        let targets: Vec<Bookmark> = candidates.iter().map(|&i| bookmarks[i].clone()).collect();
        let reports = self.check(&targets).await;

        let mut updated = 0;
        for (idx, report) in candidates.into_iter().zip(reports) {
            if let Some(raw) = report.page_title {
                let title = clean_title(&raw, rules);
                if title.is_empty() {
                    continue;
                }
                debug!(url = %report.url, %title, "fetched title");
                bookmarks[idx].title = title;
                updated += 1;
            }
        }
        info!(candidates = targets.len(), updated, "title fetch completed");
        (bookmarks, updated)
    }
}

// ---------------------------------------------------------------------------
// Single request
// ---------------------------------------------------------------------------

fn describe(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "timeout".to_string()
    } else if e.is_connect() {
        format!("connection failed: {e}")
    } else {
        format!("request failed: {e}")
    }
}

async fn check_one(client: &Client, url: &str, title: &str) -> HealthReport {
    let mut current = match Url::parse(url.trim()) {
        Ok(u) if matches!(u.scheme(), "http" | "https") => u,
        _ => return HealthReport::failed(url, title, "invalid URL"),
    };

    let mut report = HealthReport::new(url, title);
    let started = Instant::now();

    let response = loop {
        let response = match client.get(current.clone()).send().await {
            Ok(r) => r,
            Err(e) => {
                report.status = HealthStatus::Error;
                report.errors.push(describe(&e));
                report.response_time_ms = started.elapsed().as_millis() as u64;
                return report;
            }
        };
        if !response.status().is_redirection() || report.redirect_count >= MAX_REDIRECTS {
            break response;
        }
        let next = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|location| current.join(location).ok());
        match next {
            Some(next) => {
                report.redirect_count += 1;
                current = next;
            }
            None => break response,
        }
    };
    report.response_time_ms = started.elapsed().as_millis() as u64;

    let status = response.status();
    report.status_code = Some(status.as_u16());
    report.status = HealthStatus::from_code(status.as_u16());
    if report.redirect_count > 0 {
        report.final_url = Some(current.to_string());
    }

    match report.status {
        HealthStatus::Error => report.errors.push(format!("HTTP {status}")),
        HealthStatus::Warning => report.warnings.push(format!("HTTP {status}")),
        _ => {}
    }
    if report.response_time_ms > SLOW_RESPONSE_MS {
        report
            .warnings
            .push(format!("slow response ({} ms)", report.response_time_ms));
    }
    if report.redirect_count > QUIET_REDIRECTS {
        report
            .warnings
            .push(format!("{} redirects", report.redirect_count));
    }
    if report.status == HealthStatus::Healthy && !report.warnings.is_empty() {
        report.status = HealthStatus::Warning;
    }

    if status.is_success() && is_html(&response) {
        report.page_title = read_title(response).await;
    }
    report
}

fn is_html(response: &Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.to_ascii_lowercase().contains("html"))
}

async fn read_title(mut response: Response) -> Option<String> {
    let mut head = Vec::new();
    while head.len() < TITLE_SCAN_BYTES {
        match response.chunk().await {
            Ok(Some(chunk)) => head.extend_from_slice(&chunk),
            _ => break,
        }
    }
    head.truncate(TITLE_SCAN_BYTES);
    extract_title(&String::from_utf8_lossy(&head))
}

/// Text of the first `<title>`, whitespace collapsed.
pub fn extract_title(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let raw: String = doc.select(&TITLE_SELECTOR).next()?.text().collect();
    let title = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    (!title.is_empty()).then_some(title)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn html(title: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_raw(
            format!("<html><head><title>{title}</title></head><body>hi</body></html>"),
            "text/html; charset=utf-8",
        )
    }

    fn checker() -> HealthChecker {
        HealthChecker::new(HealthConfig {
            timeout_secs: 5,
            concurrency: 4,
            ..HealthConfig::default()
        })
        .expect("checker")
    }

    #[test]
    fn title_extraction() {
        assert_eq!(
            extract_title("<html><head><title>\n  Rust   Book </title></head></html>").as_deref(),
            Some("Rust Book")
        );
        assert!(extract_title("<html><head></head></html>").is_none());
        assert!(extract_title("<title>   </title>").is_none());
    }

    #[tokio::test]
    async fn reports_in_input_order_with_status_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .respond_with(html("Fine Page"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/private"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/boom"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let base = server.uri();
        let bookmarks: Vec<Bookmark> = ["/ok", "/gone", "/private", "/boom"]
            .iter()
            .map(|p| Bookmark::new(format!("{base}{p}"), *p))
            .chain(std::iter::once(Bookmark::new("not a url", "broken")))
            .collect();

        let reports = checker().check(&bookmarks).await;
        let statuses: Vec<HealthStatus> = reports.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                HealthStatus::Healthy,
                HealthStatus::Error,
                HealthStatus::Warning,
                HealthStatus::Error,
                HealthStatus::Error,
            ]
        );
        assert_eq!(reports[0].page_title.as_deref(), Some("Fine Page"));
        assert_eq!(reports[1].status_code, Some(404));
        assert_eq!(reports[4].errors, vec!["invalid URL"]);
        for (report, bookmark) in reports.iter().zip(&bookmarks) {
            assert_eq!(report.url, bookmark.url);
        }
    }

    #[tokio::test]
    async fn follows_redirects() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(ResponseTemplate::new(301).insert_header("Location", "/new"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/new"))
            .respond_with(html("New Home"))
            .mount(&server)
            .await;

        let url = format!("{}/old", server.uri());
        let reports = checker().check(&[Bookmark::new(url, "old")]).await;
        let report = &reports[0];
        assert_eq!(report.status, HealthStatus::Healthy);
        assert_eq!(report.redirect_count, 1);
        assert!(report.final_url.as_deref().is_some_and(|u| u.ends_with("/new")));
        assert_eq!(report.page_title.as_deref(), Some("New Home"));
    }

    #[tokio::test]
    async fn redirect_loops_stop_with_a_warning() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/loop"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/loop"))
            .mount(&server)
            .await;

        let url = format!("{}/loop", server.uri());
        let report = &checker().check(&[Bookmark::new(url, "loop")]).await[0];
        assert_eq!(report.redirect_count, MAX_REDIRECTS);
        assert_eq!(report.status, HealthStatus::Warning);
        assert!(report.warnings.iter().any(|w| w == "5 redirects"));
    }

    #[tokio::test]
    async fn fetch_titles_only_touches_url_titles() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/untitled"))
            .respond_with(html("🟢  Real   Title - V2EX"))
            .expect(1)
            .mount(&server)
            .await;

        let url = format!("{}/untitled", server.uri());
        let bookmarks = vec![
            Bookmark::new(url.clone(), url.clone()),
            Bookmark::new(format!("{}/titled", server.uri()), "Keep me"),
        ];
        let rules = TitleCleaningRules {
            suffixes: vec!["- V2EX".into()],
            ..TitleCleaningRules::default()
        };
        let (out, updated) = checker().fetch_titles(bookmarks, &rules).await;
        assert_eq!(updated, 1);
        assert_eq!(out[0].title, "Real Title");
        assert_eq!(out[1].title, "Keep me");
    }

    #[test]
    fn config_from_app_settings() {
        let settings = HealthSettings {
            timeout_secs: 3,
            concurrency: 7,
        };
        let config = HealthConfig::from(&settings);
        assert_eq!(config.timeout_secs, 3);
        assert_eq!(config.concurrency, 7);
        assert_eq!(config.user_agent, USER_AGENT);
    }
}

//! Feature extraction from a bookmark's URL and title.

use std::sync::LazyLock;

use cleanbook_dedup::bare_host;
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

static CJK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\u{4e00}-\u{9fff}]").expect("cjk regex"));
static LATIN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[a-zA-Z]").expect("latin regex"));

/// Coarse kind of page, guessed from well-known hosts and title words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Video,
    CodeRepository,
    Documentation,
    AcademicPaper,
    News,
    OnlineTool,
    Webpage,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::CodeRepository => "code_repository",
            Self::Documentation => "documentation",
            Self::AcademicPaper => "academic_paper",
            Self::News => "news",
            Self::OnlineTool => "online_tool",
            Self::Webpage => "webpage",
        }
    }

    /// First matching heuristic wins, in the order of the variants.
    pub fn detect(url: &str, title: &str) -> Self {
        let url = url.to_lowercase();
        let title = title.to_lowercase();
        let url_has = |needles: &[&str]| needles.iter().any(|n| url.contains(n));
        let title_has = |needles: &[&str]| needles.iter().any(|n| title.contains(n));

        if url_has(&["youtube.com", "bilibili.com", "vimeo.com"]) {
            Self::Video
        } else if url_has(&["github.com", "gitlab.com"]) {
            Self::CodeRepository
        } else if url_has(&["docs.", "documentation", "wiki"]) {
            Self::Documentation
        } else if url_has(&["arxiv.org", "acm.org", "ieee.org"]) {
            Self::AcademicPaper
        } else if title_has(&["news", "新闻", "breaking"]) {
            Self::News
        } else if title_has(&["tool", "工具", "online", "generator"]) {
            Self::OnlineTool
        } else {
            Self::Webpage
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Script of the title text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Zh,
    En,
    Unknown,
}

impl Language {
    pub fn detect(text: &str) -> Self {
        if CJK_RE.is_match(text) {
            Self::Zh
        } else if LATIN_RE.is_match(text) {
            Self::En
        } else {
            Self::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Zh => "zh",
            Self::En => "en",
            Self::Unknown => "unknown",
        }
    }
}

/// Everything the classification strategies look at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookmarkFeatures {
    pub url: String,
    pub title: String,
    /// Lower-cased host without `www.`; empty when the URL does not parse.
    pub domain: String,
    pub path_segments: Vec<String>,
    pub query_params: Vec<(String, String)>,
    pub content_type: ContentType,
    pub language: Language,
}

impl BookmarkFeatures {
    pub fn extract(url: &str, title: &str) -> Self {
        let parsed = Url::parse(url.trim()).ok();

        let domain = parsed
            .as_ref()
            .and_then(|u| u.host_str())
            .map(bare_host)
            .unwrap_or_default();
        let path_segments = parsed
            .as_ref()
            .and_then(|u| u.path_segments())
            .map(|segs| segs.filter(|s| !s.is_empty()).map(str::to_string).collect())
            .unwrap_or_default();
        let query_params = parsed
            .as_ref()
            .map(|u| u.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())).collect())
            .unwrap_or_default();

        Self {
            url: url.to_string(),
            title: title.to_string(),
            domain,
            path_segments,
            query_params,
            content_type: ContentType::detect(url, title),
            language: Language::detect(title),
        }
    }

    /// Path segments joined with `/`, lower-cased.
    pub fn path_text(&self) -> String {
        self.path_segments.join("/").to_lowercase()
    }

    pub fn is_secure(&self) -> bool {
        self.url.trim_start().to_lowercase().starts_with("https://")
    }
}

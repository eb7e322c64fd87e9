//! Health check results and their aggregate summary.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Responses slower than this count as slow in the summary.
pub const SLOW_SUMMARY_MS: u64 = 3000;

const SUMMARY_LIST_LEN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Error,
    Unknown,
}

impl HealthStatus {
    /// Status implied by an HTTP status code alone.
    pub fn from_code(code: u16) -> Self {
        match code {
            200..=299 => Self::Healthy,
            300..=399 => Self::Warning,
            404 | 410 => Self::Error,
            400..=499 => Self::Warning,
            500..=599 => Self::Error,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Unknown => "unknown",
        }
    }

    /// Reachable, possibly with caveats.
    pub fn is_accessible(&self) -> bool {
        matches!(self, Self::Healthy | Self::Warning)
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of checking one bookmark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub url: String,
    pub title: String,
    pub status: HealthStatus,
    pub status_code: Option<u16>,
    /// Where redirects ended, when different from `url`.
    pub final_url: Option<String>,
    pub redirect_count: u32,
    pub response_time_ms: u64,
    /// `<title>` of the page, when it was HTML.
    pub page_title: Option<String>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl HealthReport {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            status: HealthStatus::Unknown,
            status_code: None,
            final_url: None,
            redirect_count: 0,
            response_time_ms: 0,
            page_title: None,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// A report that failed before or during the request.
    pub fn failed(url: impl Into<String>, title: impl Into<String>, error: impl Into<String>) -> Self {
        let mut report = Self::new(url, title);
        report.status = HealthStatus::Error;
        report.errors.push(error.into());
        report
    }
}

/// Aggregate over a batch of reports.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HealthSummary {
    pub total: usize,
    /// Healthy plus warning.
    pub accessible: usize,
    pub accessibility_rate: f64,
    /// Mean response time of accessible links.
    pub average_response_ms: f64,
    pub status_distribution: BTreeMap<String, usize>,
    /// Most frequent error messages with their counts.
    pub common_errors: Vec<(String, usize)>,
    pub slow_links: Vec<HealthReport>,
    pub broken_links: Vec<HealthReport>,
}

pub fn summarize(reports: &[HealthReport]) -> HealthSummary {
    let mut summary = HealthSummary {
        total: reports.len(),
        ..HealthSummary::default()
    };

    let mut response_total = 0u64;
    let mut errors: Vec<(String, usize)> = Vec::new();
    for report in reports {
        *summary
            .status_distribution
            .entry(report.status.as_str().to_string())
            .or_default() += 1;

        if report.status.is_accessible() {
            summary.accessible += 1;
            response_total += report.response_time_ms;
        }
        if report.status == HealthStatus::Error && summary.broken_links.len() < SUMMARY_LIST_LEN {
            summary.broken_links.push(report.clone());
        }
        if report.response_time_ms > SLOW_SUMMARY_MS && summary.slow_links.len() < SUMMARY_LIST_LEN
        {
            summary.slow_links.push(report.clone());
        }
        for error in &report.errors {
            match errors.iter_mut().find(|(e, _)| e == error) {
                Some((_, n)) => *n += 1,
                None => errors.push((error.clone(), 1)),
            }
        }
    }

    if summary.accessible > 0 {
        summary.average_response_ms = response_total as f64 / summary.accessible as f64;
    }
    summary.accessibility_rate = summary.accessible as f64 / summary.total.max(1) as f64;
    errors.sort_by_key(|(_, n)| std::cmp::Reverse(*n));
    errors.truncate(SUMMARY_LIST_LEN);
    summary.common_errors = errors;
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(url: &str, status: HealthStatus, ms: u64) -> HealthReport {
        let mut r = HealthReport::new(url, url);
        r.status = status;
        r.response_time_ms = ms;
        r
    }

    #[test]
    fn status_code_mapping() {
        assert_eq!(HealthStatus::from_code(200), HealthStatus::Healthy);
        assert_eq!(HealthStatus::from_code(204), HealthStatus::Healthy);
        assert_eq!(HealthStatus::from_code(301), HealthStatus::Warning);
        assert_eq!(HealthStatus::from_code(403), HealthStatus::Warning);
        assert_eq!(HealthStatus::from_code(404), HealthStatus::Error);
        assert_eq!(HealthStatus::from_code(410), HealthStatus::Error);
        assert_eq!(HealthStatus::from_code(502), HealthStatus::Error);
        assert_eq!(HealthStatus::from_code(100), HealthStatus::Unknown);
    }

    #[test]
    fn summary_counts_and_averages() {
        let mut broken = HealthReport::failed("https://gone.example", "gone", "HTTP 404 Not Found");
        broken.status_code = Some(404);
        let reports = vec![
            report("https://a.example", HealthStatus::Healthy, 100),
            report("https://b.example", HealthStatus::Warning, 4100),
            broken.clone(),
            HealthReport::failed("https://c.example", "c", "HTTP 404 Not Found"),
        ];

        let s = summarize(&reports);
        assert_eq!(s.total, 4);
        assert_eq!(s.accessible, 2);
        assert!((s.accessibility_rate - 0.5).abs() < 1e-9);
        assert!((s.average_response_ms - 2100.0).abs() < 1e-9);
        assert_eq!(s.status_distribution["error"], 2);
        assert_eq!(s.common_errors, vec![("HTTP 404 Not Found".to_string(), 2)]);
        assert_eq!(s.slow_links.len(), 1);
        assert_eq!(s.broken_links[0], broken);
    }

    #[test]
    fn empty_summary() {
        let s = summarize(&[]);
        assert_eq!(s.total, 0);
        assert_eq!(s.average_response_ms, 0.0);
        assert_eq!(s.accessibility_rate, 0.0);
    }
}

//! Link health checks and title fetching for bookmarks.

pub mod checker;
pub mod report;

pub use checker::{HealthChecker, HealthConfig, USER_AGENT, extract_title};
pub use report::{HealthReport, HealthStatus, HealthSummary, SLOW_SUMMARY_MS, summarize};

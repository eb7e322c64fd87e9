//! OpenAI-compatible LLM integration: per-bookmark votes and whole-tree
//! reorganization. Both degrade to `None` on any failure.

pub mod classify;
pub mod client;
pub mod organize;

pub use classify::{LlmClassifier, map_to_known, normalize_category, strip_category_prefix};
pub use client::{ChatClient, ChatMessage, LlmStats, parse_json_reply};
pub use organize::{
    CategorySummary, ConfidenceBins, DatasetSummary, LlmOrganizer, MappingTarget, OrganizerPlan,
};

//! Shared types, error model, and configuration for CleanBook.
//!
//! This crate is the foundation depended on by all other CleanBook crates.
//! It provides:
//! - [`CleanbookError`], the unified error type
//! - Domain types ([`Bookmark`], [`ClassifiedBookmark`], [`CategoryTree`], [`RunId`])
//! - Configuration ([`AppConfig`] from TOML, [`RulesConfig`] from JSON)

pub mod config;
pub mod error;
pub mod rules;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, HealthSettings, config_dir, config_file_path, init_config,
    load_config, load_config_from,
};
pub use error::{CleanbookError, Result};
pub use rules::{
    AiSettings, CategoryRules, LlmSettings, MatchTarget, OrganizerSettings, Rule, RulesConfig,
    TitleCleaningRules,
};
pub use types::{
    Bookmark, CategoryNode, CategoryTree, ClassifiedBookmark, EXPORT_FORMAT_VERSION,
    FALLBACK_CATEGORY, ProcessingStats, RunId,
};

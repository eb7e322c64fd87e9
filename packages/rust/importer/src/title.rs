//! Bookmark title cleanup.

use std::sync::LazyLock;

use cleanbook_shared::TitleCleaningRules;
use regex::Regex;

/// Emoji prefixes written by our own HTML export (confidence indicators
/// and a few common markers). Stripping them keeps re-imports stable.
const INDICATOR_EMOJI: &[char] = &['🟢', '🟡', '🟠', '🔴', '🔥', '📌', '⭐', '❓'];

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex"));

/// Remove leading indicator emoji (and the spaces after them).
///
/// A title made only of indicators keeps its last one, so an exported
/// "🟢 ⭐" reads back as "⭐" rather than an empty title.
pub fn strip_indicators(title: &str) -> &str {
    let trimmed = title.trim();
    let stripped = trimmed
        .trim_start_matches(|c: char| INDICATOR_EMOJI.contains(&c) || c.is_whitespace())
        .trim_end();
    if !stripped.is_empty() {
        return stripped;
    }
    match trimmed.char_indices().rev().find(|(_, c)| !c.is_whitespace()) {
        Some((idx, _)) => &trimmed[idx..],
        None => stripped,
    }
}

/// Apply configured replacements, prefix and suffix removal, then collapse
/// whitespace. Returns the trimmed input if cleaning would leave nothing.
pub fn clean_title(title: &str, rules: &TitleCleaningRules) -> String {
    let mut cleaned = strip_indicators(title).to_string();

    for (from, to) in &rules.replacements {
        if !from.is_empty() {
            cleaned = cleaned.replace(from.as_str(), to);
        }
    }

    for prefix in &rules.prefixes {
        if let Some(rest) = cleaned.trim_start().strip_prefix(prefix.as_str()) {
            cleaned = rest.to_string();
        }
    }

    for suffix in &rules.suffixes {
        if let Some(rest) = cleaned.trim_end().strip_suffix(suffix.as_str()) {
            cleaned = rest.to_string();
        }
    }

    let cleaned = WHITESPACE_RE.replace_all(cleaned.trim(), " ").into_owned();
    if cleaned.is_empty() {
        title.trim().to_string()
    } else {
        cleaned
    }
}

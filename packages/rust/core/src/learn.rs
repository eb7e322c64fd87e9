//! Recording user corrections.

use std::path::PathBuf;

use cleanbook_classifier::{BookmarkFeatures, NaiveBayes, UserProfiler};
use cleanbook_shared::{CleanbookError, Result, RulesConfig};
use tracing::{info, instrument, warn};

/// A user's statement that `url` belongs in `category`.
#[derive(Debug, Clone)]
pub struct Feedback {
    pub url: String,
    pub title: String,
    pub category: String,
    /// Weight of the correction; explicit feedback defaults to 1.0.
    pub confidence: f64,
}

/// Where learned state lives.
#[derive(Debug, Clone)]
pub struct LearnTargets {
    pub profile_path: PathBuf,
    /// The saved model also learns the sample when present.
    pub model_path: Option<PathBuf>,
}

/// What a feedback call changed.
#[derive(Debug, Clone, PartialEq)]
pub struct LearnOutcome {
    /// Interactions now stored in the profile.
    pub interactions: usize,
    pub model_updated: bool,
    /// The category is not known to the rules.
    pub unknown_category: bool,
}

/// Fold one correction into the user profile (and the saved model).
#[instrument(skip_all, fields(url = %feedback.url, category = %feedback.category))]
pub fn learn(feedback: &Feedback, rules: &RulesConfig, targets: &LearnTargets) -> Result<LearnOutcome> {
    let category = feedback.category.trim();
    if category.is_empty() {
        return Err(CleanbookError::validation("category must not be empty"));
    }
    if feedback.url.trim().is_empty() {
        return Err(CleanbookError::validation("url must not be empty"));
    }

    let unknown_category = !rules
        .known_categories()
        .iter()
        .any(|c| c == category || category.split('/').next() == Some(c.as_str()));
    if unknown_category {
        warn!(category, "category is not defined in the rules");
    }

    let title = if feedback.title.trim().is_empty() {
        &feedback.url
    } else {
        &feedback.title
    };
    let features = BookmarkFeatures::extract(&feedback.url, title);
    let confidence = feedback.confidence.clamp(0.0, 1.0);

    let mut profiler = UserProfiler::load(&targets.profile_path);
    profiler.learn(&features, category, confidence);
    profiler.save()?;

    let mut model_updated = false;
    if let Some(path) = &targets.model_path {
        if let Some(mut model) = NaiveBayes::load(path)? {
            model.add_sample(&features, category);
            model.save(path)?;
            model_updated = true;
        }
    }

    let interactions = profiler.profile().interaction_history.len();
    info!(interactions, model_updated, "feedback recorded");
    Ok(LearnOutcome {
        interactions,
        model_updated,
        unknown_category,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch() -> PathBuf {
        std::env::temp_dir().join(format!("cleanbook-learn-{}", uuid::Uuid::now_v7()))
    }

    fn feedback(category: &str) -> Feedback {
        Feedback {
            url: "https://crates.io/crates/serde".into(),
            title: "serde - crates.io".into(),
            category: category.into(),
            confidence: 1.0,
        }
    }

    #[test]
    fn records_into_profile() {
        let dir = scratch();
        let targets = LearnTargets {
            profile_path: dir.join("profile.json"),
            model_path: None,
        };
        let rules = RulesConfig::default();
        let category = rules.known_categories()[0].clone();

        let first = learn(&feedback(&category), &rules, &targets).expect("learn");
        let second = learn(&feedback(&category), &rules, &targets).expect("learn");
        assert_eq!(first.interactions, 1);
        assert_eq!(second.interactions, 2);
        assert!(!second.unknown_category);
        assert!(!second.model_updated);

        let profiler = UserProfiler::load(&targets.profile_path);
        assert!(profiler.profile().category_preferences.contains_key(&category));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn flags_unknown_categories() {
        let dir = scratch();
        let targets = LearnTargets {
            profile_path: dir.join("profile.json"),
            model_path: Some(dir.join("missing-model.json")),
        };
        let outcome = learn(&feedback("Made Up"), &RulesConfig::default(), &targets).expect("learn");
        assert!(outcome.unknown_category);
        assert!(!outcome.model_updated);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn rejects_empty_category() {
        let targets = LearnTargets {
            profile_path: scratch().join("profile.json"),
            model_path: None,
        };
        let err = learn(&feedback("  "), &RulesConfig::default(), &targets).unwrap_err();
        assert!(matches!(err, CleanbookError::Validation { .. }));
    }
}

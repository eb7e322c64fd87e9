//! Bookmark classification strategies and their ensemble.
//!
//! Each strategy turns [`BookmarkFeatures`] into an optional [`Vote`]; the
//! [`Classifier`] facade merges votes into a [`ClassifiedBookmark`] and
//! caches the result.
//!
//! [`ClassifiedBookmark`]: cleanbook_shared::ClassifiedBookmark

pub mod bayes;
pub mod classifier;
pub mod ensemble;
pub mod features;
pub mod profile;
pub mod rules;
pub mod semantic;
pub mod vote;

pub use bayes::{MIN_TRAINING_SAMPLES, NaiveBayes};
pub use classifier::{Classifier, ClassifierStats, cache_key};
pub use ensemble::{combine, subcategory_for};
pub use features::{BookmarkFeatures, ContentType, Language};
pub use profile::{Interaction, UserProfile, UserProfiler};
pub use rules::{RuleEngine, RuleMatch, compile_keyword, validate_rules};
pub use semantic::SemanticAnalyzer;
pub use vote::{Strategy, Vote, pick_best, rank_scores};

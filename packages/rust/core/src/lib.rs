//! Pipeline orchestration for CleanBook.
//!
//! Ties together importing, deduplication, classification, tree building
//! and export into the `process` workflow, plus feedback learning.

pub mod learn;
pub mod pipeline;
pub mod tree;

pub use learn::{Feedback, LearnOutcome, LearnTargets, learn};
pub use pipeline::{ProcessConfig, ProcessResult, ProgressReporter, SilentProgress, process};
pub use tree::organize;

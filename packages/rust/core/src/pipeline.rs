//! End-to-end `process` pipeline: files → parse → dedupe → classify → organize → export.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Local, Utc};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use cleanbook_classifier::{BookmarkFeatures, Classifier, ClassifierStats, NaiveBayes, UserProfiler};
use cleanbook_dedup::{Deduplicator, Duplicate};
use cleanbook_export::{ExportFormat, ExportMeta};
use cleanbook_health::{HealthChecker, HealthConfig};
use cleanbook_llm::{LlmClassifier, LlmOrganizer, LlmStats};
use cleanbook_shared::{
    Bookmark, CategoryTree, ClassifiedBookmark, CleanbookError, HealthSettings, ProcessingStats,
    Result, RulesConfig, RunId,
};

use crate::tree;

/// Files loaded at the same time.
const MAX_PARALLEL_LOADS: usize = 8;

/// Results above this confidence become training samples for `--train`.
const TRAINING_CONFIDENCE: f64 = 0.8;

/// Configuration for one `process` run.
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    /// Bookmark files or directories holding them.
    pub inputs: Vec<PathBuf>,
    pub output_dir: PathBuf,
    pub rules: RulesConfig,
    /// Concurrent classification tasks.
    pub workers: usize,
    pub formats: Vec<ExportFormat>,
    /// Use the saved naive Bayes model.
    pub use_ml: bool,
    /// Ask the LLM for an extra vote per bookmark.
    pub use_llm: bool,
    /// Let the LLM organizer build the final tree.
    pub llm_organize: bool,
    /// Retrain and save the model from this run's confident results.
    pub train: bool,
    /// Replace URL-only titles with the fetched page title.
    pub fetch_titles: bool,
    /// Run the near-duplicate pass regardless of collection size.
    pub near_dedup: bool,
    pub profile_path: Option<PathBuf>,
    pub model_path: Option<PathBuf>,
    /// HTTP settings for title fetching.
    pub health: HealthSettings,
}

impl ProcessConfig {
    pub fn new(inputs: Vec<PathBuf>, output_dir: impl Into<PathBuf>, rules: RulesConfig) -> Self {
        Self {
            inputs,
            output_dir: output_dir.into(),
            rules,
            workers: 4,
            formats: vec![ExportFormat::Html, ExportFormat::Json, ExportFormat::Markdown],
            use_ml: true,
            use_llm: false,
            llm_organize: false,
            train: false,
            fetch_titles: false,
            near_dedup: false,
            profile_path: None,
            model_path: None,
            health: HealthSettings::default(),
        }
    }
}

/// Result of a `process` run.
#[derive(Debug)]
pub struct ProcessResult {
    pub run_id: RunId,
    pub stats: ProcessingStats,
    pub tree: Arc<CategoryTree>,
    /// Export files written, in format order.
    pub outputs: Vec<PathBuf>,
    pub duplicates: Vec<Duplicate>,
    pub classifier: ClassifierStats,
    pub llm: Option<LlmStats>,
    /// The LLM organizer produced the tree.
    pub llm_organized: bool,
    /// Samples the model was retrained on, when `train` succeeded.
    pub trained_samples: Option<usize>,
    pub elapsed: Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when a bookmark file has been parsed.
    fn file_loaded(&self, path: &Path, bookmarks: usize, current: usize, total: usize);
    /// Called as classification results come in, in input order.
    fn bookmark_classified(&self, current: usize, total: usize);
    /// Called when the pipeline completes.
    fn done(&self, result: &ProcessResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn file_loaded(&self, _path: &Path, _bookmarks: usize, _current: usize, _total: usize) {}
    fn bookmark_classified(&self, _current: usize, _total: usize) {}
    fn done(&self, _result: &ProcessResult) {}
}

/// Run the full `process` pipeline.
///
/// 1. Collect and load bookmark files
/// 2. Clean titles and remove duplicates
/// 3. Optionally fetch missing titles
/// 4. Classify (with the LLM vote when enabled)
/// 5. Organize into a category tree
/// 6. Optionally retrain the model
/// 7. Export every requested format
#[instrument(skip_all, fields(inputs = config.inputs.len(), output = %config.output_dir.display()))]
pub async fn process(config: ProcessConfig, progress: &dyn ProgressReporter) -> Result<ProcessResult> {
    let start = Instant::now();
    let run_id = RunId::new();
    let rules = &config.rules;
    let mut stats = ProcessingStats::default();

    info!(%run_id, "starting process pipeline");

    // --- Phase 1: Load ---
    progress.phase("Loading bookmark files");
    let files = cleanbook_importer::collect_inputs(&config.inputs)?;
    if files.is_empty() {
        return Err(CleanbookError::validation("no bookmark files found in the given inputs"));
    }
    let mut bookmarks = load_all(&files, &mut stats, progress).await;
    stats.total_bookmarks = bookmarks.len();

    if bookmarks.is_empty() {
        warn!("no valid bookmarks found");
        stats.processing_time_secs = start.elapsed().as_secs_f64();
        let result = ProcessResult {
            run_id,
            stats,
            tree: Arc::new(CategoryTree::default()),
            outputs: Vec::new(),
            duplicates: Vec::new(),
            classifier: ClassifierStats::default(),
            llm: None,
            llm_organized: false,
            trained_samples: None,
            elapsed: start.elapsed(),
        };
        progress.done(&result);
        return Ok(result);
    }

    // --- Phase 2: Clean + dedupe ---
    progress.phase("Removing duplicates");
    for bookmark in &mut bookmarks {
        bookmark.title = cleanbook_importer::clean_title(&bookmark.title, &rules.title_cleaning_rules);
    }
    let outcome = Deduplicator::default().dedupe(bookmarks, config.near_dedup);
    stats.duplicates_removed = outcome.removed();
    let mut unique = outcome.unique;

    // --- Phase 3: Title fetch ---
    if config.fetch_titles {
        progress.phase("Fetching page titles");
        let checker = HealthChecker::new(HealthConfig::from(&config.health))?;
        let (updated, fetched) = checker.fetch_titles(unique, &rules.title_cleaning_rules).await;
        info!(fetched, "page titles fetched");
        unique = updated;
    }

    // --- Phase 4: Classify ---
    progress.phase("Classifying bookmarks");
    let classifier = Arc::new(build_classifier(&config));
    let llm = if config.use_llm {
        llm_classifier(rules).map(Arc::new)
    } else {
        None
    };
    let classified = classify_all(unique, &classifier, llm.as_ref(), config.workers, &mut stats, progress).await;

    // --- Phase 5: Organize ---
    progress.phase("Organizing categories");
    let mut llm_organized = false;
    let organized = if config.llm_organize {
        match LlmOrganizer::from_rules(rules) {
            Ok(Some(organizer)) => organizer.organize(&classified).await,
            Ok(None) => {
                warn!("LLM organizer disabled or API key missing");
                None
            }
            Err(e) => {
                warn!(error = %e, "LLM organizer unavailable");
                None
            }
        }
    } else {
        None
    };
    let tree = match organized {
        Some(tree) => {
            llm_organized = true;
            tree
        }
        None => tree::organize(classified.clone(), &rules.category_aliases, &rules.category_order),
    };

    // --- Phase 6: Train ---
    let trained_samples = if config.train {
        progress.phase("Training model");
        train_model(&config, &classified)
    } else {
        None
    };

    // --- Phase 7: Export ---
    progress.phase("Exporting");
    fill_stats(&mut stats, &classified);
    stats.processing_time_secs = start.elapsed().as_secs_f64();

    let generated_at = Utc::now();
    let meta = ExportMeta {
        run_id: run_id.clone(),
        generated_at,
        show_confidence_indicator: rules.show_confidence_indicator,
    };
    let stamp = generated_at.with_timezone(&Local).format("%Y%m%d_%H%M%S").to_string();
    let tree = Arc::new(tree);
    let stats = Arc::new(stats);
    let outputs = cleanbook_export::export_all(
        tree.clone(),
        stats.clone(),
        Arc::new(meta),
        &config.output_dir,
        &config.formats,
        &stamp,
    )
    .await?;

    let result = ProcessResult {
        run_id,
        stats: Arc::unwrap_or_clone(stats),
        tree,
        outputs,
        duplicates: outcome.duplicates,
        classifier: classifier.stats(),
        llm: llm.map(|l| l.stats()),
        llm_organized,
        trained_samples,
        elapsed: start.elapsed(),
    };

    progress.done(&result);

    info!(
        run_id = %result.run_id,
        classified = result.stats.processed_bookmarks,
        duplicates = result.stats.duplicates_removed,
        errors = result.stats.errors,
        outputs = result.outputs.len(),
        elapsed_ms = result.elapsed.as_millis(),
        "process pipeline complete"
    );

    Ok(result)
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Parse every file with bounded parallelism. Failed files are counted and
/// skipped; bookmarks keep file order.
async fn load_all(files: &[PathBuf], stats: &mut ProcessingStats, progress: &dyn ProgressReporter) -> Vec<Bookmark> {
    let semaphore = Arc::new(Semaphore::new(files.len().clamp(1, MAX_PARALLEL_LOADS)));
    let handles: Vec<_> = files
        .iter()
        .map(|path| {
            let path = path.clone();
            let semaphore = semaphore.clone();
            tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                cleanbook_importer::load_file(&path).await
            })
        })
        .collect();

    let total = files.len();
    let mut bookmarks = Vec::new();
    for (i, (path, handle)) in files.iter().zip(handles).enumerate() {
        match handle.await {
            Ok(Ok(loaded)) => {
                info!(path = %path.display(), count = loaded.len(), "loaded bookmark file");
                progress.file_loaded(path, loaded.len(), i + 1, total);
                stats.files_processed += 1;
                bookmarks.extend(loaded);
            }
            Ok(Err(e)) => {
                warn!(path = %path.display(), error = %e, "failed to load file, skipping");
                stats.errors += 1;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "load task panicked");
                stats.errors += 1;
            }
        }
    }
    bookmarks
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

fn build_classifier(config: &ProcessConfig) -> Classifier {
    let mut classifier = Classifier::new(config.rules.clone());

    if let Some(path) = &config.profile_path {
        classifier = classifier.with_profile(UserProfiler::load(path));
    }
    if config.use_ml {
        if let Some(path) = &config.model_path {
            match NaiveBayes::load(path) {
                Ok(Some(model)) => classifier = classifier.with_model(model),
                Ok(None) => debug!(path = %path.display(), "no saved model, ML disabled"),
                Err(e) => warn!(error = %e, "ignoring unreadable model"),
            }
        }
    }

    debug!(ml = classifier.has_model(), "classifier ready");
    classifier
}

fn llm_classifier(rules: &RulesConfig) -> Option<LlmClassifier> {
    match LlmClassifier::from_rules(rules) {
        Ok(Some(llm)) => {
            info!(categories = llm.categories().len(), "LLM classification enabled");
            Some(llm)
        }
        Ok(None) => {
            warn!("LLM disabled in rules or API key missing, classifying without it");
            None
        }
        Err(e) => {
            warn!(error = %e, "LLM client unavailable, classifying without it");
            None
        }
    }
}

/// Classify with at most `workers` bookmarks in flight. Results come back in
/// input order; a panicked task is counted as an error and skipped.
async fn classify_all(
    bookmarks: Vec<Bookmark>,
    classifier: &Arc<Classifier>,
    llm: Option<&Arc<LlmClassifier>>,
    workers: usize,
    stats: &mut ProcessingStats,
    progress: &dyn ProgressReporter,
) -> Vec<ClassifiedBookmark> {
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let total = bookmarks.len();

    let handles: Vec<_> = bookmarks
        .into_iter()
        .map(|bookmark| {
            let semaphore = semaphore.clone();
            let classifier = classifier.clone();
            let llm = llm.cloned();
            let url = bookmark.url.clone();
            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                if let Some(hit) = classifier.cached(&bookmark) {
                    return hit;
                }
                let extra = match &llm {
                    Some(llm) => llm.classify(&bookmark).await.into_iter().collect(),
                    None => Vec::new(),
                };
                classifier.classify_with_votes(&bookmark, extra)
            });
            (url, handle)
        })
        .collect();

    let mut classified = Vec::with_capacity(total);
    for (i, (url, handle)) in handles.into_iter().enumerate() {
        match handle.await {
            Ok(result) => classified.push(result),
            Err(e) => {
                warn!(%url, error = %e, "classification task failed, skipping");
                stats.errors += 1;
            }
        }
        progress.bookmark_classified(i + 1, total);
    }
    classified
}

// ---------------------------------------------------------------------------
// Training + stats
// ---------------------------------------------------------------------------

/// Retrain the model from confident results and save it.
fn train_model(config: &ProcessConfig, classified: &[ClassifiedBookmark]) -> Option<usize> {
    let Some(path) = &config.model_path else {
        warn!("no model path configured, skipping training");
        return None;
    };

    let samples: Vec<(BookmarkFeatures, String)> = classified
        .iter()
        .filter(|c| c.confidence > TRAINING_CONFIDENCE)
        .map(|c| {
            (
                BookmarkFeatures::extract(&c.bookmark.url, &c.bookmark.title),
                c.category.clone(),
            )
        })
        .collect();

    let mut model = NaiveBayes::default().with_order(config.rules.category_order.clone());
    let trained = match model.train(&samples) {
        Ok(n) => n,
        Err(e) => {
            warn!(error = %e, "skipping model training");
            return None;
        }
    };
    match model.save(path) {
        Ok(()) => {
            info!(samples = trained, path = %path.display(), "model saved");
            Some(trained)
        }
        Err(e) => {
            warn!(error = %e, "failed to save model");
            None
        }
    }
}

fn fill_stats(stats: &mut ProcessingStats, classified: &[ClassifiedBookmark]) {
    stats.processed_bookmarks = classified.len();

    let mut categories: BTreeMap<String, usize> = BTreeMap::new();
    let mut methods: BTreeMap<String, usize> = BTreeMap::new();
    for item in classified {
        *categories.entry(item.category.clone()).or_default() += 1;
        for tag in item.method.split('+') {
            *methods.entry(tag.to_string()).or_default() += 1;
        }
    }
    stats.categories_found = categories;
    stats.method_counts = methods;
    stats.average_confidence = if classified.is_empty() {
        0.0
    } else {
        classified.iter().map(|c| c.confidence).sum::<f64>() / classified.len() as f64
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    const FIXTURE: &str = "../../../fixtures/html/bookmarks.fixture.html";

    fn scratch(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("cleanbook-{name}-{}", uuid::Uuid::now_v7()))
    }

    fn config(output: &Path) -> ProcessConfig {
        let mut config = ProcessConfig::new(vec![PathBuf::from(FIXTURE)], output, RulesConfig::default());
        config.use_ml = false;
        config
    }

    #[derive(Default)]
    struct Recorder {
        phases: Mutex<Vec<String>>,
        classified: Mutex<Vec<usize>>,
        files: Mutex<usize>,
    }

    impl ProgressReporter for Recorder {
        fn phase(&self, name: &str) {
            self.phases.lock().expect("lock").push(name.to_string());
        }
        fn file_loaded(&self, _path: &Path, _bookmarks: usize, _current: usize, _total: usize) {
            *self.files.lock().expect("lock") += 1;
        }
        fn bookmark_classified(&self, current: usize, _total: usize) {
            self.classified.lock().expect("lock").push(current);
        }
        fn done(&self, _result: &ProcessResult) {}
    }

    #[tokio::test]
    async fn processes_fixture_end_to_end() {
        let out = scratch("process");
        let recorder = Recorder::default();
        let result = process(config(&out), &recorder).await.expect("process");

        assert_eq!(result.stats.files_processed, 1);
        assert_eq!(result.stats.total_bookmarks, 7);
        assert_eq!(result.stats.duplicates_removed, 1);
        assert_eq!(result.stats.processed_bookmarks, 6);
        assert_eq!(result.tree.total_bookmarks(), 6);
        assert_eq!(result.outputs.len(), 3);
        for path in &result.outputs {
            assert!(path.exists(), "missing {}", path.display());
        }

        assert!(result.stats.average_confidence >= 0.0 && result.stats.average_confidence <= 1.0);
        for item in result.tree.iter_bookmarks() {
            assert!((0.0..=1.0).contains(&item.confidence));
        }

        assert_eq!(*recorder.files.lock().expect("lock"), 1);
        assert_eq!(*recorder.classified.lock().expect("lock"), vec![1, 2, 3, 4, 5, 6]);
        assert!(recorder.phases.lock().expect("lock").iter().any(|p| p == "Exporting"));

        let _ = std::fs::remove_dir_all(&out);
    }

    #[tokio::test]
    async fn repeated_runs_assign_the_same_categories() {
        let out = scratch("determinism");
        let first = process(config(&out), &SilentProgress).await.expect("first run");
        let second = process(config(&out), &SilentProgress).await.expect("second run");

        let assignments = |r: &ProcessResult| -> Vec<(String, String)> {
            let mut v: Vec<_> = r
                .tree
                .iter_bookmarks()
                .map(|c| (c.bookmark.url.clone(), c.category.clone()))
                .collect();
            v.sort();
            v
        };
        assert_eq!(assignments(&first), assignments(&second));

        let _ = std::fs::remove_dir_all(&out);
    }

    #[tokio::test]
    async fn missing_input_is_an_error() {
        let mut config = config(&scratch("missing"));
        config.inputs = vec![PathBuf::from("does/not/exist.html")];
        let err = process(config, &SilentProgress).await.unwrap_err();
        assert!(matches!(err, CleanbookError::Validation { .. }));
    }

    #[tokio::test]
    async fn llm_without_key_falls_back() {
        let out = scratch("nollm");
        let mut config = config(&out);
        config.use_llm = true;
        config.llm_organize = true;
        config.rules.llm.enable = true;
        config.rules.llm.api_key_env = "CLEANBOOK_TEST_KEY_THAT_IS_NEVER_SET".into();

        let result = process(config, &SilentProgress).await.expect("process");
        assert!(result.llm.is_none());
        assert!(!result.llm_organized);
        assert_eq!(result.stats.processed_bookmarks, 6);

        let _ = std::fs::remove_dir_all(&out);
    }

    #[tokio::test]
    async fn training_needs_enough_samples() {
        let out = scratch("train");
        let mut config = config(&out);
        config.train = true;
        config.model_path = Some(out.join("model.json"));

        let result = process(config, &SilentProgress).await.expect("process");
        assert!(result.trained_samples.is_none());
        assert!(!out.join("model.json").exists());

        let _ = std::fs::remove_dir_all(&out);
    }

    #[test]
    fn stats_count_each_method_tag() {
        let mut a = ClassifiedBookmark::fallback(Bookmark::new("https://a.com", "a"), "none");
        a.method = "rule_engine+semantic".into();
        a.confidence = 0.8;
        let b = ClassifiedBookmark::fallback(Bookmark::new("https://b.com", "b"), "none");

        let mut stats = ProcessingStats::default();
        fill_stats(&mut stats, &[a, b]);
        assert_eq!(stats.processed_bookmarks, 2);
        assert_eq!(stats.method_counts.get("rule_engine"), Some(&1));
        assert_eq!(stats.method_counts.get("fallback"), Some(&1));
        assert!((stats.average_confidence - 0.4).abs() < 1e-9);
    }
}

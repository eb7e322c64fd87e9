//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use cleanbook_core::pipeline::{ProcessConfig, ProcessResult, ProgressReporter};
use cleanbook_core::{Feedback, LearnTargets};
use cleanbook_dedup::Deduplicator;
use cleanbook_export::ExportFormat;
use cleanbook_health::{HealthChecker, HealthConfig, HealthSummary, summarize};
use cleanbook_shared::{AppConfig, Bookmark, RulesConfig, init_config, load_config};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// CleanBook: sort, deduplicate and export browser bookmarks.
#[derive(Parser)]
#[command(
    name = "cleanbook",
    version,
    about = "Classify, deduplicate and export browser bookmark files.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Classify bookmark files and export the organized result.
    Process {
        /// Bookmark HTML files or directories containing them.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Rules JSON file (defaults to `rules_path` from the app config).
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output directory.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Concurrent classification workers.
        #[arg(short, long)]
        workers: Option<usize>,

        /// Export formats (comma-separated): html, json, markdown, csv, xml, opml.
        #[arg(long, value_delimiter = ',')]
        formats: Option<Vec<String>>,

        /// Do not use the saved naive Bayes model.
        #[arg(long)]
        no_ml: bool,

        /// Ask the configured LLM for an extra vote per bookmark.
        #[arg(long)]
        llm: bool,

        /// Let the LLM reorganize the final category tree.
        #[arg(long)]
        organize: bool,

        /// Retrain the model from this run's confident results.
        #[arg(long)]
        train: bool,

        /// Fetch page titles for bookmarks whose title is just the URL.
        #[arg(long)]
        fetch_titles: bool,

        /// Always run the near-duplicate pass.
        #[arg(long)]
        near_dedup: bool,
    },

    /// Check whether bookmarked links still respond.
    Health {
        /// Bookmark HTML files or directories containing them.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Maximum concurrent requests.
        #[arg(long)]
        concurrency: Option<usize>,

        /// Per-request timeout in seconds.
        #[arg(long)]
        timeout: Option<u64>,

        /// Print the full report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Teach the user profile the right category for a bookmark.
    Learn {
        #[arg(long)]
        url: String,

        #[arg(long, default_value = "")]
        title: String,

        #[arg(long)]
        category: String,

        /// Rules JSON file.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Rules file management.
    Rules {
        #[command(subcommand)]
        action: RulesAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Rules subcommands.
#[derive(Subcommand)]
pub(crate) enum RulesAction {
    /// Check a rules file for problems.
    Validate {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "cleanbook=info",
        1 => "cleanbook=debug",
        _ => "cleanbook=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Process {
            inputs,
            config,
            output,
            workers,
            formats,
            no_ml,
            llm,
            organize,
            train,
            fetch_titles,
            near_dedup,
        } => {
            let flags = ProcessFlags {
                use_ml: !no_ml,
                llm,
                organize,
                train,
                fetch_titles,
                near_dedup,
            };
            cmd_process(inputs, config, output, workers, formats, flags).await
        }
        Command::Health {
            inputs,
            concurrency,
            timeout,
            json,
        } => cmd_health(&inputs, concurrency, timeout, json).await,
        Command::Learn {
            url,
            title,
            category,
            config,
        } => cmd_learn(url, title, category, config.as_deref()),
        Command::Rules { action } => match action {
            RulesAction::Validate { config } => cmd_rules_validate(config.as_deref()),
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

/// Rules path from the flag, else from the app config.
fn load_rules(config: &AppConfig, path: Option<&Path>) -> Result<RulesConfig> {
    let path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(&config.defaults.rules_path));
    Ok(RulesConfig::load(&path)?)
}

// ---------------------------------------------------------------------------
// process
// ---------------------------------------------------------------------------

struct ProcessFlags {
    use_ml: bool,
    llm: bool,
    organize: bool,
    train: bool,
    fetch_titles: bool,
    near_dedup: bool,
}

async fn cmd_process(
    inputs: Vec<PathBuf>,
    rules_path: Option<PathBuf>,
    output: Option<PathBuf>,
    workers: Option<usize>,
    formats: Option<Vec<String>>,
    flags: ProcessFlags,
) -> Result<()> {
    let app = load_config()?;
    let rules = load_rules(&app, rules_path.as_deref())?;

    let formats = ExportFormat::parse_list(formats.as_deref().unwrap_or(&app.defaults.formats))?;
    if formats.is_empty() {
        return Err(eyre!("no export formats selected"));
    }
    let workers = workers.unwrap_or(app.defaults.workers);
    if workers == 0 {
        return Err(eyre!("--workers must be at least 1"));
    }
    if (flags.llm || flags.organize) && !rules.llm.enable {
        warn!("LLM features requested but `llm.enable` is false in the rules file");
    }

    let output_dir = output.unwrap_or_else(|| PathBuf::from(&app.defaults.output_dir));
    let mut config = ProcessConfig::new(inputs, output_dir, rules);
    config.workers = workers;
    config.formats = formats;
    config.use_ml = flags.use_ml;
    config.use_llm = flags.llm;
    config.llm_organize = flags.organize;
    config.train = flags.train;
    config.fetch_titles = flags.fetch_titles;
    config.near_dedup = flags.near_dedup;
    config.profile_path = Some(PathBuf::from(&app.defaults.profile_path));
    config.model_path = Some(PathBuf::from(&app.defaults.model_path));
    config.health = app.health.clone();

    info!(
        inputs = config.inputs.len(),
        output = %config.output_dir.display(),
        workers,
        "processing bookmarks"
    );

    let reporter = CliProgress::new();
    let result = cleanbook_core::process(config, &reporter).await?;
    print_process_summary(&result);
    Ok(())
}

fn print_process_summary(result: &ProcessResult) {
    let stats = &result.stats;
    println!();
    println!("  Bookmarks processed!");
    println!("  Run:         {}", result.run_id);
    println!("  Files:       {}", stats.files_processed);
    println!("  Bookmarks:   {}", stats.total_bookmarks);
    println!("  Duplicates:  {}", stats.duplicates_removed);
    println!("  Classified:  {}", stats.processed_bookmarks);
    println!("  Categories:  {}", result.tree.categories.len());
    println!("  Confidence:  {:.2} avg", stats.average_confidence);
    if result.classifier.low_confidence > 0 {
        println!("  Uncertain:   {} below threshold", result.classifier.low_confidence);
    }
    if stats.errors > 0 {
        println!("  Errors:      {}", stats.errors);
    }
    if let Some(llm) = &result.llm {
        println!(
            "  LLM:         {} calls, {} cached, {} failed",
            llm.calls, llm.cache_hits, llm.failures
        );
    }
    if result.llm_organized {
        println!("  Organizer:   LLM plan applied");
    }
    if let Some(samples) = result.trained_samples {
        println!("  Model:       retrained on {samples} samples");
    }
    println!(
        "  Time:        {:.1}s ({:.0} bookmarks/s)",
        result.elapsed.as_secs_f64(),
        stats.throughput()
    );
    for path in &result.outputs {
        println!("  Output:      {}", path.display());
    }
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using indicatif spinners.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn file_loaded(&self, path: &Path, bookmarks: usize, current: usize, total: usize) {
        self.spinner.set_message(format!(
            "Loaded [{current}/{total}] {} ({bookmarks} bookmarks)",
            path.display()
        ));
    }

    fn bookmark_classified(&self, current: usize, total: usize) {
        if current == total || current % 25 == 0 {
            self.spinner
                .set_message(format!("Classifying [{current}/{total}]"));
        }
    }

    fn done(&self, _result: &ProcessResult) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// health
// ---------------------------------------------------------------------------

async fn cmd_health(
    inputs: &[PathBuf],
    concurrency: Option<usize>,
    timeout: Option<u64>,
    json: bool,
) -> Result<()> {
    let app = load_config()?;
    let mut health = HealthConfig::from(&app.health);
    if let Some(n) = concurrency {
        health.concurrency = n.max(1);
    }
    if let Some(secs) = timeout {
        health.timeout_secs = secs.max(1);
    }

    let bookmarks = load_bookmarks(inputs).await?;
    if bookmarks.is_empty() {
        return Err(eyre!("no valid bookmarks found in the given inputs"));
    }

    info!(
        count = bookmarks.len(),
        concurrency = health.concurrency,
        timeout_secs = health.timeout_secs,
        "checking link health"
    );

    let spinner = CliProgress::new();
    spinner.phase(&format!("Checking {} links", bookmarks.len()));
    let checker = HealthChecker::new(health)?;
    let reports = checker.check(&bookmarks).await;
    spinner.spinner.finish_and_clear();

    let summary = summarize(&reports);
    if json {
        let doc = serde_json::json!({ "summary": summary, "reports": reports });
        println!("{}", serde_json::to_string_pretty(&doc)?);
    } else {
        print_health_summary(&summary);
    }
    Ok(())
}

/// Load, parse and exact-dedupe every input file.
async fn load_bookmarks(inputs: &[PathBuf]) -> Result<Vec<Bookmark>> {
    let files = cleanbook_importer::collect_inputs(inputs)?;
    let mut bookmarks = Vec::new();
    for file in &files {
        match cleanbook_importer::load_file(file).await {
            Ok(loaded) => bookmarks.extend(loaded),
            Err(e) => warn!(path = %file.display(), error = %e, "failed to load file, skipping"),
        }
    }
    Ok(Deduplicator::default().dedupe_exact(bookmarks).unique)
}

fn print_health_summary(summary: &HealthSummary) {
    println!();
    println!("  Link health");
    println!("  Checked:     {}", summary.total);
    println!(
        "  Accessible:  {} ({:.1}%)",
        summary.accessible,
        summary.accessibility_rate * 100.0
    );
    println!("  Avg time:    {:.0} ms", summary.average_response_ms);
    for (status, count) in &summary.status_distribution {
        println!("  {status:<12} {count}");
    }
    if !summary.common_errors.is_empty() {
        println!();
        println!("  Common errors:");
        for (error, count) in &summary.common_errors {
            println!("    {count:>4}  {error}");
        }
    }
    if !summary.broken_links.is_empty() {
        println!();
        println!("  Broken links:");
        for report in &summary.broken_links {
            println!("    {}  {}", report.status, report.url);
        }
    }
    if !summary.slow_links.is_empty() {
        println!();
        println!("  Slow links:");
        for report in &summary.slow_links {
            println!("    {:>6} ms  {}", report.response_time_ms, report.url);
        }
    }
    println!();
}

// ---------------------------------------------------------------------------
// learn / rules / config
// ---------------------------------------------------------------------------

fn cmd_learn(url: String, title: String, category: String, rules_path: Option<&Path>) -> Result<()> {
    let app = load_config()?;
    let rules = load_rules(&app, rules_path)?;
    let targets = LearnTargets {
        profile_path: PathBuf::from(&app.defaults.profile_path),
        model_path: Some(PathBuf::from(&app.defaults.model_path)),
    };
    let feedback = Feedback {
        url,
        title,
        category,
        confidence: 1.0,
    };

    let outcome = cleanbook_core::learn(&feedback, &rules, &targets)?;
    println!(
        "Recorded '{}' as {} ({} interactions in profile)",
        feedback.url, feedback.category, outcome.interactions
    );
    if outcome.model_updated {
        println!("Saved model updated.");
    }
    if outcome.unknown_category {
        println!("Note: '{}' is not a category in the rules file.", feedback.category);
    }
    Ok(())
}

fn cmd_rules_validate(rules_path: Option<&Path>) -> Result<()> {
    let app = load_config()?;
    let rules = load_rules(&app, rules_path)?;
    let problems = cleanbook_classifier::validate_rules(&rules);

    let rule_count: usize = rules.category_rules.values().map(|c| c.rules.len()).sum();
    println!(
        "{} categories, {rule_count} rules, {} ordered",
        rules.category_rules.len(),
        rules.category_order.len()
    );

    if problems.is_empty() {
        println!("Rules OK");
        return Ok(());
    }
    for problem in &problems {
        println!("  - {problem}");
    }
    Err(eyre!("{} problem(s) found in rules", problems.len()))
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_process_flags() {
        let cli = Cli::try_parse_from([
            "cleanbook",
            "-vv",
            "process",
            "a.html",
            "dir",
            "-o",
            "out",
            "--formats",
            "html,csv",
            "--no-ml",
            "--near-dedup",
        ])
        .expect("parse");

        assert_eq!(cli.verbose, 2);
        let Command::Process {
            inputs,
            output,
            formats,
            no_ml,
            near_dedup,
            llm,
            ..
        } = cli.command
        else {
            panic!("expected process");
        };
        assert_eq!(inputs, vec![PathBuf::from("a.html"), PathBuf::from("dir")]);
        assert_eq!(output, Some(PathBuf::from("out")));
        assert_eq!(formats, Some(vec!["html".to_string(), "csv".to_string()]));
        assert!(no_ml && near_dedup && !llm);
    }

    #[test]
    fn process_requires_inputs() {
        assert!(Cli::try_parse_from(["cleanbook", "process"]).is_err());
    }

    #[test]
    fn parses_rules_validate() {
        let cli = Cli::try_parse_from(["cleanbook", "--log-format", "json", "rules", "validate", "-c", "r.json"])
            .expect("parse");
        assert!(matches!(cli.log_format, LogFormat::Json));
        assert!(matches!(
            cli.command,
            Command::Rules {
                action: RulesAction::Validate { config: Some(_) }
            }
        ));
    }

    #[test]
    fn rules_fixture_validates() {
        let app = AppConfig::default();
        let rules = load_rules(&app, Some(Path::new("../../fixtures/json/rules.fixture.json")))
            .expect("fixture rules");
        assert!(cleanbook_classifier::validate_rules(&rules).is_empty());
        assert!(rules.llm.organizer.enable.is_none());
    }
}

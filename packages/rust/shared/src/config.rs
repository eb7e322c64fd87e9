//! Application configuration for CleanBook.
//!
//! User config lives at `~/.cleanbook/cleanbook.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CleanbookError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "cleanbook.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".cleanbook";

// ---------------------------------------------------------------------------
// Config structs (matching cleanbook.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults for `process`.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Link health check settings.
    #[serde(default)]
    pub health: HealthSettings,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Directory exports are written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Concurrent classification workers.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Rules JSON document.
    #[serde(default = "default_rules_path")]
    pub rules_path: String,

    /// Export formats written when `--formats` is not given.
    #[serde(default = "default_formats")]
    pub formats: Vec<String>,

    /// Learned user profile (JSON).
    #[serde(default = "default_profile_path")]
    pub profile_path: String,

    /// Naive Bayes model (JSON).
    #[serde(default = "default_model_path")]
    pub model_path: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            workers: default_workers(),
            rules_path: default_rules_path(),
            formats: default_formats(),
            profile_path: default_profile_path(),
            model_path: default_model_path(),
        }
    }
}

fn default_output_dir() -> String {
    "output".into()
}
fn default_workers() -> usize {
    4
}
fn default_rules_path() -> String {
    "config.json".into()
}
fn default_formats() -> Vec<String> {
    vec!["html".into(), "json".into(), "markdown".into()]
}
fn default_profile_path() -> String {
    "models/user_profile.json".into()
}
fn default_model_path() -> String {
    "models/naive_bayes.json".into()
}

/// `[health]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSettings {
    /// Per-request timeout.
    #[serde(default = "default_health_timeout")]
    pub timeout_secs: u64,

    /// Maximum concurrent requests.
    #[serde(default = "default_health_concurrency")]
    pub concurrency: usize,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_health_timeout(),
            concurrency: default_health_concurrency(),
        }
    }
}

fn default_health_timeout() -> u64 {
    10
}
fn default_health_concurrency() -> usize {
    20
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.cleanbook/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| CleanbookError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.cleanbook/cleanbook.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| CleanbookError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| CleanbookError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| CleanbookError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| CleanbookError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| CleanbookError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("output_dir"));
        assert!(toml_str.contains("timeout_secs"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.defaults.workers, 4);
        assert_eq!(parsed.defaults.formats, vec!["html", "json", "markdown"]);
        assert_eq!(parsed.health.concurrency, 20);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[defaults]
output_dir = "/tmp/sorted"
formats = ["csv", "opml"]
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.defaults.output_dir, "/tmp/sorted");
        assert_eq!(config.defaults.formats, vec!["csv", "opml"]);
        assert_eq!(config.defaults.rules_path, "config.json");
        assert_eq!(config.health.timeout_secs, 10);
    }

    #[test]
    fn load_config_from_reports_bad_toml() {
        let dir = std::env::temp_dir().join(format!("cleanbook-cfg-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).expect("mkdir");
        let path = dir.join("cleanbook.toml");
        std::fs::write(&path, "[defaults\nworkers = ").expect("write");

        let err = load_config_from(&path).expect_err("bad toml must fail");
        assert!(err.to_string().contains("failed to parse"));

        let _ = std::fs::remove_dir_all(&dir);
    }
}

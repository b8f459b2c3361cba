use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::extract::PatternKind;
use crate::github::RetryPolicy;

pub const DEFAULT_CONFIG_FILE: &str = ".comment-harvest.toml";
pub const DEFAULT_API_URL: &str = "https://api.github.com";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid extension tag in config: {0:?} (expected a leading '.')")]
    InvalidExtension(String),
}

/// Top-level configuration loaded from .comment-harvest.toml.
///
/// All fields are optional; the tool works with zero config. Loaded once at
/// startup and passed by reference afterwards.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub extraction: ExtractionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubConfig {
    /// GitHub API token. If None, falls back to GITHUB_TOKEN env var.
    pub token: Option<String>,

    /// Base URL of the REST API.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Retries for transport errors and 5xx responses. Zero means fail-fast.
    #[serde(default)]
    pub max_retries: u32,

    #[serde(default = "default_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: default_api_url(),
            max_retries: 0,
            retry_backoff_ms: default_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Directory the JSON checkpoint files are written into
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtractionConfig {
    /// Replaces the built-in extension allow-list when set
    pub extensions: Option<Vec<String>>,

    /// Per-extension rule overrides for the pull-request (patch) pipeline
    #[serde(default)]
    pub pull_requests: BTreeMap<String, Vec<PatternKind>>,

    /// Per-extension rule overrides for the source-file pipeline
    #[serde(default)]
    pub source_files: BTreeMap<String, Vec<PatternKind>>,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_backoff_ms() -> u64 {
    500
}

fn default_database_path() -> PathBuf {
    PathBuf::from("comment_harvest.db")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Config {
    /// Load configuration from `path`, or from .comment-harvest.toml in the
    /// current directory when no path is given. A missing default file
    /// yields the default config; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load_from(path)?,
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::load_from(path)?
                } else {
                    Config::default()
                }
            }
        };

        if config.github.token.is_none() {
            if let Ok(token) = std::env::var("GITHUB_TOKEN") {
                config.github.token = Some(token);
            }
        }

        Ok(config)
    }

    /// Load from a specific path (useful for testing).
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Config, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let extension_tags = self
            .extraction
            .extensions
            .iter()
            .flatten()
            .chain(self.extraction.pull_requests.keys())
            .chain(self.extraction.source_files.keys());
        for tag in extension_tags {
            if !tag.starts_with('.') {
                return Err(ConfigError::InvalidExtension(tag.clone()));
            }
        }
        Ok(())
    }

    /// The GitHub token from the config file, or from GITHUB_TOKEN when
    /// the file sets none (filled in by [`Config::load`]).
    pub fn github_token(&self) -> Option<String> {
        self.github.token.clone()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.github.max_retries,
            backoff: Duration::from_millis(self.github.retry_backoff_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.github.token.is_none());
        assert_eq!(config.github.api_url, DEFAULT_API_URL);
        assert_eq!(config.github.max_retries, 0);
        assert_eq!(config.database.path, PathBuf::from("comment_harvest.db"));
        assert_eq!(config.output.dir, PathBuf::from("."));
        assert!(config.extraction.extensions.is_none());
    }

    #[test]
    fn test_parse_config_toml() {
        let toml_str = r#"
[github]
api_url = "http://localhost:9000"
max_retries = 3
retry_backoff_ms = 10

[database]
path = "/tmp/harvest.db"

[extraction]
extensions = [".rs", ".py"]

[extraction.pull_requests]
".php" = ["single_line", "multi_line", "html"]

[extraction.source_files]
".sh" = ["hash_line"]
"#;
        let config = Config::parse(toml_str).unwrap();
        assert_eq!(config.github.api_url, "http://localhost:9000");
        assert_eq!(config.database.path, PathBuf::from("/tmp/harvest.db"));
        assert_eq!(config.extraction.extensions.as_ref().unwrap().len(), 2);
        assert_eq!(
            config.extraction.pull_requests[".php"],
            vec![PatternKind::SingleLine, PatternKind::MultiLine, PatternKind::Html]
        );
        assert_eq!(
            config.extraction.source_files[".sh"],
            vec![PatternKind::HashLine]
        );

        let policy = config.retry_policy();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.backoff, Duration::from_millis(10));
    }

    #[test]
    fn test_partial_github_section_keeps_defaults() {
        let config = Config::parse("[github]\ntoken = \"abc\"\n").unwrap();
        assert_eq!(config.github.token.as_deref(), Some("abc"));
        assert_eq!(config.github.api_url, DEFAULT_API_URL);
        assert_eq!(config.github.retry_backoff_ms, 500);
    }

    #[test]
    fn test_rejects_extension_without_dot() {
        let err = Config::parse("[extraction]\nextensions = [\"py\"]\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidExtension(tag) if tag == "py"));
    }

    #[test]
    fn test_rejects_unknown_pattern_kind() {
        let toml_str = "[extraction.source_files]\n\".py\" = [\"semicolon\"]\n";
        assert!(matches!(Config::parse(toml_str), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_github_token_reads_loaded_value_only() {
        let config = Config::parse("[github]\ntoken = \"from-file\"\n").unwrap();
        assert_eq!(config.github_token().as_deref(), Some("from-file"));

        // The environment fallback happens once, in load(); a parsed config
        // without a token stays without one.
        let config = Config::parse("").unwrap();
        assert!(config.github_token().is_none());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harvest.toml");
        std::fs::write(&path, "[output]\ndir = \"out\"\n").unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.output.dir, PathBuf::from("out"));
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            Config::load(Some(missing.as_path())),
            Err(ConfigError::FileRead(_))
        ));
    }
}

use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;
use std::env;
use std::fmt;

#[derive(Clone, Deserialize)]
pub struct AppConfig {
    /// Flywheel API key. `FLYWHEEL_API_KEY` in the environment wins over the file.
    #[serde(default)]
    pub api_key: String,
    /// Prefix of the project label to deposit into.
    pub project: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Substring identifying the subject token in an entry path.
    #[serde(default = "default_subject_marker")]
    pub subject_marker: String,
    /// Glob patterns for archive entries to skip entirely.
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
    /// Worker threads for subject processing. 0 or 1 means sequential.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Optional CSV file receiving per-group outcomes after a run.
    #[serde(default)]
    pub report_path: Option<String>,
}

fn default_api_base_url() -> String {
    "https://api.flywheel.io".to_string()
}

fn default_subject_marker() -> String {
    "NACC".to_string()
}

fn default_max_workers() -> usize {
    1
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_connect_timeout_secs() -> u64 {
    15
}

fn default_request_timeout_secs() -> u64 {
    60
}

pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Courier").required(false))
        .add_source(Environment::with_prefix("COURIER"))
        .build()?;
    let mut cfg = builder.try_deserialize::<AppConfig>()?;

    if let Ok(key) = env::var("FLYWHEEL_API_KEY") {
        if !key.is_empty() {
            cfg.api_key = key;
        }
    }

    Ok(cfg)
}

// API key never goes to logs or `print-config` output.
impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &"<redacted>")
            .field("project", &self.project)
            .field("api_base_url", &self.api_base_url)
            .field("subject_marker", &self.subject_marker)
            .field("ignore_patterns", &self.ignore_patterns)
            .field("max_workers", &self.max_workers)
            .field("retry_attempts", &self.retry_attempts)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("report_path", &self.report_path)
            .finish()
    }
}

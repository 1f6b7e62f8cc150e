//! Worker process configuration.
//!
//! One [`WorkerConfig`] is built at process startup (usually via
//! [`WorkerConfig::from_env`]) and injected into the
//! [`WorkerContext`](crate::context::WorkerContext); no component reads
//! environment variables after that point.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    /// Directory for fetched temp files.
    pub temp_dir: PathBuf,
    /// Hard cap on a resolved file's size, in bytes.
    pub max_temp_file_size: u64,
    /// Whether scope guards delete tracked temp files on exit.
    pub auto_cleanup_temp_files: bool,
    /// Worker-pool width used when a task does not declare one.
    pub default_parallelism: usize,
    /// Confirmed completions between two progress callbacks.
    pub progress_report_interval: usize,
    /// Base URL of the system of record receiving progress callbacks.
    pub callback_base_url: String,
    /// Per-request timeout for progress callbacks.
    pub callback_timeout: Duration,
    /// Retry budget for one progress callback before it is dropped.
    pub callback_retries: usize,
    /// Key prefix for task liveness records.
    pub state_key_prefix: String,
    /// TTL on liveness records; orphans from unclean death self-expire.
    pub state_ttl: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            temp_dir: PathBuf::from("./uploads/tmp"),
            max_temp_file_size: 100 * 1024 * 1024,
            auto_cleanup_temp_files: true,
            default_parallelism: 3,
            progress_report_interval: 10,
            callback_base_url: "http://127.0.0.1:8000".to_string(),
            callback_timeout: Duration::from_secs(5),
            callback_retries: 3,
            state_key_prefix: "doc:parse".to_string(),
            state_ttl: Duration::from_secs(86_400),
        }
    }
}

impl WorkerConfig {
    /// Build a config from the environment, falling back to defaults.
    ///
    /// Reads a `.env` file if present. Recognized variables:
    /// `VECTORLOOM_TEMP_DIR`, `VECTORLOOM_MAX_TEMP_FILE_SIZE`,
    /// `VECTORLOOM_AUTO_CLEANUP`, `VECTORLOOM_PARALLELISM`,
    /// `VECTORLOOM_PROGRESS_INTERVAL`, `VECTORLOOM_CALLBACK_BASE_URL`,
    /// `VECTORLOOM_CALLBACK_TIMEOUT_SECS`, `VECTORLOOM_CALLBACK_RETRIES`,
    /// `VECTORLOOM_STATE_KEY_PREFIX`, `VECTORLOOM_STATE_TTL_SECS`.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();
        Self {
            temp_dir: env_var("VECTORLOOM_TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.temp_dir),
            max_temp_file_size: env_parsed("VECTORLOOM_MAX_TEMP_FILE_SIZE")
                .unwrap_or(defaults.max_temp_file_size),
            auto_cleanup_temp_files: env_var("VECTORLOOM_AUTO_CLEANUP")
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(defaults.auto_cleanup_temp_files),
            default_parallelism: env_parsed("VECTORLOOM_PARALLELISM")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.default_parallelism),
            progress_report_interval: env_parsed("VECTORLOOM_PROGRESS_INTERVAL")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.progress_report_interval),
            callback_base_url: env_var("VECTORLOOM_CALLBACK_BASE_URL")
                .unwrap_or(defaults.callback_base_url),
            callback_timeout: env_parsed("VECTORLOOM_CALLBACK_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.callback_timeout),
            callback_retries: env_parsed("VECTORLOOM_CALLBACK_RETRIES")
                .unwrap_or(defaults.callback_retries),
            state_key_prefix: env_var("VECTORLOOM_STATE_KEY_PREFIX")
                .unwrap_or(defaults.state_key_prefix),
            state_ttl: env_parsed("VECTORLOOM_STATE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.state_ttl),
        }
    }

    #[must_use]
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    #[must_use]
    pub fn with_callback_base_url(mut self, url: impl Into<String>) -> Self {
        self.callback_base_url = url.into();
        self
    }

    #[must_use]
    pub fn with_default_parallelism(mut self, parallelism: usize) -> Self {
        self.default_parallelism = parallelism.max(1);
        self
    }

    #[must_use]
    pub fn with_progress_report_interval(mut self, interval: usize) -> Self {
        self.progress_report_interval = interval.max(1);
        self
    }

    #[must_use]
    pub fn with_state_ttl(mut self, ttl: Duration) -> Self {
        self.state_ttl = ttl;
        self
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    env_var(name).and_then(|v| v.parse().ok())
}

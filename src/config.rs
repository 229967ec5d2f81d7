use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where job records, candidates and clones are stored
    pub data_dir: PathBuf,
    /// Server bind address
    pub bind_addr: String,
    /// GitHub API client configuration
    pub github: GitHubConfig,
    /// Deliberate delays between remote calls
    pub pacing: PacingConfig,
    /// Per-repository clone timeout in seconds
    pub clone_timeout_secs: u64,
    /// Bearer secret required by the cron trigger (open when unset)
    pub cron_secret: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// REST API base URL, without trailing slash
    pub api_base: String,
    /// Personal access token. Anonymous access is limited to 60 requests/hour.
    pub token: Option<String>,
    /// Total attempts per request for transient failures
    pub max_retries: u32,
    /// Base backoff; attempt `n` waits `n * retry_delay_ms`
    pub retry_delay_ms: u64,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            token: None,
            max_retries: 3,
            retry_delay_ms: 1000,
            request_timeout_secs: 120,
        }
    }
}

impl GitHubConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Backpressure against the search API's rate limiter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingConfig {
    pub query_delay_ms: u64,
    pub metadata_delay_ms: u64,
    pub clone_delay_ms: u64,
    pub backfill_delay_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            query_delay_ms: 500,
            metadata_delay_ms: 200,
            clone_delay_ms: 1000,
            backfill_delay_ms: 400,
        }
    }
}

impl PacingConfig {
    /// No delays at all. Used by tests driving the scanner against fakes.
    pub fn none() -> Self {
        Self {
            query_delay_ms: 0,
            metadata_delay_ms: 0,
            clone_delay_ms: 0,
            backfill_delay_ms: 0,
        }
    }

    pub fn query_delay(&self) -> Duration {
        Duration::from_millis(self.query_delay_ms)
    }

    pub fn metadata_delay(&self) -> Duration {
        Duration::from_millis(self.metadata_delay_ms)
    }

    pub fn clone_delay(&self) -> Duration {
        Duration::from_millis(self.clone_delay_ms)
    }

    pub fn backfill_delay(&self) -> Duration {
        Duration::from_millis(self.backfill_delay_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            bind_addr: "127.0.0.1:9000".to_string(),
            github: GitHubConfig::default(),
            pacing: PacingConfig::default(),
            clone_timeout_secs: 120,
            cron_secret: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("VIBE_RADAR_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(addr) = std::env::var("VIBE_RADAR_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(token) = std::env::var("GITHUB_TOKEN") {
            if !token.trim().is_empty() {
                config.github.token = Some(token);
            }
        }
        if let Ok(url) = std::env::var("GITHUB_API_BASE") {
            config.github.api_base = url.trim_end_matches('/').to_string();
        }
        if let Ok(val) = std::env::var("GITHUB_MAX_RETRIES") {
            if let Ok(v) = val.parse::<u32>() {
                config.github.max_retries = v.max(1);
            }
        }
        if let Ok(val) = std::env::var("GITHUB_RETRY_DELAY_MS") {
            if let Ok(v) = val.parse() {
                config.github.retry_delay_ms = v;
            }
        }
        if let Ok(val) = std::env::var("VIBE_RADAR_QUERY_DELAY_MS") {
            if let Ok(v) = val.parse() {
                config.pacing.query_delay_ms = v;
            }
        }
        if let Ok(val) = std::env::var("VIBE_RADAR_METADATA_DELAY_MS") {
            if let Ok(v) = val.parse() {
                config.pacing.metadata_delay_ms = v;
            }
        }
        if let Ok(val) = std::env::var("VIBE_RADAR_CLONE_DELAY_MS") {
            if let Ok(v) = val.parse() {
                config.pacing.clone_delay_ms = v;
            }
        }
        if let Ok(val) = std::env::var("VIBE_RADAR_CLONE_TIMEOUT_SECS") {
            if let Ok(v) = val.parse() {
                config.clone_timeout_secs = v;
            }
        }
        if let Ok(secret) = std::env::var("CRON_SECRET") {
            if !secret.is_empty() {
                config.cron_secret = Some(secret);
            }
        }

        config
    }

    pub fn repos_dir(&self) -> PathBuf {
        self.data_dir.join("repos")
    }

    pub fn jobs_path(&self) -> PathBuf {
        self.data_dir.join("jobs.json")
    }

    pub fn candidates_path(&self) -> PathBuf {
        self.data_dir.join("candidates.json")
    }

    pub fn clone_timeout(&self) -> Duration {
        Duration::from_secs(self.clone_timeout_secs)
    }
}

use std::{path::PathBuf, str::FromStr, time::Duration};

use crate::error::{Result, TelemetryError};

pub const DEFAULT_INGEST_URL: &str = "http://localhost:3000/api/analytics/events";
pub const DEFAULT_FAILURE_STORE_KEY: &str = "mailpulse.failed_events";
pub const DEFAULT_SESSION_KEY: &str = "mailpulse.session";

pub const DEFAULT_FLUSH_THRESHOLD: usize = 10;
pub const DEFAULT_FLUSH_DELAY: Duration = Duration::from_millis(2000);
pub const DEFAULT_UNLOAD_DEADLINE: Duration = Duration::from_millis(1500);

/// Order of clearing the failure store relative to the startup retry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RetryStrategy {
    /// Clear before sending. A crash mid-retry loses the recovered events.
    #[default]
    ClearBeforeSend,
    /// Leave events stored until the retry is delivered. A crash mid-retry
    /// may deliver them twice.
    ClearAfterDelivery,
}

#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    pub ingest_url: String,
    pub flush_threshold: usize,
    pub flush_delay: Duration,
    pub unload_deadline: Duration,
    pub failure_store_key: String,
    pub session_key: String,
    pub storage_dir: PathBuf,
    pub retry_strategy: RetryStrategy,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            ingest_url: DEFAULT_INGEST_URL.to_string(),
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            flush_delay: DEFAULT_FLUSH_DELAY,
            unload_deadline: DEFAULT_UNLOAD_DEADLINE,
            failure_store_key: DEFAULT_FAILURE_STORE_KEY.to_string(),
            session_key: DEFAULT_SESSION_KEY.to_string(),
            storage_dir: default_storage_dir(),
            retry_strategy: RetryStrategy::default(),
        }
    }
}

pub fn default_storage_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("mailpulse")
}

impl TelemetryConfig {
    /// Defaults overlaid with `MAILPULSE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut cfg = Self::default();

        if let Some(url) = lookup("MAILPULSE_INGEST_URL") {
            cfg.ingest_url = url;
        }
        if let Some(raw) = lookup("MAILPULSE_FLUSH_THRESHOLD") {
            cfg.flush_threshold = parse_var("MAILPULSE_FLUSH_THRESHOLD", &raw)?;
        }
        if let Some(raw) = lookup("MAILPULSE_FLUSH_DELAY_MS") {
            cfg.flush_delay = Duration::from_millis(parse_var("MAILPULSE_FLUSH_DELAY_MS", &raw)?);
        }
        if let Some(raw) = lookup("MAILPULSE_UNLOAD_DEADLINE_MS") {
            cfg.unload_deadline =
                Duration::from_millis(parse_var("MAILPULSE_UNLOAD_DEADLINE_MS", &raw)?);
        }
        if let Some(dir) = lookup("MAILPULSE_STORAGE_DIR") {
            cfg.storage_dir = PathBuf::from(dir);
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.flush_threshold == 0 {
            return Err(TelemetryError::InvalidConfig {
                reason: "flush_threshold must be > 0".to_string(),
            });
        }
        if self.ingest_url.trim().is_empty() {
            return Err(TelemetryError::InvalidConfig {
                reason: "ingest_url is empty".to_string(),
            });
        }
        if self.failure_store_key.trim().is_empty() {
            return Err(TelemetryError::InvalidConfig {
                reason: "failure_store_key is empty".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| TelemetryError::InvalidConfig {
            reason: format!("{name}={raw:?} is not a valid number"),
        })
}

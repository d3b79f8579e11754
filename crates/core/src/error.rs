use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Transport failed for {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Ingestion endpoint {url} rejected batch with status {status}")]
    Rejected { url: String, status: u16 },

    #[error("Storage failed for key {key}: {reason}")]
    Storage { key: String, reason: String },

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("No tokio runtime available to drive timers and transport")]
    NoRuntime,
}

pub type Result<T> = std::result::Result<T, TelemetryError>;

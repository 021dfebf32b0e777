use std::path::PathBuf;

use thiserror::Error;

/// Failure of a remote weather API call.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to weather API failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("weather API returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to parse weather API response: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Failure of the local store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access store file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to (de)serialize store file {path}: {source}")]
    Serde {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

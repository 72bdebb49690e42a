use reqwest::StatusCode;
use thiserror::Error;

/// Why a backend call produced no usable body.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {path} failed: {source}")]
    Network {
        path: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{path} answered with status {status}: {body}")]
    Status {
        path: &'static str,
        status: StatusCode,
        body: String,
    },

    #[error("failed to parse {path} response: {source}")]
    Parse {
        path: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl FetchError {
    pub fn path(&self) -> &'static str {
        match self {
            FetchError::Network { path, .. }
            | FetchError::Status { path, .. }
            | FetchError::Parse { path, .. } => path,
        }
    }
}

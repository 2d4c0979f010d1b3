use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected HTTP status {status}:\n{body}")]
    Status { status: StatusCode, body: String },
    #[error("invalid media type {0:?}: {1}")]
    InvalidMediaType(String, #[source] reqwest::Error),
}

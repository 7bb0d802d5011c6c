use thiserror::Error;

/// Failures reaching or decoding the remote character catalogue.
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Remote returned HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("Invalid remote configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

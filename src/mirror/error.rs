use thiserror::Error;

/// Per-image download failures. The sync routine logs and skips these.
#[derive(Debug, Error)]
pub enum ImageDownloadError {
    #[error("No image URL for {id}")]
    MissingUrl { id: String },

    #[error("HTTP error {status} downloading {url}")]
    HttpStatus { status: u16, url: String },

    #[error("HTTP error downloading {url} (bytes_so_far={bytes_written}): {source}")]
    Http {
        source: reqwest::Error,
        url: String,
        bytes_written: u64,
    },

    #[error("Disk error: {0}")]
    Disk(#[from] std::io::Error),
}

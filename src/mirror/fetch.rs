use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use super::error::ImageDownloadError;

/// Downloads one image to a destination path.
///
/// Implementations must leave either a complete file or no file at `dest`.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, id: &str, url: &str, dest: &Path) -> Result<(), ImageDownloadError>;
}

/// HTTP fetcher streaming into a `.part` sibling before renaming into place.
#[derive(Debug, Clone)]
pub struct HttpImageFetcher {
    client: Client,
}

impl HttpImageFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, id: &str, url: &str, dest: &Path) -> Result<(), ImageDownloadError> {
        if url.trim().is_empty() {
            return Err(ImageDownloadError::MissingUrl { id: id.to_string() });
        }

        let part = part_path(dest);
        let result = attempt_download(&self.client, url, dest, &part).await;
        if result.is_err() {
            let _ = fs::remove_file(&part).await;
        }
        result
    }
}

/// Single download attempt; the body is fully written before the rename.
async fn attempt_download(
    client: &Client,
    url: &str,
    dest: &Path,
    part: &Path,
) -> Result<(), ImageDownloadError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| ImageDownloadError::Http {
            source: e,
            url: url.to_string(),
            bytes_written: 0,
        })?;

    if !response.status().is_success() {
        return Err(ImageDownloadError::HttpStatus {
            status: response.status().as_u16(),
            url: url.to_string(),
        });
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).await?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(part)
        .await?;

    let mut bytes_written: u64 = 0;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| ImageDownloadError::Http {
            source: e,
            url: url.to_string(),
            bytes_written,
        })?;
        file.write_all(&chunk).await?;
        bytes_written += chunk.len() as u64;
    }
    file.flush().await?;
    drop(file);

    fs::rename(part, dest).await?;
    tracing::debug!(bytes = bytes_written, path = %dest.display(), "Image downloaded");

    Ok(())
}

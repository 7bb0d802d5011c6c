//! Local image mirror.
//!
//! One image per character id lives in the live directory. A sync downloads
//! into a staging directory first, then swaps the staged set into the live
//! directory in one pass so a completed sync never mixes generations for the
//! same id.

pub mod error;
pub mod fetch;

pub use error::ImageDownloadError;
pub use fetch::{HttpImageFetcher, ImageFetcher};

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;

use crate::model;

/// Live image directory name under the data directory.
pub const LIVE_DIR_NAME: &str = "images2";
/// Staging directory name under the data directory.
pub const STAGING_DIR_NAME: &str = "temp_images";

#[derive(Debug, Clone)]
pub struct ImageMirror {
    live_dir: PathBuf,
    staging_dir: PathBuf,
}

impl ImageMirror {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            live_dir: data_dir.join(LIVE_DIR_NAME),
            staging_dir: data_dir.join(STAGING_DIR_NAME),
        }
    }

    pub fn live_dir(&self) -> &Path {
        &self.live_dir
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Live location of the image for `id`. May not exist.
    pub fn image_path(&self, id: &str) -> PathBuf {
        self.live_dir.join(model::image_file_name(id))
    }

    /// Staging location of the image for `id`.
    pub fn staged_path(&self, id: &str) -> PathBuf {
        self.staging_dir.join(model::image_file_name(id))
    }

    /// Recreate an empty staging directory, discarding leftovers from an
    /// interrupted run. The returned guard deletes it when dropped.
    pub async fn prepare_staging(&self) -> io::Result<StagingGuard> {
        match fs::remove_dir_all(&self.staging_dir).await {
            Ok(()) => tracing::debug!(
                path = %self.staging_dir.display(),
                "Removed leftover staging directory"
            ),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        fs::create_dir_all(&self.staging_dir).await?;
        Ok(StagingGuard {
            path: self.staging_dir.clone(),
        })
    }

    /// Replace the live directory's files with the staged ones.
    ///
    /// Every regular file in the live directory is deleted, then each staged
    /// file is moved in, overwriting on conflict. Incomplete `.part` files are
    /// never installed. Returns the number of files installed.
    pub async fn swap_into_live(&self) -> io::Result<usize> {
        fs::create_dir_all(&self.live_dir).await?;

        let mut removed = 0usize;
        let mut entries = fs::read_dir(&self.live_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }

        let mut staged = Vec::new();
        let mut entries = fs::read_dir(&self.staging_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let is_partial = Path::new(&entry.file_name())
                .extension()
                .is_some_and(|ext| ext == "part");
            if !is_partial {
                staged.push(entry);
            }
        }

        for entry in &staged {
            let target = self.live_dir.join(entry.file_name());
            if let Err(e) = fs::rename(entry.path(), &target).await {
                tracing::debug!(
                    error = %e,
                    path = %target.display(),
                    "Rename into live directory failed, copying instead"
                );
                fs::copy(entry.path(), &target).await?;
                fs::remove_file(entry.path()).await?;
            }
        }

        tracing::debug!(removed, installed = staged.len(), "Swapped staged images into live directory");
        Ok(staged.len())
    }
}

/// Deletes the staging directory when dropped, including when the owning
/// task is cancelled mid-sync.
#[derive(Debug)]
pub struct StagingGuard {
    path: PathBuf,
}

impl Drop for StagingGuard {
    fn drop(&mut self) {
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to remove staging directory"
            ),
        }
    }
}

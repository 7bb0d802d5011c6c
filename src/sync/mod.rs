//! Sync routine. Converges the local cache and image mirror with the remote
//! catalogue.
//!
//! Steps run sequentially on the calling task: remote fetch, loading flags
//! on, per-character image download into staging, swap into the live
//! directory, then upsert. Individual image failures are logged and skipped.
//! Any later failure resets the loading flags before propagating.

pub mod error;

pub use error::SyncError;

use std::io::IsTerminal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};

use crate::mirror::{ImageFetcher, ImageMirror};
use crate::model::{self, CachedCharacter, Character};
use crate::remote::RemoteSource;
use crate::store::CharacterStore;

/// Subset of application config consumed by the sync routine.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub show_progress: bool,
}

/// Outcome of a completed synchronization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Characters returned by the remote source with a usable id.
    pub fetched: usize,
    /// Images downloaded and installed into the live directory.
    pub downloaded: usize,
    /// Ids whose image download failed; their rows point at a missing file.
    pub failed_ids: Vec<String>,
    /// Remote ids that cannot name their own image file. Not cached.
    pub skipped_ids: Vec<String>,
}

pub struct Synchronizer {
    remote: Arc<dyn RemoteSource>,
    fetcher: Arc<dyn ImageFetcher>,
    store: Arc<dyn CharacterStore>,
    mirror: ImageMirror,
    options: SyncOptions,
    in_flight: AtomicBool,
}

impl std::fmt::Debug for Synchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synchronizer")
            .field("mirror", &self.mirror)
            .field("in_flight", &self.in_flight.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Clears the single-flight flag when the sync ends or its task is dropped.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Synchronizer {
    pub fn new(
        remote: Arc<dyn RemoteSource>,
        fetcher: Arc<dyn ImageFetcher>,
        store: Arc<dyn CharacterStore>,
        mirror: ImageMirror,
        options: SyncOptions,
    ) -> Self {
        Self {
            remote,
            fetcher,
            store,
            mirror,
            options,
            in_flight: AtomicBool::new(false),
        }
    }

    #[cfg(test)]
    pub fn mirror(&self) -> &ImageMirror {
        &self.mirror
    }

    /// Pull the remote list and converge the cache and image directory.
    ///
    /// Overlapping calls are rejected with [`SyncError::InProgress`].
    pub async fn synchronize(&self) -> Result<SyncReport, SyncError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!("Synchronization requested while another is running");
            return Err(SyncError::InProgress);
        }
        let _in_flight = InFlightGuard(&self.in_flight);
        let started = Instant::now();

        let (remote, unusable): (Vec<Character>, Vec<Character>) = self
            .remote
            .list_characters()
            .await?
            .into_iter()
            .partition(|c| model::is_usable_id(&c.id));
        let skipped_ids: Vec<String> = unusable.into_iter().map(|c| c.id).collect();
        if !skipped_ids.is_empty() {
            tracing::warn!(
                ids = ?skipped_ids,
                "Skipping characters whose id cannot name an image file"
            );
        }

        let mut marked = Vec::new();
        match self.converge(&remote, &mut marked).await {
            Ok(report) => {
                let report = SyncReport {
                    skipped_ids,
                    ..report
                };
                tracing::info!(
                    fetched = report.fetched,
                    downloaded = report.downloaded,
                    failed = report.failed_ids.len(),
                    skipped = report.skipped_ids.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Synchronization complete"
                );
                Ok(report)
            }
            Err(e) => {
                tracing::error!(error = %e, "Synchronization failed, resetting loading flags");
                if let Err(reset) = self.store.set_loading(&marked, false).await {
                    tracing::warn!(error = %reset, "Failed to reset loading flags");
                }
                Err(e)
            }
        }
    }

    /// Steps after the remote fetch. `marked` receives the ids whose loading
    /// flag was raised so the caller can reset them on failure.
    async fn converge(
        &self,
        remote: &[Character],
        marked: &mut Vec<String>,
    ) -> Result<SyncReport, SyncError> {
        let current: Vec<String> = self
            .store
            .get_all()
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect();
        self.store.set_loading(&current, true).await?;
        *marked = current;

        let _staging = self.mirror.prepare_staging().await?;

        let pb = create_progress_bar(self.options.show_progress, remote.len() as u64);
        let mut downloaded = 0usize;
        let mut failed_ids = Vec::new();
        for character in remote {
            pb.set_message(character.name.clone());
            let dest = self.mirror.staged_path(&character.id);
            match self
                .fetcher
                .fetch(&character.id, &character.image_url, &dest)
                .await
            {
                Ok(()) => downloaded += 1,
                Err(e) => {
                    pb.suspend(|| {
                        tracing::warn!(
                            id = %character.id,
                            error = %e,
                            "Image download failed, skipping"
                        );
                    });
                    failed_ids.push(character.id.clone());
                }
            }
            pb.inc(1);
        }
        pb.finish_and_clear();

        let installed = self.mirror.swap_into_live().await?;
        tracing::debug!(installed, "Installed staged images");

        let rows: Vec<CachedCharacter> = remote
            .iter()
            .map(|c| {
                let path = self.mirror.image_path(&c.id);
                CachedCharacter::from_remote(c, path.to_string_lossy().into_owned())
            })
            .collect();
        self.store.upsert_batch(&rows).await?;

        Ok(SyncReport {
            fetched: remote.len(),
            downloaded,
            failed_ids,
            skipped_ids: Vec::new(),
        })
    }
}

/// Progress bar for the download pass; hidden when disabled or when stdout
/// is not a TTY.
fn create_progress_bar(show_progress: bool, total: u64) -> ProgressBar {
    if !show_progress || !std::io::stdout().is_terminal() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    pb
}

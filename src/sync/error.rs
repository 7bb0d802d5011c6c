use thiserror::Error;

use crate::remote::RemoteError;
use crate::store::StoreError;

/// Errors surfaced by [`super::Synchronizer::synchronize`].
///
/// `RemoteFetch` aborts before any local change. `Store` and `Mirror` may
/// leave rows and images partially updated; loading flags are reset first.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Failed to fetch remote characters: {0}")]
    RemoteFetch(#[from] RemoteError),

    #[error("Character store error: {0}")]
    Store(#[from] StoreError),

    #[error("Image directory error: {0}")]
    Mirror(#[from] std::io::Error),

    #[error("A synchronization is already in progress")]
    InProgress,
}

impl SyncError {
    /// Whether the failure happened before any local mutation.
    pub fn is_remote(&self) -> bool {
        matches!(self, SyncError::RemoteFetch(_))
    }
}

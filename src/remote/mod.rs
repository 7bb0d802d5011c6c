//! Remote character catalogue.
//!
//! The sync routine only sees [`RemoteSource`]; the Firestore REST client is
//! the production implementation.

pub mod error;
pub mod firestore;

pub use error::RemoteError;
pub use firestore::{FirestoreOptions, FirestoreSource};

use async_trait::async_trait;

use crate::model::Character;

/// A source that lists every character in the remote catalogue.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    async fn list_characters(&self) -> Result<Vec<Character>, RemoteError>;
}

/// Stands in when no project is configured; every fetch fails. Lets offline
/// runs serve the cache without remote settings.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredSource;

#[async_trait]
impl RemoteSource for UnconfiguredSource {
    async fn list_characters(&self) -> Result<Vec<Character>, RemoteError> {
        Err(RemoteError::Config(
            "--project-id (or CASTSYNC_PROJECT_ID) is required to sync".to_string(),
        ))
    }
}

//! Presentation state holder.
//!
//! Publishes one observable [`UiState`] derived from the store's live list.
//! `load_data` optionally runs a sync first, then (re)attaches exactly one
//! forwarding task from the store subscription to the UI state.

use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::connectivity::Connectivity;
use crate::model::CachedCharacter;
use crate::store::CharacterStore;
use crate::sync::{SyncError, SyncReport, Synchronizer};

/// Shown when the cache holds no characters.
pub const EMPTY_MESSAGE: &str = "no data";
/// Shown when a load failed and connectivity is gone.
pub const OFFLINE_MESSAGE: &str = "no internet connection";

/// State consumed by the presentation layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UiState {
    pub persons: Vec<CachedCharacter>,
    pub is_loading: bool,
    pub error: Option<String>,
}

/// Error for a settled list. A failed sync is reported next to whatever is
/// cached; otherwise only an empty list carries a message.
fn settled_error(persons: &[CachedCharacter], sync_error: Option<&str>) -> Option<String> {
    match sync_error {
        Some(message) => Some(message.to_string()),
        None if persons.is_empty() => Some(EMPTY_MESSAGE.to_string()),
        None => None,
    }
}

pub struct CharacterListPresenter {
    synchronizer: Arc<Synchronizer>,
    store: Arc<dyn CharacterStore>,
    connectivity: Arc<dyn Connectivity>,
    state: Arc<watch::Sender<UiState>>,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for CharacterListPresenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CharacterListPresenter")
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl CharacterListPresenter {
    pub fn new(
        synchronizer: Arc<Synchronizer>,
        store: Arc<dyn CharacterStore>,
        connectivity: Arc<dyn Connectivity>,
    ) -> Self {
        let (state, _) = watch::channel(UiState::default());
        Self {
            synchronizer,
            store,
            connectivity,
            state: Arc::new(state),
            forwarder: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<UiState> {
        self.state.subscribe()
    }

    /// Snapshot of the current UI state.
    pub fn state(&self) -> UiState {
        self.state.borrow().clone()
    }

    /// Refresh from the remote when online, then republish the cached list.
    ///
    /// Never fails: sync errors become a user-facing message. Returns the
    /// sync report when a sync ran and succeeded.
    pub async fn load_data(&self) -> Option<SyncReport> {
        self.state.send_modify(|s| {
            s.is_loading = true;
            s.error = None;
        });

        let mut report = None;
        let mut sync_error = None;

        if self.connectivity.is_available().await {
            match self.synchronizer.synchronize().await {
                Ok(r) => report = Some(r),
                Err(SyncError::InProgress) => {
                    tracing::debug!("Sync already running, showing cached characters");
                }
                Err(e) => {
                    let message = if self.connectivity.is_available().await {
                        format!("failed to load data: {e}")
                    } else {
                        OFFLINE_MESSAGE.to_string()
                    };
                    tracing::warn!(
                        error = %e,
                        remote = e.is_remote(),
                        "Load failed, showing cached characters"
                    );
                    sync_error = Some(message);
                }
            }
        } else {
            tracing::info!("No connectivity, showing cached characters");
        }

        self.restart_forwarding(sync_error).await;
        report
    }

    /// Replace the active store subscription with a fresh one.
    ///
    /// The forwarder slot stays locked from teardown to install, so
    /// concurrent loads take turns and exactly one task survives.
    async fn restart_forwarding(&self, sync_error: Option<String>) {
        let mut forwarder = self.forwarder.lock().await;
        if let Some(handle) = forwarder.take() {
            handle.abort();
            let _ = handle.await;
        }

        let mut rx = self.store.subscribe();
        let persons = rx.borrow_and_update().clone();
        self.state.send_modify(|s| {
            s.error = settled_error(&persons, sync_error.as_deref());
            s.persons = persons;
            s.is_loading = false;
        });

        let state = Arc::clone(&self.state);
        let handle = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let persons = rx.borrow_and_update().clone();
                state.send_modify(|s| {
                    // A newer load owns the error until it settles.
                    if !s.is_loading {
                        s.error = settled_error(&persons, sync_error.as_deref());
                    }
                    s.persons = persons;
                });
            }
        });

        *forwarder = Some(handle);
    }
}

impl Drop for CharacterListPresenter {
    fn drop(&mut self) {
        if let Some(handle) = self.forwarder.get_mut().take() {
            handle.abort();
        }
    }
}

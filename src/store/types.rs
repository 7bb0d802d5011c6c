//! Types reported by the character store.

use chrono::{DateTime, Utc};

/// Summary of the cached characters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreSummary {
    /// Total number of cached characters.
    pub total: u64,
    /// Rows currently flagged as loading.
    pub loading: u64,
    /// Most recent upsert time, if any row exists.
    pub last_updated: Option<DateTime<Utc>>,
}

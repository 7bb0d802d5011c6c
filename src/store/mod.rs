//! Local character cache.
//!
//! SQLite-backed table of cached characters with a one-shot read and a live
//! subscription that republishes the full list after every write.

pub mod db;
pub mod error;
pub mod schema;
pub mod types;

pub use db::{CharacterStore, SqliteCharacterStore};
pub use error::StoreError;
pub use types::StoreSummary;

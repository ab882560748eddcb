//! Mapping backend trait for identifier mapping storage.
//!
//! The [`MappingBackend`] trait decouples the mapping store from where
//! entries live:
//!
//! - **PostgreSQL**: `PgMappingBackend` in `db.rs`, a table in the
//!   destination database
//! - **Memory**: `MemoryMappingBackend` in `crate::memory`
//!
//! The store works with `Arc<dyn MappingBackend>` without knowing the
//! concrete type.

use async_trait::async_trait;

use super::MappingEntry;
use crate::error::Result;

/// Persistence for `(table, field, old_value) -> new_value` entries.
///
/// `(table, field, old_value)` is unique: a backend never holds two new
/// values for the same old value.
#[async_trait]
pub trait MappingBackend: Send + Sync {
    /// Create the mapping table if needed. Idempotent.
    async fn init_schema(&self) -> Result<()>;

    /// Insert the entry unless its key exists.
    ///
    /// Returns `None` when inserted, or `Some(existing_new_value)` when an
    /// entry with the same key was already present (the existing entry is
    /// left untouched).
    async fn insert_if_absent(&self, entry: &MappingEntry) -> Result<Option<String>>;

    /// Look up the new value for an old value.
    async fn get(&self, table: &str, field: &str, old_value: &str) -> Result<Option<String>>;

    /// All `(old_value, new_value)` pairs for one table field.
    async fn load_field(&self, table: &str, field: &str) -> Result<Vec<(String, String)>>;

    /// Delete every entry recorded for a table. Returns the count removed.
    async fn clear_table(&self, table: &str) -> Result<u64>;

    /// Get the backend type name for logging/debugging.
    fn backend_type(&self) -> &'static str;
}

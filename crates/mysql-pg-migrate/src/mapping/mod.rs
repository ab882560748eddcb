//! Identifier mapping store.
//!
//! When a table's primary keys are regenerated on insert, every old key is
//! recorded against its new key so that foreign keys in later tables can be
//! translated. Entries are keyed by `(table, field, old_value)` and hold
//! one `new_value`; all values are stored as text.
//!
//! [`MappingStore`] keeps a write-through cache in front of a
//! [`MappingBackend`]. The orchestrator preloads the `(table, field)` pairs a
//! table references before loading it, which keeps row transformation free
//! of I/O: transforms read through the [`MappingLookup`] trait, which only
//! consults the cache.

pub mod backend;
pub mod db;

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub use backend::MappingBackend;
pub use db::PgMappingBackend;

use crate::error::{MigrateError, Result};

/// One recorded identifier translation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub table: String,
    pub field: String,
    pub old_value: String,
    pub new_value: String,
}

impl MappingEntry {
    pub fn new(
        table: impl Into<String>,
        field: impl Into<String>,
        old_value: impl Into<String>,
        new_value: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            field: field.into(),
            old_value: old_value.into(),
            new_value: new_value.into(),
        }
    }
}

/// Outcome of looking up an old key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(String),
    Unresolved,
}

impl Resolution {
    pub fn into_option(self) -> Option<String> {
        match self {
            Resolution::Resolved(v) => Some(v),
            Resolution::Unresolved => None,
        }
    }
}

/// Synchronous read access to recorded mappings.
pub trait MappingLookup {
    fn resolve(&self, table: &str, field: &str, old_value: &str) -> Resolution;
}

type FieldKey = (String, String);

/// Mapping store with a write-through cache.
pub struct MappingStore {
    backend: Arc<dyn MappingBackend>,
    cache: HashMap<FieldKey, HashMap<String, String>>,
}

impl MappingStore {
    pub fn new(backend: Arc<dyn MappingBackend>) -> Self {
        Self {
            backend,
            cache: HashMap::new(),
        }
    }

    /// Create the backing table. Idempotent.
    pub async fn init(&self) -> Result<()> {
        self.backend.init_schema().await?;
        debug!("Mapping store initialized ({})", self.backend.backend_type());
        Ok(())
    }

    /// Load every entry of `(table, field)` into the cache.
    ///
    /// Replaces whatever was cached for that pair.
    pub async fn preload(&mut self, table: &str, field: &str) -> Result<usize> {
        let entries: HashMap<String, String> = self
            .backend
            .load_field(table, field)
            .await?
            .into_iter()
            .collect();
        let count = entries.len();
        self.cache
            .insert((table.to_string(), field.to_string()), entries);
        debug!("Preloaded {} mappings for {}.{}", count, table, field);
        Ok(count)
    }

    /// Record `old_value -> new_value` for `(table, field)`.
    ///
    /// Recording an identical entry again is a no-op. A different new value
    /// for an already mapped old value is a [`MigrateError::MappingConflict`]
    /// and leaves the existing entry in place.
    pub async fn record_mapping(
        &mut self,
        table: &str,
        field: &str,
        old_value: &str,
        new_value: &str,
    ) -> Result<()> {
        let key = (table.to_string(), field.to_string());

        if let Some(existing) = self.cache.get(&key).and_then(|m| m.get(old_value)) {
            return check_conflict(table, field, old_value, existing, new_value);
        }

        let entry = MappingEntry::new(table, field, old_value, new_value);
        if let Some(existing) = self.backend.insert_if_absent(&entry).await? {
            self.cache
                .entry(key)
                .or_default()
                .insert(old_value.to_string(), existing.clone());
            return check_conflict(table, field, old_value, &existing, new_value);
        }

        self.cache
            .entry(key)
            .or_default()
            .insert(old_value.to_string(), new_value.to_string());
        Ok(())
    }

    /// Look up the new value for an old value.
    ///
    /// Served from the cache when the pair was preloaded, otherwise read
    /// from the backend. A missing entry is `Unresolved`, not an error.
    pub async fn resolve_mapping(
        &self,
        table: &str,
        field: &str,
        old_value: &str,
    ) -> Result<Resolution> {
        if let Some(cached) = self
            .cache
            .get(&(table.to_string(), field.to_string()))
            .and_then(|m| m.get(old_value))
        {
            return Ok(Resolution::Resolved(cached.clone()));
        }

        Ok(match self.backend.get(table, field, old_value).await? {
            Some(v) => Resolution::Resolved(v),
            None => Resolution::Unresolved,
        })
    }

    /// Remove every entry recorded for a table, in the backend and cache.
    pub async fn clear_table(&mut self, table: &str) -> Result<u64> {
        let removed = self.backend.clear_table(table).await?;
        self.cache.retain(|(t, _), _| t != table);
        if removed > 0 {
            info!("Cleared {} mappings for {}", removed, table);
        }
        Ok(removed)
    }
}

impl MappingLookup for MappingStore {
    fn resolve(&self, table: &str, field: &str, old_value: &str) -> Resolution {
        self.cache
            .get(&(table.to_string(), field.to_string()))
            .and_then(|m| m.get(old_value))
            .map(|v| Resolution::Resolved(v.clone()))
            .unwrap_or(Resolution::Unresolved)
    }
}

impl MappingLookup for HashMap<(String, String, String), String> {
    fn resolve(&self, table: &str, field: &str, old_value: &str) -> Resolution {
        self.get(&(table.to_string(), field.to_string(), old_value.to_string()))
            .map(|v| Resolution::Resolved(v.clone()))
            .unwrap_or(Resolution::Unresolved)
    }
}

fn check_conflict(
    table: &str,
    field: &str,
    old_value: &str,
    existing: &str,
    attempted: &str,
) -> Result<()> {
    if existing == attempted {
        return Ok(());
    }
    Err(MigrateError::MappingConflict {
        table: table.to_string(),
        field: field.to_string(),
        old_value: old_value.to_string(),
        existing: existing.to_string(),
        attempted: attempted.to_string(),
    })
}

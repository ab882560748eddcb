//! Database-backed identifier mapping storage.
//!
//! Entries live in a table of the destination database (by default
//! `public.migration_mapping`) so a later run can resolve references into
//! tables migrated by an earlier one.

use async_trait::async_trait;
use deadpool_postgres::Pool;
use tracing::debug;

use super::backend::MappingBackend;
use super::MappingEntry;
use crate::core::{qualify_pg, quote_pg};
use crate::error::{MigrateError, Result};

/// PostgreSQL mapping backend.
pub struct PgMappingBackend {
    pool: Pool,
    schema: String,
    table: String,
    qualified: String,
}

impl PgMappingBackend {
    /// Create a backend storing entries in `schema.table`.
    pub fn new(pool: Pool, schema: &str, table: &str) -> Result<Self> {
        Ok(Self {
            pool,
            schema: schema.to_string(),
            table: table.to_string(),
            qualified: qualify_pg(schema, table)?,
        })
    }
}

#[async_trait]
impl MappingBackend for PgMappingBackend {
    async fn init_schema(&self) -> Result<()> {
        let conn = self.pool.get().await?;

        conn.batch_execute(&format!(
            "CREATE SCHEMA IF NOT EXISTS {schema};
             CREATE TABLE IF NOT EXISTS {table} (
                 source_table TEXT NOT NULL,
                 field TEXT NOT NULL,
                 old_value TEXT NOT NULL,
                 new_value TEXT NOT NULL,
                 created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                 PRIMARY KEY (source_table, field, old_value)
             )",
            schema = quote_pg(&self.schema)?,
            table = self.qualified,
        ))
        .await
        .map_err(|e| MigrateError::Mapping(format!("creating {}.{}: {}", self.schema, self.table, e)))?;

        debug!("Mapping table {}.{} ready", self.schema, self.table);
        Ok(())
    }

    async fn insert_if_absent(&self, entry: &MappingEntry) -> Result<Option<String>> {
        let conn = self.pool.get().await?;

        let inserted = conn
            .execute(
                &format!(
                    "INSERT INTO {} (source_table, field, old_value, new_value)
                     VALUES ($1, $2, $3, $4)
                     ON CONFLICT (source_table, field, old_value) DO NOTHING",
                    self.qualified
                ),
                &[&entry.table, &entry.field, &entry.old_value, &entry.new_value],
            )
            .await?;

        if inserted == 1 {
            return Ok(None);
        }

        let existing = conn
            .query_one(
                &format!(
                    "SELECT new_value FROM {}
                     WHERE source_table = $1 AND field = $2 AND old_value = $3",
                    self.qualified
                ),
                &[&entry.table, &entry.field, &entry.old_value],
            )
            .await?;
        Ok(Some(existing.try_get(0)?))
    }

    async fn get(&self, table: &str, field: &str, old_value: &str) -> Result<Option<String>> {
        let conn = self.pool.get().await?;

        let row = conn
            .query_opt(
                &format!(
                    "SELECT new_value FROM {}
                     WHERE source_table = $1 AND field = $2 AND old_value = $3",
                    self.qualified
                ),
                &[&table, &field, &old_value],
            )
            .await?;

        match row {
            Some(r) => Ok(Some(r.try_get(0)?)),
            None => Ok(None),
        }
    }

    async fn load_field(&self, table: &str, field: &str) -> Result<Vec<(String, String)>> {
        let conn = self.pool.get().await?;

        let rows = conn
            .query(
                &format!(
                    "SELECT old_value, new_value FROM {}
                     WHERE source_table = $1 AND field = $2",
                    self.qualified
                ),
                &[&table, &field],
            )
            .await?;

        rows.iter()
            .map(|r| -> Result<(String, String)> { Ok((r.try_get(0)?, r.try_get(1)?)) })
            .collect()
    }

    async fn clear_table(&self, table: &str) -> Result<u64> {
        let conn = self.pool.get().await?;

        let deleted = conn
            .execute(
                &format!("DELETE FROM {} WHERE source_table = $1", self.qualified),
                &[&table],
            )
            .await?;
        Ok(deleted)
    }

    fn backend_type(&self) -> &'static str {
        "postgres"
    }
}

//! Table migration engine.
//!
//! [`TableMigrator`] moves one table through its phases:
//!
//! ```text
//! Idle -> Resetting -> Extracting -> Loading -> Done
//!              \            \           \
//!               +-> Failed   +-> Failed  +-> Failed | Cancelled
//! ```
//!
//! Reset and extract failures, mapping conflicts and mapping store errors
//! fail the table. Row failures never do: they are counted, recorded with
//! the row index and natural key, and loading carries on with the next row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::TableSpec;
use crate::core::{SourceRow, SqlValue};
use crate::error::{MigrateError, Result, RowError};
use crate::mapping::MappingStore;
use crate::source::SourceReader;
use crate::target::{InsertStatement, TargetWriter};
use crate::transform::RowTransform;

/// Lifecycle phase of a table migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TablePhase {
    Idle,
    Resetting,
    Extracting,
    Loading,
    Done,
    Failed,
    Cancelled,
}

impl TablePhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, TablePhase::Done | TablePhase::Failed | TablePhase::Cancelled)
    }
}

/// A row that could not be migrated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowFailure {
    /// Position of the row in extraction order.
    pub index: usize,

    /// Natural key of the row, when one could be read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    pub error: RowError,
}

/// Outcome of migrating one table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableResult {
    /// Source table name.
    pub table: String,

    /// Destination table as `schema.table`.
    pub target: String,

    pub phase: TablePhase,

    pub rows_extracted: usize,
    pub success_count: usize,
    pub error_count: usize,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<RowFailure>,

    /// Table-level error that ended the table in `Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub started_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl TableResult {
    fn new(table: &str, target: String) -> Self {
        Self {
            table: table.to_string(),
            target,
            phase: TablePhase::Idle,
            rows_extracted: 0,
            success_count: 0,
            error_count: 0,
            failures: Vec::new(),
            error: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Done with no rejected rows.
    pub fn is_clean(&self) -> bool {
        self.phase == TablePhase::Done && self.error_count == 0
    }

    fn fail(mut self, err: MigrateError) -> Self {
        error!("{}: {}", self.table, err);
        self.error = Some(err.to_string());
        self.finish(TablePhase::Failed)
    }

    fn finish(mut self, phase: TablePhase) -> Self {
        self.phase = phase;
        self.completed_at = Some(Utc::now());
        self
    }

    fn reject(&mut self, index: usize, key: Option<String>, error: RowError) {
        warn!(
            "{}: row {}{} failed: {}",
            self.table,
            index,
            key.as_deref().map(|k| format!(" (key {})", k)).unwrap_or_default(),
            error
        );
        self.error_count += 1;
        self.failures.push(RowFailure { index, key, error });
    }
}

/// Runs the reset/extract/load sequence for single tables.
pub struct TableMigrator<'a> {
    source: &'a dyn SourceReader,
    target: &'a dyn TargetWriter,
    mappings: &'a mut MappingStore,
    default_schema: String,
}

impl<'a> TableMigrator<'a> {
    pub fn new(
        source: &'a dyn SourceReader,
        target: &'a dyn TargetWriter,
        mappings: &'a mut MappingStore,
        default_schema: impl Into<String>,
    ) -> Self {
        Self {
            source,
            target,
            mappings,
            default_schema: default_schema.into(),
        }
    }

    /// Migrate one table. Never returns an error: table-level failures end
    /// the result in [`TablePhase::Failed`].
    pub async fn migrate(
        &mut self,
        spec: &TableSpec,
        transform: &dyn RowTransform,
        cancel: &CancellationToken,
    ) -> TableResult {
        let stmt = match InsertStatement::for_spec(spec, &self.default_schema) {
            Ok(stmt) => stmt,
            Err(e) => {
                return TableResult::new(&spec.source_table, spec.target_table.clone()).fail(e)
            }
        };
        let mut result = TableResult::new(&spec.source_table, stmt.target());

        info!("Migrating {} -> {}", spec.source_table, result.target);

        if cancel.is_cancelled() {
            return result.finish(TablePhase::Cancelled);
        }

        result.phase = TablePhase::Resetting;
        if let Err(e) = self.reset(spec, &stmt).await {
            return result.fail(e);
        }

        result.phase = TablePhase::Extracting;
        let rows = match self.source.fetch_all(&spec.source_table).await {
            Ok(rows) => rows,
            Err(e) => return result.fail(MigrateError::extract(&spec.source_table, e)),
        };
        result.rows_extracted = rows.len();
        debug!("{}: extracted {} rows", spec.source_table, rows.len());

        result.phase = TablePhase::Loading;
        for (index, extracted) in rows.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(
                    "{}: cancelled after {} of {} rows",
                    spec.source_table,
                    index,
                    rows.len()
                );
                return result.finish(TablePhase::Cancelled);
            }

            let row = match extracted {
                Ok(row) => row,
                Err(e) => {
                    result.reject(index, None, e.clone());
                    continue;
                }
            };
            let key = natural_key(spec, row);

            let dest = match transform.transform(row, &*self.mappings) {
                Ok(dest) => dest,
                Err(e) => {
                    result.reject(index, key, e);
                    continue;
                }
            };

            let returned = match self.insert(&stmt, &dest.into_values()).await {
                Ok(returned) => returned,
                Err(e) => {
                    result.reject(index, key, e);
                    continue;
                }
            };
            result.success_count += 1;

            if let Some(remap) = &spec.key_remap {
                let old = row.get(&remap.source_field).and_then(SqlValue::to_text);
                match (old, returned) {
                    (Some(old), Some(new)) => {
                        if let Err(e) = self
                            .mappings
                            .record_mapping(&spec.source_table, &remap.source_field, &old, &new)
                            .await
                        {
                            return result.fail(e);
                        }
                    }
                    _ => warn!(
                        "{}: row {} inserted without a mapping ({} or {} is null)",
                        spec.source_table, index, remap.source_field, remap.target_column
                    ),
                }
            }
        }

        info!(
            "{}: {} rows migrated, {} rows failed",
            spec.source_table, result.success_count, result.error_count
        );
        result.finish(TablePhase::Done)
    }

    /// Empty the destination table, drop the table's recorded mappings, and
    /// cache the mappings its foreign keys resolve through.
    async fn reset(&mut self, spec: &TableSpec, stmt: &InsertStatement) -> Result<()> {
        self.target
            .truncate_table(&stmt.schema, &stmt.table, spec.restart_identity)
            .await
            .map_err(|e| MigrateError::reset(stmt.target(), e))?;

        if spec.key_remap.is_some() {
            self.mappings
                .clear_table(&spec.source_table)
                .await
                .map_err(|e| MigrateError::reset(stmt.target(), e))?;
        }

        for fk in &spec.foreign_keys {
            self.mappings
                .preload(&fk.references_table, &fk.references_field)
                .await?;
        }
        Ok(())
    }

    /// The per-row timeout is enforced by the destination server, so an
    /// insert either commits and is counted or is cancelled and rejected.
    async fn insert(
        &self,
        stmt: &InsertStatement,
        values: &[SqlValue],
    ) -> std::result::Result<Option<String>, RowError> {
        self.target
            .insert_row(stmt, values)
            .await
            .map_err(RowError::from_insert)
    }
}

/// The key-remap field when declared, otherwise the first source column.
fn natural_key(spec: &TableSpec, row: &SourceRow) -> Option<String> {
    match &spec.key_remap {
        Some(remap) => row.get(&remap.source_field).and_then(SqlValue::to_text),
        None => row.iter().next().and_then(|(_, v)| v.to_text()),
    }
}

//! In-memory source, target and mapping backends.
//!
//! These implement the same traits as the MySQL reader, the PostgreSQL
//! writer and the PostgreSQL mapping backend, so the engine can be driven
//! end to end without a database. The target enforces the constraints the
//! engine relies on: NOT NULL, UNIQUE, unknown tables and columns, and
//! identity columns that restart on `TRUNCATE ... RESTART IDENTITY`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::core::{Column, Row, SourceRow, SqlValue};
use crate::error::{MigrateError, Result, RowError};
use crate::mapping::{MappingBackend, MappingEntry};
use crate::source::{ExtractedRow, SourceReader};
use crate::target::{InsertStatement, TargetWriter};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

// ===== Source =====

#[derive(Default)]
struct SourceTable {
    columns: Vec<Column>,
    rows: Vec<ExtractedRow>,
}

/// Source database held in memory.
#[derive(Default)]
pub struct MemorySource {
    tables: Mutex<HashMap<String, SourceTable>>,
    failing: Mutex<HashSet<String>>,
    closed: AtomicUsize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table with its rows. Column metadata is inferred from the
    /// first row (every column nullable, type `text`) unless set with
    /// [`MemorySource::set_columns`].
    pub fn add_table(&self, table: &str, rows: Vec<SourceRow>) {
        let columns = rows
            .first()
            .map(|r| r.columns().map(|c| Column::new(c, "text", true)).collect())
            .unwrap_or_default();
        let rows = rows.into_iter().map(Ok).collect();
        lock(&self.tables).insert(table.to_string(), SourceTable { columns, rows });
    }

    /// Append one decodable row.
    pub fn add_table_row(&self, table: &str, row: SourceRow) {
        lock(&self.tables)
            .entry(table.to_string())
            .or_default()
            .rows
            .push(Ok(row));
    }

    /// Append a row the reader cannot decode, such as a MySQL zero date.
    pub fn add_undecodable_row(&self, table: &str, message: &str) {
        lock(&self.tables)
            .entry(table.to_string())
            .or_default()
            .rows
            .push(Err(RowError::decode(message)));
    }

    pub fn set_columns(&self, table: &str, columns: Vec<Column>) {
        lock(&self.tables).entry(table.to_string()).or_default().columns = columns;
    }

    /// Make reads of `table` fail.
    pub fn fail_reads(&self, table: &str) {
        lock(&self.failing).insert(table.to_string());
    }

    /// Number of times `close` was called.
    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceReader for MemorySource {
    async fn fetch_all(&self, table: &str) -> Result<Vec<ExtractedRow>> {
        if lock(&self.failing).contains(table) {
            return Err(MigrateError::Database(format!("read of {} failed", table)));
        }
        lock(&self.tables)
            .get(table)
            .map(|t| t.rows.clone())
            .ok_or_else(|| MigrateError::Database(format!("Table '{}' doesn't exist", table)))
    }

    async fn describe_columns(&self, table: &str) -> Result<Vec<Column>> {
        Ok(lock(&self.tables)
            .get(table)
            .map(|t| t.columns.clone())
            .unwrap_or_default())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn db_type(&self) -> &str {
        "memory"
    }

    async fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

// ===== Target =====

struct TargetTable {
    columns: Vec<Column>,
    unique: Vec<String>,
    identity: Option<String>,
    next_identity: i64,
    rows: Vec<Row>,
}

impl TargetTable {
    fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Destination database held in memory.
#[derive(Default)]
pub struct MemoryTarget {
    tables: Mutex<HashMap<String, TargetTable>>,
    failing_truncates: Mutex<HashSet<String>>,
    rejected: Mutex<Vec<(String, String)>>,
    statement_timeout: Mutex<Option<Duration>>,
    execution_delay: Mutex<Option<Duration>>,
    ack_delay: Mutex<Option<Duration>>,
    closed: AtomicUsize,
}

fn key(schema: &str, table: &str) -> String {
    format!("{}.{}", schema, table)
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table. Creating an existing table replaces it.
    pub fn create_table(&self, schema: &str, table: &str, columns: Vec<Column>) {
        lock(&self.tables).insert(
            key(schema, table),
            TargetTable {
                columns,
                unique: Vec::new(),
                identity: None,
                next_identity: 1,
                rows: Vec::new(),
            },
        );
    }

    /// Add a UNIQUE constraint on one column.
    pub fn add_unique(&self, schema: &str, table: &str, column: &str) {
        if let Some(t) = lock(&self.tables).get_mut(&key(schema, table)) {
            t.unique.push(column.to_string());
        }
    }

    /// Make `column` an identity column filled when the insert omits it.
    pub fn set_identity(&self, schema: &str, table: &str, column: &str) {
        if let Some(t) = lock(&self.tables).get_mut(&key(schema, table)) {
            t.identity = Some(column.to_string());
        }
    }

    /// Make truncation of a table fail.
    pub fn fail_truncate(&self, schema: &str, table: &str) {
        lock(&self.failing_truncates).insert(key(schema, table));
    }

    /// Reject inserts whose `column` has the given text value.
    pub fn reject_value(&self, column: &str, value: &str) {
        lock(&self.rejected).push((column.to_string(), value.to_string()));
    }

    /// Cancel inserts whose execution runs past `timeout`, the way a
    /// server-side `statement_timeout` does. Nothing is written.
    pub fn set_statement_timeout(&self, timeout: Duration) {
        *lock(&self.statement_timeout) = Some(timeout);
    }

    /// Time every insert spends executing before it commits.
    pub fn set_execution_delay(&self, delay: Duration) {
        *lock(&self.execution_delay) = Some(delay);
    }

    /// Time between an insert committing and its reply reaching the caller.
    pub fn set_ack_delay(&self, delay: Duration) {
        *lock(&self.ack_delay) = Some(delay);
    }

    /// Rows of a table in insertion order.
    pub fn rows(&self, schema: &str, table: &str) -> Vec<Row> {
        lock(&self.tables)
            .get(&key(schema, table))
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Number of times `close` was called.
    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    fn apply_insert(&self, stmt: &InsertStatement, values: &[SqlValue]) -> Result<Option<String>> {
        let k = stmt.target();
        let mut tables = lock(&self.tables);
        let t = tables
            .get_mut(&k)
            .ok_or_else(|| MigrateError::Database(format!("relation \"{}\" does not exist", k)))?;

        if stmt.columns.len() != values.len() {
            return Err(MigrateError::Database(format!(
                "INSERT has {} target columns but {} values",
                stmt.columns.len(),
                values.len()
            )));
        }

        let mut row = Row::with_capacity(t.columns.len());
        for (name, value) in stmt.columns.iter().zip(values) {
            if t.column(name).is_none() {
                return Err(MigrateError::Database(format!(
                    "column \"{}\" of relation \"{}\" does not exist",
                    name, stmt.table
                )));
            }
            let text = value.to_text();
            if lock(&self.rejected)
                .iter()
                .any(|(c, v)| c == name && Some(v) == text.as_ref())
            {
                return Err(MigrateError::Database(format!(
                    "value {} rejected for column \"{}\"",
                    value, name
                )));
            }
            row.insert(name.clone(), value.clone());
        }

        let mut assigned = None;
        if let Some(identity) = t.identity.clone() {
            if row.is_absent(&identity) {
                assigned = Some(t.next_identity);
                row.insert(identity, SqlValue::I64(t.next_identity));
            }
        }

        for col in &t.columns {
            if row.get(&col.name).is_none() {
                row.insert(col.name.clone(), SqlValue::Null);
            }
            if !col.is_nullable && row.is_absent(&col.name) {
                return Err(MigrateError::Database(format!(
                    "null value in column \"{}\" of relation \"{}\" violates not-null constraint",
                    col.name, stmt.table
                )));
            }
        }

        for unique in &t.unique {
            let Some(new) = row.get(unique).and_then(SqlValue::to_text) else {
                continue;
            };
            let duplicate = t
                .rows
                .iter()
                .any(|r| r.get(unique).and_then(SqlValue::to_text).as_ref() == Some(&new));
            if duplicate {
                return Err(MigrateError::Database(format!(
                    "duplicate key value violates unique constraint \"{}_{}_key\"",
                    stmt.table, unique
                )));
            }
        }

        if assigned.is_some() {
            t.next_identity += 1;
        }
        let returned = stmt
            .returning
            .as_ref()
            .and_then(|c| row.get(c))
            .and_then(SqlValue::to_text);
        t.rows.push(row);
        Ok(returned)
    }
}

#[async_trait]
impl TargetWriter for MemoryTarget {
    async fn truncate_table(
        &self,
        schema: &str,
        table: &str,
        restart_identity: bool,
    ) -> Result<()> {
        let k = key(schema, table);
        if lock(&self.failing_truncates).contains(&k) {
            return Err(MigrateError::Database(format!(
                "permission denied for table {}",
                table
            )));
        }
        let mut tables = lock(&self.tables);
        let t = tables
            .get_mut(&k)
            .ok_or_else(|| MigrateError::Database(format!("relation \"{}\" does not exist", k)))?;
        t.rows.clear();
        if restart_identity {
            t.next_identity = 1;
        }
        Ok(())
    }

    async fn insert_row(
        &self,
        stmt: &InsertStatement,
        values: &[SqlValue],
    ) -> Result<Option<String>> {
        let execution = *lock(&self.execution_delay);
        let timeout = *lock(&self.statement_timeout);
        if let Some(delay) = execution {
            match timeout {
                Some(limit) if delay > limit => {
                    tokio::time::sleep(limit).await;
                    return Err(MigrateError::StatementTimeout {
                        seconds: limit.as_secs(),
                    });
                }
                _ => tokio::time::sleep(delay).await,
            }
        }

        let returned = self.apply_insert(stmt, values)?;

        let ack = *lock(&self.ack_delay);
        if let Some(delay) = ack {
            tokio::time::sleep(delay).await;
        }
        Ok(returned)
    }

    async fn describe_columns(&self, schema: &str, table: &str) -> Result<Vec<Column>> {
        Ok(lock(&self.tables)
            .get(&key(schema, table))
            .map(|t| t.columns.clone())
            .unwrap_or_default())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn db_type(&self) -> &str {
        "memory"
    }

    async fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

// ===== Mapping =====

/// Mapping backend held in memory.
#[derive(Default)]
pub struct MemoryMappingBackend {
    entries: Mutex<BTreeMap<(String, String, String), String>>,
    failing: bool,
}

impl MemoryMappingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend whose every operation fails.
    pub fn failing() -> Self {
        Self {
            entries: Mutex::default(),
            failing: true,
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All entries ordered by `(table, field, old_value)`.
    pub fn entries(&self) -> Vec<MappingEntry> {
        lock(&self.entries)
            .iter()
            .map(|((t, f, o), n)| MappingEntry::new(t, f, o, n))
            .collect()
    }

    fn check(&self) -> Result<()> {
        if self.failing {
            return Err(MigrateError::Mapping("mapping backend unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl MappingBackend for MemoryMappingBackend {
    async fn init_schema(&self) -> Result<()> {
        self.check()
    }

    async fn insert_if_absent(&self, entry: &MappingEntry) -> Result<Option<String>> {
        self.check()?;
        let mut entries = lock(&self.entries);
        let k = (
            entry.table.clone(),
            entry.field.clone(),
            entry.old_value.clone(),
        );
        if let Some(existing) = entries.get(&k) {
            return Ok(Some(existing.clone()));
        }
        entries.insert(k, entry.new_value.clone());
        Ok(None)
    }

    async fn get(&self, table: &str, field: &str, old_value: &str) -> Result<Option<String>> {
        self.check()?;
        Ok(lock(&self.entries)
            .get(&(table.to_string(), field.to_string(), old_value.to_string()))
            .cloned())
    }

    async fn load_field(&self, table: &str, field: &str) -> Result<Vec<(String, String)>> {
        self.check()?;
        Ok(lock(&self.entries)
            .iter()
            .filter(|((t, f, _), _)| t == table && f == field)
            .map(|((_, _, o), n)| (o.clone(), n.clone()))
            .collect())
    }

    async fn clear_table(&self, table: &str) -> Result<u64> {
        self.check()?;
        let mut entries = lock(&self.entries);
        let before = entries.len();
        entries.retain(|(t, _, _), _| t != table);
        Ok((before - entries.len()) as u64)
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stmt(columns: &[&str], returning: Option<&str>) -> InsertStatement {
        InsertStatement {
            schema: "public".into(),
            table: "state".into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            casts: columns.iter().map(|_| "text".to_string()).collect(),
            returning: returning.map(String::from),
        }
    }

    #[tokio::test]
    async fn test_identity_restarts_on_truncate() {
        let target = MemoryTarget::new();
        target.create_table(
            "public",
            "state",
            vec![Column::new("id", "integer", false), Column::new("name", "text", false)],
        );
        target.set_identity("public", "state", "id");

        let s = stmt(&["name"], Some("id"));
        let first = target.insert_row(&s, &[SqlValue::from("Ohio")]).await.unwrap();
        let second = target.insert_row(&s, &[SqlValue::from("Iowa")]).await.unwrap();
        assert_eq!(first.as_deref(), Some("1"));
        assert_eq!(second.as_deref(), Some("2"));

        target.truncate_table("public", "state", true).await.unwrap();
        let again = target.insert_row(&s, &[SqlValue::from("Ohio")]).await.unwrap();
        assert_eq!(again.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_not_null_and_unique_enforced() {
        let target = MemoryTarget::new();
        target.create_table("public", "state", vec![Column::new("abbreviation", "text", false)]);
        target.add_unique("public", "state", "abbreviation");

        let s = stmt(&["abbreviation"], None);
        target.insert_row(&s, &[SqlValue::from("OH")]).await.unwrap();
        assert!(target.insert_row(&s, &[SqlValue::from("OH")]).await.is_err());
        assert!(target.insert_row(&s, &[SqlValue::Null]).await.is_err());
        assert_eq!(target.rows("public", "state").len(), 1);
    }

    #[tokio::test]
    async fn test_truncate_missing_table_fails() {
        let target = MemoryTarget::new();
        assert!(target.truncate_table("public", "nope", true).await.is_err());
    }

    #[tokio::test]
    async fn test_statement_timeout_writes_nothing() {
        let target = MemoryTarget::new();
        target.create_table("public", "state", vec![Column::new("name", "text", false)]);
        target.set_statement_timeout(Duration::from_millis(10));
        target.set_execution_delay(Duration::from_millis(50));

        let s = stmt(&["name"], None);
        let err = target.insert_row(&s, &[SqlValue::from("Ohio")]).await.unwrap_err();
        assert!(matches!(err, MigrateError::StatementTimeout { .. }));
        assert!(target.rows("public", "state").is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_row_keeps_its_position() {
        let source = MemorySource::new();
        source.add_table("state", vec![Row::new().with("id", 1)]);
        source.add_undecodable_row("state", "zero date");

        let rows = source.fetch_all("state").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].is_ok());
        assert!(matches!(rows[1], Err(RowError::Decode { .. })));
    }

    #[tokio::test]
    async fn test_missing_source_table_fails() {
        let source = MemorySource::new();
        assert!(source.fetch_all("state").await.is_err());
    }

    #[tokio::test]
    async fn test_mapping_clear_table_counts() {
        let backend = MemoryMappingBackend::new();
        backend
            .insert_if_absent(&MappingEntry::new("state", "id", "1", "10"))
            .await
            .unwrap();
        backend
            .insert_if_absent(&MappingEntry::new("user", "id", "1", "20"))
            .await
            .unwrap();
        assert_eq!(backend.clear_table("state").await.unwrap(), 1);
        assert_eq!(backend.len(), 1);
    }
}

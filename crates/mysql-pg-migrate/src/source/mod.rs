//! Source database access.
//!
//! The engine only needs three things from the source: a full unconditional
//! scan of a table, column metadata for the scaffold generator, and a
//! liveness probe. [`MysqlReader`] implements them over a sqlx pool.

mod mysql;

pub use mysql::MysqlReader;

use async_trait::async_trait;

use crate::core::{Column, SourceRow};
use crate::error::{Result, RowError};

/// One extracted row, or the reason it could not be decoded.
pub type ExtractedRow = std::result::Result<SourceRow, RowError>;

/// Read rows and metadata from a source database.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Read every row of `table` into memory, in the order the database
    /// returns them. A row whose values cannot be decoded is returned as
    /// an `Err` in its position; only a failed query fails the call.
    async fn fetch_all(&self, table: &str) -> Result<Vec<ExtractedRow>>;

    /// Column metadata in ordinal order.
    async fn describe_columns(&self, table: &str) -> Result<Vec<Column>>;

    /// Round-trip a trivial query.
    async fn ping(&self) -> Result<()>;

    /// Get the database type identifier.
    fn db_type(&self) -> &str;

    /// Close the connection pool.
    async fn close(&self);
}

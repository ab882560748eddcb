//! # mysql-pg-migrate
//!
//! Table-by-table data migration from MySQL to a structurally different
//! PostgreSQL schema.
//!
//! Each configured table is reset, read in full, transformed row by row and
//! inserted with positional parameters:
//!
//! - **Idempotent reloads**: destination tables are truncated before loading
//! - **Row isolation**: a rejected row is counted and recorded, the table
//!   carries on
//! - **Null defaults**: NULLs in non-nullable columns get a type default
//! - **Key remapping**: regenerated primary keys are recorded in a mapping
//!   table and foreign keys of later tables are translated through it
//!
//! ## Example
//!
//! ```rust,no_run
//! use mysql_pg_migrate::{Config, Orchestrator};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> mysql_pg_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let orchestrator = Orchestrator::new(config)?;
//!     let result = orchestrator.run(CancellationToken::new()).await?;
//!     println!("Migrated {} rows", result.rows_succeeded);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod mapping;
#[cfg(any(test, feature = "testing"))]
pub mod memory;
pub mod orchestrator;
pub mod scaffold;
pub mod source;
pub mod target;
pub mod transfer;
pub mod transform;

// Re-exports for convenient access
pub use config::{
    ColumnSpec, Config, ForeignKeySpec, KeyRemap, MigrationConfig, SourceConfig, TableSpec,
    TargetConfig, UnresolvedPolicy,
};
pub use core::{Column, DestinationRow, Row, SourceRow, SqlValue};
pub use error::{MigrateError, Result, RowError};
pub use mapping::{MappingBackend, MappingEntry, MappingLookup, MappingStore, Resolution};
pub use orchestrator::{
    Connections, HealthCheckResult, Orchestrator, RunResult, RunStatus, TablePlan,
};
pub use source::{ExtractedRow, MysqlReader, SourceReader};
pub use target::{InsertStatement, PgPool, TargetWriter};
pub use transfer::{RowFailure, TableMigrator, TablePhase, TableResult};
pub use transform::{ColumnTransform, RowTransform};

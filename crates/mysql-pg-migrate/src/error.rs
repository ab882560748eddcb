//! Error types for the migration library.
//!
//! Two layers of failure exist:
//!
//! - [`MigrateError`] aborts something larger than a row: the whole run
//!   (connection, configuration) or a single table (reset, extract, mapping
//!   conflict).
//! - [`RowError`] is local to one source row. It is counted and recorded in
//!   the table result, and loading continues with the next row.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Exit code for configuration errors.
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Exit code when a database endpoint cannot be reached.
pub const EXIT_CONNECTION_ERROR: u8 = 2;
/// Exit code when a table failed or rows were rejected.
pub const EXIT_MIGRATION_FAILED: u8 = 3;
/// Exit code for a cancelled run.
pub const EXIT_CANCELLED: u8 = 4;
/// Exit code for file system errors.
pub const EXIT_IO_ERROR: u8 = 7;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A database endpoint was unreachable or rejected the credentials.
    #[error("Connection to {endpoint} failed: {message}")]
    Connection { endpoint: String, message: String },

    /// Truncating a destination table failed. Fatal for that table.
    #[error("Reset failed for table {table}: {message}")]
    Reset { table: String, message: String },

    /// Reading the source table failed. Fatal for that table.
    #[error("Extract failed for table {table}: {message}")]
    Extract { table: String, message: String },

    /// The same old key was mapped to two different new keys.
    #[error(
        "Mapping conflict for {table}.{field} = {old_value}: already mapped to {existing}, refusing {attempted}"
    )]
    MappingConflict {
        table: String,
        field: String,
        old_value: String,
        existing: String,
        attempted: String,
    },

    /// Mapping store I/O failure.
    #[error("Mapping store error: {0}")]
    Mapping(String),

    /// Source database query error
    #[error("Source database error: {0}")]
    Source(#[from] sqlx::Error),

    /// Target database query error
    #[error("Target database error: {0}")]
    Target(#[from] tokio_postgres::Error),

    /// Statement rejected by a backend that has no native driver error.
    #[error("Database error: {0}")]
    Database(String),

    /// The server cancelled a statement that ran past `statement_timeout`.
    #[error("Statement exceeded the {seconds}s statement timeout")]
    StatementTimeout { seconds: u64 },

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Migration was cancelled (SIGINT, etc.)
    #[error("Migration cancelled")]
    Cancelled,

    /// The run finished, but at least one table failed or rejected rows.
    #[error("Migration finished with failures: {0}")]
    RunFailed(String),
}

impl MigrateError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        MigrateError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Connection error for an endpoint.
    pub fn connection(endpoint: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::Connection {
            endpoint: endpoint.into(),
            message: message.to_string(),
        }
    }

    /// Create a Reset error for a table.
    pub fn reset(table: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::Reset {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create an Extract error for a table.
    pub fn extract(table: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::Extract {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) | MigrateError::Json(_) => {
                EXIT_CONFIG_ERROR
            }
            MigrateError::Connection { .. } | MigrateError::Pool { .. } => EXIT_CONNECTION_ERROR,
            MigrateError::Io(_) => EXIT_IO_ERROR,
            MigrateError::Cancelled => EXIT_CANCELLED,
            _ => EXIT_MIGRATION_FAILED,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

impl From<deadpool_postgres::PoolError> for MigrateError {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        MigrateError::pool(e, "acquiring PostgreSQL connection")
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

/// Failure of a single row. Never aborts the table.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RowError {
    /// A column that must come from the source was null or absent.
    #[error("required column {column} is null")]
    MissingRequired { column: String },

    /// A foreign key points at an old key with no recorded mapping.
    #[error("unresolved reference {column} -> {table}.{field} = {value}")]
    UnresolvedReference {
        column: String,
        table: String,
        field: String,
        value: String,
    },

    /// The destination rejected the insert.
    #[error("insert failed: {message}")]
    Insert { message: String },

    /// The destination cancelled the insert at the per-row statement timeout.
    #[error("insert timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// The source row could not be decoded (zero dates, out-of-range
    /// values).
    #[error("decode failed: {message}")]
    Decode { message: String },

    /// A custom row transform rejected the row.
    #[error("transform failed: {message}")]
    Transform { message: String },
}

impl RowError {
    /// Build an insert failure from any displayable error.
    pub fn insert(e: impl ToString) -> Self {
        RowError::Insert {
            message: e.to_string(),
        }
    }

    /// Classify an error returned by the target for one insert.
    pub fn from_insert(e: MigrateError) -> Self {
        match e {
            MigrateError::StatementTimeout { seconds } => RowError::Timeout { seconds },
            other => RowError::insert(other),
        }
    }

    /// Build a decode failure from any displayable error.
    pub fn decode(e: impl ToString) -> Self {
        RowError::Decode {
            message: e.to_string(),
        }
    }
}

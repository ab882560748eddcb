//! Configuration type definitions.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::TableName;
use crate::error::Result;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration (MySQL).
    #[serde(default)]
    pub source: SourceConfig,

    /// Target database configuration (PostgreSQL).
    #[serde(default)]
    pub target: TargetConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Source database (MySQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Database type (always "mysql" for now).
    #[serde(default = "default_mysql")]
    pub r#type: String,

    /// Database host.
    #[serde(default)]
    pub host: String,

    /// Database port (default: 3306).
    #[serde(default = "default_mysql_port")]
    pub port: u16,

    /// Database name.
    #[serde(default)]
    pub database: String,

    /// Username.
    #[serde(default)]
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Maximum pooled connections (default: 2).
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            r#type: default_mysql(),
            host: String::new(),
            port: default_mysql_port(),
            database: String::new(),
            user: String::new(),
            password: String::new(),
            max_connections: default_max_connections(),
        }
    }
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("type", &self.r#type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// Target database (PostgreSQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database type (always "postgres" for now).
    #[serde(default = "default_postgres")]
    pub r#type: String,

    /// Database host.
    #[serde(default)]
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    #[serde(default)]
    pub database: String,

    /// Username.
    #[serde(default)]
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Schema for unqualified destination tables and the mapping table
    /// (default: "public").
    #[serde(default = "default_public_schema")]
    pub schema: String,

    /// Maximum pooled connections (default: 2).
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            r#type: default_postgres(),
            host: String::new(),
            port: default_pg_port(),
            database: String::new(),
            user: String::new(),
            password: String::new(),
            schema: default_public_schema(),
            max_connections: default_max_connections(),
        }
    }
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("type", &self.r#type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Name of the identifier mapping table in the target schema.
    #[serde(default = "default_mapping_table")]
    pub mapping_table: String,

    /// Per-row insert timeout in seconds, applied as the destination
    /// sessions' `statement_timeout`. Unset means no limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_timeout_secs: Option<u64>,

    /// Tables to migrate, in dependency order.
    #[serde(default)]
    pub tables: Vec<TableSpec>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            mapping_table: default_mapping_table(),
            row_timeout_secs: None,
            tables: Vec::new(),
        }
    }
}

/// Declarative description of one table's migration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSpec {
    /// Source table name.
    pub source_table: String,

    /// Destination table, optionally schema-qualified (`smartirb.state`).
    pub target_table: String,

    /// Destination columns in insert order.
    pub columns: Vec<ColumnSpec>,

    /// Columns whose values are old keys of another migrated table.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub foreign_keys: Vec<ForeignKeySpec>,

    /// Record old-to-new key mappings for this table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_remap: Option<KeyRemap>,

    /// What to do with a foreign key that has no recorded mapping.
    #[serde(default, skip_serializing_if = "is_default_policy")]
    pub on_unresolved: UnresolvedPolicy,

    /// Reset identity sequences when truncating (default: true).
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub restart_identity: bool,
}

impl TableSpec {
    /// Parsed destination table name.
    pub fn target_name(&self) -> Result<TableName> {
        TableName::parse(&self.target_table)
    }

    /// Foreign key declared on a destination column, if any.
    pub fn foreign_key_for(&self, column: &str) -> Option<&ForeignKeySpec> {
        self.foreign_keys.iter().find(|fk| fk.column == column)
    }
}

/// One destination column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Destination column name.
    pub name: String,

    /// Source column, when it differs from `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// PostgreSQL type of the destination column, used for the parameter
    /// cast and the implied default.
    pub data_type: String,

    /// Explicit default replacing NULL or absent source values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_yaml::Value>,

    /// Keep NULL instead of substituting a default.
    #[serde(default, skip_serializing_if = "is_false")]
    pub nullable: bool,

    /// The value must come from the source; NULL fails the row.
    #[serde(default, skip_serializing_if = "is_false")]
    pub required: bool,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: None,
            data_type: data_type.into(),
            default: None,
            nullable: false,
            required: false,
        }
    }

    /// Source column this destination column is read from.
    pub fn source_column(&self) -> &str {
        self.source.as_deref().unwrap_or(&self.name)
    }
}

/// Translation of a destination column through the mapping store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeySpec {
    /// Destination column holding the reference.
    pub column: String,

    /// Source table of the referenced rows (as recorded in the mapping store).
    pub references_table: String,

    /// Key field of the referenced table.
    pub references_field: String,
}

/// Primary key remapping for tables whose keys change during migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRemap {
    /// Source column holding the old key.
    pub source_field: String,

    /// Destination column whose inserted value is the new key.
    pub target_column: String,
}

/// Handling of foreign keys without a recorded mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedPolicy {
    /// Fail the row.
    #[default]
    Fail,

    /// Insert the original value unchanged.
    KeepOriginal,
}

// Default value functions for serde
fn default_mysql() -> String {
    "mysql".to_string()
}

fn default_postgres() -> String {
    "postgres".to_string()
}

fn default_mysql_port() -> u16 {
    3306
}

fn default_pg_port() -> u16 {
    5432
}

fn default_public_schema() -> String {
    "public".to_string()
}

fn default_mapping_table() -> String {
    "migration_mapping".to_string()
}

fn default_max_connections() -> u32 {
    2
}

fn default_true() -> bool {
    true
}

fn is_true(v: &bool) -> bool {
    *v
}

fn is_false(v: &bool) -> bool {
    !*v
}

fn is_default_policy(p: &UnresolvedPolicy) -> bool {
    *p == UnresolvedPolicy::Fail
}

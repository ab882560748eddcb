//! Migration orchestrator - main workflow coordinator.
//!
//! A run opens both connections, initializes the mapping table, migrates
//! the configured tables one after another in declared order, and closes
//! the connections on every exit path.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{Config, TableSpec};
use crate::error::{MigrateError, Result};
use crate::mapping::{MappingBackend, MappingStore, PgMappingBackend};
use crate::source::{MysqlReader, SourceReader};
use crate::target::{InsertStatement, PgPool, TargetWriter};
use crate::transfer::{TableMigrator, TablePhase, TableResult};
use crate::transform::{ColumnTransform, RowTransform};

/// Open handles to the source, the destination and the mapping store.
pub struct Connections {
    pub source: Arc<dyn SourceReader>,
    pub target: Arc<dyn TargetWriter>,
    pub mappings: Arc<dyn MappingBackend>,
}

impl Connections {
    /// Connect to MySQL and PostgreSQL. The mapping table lives in the
    /// destination database.
    pub async fn open(config: &Config) -> Result<Self> {
        let source = MysqlReader::new(&config.source).await?;

        let statement_timeout = config.migration.row_timeout_secs.map(Duration::from_secs);
        let target = match PgPool::with_statement_timeout(&config.target, statement_timeout).await {
            Ok(target) => target,
            Err(e) => {
                source.close().await;
                return Err(e);
            }
        };

        let mappings = match PgMappingBackend::new(
            target.pool(),
            &config.target.schema,
            &config.migration.mapping_table,
        ) {
            Ok(m) => m,
            Err(e) => {
                source.close().await;
                target.close().await;
                return Err(e);
            }
        };

        Ok(Self {
            source: Arc::new(source),
            target: Arc::new(target),
            mappings: Arc::new(mappings),
        })
    }

    pub fn from_parts(
        source: Arc<dyn SourceReader>,
        target: Arc<dyn TargetWriter>,
        mappings: Arc<dyn MappingBackend>,
    ) -> Self {
        Self {
            source,
            target,
            mappings,
        }
    }

    /// Release both connections.
    pub async fn close(self) {
        self.source.close().await;
        self.target.close().await;
        info!("Closed source and target connections");
    }
}

/// Overall run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every table done, no rejected rows.
    Completed,
    /// Every table done, some rows rejected.
    CompletedWithErrors,
    /// At least one table failed.
    Failed,
    Cancelled,
}

impl RunStatus {
    fn from_tables(tables: &[TableResult]) -> Self {
        if tables.iter().any(|t| t.phase == TablePhase::Cancelled) {
            RunStatus::Cancelled
        } else if tables.iter().any(|t| t.phase == TablePhase::Failed) {
            RunStatus::Failed
        } else if tables.iter().any(|t| t.error_count > 0) {
            RunStatus::CompletedWithErrors
        } else {
            RunStatus::Completed
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::CompletedWithErrors => "completed_with_errors",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// Unique run identifier.
    pub run_id: String,

    /// SHA256 hash of the configuration.
    pub config_hash: String,

    /// Final status.
    pub status: RunStatus,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Tables processed.
    pub tables_total: usize,

    /// Tables that reached `done`.
    pub tables_done: usize,

    /// Tables that failed.
    pub tables_failed: usize,

    /// Rows inserted across all tables.
    pub rows_succeeded: usize,

    /// Rows rejected across all tables.
    pub rows_failed: usize,

    /// Per-table results in migration order.
    pub tables: Vec<TableResult>,
}

impl RunResult {
    /// True only when every table finished without rejected rows.
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Error describing an unsuccessful run, `None` on success.
    pub fn failure(&self) -> Option<MigrateError> {
        match self.status {
            RunStatus::Completed => None,
            RunStatus::Cancelled => Some(MigrateError::Cancelled),
            RunStatus::Failed | RunStatus::CompletedWithErrors => {
                Some(MigrateError::RunFailed(format!(
                    "{} of {} tables failed, {} rows rejected",
                    self.tables_failed, self.tables_total, self.rows_failed
                )))
            }
        }
    }
}

/// Result of a connection check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub source_connected: bool,
    pub source_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_error: Option<String>,
    pub target_connected: bool,
    pub target_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_error: Option<String>,
    pub healthy: bool,
}

/// Planned work for one table, computed without connecting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TablePlan {
    pub source_table: String,
    pub target: String,
    pub insert_sql: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub resolves: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records: Option<String>,
}

/// Migration orchestrator.
pub struct Orchestrator {
    config: Config,
    tables: Vec<TableSpec>,
    transforms: HashMap<String, Arc<dyn RowTransform>>,
}

impl Orchestrator {
    /// Create an orchestrator for every configured table.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let tables = config.migration.tables.clone();
        Ok(Self {
            config,
            tables,
            transforms: HashMap::new(),
        })
    }

    /// Restrict the run to the named source tables, keeping declared order.
    pub fn with_tables(mut self, names: &[String]) -> Result<Self> {
        if names.is_empty() {
            return Ok(self);
        }
        if let Some(unknown) = names
            .iter()
            .find(|n| !self.tables.iter().any(|t| &t.source_table == *n))
        {
            return Err(MigrateError::Config(format!(
                "table '{}' is not configured",
                unknown
            )));
        }
        self.tables.retain(|t| names.contains(&t.source_table));
        Ok(self)
    }

    /// Use a custom transform for one source table instead of the
    /// declarative column mapping.
    pub fn with_transform(
        mut self,
        source_table: impl Into<String>,
        transform: Arc<dyn RowTransform>,
    ) -> Self {
        self.transforms.insert(source_table.into(), transform);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Ordered tables and their insert statements.
    pub fn plan(&self) -> Result<Vec<TablePlan>> {
        self.tables
            .iter()
            .map(|spec| -> Result<TablePlan> {
                let stmt = InsertStatement::for_spec(spec, &self.config.target.schema)?;
                Ok(TablePlan {
                    source_table: spec.source_table.clone(),
                    target: stmt.target(),
                    insert_sql: stmt.sql()?,
                    resolves: spec
                        .foreign_keys
                        .iter()
                        .map(|fk| {
                            format!("{} -> {}.{}", fk.column, fk.references_table, fk.references_field)
                        })
                        .collect(),
                    records: spec
                        .key_remap
                        .as_ref()
                        .map(|r| format!("{} -> {}", r.source_field, r.target_column)),
                })
            })
            .collect()
    }

    /// Connect, run every table, and close the connections.
    pub async fn run(&self, cancel: CancellationToken) -> Result<RunResult> {
        self.ensure_tables()?;
        let conns = Connections::open(&self.config).await?;
        self.run_with(conns, cancel).await
    }

    /// Run against already open connections. The connections are closed
    /// before returning, whatever the outcome.
    pub async fn run_with(&self, conns: Connections, cancel: CancellationToken) -> Result<RunResult> {
        let result = self.execute(&conns, &cancel).await;
        conns.close().await;
        result
    }

    fn ensure_tables(&self) -> Result<()> {
        if self.tables.is_empty() {
            return Err(MigrateError::Config(
                "migration.tables must list at least one table".into(),
            ));
        }
        Ok(())
    }

    async fn execute(&self, conns: &Connections, cancel: &CancellationToken) -> Result<RunResult> {
        self.ensure_tables()?;

        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        info!("Starting migration run: {} ({} tables)", run_id, self.tables.len());

        let mut store = MappingStore::new(conns.mappings.clone());
        store.init().await?;

        let mut results = Vec::with_capacity(self.tables.len());

        for spec in &self.tables {
            let transform: Arc<dyn RowTransform> = match self.transforms.get(&spec.source_table) {
                Some(custom) => custom.clone(),
                None => Arc::new(ColumnTransform::from_spec(spec)?),
            };

            let result = TableMigrator::new(
                conns.source.as_ref(),
                conns.target.as_ref(),
                &mut store,
                self.config.target.schema.clone(),
            )
            .migrate(spec, transform.as_ref(), cancel)
            .await;

            results.push(result);
        }

        let completed_at = Utc::now();
        let result = RunResult {
            run_id,
            config_hash: self.config.hash(),
            status: RunStatus::from_tables(&results),
            started_at,
            completed_at,
            duration_seconds: (completed_at - started_at).num_milliseconds() as f64 / 1000.0,
            tables_total: results.len(),
            tables_done: results.iter().filter(|t| t.phase == TablePhase::Done).count(),
            tables_failed: results.iter().filter(|t| t.phase == TablePhase::Failed).count(),
            rows_succeeded: results.iter().map(|t| t.success_count).sum(),
            rows_failed: results.iter().map(|t| t.error_count).sum(),
            tables: results,
        };

        match result.status {
            RunStatus::Completed => info!(
                "Migration completed: {} tables, {} rows in {:.1}s",
                result.tables_total, result.rows_succeeded, result.duration_seconds
            ),
            RunStatus::CompletedWithErrors => warn!(
                "Migration completed with errors: {} rows migrated, {} rows failed",
                result.rows_succeeded, result.rows_failed
            ),
            RunStatus::Failed => error!(
                "Migration failed: {} of {} tables failed",
                result.tables_failed, result.tables_total
            ),
            RunStatus::Cancelled => warn!("Migration cancelled"),
        }

        Ok(result)
    }

    /// Open both connections, time a round trip on each, and close them.
    pub async fn health_check(&self) -> Result<HealthCheckResult> {
        let start = Instant::now();
        let source = MysqlReader::new(&self.config.source).await;
        let source_latency_ms = start.elapsed().as_millis() as u64;
        let source_error = match &source {
            Ok(reader) => {
                let err = reader.ping().await.err().map(|e| e.to_string());
                reader.close().await;
                err
            }
            Err(e) => Some(e.to_string()),
        };

        let start = Instant::now();
        let target = PgPool::new(&self.config.target).await;
        let target_latency_ms = start.elapsed().as_millis() as u64;
        let target_error = match &target {
            Ok(pool) => {
                let err = pool.ping().await.err().map(|e| e.to_string());
                pool.close().await;
                err
            }
            Err(e) => Some(e.to_string()),
        };

        let source_connected = source_error.is_none();
        let target_connected = target_error.is_none();
        Ok(HealthCheckResult {
            source_connected,
            source_latency_ms,
            source_error,
            target_connected,
            target_latency_ms,
            target_error,
            healthy: source_connected && target_connected,
        })
    }
}

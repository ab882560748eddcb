//! PostgreSQL target database operations.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::error::SqlState;
use tokio_postgres::{types::ToSql, Config as PgConfig, NoTls};
use tracing::{debug, info};

use crate::config::{TableSpec, TargetConfig};
use crate::core::{qualify_pg, quote_pg, Column, SqlValue};
use crate::error::{MigrateError, Result};

/// Trait for target database operations.
#[async_trait]
pub trait TargetWriter: Send + Sync {
    /// Remove every row of a table.
    async fn truncate_table(&self, schema: &str, table: &str, restart_identity: bool)
        -> Result<()>;

    /// Insert one row. Returns the `RETURNING` column as text when the
    /// statement requests one.
    async fn insert_row(&self, stmt: &InsertStatement, values: &[SqlValue])
        -> Result<Option<String>>;

    /// Column metadata in ordinal order.
    async fn describe_columns(&self, schema: &str, table: &str) -> Result<Vec<Column>>;

    /// Round-trip a trivial query.
    async fn ping(&self) -> Result<()>;

    /// Get the database type.
    fn db_type(&self) -> &str;

    /// Close all connections.
    async fn close(&self);
}

/// Positional-parameter insert for one destination table.
///
/// Parameters are declared as text and cast to the declared column type
/// (`$1::text::integer`), so one binding path serves every value variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertStatement {
    pub schema: String,
    pub table: String,
    pub columns: Vec<String>,
    pub casts: Vec<String>,
    pub returning: Option<String>,
}

impl InsertStatement {
    /// Build the statement for a table definition.
    pub fn for_spec(spec: &TableSpec, default_schema: &str) -> Result<Self> {
        let name = spec.target_name()?;
        Ok(Self {
            schema: name.schema_or(default_schema).to_string(),
            table: name.name.clone(),
            columns: spec.columns.iter().map(|c| c.name.clone()).collect(),
            casts: spec.columns.iter().map(|c| c.data_type.trim().to_string()).collect(),
            returning: spec.key_remap.as_ref().map(|r| r.target_column.clone()),
        })
    }

    /// `schema.table` without quoting, for logs.
    pub fn target(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }

    /// Render the SQL text.
    pub fn sql(&self) -> Result<String> {
        let col_list = self
            .columns
            .iter()
            .map(|c| quote_pg(c))
            .collect::<Result<Vec<_>>>()?
            .join(", ");

        let placeholders = self
            .casts
            .iter()
            .enumerate()
            .map(|(i, cast)| format!("${}::text::{}", i + 1, cast))
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            qualify_pg(&self.schema, &self.table)?,
            col_list,
            placeholders
        );
        if let Some(col) = &self.returning {
            sql.push_str(&format!(" RETURNING {}::text", quote_pg(col)?));
        }
        Ok(sql)
    }
}

/// PostgreSQL target pool implementation.
pub struct PgPool {
    pool: Pool,
    statement_timeout: Option<Duration>,
}

impl PgPool {
    /// Create a new PostgreSQL target pool and verify it with `SELECT 1`.
    pub async fn new(config: &TargetConfig) -> Result<Self> {
        Self::with_statement_timeout(config, None).await
    }

    /// Like [`PgPool::new`], with every session's `statement_timeout` set.
    /// The server cancels a statement that runs past it, so a timed-out
    /// insert never commits.
    pub async fn with_statement_timeout(
        config: &TargetConfig,
        statement_timeout: Option<Duration>,
    ) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.port);
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);
        if let Some(timeout) = statement_timeout {
            pg_config.options(&statement_timeout_option(timeout));
        }

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
        let pool = Pool::builder(mgr)
            .max_size(config.max_connections as usize)
            .build()
            .map_err(|e| MigrateError::connection(config.endpoint(), e))?;

        let client = pool
            .get()
            .await
            .map_err(|e| MigrateError::connection(config.endpoint(), e))?;

        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| MigrateError::connection(config.endpoint(), e))?;

        info!("Connected to PostgreSQL: {}", config.endpoint());

        Ok(Self {
            pool,
            statement_timeout,
        })
    }

    fn insert_error(&self, e: tokio_postgres::Error) -> MigrateError {
        match self.statement_timeout {
            Some(timeout) if e.code() == Some(&SqlState::QUERY_CANCELED) => {
                MigrateError::StatementTimeout {
                    seconds: timeout.as_secs(),
                }
            }
            _ => MigrateError::Target(e),
        }
    }

    /// Shared handle to the underlying pool (used by the mapping store).
    pub fn pool(&self) -> Pool {
        self.pool.clone()
    }
}

#[async_trait]
impl TargetWriter for PgPool {
    async fn truncate_table(
        &self,
        schema: &str,
        table: &str,
        restart_identity: bool,
    ) -> Result<()> {
        let client = self.pool.get().await?;

        let sql = format!(
            "TRUNCATE TABLE {}{}",
            qualify_pg(schema, table)?,
            if restart_identity { " RESTART IDENTITY" } else { "" }
        );
        client.batch_execute(&sql).await?;

        debug!("Truncated table {}.{}", schema, table);
        Ok(())
    }

    async fn insert_row(
        &self,
        stmt: &InsertStatement,
        values: &[SqlValue],
    ) -> Result<Option<String>> {
        let client = self.pool.get().await?;
        let prepared = client.prepare_cached(&stmt.sql()?).await?;

        let params: Vec<Box<dyn ToSql + Sync + Send>> =
            values.iter().map(sql_value_to_param).collect();
        let param_refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        if stmt.returning.is_some() {
            let row = client
                .query_one(&prepared, &param_refs)
                .await
                .map_err(|e| self.insert_error(e))?;
            Ok(row.try_get::<_, Option<String>>(0)?)
        } else {
            client
                .execute(&prepared, &param_refs)
                .await
                .map_err(|e| self.insert_error(e))?;
            Ok(None)
        }
    }

    async fn describe_columns(&self, schema: &str, table: &str) -> Result<Vec<Column>> {
        let client = self.pool.get().await?;

        let rows = client
            .query(
                "SELECT column_name::text,
                        CASE WHEN data_type IN ('USER-DEFINED', 'ARRAY')
                             THEN udt_name::text ELSE data_type::text END,
                        is_nullable = 'YES',
                        (column_default IS NOT NULL OR is_identity = 'YES')
                 FROM information_schema.columns
                 WHERE table_schema = $1 AND table_name = $2
                 ORDER BY ordinal_position",
                &[&schema, &table],
            )
            .await?;

        rows.iter()
            .map(|row| -> Result<Column> {
                Ok(Column {
                    name: row.try_get(0)?,
                    data_type: row.try_get(1)?,
                    is_nullable: row.try_get(2)?,
                    has_default: row.try_get(3)?,
                })
            })
            .collect()
    }

    async fn ping(&self) -> Result<()> {
        let client = self.pool.get().await?;
        client.simple_query("SELECT 1").await?;
        Ok(())
    }

    fn db_type(&self) -> &str {
        "postgres"
    }

    async fn close(&self) {
        self.pool.close();
        debug!("Closed PostgreSQL target pool");
    }
}

/// Startup `options` value setting the session statement timeout.
fn statement_timeout_option(timeout: Duration) -> String {
    format!("-c statement_timeout={}", timeout.as_millis())
}

/// Convert SqlValue to a boxed ToSql parameter.
/// Every value is sent as text; the statement's cast converts it.
fn sql_value_to_param(value: &SqlValue) -> Box<dyn ToSql + Sync + Send> {
    Box::new(value.to_text())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ColumnSpec, KeyRemap, UnresolvedPolicy};

    fn state_spec() -> TableSpec {
        TableSpec {
            source_table: "state".into(),
            target_table: "smartirb.state".into(),
            columns: vec![
                ColumnSpec::new("id", "integer"),
                ColumnSpec::new("name", "character varying(100)"),
                ColumnSpec::new("abbreviation", "varchar"),
            ],
            foreign_keys: Vec::new(),
            key_remap: None,
            on_unresolved: UnresolvedPolicy::Fail,
            restart_identity: true,
        }
    }

    #[test]
    fn test_insert_sql_lists_declared_columns_in_order() {
        let stmt = InsertStatement::for_spec(&state_spec(), "public").unwrap();
        assert_eq!(
            stmt.sql().unwrap(),
            "INSERT INTO \"smartirb\".\"state\" (\"id\", \"name\", \"abbreviation\") \
             VALUES ($1::text::integer, $2::text::character varying(100), $3::text::varchar)"
        );
        assert_eq!(stmt.target(), "smartirb.state");
    }

    #[test]
    fn test_statement_timeout_option_in_milliseconds() {
        assert_eq!(
            statement_timeout_option(Duration::from_secs(30)),
            "-c statement_timeout=30000"
        );
    }

    #[test]
    fn test_insert_sql_with_returning_and_default_schema() {
        let mut spec = state_spec();
        spec.target_table = "state".into();
        spec.columns.remove(0);
        spec.key_remap = Some(KeyRemap {
            source_field: "id".into(),
            target_column: "id".into(),
        });
        let stmt = InsertStatement::for_spec(&spec, "public").unwrap();
        assert_eq!(
            stmt.sql().unwrap(),
            "INSERT INTO \"public\".\"state\" (\"name\", \"abbreviation\") \
             VALUES ($1::text::character varying(100), $2::text::varchar) RETURNING \"id\"::text"
        );
    }
}

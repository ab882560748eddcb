//! MySQL/MariaDB source reader.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow, MySqlSslMode};
use sqlx::{Column as _, Row, TypeInfo, ValueRef};
use tracing::{debug, info};

use super::{ExtractedRow, SourceReader};
use crate::config::SourceConfig;
use crate::core::{quote_mysql, Column, SourceRow, SqlValue};
use crate::error::{MigrateError, Result, RowError};

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// MySQL/MariaDB source reader implementation.
pub struct MysqlReader {
    pool: MySqlPool,
    database: String,
}

impl MysqlReader {
    /// Connect and verify the connection with `SELECT 1`.
    pub async fn new(config: &SourceConfig) -> Result<Self> {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.user)
            .password(&config.password)
            .ssl_mode(MySqlSslMode::Preferred);

        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(POOL_CONNECTION_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(|e| MigrateError::connection(config.endpoint(), e))?;

        sqlx::query("SELECT 1")
            .fetch_one(&pool)
            .await
            .map_err(|e| MigrateError::connection(config.endpoint(), e))?;

        info!("Connected to MySQL source: {}", config.endpoint());

        Ok(Self {
            pool,
            database: config.database.clone(),
        })
    }

    /// Convert one MySQL row, decoding by the column type the server reports.
    fn row_to_source_row(row: &MySqlRow) -> std::result::Result<SourceRow, sqlx::Error> {
        let mut out = SourceRow::with_capacity(row.columns().len());
        for (idx, col) in row.columns().iter().enumerate() {
            let type_name = col.type_info().name().to_uppercase();
            let value = Self::decode_value(row, idx, &type_name)?;
            out.insert(col.name(), value);
        }
        Ok(out)
    }

    fn decode_value(
        row: &MySqlRow,
        idx: usize,
        type_name: &str,
    ) -> std::result::Result<SqlValue, sqlx::Error> {
        if row.try_get_raw(idx)?.is_null() {
            return Ok(SqlValue::Null);
        }

        let value = match type_name {
            "BOOLEAN" | "BOOL" => SqlValue::Bool(row.try_get::<bool, _>(idx)?),
            "TINYINT" => SqlValue::I16(row.try_get::<i8, _>(idx)? as i16),
            "TINYINT UNSIGNED" => SqlValue::I16(row.try_get::<u8, _>(idx)? as i16),
            "SMALLINT" => SqlValue::I16(row.try_get::<i16, _>(idx)?),
            "SMALLINT UNSIGNED" => SqlValue::I32(row.try_get::<u16, _>(idx)? as i32),
            "MEDIUMINT" | "INT" | "INTEGER" => SqlValue::I32(row.try_get::<i32, _>(idx)?),
            "MEDIUMINT UNSIGNED" | "INT UNSIGNED" | "INTEGER UNSIGNED" => {
                SqlValue::I64(row.try_get::<u32, _>(idx)? as i64)
            }
            "BIGINT" => SqlValue::I64(row.try_get::<i64, _>(idx)?),
            "BIGINT UNSIGNED" => {
                SqlValue::Decimal(rust_decimal::Decimal::from(row.try_get::<u64, _>(idx)?))
            }
            "FLOAT" => SqlValue::F32(row.try_get::<f32, _>(idx)?),
            "DOUBLE" | "REAL" => SqlValue::F64(row.try_get::<f64, _>(idx)?),
            "DECIMAL" | "NUMERIC" => SqlValue::Decimal(row.try_get::<rust_decimal::Decimal, _>(idx)?),
            "DATE" => SqlValue::Date(row.try_get::<chrono::NaiveDate, _>(idx)?),
            "TIME" => SqlValue::Time(row.try_get::<chrono::NaiveTime, _>(idx)?),
            "DATETIME" | "TIMESTAMP" => {
                SqlValue::DateTime(row.try_get::<chrono::NaiveDateTime, _>(idx)?)
            }
            "BINARY" | "VARBINARY" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT" => {
                SqlValue::Bytes(row.try_get::<Vec<u8>, _>(idx)?)
            }
            // CHAR, VARCHAR, TEXT, ENUM, SET, JSON and anything unrecognized
            _ => match row.try_get::<String, _>(idx) {
                Ok(s) => SqlValue::Text(s),
                Err(_) => SqlValue::Bytes(row.try_get::<Vec<u8>, _>(idx)?),
            },
        };
        Ok(value)
    }
}

#[async_trait]
impl SourceReader for MysqlReader {
    async fn fetch_all(&self, table: &str) -> Result<Vec<ExtractedRow>> {
        let sql = format!("SELECT * FROM {}", quote_mysql(table)?);
        debug!("{}", sql);

        let rows: Vec<MySqlRow> = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MigrateError::extract(table, e))?;

        Ok(rows
            .iter()
            .map(|row| Self::row_to_source_row(row).map_err(RowError::decode))
            .collect())
    }

    async fn describe_columns(&self, table: &str) -> Result<Vec<Column>> {
        let query = r#"
            SELECT
                CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                CAST(DATA_TYPE AS CHAR(255)) AS DATA_TYPE,
                IF(IS_NULLABLE = 'YES', 1, 0) AS is_nullable,
                IF(COLUMN_DEFAULT IS NOT NULL OR EXTRA LIKE '%auto_increment%', 1, 0) AS has_default
            FROM INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&self.database)
            .bind(table)
            .fetch_all(&self.pool)
            .await?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            columns.push(Column {
                name: row.try_get::<String, _>("COLUMN_NAME")?,
                data_type: row.try_get::<String, _>("DATA_TYPE")?,
                is_nullable: row.try_get::<i64, _>("is_nullable")? == 1,
                has_default: row.try_get::<i64, _>("has_default")? == 1,
            });
        }
        Ok(columns)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    fn db_type(&self) -> &str {
        "mysql"
    }

    async fn close(&self) {
        self.pool.close().await;
        debug!("Closed MySQL source pool");
    }
}

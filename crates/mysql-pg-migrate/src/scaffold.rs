//! Draft table specs from live schemas.
//!
//! For each `source:destination` pair the source and destination columns
//! are introspected. Columns present on both sides are kept in source
//! order; destination NOT NULL columns the source lacks are appended so
//! they are loaded with their type default, unless the database fills them
//! itself (DEFAULT or identity). The result is a starting point for a human
//! to edit, not a migration in itself.

use serde::Serialize;
use tracing::{debug, info};

use crate::config::{ColumnSpec, TableSpec, UnresolvedPolicy};
use crate::core::{Column, TableName};
use crate::error::{MigrateError, Result};
use crate::source::SourceReader;
use crate::target::TargetWriter;

/// Parse `SRC[:DST]`. The destination defaults to the source name.
pub fn parse_table_arg(arg: &str) -> Result<(String, String)> {
    let (src, dst) = match arg.split_once(':') {
        Some((src, dst)) => (src.trim(), dst.trim()),
        None => (arg.trim(), arg.trim()),
    };
    if src.is_empty() || dst.is_empty() {
        return Err(MigrateError::Config(format!(
            "expected SOURCE[:DESTINATION], got '{}'",
            arg
        )));
    }
    Ok((src.to_string(), dst.to_string()))
}

/// Build a table spec from the two column lists.
pub fn draft_table_spec(
    source_table: &str,
    target_table: &str,
    source_columns: &[Column],
    target_columns: &[Column],
) -> TableSpec {
    let mut columns: Vec<ColumnSpec> = source_columns
        .iter()
        .filter_map(|src| target_columns.iter().find(|dst| dst.name == src.name))
        .map(|dst| {
            let mut col = ColumnSpec::new(&dst.name, &dst.data_type);
            col.nullable = dst.is_nullable;
            col
        })
        .collect();

    for dst in target_columns {
        let missing = !columns.iter().any(|c| c.name == dst.name);
        if missing && !dst.is_nullable && !dst.has_default {
            debug!(
                "{}: {} is NOT NULL and missing from the source, loading its default",
                target_table, dst.name
            );
            columns.push(ColumnSpec::new(&dst.name, &dst.data_type));
        }
    }

    TableSpec {
        source_table: source_table.to_string(),
        target_table: target_table.to_string(),
        columns,
        foreign_keys: Vec::new(),
        key_remap: None,
        on_unresolved: UnresolvedPolicy::Fail,
        restart_identity: true,
    }
}

/// Introspect both databases and draft one spec per pair.
pub async fn scaffold(
    source: &dyn SourceReader,
    target: &dyn TargetWriter,
    default_schema: &str,
    pairs: &[(String, String)],
) -> Result<Vec<TableSpec>> {
    let mut specs = Vec::with_capacity(pairs.len());
    for (src, dst) in pairs {
        let source_columns = source.describe_columns(src).await?;
        if source_columns.is_empty() {
            return Err(MigrateError::Config(format!(
                "source table '{}' not found or has no columns",
                src
            )));
        }

        let name = TableName::parse(dst)?;
        let target_columns = target
            .describe_columns(name.schema_or(default_schema), &name.name)
            .await?;
        if target_columns.is_empty() {
            return Err(MigrateError::Config(format!(
                "destination table '{}' not found or has no columns",
                dst
            )));
        }

        let spec = draft_table_spec(src, dst, &source_columns, &target_columns);
        info!(
            "Drafted {} -> {} with {} columns",
            src,
            dst,
            spec.columns.len()
        );
        specs.push(spec);
    }
    Ok(specs)
}

#[derive(Serialize)]
struct TablesDocument<'a> {
    tables: &'a [TableSpec],
}

/// Render specs as a `tables:` YAML block for `migration.tables`.
pub fn render_yaml(specs: &[TableSpec]) -> Result<String> {
    Ok(serde_yaml::to_string(&TablesDocument { tables: specs })?)
}

//! Configuration validation.

use std::collections::HashSet;

use super::{Config, TableSpec};
use crate::core::identifier::{validate_identifier, validate_type_name};
use crate::core::SqlValue;
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    if config.source.host.is_empty() {
        return Err(MigrateError::Config("source.host is required".into()));
    }
    if config.source.database.is_empty() {
        return Err(MigrateError::Config("source.database is required".into()));
    }
    if config.source.user.is_empty() {
        return Err(MigrateError::Config("source.user is required".into()));
    }
    if config.source.r#type != "mysql" {
        return Err(MigrateError::Config(format!(
            "source.type must be 'mysql', got '{}'",
            config.source.r#type
        )));
    }

    // Target validation
    if config.target.host.is_empty() {
        return Err(MigrateError::Config("target.host is required".into()));
    }
    if config.target.database.is_empty() {
        return Err(MigrateError::Config("target.database is required".into()));
    }
    if config.target.user.is_empty() {
        return Err(MigrateError::Config("target.user is required".into()));
    }
    if config.target.r#type != "postgres" {
        return Err(MigrateError::Config(format!(
            "target.type must be 'postgres', got '{}'",
            config.target.r#type
        )));
    }
    validate_identifier(&config.target.schema)?;

    // Cannot migrate to the same database
    if config.source.host == config.target.host
        && config.source.port == config.target.port
        && config.source.database == config.target.database
    {
        return Err(MigrateError::Config(
            "source and target cannot be the same database".into(),
        ));
    }

    if config.source.max_connections == 0 || config.target.max_connections == 0 {
        return Err(MigrateError::Config(
            "max_connections must be at least 1".into(),
        ));
    }

    // Migration config validation
    validate_identifier(&config.migration.mapping_table)?;
    if let Some(0) = config.migration.row_timeout_secs {
        return Err(MigrateError::Config(
            "migration.row_timeout_secs must be at least 1".into(),
        ));
    }

    validate_tables(&config.migration.tables)
}

/// Validate table specs individually and as an ordered list.
pub fn validate_tables(tables: &[TableSpec]) -> Result<()> {
    let mut targets = HashSet::new();
    for table in tables {
        validate_table(table)?;
        if !targets.insert(table.target_table.as_str()) {
            return Err(MigrateError::Config(format!(
                "target table '{}' is listed more than once",
                table.target_table
            )));
        }
    }
    validate_dependency_order(tables)
}

fn validate_table(table: &TableSpec) -> Result<()> {
    let ctx = |msg: String| MigrateError::Config(format!("table '{}': {}", table.source_table, msg));

    validate_identifier(&table.source_table)?;
    table.target_name()?;

    if table.columns.is_empty() {
        return Err(ctx("at least one column is required".into()));
    }

    let mut names = HashSet::new();
    for col in &table.columns {
        validate_identifier(&col.name)?;
        validate_identifier(col.source_column())?;
        validate_type_name(&col.data_type)?;
        if !names.insert(col.name.as_str()) {
            return Err(ctx(format!("column '{}' is declared twice", col.name)));
        }
        if col.required && col.nullable {
            return Err(ctx(format!("column '{}' cannot be both required and nullable", col.name)));
        }
        if let Some(default) = &col.default {
            if col.required {
                return Err(ctx(format!("required column '{}' cannot have a default", col.name)));
            }
            SqlValue::from_yaml(default)?;
        }
    }

    let mut fk_columns = HashSet::new();
    for fk in &table.foreign_keys {
        if !names.contains(fk.column.as_str()) {
            return Err(ctx(format!("foreign key column '{}' is not a declared column", fk.column)));
        }
        if !fk_columns.insert(fk.column.as_str()) {
            return Err(ctx(format!("column '{}' has more than one foreign key", fk.column)));
        }
        validate_identifier(&fk.references_table)?;
        validate_identifier(&fk.references_field)?;
    }

    if let Some(remap) = &table.key_remap {
        validate_identifier(&remap.source_field)?;
        validate_identifier(&remap.target_column)?;
    }

    Ok(())
}

/// A foreign key into a table migrated in the same run must point at a table
/// listed earlier (or at itself), and that table must record mappings for
/// the referenced field.
fn validate_dependency_order(tables: &[TableSpec]) -> Result<()> {
    for (idx, table) in tables.iter().enumerate() {
        for fk in &table.foreign_keys {
            let Some(ref_idx) = tables
                .iter()
                .position(|t| t.source_table == fk.references_table)
            else {
                // Migrated by an earlier run; resolved from persisted mappings.
                continue;
            };

            if ref_idx > idx {
                return Err(MigrateError::Config(format!(
                    "table '{}' references '{}' which is migrated later; list '{}' first",
                    table.source_table, fk.references_table, fk.references_table
                )));
            }

            let referenced = &tables[ref_idx];
            let remaps_field = referenced
                .key_remap
                .as_ref()
                .is_some_and(|r| r.source_field == fk.references_field);
            if !remaps_field {
                return Err(MigrateError::Config(format!(
                    "table '{}' references {}.{} but '{}' has no key_remap for '{}'",
                    table.source_table,
                    fk.references_table,
                    fk.references_field,
                    fk.references_table,
                    fk.references_field
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        ColumnSpec, ForeignKeySpec, KeyRemap, MigrationConfig, SourceConfig, TargetConfig,
        UnresolvedPolicy,
    };

    fn table(source: &str) -> TableSpec {
        TableSpec {
            source_table: source.to_string(),
            target_table: format!("smartirb.{}", source),
            columns: vec![
                ColumnSpec::new("id", "integer"),
                ColumnSpec::new("name", "varchar"),
            ],
            foreign_keys: Vec::new(),
            key_remap: None,
            on_unresolved: UnresolvedPolicy::Fail,
            restart_identity: true,
        }
    }

    fn valid_config() -> Config {
        Config {
            source: SourceConfig {
                host: "localhost".to_string(),
                database: "legacy".to_string(),
                user: "root".to_string(),
                password: "password".to_string(),
                ..SourceConfig::default()
            },
            target: TargetConfig {
                host: "localhost".to_string(),
                database: "smartirb".to_string(),
                user: "postgres".to_string(),
                password: "password".to_string(),
                ..TargetConfig::default()
            },
            migration: MigrationConfig {
                tables: vec![table("state")],
                ..MigrationConfig::default()
            },
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_missing_source_host() {
        let mut config = valid_config();
        config.source.host = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_wrong_source_type() {
        let mut config = valid_config();
        config.source.r#type = "postgres".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_wrong_target_type() {
        let mut config = valid_config();
        config.target.r#type = "mysql".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_row_timeout_rejected() {
        let mut config = valid_config();
        config.migration.row_timeout_secs = Some(0);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let mut t = table("state");
        t.columns.push(ColumnSpec::new("id", "bigint"));
        let err = validate_tables(&[t]).unwrap_err();
        assert!(err.to_string().contains("declared twice"));
    }

    #[test]
    fn test_required_and_nullable_rejected() {
        let mut t = table("state");
        t.columns[1].required = true;
        t.columns[1].nullable = true;
        assert!(validate_tables(&[t]).is_err());
    }

    #[test]
    fn test_bad_data_type_rejected() {
        let mut t = table("state");
        t.columns[0].data_type = "int); DROP TABLE x; --".to_string();
        assert!(validate_tables(&[t]).is_err());
    }

    #[test]
    fn test_foreign_key_must_reference_declared_column() {
        let mut t = table("user");
        t.foreign_keys.push(ForeignKeySpec {
            column: "state_id".into(),
            references_table: "state".into(),
            references_field: "id".into(),
        });
        let err = validate_tables(&[t]).unwrap_err();
        assert!(err.to_string().contains("not a declared column"));
    }

    fn user_referencing_state() -> TableSpec {
        let mut user = table("user");
        user.columns.push(ColumnSpec::new("state_id", "integer"));
        user.foreign_keys.push(ForeignKeySpec {
            column: "state_id".into(),
            references_table: "state".into(),
            references_field: "id".into(),
        });
        user
    }

    fn state_with_remap() -> TableSpec {
        let mut state = table("state");
        state.key_remap = Some(KeyRemap {
            source_field: "id".into(),
            target_column: "id".into(),
        });
        state
    }

    #[test]
    fn test_dependency_order_accepted() {
        assert!(validate_tables(&[state_with_remap(), user_referencing_state()]).is_ok());
    }

    #[test]
    fn test_dependency_order_violation_rejected() {
        let err = validate_tables(&[user_referencing_state(), state_with_remap()]).unwrap_err();
        assert!(err.to_string().contains("migrated later"));
    }

    #[test]
    fn test_reference_requires_remap_on_referenced_table() {
        let err = validate_tables(&[table("state"), user_referencing_state()]).unwrap_err();
        assert!(err.to_string().contains("no key_remap"));
    }

    #[test]
    fn test_reference_to_table_outside_run_accepted() {
        assert!(validate_tables(&[user_referencing_state()]).is_ok());
    }

    #[test]
    fn test_source_config_debug_redacts_password() {
        let mut config = valid_config();
        config.source.password = "super_secret_password_123".to_string();
        let debug_output = format!("{:?}", config.source);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_password_123"));
    }

    #[test]
    fn test_target_config_debug_redacts_password() {
        let mut config = valid_config();
        config.target.password = "super_secret_password_456".to_string();
        let debug_output = format!("{:?}", config.target);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_password_456"));
    }
}

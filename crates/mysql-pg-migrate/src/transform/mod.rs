//! Row transformation.
//!
//! A [`RowTransform`] turns one source row into one destination row without
//! touching a database: foreign keys are translated through a
//! [`MappingLookup`] that the caller has already filled. Failures are
//! [`RowError`]s and only affect the row at hand.

use crate::config::{TableSpec, UnresolvedPolicy};
use crate::core::{DestinationRow, SourceRow, SqlValue};
use crate::error::{Result, RowError};
use crate::mapping::{MappingLookup, Resolution};

/// Convert a source row into a destination row.
pub trait RowTransform: Send + Sync {
    fn transform(
        &self,
        row: &SourceRow,
        lookup: &dyn MappingLookup,
    ) -> std::result::Result<DestinationRow, RowError>;
}

#[derive(Debug, Clone)]
struct ColumnPlan {
    name: String,
    source: String,
    nullable: bool,
    required: bool,
    default: SqlValue,
    reference: Option<(String, String)>,
}

/// Declarative transform built from a [`TableSpec`].
///
/// For every declared column, in order:
///
/// 1. read the source column (renamed when `source` is set);
/// 2. translate a non-null foreign key through the mapping lookup;
/// 3. reject a null `required` column;
/// 4. replace NULL in a non-nullable column with the explicit default, or
///    the implied default of its data type.
#[derive(Debug, Clone)]
pub struct ColumnTransform {
    columns: Vec<ColumnPlan>,
    on_unresolved: UnresolvedPolicy,
}

impl ColumnTransform {
    pub fn from_spec(spec: &TableSpec) -> Result<Self> {
        let columns = spec
            .columns
            .iter()
            .map(|col| -> Result<ColumnPlan> {
                let default = match &col.default {
                    Some(v) => SqlValue::from_yaml(v)?,
                    None => SqlValue::default_for_type(&col.data_type),
                };
                Ok(ColumnPlan {
                    name: col.name.clone(),
                    source: col.source_column().to_string(),
                    nullable: col.nullable,
                    required: col.required,
                    default,
                    reference: spec
                        .foreign_key_for(&col.name)
                        .map(|fk| (fk.references_table.clone(), fk.references_field.clone())),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            columns,
            on_unresolved: spec.on_unresolved,
        })
    }
}

impl RowTransform for ColumnTransform {
    fn transform(
        &self,
        row: &SourceRow,
        lookup: &dyn MappingLookup,
    ) -> std::result::Result<DestinationRow, RowError> {
        let mut out = DestinationRow::with_capacity(self.columns.len());

        for col in &self.columns {
            let mut value = row.get(&col.source).cloned().unwrap_or(SqlValue::Null);

            if let (Some((table, field)), Some(old)) = (&col.reference, value.to_text()) {
                match lookup.resolve(table, field, &old) {
                    Resolution::Resolved(new) => value = SqlValue::Text(new),
                    Resolution::Unresolved => {
                        if self.on_unresolved == UnresolvedPolicy::Fail {
                            return Err(RowError::UnresolvedReference {
                                column: col.name.clone(),
                                table: table.clone(),
                                field: field.clone(),
                                value: old,
                            });
                        }
                    }
                }
            }

            if value.is_null() {
                if col.required {
                    return Err(RowError::MissingRequired {
                        column: col.name.clone(),
                    });
                }
                if !col.nullable {
                    value = col.default.clone();
                }
            }

            out.insert(col.name.clone(), value);
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ColumnSpec, ForeignKeySpec};
    use crate::core::Row;
    use std::collections::HashMap;

    fn state_spec() -> TableSpec {
        TableSpec {
            source_table: "state".into(),
            target_table: "state".into(),
            columns: vec![
                ColumnSpec::new("id", "integer"),
                ColumnSpec::new("name", "varchar"),
                ColumnSpec::new("abbreviation", "varchar"),
            ],
            foreign_keys: vec![],
            key_remap: None,
            on_unresolved: UnresolvedPolicy::Fail,
            restart_identity: true,
        }
    }

    fn user_spec(policy: UnresolvedPolicy) -> TableSpec {
        let mut state_id = ColumnSpec::new("state_id", "integer");
        state_id.nullable = true;
        TableSpec {
            source_table: "user".into(),
            target_table: "user".into(),
            columns: vec![ColumnSpec::new("login", "varchar"), state_id],
            foreign_keys: vec![ForeignKeySpec {
                column: "state_id".into(),
                references_table: "state".into(),
                references_field: "id".into(),
            }],
            key_remap: None,
            on_unresolved: policy,
            restart_identity: true,
        }
    }

    fn no_mappings() -> HashMap<(String, String, String), String> {
        HashMap::new()
    }

    fn state_mappings() -> HashMap<(String, String, String), String> {
        let mut m = HashMap::new();
        m.insert(("state".into(), "id".into(), "7".into()), "1".into());
        m
    }

    #[test]
    fn test_null_name_becomes_empty_string() {
        let t = ColumnTransform::from_spec(&state_spec()).unwrap();
        let row = Row::new()
            .with("id", 7)
            .with("name", SqlValue::Null)
            .with("abbreviation", "OH");

        let out = t.transform(&row, &no_mappings()).unwrap();
        let values: Vec<_> = out.iter().map(|(c, v)| (c.to_string(), v.clone())).collect();
        assert_eq!(
            values,
            vec![
                ("id".to_string(), SqlValue::I32(7)),
                ("name".to_string(), SqlValue::Text(String::new())),
                ("abbreviation".to_string(), SqlValue::Text("OH".into())),
            ]
        );
    }

    #[test]
    fn test_absent_column_gets_type_default() {
        let t = ColumnTransform::from_spec(&state_spec()).unwrap();
        let row = Row::new().with("name", "Ohio").with("abbreviation", "OH");

        let out = t.transform(&row, &no_mappings()).unwrap();
        assert_eq!(out.get("id"), Some(&SqlValue::I32(0)));
    }

    #[test]
    fn test_explicit_default_wins() {
        let mut spec = state_spec();
        spec.columns[2].default = Some(serde_yaml::Value::String("??".into()));
        let t = ColumnTransform::from_spec(&spec).unwrap();

        let out = t
            .transform(&Row::new().with("id", 1).with("name", "X"), &no_mappings())
            .unwrap();
        assert_eq!(out.get("abbreviation"), Some(&SqlValue::Text("??".into())));
    }

    #[test]
    fn test_nullable_keeps_null() {
        let mut spec = state_spec();
        spec.columns[1].nullable = true;
        let t = ColumnTransform::from_spec(&spec).unwrap();

        let out = t
            .transform(&Row::new().with("id", 1).with("abbreviation", "OH"), &no_mappings())
            .unwrap();
        assert_eq!(out.get("name"), Some(&SqlValue::Null));
    }

    #[test]
    fn test_renamed_source_column() {
        let mut spec = state_spec();
        spec.columns[2].source = Some("abbr".into());
        let t = ColumnTransform::from_spec(&spec).unwrap();

        let row = Row::new().with("id", 1).with("name", "Ohio").with("abbr", "OH");
        let out = t.transform(&row, &no_mappings()).unwrap();
        assert_eq!(out.get("abbreviation"), Some(&SqlValue::Text("OH".into())));
        assert!(out.get("abbr").is_none());
    }

    #[test]
    fn test_required_null_fails_row() {
        let mut spec = state_spec();
        spec.columns[0].required = true;
        let t = ColumnTransform::from_spec(&spec).unwrap();

        let err = t
            .transform(&Row::new().with("name", "Ohio"), &no_mappings())
            .unwrap_err();
        assert_eq!(err, RowError::MissingRequired { column: "id".into() });
    }

    #[test]
    fn test_foreign_key_resolved() {
        let t = ColumnTransform::from_spec(&user_spec(UnresolvedPolicy::Fail)).unwrap();
        let row = Row::new().with("login", "ann").with("state_id", 7);

        let out = t.transform(&row, &state_mappings()).unwrap();
        assert_eq!(out.get("state_id"), Some(&SqlValue::Text("1".into())));
    }

    #[test]
    fn test_unresolved_reference_fails_by_default() {
        let t = ColumnTransform::from_spec(&user_spec(UnresolvedPolicy::Fail)).unwrap();
        let row = Row::new().with("login", "ann").with("state_id", 99);

        let err = t.transform(&row, &state_mappings()).unwrap_err();
        assert_eq!(
            err,
            RowError::UnresolvedReference {
                column: "state_id".into(),
                table: "state".into(),
                field: "id".into(),
                value: "99".into(),
            }
        );
    }

    #[test]
    fn test_unresolved_reference_kept_when_configured() {
        let t = ColumnTransform::from_spec(&user_spec(UnresolvedPolicy::KeepOriginal)).unwrap();
        let row = Row::new().with("login", "ann").with("state_id", 99);

        let out = t.transform(&row, &state_mappings()).unwrap();
        assert_eq!(out.get("state_id"), Some(&SqlValue::I32(99)));
    }

    #[test]
    fn test_null_foreign_key_not_looked_up() {
        let t = ColumnTransform::from_spec(&user_spec(UnresolvedPolicy::Fail)).unwrap();
        let row = Row::new().with("login", "ann").with("state_id", SqlValue::Null);

        let out = t.transform(&row, &no_mappings()).unwrap();
        assert_eq!(out.get("state_id"), Some(&SqlValue::Null));
    }
}

//! Identifier validation and quoting for dynamically built SQL.
//!
//! Table and column names come from configuration and cannot be bound as
//! statement parameters, so every name is validated and quoted before it is
//! interpolated. Column type names are interpolated into parameter casts
//! (`$1::text::integer`) and are restricted to a conservative character set.

use std::fmt;

use crate::error::{MigrateError, Result};

/// Maximum identifier length (conservative limit across databases).
/// - PostgreSQL: 63 bytes
/// - MySQL: 64 characters
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Validate an identifier for security issues.
///
/// Rejects empty identifiers, identifiers containing null bytes and
/// identifiers exceeding the maximum length.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MigrateError::Config(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(MigrateError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(MigrateError::Config(format!(
            "SECURITY: Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Validate a PostgreSQL type name used in a parameter cast.
///
/// Accepts letters, digits, underscores, spaces, parentheses, commas, dots
/// and array brackets, which covers `character varying(255)`,
/// `numeric(10,2)`, `timestamp with time zone` and `text[]`.
pub fn validate_type_name(data_type: &str) -> Result<()> {
    let trimmed = data_type.trim();
    if trimmed.is_empty() {
        return Err(MigrateError::Config("Column data_type cannot be empty".to_string()));
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || " _(),.[]".contains(c);
    if !trimmed.chars().all(allowed) {
        return Err(MigrateError::Config(format!(
            "SECURITY: data_type contains unsupported characters: {:?}",
            data_type
        )));
    }
    Ok(())
}

/// Quote a PostgreSQL identifier.
///
/// Escapes double quotes by doubling them and wraps in double quotes.
pub fn quote_pg(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Quote a MySQL identifier using backticks.
pub fn quote_mysql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("`{}`", name.replace('`', "``")))
}

/// Qualify a PostgreSQL table name with schema.
pub fn qualify_pg(schema: &str, table: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_pg(schema)?, quote_pg(table)?))
}

/// A possibly schema-qualified table name such as `smartirb.state`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName {
    pub schema: Option<String>,
    pub name: String,
}

impl TableName {
    /// Split on the first dot. Names without a dot carry no schema.
    pub fn parse(qualified: &str) -> Result<Self> {
        let qualified = qualified.trim();
        let parsed = match qualified.split_once('.') {
            Some((schema, name)) => TableName {
                schema: Some(schema.to_string()),
                name: name.to_string(),
            },
            None => TableName {
                schema: None,
                name: qualified.to_string(),
            },
        };
        if let Some(schema) = &parsed.schema {
            validate_identifier(schema)?;
        }
        validate_identifier(&parsed.name)?;
        Ok(parsed)
    }

    /// Schema, falling back to `default_schema` when unqualified.
    pub fn schema_or<'a>(&'a self, default_schema: &'a str) -> &'a str {
        self.schema.as_deref().unwrap_or(default_schema)
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier_normal() {
        assert!(validate_identifier("users").is_ok());
        assert!(validate_identifier("my_table").is_ok());
        assert!(validate_identifier("column with spaces").is_ok());
    }

    #[test]
    fn test_validate_identifier_rejects_empty() {
        let result = validate_identifier("");
        assert!(result.unwrap_err().to_string().contains("empty"));
    }

    #[test]
    fn test_validate_identifier_rejects_null_byte() {
        let result = validate_identifier("table\0name");
        assert!(result.unwrap_err().to_string().contains("null byte"));
    }

    #[test]
    fn test_validate_identifier_rejects_too_long() {
        let long_name = "a".repeat(MAX_IDENTIFIER_LENGTH + 1);
        let result = validate_identifier(&long_name);
        assert!(result.unwrap_err().to_string().contains("maximum length"));
    }

    #[test]
    fn test_quote_pg_escapes_quotes() {
        assert_eq!(quote_pg("users").unwrap(), "\"users\"");
        assert_eq!(quote_pg("table\"name").unwrap(), "\"table\"\"name\"");
    }

    #[test]
    fn test_quote_mysql_escapes_backticks() {
        assert_eq!(quote_mysql("user").unwrap(), "`user`");
        assert_eq!(quote_mysql("we`ird").unwrap(), "`we``ird`");
    }

    #[test]
    fn test_qualify_pg() {
        assert_eq!(qualify_pg("smartirb", "state").unwrap(), "\"smartirb\".\"state\"");
    }

    #[test]
    fn test_validate_type_name() {
        assert!(validate_type_name("integer").is_ok());
        assert!(validate_type_name("character varying(255)").is_ok());
        assert!(validate_type_name("numeric(10,2)").is_ok());
        assert!(validate_type_name("text[]").is_ok());
        assert!(validate_type_name("").is_err());
        assert!(validate_type_name("int; DROP TABLE x").is_err());
        assert!(validate_type_name("int -- x").is_err());
    }

    #[test]
    fn test_table_name_parse() {
        let qualified = TableName::parse("smartirb.state").unwrap();
        assert_eq!(qualified.schema.as_deref(), Some("smartirb"));
        assert_eq!(qualified.name, "state");
        assert_eq!(qualified.to_string(), "smartirb.state");

        let bare = TableName::parse("user").unwrap();
        assert_eq!(bare.schema_or("public"), "public");
        assert!(TableName::parse("smartirb.").is_err());
    }
}

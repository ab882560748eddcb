//! Core types shared by the readers, writers and the migration engine.
//!
//! - [`value`]: typed SQL values and default substitution
//! - [`row`]: ordered source and destination rows
//! - [`schema`]: column metadata used by the scaffold generator
//! - [`identifier`]: identifier validation and quoting

pub mod identifier;
pub mod row;
pub mod schema;
pub mod value;

pub use identifier::{qualify_pg, quote_mysql, quote_pg, validate_identifier, TableName};
pub use row::{DestinationRow, Row, SourceRow};
pub use schema::Column;
pub use value::SqlValue;

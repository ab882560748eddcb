//! Column metadata read from `information_schema`.

use serde::{Deserialize, Serialize};

/// Column metadata for a source or destination table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Data type as reported by the database.
    pub data_type: String,

    /// Whether NULL is accepted.
    pub is_nullable: bool,

    /// Whether the database fills the column itself (DEFAULT, identity).
    pub has_default: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, is_nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_nullable,
            has_default: false,
        }
    }

    #[must_use]
    pub fn with_default(mut self) -> Self {
        self.has_default = true;
        self
    }
}

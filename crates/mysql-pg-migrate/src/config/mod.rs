//! Configuration loading and validation.
//!
//! A run is configured by one explicit [`Config`] value: connection
//! parameters for both databases plus the ordered list of table specs.
//! Connection parameters may be overridden from `MYSQL_*` and `PG_*`
//! environment variables; the lookup is injected so nothing reads process
//! state implicitly.

mod types;
mod validation;

pub use types::*;
pub use validation::validate_tables;

use crate::error::{MigrateError, Result};
use sha2::{Digest, Sha256};
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load from a YAML file, apply environment overrides, then validate.
    pub fn load_with_env<P, F>(path: P, lookup: F) -> Result<Self>
    where
        P: AsRef<Path>,
        F: Fn(&str) -> Option<String>,
    {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&content)?;
        config.apply_env_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Override connection parameters from `MYSQL_*` / `PG_*` variables.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = |name: &str, value: String| -> Result<u16> {
            value
                .parse()
                .map_err(|_| MigrateError::Config(format!("{} must be a port number, got '{}'", name, value)))
        };

        if let Some(v) = lookup("MYSQL_HOST") {
            self.source.host = v;
        }
        if let Some(v) = lookup("MYSQL_PORT") {
            self.source.port = port("MYSQL_PORT", v)?;
        }
        if let Some(v) = lookup("MYSQL_USER") {
            self.source.user = v;
        }
        if let Some(v) = lookup("MYSQL_PASSWORD") {
            self.source.password = v;
        }
        if let Some(v) = lookup("MYSQL_DATABASE") {
            self.source.database = v;
        }

        if let Some(v) = lookup("PG_HOST") {
            self.target.host = v;
        }
        if let Some(v) = lookup("PG_PORT") {
            self.target.port = port("PG_PORT", v)?;
        }
        if let Some(v) = lookup("PG_USER") {
            self.target.user = v;
        }
        if let Some(v) = lookup("PG_PASSWORD") {
            self.target.password = v;
        }
        if let Some(v) = lookup("PG_DATABASE") {
            self.target.database = v;
        }
        if let Some(v) = lookup("PG_SCHEMA") {
            self.target.schema = v;
        }

        Ok(())
    }

    /// Compute a SHA256 hash of the configuration, reported with each run.
    pub fn hash(&self) -> String {
        let yaml = serde_yaml::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(yaml.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

impl SourceConfig {
    /// Endpoint description without credentials, for logs and errors.
    pub fn endpoint(&self) -> String {
        format!("mysql://{}:{}/{}", self.host, self.port, self.database)
    }
}

impl TargetConfig {
    /// Endpoint description without credentials, for logs and errors.
    pub fn endpoint(&self) -> String {
        format!("postgres://{}:{}/{}", self.host, self.port, self.database)
    }
}

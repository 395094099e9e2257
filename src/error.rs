//! Error types for ddiff operations

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DdiffError>;

#[derive(Error, Debug)]
pub enum DdiffError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Schema mismatch: {message}")]
    SchemaMismatch { message: String },

    #[error("Staging store error: {message}")]
    Staging { message: String },

    #[error("Source '{source_name}' error: {message}")]
    Source { source_name: String, message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },
}

impl DdiffError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn schema_mismatch(msg: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            message: msg.into(),
        }
    }

    pub fn staging(msg: impl Into<String>) -> Self {
        Self::Staging {
            message: msg.into(),
        }
    }

    pub fn source(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Source {
            source_name: name.into(),
            message: msg.into(),
        }
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: msg.into(),
        }
    }

    /// Configuration errors and schema mismatches are caught before any row is compared
    pub fn is_spec_shape_error(&self) -> bool {
        matches!(self, Self::Config { .. } | Self::SchemaMismatch { .. })
    }
}

//! Error types for configuration loading and record store access.
//!
//! Metric calculators are total and never fail; these cover the edges
//! around them.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Weights must be finite, non-negative and sum to 1.0.
    #[error("invalid weights: {0}")]
    InvalidWeights(String),

    #[error("parallelism must be at least 1")]
    InvalidParallelism,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("student not found: {0}")]
    UnknownStudent(String),

    #[error("invalid stored value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
}

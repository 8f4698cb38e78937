//! Orgmap - planning-increment org charts from Grist tables.
//!
//! This library provides the pipeline behind the `orgmap` CLI:
//! loading the five source tables, building the organizational model for a
//! period, scoring assignment fragmentation, laying the model out on a
//! paginated canvas and rendering the diagram and reports.

pub mod cli;
pub mod commands;
pub mod config;
pub mod layout;
pub mod models;
pub mod narrative;
pub mod render;
pub mod source;

pub use config::ConfigError;

/// Library-level error type for Orgmap operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Spreadsheet error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No data source available: {0}")]
    SourceUnavailable(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for Orgmap operations.
pub type Result<T> = std::result::Result<T, Error>;

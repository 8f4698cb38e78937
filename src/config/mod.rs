//! Column mapping and environment configuration.
//!
//! ## mapping.kdl - Column-name mapping
//!
//! Binds the five logical tables and their fields to the actual table and
//! column names of a Grist document, plus the role tokens meaning "PM" and
//! "PO". Layers, lowest to highest precedence:
//! - Embedded default (compiled into the binary)
//! - System: `~/.config/orgmap/mapping.kdl`
//! - Project: `<dir>/config/mapping.kdl`
//! - Explicit: `--mapping <file>`
//!
//! Each layer only overrides the keys it names.
//!
//! ## Environment
//!
//! - `GRIST_API_KEY`, `GRIST_DOC_ID`, `GRIST_BASE_URL` - REST source
//! - `LLM_API_KEY`, `LLM_BASE_URL`, `LLM_MODEL`, `LLM_MAX_WORKERS` - optional
//!   narrative enrichment
//!
//! Use the [`resolver`] module for layered resolution.

pub mod embedded;
pub mod resolver;
pub mod schema;

pub use resolver::{
    ApiConfig, LlmConfig, ResolvedMapping, ValueSource, resolve_mapping, resolve_mapping_with,
};
pub use schema::{LogicalTable, Mapping, MappingLayer};

/// Errors raised while loading or applying the column mapping.
///
/// Always fatal: a run never retries or degrades around a configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("mapping does not name the {table} table (set tables.{table})")]
    MissingTable { table: String },

    #[error("column {table}.{column} not found")]
    MissingColumn { table: String, column: String },

    #[error("cannot parse mapping: {0}")]
    Parse(String),

    #[error("invalid mapping: {0}")]
    Invalid(String),
}

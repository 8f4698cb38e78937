//! Layered resolution for the column mapping, plus environment settings.
//!
//! ## Mapping precedence (highest to lowest)
//!
//! 1. `--mapping <file>` (CLI flag)
//! 2. Project `<dir>/config/mapping.kdl`
//! 3. System `~/.config/orgmap/mapping.kdl`
//! 4. Embedded default
//!
//! ## Environment
//!
//! Grist REST access and LLM enrichment are configured from environment
//! variables only; secrets never live in mapping files.

use crate::config::ConfigError;
use crate::config::embedded::default_layer;
use crate::config::schema::{Mapping, MappingLayer};
use crate::{Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const GRIST_API_KEY_ENV: &str = "GRIST_API_KEY";
pub const GRIST_DOC_ID_ENV: &str = "GRIST_DOC_ID";
pub const GRIST_BASE_URL_ENV: &str = "GRIST_BASE_URL";
pub const LLM_API_KEY_ENV: &str = "LLM_API_KEY";
pub const LLM_BASE_URL_ENV: &str = "LLM_BASE_URL";
pub const LLM_MODEL_ENV: &str = "LLM_MODEL";
pub const LLM_MAX_WORKERS_ENV: &str = "LLM_MAX_WORKERS";

pub const DEFAULT_GRIST_BASE_URL: &str = "https://docs.getgrist.com";
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_LLM_MAX_WORKERS: usize = 8;
pub const MAX_LLM_WORKERS: usize = 256;

/// File name of a mapping layer.
pub const MAPPING_FILE_NAME: &str = "mapping.kdl";

/// Tracks where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum ValueSource {
    /// Compiled-in default mapping
    Embedded,
    /// User-level mapping file
    System(PathBuf),
    /// Project-level mapping file
    Project(PathBuf),
    /// File passed with `--mapping`
    CliFlag(PathBuf),
    /// Environment variable
    EnvVar(String),
    /// Built-in default value
    Default,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::Embedded => write!(f, "embedded"),
            ValueSource::System(path) => write!(f, "system:{}", path.display()),
            ValueSource::Project(path) => write!(f, "project:{}", path.display()),
            ValueSource::CliFlag(path) => write!(f, "cli:{}", path.display()),
            ValueSource::EnvVar(name) => write!(f, "env:{}", name),
            ValueSource::Default => write!(f, "default"),
        }
    }
}

/// Paths consulted during mapping resolution.
#[derive(Debug, Clone, Default)]
pub struct MappingPaths {
    pub system: Option<PathBuf>,
    pub project: Option<PathBuf>,
    pub explicit: Option<PathBuf>,
}

impl MappingPaths {
    /// Standard locations for a working directory.
    pub fn for_dir(workdir: &Path, explicit: Option<&Path>) -> Self {
        Self {
            system: system_mapping_path(),
            project: Some(project_mapping_path(workdir)),
            explicit: explicit.map(Path::to_path_buf),
        }
    }
}

/// `~/.config/orgmap/mapping.kdl`, when a config dir exists.
pub fn system_mapping_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("orgmap").join(MAPPING_FILE_NAME))
}

/// `<dir>/config/mapping.kdl`.
pub fn project_mapping_path(workdir: &Path) -> PathBuf {
    workdir.join("config").join(MAPPING_FILE_NAME)
}

/// Fully resolved mapping with per-key source tracking.
#[derive(Debug, Clone)]
pub struct ResolvedMapping {
    pub mapping: Mapping,
    /// Merged layer, used to print the effective mapping
    pub layer: MappingLayer,
    /// Winning layer for each `section.key` path
    pub sources: BTreeMap<String, ValueSource>,
    /// Layers that were actually applied, lowest precedence first
    pub applied: Vec<ValueSource>,
}

impl ResolvedMapping {
    /// Source of a `section.key` path.
    pub fn source_of(&self, path: &str) -> Option<&ValueSource> {
        self.sources.get(path)
    }
}

fn read_layer(path: &Path) -> Result<MappingLayer> {
    let content = std::fs::read_to_string(path)?;
    MappingLayer::parse(&content).map_err(|e| match e {
        ConfigError::Parse(msg) => {
            Error::Config(ConfigError::Parse(format!("{}: {}", path.display(), msg)))
        }
        ConfigError::Invalid(msg) => {
            Error::Config(ConfigError::Invalid(format!("{}: {}", path.display(), msg)))
        }
        other => Error::Config(other),
    })
}

/// Resolve the mapping for a working directory.
pub fn resolve_mapping(workdir: &Path, explicit: Option<&Path>) -> Result<ResolvedMapping> {
    resolve_mapping_with(&MappingPaths::for_dir(workdir, explicit))
}

/// Resolve the mapping from explicit layer paths.
///
/// Missing system and project files are skipped. A missing explicit file is
/// an error.
pub fn resolve_mapping_with(paths: &MappingPaths) -> Result<ResolvedMapping> {
    let mut merged = default_layer()?;
    let mut sources: BTreeMap<String, ValueSource> = merged
        .paths()
        .map(|p| (p.to_string(), ValueSource::Embedded))
        .collect();
    let mut applied = vec![ValueSource::Embedded];

    let mut layers: Vec<(PathBuf, ValueSource)> = Vec::new();
    if let Some(ref path) = paths.system {
        if path.exists() {
            layers.push((path.clone(), ValueSource::System(path.clone())));
        }
    }
    if let Some(ref path) = paths.project {
        if path.exists() {
            layers.push((path.clone(), ValueSource::Project(path.clone())));
        }
    }
    if let Some(ref path) = paths.explicit {
        if !path.exists() {
            return Err(Error::Config(ConfigError::Invalid(format!(
                "mapping file not found: {}",
                path.display()
            ))));
        }
        layers.push((path.clone(), ValueSource::CliFlag(path.clone())));
    }

    for (path, source) in layers {
        let layer = read_layer(&path)?;
        tracing::debug!(path = %path.display(), keys = layer.paths().count(), "applying mapping layer");
        for key in layer.paths() {
            sources.insert(key.to_string(), source.clone());
        }
        merged.merge(&layer);
        applied.push(source);
    }

    let mapping = Mapping::from_layer(&merged)?;
    Ok(ResolvedMapping {
        mapping,
        layer: merged,
        sources,
        applied,
    })
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Grist REST API settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub base_url: String,
    pub doc_id: String,
    pub api_key: String,
}

impl ApiConfig {
    /// Read from the process environment.
    ///
    /// Returns the names of the missing variables when incomplete.
    pub fn from_env() -> std::result::Result<Self, Vec<&'static str>> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> std::result::Result<Self, Vec<&'static str>> {
        let api_key = clean(lookup(GRIST_API_KEY_ENV));
        let doc_id = clean(lookup(GRIST_DOC_ID_ENV));
        let base_url = clean(lookup(GRIST_BASE_URL_ENV))
            .unwrap_or_else(|| DEFAULT_GRIST_BASE_URL.to_string());

        let mut missing = Vec::new();
        if api_key.is_none() {
            missing.push(GRIST_API_KEY_ENV);
        }
        if doc_id.is_none() {
            missing.push(GRIST_DOC_ID_ENV);
        }

        match (api_key, doc_id) {
            (Some(api_key), Some(doc_id)) => Ok(Self {
                base_url: base_url.trim_end_matches('/').to_string(),
                doc_id,
                api_key,
            }),
            _ => Err(missing),
        }
    }
}

/// OpenAI-compatible chat endpoint settings for narrative enrichment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    /// Worker pool bound, clamped to 1..=256
    pub max_workers: usize,
}

impl LlmConfig {
    /// Read from the process environment.
    pub fn from_env() -> std::result::Result<Self, Vec<&'static str>> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> std::result::Result<Self, Vec<&'static str>> {
        let Some(api_key) = clean(lookup(LLM_API_KEY_ENV)) else {
            return Err(vec![LLM_API_KEY_ENV]);
        };
        let base_url = clean(lookup(LLM_BASE_URL_ENV))
            .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string());
        let model = clean(lookup(LLM_MODEL_ENV)).unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string());
        let max_workers = clean(lookup(LLM_MAX_WORKERS_ENV))
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(DEFAULT_LLM_MAX_WORKERS)
            .clamp(1, MAX_LLM_WORKERS);

        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            max_workers,
        })
    }
}

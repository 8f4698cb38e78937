//! Artifact writers.
//!
//! Everything here turns an already-built model, layout and narrative map
//! into text or, for the epic workbook, bytes. Nothing in this module makes
//! placement decisions.

pub mod drawio;
pub mod reports;
pub mod xlsx;

pub use drawio::render_drawio;
pub use reports::{
    ArtifactNames, FragmentationKpis, RunFacts, fragmentation_csv, readme, run_summary,
    synthesis_markdown,
};
pub use xlsx::epics_workbook;

use crate::Result;
use crate::models::{AlertLists, BuiltModel, FragmentationRow};
use crate::narrative::{EnrichmentStats, NarrativeMap};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Structured hand-off written as `<period>_model.json`.
#[derive(Debug, Serialize)]
pub struct ModelExport<'a> {
    pub generated_at: &'a str,
    pub source: &'a str,
    pub model: &'a BuiltModel,
    pub narratives: &'a NarrativeMap,
    pub fragmentation: &'a [FragmentationRow],
    pub alerts: &'a AlertLists,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<&'a EnrichmentStats>,
}

impl ModelExport<'_> {
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Write one artifact into `dir`, creating the directory if needed.
pub fn write_artifact(dir: &Path, name: &str, contents: impl AsRef<[u8]>) -> Result<PathBuf> {
    let contents = contents.as_ref();
    std::fs::create_dir_all(dir)?;
    let path = dir.join(name);
    std::fs::write(&path, contents)?;
    tracing::info!(path = %path.display(), bytes = contents.len(), "wrote artifact");
    Ok(path)
}

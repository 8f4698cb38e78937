//! Command implementations for Orgmap CLI.
//!
//! Each command returns a result struct implementing [`Output`]; `main`
//! decides between JSON and human text. The pipeline stages are:
//! - load the five tables from the selected source
//! - build the model for the requested period
//! - score fragmentation and derive the alert lists
//! - enrich team narratives (local, or through the LLM endpoint)
//! - lay out and render

use crate::config::{
    ApiConfig, LlmConfig, ResolvedMapping, ValueSource, resolve_mapping,
};
use crate::layout::{Layout, compute_layout};
use crate::models::{
    AlertLists, BuiltModel, FragmentationRow, ModelStats, alert_lists, build_model,
    compute_fragmentation, parse_requested_period,
};
use crate::narrative::llm::ChatClient;
use crate::narrative::{EnrichmentStats, NarrativeMap, SummaryBackend, enrich, local_narratives};
use crate::render::{
    ArtifactNames, FragmentationKpis, ModelExport, RunFacts, epics_workbook, fragmentation_csv,
    readme, render_drawio, run_summary, synthesis_markdown, write_artifact,
};
use crate::source::{RawTables, SourceRequest, find_default_grist, load_tables};
use crate::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Command results that can be serialized to JSON or formatted for humans.
pub trait Output {
    /// Serialize to JSON string.
    fn to_json(&self) -> String;

    /// Format for human-readable output.
    fn to_human(&self) -> String;
}

fn json_of<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!(r#"{{"error": "{}"}}"#, e))
}

/// Where a command runs and which mapping file it was given.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub dir: PathBuf,
    pub mapping: Option<PathBuf>,
}

impl Workspace {
    pub fn new(dir: impl Into<PathBuf>, mapping: Option<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            mapping,
        }
    }

    fn resolve_mapping(&self) -> Result<ResolvedMapping> {
        resolve_mapping(&self.dir, self.mapping.as_deref())
    }

    /// `<dir>/output` unless overridden.
    pub fn output_dir(&self, out: Option<&Path>) -> PathBuf {
        out.map(Path::to_path_buf)
            .unwrap_or_else(|| self.dir.join("output"))
    }
}

/// Tables plus the mapping used to read them.
struct Loaded {
    mapping: ResolvedMapping,
    tables: RawTables,
    source_label: String,
}

fn load(ws: &Workspace, request: &SourceRequest) -> Result<Loaded> {
    let mapping = ws.resolve_mapping()?;
    let (tables, source_label) = load_tables(&ws.dir, request, &mapping.mapping)?;
    Ok(Loaded {
        mapping,
        tables,
        source_label,
    })
}

/// Model, fragmentation and alert lists for one period.
struct Analysis {
    model: BuiltModel,
    rows: Vec<FragmentationRow>,
    alerts: AlertLists,
}

fn analyze_period(loaded: &Loaded, period: &str) -> Result<Analysis> {
    let mapping = &loaded.mapping.mapping;
    let model = build_model(&loaded.tables, mapping, period)?;
    let rows = compute_fragmentation(&loaded.tables, mapping)?;
    let alerts = alert_lists(&loaded.tables, mapping, &rows);
    Ok(Analysis {
        model,
        rows,
        alerts,
    })
}

/// Team narratives; the LLM path only when requested and configured.
fn narratives(model: &BuiltModel, llm: bool) -> (NarrativeMap, Option<EnrichmentStats>) {
    if !llm {
        return (local_narratives(model), None);
    }
    match LlmConfig::from_env() {
        Ok(config) => {
            let workers = config.max_workers;
            let client = ChatClient::new(config);
            tracing::info!(model = %client.model(), workers, "summarizing team narratives");
            let (map, stats) = enrich(model, Some(&client as &dyn SummaryBackend), workers);
            (map, Some(stats))
        }
        Err(missing) => {
            tracing::warn!(missing = %missing.join(", "), "LLM settings incomplete, using local summaries");
            (local_narratives(model), None)
        }
    }
}

fn generated_at() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M").to_string()
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| format!("  {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n")
}

// === full-run ===

#[derive(Serialize)]
pub struct FullRunResult {
    pub period: String,
    pub source: String,
    pub pages: i64,
    pub stats: ModelStats,
    pub fragmentation: FragmentationKpis,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<EnrichmentStats>,
    pub artifacts: Vec<PathBuf>,
    #[serde(skip)]
    summary: String,
}

impl Output for FullRunResult {
    fn to_json(&self) -> String {
        json_of(self)
    }

    fn to_human(&self) -> String {
        format!(
            "{}\nArtifacts ({} pages) :\n{}",
            self.summary,
            self.pages,
            display_paths(&self.artifacts)
        )
    }
}

/// Build every artifact for a period.
pub fn full_run(
    ws: &Workspace,
    period: &str,
    request: &SourceRequest,
    llm: bool,
    out: Option<&Path>,
) -> Result<FullRunResult> {
    let period = parse_requested_period(period)?;
    let loaded = load(ws, request)?;
    let analysis = analyze_period(&loaded, &period)?;
    let (narratives, enrichment) = narratives(&analysis.model, llm);
    let layout = compute_layout(&analysis.model, &narratives, Some(&analysis.alerts));
    tracing::info!(pages = layout.pages, "layout computed");

    let model = &analysis.model;
    let kpis = FragmentationKpis::from_rows(&analysis.rows);
    let summary = run_summary(
        model,
        &RunFacts {
            source_label: &loaded.source_label,
            kpis,
            features_table_empty: loaded.tables.features.is_empty(),
            enrichment: enrichment.as_ref(),
        },
    );

    let stamp = generated_at();
    let names = ArtifactNames::for_period(&model.period);
    let dir = ws.output_dir(out);
    let export = ModelExport {
        generated_at: &stamp,
        source: &loaded.source_label,
        model,
        narratives: &narratives,
        fragmentation: &analysis.rows,
        alerts: &analysis.alerts,
        enrichment: enrichment.as_ref(),
    }
    .to_json_pretty()?;

    let artifacts = vec![
        write_artifact(
            &dir,
            &names.diagram,
            &render_drawio(model, &layout, &narratives, Some(&analysis.alerts)),
        )?,
        write_artifact(&dir, &names.fragmentation_csv, &fragmentation_csv(&analysis.rows))?,
        write_artifact(&dir, &names.synthesis, &synthesis_markdown(&analysis.rows))?,
        write_artifact(&dir, &names.run_summary, &summary)?,
        write_artifact(&dir, &names.readme, &readme(model, &names, &stamp))?,
        write_artifact(&dir, &names.model_json, &export)?,
        write_artifact(&dir, &names.epics_workbook, epics_workbook(model)?)?,
    ];

    Ok(FullRunResult {
        period: model.period.clone(),
        source: loaded.source_label,
        pages: layout.pages,
        stats: model.stats.clone(),
        fragmentation: kpis,
        enrichment,
        artifacts,
        summary,
    })
}

// === diagram ===

#[derive(Serialize)]
pub struct DiagramResult {
    pub period: String,
    pub source: String,
    pub pages: i64,
    pub path: PathBuf,
}

impl Output for DiagramResult {
    fn to_json(&self) -> String {
        json_of(self)
    }

    fn to_human(&self) -> String {
        format!(
            "Diagram for {} ({} pages, source: {})\n  {}",
            self.period,
            self.pages,
            self.source,
            self.path.display()
        )
    }
}

/// Write only the `.drawio` diagram.
pub fn diagram(
    ws: &Workspace,
    period: &str,
    request: &SourceRequest,
    llm: bool,
    out: Option<&Path>,
) -> Result<DiagramResult> {
    let period = parse_requested_period(period)?;
    let loaded = load(ws, request)?;
    let analysis = analyze_period(&loaded, &period)?;
    let (narratives, _) = narratives(&analysis.model, llm);
    let layout = compute_layout(&analysis.model, &narratives, Some(&analysis.alerts));
    let names = ArtifactNames::for_period(&analysis.model.period);
    let path = write_artifact(
        &ws.output_dir(out),
        &names.diagram,
        &render_drawio(&analysis.model, &layout, &narratives, Some(&analysis.alerts)),
    )?;

    Ok(DiagramResult {
        period: analysis.model.period,
        source: loaded.source_label,
        pages: layout.pages,
        path,
    })
}

// === excel ===

#[derive(Serialize)]
pub struct ExcelResult {
    pub period: String,
    pub source: String,
    pub epics: usize,
    pub path: PathBuf,
}

impl Output for ExcelResult {
    fn to_json(&self) -> String {
        json_of(self)
    }

    fn to_human(&self) -> String {
        format!(
            "Epic workbook for {} ({} epics, source: {})\n  {}",
            self.period,
            self.epics,
            self.source,
            self.path.display()
        )
    }
}

/// Write only the epic summary workbook.
pub fn excel(
    ws: &Workspace,
    period: &str,
    request: &SourceRequest,
    out: Option<&Path>,
) -> Result<ExcelResult> {
    let period = parse_requested_period(period)?;
    let loaded = load(ws, request)?;
    let model = build_model(&loaded.tables, &loaded.mapping.mapping, &period)?;
    let names = ArtifactNames::for_period(&model.period);
    let path = write_artifact(&ws.output_dir(out), &names.epics_workbook, epics_workbook(&model)?)?;

    Ok(ExcelResult {
        epics: model.stats.epics_total,
        period: model.period,
        source: loaded.source_label,
        path,
    })
}

// === analyze ===

#[derive(Serialize)]
pub struct AnalyzeResult {
    pub source: String,
    pub people: usize,
    pub fragmentation: FragmentationKpis,
    pub artifacts: Vec<PathBuf>,
}

impl Output for AnalyzeResult {
    fn to_json(&self) -> String {
        json_of(self)
    }

    fn to_human(&self) -> String {
        format!(
            "Fragmentation ({} personnes affectées, source: {})\n  >100% : {}\n  multi-équipes : {}\n  alertes : {}\nArtifacts :\n{}",
            self.people,
            self.source,
            self.fragmentation.over_100,
            self.fragmentation.multi_team,
            self.fragmentation.alerts,
            display_paths(&self.artifacts)
        )
    }
}

/// Fragmentation CSV and synthesis, period-independent.
pub fn analyze(ws: &Workspace, request: &SourceRequest, out: Option<&Path>) -> Result<AnalyzeResult> {
    let loaded = load(ws, request)?;
    let rows = compute_fragmentation(&loaded.tables, &loaded.mapping.mapping)?;
    let names = ArtifactNames::analysis();
    let dir = ws.output_dir(out);
    let artifacts = vec![
        write_artifact(&dir, &names.fragmentation_csv, &fragmentation_csv(&rows))?,
        write_artifact(&dir, &names.synthesis, &synthesis_markdown(&rows))?,
    ];
    Ok(AnalyzeResult {
        source: loaded.source_label,
        people: rows.len(),
        fragmentation: FragmentationKpis::from_rows(&rows),
        artifacts,
    })
}

// === model ===

#[derive(Serialize)]
pub struct ModelResult {
    pub source: String,
    #[serde(flatten)]
    pub model: BuiltModel,
}

impl Output for ModelResult {
    fn to_json(&self) -> String {
        json_of(self)
    }

    fn to_human(&self) -> String {
        let m = &self.model;
        let mut lines = vec![format!(
            "{} : {} équipes, {} epics ({} séparées), {} features",
            m.period, m.stats.teams, m.stats.epics_total, m.stats.epics_separate, m.stats.features_period
        )];
        for team in &m.teams {
            lines.push(format!(
                "- {} [{}] : {} epics, {} membres",
                team.name,
                team.id,
                team.epics.len(),
                team.members.len()
            ));
            for epic in &team.epics {
                lines.push(format!("    {} [{}]", epic.name, epic.id));
            }
        }
        if !m.separate_epics.is_empty() {
            lines.push("Epics séparées :".to_string());
            for epic in &m.separate_epics {
                lines.push(format!("    {} [{}]", epic.name, epic.id));
            }
        }
        lines.join("\n")
    }
}

/// Build and return the model for a period.
pub fn model(ws: &Workspace, period: &str, request: &SourceRequest) -> Result<ModelResult> {
    let period = parse_requested_period(period)?;
    let loaded = load(ws, request)?;
    let model = build_model(&loaded.tables, &loaded.mapping.mapping, &period)?;
    Ok(ModelResult {
        source: loaded.source_label,
        model,
    })
}

// === layout ===

#[derive(Serialize)]
pub struct LayoutResult {
    pub period: String,
    #[serde(flatten)]
    pub layout: Layout,
}

impl Output for LayoutResult {
    fn to_json(&self) -> String {
        json_of(self)
    }

    fn to_human(&self) -> String {
        let l = &self.layout;
        let mut lines = vec![format!(
            "{} : {} pages, {} équipes, {} epics, {} epics séparées",
            self.period,
            l.pages,
            l.teams.len(),
            l.epic_boxes.len(),
            l.separate_epics.len()
        )];
        for team in &l.teams {
            let r = team.rect;
            lines.push(format!(
                "- team {} [{}] col {} @ ({}, {}) {}x{}",
                team.team_id, team.theme, team.column, r.x, r.y, r.width, r.height
            ));
        }
        lines.join("\n")
    }
}

/// Compute the page layout for a period, with local narratives.
pub fn layout(ws: &Workspace, period: &str, request: &SourceRequest) -> Result<LayoutResult> {
    let period = parse_requested_period(period)?;
    let loaded = load(ws, request)?;
    let analysis = analyze_period(&loaded, &period)?;
    let narratives = local_narratives(&analysis.model);
    let layout = compute_layout(&analysis.model, &narratives, Some(&analysis.alerts));
    Ok(LayoutResult {
        period: analysis.model.period,
        layout,
    })
}

// === config ===

#[derive(Serialize)]
pub struct MappingEntry {
    pub key: String,
    pub value: String,
    pub source: ValueSource,
}

#[derive(Serialize)]
pub struct ConfigShowResult {
    pub entries: Vec<MappingEntry>,
    pub layers: Vec<ValueSource>,
    #[serde(skip)]
    kdl: String,
}

impl Output for ConfigShowResult {
    fn to_json(&self) -> String {
        json_of(self)
    }

    fn to_human(&self) -> String {
        let mut out = self.kdl.trim_end().to_string();
        out.push_str("\n\n// sources\n");
        for entry in &self.entries {
            out.push_str(&format!("// {} = {}\n", entry.key, entry.source));
        }
        out.trim_end().to_string()
    }
}

/// Resolved mapping, as KDL plus per-key sources.
pub fn config_show(ws: &Workspace) -> Result<ConfigShowResult> {
    let resolved = ws.resolve_mapping()?;
    let entries = resolved
        .layer
        .paths()
        .filter_map(|key| {
            let value = resolved.layer.get(key)?;
            let source = resolved.source_of(key)?.clone();
            Some(MappingEntry {
                key: key.to_string(),
                value: value.to_string(),
                source,
            })
        })
        .collect();
    Ok(ConfigShowResult {
        entries,
        layers: resolved.applied.clone(),
        kdl: resolved.layer.to_kdl().to_string(),
    })
}

#[derive(Serialize)]
pub struct ConfigCheckResult {
    pub mapping_ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping_error: Option<String>,
    pub grist_api_missing: Vec<&'static str>,
    pub llm_missing: Vec<&'static str>,
    pub default_grist: Option<PathBuf>,
}

impl Output for ConfigCheckResult {
    fn to_json(&self) -> String {
        json_of(self)
    }

    fn to_human(&self) -> String {
        fn status(missing: &[&str]) -> String {
            if missing.is_empty() {
                "ok".to_string()
            } else {
                format!("missing {}", missing.join(", "))
            }
        }
        let mapping = match &self.mapping_error {
            None => "ok".to_string(),
            Some(e) => format!("error: {}", e),
        };
        let grist = match &self.default_grist {
            Some(path) => path.display().to_string(),
            None => "none".to_string(),
        };
        format!(
            "Mapping: {}\nGrist API: {}\nLLM: {}\nLocal .grist: {}",
            mapping,
            status(&self.grist_api_missing),
            status(&self.llm_missing),
            grist
        )
    }
}

/// Report which settings are missing. Never fails on missing settings.
pub fn config_check(ws: &Workspace) -> Result<ConfigCheckResult> {
    let mapping_error = ws.resolve_mapping().err().map(|e| e.to_string());
    Ok(ConfigCheckResult {
        mapping_ok: mapping_error.is_none(),
        mapping_error,
        grist_api_missing: ApiConfig::from_env().err().unwrap_or_default(),
        llm_missing: LlmConfig::from_env().err().unwrap_or_default(),
        default_grist: find_default_grist(&ws.dir),
    })
}

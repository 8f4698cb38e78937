//! Data sources for the five logical tables.
//!
//! A source fetches and flattens rows; it does no joining. Three sources exist:
//! - [`GristFile`] - a `.grist` document (SQLite) on disk
//! - [`GristApi`] - the Grist REST API
//! - [`Demo`] - an embedded fixture for trying the pipeline without data
//!
//! [`select_source`] picks one from CLI flags and the working directory.

pub mod api;
pub mod demo;
pub mod grist_file;

pub use api::GristApi;
pub use demo::Demo;
pub use grist_file::GristFile;

use crate::config::{ApiConfig, LogicalTable, Mapping};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// One flat row: column name to raw cell value.
pub type Row = serde_json::Map<String, Value>;

/// A table as loaded from a source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    /// Declared columns, known even when there are no rows
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

static NULL: Value = Value::Null;

fn normalize_column_name(name: &str) -> String {
    name.trim()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

impl Table {
    /// Create an empty table with declared columns.
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    /// Create a table from rows, declaring columns in first-seen order.
    pub fn from_rows(name: impl Into<String>, rows: Vec<Row>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for row in &rows {
            for key in row.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }
        Self {
            name: name.into(),
            columns,
            rows,
        }
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Find the actual name of a column that may have drifted.
    ///
    /// Exact match on `preferred` first, then a case- and punctuation-insensitive
    /// match against `preferred` and each alias in order.
    pub fn resolve_column(&self, preferred: &str, aliases: &[&str]) -> Option<&str> {
        if let Some(c) = self.columns.iter().find(|c| *c == preferred) {
            return Some(c.as_str());
        }
        std::iter::once(preferred)
            .chain(aliases.iter().copied())
            .map(normalize_column_name)
            .find_map(|wanted| {
                self.columns
                    .iter()
                    .find(|c| normalize_column_name(c) == wanted)
            })
            .map(String::as_str)
    }
}

/// Cell accessor that treats a missing column or key as null.
pub fn cell<'a>(row: &'a Row, column: Option<&str>) -> &'a Value {
    column.and_then(|c| row.get(c)).unwrap_or(&NULL)
}

/// The five tables a model is built from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTables {
    pub teams: Table,
    pub people: Table,
    pub epics: Table,
    pub features: Table,
    pub assignments: Table,
}

impl RawTables {
    /// Assemble from tables returned in [`LogicalTable::ALL`] order.
    pub fn from_loaded(mut loaded: Vec<Table>) -> Result<Self> {
        if loaded.len() != LogicalTable::ALL.len() {
            return Err(Error::Other(format!(
                "expected {} tables, got {}",
                LogicalTable::ALL.len(),
                loaded.len()
            )));
        }
        let assignments = loaded.remove(4);
        let features = loaded.remove(3);
        let epics = loaded.remove(2);
        let people = loaded.remove(1);
        let teams = loaded.remove(0);
        Ok(Self {
            teams,
            people,
            epics,
            features,
            assignments,
        })
    }

    pub fn get(&self, table: LogicalTable) -> &Table {
        match table {
            LogicalTable::Teams => &self.teams,
            LogicalTable::People => &self.people,
            LogicalTable::Epics => &self.epics,
            LogicalTable::Features => &self.features,
            LogicalTable::Assignments => &self.assignments,
        }
    }
}

/// Anything that can produce the five raw tables.
pub trait TableSource {
    /// Human-readable label for run summaries.
    fn label(&self) -> String;

    fn load(&self, mapping: &Mapping) -> Result<RawTables>;
}

/// Source selection flags, as given on the command line.
#[derive(Debug, Clone, Default)]
pub struct SourceRequest {
    pub demo: bool,
    pub file: Option<PathBuf>,
    pub api: bool,
}

/// Newest `.grist` file in `<workdir>/data`, if any.
pub fn find_default_grist(workdir: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(workdir.join("data")).ok()?;
    entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("grist"))
        })
        .filter_map(|p| {
            let modified = std::fs::metadata(&p).and_then(|m| m.modified()).ok()?;
            Some((modified, p))
        })
        .max()
        .map(|(_, p)| p)
}

fn no_source_message(workdir: &Path) -> String {
    format!(
        "no .grist file found in {}; pass --source <file>, set GRIST_API_KEY and GRIST_DOC_ID with --api, or try --demo",
        workdir.join("data").display()
    )
}

/// Pick a source.
///
/// Precedence: `--demo`, `--source`, `--api` (falling back to the newest
/// `data/*.grist` when the API environment is incomplete), then the newest
/// `data/*.grist`.
pub fn select_source(workdir: &Path, request: &SourceRequest) -> Result<Box<dyn TableSource>> {
    if request.demo {
        return Ok(Box::new(Demo));
    }
    if let Some(ref file) = request.file {
        return Ok(Box::new(GristFile::new(file.clone())));
    }
    if request.api {
        match ApiConfig::from_env() {
            Ok(cfg) => return Ok(Box::new(GristApi::new(cfg))),
            Err(missing) => {
                tracing::warn!(missing = %missing.join(", "), "Grist API settings incomplete, falling back to local file");
            }
        }
    }
    match find_default_grist(workdir) {
        Some(path) => Ok(Box::new(GristFile::new(path))),
        None => Err(Error::SourceUnavailable(no_source_message(workdir))),
    }
}

/// Load tables, falling back from a failing API source to the newest local file.
pub fn load_tables(
    workdir: &Path,
    request: &SourceRequest,
    mapping: &Mapping,
) -> Result<(RawTables, String)> {
    let source = select_source(workdir, request)?;
    let label = source.label();
    tracing::info!(source = %label, "loading tables");
    match source.load(mapping) {
        Ok(tables) => {
            log_counts(&tables);
            Ok((tables, label))
        }
        Err(Error::Http(msg)) if request.api => {
            tracing::warn!(error = %msg, "Grist API failed, falling back to local file");
            let path = find_default_grist(workdir)
                .ok_or_else(|| Error::SourceUnavailable(no_source_message(workdir)))?;
            let fallback = GristFile::new(path);
            let tables = fallback.load(mapping)?;
            log_counts(&tables);
            Ok((tables, fallback.label()))
        }
        Err(e) => Err(e),
    }
}

fn log_counts(tables: &RawTables) {
    tracing::info!(
        teams = tables.teams.len(),
        people = tables.people.len(),
        epics = tables.epics.len(),
        features = tables.features.len(),
        assignments = tables.assignments.len(),
        "tables loaded"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_from_rows_collects_columns_in_order() {
        let table = Table::from_rows(
            "T",
            vec![row(json!({"id": 1, "Nom": "a"})), row(json!({"id": 2, "Extra": true}))],
        );
        assert!(table.has_column("Nom"));
        assert!(table.has_column("Extra"));
        assert_eq!(table.columns.len(), 3);
    }

    #[test]
    fn test_resolve_column_exact_then_normalized() {
        let table = Table::new(
            "Epics",
            vec!["id".into(), "Equipe_portant_l_Epic".into(), "nom".into()],
        );
        assert_eq!(table.resolve_column("nom", &[]), Some("nom"));
        assert_eq!(table.resolve_column("Nom", &[]), Some("nom"));
        assert_eq!(
            table.resolve_column("Equipe", &["EquipePortantLEpic"]),
            Some("Equipe_portant_l_Epic")
        );
        assert_eq!(table.resolve_column("Owner", &["Team"]), None);
    }

    #[test]
    fn test_cell_missing_is_null() {
        let r = row(json!({"a": 1}));
        assert_eq!(cell(&r, Some("a")), &json!(1));
        assert_eq!(cell(&r, Some("b")), &Value::Null);
        assert_eq!(cell(&r, None), &Value::Null);
    }

    #[test]
    fn test_find_default_grist() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(find_default_grist(tmp.path()), None);

        let data = tmp.path().join("data");
        std::fs::create_dir_all(&data).unwrap();
        std::fs::write(data.join("notes.txt"), "x").unwrap();
        assert_eq!(find_default_grist(tmp.path()), None);

        std::fs::write(data.join("org.GRIST"), "").unwrap();
        assert_eq!(find_default_grist(tmp.path()), Some(data.join("org.GRIST")));
    }

    #[test]
    fn test_select_source_precedence() {
        let tmp = TempDir::new().unwrap();
        let request = SourceRequest {
            demo: true,
            file: Some(tmp.path().join("x.grist")),
            api: true,
        };
        assert_eq!(select_source(tmp.path(), &request).unwrap().label(), "demo");

        let request = SourceRequest {
            demo: false,
            file: Some(tmp.path().join("x.grist")),
            api: false,
        };
        assert!(
            select_source(tmp.path(), &request)
                .unwrap()
                .label()
                .contains("x.grist")
        );
    }

    #[test]
    fn test_no_source_is_unavailable() {
        let tmp = TempDir::new().unwrap();
        let err = select_source(tmp.path(), &SourceRequest::default()).err().unwrap();
        assert!(matches!(err, Error::SourceUnavailable(_)));
    }
}

//! Joins the five raw tables into a [`BuiltModel`] for one period.
//!
//! Only a missing required column in a non-empty table is an error. Every other
//! anomaly (bad reference, blank name, empty table, missing optional column)
//! degrades to a documented default.

use crate::config::{ConfigError, Mapping};
use crate::models::{
    AssignmentLine, BuiltModel, Epic, ModelStats, Team, UNKNOWN_PERSON, feature_in_period,
    normalize_period, resolve_ref, resolve_ref_list,
};
use crate::source::{RawTables, Row, Table, cell};
use crate::{Error, Result};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Aliases tried for the team display-name column.
pub const TEAM_NAME_ALIASES: [&str; 6] = ["Nom", "Name", "Libelle", "Label", "Titre", "Title"];

/// Aliases tried for the epic next-period intention column.
pub const EPIC_NEXT_INTENTION_ALIASES: [&str; 3] = [
    "Intention_prochain_Increment_a_3_mois",
    "Intention_du_prochain_Increment_ou_MVP_impact_a_3_mois_",
    "Intention prochain Increment a 3 mois",
];

/// Preferred name and aliases of the epic owning-team column.
pub const EPIC_OWNER_COLUMN: &str = "Equipe";
pub const EPIC_OWNER_ALIASES: [&str; 4] =
    ["Equipe_portant_l_Epic", "EquipePortantLEpic", "Team", "OwnerTeam"];

const ID_COLUMN: &str = "id";

/// Render a cell as display text. Null becomes the empty string.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => {
            if let Some(f) = n.as_f64().filter(|_| !n.is_i64() && !n.is_u64()) {
                if f.fract() == 0.0 && f.abs() < 1e15 {
                    return format!("{}", f as i64);
                }
            }
            n.to_string()
        }
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Blank, whitespace, or a spreadsheet null spelled out as text.
pub fn is_blank_like(s: &str) -> bool {
    let t = s.trim();
    t.is_empty() || ["nan", "none", "null"].contains(&t.to_lowercase().as_str())
}

/// Read a charge cell as a non-negative float. Anything unreadable is 0.0.
pub fn parse_charge(value: &Value) -> f64 {
    let raw = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s
            .trim()
            .trim_end_matches('%')
            .trim()
            .replace(',', ".")
            .parse::<f64>()
            .unwrap_or(0.0),
        _ => 0.0,
    };
    if raw.is_finite() && raw > 0.0 { raw } else { 0.0 }
}

fn require_column(table: &Table, column: &str) -> Result<()> {
    if table.is_empty() || table.has_column(column) {
        return Ok(());
    }
    Err(Error::Config(ConfigError::MissingColumn {
        table: table.name.clone(),
        column: column.to_string(),
    }))
}

fn row_id(row: &Row) -> Option<i64> {
    resolve_ref(cell(row, Some(ID_COLUMN)))
}

/// One assignment row after reference resolution.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedAssignment {
    pub team: Option<i64>,
    pub epic: Option<i64>,
    pub person: Option<i64>,
    pub label: String,
    pub role: String,
    pub charge: f64,
}

impl ResolvedAssignment {
    pub fn is_named(&self) -> bool {
        !self.label.is_empty() && self.label != UNKNOWN_PERSON
    }
}

#[derive(Debug, Default)]
struct Roster {
    members: BTreeSet<String>,
    pms: BTreeSet<String>,
    pos: BTreeSet<String>,
}

/// Fields read from one epics-table row.
#[derive(Debug, Clone, Default)]
pub(crate) struct EpicRecord {
    pub name: String,
    pub description: String,
    pub intention_current: String,
    pub intention_next: String,
}

/// Everything needed to materialize an [`Epic`] by id.
struct EpicCatalog {
    records: HashMap<i64, EpicRecord>,
    lines: HashMap<i64, Vec<AssignmentLine>>,
    pos: HashMap<i64, Vec<String>>,
    features: HashMap<i64, Vec<String>>,
}

impl EpicCatalog {
    fn build(&self, id: i64, is_separate: bool) -> Epic {
        let record = self.records.get(&id).cloned().unwrap_or_default();
        let name = if record.name.trim().is_empty() {
            format!("Epic {}", id)
        } else {
            record.name.trim().to_string()
        };
        Epic {
            id,
            name,
            description: record.description,
            intention_current: record.intention_current,
            intention_next: record.intention_next,
            assignments: self.lines.get(&id).cloned().unwrap_or_default(),
            features: self.features.get(&id).cloned().unwrap_or_default(),
            po_list: self.pos.get(&id).cloned().unwrap_or_default(),
            is_separate,
        }
    }
}

pub(crate) fn validate_assignment_columns(tables: &RawTables, mapping: &Mapping) -> Result<()> {
    let cols = &mapping.columns;
    require_column(&tables.people, &cols.person_label)?;
    for column in [
        &cols.assignment_team,
        &cols.assignment_person,
        &cols.assignment_charge,
        &cols.assignment_role,
    ] {
        require_column(&tables.assignments, column)?;
    }
    Ok(())
}

fn validate_columns(tables: &RawTables, mapping: &Mapping) -> Result<()> {
    let cols = &mapping.columns;
    validate_assignment_columns(tables, mapping)?;
    require_column(&tables.epics, &cols.epic_name)?;
    for column in [&cols.feature_epic, &cols.feature_name, &cols.feature_period] {
        require_column(&tables.features, column)?;
    }
    if !tables.teams.is_empty()
        && tables
            .teams
            .resolve_column(&cols.team_name, &TEAM_NAME_ALIASES)
            .is_none()
    {
        return Err(Error::Config(ConfigError::MissingColumn {
            table: tables.teams.name.clone(),
            column: cols.team_name.clone(),
        }));
    }
    Ok(())
}

pub(crate) fn person_labels(people: &Table, label_column: &str) -> HashMap<i64, String> {
    let mut labels = HashMap::new();
    for row in &people.rows {
        if let Some(id) = row_id(row) {
            labels
                .entry(id)
                .or_insert_with(|| cell_text(cell(row, Some(label_column))).trim().to_string());
        }
    }
    labels
}

pub(crate) fn resolve_assignments(
    assignments: &Table,
    mapping: &Mapping,
    labels: &HashMap<i64, String>,
) -> Vec<ResolvedAssignment> {
    let cols = &mapping.columns;
    let epic_column = assignments
        .has_column(&cols.assignment_epic)
        .then_some(cols.assignment_epic.as_str());

    assignments
        .rows
        .iter()
        .map(|row| {
            let person = resolve_ref(cell(row, Some(&cols.assignment_person)));
            let label = person
                .and_then(|id| labels.get(&id))
                .filter(|l| !l.is_empty())
                .cloned()
                .unwrap_or_else(|| UNKNOWN_PERSON.to_string());
            ResolvedAssignment {
                team: resolve_ref(cell(row, Some(&cols.assignment_team))),
                epic: resolve_ref(cell(row, epic_column)),
                person,
                label,
                role: cell_text(cell(row, Some(&cols.assignment_role))).trim().to_string(),
                charge: parse_charge(cell(row, Some(&cols.assignment_charge))),
            }
        })
        .collect()
}

fn team_rosters(rows: &[ResolvedAssignment], mapping: &Mapping) -> HashMap<i64, Roster> {
    let mut rosters: HashMap<i64, Roster> = HashMap::new();
    for a in rows.iter().filter(|a| a.charge > 0.0) {
        let Some(team) = a.team else { continue };
        let roster = rosters.entry(team).or_default();
        if a.person.is_some() {
            roster.members.insert(a.label.clone());
        }
        if a.is_named() {
            if a.role == mapping.roles.pm {
                roster.pms.insert(a.label.clone());
            }
            if a.role == mapping.roles.po {
                roster.pos.insert(a.label.clone());
            }
        }
    }
    rosters
}

type EpicLines = (HashMap<i64, Vec<AssignmentLine>>, HashMap<i64, Vec<String>>);

fn epic_lines(rows: &[ResolvedAssignment], mapping: &Mapping) -> EpicLines {
    let mut lines: HashMap<i64, Vec<AssignmentLine>> = HashMap::new();
    let mut pos: BTreeMap<i64, BTreeSet<String>> = BTreeMap::new();
    for a in rows {
        let Some(epic) = a.epic else { continue };
        lines.entry(epic).or_default().push(AssignmentLine {
            person: a.label.clone(),
            role: a.role.clone(),
            charge: a.charge,
        });
        if a.charge > 0.0 && a.is_named() && a.role == mapping.roles.po {
            pos.entry(epic).or_default().insert(a.label.clone());
        }
    }
    let pos = pos
        .into_iter()
        .map(|(id, names)| (id, names.into_iter().collect()))
        .collect();
    (lines, pos)
}

/// Period-scoped features grouped by epic, plus the epics in first-seen order
/// and the number of period rows.
struct PeriodFeatures {
    by_epic: HashMap<i64, Vec<String>>,
    order: Vec<i64>,
    count: usize,
}

fn period_features(features: &Table, mapping: &Mapping, period: &str) -> PeriodFeatures {
    let cols = &mapping.columns;
    let mut out = PeriodFeatures {
        by_epic: HashMap::new(),
        order: Vec::new(),
        count: 0,
    };
    for row in &features.rows {
        let tag = cell_text(cell(row, Some(&cols.feature_period)));
        if !feature_in_period(&tag, period) {
            continue;
        }
        out.count += 1;
        let name = cell_text(cell(row, Some(&cols.feature_name)));
        if is_blank_like(&name) {
            continue;
        }
        let Some(epic) = resolve_ref(cell(row, Some(&cols.feature_epic))) else {
            continue;
        };
        if !out.by_epic.contains_key(&epic) {
            out.order.push(epic);
        }
        out.by_epic
            .entry(epic)
            .or_default()
            .push(name.trim().to_string());
    }
    out
}

pub(crate) fn epic_records(epics: &Table, mapping: &Mapping) -> HashMap<i64, EpicRecord> {
    let cols = &mapping.columns;
    let description = epics.resolve_column(&cols.epic_description, &[]);
    let current = epics.resolve_column(&cols.epic_intention_current, &[]);
    let next = epics.resolve_column(&cols.epic_intention_next, &EPIC_NEXT_INTENTION_ALIASES);

    let mut records = HashMap::new();
    for row in &epics.rows {
        let Some(id) = row_id(row) else { continue };
        records.entry(id).or_insert_with(|| EpicRecord {
            name: cell_text(cell(row, Some(&cols.epic_name))),
            description: cell_text(cell(row, description)),
            intention_current: cell_text(cell(row, current)),
            intention_next: cell_text(cell(row, next)),
        });
    }
    records
}

/// Ordered epic ids per team.
///
/// The epics-table owner column wins; the teams-table backlink only fills in
/// epics the owner column left unassigned, first claiming team first.
fn epic_ownership(tables: &RawTables, mapping: &Mapping, team_ids: &[i64]) -> HashMap<i64, Vec<i64>> {
    let known: HashSet<i64> = team_ids.iter().copied().collect();
    let mut owned: HashSet<i64> = HashSet::new();
    let mut by_team: HashMap<i64, Vec<i64>> = HashMap::new();

    if let Some(owner_column) = tables
        .epics
        .resolve_column(EPIC_OWNER_COLUMN, &EPIC_OWNER_ALIASES)
    {
        for row in &tables.epics.rows {
            let Some(epic) = row_id(row) else { continue };
            if owned.contains(&epic) {
                continue;
            }
            let owner = resolve_ref_list(cell(row, Some(owner_column)))
                .into_iter()
                .find(|t| known.contains(t));
            if let Some(team) = owner {
                owned.insert(epic);
                by_team.entry(team).or_default().push(epic);
            }
        }
    }

    let backlink = &mapping.columns.team_epics;
    if tables.teams.has_column(backlink) {
        for row in &tables.teams.rows {
            let Some(team) = row_id(row) else { continue };
            for epic in resolve_ref_list(cell(row, Some(backlink))) {
                if owned.insert(epic) {
                    by_team.entry(team).or_default().push(epic);
                }
            }
        }
    }

    by_team
}

/// Build the organizational model for `period`.
///
/// `period` may be any spelling of a period; it is normalized first.
pub fn build_model(tables: &RawTables, mapping: &Mapping, period: &str) -> Result<BuiltModel> {
    mapping.validate()?;
    validate_columns(tables, mapping)?;

    let period = normalize_period(period).ok_or_else(|| {
        Error::InvalidInput(format!("cannot read a period number from {:?}", period))
    })?;

    let labels = person_labels(&tables.people, &mapping.columns.person_label);
    let assignments = resolve_assignments(&tables.assignments, mapping, &labels);
    let mut rosters = team_rosters(&assignments, mapping);
    let (lines, pos) = epic_lines(&assignments, mapping);
    let features = period_features(&tables.features, mapping, &period);

    let catalog = EpicCatalog {
        records: epic_records(&tables.epics, mapping),
        lines,
        pos,
        features: features.by_epic,
    };

    let team_name_column = tables
        .teams
        .resolve_column(&mapping.columns.team_name, &TEAM_NAME_ALIASES);
    let mut team_rows: Vec<(i64, &Row)> = Vec::new();
    for row in &tables.teams.rows {
        if let Some(id) = row_id(row) {
            if !team_rows.iter().any(|(t, _)| *t == id) {
                team_rows.push((id, row));
            }
        }
    }
    let team_ids: Vec<i64> = team_rows.iter().map(|(id, _)| *id).collect();
    let mut ownership = epic_ownership(tables, mapping, &team_ids);

    let mut seen: HashSet<i64> = HashSet::new();
    let mut teams = Vec::with_capacity(team_rows.len());
    for (id, row) in team_rows {
        let raw_name = cell_text(cell(row, team_name_column));
        let name = match raw_name.trim() {
            "" => format!("Team {}", id),
            trimmed => trimmed.to_string(),
        };
        let roster = rosters.remove(&id).unwrap_or_default();
        let epics: Vec<Epic> = ownership
            .remove(&id)
            .unwrap_or_default()
            .into_iter()
            .filter(|epic| seen.insert(*epic))
            .map(|epic| catalog.build(epic, false))
            .collect();

        teams.push(Team {
            id,
            name,
            pm_list: roster.pms.into_iter().collect(),
            po_list: roster.pos.into_iter().collect(),
            members: roster.members,
            epics,
        });
    }

    let separate_epics: Vec<Epic> = features
        .order
        .iter()
        .copied()
        .filter(|epic| seen.insert(*epic))
        .map(|epic| catalog.build(epic, true))
        .collect();

    let stats = ModelStats {
        teams: teams.len(),
        epics_total: seen.len(),
        epics_separate: separate_epics.len(),
        features_period: features.count,
        assignments: tables.assignments.len(),
        people: tables.people.len(),
    };

    tracing::info!(
        period = %period,
        teams = stats.teams,
        epics = stats.epics_total,
        separate = stats.epics_separate,
        features = stats.features_period,
        "model built"
    );

    Ok(BuiltModel {
        period,
        teams,
        separate_epics,
        stats,
    })
}

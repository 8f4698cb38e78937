//! Organizational model for one planning period.
//!
//! This module defines the structures produced by the model builder:
//! - `Team` - A team with its rosters, members and owned epics
//! - `Epic` - A unit of work with assignment lines and period features
//! - `AssignmentLine` - One (person, role, charge) row attached to an epic
//! - `BuiltModel` - The root aggregate with separate epics and statistics
//!
//! The model is structural only. Narrative text (missions, KPIs) lives in
//! [`crate::narrative::NarrativeMap`] and is joined at layout and render time.

pub mod builder;
pub mod fragmentation;
pub mod period;
pub mod refs;

pub use builder::build_model;
pub use fragmentation::{AlertLists, FragmentationRow, alert_lists, compute_fragmentation};
pub use period::{feature_in_period, normalize_period, parse_requested_period};
pub use refs::{RefValue, resolve_ref, resolve_ref_list};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Label used when an assignment points at a person the people table lacks.
pub const UNKNOWN_PERSON: &str = "UNKNOWN";

/// One assignment of a person to an epic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentLine {
    /// Display name of the assigned person
    pub person: String,
    /// Raw role string (e.g. "PM", "PO", "DEV")
    pub role: String,
    /// Charge, normally a percentage (0-100)
    pub charge: f64,
}

impl AssignmentLine {
    /// Charge as a display percentage.
    ///
    /// Some exports store charge as a 0-1 ratio; those are rescaled.
    pub fn display_charge(&self) -> String {
        format_charge_percent(self.charge)
    }
}

/// Format a charge value as a percentage, rescaling 0-1 ratios.
pub fn format_charge_percent(charge: f64) -> String {
    let mut value = if charge.is_finite() { charge } else { 0.0 };
    if (0.0..=1.0).contains(&value) {
        value *= 100.0;
    }
    if (value - value.round()).abs() < 1e-9 {
        format!("{}%", value.round() as i64)
    } else {
        format!("{:.1}%", value)
    }
}

/// An epic as seen in one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Epic {
    pub id: i64,
    pub name: String,
    pub description: String,
    /// Intention for the current period
    pub intention_current: String,
    /// Intention for the next period
    pub intention_next: String,
    /// All assignment lines, including zero-charge rows
    pub assignments: Vec<AssignmentLine>,
    /// Feature names scoped to the requested period
    pub features: Vec<String>,
    /// PO roster (positive-charge assignments only)
    pub po_list: Vec<String>,
    /// True when no team owns this epic in this run
    pub is_separate: bool,
}

impl Epic {
    /// Whether any of description or intentions is filled in.
    pub fn has_intentions(&self) -> bool {
        [&self.description, &self.intention_current, &self.intention_next]
            .iter()
            .any(|s| !s.trim().is_empty())
    }
}

/// A team and the epics it owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: i64,
    pub name: String,
    pub pm_list: Vec<String>,
    pub po_list: Vec<String>,
    /// People with a strictly positive charge on this team
    pub members: BTreeSet<String>,
    pub epics: Vec<Epic>,
}

impl Team {
    /// Members in display order, without the unknown-person sentinel.
    pub fn sorted_members(&self) -> Vec<&str> {
        self.members
            .iter()
            .map(String::as_str)
            .filter(|m| !m.is_empty() && *m != UNKNOWN_PERSON)
            .collect()
    }

    pub fn feature_count(&self) -> usize {
        self.epics.iter().map(|e| e.features.len()).sum()
    }
}

/// Summary statistics computed at build time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelStats {
    pub teams: usize,
    /// Distinct epic ids across teams and the separate list
    pub epics_total: usize,
    pub epics_separate: usize,
    /// Feature rows scoped to the period
    pub features_period: usize,
    /// Raw assignment row count
    pub assignments: usize,
    /// People table row count
    pub people: usize,
}

/// Root aggregate for one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuiltModel {
    /// Canonical period token (e.g. "PI-10")
    pub period: String,
    pub teams: Vec<Team>,
    pub separate_epics: Vec<Epic>,
    pub stats: ModelStats,
}

impl BuiltModel {
    /// Look up a team by id.
    pub fn team(&self, id: i64) -> Option<&Team> {
        self.teams.iter().find(|t| t.id == id)
    }

    /// Every epic in the model, team-owned first.
    pub fn all_epics(&self) -> impl Iterator<Item = &Epic> {
        self.teams
            .iter()
            .flat_map(|t| t.epics.iter())
            .chain(self.separate_epics.iter())
    }

    /// Names of epics with no description and no intentions, sorted and unique.
    pub fn epics_missing_intentions(&self) -> Vec<String> {
        let names: BTreeSet<String> = self
            .all_epics()
            .filter(|e| !e.has_intentions())
            .map(|e| e.name.clone())
            .collect();
        names.into_iter().collect()
    }
}

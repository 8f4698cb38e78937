//! Per-person fragmentation scoring.
//!
//! A person's effort is fragmented when it is spread across many teams and
//! epics or split into many small assignments:
//!
//! ```text
//! score = teams + epics + max(0, assignments - 3)
//! ```
//!
//! The same pass derives the two people lists shown in the diagram's alert
//! boxes.

use crate::config::Mapping;
use crate::models::builder::{
    epic_records, person_labels, resolve_assignments, validate_assignment_columns,
};
use crate::models::UNKNOWN_PERSON;
use crate::source::RawTables;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Thresholds used by the scoring and alert rules.
pub mod thresholds {
    /// Assignments beyond this count add one point each.
    pub const FREE_ASSIGNMENTS: usize = 3;

    /// Total charge (percent) above which a person is overloaded.
    pub const OVERLOAD_CHARGE: f64 = 100.0;

    /// Score at which a person is flagged.
    pub const ALERT_SCORE: usize = 5;

    /// Score at which a person is reported as critical.
    pub const CRITICAL_SCORE: usize = 8;

    /// Epic count that puts a person on the high-fragmentation list.
    pub const HIGH_EPICS: usize = 3;

    /// Team count that puts a person on the high-fragmentation list.
    pub const HIGH_TEAMS: usize = 2;

    /// Total charge below which a person is listed as under-assigned.
    pub const LOW_CHARGE: f64 = 25.0;
}

/// Severity band of a fragmentation score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreBand {
    Normal,
    High,
    Critical,
}

impl ScoreBand {
    pub fn from_score(score: usize) -> Self {
        if score >= thresholds::CRITICAL_SCORE {
            ScoreBand::Critical
        } else if score >= thresholds::ALERT_SCORE {
            ScoreBand::High
        } else {
            ScoreBand::Normal
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreBand::Normal => "normal",
            ScoreBand::High => "high",
            ScoreBand::Critical => "critical",
        }
    }
}

/// Aggregated assignments of one person.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentationRow {
    pub person_id: i64,
    pub person: String,
    pub teams: usize,
    pub epics: usize,
    pub roles: usize,
    pub assignments: usize,
    pub total_charge: f64,
    pub score: usize,
    /// Assigned to more than one team
    pub multi_team: bool,
    /// Total charge above 100%
    pub overloaded: bool,
    /// Score at or above the alert threshold
    pub alert: bool,
}

impl FragmentationRow {
    pub fn band(&self) -> ScoreBand {
        ScoreBand::from_score(self.score)
    }
}

/// Fragmentation formula.
pub fn fragmentation_score(teams: usize, epics: usize, assignments: usize) -> usize {
    teams + epics + assignments.saturating_sub(thresholds::FREE_ASSIGNMENTS)
}

#[derive(Default)]
struct Tally {
    label: String,
    teams: BTreeSet<i64>,
    epics: BTreeSet<i64>,
    roles: BTreeSet<String>,
    assignments: usize,
    total_charge: f64,
}

fn by_score(a: &FragmentationRow, b: &FragmentationRow) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| {
            b.total_charge
                .partial_cmp(&a.total_charge)
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.person.cmp(&b.person))
}

/// Score every person with at least one assignment row.
///
/// Rows whose person reference does not resolve are skipped. Sorted by score,
/// then total charge (both descending), then name.
pub fn compute_fragmentation(tables: &RawTables, mapping: &Mapping) -> Result<Vec<FragmentationRow>> {
    validate_assignment_columns(tables, mapping)?;
    let labels = person_labels(&tables.people, &mapping.columns.person_label);
    let resolved = resolve_assignments(&tables.assignments, mapping, &labels);

    let mut tallies: BTreeMap<i64, Tally> = BTreeMap::new();
    for a in &resolved {
        let Some(person) = a.person else { continue };
        let tally = tallies.entry(person).or_insert_with(|| Tally {
            label: a.label.clone(),
            ..Default::default()
        });
        if let Some(team) = a.team {
            tally.teams.insert(team);
        }
        if let Some(epic) = a.epic {
            tally.epics.insert(epic);
        }
        if !a.role.is_empty() {
            tally.roles.insert(a.role.clone());
        }
        tally.assignments += 1;
        tally.total_charge += a.charge;
    }

    let mut rows: Vec<FragmentationRow> = tallies
        .into_iter()
        .map(|(person_id, t)| {
            let score = fragmentation_score(t.teams.len(), t.epics.len(), t.assignments);
            FragmentationRow {
                person_id,
                person: t.label,
                teams: t.teams.len(),
                epics: t.epics.len(),
                roles: t.roles.len(),
                assignments: t.assignments,
                total_charge: (t.total_charge * 100.0).round() / 100.0,
                score,
                multi_team: t.teams.len() > 1,
                overloaded: t.total_charge > thresholds::OVERLOAD_CHARGE,
                alert: score >= thresholds::ALERT_SCORE,
            }
        })
        .collect();
    rows.sort_by(by_score);

    tracing::debug!(people = rows.len(), "fragmentation computed");
    Ok(rows)
}

/// Contents of the two alert boxes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertLists {
    /// `Name [N EPICs] (epic, ...)` lines for people on 3+ epics or 2+ teams
    pub high_fragmentation: Vec<String>,
    /// Names of people with no assignment or a total charge under 25%
    pub low_or_unassigned: Vec<String>,
}

impl AlertLists {
    pub fn is_empty(&self) -> bool {
        self.high_fragmentation.is_empty() && self.low_or_unassigned.is_empty()
    }
}

fn is_named(label: &str) -> bool {
    !label.is_empty() && label != UNKNOWN_PERSON
}

/// Build the alert-box lists from the fragmentation rows.
pub fn alert_lists(
    tables: &RawTables,
    mapping: &Mapping,
    rows: &[FragmentationRow],
) -> AlertLists {
    let labels = person_labels(&tables.people, &mapping.columns.person_label);
    let all_people: BTreeSet<String> = labels
        .values()
        .filter(|l| is_named(l))
        .cloned()
        .collect();

    if rows.is_empty() {
        return AlertLists {
            high_fragmentation: Vec::new(),
            low_or_unassigned: all_people.into_iter().collect(),
        };
    }

    let epic_names: HashMap<i64, String> = epic_records(&tables.epics, mapping)
        .into_iter()
        .map(|(id, r)| (id, r.name.trim().to_string()))
        .filter(|(_, name)| !name.is_empty())
        .collect();

    let mut assigned: BTreeSet<String> = BTreeSet::new();
    let mut person_epics: HashMap<String, BTreeSet<String>> = HashMap::new();
    for a in resolve_assignments(&tables.assignments, mapping, &labels) {
        if a.person.is_none() || !a.is_named() {
            continue;
        }
        assigned.insert(a.label.clone());
        if let Some(name) = a.epic.and_then(|e| epic_names.get(&e)) {
            person_epics
                .entry(a.label.clone())
                .or_default()
                .insert(name.clone());
        }
    }

    let mut high: Vec<&FragmentationRow> = rows
        .iter()
        .filter(|r| is_named(&r.person))
        .filter(|r| r.epics >= thresholds::HIGH_EPICS || r.teams >= thresholds::HIGH_TEAMS)
        .collect();
    high.sort_by(|a, b| {
        b.epics
            .cmp(&a.epics)
            .then_with(|| b.teams.cmp(&a.teams))
            .then_with(|| by_score(a, b))
    });

    let mut listed: BTreeSet<&str> = BTreeSet::new();
    let mut high_fragmentation = Vec::new();
    for row in high {
        if !listed.insert(row.person.as_str()) {
            continue;
        }
        let count = format!(
            "{} EPIC{}",
            row.epics,
            if row.epics > 1 { "s" } else { "" }
        );
        let detail = match person_epics.get(&row.person) {
            Some(names) if !names.is_empty() => {
                names.iter().cloned().collect::<Vec<_>>().join(", ")
            }
            _ => "multi-équipes".to_string(),
        };
        high_fragmentation.push(format!("{} [{}] ({})", row.person, count, detail));
    }

    let mut low: BTreeSet<String> = all_people
        .difference(&assigned)
        .cloned()
        .collect();
    low.extend(
        rows.iter()
            .filter(|r| is_named(&r.person) && r.total_charge < thresholds::LOW_CHARGE)
            .map(|r| r.person.clone()),
    );

    AlertLists {
        high_fragmentation,
        low_or_unassigned: low.into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::demo::demo_tables;
    use crate::source::Row;
    use serde_json::{Value, json};

    fn mapping() -> Mapping {
        Mapping::embedded().unwrap()
    }

    fn rows(values: Vec<Value>) -> Vec<Row> {
        values
            .into_iter()
            .map(|v| match v {
                Value::Object(m) => m,
                _ => panic!("expected object"),
            })
            .collect()
    }

    #[test]
    fn test_score_formula() {
        assert_eq!(fragmentation_score(1, 1, 1), 2);
        assert_eq!(fragmentation_score(2, 3, 3), 5);
        assert_eq!(fragmentation_score(2, 4, 6), 9);
    }

    #[test]
    fn test_overloaded_two_teams() {
        let mut tables = demo_tables(&mapping());
        tables.assignments.rows = rows(vec![
            json!({"Affecte_a_l_equipe": 1, "Affecte_a_l_Epic": 100, "Personne": 10, "Charge": 80, "Role": "DEV"}),
            json!({"Affecte_a_l_equipe": 2, "Affecte_a_l_Epic": 101, "Personne": 10, "Charge": 60, "Role": "DEV"}),
        ]);

        let result = compute_fragmentation(&tables, &mapping()).unwrap();
        assert_eq!(result.len(), 1);
        let alice = &result[0];
        assert_eq!(alice.total_charge, 140.0);
        assert!(alice.overloaded);
        assert!(alice.multi_team);
        assert_eq!(alice.score, 2 + 2 + 0);
        assert_eq!(alice.roles, 1);
        assert!(!alice.alert);
    }

    #[test]
    fn test_demo_fragmentation() {
        let tables = demo_tables(&mapping());
        let result = compute_fragmentation(&tables, &mapping()).unwrap();

        assert_eq!(result.len(), 6);
        let bob = &result[0];
        assert_eq!(bob.person, "Bob Dupont");
        assert_eq!(bob.teams, 2);
        assert_eq!(bob.epics, 3);
        assert_eq!(bob.assignments, 3);
        assert_eq!(bob.score, 5);
        assert_eq!(bob.total_charge, 160.0);
        assert!(bob.alert && bob.overloaded && bob.multi_team);
        assert_eq!(bob.band(), ScoreBand::High);
    }

    #[test]
    fn test_sort_order_ties_by_charge_then_name() {
        let tables = demo_tables(&mapping());
        let result = compute_fragmentation(&tables, &mapping()).unwrap();
        // Claire: 1 team, 2 epics, score 3.
        assert_eq!(result[1].person, "Claire Lemaire");
        // Score 2 rows: charge 100 (Alice, David, François) before Eva (80).
        let names: Vec<&str> = result[2..].iter().map(|r| r.person.as_str()).collect();
        assert_eq!(names, vec!["Alice Martin", "David Morin", "François Bernard", "Eva Girard"]);
    }

    #[test]
    fn test_unresolved_people_skipped() {
        let mut tables = demo_tables(&mapping());
        tables.assignments.rows = rows(vec![
            json!({"Affecte_a_l_equipe": 1, "Personne": null, "Charge": 50, "Role": "DEV"}),
        ]);
        assert!(compute_fragmentation(&tables, &mapping()).unwrap().is_empty());
    }

    #[test]
    fn test_demo_alert_lists() {
        let tables = demo_tables(&mapping());
        let result = compute_fragmentation(&tables, &mapping()).unwrap();
        let alerts = alert_lists(&tables, &mapping(), &result);

        assert_eq!(
            alerts.high_fragmentation,
            vec![
                "Bob Dupont [3 EPICs] (Epic Paiement Digital, Epic Reporting Analytics, Epic Sécurité & Conformité)"
                    .to_string()
            ]
        );
        assert!(alerts.low_or_unassigned.is_empty());
    }

    #[test]
    fn test_low_or_unassigned() {
        let mut tables = demo_tables(&mapping());
        tables.assignments.rows = rows(vec![
            json!({"Affecte_a_l_equipe": 1, "Affecte_a_l_Epic": 100, "Personne": 10, "Charge": 10, "Role": "DEV"}),
            json!({"Affecte_a_l_equipe": 1, "Affecte_a_l_Epic": 100, "Personne": 11, "Charge": 90, "Role": "DEV"}),
            json!({"Affecte_a_l_equipe": 2, "Personne": 12, "Charge": 50, "Role": "DEV"}),
        ]);
        let result = compute_fragmentation(&tables, &mapping()).unwrap();
        let alerts = alert_lists(&tables, &mapping(), &result);

        assert!(alerts.high_fragmentation.is_empty());
        assert_eq!(
            alerts.low_or_unassigned,
            vec!["Alice Martin", "David Morin", "Eva Girard", "François Bernard"]
        );
    }

    #[test]
    fn test_multi_team_without_epics() {
        let mut tables = demo_tables(&mapping());
        tables.assignments.rows = rows(vec![
            json!({"Affecte_a_l_equipe": 1, "Personne": 13, "Charge": 50, "Role": "DEV"}),
            json!({"Affecte_a_l_equipe": 2, "Personne": 13, "Charge": 50, "Role": "DEV"}),
        ]);
        let result = compute_fragmentation(&tables, &mapping()).unwrap();
        let alerts = alert_lists(&tables, &mapping(), &result);
        assert_eq!(alerts.high_fragmentation, vec!["David Morin [0 EPIC] (multi-équipes)"]);
    }

    #[test]
    fn test_no_assignments_lists_everyone() {
        let mut tables = demo_tables(&mapping());
        tables.assignments.rows.clear();
        let result = compute_fragmentation(&tables, &mapping()).unwrap();
        let alerts = alert_lists(&tables, &mapping(), &result);
        assert!(result.is_empty());
        assert_eq!(alerts.low_or_unassigned.len(), 6);
    }

    #[test]
    fn test_score_bands() {
        assert_eq!(ScoreBand::from_score(4), ScoreBand::Normal);
        assert_eq!(ScoreBand::from_score(5), ScoreBand::High);
        assert_eq!(ScoreBand::from_score(8), ScoreBand::Critical);
    }
}

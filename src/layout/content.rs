//! Text content of every box.
//!
//! The layout sizes boxes from these line lists and the renderers draw the
//! same lists, so estimated and drawn text never drift apart.

use crate::models::{Epic, Team, format_charge_percent};
use crate::narrative::TeamNarrative;
use serde::Serialize;
use std::collections::HashSet;

/// Shown in place of an empty roster.
pub const EMPTY_PLACEHOLDER: &str = "-";

/// Assignments below this charge are drawn muted.
pub const MUTED_CHARGE: f64 = 10.0;

const SUMMARY_MAX_LINES: usize = 4;
const SUMMARY_MAX_CHARS: usize = 105;

/// How a line is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    /// Centered bold title
    Title,
    /// Centered colored section heading
    Heading,
    /// Bold label followed by a value
    Field,
    Body,
    Muted,
    /// Horizontal rule
    Separator,
    Blank,
}

/// One logical line of box content.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentLine {
    pub kind: LineKind,
    /// Label for `Field` lines, empty otherwise
    pub label: String,
    pub text: String,
}

impl ContentLine {
    fn new(kind: LineKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            label: String::new(),
            text: text.into(),
        }
    }

    pub fn title(text: impl Into<String>) -> Self {
        Self::new(LineKind::Title, text)
    }

    pub fn heading(text: impl Into<String>) -> Self {
        Self::new(LineKind::Heading, text)
    }

    pub fn body(text: impl Into<String>) -> Self {
        Self::new(LineKind::Body, text)
    }

    pub fn muted(text: impl Into<String>) -> Self {
        Self::new(LineKind::Muted, text)
    }

    pub fn separator() -> Self {
        Self::new(LineKind::Separator, "")
    }

    pub fn blank() -> Self {
        Self::new(LineKind::Blank, "")
    }

    pub fn field(label: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: LineKind::Field,
            label: label.into(),
            text: text.into(),
        }
    }

    /// The line as plain text, the way it is measured.
    pub fn plain(&self) -> String {
        match self.kind {
            LineKind::Field => format!("{} : {}", self.label, self.text),
            _ => self.text.clone(),
        }
    }
}

/// Plain text of a line list, for height estimation.
pub fn plain_lines(lines: &[ContentLine]) -> Vec<String> {
    lines.iter().map(ContentLine::plain).collect()
}

fn join_or_placeholder<S: AsRef<str>>(items: &[S]) -> String {
    if items.is_empty() {
        EMPTY_PLACEHOLDER.to_string()
    } else {
        items
            .iter()
            .map(|s| s.as_ref())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn or_default(text: &str, default: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        default.to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn cartouche_lines(period: &str) -> Vec<ContentLine> {
    vec![ContentLine::title(format!("PI Planning - {}", period))]
}

pub fn theme_header_lines(title: &str) -> Vec<ContentLine> {
    vec![ContentLine::title(title)]
}

pub fn separate_header_lines() -> Vec<ContentLine> {
    vec![ContentLine::title("Epics séparées (hors équipe)")]
}

pub const HIGH_FRAGMENTATION_TITLE: &str = "Affecté sur plusieurs EPICS";
pub const LOW_ASSIGNMENT_TITLE: &str = "Sans affectation ou total < 25%";

/// Lines of one alert box: title then one bullet per entry.
pub fn alert_lines(title: &str, items: &[String]) -> Vec<ContentLine> {
    let mut lines = vec![ContentLine::title(title)];
    if items.is_empty() {
        lines.push(ContentLine::body("- aucun"));
    } else {
        lines.extend(items.iter().map(|i| ContentLine::body(format!("- {}", i))));
    }
    lines
}

/// PM, PO and member roster of a team.
pub fn team_info_lines(team: &Team) -> Vec<ContentLine> {
    let mut lines = vec![
        ContentLine::field("PM", join_or_placeholder(&team.pm_list)),
        ContentLine::field("PO", join_or_placeholder(&team.po_list)),
        ContentLine::field("Membres", ""),
    ];
    let members = team.sorted_members();
    if members.is_empty() {
        lines.push(ContentLine::body("- aucun membre détecté"));
    } else {
        lines.extend(members.iter().map(|m| ContentLine::body(format!("- {}", m))));
    }
    lines
}

fn ai_suffix(narrative: Option<&TeamNarrative>) -> &'static str {
    match narrative {
        Some(n) if n.ai_used => " (résumé par IA)",
        _ => "",
    }
}

/// Mission and next-increment intention of a team.
pub fn team_mission_lines(narrative: Option<&TeamNarrative>) -> Vec<ContentLine> {
    let suffix = ai_suffix(narrative);
    let mission = narrative.map(|n| n.mission.as_str()).unwrap_or_default();
    let next = narrative
        .map(|n| n.next_increment.as_str())
        .unwrap_or_default();
    vec![
        ContentLine::heading(format!("Mission{}", suffix)),
        ContentLine::body(or_default(mission, "Mission non renseignée.")),
        ContentLine::blank(),
        ContentLine::heading(format!("Intention prochain incrément (3 mois){}", suffix)),
        ContentLine::body(or_default(
            next,
            "Intention prochain incrément non renseignée.",
        )),
    ]
}

/// KPI box: a heading over two side-by-side columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiContent {
    pub heading: ContentLine,
    pub summary: Vec<ContentLine>,
    pub suggestion: Vec<ContentLine>,
}

pub fn team_kpi_content(narrative: Option<&TeamNarrative>) -> KpiContent {
    let summary = narrative.map(|n| n.kpi_summary.as_str()).unwrap_or_default();
    let suggestion = narrative
        .map(|n| n.kpi_suggestion.as_str())
        .unwrap_or_default();
    KpiContent {
        heading: ContentLine::heading(format!(
            "Indicateurs clés (OKR / KPI){}",
            ai_suffix(narrative)
        )),
        summary: vec![
            ContentLine::heading("Synthèse indicateurs"),
            ContentLine::body(or_default(summary, "Indicateurs non renseignés.")),
        ],
        suggestion: vec![
            ContentLine::heading("Critique / suggestion IA"),
            ContentLine::body(or_default(suggestion, "Suggestion IA non disponible.")),
        ],
    }
}

/// Warning line, only when the narrative carries one.
pub fn team_warning_lines(narrative: Option<&TeamNarrative>) -> Option<Vec<ContentLine>> {
    let warning = narrative?.warning.trim();
    if warning.is_empty() {
        None
    } else {
        Some(vec![ContentLine::body(warning)])
    }
}

/// Where an epic box is drawn.
#[derive(Debug, Clone, Copy)]
pub enum EpicPlacement<'a> {
    /// Inside its owning team's box
    Team(&'a Team),
    /// In the separate-epics area
    Separate,
}

/// Title, rosters, assignment lines and features of an epic.
pub fn epic_lines(epic: &Epic, placement: EpicPlacement<'_>) -> Vec<ContentLine> {
    let mut lines = vec![ContentLine::title(epic.name.clone())];
    let staffed = !epic.assignments.is_empty();

    if let EpicPlacement::Team(team) = placement {
        lines.push(ContentLine::field("Equipe", team.name.clone()));
        if staffed {
            lines.push(ContentLine::field(
                "PO équipe",
                join_or_placeholder(&team.po_list),
            ));
            lines.push(ContentLine::field(
                "Membres équipe",
                join_or_placeholder(&team.sorted_members()),
            ));
        }
    }
    if staffed {
        lines.push(ContentLine::field("PO epic", join_or_placeholder(&epic.po_list)));
    }
    if staffed || !epic.features.is_empty() {
        lines.push(ContentLine::separator());
    }

    if staffed {
        for a in &epic.assignments {
            let person = or_default(&a.person, EMPTY_PLACEHOLDER);
            let role = or_default(&a.role, EMPTY_PLACEHOLDER);
            let text = format!("{} – {} – {}", person, role, format_charge_percent(a.charge));
            if a.charge < MUTED_CHARGE {
                lines.push(ContentLine::muted(text));
            } else {
                lines.push(ContentLine::body(text));
            }
        }
    } else {
        lines.push(ContentLine::muted("(aucune affectation spécifique)"));
    }

    if !epic.features.is_empty() {
        lines.push(ContentLine::blank());
        lines.push(ContentLine::field("Features (PI)", ""));
        lines.extend(epic.features.iter().map(|f| ContentLine::body(format!("- {}", f))));
    }

    if let EpicPlacement::Separate = placement {
        lines.push(ContentLine::blank());
        lines.push(ContentLine::heading("Intention prochain PI"));
        lines.extend(intention_summary(epic).into_iter().map(ContentLine::body));
    }
    lines
}

/// Split free text after sentence punctuation followed by whitespace.
fn split_sentences(text: &str) -> Vec<String> {
    let cleaned = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = cleaned.chars().peekable();
    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?' | ';' | ':') && chars.peek() == Some(&' ') {
            sentences.push(std::mem::take(&mut current));
        }
    }
    sentences.push(current);
    sentences
        .into_iter()
        .map(|s| s.trim_matches(|c: char| c == ' ' || c == '-').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn clip(line: &str, max_chars: usize) -> String {
    if line.chars().count() <= max_chars {
        return line.to_string();
    }
    let head: String = line.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", head.trim_end())
}

/// A short digest of an epic's description and intentions.
///
/// Distinct sentences (case-insensitive), at most four, each clipped.
pub fn intention_summary(epic: &Epic) -> Vec<String> {
    let source = [&epic.description, &epic.intention_current, &epic.intention_next]
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if source.is_empty() {
        return vec!["Aucune description/intention renseignée.".to_string()];
    }

    let mut seen = HashSet::new();
    split_sentences(&source)
        .into_iter()
        .filter(|s| seen.insert(s.to_lowercase()))
        .take(SUMMARY_MAX_LINES)
        .map(|s| clip(&s, SUMMARY_MAX_CHARS))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AssignmentLine;

    fn epic(assignments: Vec<AssignmentLine>, features: Vec<&str>) -> Epic {
        Epic {
            id: 1,
            name: "Epic Paiement".to_string(),
            description: String::new(),
            intention_current: String::new(),
            intention_next: String::new(),
            assignments,
            features: features.into_iter().map(String::from).collect(),
            po_list: vec![],
            is_separate: false,
        }
    }

    fn line(person: &str, charge: f64) -> AssignmentLine {
        AssignmentLine {
            person: person.to_string(),
            role: "DEV".to_string(),
            charge,
        }
    }

    #[test]
    fn test_unstaffed_epic_has_placeholder() {
        let lines = epic_lines(&epic(vec![], vec![]), EpicPlacement::Separate);
        assert!(lines.iter().any(|l| l.text == "(aucune affectation spécifique)"));
        assert!(!lines.iter().any(|l| l.kind == LineKind::Separator));
    }

    #[test]
    fn test_low_charge_is_muted() {
        let e = epic(vec![line("Alice", 5.0), line("Bob", 50.0)], vec!["F1"]);
        let lines = epic_lines(&e, EpicPlacement::Separate);
        let alice = lines.iter().find(|l| l.text.starts_with("Alice")).unwrap();
        let bob = lines.iter().find(|l| l.text.starts_with("Bob")).unwrap();
        assert_eq!(alice.kind, LineKind::Muted);
        assert_eq!(bob.kind, LineKind::Body);
        assert_eq!(bob.text, "Bob – DEV – 50%");
    }

    #[test]
    fn test_team_placement_adds_rosters() {
        let team = Team {
            id: 1,
            name: "Team Alpha".to_string(),
            pm_list: vec![],
            po_list: vec!["Bob".to_string()],
            members: ["Bob".to_string()].into_iter().collect(),
            epics: vec![],
        };
        let e = epic(vec![line("Bob", 80.0)], vec![]);
        let plain = plain_lines(&epic_lines(&e, EpicPlacement::Team(&team)));
        assert!(plain.contains(&"Equipe : Team Alpha".to_string()));
        assert!(plain.contains(&"PO équipe : Bob".to_string()));
        assert!(plain.contains(&"PO epic : -".to_string()));
    }

    #[test]
    fn test_intention_summary_dedups_and_clips() {
        let mut e = epic(vec![], vec![]);
        e.description = "Livrer l'API. livrer l'api. Second point!".to_string();
        e.intention_next = "x".repeat(200);
        let summary = intention_summary(&e);
        assert_eq!(summary[0], "Livrer l'API.");
        assert_eq!(summary[1], "Second point!");
        assert_eq!(summary.len(), 3);
        assert!(summary[2].ends_with("..."));
        assert_eq!(summary[2].chars().count(), SUMMARY_MAX_CHARS);
    }

    #[test]
    fn test_intention_summary_empty() {
        let summary = intention_summary(&epic(vec![], vec![]));
        assert_eq!(summary, vec!["Aucune description/intention renseignée."]);
    }

    #[test]
    fn test_mission_defaults_without_narrative() {
        let plain = plain_lines(&team_mission_lines(None));
        assert_eq!(plain[0], "Mission");
        assert_eq!(plain[1], "Mission non renseignée.");
        assert!(team_warning_lines(None).is_none());
    }
}

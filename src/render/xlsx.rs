//! Epic summary workbook.
//!
//! Two sheets: one row per epic with a local review of how well its
//! period features cover the stated intention, and a sheet of feature
//! proposals per epic.

use crate::Result;
use crate::models::{BuiltModel, Epic};
use rust_xlsxwriter::{Format, FormatAlign, Workbook, Worksheet};
use serde::Serialize;
use std::collections::BTreeSet;

pub const SUMMARY_SHEET: &str = "Synthese_Epics";
pub const PROPOSALS_SHEET: &str = "Propositions_Features";

/// Team column value for epics no team owns.
pub const SEPARATE_TEAM: &str = "Epic séparée";

const SUMMARY_HEADERS: [(&str, f64); 11] = [
    ("Equipe", 26.0),
    ("Epic_ID", 10.0),
    ("Epic_Titre", 38.0),
    ("Description_Originale", 50.0),
    ("Intention_Prochain_Increment_Originale", 42.0),
    ("Synthese_Courte", 42.0),
    ("Intention_Courte", 36.0),
    ("Couverture_Features", 20.0),
    ("Justification_Couverture", 42.0),
    ("Nb_Features", 12.0),
    ("Features_PI", 46.0),
];

const PROPOSAL_HEADERS: [(&str, f64); 6] = [
    ("Equipe", 26.0),
    ("Epic_ID", 10.0),
    ("Epic_Titre", 36.0),
    ("Feature_Proposee", 45.0),
    ("Gain_Espere", 40.0),
    ("Source", 14.0),
];

const SYNTHESIS_MAX_WORDS: usize = 60;
const INTENTION_MAX_WORDS: usize = 56;
const IMPACT_MAX_WORDS: usize = 24;

/// Shared words needed before the features count as covering the intention.
const COVERING_OVERLAP: usize = 4;

/// How well an epic's period features cover its intention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Coverage {
    Covers,
    Partial,
    Insufficient,
}

impl Coverage {
    pub fn label(self) -> &'static str {
        match self {
            Coverage::Covers => "couvre",
            Coverage::Partial => "partielle",
            Coverage::Insufficient => "insuffisante",
        }
    }
}

/// A proposed feature and the gain expected from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Proposal {
    pub feature: String,
    pub gain: String,
}

/// Local review of one epic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpicReview {
    pub team: String,
    pub epic_id: i64,
    pub epic_name: String,
    pub description: String,
    pub intention: String,
    pub synthesis: String,
    pub short_intention: String,
    pub coverage: Coverage,
    pub justification: String,
    pub features: Vec<String>,
    pub proposals: Vec<Proposal>,
}

/// Next-period intention, else the current one.
fn target_intention(epic: &Epic) -> &str {
    let next = epic.intention_next.trim();
    if next.is_empty() {
        epic.intention_current.trim()
    } else {
        next
    }
}

/// Lowercased words of four characters or more.
fn keywords(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 4)
        .map(str::to_string)
        .collect()
}

/// First `max` words of `text`, whitespace collapsed.
fn clip_words(text: &str, max: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max {
        return words.join(" ");
    }
    let head = words[..max].join(" ");
    format!("{}...", head.trim_end_matches([',', ';', ':']))
}

fn coverage_of(features: &[String], intention: &str) -> (Coverage, &'static str) {
    match (features.is_empty(), intention.is_empty()) {
        (true, true) => (Coverage::Insufficient, "Aucune vérification possible."),
        (true, false) => (
            Coverage::Insufficient,
            "Aucune feature PI pour couvrir l'intention.",
        ),
        (false, true) => (
            Coverage::Partial,
            "Des features existent mais l'intention est absente ou trop vague.",
        ),
        (false, false) => {
            let shared = keywords(&features.join(" "))
                .intersection(&keywords(intention))
                .count();
            if shared >= COVERING_OVERLAP {
                (
                    Coverage::Covers,
                    "Les features couvrent globalement les mots-clés de l'intention.",
                )
            } else if shared >= 1 {
                (
                    Coverage::Partial,
                    "Couverture partielle ; certains aspects de l'intention manquent.",
                )
            } else {
                (
                    Coverage::Insufficient,
                    "Peu de recouvrement entre intention et features.",
                )
            }
        }
    }
}

fn synthesis(epic: &Epic, intention: &str, features: &[String]) -> String {
    let description = epic.description.trim();
    let base = [description, intention, epic.name.as_str()]
        .into_iter()
        .find(|s| !s.is_empty())
        .unwrap_or("");
    let head = if base.is_empty() {
        "Synthèse indisponible.".to_string()
    } else {
        clip_words(base, SYNTHESIS_MAX_WORDS)
    };

    let mut impacts = Vec::new();
    if !intention.is_empty() {
        impacts.push(format!("Impact cible : {}", clip_words(intention, IMPACT_MAX_WORDS)));
    }
    if features.is_empty() {
        impacts.push("Levier delivery : aucune feature PI renseignée à ce stade.".to_string());
    } else {
        impacts.push(format!(
            "Levier delivery : {} feature(s) identifiée(s) pour cet epic.",
            features.len()
        ));
    }
    impacts.push(
        "Effet attendu : meilleur alignement entre intention produit et exécution PI.".to_string(),
    );

    let mut lines = vec![head, "Impacts clés :".to_string()];
    lines.extend(impacts.into_iter().map(|i| format!("- {}", i)));
    lines.join("\n")
}

/// Review one epic without any remote call.
pub fn review_epic(team: &str, epic: &Epic) -> EpicReview {
    let intention = target_intention(epic);
    let features: Vec<String> = epic
        .features
        .iter()
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect();
    let (coverage, justification) = coverage_of(&features, intention);
    let short_intention = if intention.is_empty() {
        "Intention non renseignée.".to_string()
    } else {
        clip_words(intention, INTENTION_MAX_WORDS)
    };

    EpicReview {
        team: team.to_string(),
        epic_id: epic.id,
        epic_name: epic.name.clone(),
        description: epic.description.trim().to_string(),
        intention: intention.to_string(),
        synthesis: synthesis(epic, intention, &features),
        short_intention,
        coverage,
        justification: justification.to_string(),
        proposals: vec![
            Proposal {
                feature: format!("{} : formaliser un parcours cible utilisateur", epic.name),
                gain: "Clarification des besoins et réduction des retours.".to_string(),
            },
            Proposal {
                feature: format!("{} : définir des critères de succès mesurables", epic.name),
                gain: "Pilotage des résultats et meilleure priorisation.".to_string(),
            },
        ],
        features,
    }
}

/// One review per distinct epic: team-owned first, then separate epics.
pub fn epic_reviews(model: &BuiltModel) -> Vec<EpicReview> {
    let mut seen = BTreeSet::new();
    let owned = model
        .teams
        .iter()
        .flat_map(|t| t.epics.iter().map(move |e| (t.name.as_str(), e)));
    let separate = model.separate_epics.iter().map(|e| (SEPARATE_TEAM, e));
    owned
        .chain(separate)
        .filter(|(_, e)| seen.insert(e.id))
        .map(|(team, e)| review_epic(team, e))
        .collect()
}

fn write_headers(sheet: &mut Worksheet, headers: &[(&str, f64)], bold: &Format) -> Result<()> {
    for (col, (title, width)) in headers.iter().enumerate() {
        let col = col as u16;
        sheet.write_string_with_format(0, col, *title, bold)?;
        sheet.set_column_width(col, *width)?;
    }
    sheet.set_freeze_panes(1, 0)?;
    Ok(())
}

fn write_summary(
    sheet: &mut Worksheet,
    reviews: &[EpicReview],
    bold: &Format,
    cell: &Format,
) -> Result<()> {
    sheet.set_name(SUMMARY_SHEET)?;
    write_headers(sheet, &SUMMARY_HEADERS, bold)?;
    for (i, r) in reviews.iter().enumerate() {
        let row = i as u32 + 1;
        let features = r
            .features
            .iter()
            .map(|f| format!("- {}", f))
            .collect::<Vec<_>>()
            .join("\n");
        let texts = [
            (0, r.team.as_str()),
            (2, r.epic_name.as_str()),
            (3, r.description.as_str()),
            (4, r.intention.as_str()),
            (5, r.synthesis.as_str()),
            (6, r.short_intention.as_str()),
            (7, r.coverage.label()),
            (8, r.justification.as_str()),
            (10, features.as_str()),
        ];
        for (col, text) in texts {
            sheet.write_string_with_format(row, col, text, cell)?;
        }
        sheet.write_number_with_format(row, 1, r.epic_id as f64, cell)?;
        sheet.write_number_with_format(row, 9, r.features.len() as f64, cell)?;
    }
    Ok(())
}

fn write_proposals(
    sheet: &mut Worksheet,
    reviews: &[EpicReview],
    bold: &Format,
    cell: &Format,
) -> Result<()> {
    sheet.set_name(PROPOSALS_SHEET)?;
    write_headers(sheet, &PROPOSAL_HEADERS, bold)?;
    let mut row = 1u32;
    for r in reviews {
        for p in &r.proposals {
            sheet.write_string_with_format(row, 0, r.team.as_str(), cell)?;
            sheet.write_number_with_format(row, 1, r.epic_id as f64, cell)?;
            sheet.write_string_with_format(row, 2, r.epic_name.as_str(), cell)?;
            sheet.write_string_with_format(row, 3, p.feature.as_str(), cell)?;
            sheet.write_string_with_format(row, 4, p.gain.as_str(), cell)?;
            sheet.write_string_with_format(row, 5, "Local", cell)?;
            row += 1;
        }
    }
    Ok(())
}

/// Build the `.xlsx` workbook in memory.
///
/// A model without epics yields a single sheet holding a notice.
pub fn epics_workbook(model: &BuiltModel) -> Result<Vec<u8>> {
    let reviews = epic_reviews(model);
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let cell = Format::new().set_text_wrap().set_align(FormatAlign::Top);

    if reviews.is_empty() {
        let sheet = workbook.add_worksheet();
        sheet.set_name(SUMMARY_SHEET)?;
        sheet.write_string(0, 0, "Aucune donnée epic disponible")?;
    } else {
        write_summary(workbook.add_worksheet(), &reviews, &bold, &cell)?;
        write_proposals(workbook.add_worksheet(), &reviews, &bold, &cell)?;
    }
    tracing::debug!(epics = reviews.len(), "epic workbook built");
    Ok(workbook.save_to_buffer()?)
}

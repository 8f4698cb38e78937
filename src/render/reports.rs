//! Plain-text reports: fragmentation CSV and synthesis, run summary, README.

use crate::models::{BuiltModel, FragmentationRow};
use crate::narrative::EnrichmentStats;
use serde::Serialize;

/// Missing-intention epics listed before the list is cut.
const MISSING_INTENTIONS_SHOWN: usize = 20;

/// Rows shown in the synthesis top list.
const TOP_FRAGMENTED: usize = 10;

/// File names of one run's artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactNames {
    pub diagram: String,
    pub fragmentation_csv: String,
    pub synthesis: String,
    pub run_summary: String,
    pub readme: String,
    pub model_json: String,
    pub epics_workbook: String,
}

impl ArtifactNames {
    pub fn for_period(period: &str) -> Self {
        Self {
            diagram: format!("{}_orgchart.drawio", period),
            fragmentation_csv: format!("{}_multi_affectations.csv", period),
            synthesis: format!("{}_synthesis.md", period),
            run_summary: format!("{}_run_summary.md", period),
            readme: format!("{}_README_generated.md", period),
            model_json: format!("{}_model.json", period),
            epics_workbook: format!("{}_epics.xlsx", period),
        }
    }

    /// Names used by the period-less `analyze` command.
    pub fn analysis() -> Self {
        Self {
            fragmentation_csv: "multi_affectations.csv".to_string(),
            synthesis: "synthesis.md".to_string(),
            ..Self::for_period("analysis")
        }
    }
}

/// Headline counts drawn from the fragmentation rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FragmentationKpis {
    pub over_100: usize,
    pub multi_team: usize,
    pub alerts: usize,
}

impl FragmentationKpis {
    pub fn from_rows(rows: &[FragmentationRow]) -> Self {
        Self {
            over_100: rows.iter().filter(|r| r.overloaded).count(),
            multi_team: rows.iter().filter(|r| r.multi_team).count(),
            alerts: rows.iter().filter(|r| r.alert).count(),
        }
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "true" } else { "false" }
}

/// One line per person, in score order.
pub fn fragmentation_csv(rows: &[FragmentationRow]) -> String {
    let mut out = String::from(
        "Personne_ID,Personne,Nb_Equipes,Nb_Epics,Nb_Roles,Nb_Affectations,Total_Charge,Fragmentation_Score,Niveau,Multi_Equipes,Surcharge,Alerte\n",
    );
    for r in rows {
        let fields = [
            r.person_id.to_string(),
            csv_field(&r.person),
            r.teams.to_string(),
            r.epics.to_string(),
            r.roles.to_string(),
            r.assignments.to_string(),
            r.total_charge.to_string(),
            r.score.to_string(),
            r.band().as_str().to_string(),
            yes_no(r.multi_team).to_string(),
            yes_no(r.overloaded).to_string(),
            yes_no(r.alert).to_string(),
        ];
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}

fn markdown_table(rows: &[&FragmentationRow]) -> String {
    if rows.is_empty() {
        return "_Aucun_".to_string();
    }
    let mut lines = vec![
        "| Personne | Équipes | Epics | Rôles | Affectations | Charge totale | Score | Niveau |".to_string(),
        "|---|---:|---:|---:|---:|---:|---:|---|".to_string(),
    ];
    for r in rows {
        lines.push(format!(
            "| {} | {} | {} | {} | {} | {} | {} | {} |",
            r.person.replace('|', "\\|"),
            r.teams,
            r.epics,
            r.roles,
            r.assignments,
            r.total_charge,
            r.score,
            r.band().as_str()
        ));
    }
    lines.join("\n")
}

/// Markdown synthesis: top fragmented, overloaded and multi-team people.
pub fn synthesis_markdown(rows: &[FragmentationRow]) -> String {
    let mut lines = vec![
        "# Synthèse multi-affectations / fragmentation".to_string(),
        String::new(),
    ];
    if rows.is_empty() {
        lines.push("Aucune affectation trouvée (table Affectations vide).".to_string());
        return lines.join("\n") + "\n";
    }

    let top: Vec<&FragmentationRow> = rows.iter().take(TOP_FRAGMENTED).collect();
    let over: Vec<&FragmentationRow> = rows.iter().filter(|r| r.overloaded).collect();
    let multi: Vec<&FragmentationRow> = rows.iter().filter(|r| r.multi_team).collect();

    for (title, subset) in [
        (format!("## Top {} agents les plus fragmentés", TOP_FRAGMENTED), &top),
        (format!("## Agents > 100% de charge ({})", over.len()), &over),
        (format!("## Agents multi-équipes ({})", multi.len()), &multi),
    ] {
        lines.push(title);
        lines.push(String::new());
        lines.push(markdown_table(subset));
        lines.push(String::new());
    }

    lines.push("## Recommandations de défragmentation (heuristiques)".to_string());
    lines.push(String::new());
    lines.extend(
        [
            "- Réduire le nombre de contextes (équipes/epics) par agent sur le PI.",
            "- Grouper les items de backlog par epic dominante et limiter les micro-affectations.",
            "- Prioriser la stabilité des équipes, rendre explicites les epics transverses.",
            "- Surveiller les agents >100% (risque de surcharge, baisse qualité, retards).",
        ]
        .map(String::from),
    );
    lines.join("\n") + "\n"
}

/// Inputs of the run summary beyond the model itself.
#[derive(Debug, Clone, Default)]
pub struct RunFacts<'a> {
    pub source_label: &'a str,
    pub kpis: FragmentationKpis,
    pub features_table_empty: bool,
    pub enrichment: Option<&'a EnrichmentStats>,
}

fn member_line(name: &str, members: &[&str]) -> String {
    if members.is_empty() {
        format!("- {} (0) : aucun membre détecté", name)
    } else {
        format!("- {} ({}) : {}", name, members.len(), members.join(", "))
    }
}

/// Checklist printed and saved at the end of a full run.
pub fn run_summary(model: &BuiltModel, facts: &RunFacts<'_>) -> String {
    let s = &model.stats;
    let mut lines = vec![
        "=== RUN SUMMARY ===".to_string(),
        format!("Source utilisée : {}", facts.source_label),
        format!("PI : {}", model.period),
        format!("Nb équipes : {}", s.teams),
        format!("Nb epics : {}", s.epics_total),
        format!("Nb epics séparées : {}", s.epics_separate),
        format!("Nb features du PI : {}", s.features_period),
        format!("Nb affectations : {}", s.assignments),
        format!("Nb personnes : {}", s.people),
        format!("Agents >100% : {}", facts.kpis.over_100),
        format!("Agents multi-équipes : {}", facts.kpis.multi_team),
        format!(
            "Features table vide : {}",
            if facts.features_table_empty { "OUI" } else { "NON" }
        ),
    ];
    if let Some(e) = facts.enrichment {
        lines.push(format!(
            "Synthèse IA : {} planifiées, {} ok, {} repli local",
            e.planned, e.ok, e.fallback
        ));
    }

    lines.push(String::new());
    lines.push("Membres par équipe :".to_string());
    if model.teams.is_empty() {
        lines.push("- Aucune équipe trouvée".to_string());
    }
    for team in &model.teams {
        lines.push(member_line(&team.name, &team.sorted_members()));
    }

    let missing = model.epics_missing_intentions();
    if !missing.is_empty() {
        lines.push("Epics sans intention/description (à compléter) :".to_string());
        lines.extend(
            missing
                .iter()
                .take(MISSING_INTENTIONS_SHOWN)
                .map(|e| format!("- {}", e)),
        );
        if missing.len() > MISSING_INTENTIONS_SHOWN {
            lines.push(format!(
                "... +{} autres",
                missing.len() - MISSING_INTENTIONS_SHOWN
            ));
        }
    }
    lines.join("\n") + "\n"
}

/// README describing the generated artifacts.
pub fn readme(model: &BuiltModel, names: &ArtifactNames, generated_at: &str) -> String {
    let s = &model.stats;
    let mut lines = vec![
        format!("# README généré - {}", model.period),
        String::new(),
        format!("Généré automatiquement le {}.", generated_at),
        String::new(),
        "## Résumé".to_string(),
        String::new(),
        format!("- PI : **{}**", model.period),
        format!("- Équipes : **{}**", s.teams),
        format!(
            "- Epics : **{}** (dont séparées : **{}**)",
            s.epics_total, s.epics_separate
        ),
        format!("- Features (PI) : **{}**", s.features_period),
        String::new(),
        "## Lecture rapide".to_string(),
        String::new(),
        "- **PM** : affichés au niveau **Équipe** (container).".to_string(),
        "- **PO** : affichés sur les epics, et au niveau équipe.".to_string(),
        "- **Epic séparée** : les personnes affectées à l'epic ne sont pas un sous-ensemble des membres de l'équipe.".to_string(),
        String::new(),
        "## Structure des sorties".to_string(),
        String::new(),
        format!("- `{}` : diagramme organisationnel", names.diagram),
        format!(
            "- `{}` + `{}` : fragmentation",
            names.fragmentation_csv, names.synthesis
        ),
        format!("- `{}` : synthèse des epics (Excel)", names.epics_workbook),
        format!("- `{}` : modèle et synthèses au format JSON", names.model_json),
        format!("- `{}` : checklist d'exécution", names.run_summary),
        String::new(),
        "## Membres par équipe".to_string(),
        String::new(),
    ];
    if model.teams.is_empty() {
        lines.push("_Aucune équipe trouvée._".to_string());
    }
    for team in &model.teams {
        let members = team.sorted_members();
        lines.push(format!("### {} ({} membre(s))", team.name, members.len()));
        lines.push(String::new());
        if members.is_empty() {
            lines.push("_Aucun membre détecté dans les affectations._".to_string());
        } else {
            lines.extend(members.iter().map(|m| format!("- {}", m)));
        }
        lines.push(String::new());
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Mapping;
    use crate::models::{build_model, compute_fragmentation};
    use crate::source::demo::demo_tables;

    fn demo() -> (BuiltModel, Vec<FragmentationRow>) {
        let mapping = Mapping::embedded().unwrap();
        let tables = demo_tables(&mapping);
        (
            build_model(&tables, &mapping, "PI-10").unwrap(),
            compute_fragmentation(&tables, &mapping).unwrap(),
        )
    }

    #[test]
    fn test_csv_quotes_fields() {
        assert_eq!(csv_field("Dupont, Bob"), "\"Dupont, Bob\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_field("plain"), "plain");
    }

    #[test]
    fn test_fragmentation_csv() {
        let (_, rows) = demo();
        let csv = fragmentation_csv(&rows);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), rows.len() + 1);
        assert!(lines[0].starts_with("Personne_ID,Personne,"));
        assert_eq!(lines[1], "11,Bob Dupont,2,3,1,3,160,5,high,true,true,true");
    }

    #[test]
    fn test_synthesis_sections() {
        let (_, rows) = demo();
        let md = synthesis_markdown(&rows);
        assert!(md.contains("## Top 10 agents les plus fragmentés"));
        assert!(md.contains("## Agents > 100% de charge (1)"));
        assert!(md.contains("## Agents multi-équipes (1)"));
        assert!(md.contains("| Bob Dupont | 2 | 3 | 1 | 3 | 160 | 5 | high |"));
    }

    #[test]
    fn test_synthesis_empty() {
        let md = synthesis_markdown(&[]);
        assert!(md.contains("Aucune affectation trouvée"));
        assert!(!md.contains("Recommandations"));
    }

    #[test]
    fn test_run_summary() {
        let (model, rows) = demo();
        let facts = RunFacts {
            source_label: "demo",
            kpis: FragmentationKpis::from_rows(&rows),
            ..RunFacts::default()
        };
        let text = run_summary(&model, &facts);
        assert!(text.starts_with("=== RUN SUMMARY ===\nSource utilisée : demo\nPI : PI-10\n"));
        assert!(text.contains("Nb epics séparées : 1"));
        assert!(text.contains("Nb features du PI : 8"));
        assert!(text.contains("Features table vide : NON"));
        assert!(text.contains("- Team Alpha (3) : Alice Martin, Bob Dupont, Claire Lemaire"));
        assert!(!text.contains("Synthèse IA"));
    }

    #[test]
    fn test_readme_lists_artifacts() {
        let (model, _) = demo();
        let names = ArtifactNames::for_period(&model.period);
        let text = readme(&model, &names, "2026-01-01 10:00");
        assert!(text.starts_with("# README généré - PI-10"));
        assert!(text.contains("`PI-10_orgchart.drawio`"));
        assert!(text.contains("`PI-10_multi_affectations.csv` + `PI-10_synthesis.md`"));
        assert!(text.contains("`PI-10_epics.xlsx` : synthèse des epics"));
        assert!(text.contains("### Team Beta (2 membre(s))"));
    }

    #[test]
    fn test_analysis_names() {
        let names = ArtifactNames::analysis();
        assert_eq!(names.fragmentation_csv, "multi_affectations.csv");
        assert_eq!(names.synthesis, "synthesis.md");
    }
}

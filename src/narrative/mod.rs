//! Team narratives: mission, next-increment intentions and KPI text.
//!
//! Narratives live beside the model in a [`NarrativeMap`] keyed by team id and
//! are joined with it at layout and render time. Every team gets one, either
//! from an LLM through a [`SummaryBackend`] or from [`local_narrative`]; both
//! paths fill the same fields.
//!
//! LLM calls run on a bounded pool of scoped worker threads. Workers only
//! compute; results come back over a channel and the calling thread alone
//! writes the map and keeps the [`EnrichmentStats`].

pub mod llm;

pub use llm::{ChatClient, ChatCompletion, ChatError, ChatRequest};

use crate::models::{BuiltModel, Team, UNKNOWN_PERSON};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;

/// Narrative fields of one team.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamNarrative {
    pub mission: String,
    /// Intentions for the next increment, one bullet per line
    pub next_increment: String,
    pub kpi_summary: String,
    pub kpi_suggestion: String,
    /// True when the text came from the LLM
    pub ai_used: bool,
    /// Non-empty when the source context had to be heavily condensed
    pub warning: String,
}

/// Narratives by team id.
pub type NarrativeMap = BTreeMap<i64, TeamNarrative>;

/// Context and output limits.
pub mod limits {
    /// Contexts at least this long are flagged as heavily summarized
    pub const HEAVY_CONTEXT_CHARS: usize = 1200;
    /// Context budget of the first prompt
    pub const PROMPT_CONTEXT_CHARS: usize = 3000;
    /// Context budget of the retry prompt
    pub const RETRY_CONTEXT_CHARS: usize = 1600;
    pub const MAX_TOKENS: u32 = 420;
    /// Retry budget when the first call stopped on the token limit
    pub const RETRY_MAX_TOKENS: u32 = 900;
    pub const MISSION_LINES: usize = 5;
    pub const INTENTION_LINES: usize = 10;
    pub const KPI_LINES: usize = 8;
    pub const SUGGESTION_LINES: usize = 4;
    pub const CONTEXT_FEATURES: usize = 12;
    pub const CONTEXT_ASSIGNMENTS: usize = 10;
    pub const NEXT_INCREMENT_ITEMS: usize = 6;
    pub const NEXT_INCREMENT_CHARS: usize = 110;
}

const MARKER_MISSION: &str = "MISSION:";
const MARKER_INTENTIONS: &str = "INTENTIONS_MAJEURES:";
const MARKER_KPI: &str = "INDICATEURS_CLES_OKR_KPI:";
const MARKER_SUGGESTION: &str = "SUGGESTION_IA:";

const SYSTEM_PROMPT: &str = "Tu es un coach PM/PO. \
Tes critiques sont factuelles, priorisées, contextualisées et actionnables.";

const PROMPT_HEADER: &str = "A partir du contexte, produis quatre blocs de texte en français:
MISSION:
- max 5 lignes
- orientation exécution / priorités
INTENTIONS_MAJEURES:
- max 10 lignes
- se concentrer sur le prochain incrément (3 mois)
INDICATEURS_CLES_OKR_KPI:
- max 8 lignes
- indicateurs concrets, mesurables, orientés résultat
SUGGESTION_IA:
- max 4 lignes
- critique et suggestion actionnable pour PO/PM
- citer explicitement 1 à 3 epics (noms exacts) et au moins 1 élément concret
- mentionner au moins 1 faiblesse concrète détectée dans le contenu
- phrases courtes, pas de markdown
Réponds STRICTEMENT avec:
MISSION:\\n...\\nINTENTIONS_MAJEURES:\\n...\\nINDICATEURS_CLES_OKR_KPI:\\n...\\nSUGGESTION_IA:\\n...

";

const HEAVY_WARNING_AI: &str =
    "PO/PM: contenu fortement résumé par IA. Ajouter le détail opérationnel dans les Features.";
const HEAVY_WARNING_LOCAL: &str =
    "PO/PM: contenu fortement résumé. Ajouter le détail opérationnel dans les Features.";

fn clean(text: &str) -> &str {
    text.trim()
}

fn is_named(person: &str) -> bool {
    let p = clean(person);
    !p.is_empty() && p != UNKNOWN_PERSON
}

fn join_or(items: &[String], default: &str) -> String {
    let named: Vec<&str> = items.iter().map(|s| clean(s)).filter(|s| !s.is_empty()).collect();
    if named.is_empty() {
        default.to_string()
    } else {
        named.join(", ")
    }
}

/// Keep the first `max_lines` non-blank lines, trimmed.
pub fn clip_lines(text: &str, max_lines: usize) -> String {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .take(max_lines)
        .collect::<Vec<_>>()
        .join("\n")
}

fn clip_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", head.trim_end())
}

/// Plain-text description of a team and its epics, fed to the LLM.
pub fn team_context(team: &Team) -> String {
    let mut lines = vec![
        format!("Equipe: {}", team.name),
        format!("PM: {}", join_or(&team.pm_list, "non renseigné")),
        format!("PO équipe: {}", join_or(&team.po_list, "non renseigné")),
        format!(
            "Nb membres équipe: {}",
            team.members.iter().filter(|m| is_named(m)).count()
        ),
    ];

    for epic in &team.epics {
        let description = clean(&epic.description);
        let current = clean(&epic.intention_current);
        let next = clean(&epic.intention_next);
        let features: Vec<&str> = epic
            .features
            .iter()
            .map(|f| clean(f))
            .filter(|f| !f.is_empty())
            .collect();
        let assignments: Vec<String> = epic
            .assignments
            .iter()
            .filter(|a| is_named(&a.person))
            .map(|a| {
                let role = match clean(&a.role) {
                    "" => "rôle non renseigné",
                    r => r,
                };
                format!("{} ({} - {:.1}%)", clean(&a.person), role, a.charge)
            })
            .collect();
        if description.is_empty()
            && current.is_empty()
            && next.is_empty()
            && features.is_empty()
            && assignments.is_empty()
        {
            continue;
        }

        lines.push(format!("- Epic: {}", epic.name));
        lines.push(format!("  PO epic: {}", join_or(&epic.po_list, "non renseigné")));
        for (label, value) in [
            ("Description", description),
            ("Intention PI", current),
            ("Intention suivante", next),
        ] {
            if !value.is_empty() {
                lines.push(format!("  {}: {}", label, value));
            }
        }
        push_capped(&mut lines, "  Features PI:", &features, limits::CONTEXT_FEATURES);
        push_capped(
            &mut lines,
            "  Affectations:",
            &assignments,
            limits::CONTEXT_ASSIGNMENTS,
        );
    }
    lines.join("\n")
}

fn push_capped<S: AsRef<str>>(lines: &mut Vec<String>, heading: &str, items: &[S], cap: usize) {
    if items.is_empty() {
        return;
    }
    lines.push(heading.to_string());
    lines.extend(items.iter().take(cap).map(|i| format!("    - {}", i.as_ref())));
    if items.len() > cap {
        lines.push(format!("    - ... +{} autres", items.len() - cap));
    }
}

/// Whether a context is long enough to warn that the text was condensed.
pub fn is_heavy(context: &str) -> bool {
    context.chars().count() >= limits::HEAVY_CONTEXT_CHARS
}

/// Trim a context to `max_chars`, dropping whole trailing lines.
pub fn compress_context(context: &str, max_chars: usize) -> String {
    let text = context.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    let mut kept = Vec::new();
    let mut total = 0;
    for line in &lines {
        let add = line.chars().count() + 1;
        if total + add > max_chars {
            break;
        }
        kept.push(line.to_string());
        total += add;
    }
    if kept.is_empty() {
        return text.chars().take(max_chars).collect();
    }
    let omitted = lines.len() - kept.len();
    if omitted > 0 {
        kept.push(format!("... ({} lignes omises pour respecter la limite)", omitted));
    }
    kept.join("\n")
}

fn local_mission(team: &Team) -> String {
    if team.epics.is_empty() {
        return "Mission non détaillée pour ce PI.".to_string();
    }
    let names: Vec<&str> = team.epics.iter().map(|e| clean(&e.name)).filter(|n| !n.is_empty()).collect();
    if names.is_empty() {
        return "Equipe sans mission détaillée (epics non renseignés).".to_string();
    }

    let mut headline = names.iter().take(3).copied().collect::<Vec<_>>().join(", ");
    if names.len() > 3 {
        headline.push_str(&format!(", +{} autres epics", names.len() - 3));
    }
    let intention = team.epics.iter().find_map(|e| {
        [clean(&e.intention_current), clean(&e.intention_next)]
            .into_iter()
            .find(|t| !t.is_empty())
    });
    let text = match intention {
        Some(i) => format!("Mission: porter {}. Intentions clefs: {}", headline, i),
        None => format!("Mission: porter {}.", headline),
    };
    clip_lines(&text, limits::MISSION_LINES)
}

fn local_next_increment(team: &Team) -> String {
    let mut seen = HashSet::new();
    let bullets: Vec<String> = team
        .epics
        .iter()
        .map(|e| clean(&e.intention_next))
        .filter(|t| !t.is_empty() && seen.insert(*t))
        .take(limits::NEXT_INCREMENT_ITEMS)
        .map(|t| {
            let flat = t.replace('\n', " ");
            format!("- {}", clip_chars(flat.trim(), limits::NEXT_INCREMENT_CHARS))
        })
        .collect();
    if bullets.is_empty() {
        "Intention prochain incrément non renseignée.".to_string()
    } else {
        clip_lines(&bullets.join("\n"), limits::INTENTION_LINES)
    }
}

/// KPI lines and a contextual suggestion computed from the epics.
fn local_kpis(team: &Team) -> (String, String) {
    let epics = team.epics.len();
    let features = team.feature_count();
    let staffed = team.epics.iter().filter(|e| !e.assignments.is_empty()).count();
    let total_charge: f64 = team
        .epics
        .iter()
        .flat_map(|e| e.assignments.iter())
        .map(|a| if a.charge.is_finite() { a.charge } else { 0.0 })
        .sum();
    let people: HashSet<&str> = team
        .epics
        .iter()
        .flat_map(|e| e.assignments.iter())
        .map(|a| clean(&a.person))
        .filter(|p| !p.is_empty())
        .collect();

    let kpis = [
        format!("- Nb epics portées : {}", epics),
        format!("- Nb features PI : {}", features),
        format!("- Epics avec affectations : {}/{}", staffed, epics),
        format!("- Charge totale déclarée : {:.1}%", total_charge),
        format!("- Personnes impliquées : {}", people.len()),
    ]
    .join("\n");

    let mut by_features: Vec<_> = team.epics.iter().filter(|e| !clean(&e.name).is_empty()).collect();
    by_features.sort_by(|a, b| b.features.len().cmp(&a.features.len()));
    let top: Vec<_> = by_features.into_iter().take(2).collect();
    let focus = if top.is_empty() {
        "les epics du portefeuille".to_string()
    } else {
        top.iter().map(|e| clean(&e.name)).collect::<Vec<_>>().join(", ")
    };

    let missing_intentions = team
        .epics
        .iter()
        .filter(|e| clean(&e.intention_current).is_empty() && clean(&e.intention_next).is_empty())
        .count();
    let without_features = team.epics.iter().filter(|e| e.features.is_empty()).count();
    let without_assignments = epics - staffed;

    let mut critique = Vec::new();
    if missing_intentions > 0 {
        critique.push(format!("{}/{} epics sans intention explicite", missing_intentions, epics));
    }
    if without_features > 0 {
        critique.push(format!("{}/{} epics sans features rattachées", without_features, epics));
    }
    if without_assignments > 0 {
        critique.push(format!(
            "{}/{} epics sans affectation détaillée",
            without_assignments, epics
        ));
    }
    let critique = if critique.is_empty() {
        "contenu globalement structuré".to_string()
    } else {
        critique.join("; ")
    };

    let action = match top.first() {
        Some(epic) if !epic.features.is_empty() => format!(
            "prioriser les livrables de '{}' et associer chaque feature à un indicateur de résultat",
            clean(&epic.name)
        ),
        _ => "définir 2-3 KPI cibles (délai, adoption, qualité) et lier chaque KPI à 1 feature mesurable"
            .to_string(),
    };

    let suggestion = format!(
        "Suggestion IA: équipe {}. Contexte prioritaire: {}. Point critique: {}. Action PO/PM: {}.",
        team.name, focus, critique, action
    );
    (
        clip_lines(&kpis, limits::KPI_LINES),
        clip_lines(&suggestion, limits::SUGGESTION_LINES),
    )
}

/// Deterministic narrative built from the team's epics alone.
pub fn local_narrative(team: &Team, context: &str) -> TeamNarrative {
    let (kpi_summary, kpi_suggestion) = local_kpis(team);
    TeamNarrative {
        mission: local_mission(team),
        next_increment: local_next_increment(team),
        kpi_summary,
        kpi_suggestion,
        ai_used: false,
        warning: if is_heavy(context) {
            HEAVY_WARNING_LOCAL.to_string()
        } else {
            String::new()
        },
    }
}

/// The four sections of an LLM answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Sections {
    pub mission: String,
    pub intentions: String,
    pub kpis: String,
    pub suggestion: String,
}

/// Split an answer on its four markers. `None` when any marker is missing.
pub fn parse_sections(text: &str) -> Option<Sections> {
    let after = |marker: &str| text.split_once(marker).map(|(_, rest)| rest);
    let before = |rest: &str, marker: &str| {
        rest.split_once(marker)
            .map_or(rest, |(head, _)| head)
            .trim()
            .to_string()
    };

    let mission = before(after(MARKER_MISSION)?, MARKER_INTENTIONS);
    let intentions = before(after(MARKER_INTENTIONS)?, MARKER_KPI);
    let kpis = before(after(MARKER_KPI)?, MARKER_SUGGESTION);
    let suggestion = after(MARKER_SUGGESTION)?.trim().to_string();

    Some(Sections {
        mission: clip_lines(&mission, limits::MISSION_LINES),
        intentions: clip_lines(&intentions, limits::INTENTION_LINES),
        kpis: clip_lines(&kpis, limits::KPI_LINES),
        suggestion: clip_lines(&suggestion, limits::SUGGESTION_LINES),
    })
}

/// Prefix a suggestion that names none of the team's epics with the first one.
fn anchor_suggestion(team: &Team, suggestion: &str) -> String {
    let names: Vec<&str> = team.epics.iter().map(|e| e.name.as_str()).filter(|n| !clean(n).is_empty()).collect();
    let text = clean(suggestion);
    match names.first() {
        Some(first) if !names.iter().any(|n| text.contains(n)) => clip_lines(
            &format!("Pour {}, focus prioritaire sur {}. {}", team.name, first, text),
            limits::SUGGESTION_LINES,
        ),
        _ => clip_lines(text, limits::SUGGESTION_LINES),
    }
}

fn or_default(text: String, default: &str) -> String {
    if text.is_empty() { default.to_string() } else { text }
}

/// Something that can answer a chat request.
pub trait SummaryBackend: Sync {
    fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion, ChatError>;
}

impl SummaryBackend for ChatClient {
    fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion, ChatError> {
        ChatClient::complete(self, request)
    }
}

fn prompt(team: &Team, context: &str) -> String {
    format!(
        "{}Equipe: {}\nContexte epics:\n{}",
        PROMPT_HEADER, team.name, context
    )
}

/// How one team's narrative was produced.
#[derive(Debug, Clone, PartialEq)]
enum Outcome {
    Llm { retried: bool },
    Fallback { reason: String },
}

/// Ask the backend for a narrative, retrying once on an empty answer.
fn llm_narrative(
    backend: &dyn SummaryBackend,
    team: &Team,
    context: &str,
) -> Result<(TeamNarrative, bool), String> {
    let first = ChatRequest {
        system: SYSTEM_PROMPT.to_string(),
        user: prompt(team, &compress_context(context, limits::PROMPT_CONTEXT_CHARS)),
        max_tokens: limits::MAX_TOKENS,
        temperature: 0.2,
    };

    let (completion, retried) = match backend.complete(&first) {
        Ok(c) => (c, false),
        Err(ChatError::EmptyResponse(finish_reason)) => {
            tracing::debug!(team = %team.name, %finish_reason, "empty completion, retrying");
            let retry = ChatRequest {
                user: prompt(team, &compress_context(context, limits::RETRY_CONTEXT_CHARS)),
                max_tokens: if finish_reason == "length" {
                    limits::RETRY_MAX_TOKENS
                } else {
                    limits::MAX_TOKENS
                },
                ..first
            };
            let c = backend.complete(&retry).map_err(|e| e.reason().to_string())?;
            (c, true)
        }
        Err(e) => return Err(e.reason().to_string()),
    };

    let sections = parse_sections(&completion.text).ok_or_else(|| "invalid_format".to_string())?;
    if sections.mission.is_empty() {
        return Err("missing_mission".to_string());
    }

    let narrative = TeamNarrative {
        mission: sections.mission,
        next_increment: or_default(
            sections.intentions,
            "Intention prochain incrément non renseignée.",
        ),
        kpi_summary: or_default(sections.kpis, "Indicateurs non renseignés."),
        kpi_suggestion: anchor_suggestion(
            team,
            &or_default(sections.suggestion, "Suggestion IA non disponible."),
        ),
        ai_used: true,
        warning: if is_heavy(context) {
            HEAVY_WARNING_AI.to_string()
        } else {
            String::new()
        },
    };
    Ok((narrative, retried))
}

/// Counters of one enrichment run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnrichmentStats {
    /// Teams sent to the LLM
    pub planned: usize,
    pub ok: usize,
    pub fallback: usize,
    /// Successes that needed the retry prompt
    pub retried_ok: usize,
    pub fallback_reasons: BTreeMap<String, usize>,
}

impl EnrichmentStats {
    fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Llm { retried } => {
                self.ok += 1;
                if *retried {
                    self.retried_ok += 1;
                }
            }
            Outcome::Fallback { reason } => {
                self.fallback += 1;
                *self.fallback_reasons.entry(reason.clone()).or_default() += 1;
            }
        }
    }

    pub fn done(&self) -> usize {
        self.ok + self.fallback
    }
}

/// Local narratives for every team, no network involved.
pub fn local_narratives(model: &BuiltModel) -> NarrativeMap {
    model
        .teams
        .iter()
        .map(|t| (t.id, local_narrative(t, &team_context(t))))
        .collect()
}

/// Narratives for every team, through `backend` when one is given.
///
/// At most `max_workers` requests are in flight. Any failure for a team falls
/// back to [`local_narrative`] for that team only.
pub fn enrich(
    model: &BuiltModel,
    backend: Option<&dyn SummaryBackend>,
    max_workers: usize,
) -> (NarrativeMap, EnrichmentStats) {
    let Some(backend) = backend else {
        return (local_narratives(model), EnrichmentStats::default());
    };

    let jobs: Vec<(&Team, String)> = model.teams.iter().map(|t| (t, team_context(t))).collect();
    let mut stats = EnrichmentStats {
        planned: jobs.len(),
        ..EnrichmentStats::default()
    };
    let mut narratives = NarrativeMap::new();
    if jobs.is_empty() {
        return (narratives, stats);
    }

    let workers = max_workers.clamp(1, jobs.len());
    tracing::info!(planned = stats.planned, workers, "starting narrative enrichment");

    let next = AtomicUsize::new(0);
    let (tx, rx) = mpsc::channel::<(usize, TeamNarrative, Outcome)>();
    std::thread::scope(|scope| {
        for _ in 0..workers {
            let tx = tx.clone();
            let jobs = &jobs;
            let next = &next;
            scope.spawn(move || {
                loop {
                    let index = next.fetch_add(1, Ordering::Relaxed);
                    let Some((team, context)) = jobs.get(index) else {
                        break;
                    };
                    let (narrative, outcome) = match llm_narrative(backend, team, context) {
                        Ok((n, retried)) => (n, Outcome::Llm { retried }),
                        Err(reason) => (local_narrative(team, context), Outcome::Fallback { reason }),
                    };
                    if tx.send((index, narrative, outcome)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(tx);

        for (index, narrative, outcome) in rx {
            let team = jobs[index].0;
            stats.record(&outcome);
            match &outcome {
                Outcome::Llm { .. } => tracing::info!(
                    team = %team.name,
                    done = stats.done(),
                    planned = stats.planned,
                    "narrative from LLM"
                ),
                Outcome::Fallback { reason } => tracing::warn!(
                    team = %team.name,
                    %reason,
                    done = stats.done(),
                    planned = stats.planned,
                    "narrative fell back to local summary"
                ),
            }
            narratives.insert(team.id, narrative);
        }
    });

    tracing::info!(
        ok = stats.ok,
        fallback = stats.fallback,
        retried_ok = stats.retried_ok,
        "narrative enrichment finished"
    );
    (narratives, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Mapping;
    use crate::models::build_model;
    use crate::source::demo::demo_tables;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn demo_model() -> BuiltModel {
        let mapping = Mapping::embedded().unwrap();
        build_model(&demo_tables(&mapping), &mapping, "PI-10").unwrap()
    }

    const GOOD_ANSWER: &str = "MISSION:\nLivrer le socle paiement.\nINTENTIONS_MAJEURES:\n- Wallet mobile\nINDICATEURS_CLES_OKR_KPI:\n- Taux d'adoption\nSUGGESTION_IA:\nRenforcer les tests.";

    /// Answers from a script, in call order.
    struct Scripted {
        answers: Mutex<VecDeque<Result<ChatCompletion, ChatError>>>,
        prompts: Mutex<Vec<ChatRequest>>,
    }

    impl Scripted {
        fn new(answers: Vec<Result<ChatCompletion, ChatError>>) -> Self {
            Self {
                answers: Mutex::new(answers.into()),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    impl SummaryBackend for Scripted {
        fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion, ChatError> {
            self.prompts.lock().unwrap().push(request.clone());
            self.answers
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ChatError::Http("script exhausted".into())))
        }
    }

    /// Always answers the same text.
    struct Fixed(&'static str);

    impl SummaryBackend for Fixed {
        fn complete(&self, _request: &ChatRequest) -> Result<ChatCompletion, ChatError> {
            Ok(ChatCompletion {
                text: self.0.to_string(),
                finish_reason: "stop".to_string(),
            })
        }
    }

    fn text(s: &str) -> Result<ChatCompletion, ChatError> {
        Ok(ChatCompletion {
            text: s.to_string(),
            finish_reason: "stop".to_string(),
        })
    }

    fn assert_filled(n: &TeamNarrative) {
        assert!(!n.mission.is_empty());
        assert!(!n.next_increment.is_empty());
        assert!(!n.kpi_summary.is_empty());
        assert!(!n.kpi_suggestion.is_empty());
    }

    #[test]
    fn test_local_narrative_shape() {
        let model = demo_model();
        let alpha = model.team(1).unwrap();
        let n = local_narrative(alpha, &team_context(alpha));
        assert_filled(&n);
        assert!(!n.ai_used);
        assert!(n.mission.starts_with("Mission: porter Epic Paiement Digital."));
        assert!(n.mission.contains("Livrer le socle API paiement v2"));
        assert_eq!(n.next_increment, "- MVP paiement mobile opérationnel");
        assert!(n.kpi_summary.contains("- Nb features PI : 2"));
        assert!(n.kpi_summary.contains("- Charge totale déclarée : 240.0%"));
        assert!(n.kpi_suggestion.contains("prioriser les livrables de 'Epic Paiement Digital'"));
        assert!(n.warning.is_empty());
    }

    #[test]
    fn test_local_narrative_without_epics() {
        let mut model = demo_model();
        let team = &mut model.teams[0];
        team.epics.clear();
        let n = local_narrative(team, &team_context(team));
        assert_filled(&n);
        assert_eq!(n.mission, "Mission non détaillée pour ce PI.");
        assert_eq!(n.next_increment, "Intention prochain incrément non renseignée.");
        assert!(n.kpi_suggestion.contains("définir 2-3 KPI cibles"));
    }

    #[test]
    fn test_heavy_context_sets_warning() {
        let model = demo_model();
        let team = model.team(1).unwrap();
        let n = local_narrative(team, &"x".repeat(limits::HEAVY_CONTEXT_CHARS));
        assert_eq!(n.warning, HEAVY_WARNING_LOCAL);
    }

    #[test]
    fn test_team_context_lists_epics() {
        let model = demo_model();
        let ctx = team_context(model.team(1).unwrap());
        assert!(ctx.starts_with("Equipe: Team Alpha\nPM: Alice Martin"));
        assert!(ctx.contains("- Epic: Epic Paiement Digital"));
        assert!(ctx.contains("    - Bob Dupont (PO - 80.0%)"));
        assert!(ctx.contains("  Intention suivante: MVP paiement mobile opérationnel"));
    }

    #[test]
    fn test_compress_context() {
        let ctx = (0..100).map(|i| format!("ligne {}", i)).collect::<Vec<_>>().join("\n");
        let short = compress_context(&ctx, 50);
        assert!(short.ends_with("lignes omises pour respecter la limite)"));
        assert!(short.starts_with("ligne 0\nligne 1"));
        assert_eq!(compress_context("court", 50), "court");
        assert_eq!(compress_context(&"y".repeat(80), 10), "y".repeat(10));
    }

    #[test]
    fn test_parse_sections() {
        let s = parse_sections(GOOD_ANSWER).unwrap();
        assert_eq!(s.mission, "Livrer le socle paiement.");
        assert_eq!(s.intentions, "- Wallet mobile");
        assert_eq!(s.kpis, "- Taux d'adoption");
        assert_eq!(s.suggestion, "Renforcer les tests.");
        assert!(parse_sections("MISSION: only").is_none());
    }

    #[test]
    fn test_parse_sections_clips_lines() {
        let mission = (0..9).map(|i| format!("m{}", i)).collect::<Vec<_>>().join("\n");
        let answer = format!("MISSION:\n{}\nINTENTIONS_MAJEURES:\nINDICATEURS_CLES_OKR_KPI:\nSUGGESTION_IA:\n", mission);
        let s = parse_sections(&answer).unwrap();
        assert_eq!(s.mission.lines().count(), limits::MISSION_LINES);
        assert!(s.intentions.is_empty());
    }

    #[test]
    fn test_enrich_without_backend_is_local() {
        let model = demo_model();
        let (map, stats) = enrich(&model, None, 8);
        assert_eq!(map.len(), 3);
        assert_eq!(stats, EnrichmentStats::default());
        assert!(map.values().all(|n| !n.ai_used));
    }

    #[test]
    fn test_enrich_with_llm() {
        let model = demo_model();
        let backend = Fixed(GOOD_ANSWER);
        let (map, stats) = enrich(&model, Some(&backend as &dyn SummaryBackend), 4);
        assert_eq!(map.len(), 3);
        assert_eq!(stats.planned, 3);
        assert_eq!(stats.ok, 3);
        assert_eq!(stats.fallback, 0);
        for team in &model.teams {
            let n = &map[&team.id];
            assert!(n.ai_used);
            assert_filled(n);
            // anchored on the team's first epic since the answer names none
            assert!(n.kpi_suggestion.starts_with(&format!("Pour {}, focus prioritaire sur", team.name)));
        }
    }

    #[test]
    fn test_invalid_answer_falls_back() {
        let model = demo_model();
        let backend = Fixed("pas de marqueurs");
        let (map, stats) = enrich(&model, Some(&backend as &dyn SummaryBackend), 2);
        assert_eq!(stats.fallback, 3);
        assert_eq!(stats.fallback_reasons.get("invalid_format"), Some(&3));
        assert!(map.values().all(|n| !n.ai_used));
        map.values().for_each(assert_filled);
    }

    #[test]
    fn test_empty_answer_retried_once() {
        let model = demo_model();
        let team = model.team(1).unwrap();
        let ctx = team_context(team);
        let backend = Scripted::new(vec![
            Err(ChatError::EmptyResponse("length".into())),
            text(GOOD_ANSWER),
        ]);
        let (n, retried) = llm_narrative(&backend, team, &ctx).unwrap();
        assert!(retried);
        assert!(n.ai_used);
        let prompts = backend.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 2);
        assert_eq!(prompts[1].max_tokens, limits::RETRY_MAX_TOKENS);
    }

    #[test]
    fn test_second_empty_answer_gives_up() {
        let model = demo_model();
        let team = model.team(2).unwrap();
        let backend = Scripted::new(vec![
            Err(ChatError::EmptyResponse("stop".into())),
            Err(ChatError::EmptyResponse("stop".into())),
            text(GOOD_ANSWER),
        ]);
        let err = llm_narrative(&backend, team, &team_context(team)).unwrap_err();
        assert_eq!(err, "empty_response");
        assert_eq!(backend.prompts.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_http_error_not_retried() {
        let model = demo_model();
        let team = model.team(3).unwrap();
        let backend = Scripted::new(vec![Err(ChatError::Unauthorized(401)), text(GOOD_ANSWER)]);
        assert_eq!(llm_narrative(&backend, team, &team_context(team)).unwrap_err(), "unauthorized");
        assert_eq!(backend.prompts.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_missing_mission_falls_back() {
        let model = demo_model();
        let team = model.team(1).unwrap();
        let backend = Fixed("MISSION:\nINTENTIONS_MAJEURES:\nx\nINDICATEURS_CLES_OKR_KPI:\ny\nSUGGESTION_IA:\nz");
        assert_eq!(
            llm_narrative(&backend, team, &team_context(team)).unwrap_err(),
            "missing_mission"
        );
    }

    #[test]
    fn test_suggestion_naming_epic_kept() {
        let model = demo_model();
        let team = model.team(1).unwrap();
        let s = anchor_suggestion(team, "Epic Paiement Digital manque de KPI.");
        assert_eq!(s, "Epic Paiement Digital manque de KPI.");
    }
}

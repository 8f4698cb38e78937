//! Embedded demo dataset.
//!
//! Three teams, four epics, eight PI-10 features, six people and nine
//! assignments. Epic 103 is linked from no team and only staffed by people who
//! already belong to other teams, so it comes out as a separate epic.
//!
//! Column names follow the embedded default mapping.

use crate::Result;
use crate::config::Mapping;
use crate::source::{RawTables, Row, Table, TableSource};
use serde_json::{Value, json};

/// The demo source.
#[derive(Debug, Clone, Copy, Default)]
pub struct Demo;

fn rows(values: Vec<Value>) -> Vec<Row> {
    values
        .into_iter()
        .filter_map(|v| match v {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect()
}

fn epic(id: i64, name: &str, description: &str, current: &str, next: &str) -> Value {
    json!({
        "id": id,
        "Nom": name,
        "Description_EPIC": description,
        "Intention_du_PI_en_cours": current,
        "Intention_du_prochain_Increment_ou_MVP_impact_a_3_mois_": next,
    })
}

fn feature(id: i64, epic: i64, name: &str) -> Value {
    json!({"id": id, "Epic": epic, "Nom": name, "pi_Num": "PI-10"})
}

fn assignment(id: i64, team: i64, epic: i64, person: i64, charge: i64, role: &str) -> Value {
    json!({
        "id": id,
        "Affecte_a_l_equipe": team,
        "Affecte_a_l_Epic": epic,
        "Personne": person,
        "Charge": charge,
        "Role": role,
    })
}

/// Build the demo tables, named after the mapping's table names.
pub fn demo_tables(mapping: &Mapping) -> RawTables {
    let teams = rows(vec![
        json!({"id": 1, "Nom": "Team Alpha", "Epics": ["L", 100]}),
        json!({"id": 2, "Nom": "Team Beta", "Epics": ["L", 101]}),
        json!({"id": 3, "Nom": "Team Gamma", "Epics": ["L", 102]}),
    ]);

    let people = rows(vec![
        json!({"id": 10, "Nom": "Alice Martin"}),
        json!({"id": 11, "Nom": "Bob Dupont"}),
        json!({"id": 12, "Nom": "Claire Lemaire"}),
        json!({"id": 13, "Nom": "David Morin"}),
        json!({"id": 14, "Nom": "Eva Girard"}),
        json!({"id": 15, "Nom": "François Bernard"}),
    ]);

    let epics = rows(vec![
        epic(
            100,
            "Epic Paiement Digital",
            "Modernisation du système de paiement",
            "Livrer le socle API paiement v2",
            "MVP paiement mobile opérationnel",
        ),
        epic(
            101,
            "Epic Onboarding Client",
            "Simplification du parcours d'inscription",
            "Réduire le temps d'onboarding de 30%",
            "Nouveau flow KYC automatisé",
        ),
        epic(
            102,
            "Epic Reporting Analytics",
            "Tableaux de bord décisionnels",
            "Déployer 5 KPIs critiques",
            "Dashboard self-service métier",
        ),
        epic(
            103,
            "Epic Sécurité & Conformité",
            "Mise en conformité RGPD et ISO 27001",
            "Audit sécurité complet",
            "Certification ISO 27001",
        ),
    ]);

    let features = rows(vec![
        feature(200, 100, "API Paiement v2"),
        feature(201, 100, "Wallet Mobile"),
        feature(202, 101, "Flow KYC Auto"),
        feature(203, 101, "Portail Client SSO"),
        feature(204, 102, "Dashboard KPIs"),
        feature(205, 102, "Export BI"),
        feature(206, 103, "Audit RGPD"),
        feature(207, 103, "Pentest Infra"),
    ]);

    let assignments = rows(vec![
        assignment(1, 1, 100, 10, 100, "PM"),
        assignment(2, 1, 100, 11, 80, "PO"),
        assignment(3, 1, 100, 12, 60, "DEV"),
        assignment(4, 2, 101, 13, 100, "PM"),
        assignment(5, 2, 101, 14, 80, "PO"),
        assignment(6, 3, 102, 15, 100, "PM"),
        assignment(7, 3, 102, 11, 40, "PO"),
        assignment(8, 3, 103, 11, 40, "PO"),
        assignment(9, 1, 103, 12, 30, "DEV"),
    ]);

    RawTables {
        teams: Table::from_rows(mapping.tables.teams.clone(), teams),
        people: Table::from_rows(mapping.tables.people.clone(), people),
        epics: Table::from_rows(mapping.tables.epics.clone(), epics),
        features: Table::from_rows(mapping.tables.features.clone(), features),
        assignments: Table::from_rows(mapping.tables.assignments.clone(), assignments),
    }
}

impl TableSource for Demo {
    fn label(&self) -> String {
        "demo".to_string()
    }

    fn load(&self, mapping: &Mapping) -> Result<RawTables> {
        Ok(demo_tables(mapping))
    }
}

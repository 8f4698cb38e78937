//! Common test utilities for orgmap integration tests.
//!
//! Provides `TestEnv` for isolated working directories that never read the
//! user's `~/.config/orgmap/` mapping or the caller's Grist/LLM settings.

#![allow(dead_code)]

use assert_cmd::Command;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
pub use tempfile::TempDir;

const SCRUBBED_ENV: [&str; 9] = [
    "GRIST_API_KEY",
    "GRIST_DOC_ID",
    "GRIST_BASE_URL",
    "LLM_API_KEY",
    "LLM_BASE_URL",
    "LLM_MODEL",
    "LLM_MAX_WORKERS",
    "ORGMAP_DIR",
    "ORGMAP_LOG",
];

/// A test environment with an isolated working and config directory.
///
/// `orgmap()` returns a `Command` running in `work_dir` with
/// `XDG_CONFIG_HOME` pointed at `config_dir`, making tests parallel-safe.
pub struct TestEnv {
    pub work_dir: TempDir,
    pub config_dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            work_dir: TempDir::new().unwrap(),
            config_dir: TempDir::new().unwrap(),
        }
    }

    /// Get a Command for the orgmap binary inside this environment.
    pub fn orgmap(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_orgmap"));
        cmd.current_dir(self.work_dir.path());
        cmd.env("XDG_CONFIG_HOME", self.config_dir.path());
        for name in SCRUBBED_ENV {
            cmd.env_remove(name);
        }
        cmd
    }

    pub fn path(&self) -> &Path {
        self.work_dir.path()
    }

    pub fn output_dir(&self) -> PathBuf {
        self.work_dir.path().join("output")
    }

    /// Write a file relative to the working directory.
    pub fn write(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.work_dir.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, contents).unwrap();
        path
    }

    /// Write the small `.grist` fixture under `data/`.
    pub fn write_grist(&self, name: &str) -> PathBuf {
        let path = self.work_dir.path().join("data").join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        write_grist_fixture(&path);
        path
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// A two-team Grist document for PI-7.
///
/// - "Plateforme Cloud" (1) owns "Migration K8s" (500)
/// - "Data Office" (2) owns "Catalogue de données" (501)
/// - "Audit Externe" (502) is referenced by no team
/// - Ines (21) works on both teams for 130 in total
/// - Omar (22) has no assignment
pub fn write_grist_fixture(path: &Path) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        r#"
        CREATE TABLE "Equipes" (id INTEGER PRIMARY KEY, "Nom" TEXT, "Epics" TEXT);
        INSERT INTO "Equipes" VALUES (1, 'Plateforme Cloud', '["L", 500]');
        INSERT INTO "Equipes" VALUES (2, 'Data Office', '["L", 501]');

        CREATE TABLE "Personnes" (id INTEGER PRIMARY KEY, "Nom" TEXT);
        INSERT INTO "Personnes" VALUES (20, 'Hugo Petit');
        INSERT INTO "Personnes" VALUES (21, 'Ines Roux');
        INSERT INTO "Personnes" VALUES (22, 'Omar Faure');

        CREATE TABLE "Epics" (
            id INTEGER PRIMARY KEY,
            "Nom" TEXT,
            "Description_EPIC" TEXT,
            "Intention_du_PI_en_cours" TEXT,
            "Intention_du_prochain_Increment_ou_MVP_impact_a_3_mois_" TEXT
        );
        INSERT INTO "Epics" VALUES (500, 'Migration K8s', 'Passage des services sur Kubernetes', 'Migrer 10 services', 'Tout le parc migré');
        INSERT INTO "Epics" VALUES (501, 'Catalogue de données', 'Référentiel des jeux de données', 'Publier le catalogue', 'Ouverture aux métiers');
        INSERT INTO "Epics" VALUES (502, 'Audit Externe', '', '', '');

        CREATE TABLE "Features" (id INTEGER PRIMARY KEY, "Epic" INTEGER, "Nom" TEXT, "pi_Num" TEXT);
        INSERT INTO "Features" VALUES (300, 500, 'Cluster de production', 'PI-7');
        INSERT INTO "Features" VALUES (301, 501, 'Moteur de recherche', '7');
        INSERT INTO "Features" VALUES (302, 501, 'Lineage', 'PI-8');
        INSERT INTO "Features" VALUES (303, 502, 'Rapport d''audit', 'PI-7');

        CREATE TABLE "Affectations" (
            id INTEGER PRIMARY KEY,
            "Affecte_a_l_equipe" INTEGER,
            "Affecte_a_l_Epic" INTEGER,
            "Personne" INTEGER,
            "Charge" REAL,
            "Role" TEXT
        );
        INSERT INTO "Affectations" VALUES (1, 1, 500, 20, 100, 'PM');
        INSERT INTO "Affectations" VALUES (2, 1, 500, 21, 70, 'PO');
        INSERT INTO "Affectations" VALUES (3, 2, 501, 21, 60, 'PO');
        "#,
    )
    .unwrap();
}

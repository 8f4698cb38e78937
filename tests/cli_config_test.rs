//! Integration tests for `orgmap config` and mapping overrides.

mod common;

use common::TestEnv;
use predicates::prelude::*;

#[test]
fn test_config_check_reports_missing_env() {
    let env = TestEnv::new();

    env.orgmap()
        .args(["config", "check"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""mapping_ok":true"#))
        .stdout(predicate::str::contains("GRIST_API_KEY"))
        .stdout(predicate::str::contains("LLM_API_KEY"));
}

#[test]
fn test_config_check_with_env_set() {
    let env = TestEnv::new();

    env.orgmap()
        .args(["-H", "config", "check"])
        .env("GRIST_API_KEY", "k")
        .env("GRIST_DOC_ID", "doc")
        .env("LLM_API_KEY", "k")
        .assert()
        .success()
        .stdout(predicate::str::contains("Grist API: ok"))
        .stdout(predicate::str::contains("LLM: ok"));
}

#[test]
fn test_config_show_embedded() {
    let env = TestEnv::new();

    env.orgmap()
        .args(["-H", "config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Equipes"))
        .stdout(predicate::str::contains("tables.teams = embedded"));
}

#[test]
fn test_project_mapping_overrides_key() {
    let env = TestEnv::new();
    env.write("config/mapping.kdl", "tables {\n    teams \"Teams\"\n}\n");

    env.orgmap()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""value":"Teams""#))
        .stdout(predicate::str::contains(r#""kind":"project""#));
}

#[test]
fn test_explicit_mapping_renames_table() {
    let env = TestEnv::new();
    env.write_grist("org.grist");
    let mapping = env.write("custom.kdl", "tables {\n    teams \"Squads\"\n}\n");

    // The fixture has no Squads table.
    env.orgmap()
        .args(["model", "--period", "7", "--mapping"])
        .arg(&mapping)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Squads"));
}

#[test]
fn test_missing_explicit_mapping_is_config_error() {
    let env = TestEnv::new();

    env.orgmap()
        .args(["config", "show", "--mapping", "absent.kdl"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("mapping file not found"));
}

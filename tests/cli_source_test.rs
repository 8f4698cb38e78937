//! Integration tests for reading `.grist` documents.

mod common;

use common::TestEnv;
use predicates::prelude::*;

fn model_json(env: &TestEnv, args: &[&str]) -> serde_json::Value {
    let output = env.orgmap().args(args).output().unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_model_from_explicit_grist_file() {
    let env = TestEnv::new();
    let path = env.write_grist("org.grist");

    let model = model_json(
        &env,
        &["model", "--period", "pi 7", "--source", path.to_str().unwrap()],
    );

    assert_eq!(model["period"], "PI-7");
    assert_eq!(model["stats"]["teams"], 2);
    assert_eq!(model["stats"]["features_period"], 3);
    assert_eq!(model["stats"]["epics_separate"], 1);
    assert_eq!(model["separate_epics"][0]["name"], "Audit Externe");

    let teams = model["teams"].as_array().unwrap();
    assert_eq!(teams[0]["name"], "Plateforme Cloud");
    assert_eq!(teams[0]["epics"][0]["name"], "Migration K8s");
    assert_eq!(
        teams[0]["epics"][0]["features"],
        serde_json::json!(["Cluster de production"])
    );
}

#[test]
fn test_default_grist_discovered_in_data_dir() {
    let env = TestEnv::new();
    env.write_grist("org.grist");

    env.orgmap()
        .args(["model", "--period", "7"])
        .assert()
        .success()
        .stdout(predicate::str::contains("org.grist"))
        .stdout(predicate::str::contains("Data Office"));
}

#[test]
fn test_missing_grist_file_is_unavailable() {
    let env = TestEnv::new();

    env.orgmap()
        .args(["model", "--period", "7", "--source", "nope.grist"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No data source available"));
}

#[test]
fn test_api_without_env_falls_back_to_file() {
    let env = TestEnv::new();
    env.write_grist("org.grist");

    env.orgmap()
        .args(["model", "--period", "7", "--api"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Plateforme Cloud"));
}

#[test]
fn test_analyze_grist_flags_multi_team() {
    let env = TestEnv::new();
    env.write_grist("org.grist");

    env.orgmap()
        .args(["analyze"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""over_100":1"#))
        .stdout(predicate::str::contains(r#""multi_team":1"#));

    let csv = std::fs::read_to_string(env.output_dir().join("multi_affectations.csv")).unwrap();
    let ines = csv.lines().find(|l| l.contains("Ines Roux")).unwrap();
    assert!(ines.starts_with("21,Ines Roux,2,2,"));
}

#[test]
fn test_layout_json_for_grist() {
    let env = TestEnv::new();
    env.write_grist("org.grist");

    let layout = model_json(&env, &["layout", "--period", "7"]);
    assert_eq!(layout["period"], "PI-7");
    assert_eq!(layout["teams"].as_array().unwrap().len(), 2);
    assert_eq!(layout["separate_epics"].as_array().unwrap().len(), 1);
    assert!(layout["low_or_unassigned_box"].is_object());
}

use assert_cmd::Command;
use predicates::prelude::*;

const FORMULA: &str = "nearc4 ~ exper + black + south + smsa + C(region)";

#[test]
fn test_cli_prints_summary() {
    let mut cmd = Command::cargo_bin("ipsw-cli").unwrap();
    cmd.args([
        "--data",
        "tests/data/card_synthetic.csv",
        "--outcome",
        "lwage",
        "--treatment",
        "educ",
        "--formula",
        FORMULA,
        "--bootstrap-reps",
        "50",
    ]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("IPSW Estimation Results"))
        .stdout(predicate::str::contains("LATE/ACR"))
        .stdout(predicate::str::contains("seed 52"));
}

#[test]
fn test_cli_writes_json_and_markdown() {
    let dir = std::env::temp_dir();
    let json_path = dir.join(format!("ipsw_cli_{}.json", std::process::id()));
    let md_path = dir.join(format!("ipsw_cli_{}.md", std::process::id()));

    let mut cmd = Command::cargo_bin("ipsw-cli").unwrap();
    cmd.args([
        "--data",
        "tests/data/card_synthetic.csv",
        "--outcome",
        "lwage",
        "--treatment",
        "educ",
        "--formula",
        FORMULA,
        "--bootstrap-reps",
        "20",
        "--estimator",
        "unnormalized",
    ])
    .arg("--output-json")
    .arg(&json_path)
    .arg("--output-markdown")
    .arg(&md_path);
    cmd.assert().success();

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
    assert_eq!(json["estimator"], "unnormalized");
    assert_eq!(json["n_obs"], 400);
    assert_eq!(json["bootstrap_requested"], 20);
    assert!(json["estimate"].as_f64().unwrap().is_finite());

    let markdown = std::fs::read_to_string(&md_path).unwrap();
    assert!(markdown.contains("| LATE/ACR |"));

    let _ = std::fs::remove_file(json_path);
    let _ = std::fs::remove_file(md_path);
}

#[test]
fn test_cli_rejects_non_binary_instrument() {
    let mut cmd = Command::cargo_bin("ipsw-cli").unwrap();
    cmd.args([
        "--data",
        "tests/data/card_synthetic.csv",
        "--outcome",
        "lwage",
        "--treatment",
        "educ",
        "--formula",
        "region ~ exper",
        "--bootstrap-reps",
        "10",
    ]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Error:"))
        .stderr(predicate::str::contains("Data error"));
}

#[test]
fn test_cli_rejects_unknown_estimator() {
    let mut cmd = Command::cargo_bin("ipsw-cli").unwrap();
    cmd.args([
        "--data",
        "tests/data/card_synthetic.csv",
        "--outcome",
        "lwage",
        "--treatment",
        "educ",
        "--formula",
        FORMULA,
        "--estimator",
        "tsls",
    ]);
    cmd.assert().failure().stderr(predicate::str::contains("Error:"));
}

#[test]
fn test_cli_missing_file() {
    let mut cmd = Command::cargo_bin("ipsw-cli").unwrap();
    cmd.args([
        "--data",
        "tests/data/does_not_exist.csv",
        "--outcome",
        "lwage",
        "--treatment",
        "educ",
        "--formula",
        FORMULA,
    ]);
    cmd.assert().failure().stderr(predicate::str::contains("Error:"));
}

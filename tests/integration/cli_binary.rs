//! Binary smoke tests for the offline subcommands

use assert_cmd::Command;
use std::io::Write;
use tempfile::NamedTempFile;

const TABLE: &str = "\
reach_id,river_name,reach_len
63470800171.0,Ohio River,10234.5
63470800181,Ohio River,9800.1
74230900181,Mississippi River,12011.0
";

fn binary() -> Command {
    Command::cargo_bin("hydrocron-downloader").unwrap()
}

fn table() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(TABLE.as_bytes()).unwrap();
    file
}

#[test]
fn test_fields_lists_reach_fields() {
    let output = binary()
        .args(["fields", "--feature-type", "reach", "wse"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.lines().any(|l| l == "wse"));
    assert!(!stdout.contains("width"));
}

#[test]
fn test_catalog_filter_prints_matching_ids() {
    let file = table();
    let output = binary()
        .args(["catalog", "filter"])
        .arg(file.path())
        .args(["--column", "river_name", "--value", "Ohio River"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let ids: Vec<&str> = stdout.lines().collect();
    assert_eq!(ids, vec!["63470800171", "63470800181"]);
}

#[test]
fn test_catalog_values_lists_rivers() {
    let file = table();
    let output = binary()
        .args(["catalog", "values"])
        .arg(file.path())
        .args(["--column", "river_name"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("2 distinct values of river_name"));
    assert!(stdout.contains("Mississippi River"));
}

#[test]
fn test_catalog_unknown_column_fails() {
    let file = table();
    binary()
        .args(["catalog", "values"])
        .arg(file.path())
        .args(["--column", "basin"])
        .assert()
        .failure();
}

#[test]
fn test_retrieve_rejects_unknown_variable() {
    binary()
        .args([
            "retrieve",
            "--feature-id",
            "63470800171",
            "--variables",
            "not_a_field",
            "--start",
            "2023-08-01",
            "--end",
            "2023-09-01",
        ])
        .env("HYDROCRON_BASE_URL", "http://127.0.0.1:9")
        .assert()
        .failure();
}

#[test]
fn test_retrieve_rejects_inverted_range() {
    binary()
        .args([
            "retrieve",
            "--feature-id",
            "63470800171",
            "--variables",
            "wse",
            "--start",
            "2023-09-01",
            "--end",
            "2023-08-01",
        ])
        .env("HYDROCRON_BASE_URL", "http://127.0.0.1:9")
        .assert()
        .failure();
}

//! Integration tests for the mteb CLI

use std::process::Command;

fn cargo_run(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_mteb"))
        .args(args)
        .output()
        .expect("Failed to run command")
}

#[test]
fn test_cli_help() {
    let output = cargo_run(&["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("run"));
    assert!(stdout.contains("tasks"));
    assert!(stdout.contains("models"));
    assert!(stdout.contains("results"));
    assert!(stdout.contains("config"));
}

#[test]
fn test_cli_version() {
    let output = cargo_run(&["--version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("mteb"));
}

#[test]
fn test_run_help() {
    let output = cargo_run(&["run", "--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--model"));
    assert!(stdout.contains("--tasks"));
    assert!(stdout.contains("--embedding-mode"));
    assert!(stdout.contains("--overwrite"));
}

#[test]
fn test_tasks_json_lists_xmarket() {
    let output = cargo_run(&["tasks", "--format", "json"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let tasks: serde_json::Value = serde_json::from_str(&stdout).expect("valid json");
    let names: Vec<&str> = tasks
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|t| t["name"].as_str())
        .collect();
    assert!(names.contains(&"XMarket"));
}

#[test]
fn test_tasks_language_filter() {
    let output = cargo_run(&["tasks", "--languages", "fra"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Total: 0 task(s)"));
}

#[test]
fn test_models_lists_registry() {
    let output = cargo_run(&["models", "--detailed"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("jinaai/jina-embeddings-v3"));
    assert!(stdout.contains("WhereIsAI/UAE-Large-V1"));
    assert!(stdout.contains("retrieval.query"));
}

#[test]
fn test_results_empty_folder() {
    let dir = tempfile::tempdir().unwrap();
    let folder = dir.path().join("results");
    let output = cargo_run(&["results", "--output-folder", folder.to_str().unwrap()]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("No results found"));
}

#[test]
fn test_unknown_task_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_mteb"))
        .args(["run", "--model", "some/model", "--tasks", "NoSuchTask", "--embedding-mode", "ollama"])
        .env("HOME", dir.path())
        .env("XDG_CONFIG_HOME", dir.path())
        .output()
        .expect("Failed to run command");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown task: NoSuchTask"));
}

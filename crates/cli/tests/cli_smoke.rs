//! CLI smoke tests for prebake.
//!
//! These tests run every command against small archives and check exit
//! codes and the files written.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serial_test::serial;
use tempfile::TempDir;

/// Get a Command for the prebake binary.
fn prebake_cmd() -> Command {
  cargo_bin_cmd!("prebake")
}

/// Create a temp directory holding `archive.json`.
fn temp_archive(content: &str) -> TempDir {
  let temp = TempDir::new().unwrap();
  std::fs::write(temp.path().join("archive.json"), content).unwrap();
  temp
}

const ARCHIVE: &str = r#"{
  "classes": [
    {
      "name": "com.acme.Greeting",
      "annotations": [{ "name": "io.quarkus.runtime.annotations.RegisterForReflection" }],
      "bytes": "cafebabe"
    }
  ],
  "config": { "quarkus.application.name": "greeter" }
}"#;

// =============================================================================
// Help & Version
// =============================================================================

#[test]
fn help_flag_works() {
  prebake_cmd()
    .arg("--help")
    .assert()
    .success()
    .stdout(predicate::str::contains("Usage"));
}

#[test]
fn version_flag_works() {
  prebake_cmd()
    .arg("--version")
    .assert()
    .success()
    .stdout(predicate::str::contains("prebake"));
}

#[test]
fn subcommand_help_works() {
  for cmd in &["augment", "graph", "steps"] {
    prebake_cmd()
      .arg(cmd)
      .arg("--help")
      .assert()
      .success()
      .stdout(predicate::str::contains("Usage"));
  }
}

// =============================================================================
// steps / graph
// =============================================================================

#[test]
fn steps_lists_builtin_steps() {
  prebake_cmd()
    .arg("steps")
    .assert()
    .success()
    .stdout(predicate::str::contains("IndexProcessor#buildIndex"))
    .stdout(predicate::str::contains("MainClassProcessor#generateMainClass"));
}

#[test]
fn steps_json_is_valid() {
  let output = prebake_cmd().args(["steps", "-o", "json"]).output().unwrap();
  assert!(output.status.success());
  let steps: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert!(!steps.as_array().unwrap().is_empty());
}

#[test]
fn graph_prints_dot() {
  prebake_cmd()
    .arg("graph")
    .assert()
    .success()
    .stdout(predicate::str::starts_with("digraph {"))
    .stdout(predicate::str::contains("NativeImageProcessor#writeConfig"));
}

// =============================================================================
// augment
// =============================================================================

#[test]
#[serial]
fn augment_writes_artifacts() {
  let temp = temp_archive(ARCHIVE);
  let out = temp.path().join("out");

  prebake_cmd()
    .arg("augment")
    .arg(temp.path().join("archive.json"))
    .arg("--out")
    .arg(&out)
    .assert()
    .success()
    .stdout(predicate::str::contains("Augmentation complete"));

  let reflect = std::fs::read_to_string(out.join("META-INF/native-image/reflect-config.json")).unwrap();
  assert!(reflect.contains("com.acme.Greeting"));
  assert!(out.join("artifact-manifest.json").exists());
  assert!(out.join("io/quarkus/runner/ApplicationImpl.class").exists());
}

#[test]
#[serial]
fn augment_json_reports_digest() {
  let temp = temp_archive(ARCHIVE);

  let output = prebake_cmd()
    .arg("augment")
    .arg(temp.path().join("archive.json"))
    .arg("--out")
    .arg(temp.path().join("out"))
    .args(["-o", "json", "-j", "1"])
    .output()
    .unwrap();
  assert!(output.status.success());
  let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(summary["digest"].as_str().unwrap().len(), 64);
}

#[test]
#[serial]
fn augment_writes_graph_when_asked() {
  let temp = temp_archive(ARCHIVE);
  let graph = temp.path().join("chain.dot");

  prebake_cmd()
    .arg("augment")
    .arg(temp.path().join("archive.json"))
    .arg("--out")
    .arg(temp.path().join("out"))
    .arg("--graph")
    .arg(&graph)
    .assert()
    .success();

  assert!(std::fs::read_to_string(graph).unwrap().starts_with("digraph"));
}

#[test]
#[serial]
fn augment_respects_parallelism_env() {
  let temp = temp_archive(ARCHIVE);

  prebake_cmd()
    .arg("augment")
    .arg(temp.path().join("archive.json"))
    .arg("--out")
    .arg(temp.path().join("out"))
    .env("PREBAKE_PARALLELISM", "1")
    .assert()
    .success();
}

#[test]
#[serial]
fn augment_writes_graph_from_env() {
  let temp = temp_archive(ARCHIVE);
  let graph = temp.path().join("env-chain.dot");

  temp_env::with_vars(
    [
      ("PREBAKE_GRAPH_OUTPUT", Some(graph.to_str().unwrap())),
      ("PREBAKE_PARALLELISM", Some("2")),
    ],
    || {
      prebake_cmd()
        .arg("augment")
        .arg(temp.path().join("archive.json"))
        .arg("--out")
        .arg(temp.path().join("out"))
        .assert()
        .success();
    },
  );

  assert!(std::fs::read_to_string(graph).unwrap().starts_with("digraph"));
}

#[test]
#[serial]
fn augment_refuses_non_empty_output_without_force() {
  let temp = temp_archive(ARCHIVE);
  let out = temp.path().join("out");
  std::fs::create_dir_all(&out).unwrap();
  std::fs::write(out.join("stale.txt"), "old").unwrap();

  prebake_cmd()
    .arg("augment")
    .arg(temp.path().join("archive.json"))
    .arg("--out")
    .arg(&out)
    .assert()
    .failure()
    .stderr(predicate::str::contains("--force"));

  prebake_cmd()
    .arg("augment")
    .arg(temp.path().join("archive.json"))
    .arg("--out")
    .arg(&out)
    .arg("--force")
    .assert()
    .success();
}

// =============================================================================
// Error Handling
// =============================================================================

#[test]
fn augment_missing_archive_fails() {
  let temp = TempDir::new().unwrap();

  prebake_cmd()
    .arg("augment")
    .arg("/nonexistent/archive.json")
    .arg("--out")
    .arg(temp.path().join("out"))
    .assert()
    .failure()
    .stderr(predicate::str::contains("Failed to load archive"));
}

#[test]
fn augment_invalid_archive_fails() {
  let temp = temp_archive(r#"{"classes": [{"name": "A", "bytes": "zz"}]}"#);

  prebake_cmd()
    .arg("augment")
    .arg(temp.path().join("archive.json"))
    .arg("--out")
    .arg(temp.path().join("out"))
    .assert()
    .failure()
    .stderr(predicate::str::contains("invalid bytecode hex"));
}

//! CLI commands against model artifacts on disk

use clap::Parser;
use framewise::cli::{execute, load_model, Cli};
use framewise::hasher::hash_short_string;
use framewise::model::artifact::DataplaneArtifact;
use framewise::ModelArtifact;
use std::fs;
use std::path::Path;

fn write_model(dir: &Path) -> std::path::PathBuf {
    let mut dp = DataplaneArtifact::token("pos", "text", 1, 0);
    let identity = dp.add_number_set(&[0]);
    dp.identity_set = Some(identity);
    for (token, value) in [("the", 3), ("cat", 1), ("sat", 2)] {
        let g = dp.add_group(&[(value, 1.0)]);
        dp.observe(identity, i64::from(hash_short_string(token, 0)), g);
    }
    dp.defaults = vec![(0.6, 1), (0.4, 2)];
    let mut artifact = ModelArtifact::new("cli", dp);
    artifact.description = "three-word tagger".to_string();
    for (value, label) in [(1, "NOUN"), (2, "VERB"), (3, "DET")] {
        artifact.add_label(0, value, label);
    }
    let path = dir.join("model.json");
    fs::write(&path, artifact.to_json().unwrap()).unwrap();
    path
}

fn run(args: &[&str]) -> String {
    let cli = Cli::try_parse_from(args.iter().copied()).unwrap();
    let mut out = Vec::new();
    execute(cli, &mut out).unwrap();
    String::from_utf8(out).unwrap()
}

#[test]
fn test_predict_writes_labels() {
    let dir = tempfile::tempdir().unwrap();
    let model = write_model(dir.path());
    let input = dir.path().join("input.txt");
    fs::write(&input, "the cat sat\n\nthe dog\n").unwrap();

    let out = run(&[
        "framewise",
        "predict",
        "-m",
        model.to_str().unwrap(),
        "-i",
        input.to_str().unwrap(),
    ]);
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines, vec!["the/DET cat/NOUN sat/VERB", "the/DET dog/NOUN"]);
}

#[test]
fn test_predict_values_flag() {
    let dir = tempfile::tempdir().unwrap();
    let model = write_model(dir.path());
    let input = dir.path().join("input.txt");
    fs::write(&input, "cat sat").unwrap();

    let out = run(&[
        "framewise",
        "predict",
        "-m",
        model.to_str().unwrap(),
        "-i",
        input.to_str().unwrap(),
        "--values",
    ]);
    assert_eq!(out.trim(), "cat/1 sat/2");
}

#[test]
fn test_score_reports_accuracy() {
    let dir = tempfile::tempdir().unwrap();
    let model = write_model(dir.path());
    let input = dir.path().join("tagged.txt");
    fs::write(&input, "the/DET cat/NOUN sat/VERB\ndog/VERB\n").unwrap();

    let out = run(&[
        "framewise",
        "score",
        "-m",
        model.to_str().unwrap(),
        "-i",
        input.to_str().unwrap(),
    ]);
    assert!(out.starts_with("Accuracy: 0.7500 (3/4)"), "{out}");
    assert!(out.contains("default"));
    assert!(out.contains("Unknown: 0"));
}

#[test]
fn test_strict_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let model = write_model(dir.path());
    let config = dir.path().join("engine.json");
    fs::write(&config, r#"{"no_defaults": true}"#).unwrap();
    let input = dir.path().join("input.txt");
    fs::write(&input, "dog").unwrap();

    let out = run(&[
        "framewise",
        "predict",
        "-m",
        model.to_str().unwrap(),
        "-i",
        input.to_str().unwrap(),
        "-c",
        config.to_str().unwrap(),
    ]);
    assert_eq!(out.trim(), "dog/<?>");
}

#[test]
fn test_inspect_reports_fingerprint() {
    let dir = tempfile::tempdir().unwrap();
    let model = write_model(dir.path());
    let (_, digest) = load_model(&model).unwrap();
    assert_eq!(digest, framewise::model::fingerprint(&fs::read(&model).unwrap()));

    let out = run(&["framewise", "inspect", "-m", model.to_str().unwrap(), "-v"]);
    assert!(out.contains("Model: cli"));
    assert!(out.contains("three-word tagger"));
    assert!(out.contains(&digest));
    assert!(out.contains("Dataplane pos/text"));
    assert!(out.contains("identity"));
}

#[test]
fn test_unknown_dataplane_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let model = write_model(dir.path());
    let input = dir.path().join("input.txt");
    fs::write(&input, "cat").unwrap();
    let cli = Cli::try_parse_from([
        "framewise",
        "predict",
        "-m",
        model.to_str().unwrap(),
        "-i",
        input.to_str().unwrap(),
        "-d",
        "pos/missing",
    ])
    .unwrap();
    let err = execute(cli, &mut Vec::new()).unwrap_err();
    assert!(err.to_string().contains("pos/missing"));
}

#[test]
fn test_invalid_model_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.json");
    fs::write(
        &path,
        r#"{"tag":"x","default_dataplane":{"dimension":"a","dataplane":"b"},"dataplanes":[]}"#,
    )
    .unwrap();
    let err = load_model(&path).unwrap_err();
    assert!(err.to_string().contains("a/b"));
}

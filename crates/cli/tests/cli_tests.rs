//! CLI integration tests

use serde_json::Value;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

/// Run the built binary with an isolated config directory
fn ensemble(home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ensemble"))
        .args(args)
        .env("XDG_CONFIG_HOME", home)
        .env("HOME", home)
        .env_remove("ENSEMBLE_API_URL")
        .env_remove("ENSEMBLE_MODELS_DIR")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute command")
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "stdout is not JSON ({}): {}\nstderr: {}",
            e,
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        )
    })
}

/// Historical outcomes: a high rsi tends to win, mfe grows with rsi
fn write_historical(path: &Path) {
    let mut csv = String::from("id,pair,rsi,atr,timeframe,outcome,max_favorable_excursion,r_multiple\n");
    for i in 0..60 {
        let rsi = i as f64 * 1.5;
        let win = i % 6 != 0 && rsi > 30.0;
        csv.push_str(&format!(
            "{},EURUSD,{},{},{},{},{},{}\n",
            i,
            rsi,
            0.001 * i as f64,
            if i % 2 == 0 { "H1" } else { "H4" },
            if win { "win" } else { "loss" },
            rsi / 30.0,
            if win { 1.0 } else { -1.0 }
        ));
    }
    csv.push_str("60,EURUSD,50,0.01,H1,breakeven,0.2,0\n");
    std::fs::write(path, csv).unwrap();
}

fn write_signals(path: &Path) {
    let csv = "pair,outcome,max_favorable_excursion,feature_vector\n\
               USDJPY,win,2.1,\"{\"\"rsi\"\": 75.0, \"\"atr\"\": 0.02, \"\"timeframe\"\": \"\"H1\"\"}\"\n\
               USDJPY,loss,0.2,\"{\"\"rsi\"\": 12.0, \"\"timeframe\"\": \"\"H4\"\"}\"\n\
               USDJPY,,0.4,\"{\"\"rsi\"\": 40.0}\"\n\
               USDJPY,win,1.0,\n";
    std::fs::write(path, csv).unwrap();
}

fn write_fast_config(path: &Path) {
    let params = r#"{"n_trees": 10, "max_depth": 6}"#;
    let config = format!(
        r#"{{"win_params": {p}, "bucket_params": {p}, "mfe_params": {p}}}"#,
        p = params
    );
    std::fs::write(path, config).unwrap();
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let home = TempDir::new().unwrap();
    let output = ensemble(home.path(), &["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("Trade Ensemble"), "Should show app name");
    for command in ["merge", "train", "inspect", "versions", "predict", "health", "reload"] {
        assert!(stdout.contains(command), "Should show {} command", command);
    }
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let home = TempDir::new().unwrap();
    let output = ensemble(home.path(), &["--version"]);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(String::from_utf8_lossy(&output.stdout).contains("ensemble"));
}

#[test]
fn test_train_help_lists_options() {
    let home = TempDir::new().unwrap();
    let output = ensemble(home.path(), &["train", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("--data"));
    assert!(stdout.contains("--version"));
    assert!(stdout.contains("--config"));
}

#[test]
fn test_merge_train_inspect_pipeline() {
    let work = TempDir::new().unwrap();
    let dir = work.path();
    let historical = dir.join("historical.csv");
    let signals = dir.join("signals.csv");
    let merged = dir.join("merged.csv");
    let config = dir.join("training.json");
    let models = dir.join("models");
    write_historical(&historical);
    write_signals(&signals);
    write_fast_config(&config);

    let output = ensemble(
        dir,
        &[
            "--format", "json", "merge",
            "--historical", historical.to_str().unwrap(),
            "--signals", signals.to_str().unwrap(),
            "--output", merged.to_str().unwrap(),
        ],
    );
    assert!(output.status.success(), "merge failed: {}", String::from_utf8_lossy(&output.stderr));
    let report = stdout_json(&output);
    assert_eq!(report["historical_rows"], 60);
    assert_eq!(report["signal_rows"], 2);
    assert_eq!(report["skipped_signals"], 2);
    assert!(merged.exists());

    let models_arg = models.to_str().unwrap();
    let train = |version: Option<&str>| {
        let mut args = vec![
            "--format", "json", "--models-dir", models_arg, "train",
            "--data", merged.to_str().unwrap(),
            "--config", config.to_str().unwrap(),
        ];
        if let Some(v) = version {
            args.extend(["--version", v]);
        }
        ensemble(dir, &args)
    };

    let output = train(None);
    assert!(output.status.success(), "train failed: {}", String::from_utf8_lossy(&output.stderr));
    let manifest = stdout_json(&output);
    assert_eq!(manifest["version"], "v1.0");
    assert_eq!(manifest["metrics"]["training_size"], 62);
    assert_eq!(manifest["checksums"].as_object().unwrap().len(), 5);

    // next run bumps from CURRENT
    let output = train(None);
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["version"], "v1.1");

    let output = ensemble(dir, &["--format", "json", "--models-dir", models_arg, "inspect"]);
    assert!(output.status.success(), "inspect failed: {}", String::from_utf8_lossy(&output.stderr));
    let report = stdout_json(&output);
    assert_eq!(report["version"], "v1.1");
    let features: Vec<&str> = report["feature_names"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f.as_str().unwrap())
        .collect();
    assert_eq!(features, vec!["rsi", "atr", "timeframe_H1", "timeframe_H4"]);
    assert_eq!(report["bucket_labels"].as_array().unwrap().len(), 5);

    let output = ensemble(dir, &["--format", "json", "--models-dir", models_arg, "versions"]);
    assert!(output.status.success());
    let versions = stdout_json(&output);
    let versions = versions.as_array().unwrap();
    assert_eq!(versions.len(), 2);
    assert!(versions
        .iter()
        .any(|v| v["version"] == "v1.1" && v["status"] == "current"));
}

#[test]
fn test_train_rejects_existing_version() {
    let work = TempDir::new().unwrap();
    let dir = work.path();
    let data = dir.join("data.csv");
    let config = dir.join("training.json");
    write_historical(&data);
    write_fast_config(&config);
    let models = dir.join("models");

    let args = [
        "--models-dir", models.to_str().unwrap(), "train",
        "--data", data.to_str().unwrap(),
        "--config", config.to_str().unwrap(),
        "--version", "v3.0",
    ];
    assert!(ensemble(dir, &args).status.success());
    let output = ensemble(dir, &args);
    assert!(!output.status.success());
}

#[test]
fn test_inspect_without_bundle_fails() {
    let work = TempDir::new().unwrap();
    let models = work.path().join("models");
    let output = ensemble(work.path(), &["--models-dir", models.to_str().unwrap(), "inspect"]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("No bundle has been published"));
}

#[test]
fn test_predict_calls_server() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("POST", "/predict")
        .match_body(mockito::Matcher::Json(
            serde_json::json!({"features": {"rsi": 64.0, "atr": null}}),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"win_probability":0.72,"predicted_bucket":"1-1.5R",
                "bucket_probabilities":{"1-1.5R":0.6,"<0.5R":0.4},"mfe_estimate":1.2}"#,
        )
        .create();

    let work = TempDir::new().unwrap();
    let features = work.path().join("features.json");
    std::fs::write(&features, r#"{"rsi": 64.0, "atr": null}"#).unwrap();

    let output = ensemble(
        work.path(),
        &[
            "--api-url", &server.url(),
            "--format", "json",
            "predict", "--features", features.to_str().unwrap(),
        ],
    );

    mock.assert();
    assert!(output.status.success(), "predict failed: {}", String::from_utf8_lossy(&output.stderr));
    let result = stdout_json(&output);
    assert_eq!(result["predicted_bucket"], "1-1.5R");
}

#[test]
fn test_health_reports_server_error() {
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/health")
        .with_status(500)
        .with_body(r#"{"error":"internal","detail":"boom"}"#)
        .create();

    let work = TempDir::new().unwrap();
    let output = ensemble(work.path(), &["--api-url", &server.url(), "health"]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("boom"));
}

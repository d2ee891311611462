use assert_cmd::Command;
use faa_rs::edf::write_edf;
use faa_rs::{ChannelDescriptor, MultichannelRecording};
use predicates::prelude::*;
use std::f64::consts::PI;
use std::path::{Path, PathBuf};

fn faa() -> Command {
    Command::cargo_bin("faa").unwrap()
}

const FS: f64 = 256.0;

/// Eight seconds of 10 Hz rhythm plus deterministic noise per channel
fn write_recording(path: &Path, names: &[&str]) {
    let n = FS as usize * 8;
    let rows = names
        .iter()
        .enumerate()
        .map(|(k, _)| {
            let mut state = 0x9E37_79B9_7F4A_7C15u64 ^ (k as u64 + 1);
            (0..n)
                .map(|i| {
                    state ^= state << 13;
                    state ^= state >> 7;
                    state ^= state << 17;
                    let e = (state >> 11) as f64 / (1u64 << 53) as f64 * 2.0 - 1.0;
                    (10.0 + k as f64) * (2.0 * PI * 10.0 * i as f64 / FS).sin() + 2.0 * e
                })
                .collect()
        })
        .collect();
    let channels = names.iter().map(|n| ChannelDescriptor::signal(*n)).collect();
    let rec = MultichannelRecording::new(channels, rows, FS).unwrap();
    write_edf(path, &rec, None).unwrap();
}

const RAW_NAMES: [&str; 7] = ["EEG 1", "EEG 2", "C3", "C4", "P3", "P4", "Status"];
const RENAME_TSV: &str = "EEG 1\tF3\nEEG 2\tF4\n";

fn good_file(dir: &Path, stem: &str) -> PathBuf {
    let path = dir.join(format!("{}.edf", stem));
    write_recording(&path, &["F3", "F4", "C3", "C4", "P3", "P4", "Status"]);
    path
}

// =============================================================================
// GENERAL
// =============================================================================

#[test]
fn test_no_args_shows_help() {
    faa()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_version_flag() {
    faa()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("faa"));
}

#[test]
fn test_help_flag() {
    faa()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("asymmetry"));
}

// =============================================================================
// VALIDATE SUBCOMMAND
// =============================================================================

#[test]
fn test_validate_missing_file() {
    faa()
        .args(["validate", "--edf", "/nonexistent_dir_12345/a.edf"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_validate_json_lists_channels() {
    let tmp = tempfile::tempdir().unwrap();
    let edf = good_file(tmp.path(), "est001yo");

    let output = faa()
        .args(["validate", "--json", "--edf"])
        .arg(&edf)
        .assert()
        .success();

    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed["supported"], true);
    assert_eq!(parsed["sampling_rate"], 256.0);
    assert_eq!(parsed["channels"].as_array().unwrap().len(), 7);
}

#[test]
fn test_validate_reports_bad_config() {
    let tmp = tempfile::tempdir().unwrap();
    let edf = good_file(tmp.path(), "est001yo");
    let config = tmp.path().join("config.json");
    std::fs::write(&config, r#"{"left_channel": "F4"}"#).unwrap();

    faa()
        .args(["validate", "--edf"])
        .arg(&edf)
        .arg("--config")
        .arg(&config)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid config"));
}

// =============================================================================
// RUN SUBCOMMAND
// =============================================================================

#[test]
fn test_run_writes_clean_edf_and_csv() {
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("out");
    let edf = tmp.path().join("est007yc.edf");
    write_recording(&edf, &RAW_NAMES);
    let tsv = tmp.path().join("rename.tsv");
    std::fs::write(&tsv, RENAME_TSV).unwrap();

    faa()
        .args(["run", "--quiet", "--edf"])
        .arg(&edf)
        .arg("--out-dir")
        .arg(&out)
        .arg("--rename-tsv")
        .arg(&tsv)
        .assert()
        .success();

    assert!(out.join("est007yc_clean.edf").exists());
    let csv = std::fs::read_to_string(out.join("est007yc_faa.csv")).unwrap();
    let mut lines = csv.lines();
    assert!(lines.next().unwrap().starts_with("participant_id,condition,band_hz"));
    assert!(lines.next().unwrap().starts_with("007,eyes-closed,8-13,F3,F4,"));
}

#[test]
fn test_run_missing_asymmetry_channel_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("out");
    let edf = tmp.path().join("est001yo.edf");
    write_recording(&edf, &RAW_NAMES);

    faa()
        .args(["run", "--edf"])
        .arg(&edf)
        .arg("--out-dir")
        .arg(&out)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("F3").and(predicate::str::contains("F4")));

    assert!(out.join("est001yo_clean.edf").exists());
    assert!(!out.join("est001yo_faa.csv").exists());
}

#[test]
fn test_run_rejects_invalid_threshold() {
    let tmp = tempfile::tempdir().unwrap();
    let edf = good_file(tmp.path(), "est001yo");

    faa()
        .args(["run", "--bad-z-thresh-amp", "0", "--out-dir"])
        .arg(tmp.path())
        .arg("--edf")
        .arg(&edf)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Threshold amp"));
}

// =============================================================================
// BATCH SUBCOMMAND
// =============================================================================

#[test]
fn test_batch_dir_requires_tsv() {
    let tmp = tempfile::tempdir().unwrap();
    good_file(tmp.path(), "est001yo");

    faa()
        .args(["batch", "--quiet", "--dir"])
        .arg(tmp.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("No TSV"));
}

#[test]
fn test_batch_dry_run_lists_files_in_order() {
    let tmp = tempfile::tempdir().unwrap();
    good_file(tmp.path(), "est002yo");
    good_file(tmp.path(), "est001yo");

    let output = faa()
        .args(["batch", "--dry-run", "--quiet", "--dir"])
        .arg(tmp.path())
        .assert()
        .success();
    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with("est001yo.edf"));
    assert!(lines[1].ends_with("est002yo.edf"));
}

#[test]
fn test_batch_partial_failure_continues() {
    let input = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write_recording(&input.path().join("est001yo.edf"), &RAW_NAMES);
    write_recording(
        &input.path().join("est002yo.edf"),
        &["EEG 1", "EEG 3", "C3", "C4", "P3", "P4", "Status"],
    );
    write_recording(&input.path().join("est003yo.edf"), &RAW_NAMES);
    std::fs::write(input.path().join("rename.tsv"), RENAME_TSV).unwrap();
    let summary = out.path().join("summary.json");

    faa()
        .args(["batch", "--quiet", "--dir"])
        .arg(input.path())
        .arg("--out-dir")
        .arg(out.path())
        .arg("--summary")
        .arg(&summary)
        .assert()
        .code(3);

    assert!(out.path().join("est001yo_faa.csv").exists());
    assert!(!out.path().join("est002yo_faa.csv").exists());
    assert!(out.path().join("est003yo_faa.csv").exists());

    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&summary).unwrap()).unwrap();
    assert_eq!(report["succeeded"], 2);
    assert_eq!(report["failed"], 1);
    assert_eq!(report["items"][1]["status"], "failed");
    assert!(report["items"][1]["reason"].as_str().unwrap().contains("F4"));
}

// =============================================================================
// DETECT SUBCOMMAND
// =============================================================================

#[test]
fn test_detect_prints_report() {
    let tmp = tempfile::tempdir().unwrap();
    let edf = good_file(tmp.path(), "est001yo");

    let output = faa()
        .args(["detect", "--compact", "--edf"])
        .arg(&edf)
        .assert()
        .success();

    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed["method"], "prep");
    assert!(parsed["bad"].is_array());
    // Status is auxiliary and never scored
    let scored = parsed["report"]["channels"].as_array().unwrap();
    assert_eq!(scored.len(), 6);
}

#[test]
fn test_detect_ptp_has_no_report() {
    let tmp = tempfile::tempdir().unwrap();
    let edf = good_file(tmp.path(), "est001yo");

    let output = faa()
        .args(["detect", "--bad-method", "ptp", "--edf"])
        .arg(&edf)
        .assert()
        .success();
    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed["method"], "ptp");
    assert!(parsed["report"].is_null());
}

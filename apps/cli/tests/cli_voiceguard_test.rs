//! Integration tests for the `voiceguard` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn voiceguard(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("voiceguard").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("RUST_LOG")
        .env_remove("HF_ACCESS_TOKEN")
        .env_remove("REPO_ID");
    cmd
}

/// Lay out a base model and a one-clip dataset at the default relative paths.
fn miner_workspace(dir: &TempDir) {
    let base = dir.path().join("voiceguard/miner/model_checkpoints/base");
    fs::create_dir_all(&base).unwrap();
    fs::write(base.join("pytorch_model.bin"), vec![1u8; 32]).unwrap();
    fs::write(base.join("config.json"), "{}").unwrap();

    let clip = dir.path().join("datasets/en/clip1");
    fs::create_dir_all(&clip).unwrap();
    fs::write(clip.join("clip1.wav"), b"RIFF").unwrap();
    fs::write(clip.join("clip1.txt"), "hello").unwrap();
}

#[test]
fn test_help_lists_subcommands() {
    let dir = TempDir::new().unwrap();
    voiceguard(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("fetch").and(predicate::str::contains("train")).and(predicate::str::contains("recover")));
}

#[test]
fn test_fetch_rejects_unknown_subset() {
    let dir = TempDir::new().unwrap();
    voiceguard(&dir)
        .args(["fetch", "--subset", "train-clean-999"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown subset"));
}

#[test]
fn test_recover_without_marker() {
    let dir = TempDir::new().unwrap();
    voiceguard(&dir)
        .arg("recover")
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to recover"));
}

#[test]
fn test_train_rejects_zero_epochs() {
    let dir = TempDir::new().unwrap();
    voiceguard(&dir)
        .args(["train", "--epochs", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("num_epochs must be -1 or >= 1"));
}

#[test]
fn test_train_without_base_model_fails() {
    let dir = TempDir::new().unwrap();
    voiceguard(&dir)
        .args(["train", "--epochs", "1", "--dry-run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no local base model"));
}

#[test]
fn test_finite_dry_run_saves_checkpoint() {
    let dir = TempDir::new().unwrap();
    miner_workspace(&dir);

    voiceguard(&dir)
        .args(["train", "--epochs", "2", "--dry-run", "--device", "cpu:1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Training summary").and(predicate::str::contains("epochs:      2")));

    let checkpoint = dir.path().join("voiceguard/miner/model_checkpoints/XLS");
    assert!(checkpoint.join("current_checkpoint.pt").is_file());
    assert!(!checkpoint.join("checkpoint_manifest.json").exists());
    assert!(dir.path().join("voiceguard/miner/state/checkpoint_manifest.json").is_file());
}

#[test]
fn test_config_file_sets_epochs() {
    let dir = TempDir::new().unwrap();
    miner_workspace(&dir);
    fs::write(dir.path().join("settings.toml"), "num_epochs = 1\nbatch_size = 4\n").unwrap();

    voiceguard(&dir)
        .args(["--config", "settings.toml", "train", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("epochs:      1"));
}

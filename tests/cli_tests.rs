// End-to-end runs of the treepass binary against a temporary store.
// Only commands that need neither a passphrase nor git are exercised here.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Env {
    dir: TempDir,
    config: PathBuf,
}

impl Env {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let store = dir.path().join("store");
        fs::create_dir_all(store.join("mail")).unwrap();
        fs::write(store.join("mail/work.age"), "x").unwrap();
        fs::write(store.join("bank.age"), "x").unwrap();
        fs::write(store.join(".age-identities"), "x").unwrap();
        fs::create_dir(store.join("archive")).unwrap();

        let config = dir.path().join("config.toml");
        fs::write(
            &config,
            format!("store_dir = {:?}\n", store.to_string_lossy()),
        )
        .unwrap();
        Self { dir, config }
    }

    fn store(&self) -> PathBuf {
        self.dir.path().join("store")
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("treepass").unwrap();
        cmd.env_remove("TREEPASS_STORE")
            .env_remove("TREEPASS_CONFIG")
            .arg("--config")
            .arg(&self.config);
        cmd
    }
}

#[test]
fn test_help() {
    Command::cargo_bin("treepass")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("password store"));
}

#[test]
fn test_list_from_config_file() {
    let env = Env::new();
    env.cmd()
        .arg("list")
        .assert()
        .success()
        .stdout("bank\nmail/work\n");
}

#[test]
fn test_list_filtered_tree() {
    let env = Env::new();
    env.cmd()
        .args(["list", "WORK", "--tree"])
        .assert()
        .success()
        .stdout("└── mail/\n    └── work\n");
}

#[test]
fn test_list_json() {
    let env = Env::new();
    let output = env.cmd().args(["list", "-o", "json"]).output().unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["entries"], serde_json::json!(["bank", "mail/work"]));
}

#[test]
fn test_folders_json() {
    let env = Env::new();
    let output = env.cmd().args(["folders", "--output", "json"]).output().unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["folders"], serde_json::json!(["/", "archive", "mail"]));
}

#[test]
fn test_store_flag_overrides_config() {
    let env = Env::new();
    let other = env.dir.path().join("other");
    fs::create_dir(&other).unwrap();

    env.cmd()
        .arg("--store")
        .arg(&other)
        .arg("list")
        .assert()
        .success()
        .stdout("No entries found\n");
}

#[test]
fn test_add_folder_without_history() {
    let env = Env::new();
    env.cmd()
        .args(["add", "mail", "cards", "--folder"])
        .assert()
        .success()
        .stdout(predicate::str::contains("mail/cards"));
    assert!(env.store().join("mail/cards").is_dir());
}

#[test]
fn test_add_folder_rejects_bad_name() {
    let env = Env::new();
    env.cmd()
        .args(["add", "/", "bad name", "--folder"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("position 4"));
    assert!(!env.store().join("bad name").exists());
}

#[test]
fn test_remove_empty_folder() {
    let env = Env::new();
    env.cmd()
        .args(["rm", "archive", "--force"])
        .assert()
        .success();
    assert!(!env.store().join("archive").exists());
}

#[test]
fn test_show_unknown_entry() {
    let env = Env::new();
    env.cmd()
        .args(["show", "mail/nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Entry not found: mail/nope"));
}

#[test]
fn test_missing_store() {
    let env = Env::new();
    env.cmd()
        .arg("--store")
        .arg(Path::new("/nonexistent/treepass-store"))
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn test_bad_config_file() {
    let env = Env::new();
    fs::write(&env.config, "no_such_key = 1\n").unwrap();
    env.cmd()
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error"));
}

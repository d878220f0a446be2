// History operations against a real git binary. Skipped when git is missing.

mod common;

use common::{FakeEngine, RECIPIENT};
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use treepass::{GitCli, HistoryStore, StoreConfig, SyncCoordinator};

fn git() -> Option<GitCli> {
    let git = GitCli::new();
    match git.check_available() {
        Ok(()) => Some(git),
        Err(err) => {
            eprintln!("skipping: {err}");
            None
        }
    }
}

fn repo(git: &GitCli) -> TempDir {
    let dir = TempDir::new().unwrap();
    git.init(dir.path()).unwrap();
    git.config_set_identity(dir.path(), "family").unwrap();
    dir
}

fn commit_file(git: &GitCli, repo: &Path, name: &str, content: &str, message: &str) {
    fs::write(repo.join(name), content).unwrap();
    git.stage(repo, name).unwrap();
    git.commit(repo, message).unwrap();
}

#[test]
fn test_commit_and_log() {
    let Some(git) = git() else { return };
    let dir = repo(&git);
    assert!(git.log(dir.path()).unwrap().is_empty());

    commit_file(&git, dir.path(), "bank.age", "one", "Added bank");
    commit_file(&git, dir.path(), "mail.age", "two", "Added mail");

    let log = git.log(dir.path()).unwrap();
    let summaries: Vec<&str> = log.iter().map(|c| c.summary.as_str()).collect();
    assert_eq!(summaries, vec!["Added mail", "Added bank"]);
    assert_eq!(log[0].revision.len(), 40);
    assert_eq!(log[0].short_revision().len(), 7);
}

#[test]
fn test_reset_restores_tracked_files() {
    let Some(git) = git() else { return };
    let dir = repo(&git);
    commit_file(&git, dir.path(), "bank.age", "one", "Added bank");

    fs::write(dir.path().join("bank.age"), "two").unwrap();
    git.stage(dir.path(), "bank.age").unwrap();
    git.reset(dir.path()).unwrap();

    assert_eq!(fs::read_to_string(dir.path().join("bank.age")).unwrap(), "one");
}

#[test]
fn test_reset_without_commits() {
    let Some(git) = git() else { return };
    let dir = repo(&git);
    fs::write(dir.path().join("bank.age"), "one").unwrap();
    git.stage(dir.path(), "bank.age").unwrap();

    git.reset(dir.path()).unwrap();
    assert!(git.log(dir.path()).unwrap().is_empty());
}

#[test]
fn test_no_upstream_is_not_in_sync() {
    let Some(git) = git() else { return };
    let dir = repo(&git);
    commit_file(&git, dir.path(), "bank.age", "one", "Added bank");

    assert!(!git.local_head_matches_remote(dir.path()).unwrap());
}

#[test]
fn test_failed_command_reports_git_output() {
    let Some(git) = git() else { return };
    let dir = repo(&git);
    let err = git.commit(dir.path(), "nothing staged").unwrap_err();
    assert!(err.to_string().contains("commit"), "{err}");
}

#[test]
fn test_store_round_trip_through_clone() {
    let Some(git) = git() else { return };
    let dir = TempDir::new().unwrap();
    let origin = dir.path().join("family");
    let engine = FakeEngine::default();

    let mut store = SyncCoordinator::new(StoreConfig::with_store_dir(&origin), GitCli::new());
    store.init_store(b"identity", RECIPIENT.as_bytes()).unwrap();
    store.add_folder("/", "mail").unwrap();
    store.add_entry(&engine, "mail", "work", "hunter2").unwrap();
    store.add_entry(&engine, "/", "bank", "1234").unwrap();
    store.remove("bank").unwrap();

    let summaries: Vec<String> = store.log().unwrap().into_iter().map(|c| c.summary).collect();
    assert_eq!(
        summaries,
        vec!["Deleted bank", "Added bank", "Added mail/work", "Initialized store"]
    );

    let checkout = dir.path().join("checkout");
    fs::create_dir(&checkout).unwrap();
    let mut copy = SyncCoordinator::new(StoreConfig::with_store_dir(&checkout), GitCli::new());
    copy.clone_from(&origin.to_string_lossy()).unwrap();

    assert_eq!(copy.tree().password_count(), 1);
    assert_eq!(
        fs::read_to_string(checkout.join("mail/work.age")).unwrap(),
        "enc:hunter2"
    );
    assert!(copy.local_head_matches_remote().unwrap());
    assert_eq!(git.log(&checkout).unwrap().len(), 4);
}

#[test]
fn test_file_clone_of_plain_folder_starts_history() {
    let Some(git) = git() else { return };
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("fixture-store");
    fs::create_dir_all(source.join("mail")).unwrap();
    fs::write(source.join("mail/work.age"), "enc:hunter2").unwrap();
    fs::write(source.join(".age-recipients"), RECIPIENT).unwrap();

    let checkout = dir.path().join("checkout");
    let mut store = SyncCoordinator::new(StoreConfig::with_store_dir(&checkout), GitCli::new());
    store
        .clone_from(&format!("file://{}", source.display()))
        .unwrap();

    assert_eq!(
        fs::read_to_string(checkout.join("mail/work.age")).unwrap(),
        "enc:hunter2"
    );
    assert!(checkout.join(".git").is_dir());
    assert!(git.log(&checkout).unwrap().is_empty());

    // The fresh history takes commits under the label of the source.
    store
        .add_entry(&FakeEngine::default(), "mail", "home", "s3cret")
        .unwrap();
    let log = git.log(&checkout).unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].summary, "Added mail/home");
}

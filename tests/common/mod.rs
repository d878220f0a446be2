// Shared fixtures: a temporary store plus recording doubles for the
// history and crypto seams.

#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use std::cell::{Cell, RefCell};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use treepass::{CommitInfo, CryptoEngine, CryptoError, HistoryError, HistoryStore, StoreConfig};

pub const RECIPIENT: &str = "test-recipient";
pub const CORRECT_SECRET: &str = "correct";

/// One recorded call on [`FakeHistory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Init,
    Clone(String),
    Pull,
    Push,
    Stage(String),
    Commit(String),
    Reset,
    Identity(String),
}

/// History store that records calls instead of running git.
#[derive(Default)]
pub struct FakeHistory {
    pub calls: RefCell<Vec<Call>>,
    pub fail_commit: Cell<bool>,
    pub fail_clone: Cell<bool>,
    pub synced: Cell<bool>,
}

impl FakeHistory {
    pub fn commits(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                Call::Commit(message) => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn staged(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                Call::Stage(path) => Some(path.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn resets(&self) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|call| **call == Call::Reset)
            .count()
    }

    pub fn clear(&self) {
        self.calls.borrow_mut().clear();
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }

    fn failure(command: &str) -> HistoryError {
        HistoryError::CommandFailed {
            command: command.to_string(),
            message: "simulated failure".to_string(),
        }
    }
}

impl HistoryStore for FakeHistory {
    fn init(&self, _repo: &Path) -> Result<(), HistoryError> {
        self.record(Call::Init);
        Ok(())
    }

    fn clone_from(&self, url: &str, dest: &Path) -> Result<(), HistoryError> {
        self.record(Call::Clone(url.to_string()));
        if self.fail_clone.get() {
            fs::write(dest.join("partial.age"), "half").unwrap();
            return Err(Self::failure("clone"));
        }
        fs::create_dir_all(dest.join("remote")).unwrap();
        fs::write(dest.join("remote/entry.age"), "cloned").unwrap();
        Ok(())
    }

    fn pull(&self, _repo: &Path) -> Result<(), HistoryError> {
        self.record(Call::Pull);
        Ok(())
    }

    fn push(&self, _repo: &Path) -> Result<(), HistoryError> {
        self.record(Call::Push);
        Ok(())
    }

    fn stage(&self, _repo: &Path, relative_path: &str) -> Result<(), HistoryError> {
        self.record(Call::Stage(relative_path.to_string()));
        Ok(())
    }

    fn commit(&self, _repo: &Path, message: &str) -> Result<(), HistoryError> {
        if self.fail_commit.get() {
            return Err(Self::failure("commit"));
        }
        self.record(Call::Commit(message.to_string()));
        Ok(())
    }

    fn reset(&self, _repo: &Path) -> Result<(), HistoryError> {
        self.record(Call::Reset);
        Ok(())
    }

    fn config_set_identity(&self, _repo: &Path, label: &str) -> Result<(), HistoryError> {
        self.record(Call::Identity(label.to_string()));
        Ok(())
    }

    fn local_head_matches_remote(&self, _repo: &Path) -> Result<bool, HistoryError> {
        Ok(self.synced.get())
    }

    fn log(&self, _repo: &Path) -> Result<Vec<CommitInfo>, HistoryError> {
        Ok(self
            .commits()
            .into_iter()
            .enumerate()
            .rev()
            .map(|(i, summary)| CommitInfo {
                timestamp: Utc.timestamp_opt(1_700_000_000 + i as i64, 0).unwrap(),
                revision: format!("{i:040x}"),
                summary,
            })
            .collect())
    }
}

/// Crypto engine that stores plaintext and unlocks with [`CORRECT_SECRET`].
#[derive(Default)]
pub struct FakeEngine {
    pub unlocked: bool,
    pub fail_encrypt: bool,
}

impl CryptoEngine for FakeEngine {
    fn unlock_identity(&mut self, _identity: &[u8], secret: &str) -> Result<(), CryptoError> {
        if secret == CORRECT_SECRET {
            self.unlocked = true;
            Ok(())
        } else {
            Err(CryptoError::DecryptionFailed)
        }
    }

    fn lock_identity(&mut self) {
        self.unlocked = false;
    }

    fn is_unlocked(&self) -> bool {
        self.unlocked
    }

    fn decrypt(&self, path: &Path) -> Result<String, CryptoError> {
        let content = fs::read_to_string(path)?;
        content
            .strip_prefix("enc:")
            .map(str::to_string)
            .ok_or(CryptoError::DecryptionFailed)
    }

    fn encrypt(&self, plaintext: &str, recipient: &[u8], out_path: &Path) -> Result<(), CryptoError> {
        if self.fail_encrypt {
            fs::write(out_path, "garbage").unwrap();
            return Err(CryptoError::EncryptionFailed);
        }
        if recipient != RECIPIENT.as_bytes() {
            return Err(CryptoError::RecipientMismatch);
        }
        fs::write(out_path, format!("enc:{plaintext}"))?;
        Ok(())
    }
}

/// A temporary store directory with identity and recipient files.
pub struct Fixture {
    pub dir: TempDir,
    pub config: StoreConfig,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("store");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join(".age-identities"), "identity").unwrap();
        fs::write(root.join(".age-recipients"), RECIPIENT).unwrap();
        let config = StoreConfig::with_store_dir(&root);
        Self { dir, config }
    }

    pub fn root(&self) -> &Path {
        &self.config.store_dir
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root().join(relative)
    }

    /// Write an already "encrypted" entry.
    pub fn entry(&self, relative: &str, plaintext: &str) -> &Self {
        let path = self.path(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, format!("enc:{plaintext}")).unwrap();
        self
    }

    pub fn folder(&self, relative: &str) -> &Self {
        fs::create_dir_all(self.path(relative)).unwrap();
        self
    }
}

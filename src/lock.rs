//! Unlock state of the store identity, with auto-lock after inactivity.

use crate::config::StoreConfig;
use crate::crypto::CryptoEngine;
use crate::error::Result;
use chrono::{DateTime, Duration, Utc};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zeroize::{Zeroize, Zeroizing};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Locked,
    /// Unlocked at the given instant.
    Unlocked(DateTime<Utc>),
}

/// Owns a [`CryptoEngine`] and tracks whether its identity is unlocked.
///
/// Starts locked. The last decrypted plaintext is cached until the next
/// lock and zeroized when dropped.
pub struct IdentityLock<C: CryptoEngine> {
    engine: C,
    identity_path: PathBuf,
    store_root: PathBuf,
    threshold: Duration,
    state: LockState,
    plaintext: Option<Zeroizing<String>>,
}

impl<C: CryptoEngine> IdentityLock<C> {
    pub fn new(
        engine: C,
        store_root: impl Into<PathBuf>,
        identity_path: impl Into<PathBuf>,
        threshold: Duration,
    ) -> Self {
        Self {
            engine,
            identity_path: identity_path.into(),
            store_root: store_root.into(),
            threshold,
            state: LockState::Locked,
            plaintext: None,
        }
    }

    /// Lock for the store described by `config`.
    pub fn for_store(engine: C, config: &StoreConfig) -> Self {
        Self::new(
            engine,
            config.store_dir.clone(),
            config.identity_path(),
            config.auto_lock_threshold(),
        )
    }

    pub fn state(&self) -> LockState {
        self.state
    }

    pub fn is_unlocked(&self) -> bool {
        matches!(self.state, LockState::Unlocked(_))
    }

    pub fn identity_path(&self) -> &Path {
        &self.identity_path
    }

    /// Unlock the identity with `secret`. The secret is wiped before
    /// returning whether or not unlocking succeeded.
    pub fn unlock(&mut self, mut secret: String) -> Result<()> {
        let result = self.unlock_with(&secret);
        secret.zeroize();
        result
    }

    fn unlock_with(&mut self, secret: &str) -> Result<()> {
        let identity = Zeroizing::new(std::fs::read(&self.identity_path)?);
        self.engine.unlock_identity(&identity, secret)?;
        self.state = LockState::Unlocked(Utc::now());
        info!("identity unlocked");
        Ok(())
    }

    pub fn lock(&mut self) {
        self.engine.lock_identity();
        self.state = LockState::Locked;
        self.plaintext = None;
        debug!("identity locked");
    }

    /// Lock if the identity has been unlocked for at least the threshold.
    ///
    /// Returns whether this call locked it.
    pub fn check_timeout(&mut self, now: DateTime<Utc>) -> bool {
        match self.state {
            LockState::Unlocked(at) if now - at >= self.threshold => {
                info!(seconds = (now - at).num_seconds(), "auto-locking identity");
                self.lock();
                true
            }
            _ => false,
        }
    }

    /// Decrypt the entry at `relative_path`, or `None` while locked.
    pub fn decrypt(&mut self, relative_path: &str) -> Result<Option<&str>> {
        if !self.is_unlocked() {
            debug!(path = relative_path, "decrypt ignored, identity is locked");
            return Ok(None);
        }
        let location = self.store_root.join(relative_path.trim_start_matches('/'));
        let plaintext = self.engine.decrypt(&location)?;
        self.plaintext = Some(Zeroizing::new(plaintext));
        Ok(self.plaintext())
    }

    /// Last decrypted plaintext, if still cached.
    pub fn plaintext(&self) -> Option<&str> {
        self.plaintext.as_ref().map(|p| p.as_str())
    }

    pub fn clear_plaintext(&mut self) {
        self.plaintext = None;
    }

    pub fn engine(&self) -> &C {
        &self.engine
    }
}

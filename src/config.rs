//! Store configuration.
//!
//! Defaults are compiled in. An optional TOML file overrides them, and the
//! command line overrides the file.

use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Suffix that marks a file as an encrypted password entry.
pub const ENTRY_SUFFIX: &str = ".age";

/// Name reserved for the root of the store.
pub const ROOT_NODE_NAME: &str = "/";

/// Bound on folder nesting, guarantees ancestor walks terminate.
pub const MAX_TREE_DEPTH: usize = 15;

/// Longest allowed display name, in characters.
pub const MAX_NAME_LENGTH: usize = 64;

/// Longest allowed plaintext secret, in characters.
pub const MAX_PASSWORD_LENGTH: usize = 1024;

/// Seconds an unlocked identity stays unlocked.
pub const AUTO_LOCK_SECONDS: u64 = 120;

/// Environment variable holding an explicit config file location.
pub const CONFIG_ENV: &str = "TREEPASS_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Local checkout of the store.
    pub store_dir: PathBuf,
    /// Suffix of encrypted entry files.
    pub entry_suffix: String,
    /// Passphrase protected identity inside the store.
    pub identity_file: String,
    /// Recipient material used when encrypting new entries.
    pub recipient_file: String,
    pub max_tree_depth: usize,
    pub max_name_length: usize,
    pub auto_lock_seconds: u64,
    /// Extra names that may never be used for entries or folders.
    pub reserved_names: Vec<String>,
    /// Fail tree loads on invalid names instead of skipping them.
    pub strict_tree: bool,
    /// Seconds before a copied secret is cleared from the clipboard.
    pub clipboard_timeout: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_dir: default_store_dir(),
            entry_suffix: ENTRY_SUFFIX.to_string(),
            identity_file: ".age-identities".to_string(),
            recipient_file: ".age-recipients".to_string(),
            max_tree_depth: MAX_TREE_DEPTH,
            max_name_length: MAX_NAME_LENGTH,
            auto_lock_seconds: AUTO_LOCK_SECONDS,
            reserved_names: Vec::new(),
            strict_tree: false,
            clipboard_timeout: 10,
        }
    }
}

impl StoreConfig {
    /// Default config with the store placed at `store_dir`.
    pub fn with_store_dir(store_dir: impl Into<PathBuf>) -> Self {
        Self {
            store_dir: store_dir.into(),
            ..Self::default()
        }
    }

    /// Parse a config from TOML text, filling gaps with defaults.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| StoreError::Config(e.to_string()))?;
        config.check()?;
        Ok(config)
    }

    /// Load the config file at `path`.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            StoreError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Load the config from an explicit path, `$TREEPASS_CONFIG`, or the
    /// per-user config directory. A missing default file yields defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::load_from(Path::new(&path));
        }
        match default_config_file() {
            Some(path) if path.is_file() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Absolute location of the encrypted identity.
    pub fn identity_path(&self) -> PathBuf {
        self.store_dir.join(&self.identity_file)
    }

    /// Absolute location of the recipient material.
    pub fn recipient_path(&self) -> PathBuf {
        self.store_dir.join(&self.recipient_file)
    }

    pub fn auto_lock_threshold(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.auto_lock_seconds as i64)
    }

    fn check(&self) -> Result<()> {
        if self.entry_suffix.len() < 2 || !self.entry_suffix.starts_with('.') {
            return Err(StoreError::Config(format!(
                "entry_suffix must look like '.ext', got '{}'",
                self.entry_suffix
            )));
        }
        if self.max_tree_depth == 0 {
            return Err(StoreError::Config(
                "max_tree_depth must be at least 1".to_string(),
            ));
        }
        if self.max_name_length == 0 {
            return Err(StoreError::Config(
                "max_name_length must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// `<data dir>/treepass/store`, or `./treepass-store` without a data dir.
pub fn default_store_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("treepass").join("store"))
        .unwrap_or_else(|| PathBuf::from("treepass-store"))
}

/// `<config dir>/treepass/config.toml`.
pub fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("treepass").join("config.toml"))
}

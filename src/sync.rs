//! Mutations of the store, each one recorded in the history.
//!
//! Every mutation validates first, then touches the disk, then stages and
//! commits. Changes that leave no entry behind (empty folders) stay local
//! because the history cannot track them. When anything fails after the disk
//! was touched the history is reset to the last commit and partially created
//! files are removed before the error is returned.

use crate::config::StoreConfig;
use crate::crypto::CryptoEngine;
use crate::error::{Result, StoreError, ValidationError, ValidationErrorKind};
use crate::history::{CommitInfo, HistoryStore};
use crate::security::{self, check_secret};
use crate::store_fs;
use crate::tree::{LoadMode, PwNode};
use crate::validation::{folder_segments, strip_entry_suffix, PathValidator, ValidateOptions};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Label used when no store name can be derived from a clone source.
const DEFAULT_STORE_LABEL: &str = "treepass";

pub struct SyncCoordinator<H: HistoryStore> {
    config: StoreConfig,
    history: H,
    tree: Arc<PwNode>,
}

impl<H: HistoryStore> SyncCoordinator<H> {
    /// Coordinator with an empty tree, nothing is read from disk.
    pub fn new(config: StoreConfig, history: H) -> Self {
        Self {
            config,
            history,
            tree: Arc::new(PwNode::new_root(Vec::new())),
        }
    }

    /// Coordinator for an existing store, with its tree loaded.
    pub fn open(config: StoreConfig, history: H) -> Result<Self> {
        let mut coordinator = Self::new(config, history);
        coordinator.reload()?;
        Ok(coordinator)
    }

    pub fn root(&self) -> &Path {
        &self.config.store_dir
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn history(&self) -> &H {
        &self.history
    }

    /// Current tree snapshot.
    pub fn tree(&self) -> Arc<PwNode> {
        Arc::clone(&self.tree)
    }

    /// Rebuild the tree from disk and return the new snapshot.
    pub fn reload(&mut self) -> Result<Arc<PwNode>> {
        let tree = PwNode::load_recursively_from(
            &self.config.store_dir,
            &self.config,
            LoadMode::from_config(&self.config),
        )?;
        self.tree = Arc::new(tree);
        Ok(self.tree())
    }

    /// Look up a node by relative path, with or without the entry suffix.
    pub fn resolve(&self, relative_path: &str) -> Result<PwNode> {
        let trimmed = relative_path.trim_matches('/');
        self.tree
            .find(trimmed)
            .or_else(|| {
                self.tree
                    .find(&self.entry_file_name(trimmed))
                    .filter(|node| node.is_entry())
            })
            .cloned()
            .ok_or_else(|| StoreError::EntryNotFound(relative_path.to_string()))
    }

    /// Create a new store: empty history plus identity and recipient files.
    pub fn init_store(&mut self, identity: &[u8], recipient: &[u8]) -> Result<()> {
        let root = self.config.store_dir.clone();
        let identity_path = self.config.identity_path();
        if identity_path.exists() {
            return Err(StoreError::Config(format!(
                "a store already exists at {}",
                root.display()
            )));
        }

        fs::create_dir_all(&root)?;
        security::set_secure_permissions(&root)?;
        self.history.init(&root)?;

        if let Err(err) = self.write_identity(identity, recipient) {
            // An identity file marks the store as initialized.
            for path in [identity_path, self.config.recipient_path()] {
                if path.exists() {
                    if let Err(cleanup) = fs::remove_file(&path) {
                        warn!(path = %path.display(), error = %cleanup, "failed to remove identity file");
                    }
                }
            }
            return Err(err);
        }

        info!(root = %root.display(), "initialized store");
        self.reload()?;
        Ok(())
    }

    fn write_identity(&mut self, identity: &[u8], recipient: &[u8]) -> Result<()> {
        let identity_path = self.config.identity_path();
        fs::write(&identity_path, identity)?;
        security::set_secure_permissions(&identity_path)?;
        fs::write(self.config.recipient_path(), recipient)?;

        let label = store_label(&self.root().to_string_lossy());
        self.history.config_set_identity(self.root(), &label)?;
        self.attempt(None, |this| {
            this.history.stage(this.root(), &this.config.identity_file)?;
            this.history.stage(this.root(), &this.config.recipient_file)?;
            this.history.commit(this.root(), "Initialized store")?;
            Ok(())
        })
    }

    /// Encrypt `secret` into a new entry `name` (without suffix) inside
    /// `relative_folder`.
    pub fn add_entry<C: CryptoEngine>(
        &mut self,
        crypto: &C,
        relative_folder: &str,
        name: &str,
        secret: &str,
    ) -> Result<()> {
        let raw = self.entry_file_name(name);
        let valid = PathValidator::new(self.root(), &self.config).validate(
            &raw,
            relative_folder,
            ValidateOptions::new_entry(),
        )?;
        check_secret(secret)?;
        let recipient = fs::read(self.config.recipient_path())?;

        let relative = valid.relative_path();
        let shown = display_path(&valid.segments, &self.config.entry_suffix);
        self.attempt(Some(&valid.location), |this| {
            crypto.encrypt(secret, &recipient, &valid.location)?;
            this.history.stage(this.root(), &relative)?;
            this.history.commit(this.root(), &format!("Added {shown}"))?;
            Ok(())
        })?;

        info!(path = %shown, "added entry");
        self.reload()?;
        Ok(())
    }

    /// Create an empty folder. Not committed, it holds no entries yet.
    pub fn add_folder(&mut self, relative_folder: &str, name: &str) -> Result<()> {
        let valid = PathValidator::new(self.root(), &self.config).validate(
            name,
            relative_folder,
            ValidateOptions::new_folder(),
        )?;
        store_fs::create_dir(&valid.location)?;

        info!(path = %valid.relative_path(), "added folder");
        self.reload()?;
        Ok(())
    }

    /// Remove an entry or a folder with everything beneath it.
    pub fn remove(&mut self, relative_path: &str) -> Result<()> {
        let node = self.resolve(relative_path)?;
        if node.is_root() {
            return Err(ValidationError::new(
                relative_path,
                ValidationErrorKind::ReservedName,
            )
            .into());
        }

        let location = node.location(self.root());
        let tracked = store_fs::find_first_file(&location)?.is_some();
        if tracked {
            let relative = node.relative_path();
            let message = format!("Deleted {}", node.display_path());
            self.attempt(None, |this| {
                store_fs::remove_recursive(&location)?;
                this.history.stage(this.root(), &relative)?;
                this.history.commit(this.root(), &message)?;
                Ok(())
            })?;
        } else {
            debug!(path = %node.relative_path(), "removing node without entries locally");
            store_fs::remove_recursive(&location)?;
        }

        info!(path = %node.display_path(), "removed");
        self.reload()?;
        Ok(())
    }

    /// Move and/or rename a folder.
    pub fn move_folder(&mut self, from: &str, dest_folder: &str, new_name: &str) -> Result<()> {
        let node = self.resolve(from)?;
        if node.is_entry() || node.is_root() {
            return Err(ValidationError::new(
                from,
                ValidationErrorKind::SuffixMismatch {
                    expected_entry: false,
                },
            )
            .into());
        }

        let mut target = folder_segments(dest_folder)?;
        if target.starts_with(node.path()) {
            return Err(ValidationError::new(
                from,
                ValidationErrorKind::NestedMove {
                    destination: dest_folder.to_string(),
                },
            )
            .into());
        }
        target.push(new_name.to_string());
        if target == node.path() {
            debug!(path = %node.relative_path(), "folder move is a no-op");
            return Ok(());
        }

        let valid = PathValidator::new(self.root(), &self.config).validate(
            new_name,
            dest_folder,
            ValidateOptions::new_folder(),
        )?;

        let maximum = self.config.max_tree_depth;
        let subtree_height = node
            .flat_folders()
            .iter()
            .map(|folder| folder.path().len() - node.path().len())
            .max()
            .unwrap_or(0);
        if valid.segments.len() + subtree_height > maximum {
            return Err(ValidationError::new(
                new_name,
                ValidationErrorKind::DepthExceeded { maximum },
            )
            .into());
        }

        let location = node.location(self.root());
        if store_fs::find_first_file(&location)?.is_some() {
            self.commit_rename(&node, &valid.segments, &valid.location)?;
        } else {
            debug!(path = %node.relative_path(), "moving folder without entries locally");
            store_fs::move_path(&location, &valid.location)?;
        }

        self.reload()?;
        Ok(())
    }

    /// Move, rename and/or re-encrypt an entry.
    ///
    /// Makes one commit for the rename when the path changes and one for the
    /// new content when `secret` is given.
    pub fn edit_entry<C: CryptoEngine>(
        &mut self,
        crypto: &C,
        from: &str,
        dest_folder: &str,
        new_name: &str,
        secret: Option<&str>,
    ) -> Result<()> {
        let node = self.resolve(from)?;
        if !node.is_entry() {
            return Err(ValidationError::new(
                from,
                ValidationErrorKind::SuffixMismatch {
                    expected_entry: true,
                },
            )
            .into());
        }

        let raw = self.entry_file_name(new_name);
        let mut target = folder_segments(dest_folder)?;
        target.push(raw.clone());
        let unchanged = target == node.path();

        let valid = PathValidator::new(self.root(), &self.config).validate(
            &raw,
            dest_folder,
            ValidateOptions::new_entry().allow_name_taken(unchanged),
        )?;
        if let Some(secret) = secret {
            check_secret(secret)?;
        }

        if !unchanged {
            self.commit_rename(&node, &valid.segments, &valid.location)?;
        }

        if let Some(secret) = secret {
            let recipient = fs::read(self.config.recipient_path())?;
            let relative = valid.relative_path();
            let shown = display_path(&valid.segments, &self.config.entry_suffix);
            self.attempt(None, |this| {
                crypto.encrypt(secret, &recipient, &valid.location)?;
                this.history.stage(this.root(), &relative)?;
                this.history.commit(this.root(), &format!("Changed {shown}"))?;
                Ok(())
            })?;
            info!(path = %shown, "changed entry");
        }

        self.reload()?;
        Ok(())
    }

    /// Replace the local store with a copy of `url`.
    ///
    /// `file://` sources are copied as they are, anything else is cloned by
    /// the history store.
    pub fn clone_from(&mut self, url: &str) -> Result<()> {
        let root = self.config.store_dir.clone();
        store_fs::wipe_dir(&root)?;

        let result = self.fetch_into(url, &root);
        if let Err(err) = result {
            if let Err(cleanup) = store_fs::wipe_dir(&root) {
                warn!(error = %cleanup, "failed to clean up after clone");
            }
            self.tree = Arc::new(PwNode::new_root(Vec::new()));
            return Err(err);
        }

        info!(url, root = %root.display(), "cloned store");
        self.reload()?;
        Ok(())
    }

    fn fetch_into(&self, url: &str, root: &Path) -> Result<()> {
        match url.strip_prefix("file://") {
            Some(source) => {
                store_fs::copy_recursive(Path::new(source), root)?;
                // A plain folder copy starts a fresh history.
                if !root.join(".git").exists() {
                    self.history.init(root)?;
                }
            }
            None => self.history.clone_from(url, root)?,
        }
        self.history
            .config_set_identity(root, &store_label(url))?;
        Ok(())
    }

    pub fn pull(&mut self) -> Result<()> {
        self.history.pull(self.root())?;
        self.reload()?;
        Ok(())
    }

    pub fn push(&self) -> Result<()> {
        self.history.push(self.root())?;
        Ok(())
    }

    /// Whether the local head equals the remote head, asked fresh each time.
    pub fn local_head_matches_remote(&self) -> Result<bool> {
        Ok(self.history.local_head_matches_remote(self.root())?)
    }

    /// History newest first.
    pub fn log(&self) -> Result<Vec<CommitInfo>> {
        Ok(self.history.log(self.root())?)
    }

    fn entry_file_name(&self, name: &str) -> String {
        format!("{name}{}", self.config.entry_suffix)
    }

    /// Move `node` to `target_location` in one `Renamed` commit.
    fn commit_rename(
        &mut self,
        node: &PwNode,
        target_segments: &[String],
        target_location: &Path,
    ) -> Result<()> {
        let from_location = node.location(self.root());
        let from_relative = node.relative_path();
        let to_relative = target_segments.join("/");
        let message = format!(
            "Renamed {} to {}",
            node.display_path(),
            display_path(target_segments, &self.config.entry_suffix)
        );

        self.attempt(Some(target_location), |this| {
            store_fs::move_path(&from_location, target_location)?;
            this.history.stage(this.root(), &from_relative)?;
            this.history.stage(this.root(), &to_relative)?;
            this.history.commit(this.root(), &message)?;
            Ok(())
        })?;

        info!(%message, "renamed");
        Ok(())
    }

    /// Run `operation`, recovering the store if it fails.
    fn attempt<F>(&mut self, artifact: Option<&Path>, operation: F) -> Result<()>
    where
        F: FnOnce(&Self) -> Result<()>,
    {
        let result = operation(self);
        if let Err(err) = &result {
            warn!(error = %err, "operation failed, restoring last commit");
            self.recover(artifact);
        }
        result
    }

    fn recover(&mut self, artifact: Option<&Path>) {
        if let Err(err) = self.history.reset(self.root()) {
            error!(error = %err, "failed to reset store history");
        }
        if let Some(path) = artifact.filter(|p| p.exists()) {
            if let Err(err) = store_fs::remove_recursive(path) {
                error!(path = %path.display(), error = %err, "failed to remove partial change");
            }
        }
        if let Err(err) = self.reload() {
            warn!(error = %err, "failed to reload tree after recovery");
        }
    }
}

/// `/`-joined segments with the entry suffix stripped from the last one.
fn display_path(segments: &[String], suffix: &str) -> String {
    match segments.split_last() {
        None => "/".to_string(),
        Some((last, parents)) => {
            let mut parts: Vec<&str> = parents.iter().map(String::as_str).collect();
            parts.push(strip_entry_suffix(last, suffix));
            parts.join("/")
        }
    }
}

/// Store name derived from a clone source: its basename without `.git`.
pub fn store_label(source: &str) -> String {
    let trimmed = source.trim_end_matches('/');
    let base = trimmed
        .rsplit(|c| c == '/' || c == ':')
        .next()
        .unwrap_or(trimmed);
    let label = base.strip_suffix(".git").unwrap_or(base);
    if label.is_empty() {
        DEFAULT_STORE_LABEL.to_string()
    } else {
        label.to_string()
    }
}

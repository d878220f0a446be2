//! In-memory tree of the store.

use crate::config::{StoreConfig, ROOT_NODE_NAME};
use crate::error::{Result, StoreError};
use crate::store_fs;
use crate::validation::{check_leaf, strip_entry_suffix};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// How to treat names on disk that fail validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Fail with [`StoreError::StoreCorrupt`].
    Strict,
    /// Log and skip the offending node.
    Loose,
}

impl LoadMode {
    pub fn from_config(config: &StoreConfig) -> Self {
        if config.strict_tree {
            LoadMode::Strict
        } else {
            LoadMode::Loose
        }
    }
}

/// A folder or a password entry.
///
/// Entries have no children; folders (including the root) have a possibly
/// empty list. A loaded tree is immutable, mutations reload it from disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PwNode {
    /// Raw path segments relative to the store root, empty for the root.
    path: Vec<String>,
    /// Display name: the last segment with the entry suffix stripped.
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    children: Option<Vec<PwNode>>,
}

impl PwNode {
    pub fn new_root(children: Vec<PwNode>) -> Self {
        Self {
            path: Vec::new(),
            name: ROOT_NODE_NAME.to_string(),
            children: Some(children),
        }
    }

    pub fn new_folder(path: Vec<String>, children: Vec<PwNode>) -> Self {
        let name = path.last().cloned().unwrap_or_else(|| ROOT_NODE_NAME.to_string());
        Self {
            path,
            name,
            children: Some(children),
        }
    }

    pub fn new_entry(path: Vec<String>, suffix: &str) -> Self {
        let name = path
            .last()
            .map(|raw| strip_entry_suffix(raw, suffix).to_string())
            .unwrap_or_default();
        Self {
            path,
            name,
            children: None,
        }
    }

    /// Build the tree from the directory at `root`.
    ///
    /// Hidden names are skipped. Children are sorted by raw name.
    pub fn load_recursively_from(root: &Path, config: &StoreConfig, mode: LoadMode) -> Result<Self> {
        if !root.is_dir() {
            return Err(StoreError::StoreCorrupt {
                path: root.display().to_string(),
                reason: "store root is not a folder".to_string(),
            });
        }
        let children = load_children(root, &[], config, mode)?;
        let tree = Self::new_root(children);
        debug!(
            root = %root.display(),
            passwords = tree.password_count(),
            "loaded password tree"
        );
        Ok(tree)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw segments relative to the store root.
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Children of a folder, empty for entries.
    pub fn children(&self) -> &[PwNode] {
        self.children.as_deref().unwrap_or(&[])
    }

    pub fn is_entry(&self) -> bool {
        self.children.is_none()
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    /// Raw relative path, e.g. `mail/work.age`; `/` for the root.
    pub fn relative_path(&self) -> String {
        if self.is_root() {
            ROOT_NODE_NAME.to_string()
        } else {
            self.path.join("/")
        }
    }

    /// Relative path as shown to users, e.g. `mail/work`.
    pub fn display_path(&self) -> String {
        match self.path.split_last() {
            None => ROOT_NODE_NAME.to_string(),
            Some((_, parents)) => {
                let mut segments: Vec<&str> = parents.iter().map(String::as_str).collect();
                segments.push(&self.name);
                segments.join("/")
            }
        }
    }

    /// Relative path of the containing folder, `/` for top-level nodes.
    pub fn parent_relative_path(&self) -> String {
        match self.path.split_last() {
            Some((_, parents)) if !parents.is_empty() => parents.join("/"),
            _ => ROOT_NODE_NAME.to_string(),
        }
    }

    /// Raw name of the node on disk, `/` for the root.
    pub fn raw_name(&self) -> &str {
        self.path.last().map(String::as_str).unwrap_or(ROOT_NODE_NAME)
    }

    /// Absolute location below the store `root`.
    pub fn location(&self, root: &Path) -> PathBuf {
        self.path
            .iter()
            .fold(root.to_path_buf(), |path, segment| path.join(segment))
    }

    /// Find a descendant by raw relative path; `/` or `""` yields `self`.
    pub fn find(&self, relative_path: &str) -> Option<&PwNode> {
        relative_path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .try_fold(self, |node, segment| {
                node.children().iter().find(|child| child.raw_name() == segment)
            })
    }

    /// This folder and every folder beneath it, depth first.
    pub fn flat_folders(&self) -> Vec<&PwNode> {
        let mut folders = Vec::new();
        self.collect_folders(&mut folders);
        folders
    }

    fn collect_folders<'a>(&'a self, out: &mut Vec<&'a PwNode>) {
        if self.is_entry() {
            return;
        }
        out.push(self);
        for child in self.children() {
            child.collect_folders(out);
        }
    }

    /// Every entry beneath this node, depth first.
    pub fn flat_entries(&self) -> Vec<&PwNode> {
        if self.is_entry() {
            return vec![self];
        }
        self.children()
            .iter()
            .flat_map(|child| child.flat_entries())
            .collect()
    }

    /// Number of entries in the subtree.
    pub fn password_count(&self) -> usize {
        if self.is_entry() {
            1
        } else {
            self.children().iter().map(PwNode::password_count).sum()
        }
    }
}

fn load_children(
    dir: &Path,
    prefix: &[String],
    config: &StoreConfig,
    mode: LoadMode,
) -> Result<Vec<PwNode>> {
    let mut listed = store_fs::list_visible(dir)?;
    listed.sort_by(|a, b| a.name.cmp(&b.name));

    let mut nodes = Vec::with_capacity(listed.len());
    for child in listed {
        let mut path = prefix.to_vec();
        path.push(child.name.clone());

        let problem = match check_leaf(&child.name, !child.is_dir, config) {
            Err(err) => Some(err.to_string()),
            Ok(()) if child.is_dir && path.len() > config.max_tree_depth => Some(format!(
                "folder is nested deeper than {} levels",
                config.max_tree_depth
            )),
            Ok(()) => None,
        };

        if let Some(reason) = problem {
            match mode {
                LoadMode::Strict => {
                    return Err(StoreError::StoreCorrupt {
                        path: path.join("/"),
                        reason,
                    })
                }
                LoadMode::Loose => {
                    warn!(path = %child.path.display(), %reason, "skipping invalid node");
                    continue;
                }
            }
        }

        if child.is_dir {
            let grandchildren = load_children(&child.path, &path, config, mode)?;
            nodes.push(PwNode::new_folder(path, grandchildren));
        } else {
            nodes.push(PwNode::new_entry(path, &config.entry_suffix));
        }
    }
    Ok(nodes)
}

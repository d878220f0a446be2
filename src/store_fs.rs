//! Filesystem primitives used by the store.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A non-hidden child of a store directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirChild {
    pub name: String,
    pub path: PathBuf,
    pub is_dir: bool,
}

/// List children of `dir` whose names do not start with a dot.
///
/// Names that are not valid UTF-8 are returned lossily converted, the
/// validator rejects them afterwards.
pub fn list_visible(dir: &Path) -> io::Result<Vec<DirChild>> {
    let mut children = Vec::new();
    for item in fs::read_dir(dir)? {
        let item = item?;
        let name = item.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        let is_dir = item.file_type()?.is_dir();
        children.push(DirChild {
            name,
            path: item.path(),
            is_dir,
        });
    }
    Ok(children)
}

pub fn create_dir(path: &Path) -> io::Result<()> {
    debug!(path = %path.display(), "creating folder");
    fs::create_dir(path)
}

/// Rename `from` to `to`. The destination's parent must exist.
pub fn move_path(from: &Path, to: &Path) -> io::Result<()> {
    debug!(from = %from.display(), to = %to.display(), "moving");
    fs::rename(from, to)
}

/// Remove a file, or a folder with everything beneath it.
pub fn remove_recursive(path: &Path) -> io::Result<()> {
    debug!(path = %path.display(), "removing");
    if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Make `path` an empty directory, deleting whatever was there.
pub fn wipe_dir(path: &Path) -> io::Result<()> {
    if path.exists() {
        remove_recursive(path)?;
    }
    fs::create_dir_all(path)
}

/// Copy the tree at `from` into `to`, hidden files included.
pub fn copy_recursive(from: &Path, to: &Path) -> io::Result<()> {
    if from.is_dir() {
        fs::create_dir_all(to)?;
        for item in fs::read_dir(from)? {
            let item = item?;
            copy_recursive(&item.path(), &to.join(item.file_name()))?;
        }
        Ok(())
    } else {
        fs::copy(from, to).map(|_| ())
    }
}

/// First regular file at or beneath `path`, if any.
///
/// A folder without files has nothing the history can track.
pub fn find_first_file(path: &Path) -> io::Result<Option<PathBuf>> {
    if path.is_file() {
        return Ok(Some(path.to_path_buf()));
    }
    if !path.is_dir() {
        return Ok(None);
    }
    for item in fs::read_dir(path)? {
        if let Some(found) = find_first_file(&item?.path())? {
            return Ok(Some(found));
        }
    }
    Ok(None)
}

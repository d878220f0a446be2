//! Name and location rules guarding every mutation of the store.

use crate::config::{StoreConfig, ROOT_NODE_NAME};
use crate::error::{ValidationError, ValidationErrorKind};
use lazy_static::lazy_static;
use regex::Regex;
use std::path::{Path, PathBuf};

lazy_static! {
    /// Any character outside the allowed name alphabet.
    static ref INVALID_NAME_CHAR: Regex =
        Regex::new(r"[^-_.@+a-zA-Z0-9åäöÅÄÖæøÆØüÜéÉ]").expect("static regex");
}

/// What kind of node is being validated and how strictly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidateOptions {
    /// The name must carry the entry suffix.
    pub expect_entry: bool,
    /// Every ancestor folder must also pass the name rules.
    pub check_parents: bool,
    /// The candidate may already exist as the same kind of node.
    pub allow_name_taken: bool,
}

impl ValidateOptions {
    /// A new password entry, nothing may exist at the location yet.
    pub fn new_entry() -> Self {
        Self {
            expect_entry: true,
            check_parents: true,
            allow_name_taken: false,
        }
    }

    /// A new folder, nothing may exist at the location yet.
    pub fn new_folder() -> Self {
        Self {
            expect_entry: false,
            ..Self::new_entry()
        }
    }

    pub fn allow_name_taken(mut self, allow: bool) -> Self {
        self.allow_name_taken = allow;
        self
    }

    pub fn check_parents(mut self, check: bool) -> Self {
        self.check_parents = check;
        self
    }
}

/// A location that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidPath {
    /// Absolute location of the candidate.
    pub location: PathBuf,
    /// Raw segments relative to the store root.
    pub segments: Vec<String>,
    pub is_entry: bool,
}

impl ValidPath {
    /// Relative path with the raw (suffixed) name, e.g. `mail/work.age`.
    pub fn relative_path(&self) -> String {
        self.segments.join("/")
    }
}

/// Validates candidate names against one store on disk.
pub struct PathValidator<'a> {
    root: &'a Path,
    config: &'a StoreConfig,
}

impl<'a> PathValidator<'a> {
    pub fn new(root: &'a Path, config: &'a StoreConfig) -> Self {
        Self { root, config }
    }

    /// Decide whether `name` may live in `relative_folder` and return its
    /// fully qualified location.
    ///
    /// Entry names are passed with their suffix (`github.age`), folder names
    /// without. `relative_folder` is `/`-separated, `/` or `""` is the root.
    pub fn validate(
        &self,
        name: &str,
        relative_folder: &str,
        options: ValidateOptions,
    ) -> Result<ValidPath, ValidationError> {
        check_leaf(name, options.expect_entry, self.config)?;

        let mut segments = folder_segments(relative_folder)?;

        // Folders count their own level, the tree loader skips deeper ones.
        let depth = segments.len() + usize::from(!options.expect_entry);
        if depth > self.config.max_tree_depth {
            return Err(ValidationError::new(
                name,
                ValidationErrorKind::DepthExceeded {
                    maximum: self.config.max_tree_depth,
                },
            ));
        }

        let parent = segments
            .iter()
            .fold(self.root.to_path_buf(), |path, segment| path.join(segment));
        self.check_ancestors(&parent, options.check_parents)?;

        let suffix = &self.config.entry_suffix;
        let stripped = strip_entry_suffix(name, suffix);
        let entry_location = parent.join(format!("{stripped}{suffix}"));
        let folder_location = parent.join(stripped);

        let (own, other) = if options.expect_entry {
            (entry_location, folder_location)
        } else {
            (folder_location, entry_location)
        };

        // Entries and folders share one namespace per directory.
        if other.exists() {
            return Err(ValidationError::new(
                name,
                ValidationErrorKind::NameCollision { existing: other },
            ));
        }
        if !options.allow_name_taken && own.exists() {
            return Err(ValidationError::new(
                name,
                ValidationErrorKind::NameCollision { existing: own },
            ));
        }

        segments.push(name.to_string());
        Ok(ValidPath {
            location: own,
            segments,
            is_entry: options.expect_entry,
        })
    }

    /// Walk from `parent` up to the store root.
    fn check_ancestors(&self, parent: &Path, check_parents: bool) -> Result<(), ValidationError> {
        let maximum = self.config.max_tree_depth;
        let mut current = parent.to_path_buf();
        let mut depth = 0;

        while current != self.root {
            if depth >= maximum {
                return Err(ValidationError::new(
                    parent.display().to_string(),
                    ValidationErrorKind::DepthExceeded { maximum },
                ));
            }
            if !current.is_dir() {
                return Err(ValidationError::new(
                    parent.display().to_string(),
                    ValidationErrorKind::MissingParent { path: current },
                ));
            }
            if check_parents {
                let folder_name = current
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                check_leaf(&folder_name, false, self.config)?;
            }
            current = match current.parent() {
                Some(up) => up.to_path_buf(),
                None => {
                    return Err(ValidationError::new(
                        parent.display().to_string(),
                        ValidationErrorKind::DepthExceeded { maximum },
                    ))
                }
            };
            depth += 1;
        }

        Ok(())
    }
}

/// Validate a single raw name as an entry (`expect_entry`) or a folder.
///
/// Used for new names as well as for names found while loading the tree.
pub fn check_leaf(
    raw: &str,
    expect_entry: bool,
    config: &StoreConfig,
) -> Result<(), ValidationError> {
    let suffix = config.entry_suffix.as_str();

    if raw.is_empty() {
        return Err(ValidationError::new(raw, ValidationErrorKind::EmptyName));
    }

    let stripped = strip_entry_suffix(raw, suffix);
    if raw == suffix
        || raw == ROOT_NODE_NAME
        || config
            .reserved_names
            .iter()
            .any(|reserved| reserved == raw || reserved == stripped)
    {
        return Err(ValidationError::new(raw, ValidationErrorKind::ReservedName));
    }

    if let Some(found) = INVALID_NAME_CHAR.find(raw) {
        let character = found.as_str().chars().next().unwrap_or_default();
        let position = raw[..found.start()].chars().count() + 1;
        return Err(bad_charset(
            raw,
            format!("invalid character '{character}' at position {position}"),
        ));
    }

    let length = stripped.chars().count();
    if length > config.max_name_length {
        return Err(bad_charset(
            raw,
            format!(
                "name is {length} characters long, the maximum is {}",
                config.max_name_length
            ),
        ));
    }

    if stripped.starts_with('.') {
        return Err(bad_charset(raw, "name starts with a dot".to_string()));
    }
    if stripped.ends_with('.') {
        return Err(bad_charset(raw, "name ends with a dot".to_string()));
    }

    let has_suffix = raw.ends_with(suffix);
    if stripped.ends_with(suffix) || has_suffix != expect_entry {
        return Err(ValidationError::new(
            raw,
            ValidationErrorKind::SuffixMismatch {
                expected_entry: expect_entry,
            },
        ));
    }

    Ok(())
}

/// Strip one trailing entry suffix, if present.
pub fn strip_entry_suffix<'a>(raw: &'a str, suffix: &str) -> &'a str {
    raw.strip_suffix(suffix).unwrap_or(raw)
}

/// Split a relative folder path into segments, `/` and `""` being the root.
///
/// `.` and `..` are never valid, so a folder path cannot leave the store.
pub fn folder_segments(relative_folder: &str) -> Result<Vec<String>, ValidationError> {
    relative_folder
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            if segment == "." || segment == ".." {
                Err(bad_charset(
                    relative_folder,
                    format!("'{segment}' is not a folder name"),
                ))
            } else {
                Ok(segment.to_string())
            }
        })
        .collect()
}

fn bad_charset(input: &str, detail: String) -> ValidationError {
    ValidationError::new(input, ValidationErrorKind::BadCharset { detail })
}

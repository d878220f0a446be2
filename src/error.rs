//! Error types for treepass.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] crate::crypto::CryptoError),

    #[error("Git error: {0}")]
    History(#[from] crate::history::HistoryError),

    #[error("Filesystem error: {0}")]
    Filesystem(#[from] std::io::Error),

    #[error("Store is corrupt at '{path}': {reason}")]
    StoreCorrupt { path: String, reason: String },

    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    #[error("Invalid secret: {0}")]
    InvalidSecret(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Operation cancelled by user")]
    Cancelled,

    #[error("Clipboard operation failed")]
    ClipboardFailed,
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// The rule a candidate name or location violated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// The name is empty.
    EmptyName,
    /// The name is the entry suffix alone, the root name, or a configured reserved name.
    ReservedName,
    /// The name contains a character outside the allowed class, has a bad
    /// length, or starts/ends with a dot.
    BadCharset { detail: String },
    /// Entry names must carry the suffix exactly once, folder names never.
    SuffixMismatch { expected_entry: bool },
    /// Something already occupies the stripped name in the target folder.
    NameCollision { existing: PathBuf },
    /// An ancestor of the candidate is not an existing folder.
    MissingParent { path: PathBuf },
    /// The ancestor walk did not reach the store root within the depth bound.
    DepthExceeded { maximum: usize },
    /// A folder cannot be moved beneath itself.
    NestedMove { destination: String },
}

/// A rejected name or location, reported before anything touches the disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub input: String,
    pub kind: ValidationErrorKind,
}

impl ValidationError {
    pub fn new(input: impl Into<String>, kind: ValidationErrorKind) -> Self {
        Self {
            input: input.into(),
            kind,
        }
    }

    pub fn kind(&self) -> &ValidationErrorKind {
        &self.kind
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid node path '{}': ", self.input)?;
        match &self.kind {
            ValidationErrorKind::EmptyName => write!(f, "name is empty"),
            ValidationErrorKind::ReservedName => write!(f, "name is reserved"),
            ValidationErrorKind::BadCharset { detail } => write!(f, "{detail}"),
            ValidationErrorKind::SuffixMismatch { expected_entry: true } => {
                write!(f, "password names must carry the entry suffix exactly once")
            }
            ValidationErrorKind::SuffixMismatch {
                expected_entry: false,
            } => write!(f, "folder names must not carry the entry suffix"),
            ValidationErrorKind::NameCollision { existing } => {
                write!(f, "name already taken by '{}'", existing.display())
            }
            ValidationErrorKind::MissingParent { path } => {
                write!(f, "missing parent folder '{}'", path.display())
            }
            ValidationErrorKind::DepthExceeded { maximum } => {
                write!(f, "path is nested deeper than {maximum} levels")
            }
            ValidationErrorKind::NestedMove { destination } => {
                write!(f, "cannot move a folder beneath itself ('{destination}')")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

//! treepass: a git-backed password store with one encrypted file per entry.

pub mod cli;
pub mod config;
pub mod crypto;
pub mod error;
pub mod history;
pub mod interactive;
pub mod lock;
pub mod logging;
pub mod search;
pub mod security;
pub mod store_fs;
pub mod sync;
pub mod tree;
pub mod utils;
pub mod validation;

// Re-export commonly used types
pub use config::StoreConfig;
pub use crypto::{CryptoEngine, CryptoError, SymmetricEngine};
pub use error::{Result, StoreError, ValidationError, ValidationErrorKind};
pub use history::{CommitInfo, GitCli, HistoryError, HistoryStore};
pub use lock::{IdentityLock, LockState};
pub use search::{filter_tree, find_children, Match};
pub use sync::SyncCoordinator;
pub use tree::{LoadMode, PwNode};
pub use validation::{PathValidator, ValidPath, ValidateOptions};

//! Secret hygiene: clipboard handling, secret checks, generation, permissions.

use crate::config::MAX_PASSWORD_LENGTH;
use crate::error::{Result, StoreError};
use copypasta::{ClipboardContext, ClipboardProvider};
use rand::{rngs::OsRng, seq::SliceRandom, Rng};
use std::path::Path;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, warn};
use zeroize::Zeroizing;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Length of generated passwords unless asked otherwise.
pub const GENERATED_PASSWORD_LENGTH: usize = 18;

const LOWER: &[u8] = b"abcdefghijkmnopqrstuvwxyz";
const UPPER: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
const DIGITS: &[u8] = b"23456789";
const SYMBOLS: &[u8] = b"!#%&()*+,-.:;<=>?@[]_{}";

/// Clipboard manager for secure clipboard operations.
pub struct ClipboardManager;

impl ClipboardManager {
    /// Copy text to the clipboard and clear it after `timeout_secs`, unless
    /// the clipboard changed in the meantime.
    ///
    /// The clear runs on the returned task. Await it before the runtime shuts
    /// down or the clipboard is never cleared.
    pub async fn copy_with_timeout(text: &str, timeout_secs: u64) -> Result<JoinHandle<()>> {
        Self::copy(text)?;
        let expected = Zeroizing::new(text.to_string());
        Ok(clear_after(
            || ClipboardContext::new().ok(),
            expected,
            Duration::from_secs(timeout_secs),
        ))
    }

    pub fn copy(text: &str) -> Result<()> {
        let mut ctx = ClipboardContext::new().map_err(|_| StoreError::ClipboardFailed)?;
        ctx.set_contents(text.to_string())
            .map_err(|_| StoreError::ClipboardFailed)
    }

    pub fn get_contents() -> Result<String> {
        let mut ctx = ClipboardContext::new().map_err(|_| StoreError::ClipboardFailed)?;
        ctx.get_contents().map_err(|_| StoreError::ClipboardFailed)
    }

    pub fn clear() -> Result<()> {
        Self::copy("")
    }
}

/// Spawn a task that waits `delay`, then empties the clipboard opened by
/// `open` if it still holds `expected`.
pub fn clear_after<P, F>(open: F, expected: Zeroizing<String>, delay: Duration) -> JoinHandle<()>
where
    P: ClipboardProvider + 'static,
    F: FnOnce() -> Option<P> + Send + 'static,
{
    tokio::spawn(async move {
        sleep(delay).await;
        match open() {
            Some(mut ctx) => {
                if clear_if_unchanged(&mut ctx, &expected) {
                    debug!("clipboard cleared");
                }
            }
            None => warn!("clipboard unavailable, could not clear it"),
        }
    })
}

/// Empty the clipboard if it still holds `expected`. Returns whether it did.
pub fn clear_if_unchanged<P: ClipboardProvider>(ctx: &mut P, expected: &str) -> bool {
    match ctx.get_contents() {
        Ok(current) if current == expected => ctx.set_contents(String::new()).is_ok(),
        _ => false,
    }
}

/// A secret must be non-empty and at most 1024 characters.
pub fn check_secret(secret: &str) -> Result<()> {
    if secret.is_empty() {
        return Err(StoreError::InvalidSecret("secret is empty".to_string()));
    }
    let length = secret.chars().count();
    if length > MAX_PASSWORD_LENGTH {
        return Err(StoreError::InvalidSecret(format!(
            "secret is {length} characters long, the maximum is {MAX_PASSWORD_LENGTH}"
        )));
    }
    Ok(())
}

/// Random password with at least one lowercase letter, uppercase letter,
/// digit and symbol. Lookalike characters are left out.
pub fn generate_password(length: usize) -> Zeroizing<String> {
    let classes = [LOWER, UPPER, DIGITS, SYMBOLS];
    let length = length.max(classes.len());
    let mut rng = OsRng;

    let mut bytes: Zeroizing<Vec<u8>> = Zeroizing::new(
        classes
            .iter()
            .map(|class| class[rng.gen_range(0..class.len())])
            .collect(),
    );
    let all: Vec<u8> = classes.concat();
    while bytes.len() < length {
        bytes.push(all[rng.gen_range(0..all.len())]);
    }
    bytes.shuffle(&mut rng);

    Zeroizing::new(bytes.iter().map(|&b| b as char).collect())
}

/// Restrict `path` to its owner (0600 for files, 0700 for folders).
pub fn set_secure_permissions(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mode = if path.is_dir() { 0o700 } else { 0o600 };
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

/// Warnings about the process environment and the identity file.
pub fn check_permissions(identity_path: &Path) -> Vec<String> {
    let mut warnings = Vec::new();

    #[cfg(unix)]
    {
        if unsafe { libc::geteuid() } == 0 {
            warnings.push("Running as root is not recommended".to_string());
        }

        if let Ok(metadata) = std::fs::metadata(identity_path) {
            let mode = metadata.permissions().mode();
            if mode & 0o077 != 0 {
                warnings.push(format!(
                    "Identity file has insecure permissions: {:o}. Run 'chmod 600 {}' to fix.",
                    mode & 0o777,
                    identity_path.display()
                ));
            }
        }
    }
    #[cfg(not(unix))]
    let _ = identity_path;

    warnings
}

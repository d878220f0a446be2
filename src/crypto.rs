//! Entry encryption behind the [`CryptoEngine`] seam.
//!
//! [`SymmetricEngine`] keeps a random 256-bit data key wrapped with an
//! Argon2id-derived key in the identity file. Entries are AES-256-GCM
//! ciphertexts under the data key.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use argon2::{password_hash::rand_core::RngCore, Argon2, Params, Version};
use base64::{engine::general_purpose::STANDARD, Engine};
use std::path::Path;
use thiserror::Error;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Errors that can occur during cryptographic operations.
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,
    #[error("Decryption failed")]
    DecryptionFailed,
    #[error("Invalid base64 encoding")]
    InvalidBase64,
    #[error("Invalid salt length")]
    InvalidSaltLength,
    #[error("Key derivation failed")]
    KeyDerivationFailed,
    #[error("Invalid identity file: {0}")]
    InvalidIdentity(String),
    #[error("Identity is locked")]
    Locked,
    #[error("Recipient does not belong to the unlocked identity")]
    RecipientMismatch,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Encrypts and decrypts entry files with an unlockable identity.
pub trait CryptoEngine {
    /// Unlock the identity stored in `encrypted_identity` with `secret`.
    fn unlock_identity(&mut self, encrypted_identity: &[u8], secret: &str)
        -> Result<(), CryptoError>;

    /// Forget any unlocked key material.
    fn lock_identity(&mut self);

    fn is_unlocked(&self) -> bool;

    /// Decrypt the entry file at `path`.
    fn decrypt(&self, path: &Path) -> Result<String, CryptoError>;

    /// Encrypt `plaintext` for `recipient` and write the ciphertext to `out_path`.
    fn encrypt(&self, plaintext: &str, recipient: &[u8], out_path: &Path)
        -> Result<(), CryptoError>;
}

const IDENTITY_HEADER: &str = "treepass-identity-v1";
const SALT_LEN: usize = 16;
const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub time_cost: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 65536, // 64 MB
            time_cost: 2,
            parallelism: 1,
        }
    }
}

/// Key material that zeroes itself on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey(Vec<u8>);

impl DerivedKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

struct UnlockedIdentity {
    data_key: DerivedKey,
    recipient: String,
}

/// Passphrase-protected symmetric identity.
#[derive(Default)]
pub struct SymmetricEngine {
    params: KdfParams,
    unlocked: Option<UnlockedIdentity>,
}

impl SymmetricEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine that creates identities with the given Argon2 cost.
    pub fn with_params(params: KdfParams) -> Self {
        Self {
            params,
            unlocked: None,
        }
    }

    /// Create a fresh identity protected by `passphrase`.
    ///
    /// Returns `(identity file bytes, recipient file bytes)`.
    pub fn generate_identity(&self, passphrase: &str) -> Result<(Vec<u8>, Vec<u8>), CryptoError> {
        let mut salt = vec![0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let mut data_key = DerivedKey(vec![0u8; KEY_LEN]);
        OsRng.fill_bytes(&mut data_key.0);

        let wrapping_key = derive_key(passphrase, &salt, self.params)?;
        let wrapped = seal(&wrapping_key, &data_key.0)?;

        let recipient = STANDARD.encode(&salt);
        let identity = format!(
            "{IDENTITY_HEADER} m={} t={} p={}\n{recipient}\n{}\n",
            self.params.memory_kib,
            self.params.time_cost,
            self.params.parallelism,
            STANDARD.encode(wrapped)
        );
        Ok((identity.into_bytes(), format!("{recipient}\n").into_bytes()))
    }

    fn unlocked(&self) -> Result<&UnlockedIdentity, CryptoError> {
        self.unlocked.as_ref().ok_or(CryptoError::Locked)
    }
}

impl CryptoEngine for SymmetricEngine {
    fn unlock_identity(
        &mut self,
        encrypted_identity: &[u8],
        secret: &str,
    ) -> Result<(), CryptoError> {
        let text = std::str::from_utf8(encrypted_identity)
            .map_err(|_| CryptoError::InvalidIdentity("not UTF-8".to_string()))?;
        let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());

        let params = parse_header(lines.next().unwrap_or_default())?;
        let recipient = lines
            .next()
            .ok_or_else(|| CryptoError::InvalidIdentity("missing salt".to_string()))?;
        let wrapped = lines
            .next()
            .ok_or_else(|| CryptoError::InvalidIdentity("missing key".to_string()))?;

        let salt = STANDARD
            .decode(recipient)
            .map_err(|_| CryptoError::InvalidBase64)?;
        let wrapped = STANDARD
            .decode(wrapped)
            .map_err(|_| CryptoError::InvalidBase64)?;

        let wrapping_key = derive_key(secret, &salt, params)?;
        let data_key = DerivedKey(open(&wrapping_key, &wrapped)?);
        if data_key.0.len() != KEY_LEN {
            return Err(CryptoError::InvalidIdentity("bad key length".to_string()));
        }

        debug!("identity unlocked");
        self.unlocked = Some(UnlockedIdentity {
            data_key,
            recipient: recipient.to_string(),
        });
        Ok(())
    }

    fn lock_identity(&mut self) {
        if self.unlocked.take().is_some() {
            debug!("identity locked");
        }
    }

    fn is_unlocked(&self) -> bool {
        self.unlocked.is_some()
    }

    fn decrypt(&self, path: &Path) -> Result<String, CryptoError> {
        let identity = self.unlocked()?;
        let encoded = std::fs::read_to_string(path)?;
        let combined = STANDARD
            .decode(encoded.trim())
            .map_err(|_| CryptoError::InvalidBase64)?;
        let plaintext = open(&identity.data_key, &combined)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::DecryptionFailed)
    }

    fn encrypt(
        &self,
        plaintext: &str,
        recipient: &[u8],
        out_path: &Path,
    ) -> Result<(), CryptoError> {
        let identity = self.unlocked()?;
        let recipient = String::from_utf8_lossy(recipient);
        if recipient.trim() != identity.recipient {
            return Err(CryptoError::RecipientMismatch);
        }
        let combined = seal(&identity.data_key, plaintext.as_bytes())?;
        std::fs::write(out_path, format!("{}\n", STANDARD.encode(combined)))?;
        Ok(())
    }
}

fn parse_header(header: &str) -> Result<KdfParams, CryptoError> {
    let mut parts = header.split_whitespace();
    if parts.next() != Some(IDENTITY_HEADER) {
        return Err(CryptoError::InvalidIdentity("unknown format".to_string()));
    }
    let mut params = KdfParams::default();
    for part in parts {
        let (key, value) = part
            .split_once('=')
            .ok_or_else(|| CryptoError::InvalidIdentity(format!("bad parameter '{part}'")))?;
        let value: u32 = value
            .parse()
            .map_err(|_| CryptoError::InvalidIdentity(format!("bad parameter '{part}'")))?;
        match key {
            "m" => params.memory_kib = value,
            "t" => params.time_cost = value,
            "p" => params.parallelism = value,
            _ => return Err(CryptoError::InvalidIdentity(format!("bad parameter '{part}'"))),
        }
    }
    Ok(params)
}

/// Derive a wrapping key from a passphrase using Argon2id.
fn derive_key(passphrase: &str, salt: &[u8], params: KdfParams) -> Result<DerivedKey, CryptoError> {
    if salt.len() != SALT_LEN {
        return Err(CryptoError::InvalidSaltLength);
    }
    let params = Params::new(
        params.memory_kib,
        params.time_cost,
        params.parallelism,
        Some(KEY_LEN),
    )
    .map_err(|_| CryptoError::KeyDerivationFailed)?;
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, params);

    let mut output = DerivedKey(vec![0u8; KEY_LEN]);
    argon2
        .hash_password_into(passphrase.as_bytes(), salt, &mut output.0)
        .map_err(|_| CryptoError::KeyDerivationFailed)?;
    Ok(output)
}

/// AES-256-GCM encrypt, returning nonce followed by ciphertext and tag.
fn seal(key: &DerivedKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut combined = Vec::with_capacity(nonce.len() + ciphertext.len());
    combined.extend_from_slice(&nonce);
    combined.extend_from_slice(&ciphertext);
    Ok(combined)
}

fn open(key: &DerivedKey, combined: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if combined.len() < NONCE_LEN {
        return Err(CryptoError::DecryptionFailed);
    }
    let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}

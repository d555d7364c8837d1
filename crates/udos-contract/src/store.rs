//! The encrypted secret store (`secrets.tomb`).
//!
//! AES-256-GCM with PBKDF2-SHA256 key derivation. On-disk format:
//! base64(salt || nonce || ciphertext), where the ciphertext is the
//! authenticated encryption of a JSON map of entries. A store that exists
//! but cannot be decrypted under the given key is locked; an absent store is
//! simply empty and unlocks under any key.

use std::collections::BTreeMap;
use std::fs;

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit, OsRng, rand_core::RngCore},
};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use camino::{Utf8Path, Utf8PathBuf};
use pbkdf2::pbkdf2_hmac_array;
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;

use udos_core::atomic_write::write_file_atomic;

/// Size of the key-derivation salt.
const SALT_SIZE: usize = 16;
/// Size of the AES-GCM nonce.
const NONCE_SIZE: usize = 12;
/// PBKDF2 iteration count.
const PBKDF2_ITERATIONS: u32 = 100_000;
/// Derived key size (AES-256).
const KEY_SIZE: usize = 32;

/// Secret-store failures.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store exists but cannot be decrypted under the supplied key.
    #[error("secret store is locked")]
    Locked,

    /// An operation that needs an unlocked store was called on a locked one.
    #[error("secret store has not been unlocked")]
    NotUnlocked,

    #[error("secret store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("secret store persistence error: {0}")]
    Persist(String),
}

/// Opaque capability over the encrypted store.
pub trait SecretStore: Send + Sync {
    /// Attempt to unlock with the given key. Idempotent on success.
    fn unlock(&mut self, key: &str) -> Result<(), StoreError>;

    /// Whether the store is currently unlocked.
    fn is_unlocked(&self) -> bool;

    /// Read a decrypted entry. Requires an unlocked store.
    fn get(&self, id: &str) -> Result<Option<String>, StoreError>;

    /// Insert or update an entry and persist. Requires an unlocked store.
    fn put(&mut self, id: &str, value: &str) -> Result<(), StoreError>;

    /// Destroy the store contents and reseed an empty store under `key`.
    fn reset(&mut self, key: &str) -> Result<(), StoreError>;
}

/// File-backed implementation at `<config>/secrets.tomb`.
#[derive(Debug)]
pub struct TombStore {
    path: Utf8PathBuf,
    /// Decrypted entries; `None` while locked.
    entries: Option<BTreeMap<String, String>>,
    /// Key the store was unlocked with, needed to persist mutations.
    unlock_key: Option<String>,
}

impl TombStore {
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: None,
            unlock_key: None,
        }
    }

    /// Whether the store file exists on disk.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.as_std_path().exists()
    }

    fn persist(&self) -> Result<(), StoreError> {
        let entries = self.entries.as_ref().ok_or(StoreError::NotUnlocked)?;
        let key = self.unlock_key.as_ref().ok_or(StoreError::NotUnlocked)?;
        let plaintext = serde_json::to_vec(entries)
            .map_err(|e| StoreError::Persist(format!("serialize entries: {e}")))?;
        let blob = encrypt(&plaintext, key)?;
        write_file_atomic(&self.path, &blob).map_err(|e| StoreError::Persist(e.to_string()))?;
        Ok(())
    }
}

impl SecretStore for TombStore {
    fn unlock(&mut self, key: &str) -> Result<(), StoreError> {
        if !self.exists() {
            // A store that was never written is empty, not locked.
            debug!(path = %self.path, "Secret store absent, starting empty");
            self.entries = Some(BTreeMap::new());
            self.unlock_key = Some(key.to_string());
            return Ok(());
        }

        let blob = fs::read_to_string(self.path.as_std_path())?;
        let plaintext = decrypt(blob.trim(), key).map_err(|_| StoreError::Locked)?;
        let entries: BTreeMap<String, String> =
            serde_json::from_slice(&plaintext).map_err(|_| StoreError::Locked)?;

        self.entries = Some(entries);
        self.unlock_key = Some(key.to_string());
        Ok(())
    }

    fn is_unlocked(&self) -> bool {
        self.entries.is_some()
    }

    fn get(&self, id: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.as_ref().ok_or(StoreError::NotUnlocked)?;
        Ok(entries.get(id).cloned())
    }

    fn put(&mut self, id: &str, value: &str) -> Result<(), StoreError> {
        let entries = self.entries.as_mut().ok_or(StoreError::NotUnlocked)?;
        entries.insert(id.to_string(), value.to_string());
        self.persist()
    }

    fn reset(&mut self, key: &str) -> Result<(), StoreError> {
        self.entries = Some(BTreeMap::new());
        self.unlock_key = Some(key.to_string());
        self.persist()
    }
}

/// Fill `n` bytes from the OS RNG.
#[must_use]
pub fn random_bytes(n: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; n];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Encrypt `data` under a key derived from `passphrase`.
/// Output: base64(salt || nonce || ciphertext).
fn encrypt(data: &[u8], passphrase: &str) -> Result<String, StoreError> {
    let mut salt = [0u8; SALT_SIZE];
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut salt);
    OsRng.fill_bytes(&mut nonce_bytes);

    let derived =
        pbkdf2_hmac_array::<Sha256, KEY_SIZE>(passphrase.as_bytes(), &salt, PBKDF2_ITERATIONS);
    let cipher = Aes256Gcm::new_from_slice(&derived)
        .map_err(|e| StoreError::Persist(format!("cipher construction failed: {e}")))?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, data)
        .map_err(|e| StoreError::Persist(format!("encryption failed: {e}")))?;

    let mut combined = Vec::with_capacity(SALT_SIZE + NONCE_SIZE + ciphertext.len());
    combined.extend_from_slice(&salt);
    combined.extend_from_slice(&nonce_bytes);
    combined.extend_from_slice(&ciphertext);

    Ok(BASE64.encode(combined))
}

/// Decrypt a base64(salt || nonce || ciphertext) blob.
fn decrypt(blob: &str, passphrase: &str) -> Result<Vec<u8>, StoreError> {
    let combined = BASE64
        .decode(blob)
        .map_err(|_| StoreError::Locked)?;

    if combined.len() < SALT_SIZE + NONCE_SIZE {
        return Err(StoreError::Locked);
    }

    let (salt, rest) = combined.split_at(SALT_SIZE);
    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_SIZE);

    let derived =
        pbkdf2_hmac_array::<Sha256, KEY_SIZE>(passphrase.as_bytes(), salt, PBKDF2_ITERATIONS);
    let cipher = Aes256Gcm::new_from_slice(&derived).map_err(|_| StoreError::Locked)?;
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| StoreError::Locked)
}

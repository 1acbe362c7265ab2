//! AES-256-GCM sealer with a locally stored key.
//!
//! Output format is `nonce[12] || ciphertext+tag`. A fresh random nonce is
//! drawn for every seal. The key is read from (or created in) a key file with
//! `0600` permissions and never leaves this type: it is not serialized,
//! logged or included in `Debug` output.

use crate::application::ports::{SealError, Sealer};
use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use tracing::info;

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

pub struct AesGcmSealer {
    cipher: Aes256Gcm,
}

impl AesGcmSealer {
    /// Build a sealer from raw key material.
    pub fn from_key(key: [u8; KEY_LEN]) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key)),
        }
    }

    /// Build a sealer with a fresh random key that exists only in memory.
    pub fn ephemeral() -> Self {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        Self::from_key(key)
    }

    /// Load the key file at `path`, creating it with a new random key if
    /// it does not exist yet.
    pub fn load_or_create(path: &Path) -> Result<Self, SealError> {
        match read_key(path) {
            Ok(key) => return Ok(Self::from_key(key)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(SealError::KeyUnavailable(e.to_string())),
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| SealError::KeyUnavailable(e.to_string()))?;
            }
        }

        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        match write_new_file_restricted(path, BASE64.encode(key).as_bytes()) {
            Ok(()) => {
                info!(path = %path.display(), "created sealing key");
                Ok(Self::from_key(key))
            }
            // Another process created it first; use theirs
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => read_key(path)
                .map(Self::from_key)
                .map_err(|e| SealError::KeyUnavailable(e.to_string())),
            Err(e) => Err(SealError::KeyUnavailable(e.to_string())),
        }
    }
}

impl Sealer for AesGcmSealer {
    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, SealError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|_| SealError::Encrypt)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, SealError> {
        if sealed.len() < NONCE_LEN + TAG_LEN {
            return Err(SealError::Integrity);
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| SealError::Integrity)
    }
}

impl fmt::Debug for AesGcmSealer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AesGcmSealer")
            .field("key", &"<redacted>")
            .finish()
    }
}

fn read_key(path: &Path) -> io::Result<[u8; KEY_LEN]> {
    let encoded = fs::read_to_string(path)?;
    let decoded = BASE64
        .decode(encoded.trim().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    <[u8; KEY_LEN]>::try_from(decoded.as_slice()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("key file must hold {} bytes", KEY_LEN),
        )
    })
}

fn write_new_file_restricted(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new().create_new(true).write(true).open(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(data)?;
    file.flush()
}

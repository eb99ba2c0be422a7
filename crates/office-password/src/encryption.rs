//! Root-secret encryption of stored passwords.
//!
//! ## Envelope format (stable)
//!
//! Sealed values are stored in `passwordSecure` as a JSON envelope (camelCase):
//!
//! ```json
//! {
//!   "keyVersion": 1,
//!   "algorithm": "aes-256-gcm",
//!   "iv": "<base64(12 bytes)>",
//!   "ciphertext": "<base64>",
//!   "tag": "<base64(16 bytes)>"
//! }
//! ```
//!
//! The AES-256 key is `HMAC-SHA256(label, encryption.secretKey)`, and every ciphertext is bound
//! to the AAD scope `"office-password"`.
//!
//! With `encryption.enabled = false` values are wrapped as `"algorithm": "none"` with the
//! plaintext base64 encoded into `ciphertext`. Such envelopes decrypt without a secret only while
//! encryption stays disabled; an enabled service without a secret rejects every `decrypt`.

use std::fmt;
use std::sync::Arc;

use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::config::EncryptionConfig;

const AES_256_GCM: &str = "aes-256-gcm";
const PASSTHROUGH: &str = "none";
const KEY_VERSION: u32 = 1;
const AES_GCM_IV_BYTES: usize = 12;
const AES_GCM_TAG_BYTES: usize = 16;
const AES_256_KEY_BYTES: usize = 32;
const ROOT_KEY_LABEL: &[u8] = b"office-password/root-key/v1";

pub const DEFAULT_AAD_SCOPE: &str = "office-password";

#[derive(Debug, thiserror::Error)]
pub enum EncryptionError {
    #[error("encryption secret key is not configured")]
    NoSecret,
    /// The value could not be decoded or authenticated under the configured secret.
    #[error("failed to decrypt sealed value: {0}")]
    DecryptFailed(String),
    #[error("crypto operation failed")]
    Crypto,
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("encryption task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedEnvelope {
    pub key_version: u32,
    pub algorithm: String,
    #[serde(default)]
    pub iv: String,
    pub ciphertext: String,
    #[serde(default)]
    pub tag: String,
}

/// Encrypts and decrypts strings under the process-wide root secret.
///
/// Cheap to clone; the derived key is shared and zeroized on drop.
#[derive(Clone)]
pub struct EncryptionService {
    inner: Arc<Inner>,
}

struct Inner {
    root_key: Option<Zeroizing<[u8; AES_256_KEY_BYTES]>>,
    enabled: bool,
    aad_scope: String,
}

impl EncryptionService {
    pub fn new(secret_key: Option<&str>, enabled: bool) -> Self {
        let root_key = secret_key
            .filter(|secret| !secret.is_empty())
            .map(derive_root_key);
        Self {
            inner: Arc::new(Inner {
                root_key,
                enabled,
                aad_scope: DEFAULT_AAD_SCOPE.to_string(),
            }),
        }
    }

    pub fn from_config(config: &EncryptionConfig) -> Self {
        Self::new(config.secret_key.as_deref(), config.enabled)
    }

    pub fn has_secret(&self) -> bool {
        self.inner.root_key.is_some()
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled
    }

    /// Seals `plaintext` and returns the serialized envelope.
    pub async fn encrypt(&self, plaintext: &str) -> Result<String, EncryptionError> {
        let inner = Arc::clone(&self.inner);
        let plaintext = Zeroizing::new(plaintext.to_string());
        tokio::task::spawn_blocking(move || inner.encrypt_blocking(plaintext.as_bytes())).await?
    }

    /// Opens a serialized envelope produced by [`EncryptionService::encrypt`].
    pub async fn decrypt(&self, sealed: &str) -> Result<String, EncryptionError> {
        let inner = Arc::clone(&self.inner);
        let sealed = sealed.to_string();
        tokio::task::spawn_blocking(move || inner.decrypt_blocking(&sealed)).await?
    }
}

impl fmt::Debug for EncryptionService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionService")
            .field("has_secret", &self.has_secret())
            .field("enabled", &self.inner.enabled)
            .field("aad_scope", &self.inner.aad_scope)
            .finish()
    }
}

impl Inner {
    fn encrypt_blocking(&self, plaintext: &[u8]) -> Result<String, EncryptionError> {
        let envelope = if self.enabled {
            let key = self.root_key.as_ref().ok_or(EncryptionError::NoSecret)?;
            let encrypted = encrypt_aes256_gcm(plaintext, key, self.aad_scope.as_bytes())?;
            EncryptedEnvelope {
                key_version: KEY_VERSION,
                algorithm: AES_256_GCM.to_string(),
                iv: general_purpose::STANDARD.encode(encrypted.iv),
                ciphertext: general_purpose::STANDARD.encode(&encrypted.ciphertext),
                tag: general_purpose::STANDARD.encode(encrypted.tag),
            }
        } else {
            EncryptedEnvelope {
                key_version: KEY_VERSION,
                algorithm: PASSTHROUGH.to_string(),
                iv: String::new(),
                ciphertext: general_purpose::STANDARD.encode(plaintext),
                tag: String::new(),
            }
        };
        Ok(serde_json::to_string(&envelope)?)
    }

    fn decrypt_blocking(&self, sealed: &str) -> Result<String, EncryptionError> {
        if self.enabled && self.root_key.is_none() {
            return Err(EncryptionError::NoSecret);
        }

        let envelope: EncryptedEnvelope = serde_json::from_str(sealed)
            .map_err(|err| EncryptionError::DecryptFailed(format!("invalid envelope: {err}")))?;

        let plaintext = match envelope.algorithm.as_str() {
            PASSTHROUGH => Zeroizing::new(decode_b64(&envelope.ciphertext, "ciphertext")?),
            AES_256_GCM => {
                let key = self.root_key.as_ref().ok_or(EncryptionError::NoSecret)?;
                if envelope.key_version != KEY_VERSION {
                    return Err(EncryptionError::DecryptFailed(format!(
                        "unknown key version {}",
                        envelope.key_version
                    )));
                }
                let iv = decode_fixed::<AES_GCM_IV_BYTES>(&envelope.iv, "iv")?;
                let tag = decode_fixed::<AES_GCM_TAG_BYTES>(&envelope.tag, "tag")?;
                let ciphertext = decode_b64(&envelope.ciphertext, "ciphertext")?;
                decrypt_aes256_gcm(&ciphertext, key, &iv, &tag, self.aad_scope.as_bytes())?
            }
            other => {
                return Err(EncryptionError::DecryptFailed(format!(
                    "unsupported algorithm {other:?}"
                )))
            }
        };

        String::from_utf8(plaintext.to_vec())
            .map_err(|_| EncryptionError::DecryptFailed("plaintext is not UTF-8".to_string()))
    }
}

fn derive_root_key(secret: &str) -> Zeroizing<[u8; AES_256_KEY_BYTES]> {
    let mut key = Zeroizing::new([0u8; AES_256_KEY_BYTES]);
    // HMAC accepts keys of any length, so this cannot fail.
    if let Ok(mut mac) = <Hmac<Sha256> as Mac>::new_from_slice(ROOT_KEY_LABEL) {
        mac.update(secret.as_bytes());
        key.copy_from_slice(&mac.finalize().into_bytes());
    }
    key
}

struct RawEncryptedPayload {
    iv: [u8; AES_GCM_IV_BYTES],
    ciphertext: Vec<u8>,
    tag: [u8; AES_GCM_TAG_BYTES],
}

fn encrypt_aes256_gcm(
    plaintext: &[u8],
    key: &[u8; AES_256_KEY_BYTES],
    aad: &[u8],
) -> Result<RawEncryptedPayload, EncryptionError> {
    let mut nonce_bytes = [0u8; AES_GCM_IV_BYTES];
    OsRng.fill_bytes(&mut nonce_bytes);

    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::Crypto)?;
    let nonce = Nonce::from_slice(&nonce_bytes);
    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(nonce, aad, &mut buffer)
        .map_err(|_| EncryptionError::Crypto)?;

    Ok(RawEncryptedPayload {
        iv: nonce_bytes,
        ciphertext: buffer,
        tag: tag.into(),
    })
}

fn decrypt_aes256_gcm(
    ciphertext: &[u8],
    key: &[u8; AES_256_KEY_BYTES],
    iv: &[u8; AES_GCM_IV_BYTES],
    tag: &[u8; AES_GCM_TAG_BYTES],
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>, EncryptionError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::Crypto)?;
    let nonce = Nonce::from_slice(iv);
    let mut buffer = Zeroizing::new(ciphertext.to_vec());
    cipher
        .decrypt_in_place_detached(nonce, aad, buffer.as_mut_slice(), tag.into())
        .map_err(|_| EncryptionError::DecryptFailed("authentication failed".to_string()))?;
    Ok(buffer)
}

fn decode_b64(value: &str, field: &str) -> Result<Vec<u8>, EncryptionError> {
    general_purpose::STANDARD
        .decode(value)
        .map_err(|err| {
            EncryptionError::DecryptFailed(format!("{field} is not valid base64: {err}"))
        })
}

fn decode_fixed<const N: usize>(value: &str, field: &str) -> Result<[u8; N], EncryptionError> {
    let decoded = decode_b64(value, field)?;
    let decoded_len = decoded.len();
    decoded.try_into().map_err(|_| {
        EncryptionError::DecryptFailed(format!(
            "{field} must decode to {N} bytes (got {decoded_len})"
        ))
    })
}

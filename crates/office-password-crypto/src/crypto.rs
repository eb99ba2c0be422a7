//! Hash, key-derivation and AES-CBC primitives shared by the Agile writer and reader.

use aes::{Aes128, Aes192, Aes256};
use cipher::block_padding::NoPadding;
use cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use sha2::Digest;
use zeroize::Zeroizing;

use crate::error::OfficeCryptoError;

pub(crate) const AES_BLOCK_SIZE: usize = 16;

/// Hash algorithms accepted by MS-OFFCRYPTO Agile descriptors.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    /// Name as written into the `hashAlgorithm` XML attribute.
    pub fn as_offcrypto_name(self) -> &'static str {
        match self {
            HashAlgorithm::Sha1 => "SHA1",
            HashAlgorithm::Sha256 => "SHA256",
            HashAlgorithm::Sha384 => "SHA384",
            HashAlgorithm::Sha512 => "SHA512",
        }
    }

    pub(crate) fn parse_offcrypto_name(name: &str) -> Result<Self, OfficeCryptoError> {
        match name.trim().to_ascii_uppercase().as_str() {
            "SHA1" | "SHA-1" => Ok(HashAlgorithm::Sha1),
            "SHA256" | "SHA-256" => Ok(HashAlgorithm::Sha256),
            "SHA384" | "SHA-384" => Ok(HashAlgorithm::Sha384),
            "SHA512" | "SHA-512" => Ok(HashAlgorithm::Sha512),
            other => Err(OfficeCryptoError::UnsupportedEncryption(format!(
                "hashAlgorithm {other}"
            ))),
        }
    }

    pub fn digest_len(self) -> usize {
        match self {
            HashAlgorithm::Sha1 => 20,
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha384 => 48,
            HashAlgorithm::Sha512 => 64,
        }
    }

    pub(crate) fn digest(self, data: &[u8]) -> Vec<u8> {
        self.digest_chunks(&[data])
    }

    pub(crate) fn digest_chunks(self, chunks: &[&[u8]]) -> Vec<u8> {
        fn run<D: Digest>(chunks: &[&[u8]]) -> Vec<u8> {
            let mut hasher = D::new();
            for chunk in chunks {
                hasher.update(chunk);
            }
            hasher.finalize().to_vec()
        }

        match self {
            HashAlgorithm::Sha1 => run::<sha1::Sha1>(chunks),
            HashAlgorithm::Sha256 => run::<sha2::Sha256>(chunks),
            HashAlgorithm::Sha384 => run::<sha2::Sha384>(chunks),
            HashAlgorithm::Sha512 => run::<sha2::Sha512>(chunks),
        }
    }

    pub(crate) fn hmac(self, key: &[u8], data: &[u8]) -> Result<Vec<u8>, OfficeCryptoError> {
        macro_rules! mac {
            ($hash:ty) => {{
                let mut mac = Hmac::<$hash>::new_from_slice(key).map_err(|_| {
                    OfficeCryptoError::InvalidFormat("invalid HMAC key length".to_string())
                })?;
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }};
        }

        Ok(match self {
            HashAlgorithm::Sha1 => mac!(sha1::Sha1),
            HashAlgorithm::Sha256 => mac!(sha2::Sha256),
            HashAlgorithm::Sha384 => mac!(sha2::Sha384),
            HashAlgorithm::Sha512 => mac!(sha2::Sha512),
        })
    }
}

pub(crate) fn password_to_utf16le(password: &str) -> Zeroizing<Vec<u8>> {
    let mut out = Zeroizing::new(Vec::with_capacity(password.len() * 2));
    for unit in password.encode_utf16() {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out
}

/// Agile password hash: `H0 = H(salt || password)`, then `Hn = H(LE32(n) || Hn-1)` for
/// `spin_count` rounds.
pub(crate) fn iterated_password_hash(
    password_utf16le: &[u8],
    salt: &[u8],
    hash_alg: HashAlgorithm,
    spin_count: u32,
) -> Zeroizing<Vec<u8>> {
    let mut h = Zeroizing::new(hash_alg.digest_chunks(&[salt, password_utf16le]));
    for i in 0..spin_count {
        let next = hash_alg.digest_chunks(&[&i.to_le_bytes()[..], h.as_slice()]);
        h.copy_from_slice(&next);
    }
    h
}

/// `H(Hfinal || blockKey)` truncated, or padded with `0x36`, to `key_len` bytes.
pub(crate) fn derive_key(
    h: &[u8],
    block_key: &[u8],
    hash_alg: HashAlgorithm,
    key_len: usize,
) -> Zeroizing<Vec<u8>> {
    let mut key = Zeroizing::new(hash_alg.digest_chunks(&[h, block_key]));
    key.resize(key_len, 0x36);
    key
}

/// IV derivation for `EncryptedPackage` segments and the data-integrity fields:
/// `H(keyDataSalt || blockKey)` truncated, or padded with `0x36`, to the block size.
pub(crate) fn derive_iv(
    salt: &[u8],
    block_key: &[u8],
    hash_alg: HashAlgorithm,
    block_size: usize,
) -> Vec<u8> {
    let mut iv = hash_alg.digest_chunks(&[salt, block_key]);
    iv.resize(block_size, 0x36);
    iv
}

/// Zero-pads `bytes` up to the next AES block boundary.
pub(crate) fn pad_to_block(bytes: &[u8]) -> Zeroizing<Vec<u8>> {
    let padded_len = bytes.len().div_ceil(AES_BLOCK_SIZE) * AES_BLOCK_SIZE;
    let mut out = Zeroizing::new(bytes.to_vec());
    out.resize(padded_len, 0);
    out
}

pub(crate) fn aes_cbc_encrypt(
    key: &[u8],
    iv: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, OfficeCryptoError> {
    if plaintext.len() % AES_BLOCK_SIZE != 0 {
        return Err(OfficeCryptoError::InvalidFormat(format!(
            "AES-CBC plaintext length {} is not a multiple of {AES_BLOCK_SIZE}",
            plaintext.len()
        )));
    }

    let mut buf = plaintext.to_vec();
    let len = buf.len();
    let result = match key.len() {
        16 => cbc::Encryptor::<Aes128>::new_from_slices(key, iv)
            .map_err(|_| invalid_iv(iv))?
            .encrypt_padded_mut::<NoPadding>(&mut buf, len)
            .map(|_| ()),
        24 => cbc::Encryptor::<Aes192>::new_from_slices(key, iv)
            .map_err(|_| invalid_iv(iv))?
            .encrypt_padded_mut::<NoPadding>(&mut buf, len)
            .map(|_| ()),
        32 => cbc::Encryptor::<Aes256>::new_from_slices(key, iv)
            .map_err(|_| invalid_iv(iv))?
            .encrypt_padded_mut::<NoPadding>(&mut buf, len)
            .map(|_| ()),
        other => return Err(invalid_key_len(other)),
    };
    result.map_err(|_| OfficeCryptoError::InvalidFormat("AES-CBC encryption failed".to_string()))?;
    Ok(buf)
}

pub(crate) fn aes_cbc_decrypt(
    key: &[u8],
    iv: &[u8],
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>, OfficeCryptoError> {
    if ciphertext.len() % AES_BLOCK_SIZE != 0 {
        return Err(OfficeCryptoError::InvalidFormat(format!(
            "AES-CBC ciphertext length {} is not a multiple of {AES_BLOCK_SIZE}",
            ciphertext.len()
        )));
    }

    let mut buf = Zeroizing::new(ciphertext.to_vec());
    let result = match key.len() {
        16 => cbc::Decryptor::<Aes128>::new_from_slices(key, iv)
            .map_err(|_| invalid_iv(iv))?
            .decrypt_padded_mut::<NoPadding>(&mut buf)
            .map(|_| ()),
        24 => cbc::Decryptor::<Aes192>::new_from_slices(key, iv)
            .map_err(|_| invalid_iv(iv))?
            .decrypt_padded_mut::<NoPadding>(&mut buf)
            .map(|_| ()),
        32 => cbc::Decryptor::<Aes256>::new_from_slices(key, iv)
            .map_err(|_| invalid_iv(iv))?
            .decrypt_padded_mut::<NoPadding>(&mut buf)
            .map(|_| ()),
        other => return Err(invalid_key_len(other)),
    };
    result.map_err(|_| OfficeCryptoError::InvalidFormat("AES-CBC decryption failed".to_string()))?;
    Ok(buf)
}

fn invalid_iv(iv: &[u8]) -> OfficeCryptoError {
    OfficeCryptoError::InvalidFormat(format!(
        "AES-CBC IV must be {AES_BLOCK_SIZE} bytes, got {}",
        iv.len()
    ))
}

fn invalid_key_len(len: usize) -> OfficeCryptoError {
    OfficeCryptoError::InvalidFormat(format!(
        "invalid AES key length {len}; expected 16, 24, or 32 bytes"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_is_encoded_as_utf16le() {
        assert_eq!(password_to_utf16le("Ab").as_slice(), &[0x41, 0x00, 0x62, 0x00]);
        // Non-BMP characters become surrogate pairs.
        assert_eq!(password_to_utf16le("\u{1F600}").len(), 4);
    }

    #[test]
    fn iterated_hash_matches_manual_rounds() {
        let password = password_to_utf16le("pw");
        let salt = [0x5Au8; 16];

        let mut expected = HashAlgorithm::Sha256.digest_chunks(&[&salt[..], password.as_slice()]);
        for i in 0u32..3 {
            expected = HashAlgorithm::Sha256.digest_chunks(&[&i.to_le_bytes()[..], &expected[..]]);
        }

        let h = iterated_password_hash(&password, &salt, HashAlgorithm::Sha256, 3);
        assert_eq!(h.as_slice(), expected.as_slice());
    }

    #[test]
    fn short_digests_are_padded_with_0x36() {
        // SHA1 yields 20 bytes; AES-256 needs 32.
        let key = derive_key(&[0u8; 20], &[1, 2, 3, 4, 5, 6, 7, 8], HashAlgorithm::Sha1, 32);
        assert_eq!(key.len(), 32);
        assert!(key[20..].iter().all(|b| *b == 0x36));

        let iv = derive_iv(&[0u8; 16], &0u32.to_le_bytes(), HashAlgorithm::Sha512, 16);
        assert_eq!(iv.len(), 16);
    }

    #[test]
    fn aes_cbc_round_trips_for_every_key_size() {
        let iv = [0x42u8; 16];
        let plaintext = [0x17u8; 48];
        for key_len in [16usize, 24, 32] {
            let key = vec![0x99u8; key_len];
            let ciphertext = aes_cbc_encrypt(&key, &iv, &plaintext).expect("encrypt");
            assert_ne!(ciphertext.as_slice(), plaintext.as_slice());
            let decrypted = aes_cbc_decrypt(&key, &iv, &ciphertext).expect("decrypt");
            assert_eq!(decrypted.as_slice(), plaintext.as_slice());
        }
    }

    #[test]
    fn aes_cbc_rejects_unaligned_input() {
        let err = aes_cbc_encrypt(&[0u8; 32], &[0u8; 16], &[0u8; 15]).expect_err("unaligned");
        assert!(matches!(err, OfficeCryptoError::InvalidFormat(_)));
    }
}

//! Password protection of OOXML packages (`.docx`, `.xlsx`, `.pptx`) using MS-OFFCRYPTO
//! "Agile Encryption".
//!
//! Office stores a password-protected OOXML document as an OLE/CFB container with two streams:
//! - `EncryptionInfo`: version header plus the Agile XML descriptor
//! - `EncryptedPackage`: 8-byte decrypted size prefix plus the encrypted ZIP payload
//!
//! [`encrypt_package_to_ole`] produces that container from raw ZIP bytes.
//! [`decrypt_encrypted_package_ole`] reverses it, verifying both the password and the
//! `dataIntegrity` HMAC.

mod agile;
mod crypto;
mod error;

use std::io::{Cursor, Read, Seek, Write as _};

pub use crate::crypto::HashAlgorithm;
pub use crate::error::OfficeCryptoError;

const OLE_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const ZIP_MAGIC: &[u8; 2] = b"PK";

#[derive(Debug, Clone)]
pub struct EncryptOptions {
    pub key_bits: usize,
    pub hash_algorithm: HashAlgorithm,
    pub spin_count: u32,
}

impl Default for EncryptOptions {
    fn default() -> Self {
        Self {
            key_bits: 256,
            hash_algorithm: HashAlgorithm::Sha512,
            spin_count: 100_000,
        }
    }
}

impl EncryptOptions {
    fn validate(&self) -> Result<(), OfficeCryptoError> {
        if !matches!(self.key_bits, 128 | 192 | 256) {
            return Err(OfficeCryptoError::InvalidOptions(format!(
                "key_bits must be 128, 192, or 256 (got {})",
                self.key_bits
            )));
        }
        if self.spin_count > agile::MAX_SPIN_COUNT {
            return Err(OfficeCryptoError::InvalidOptions(format!(
                "spin_count must be at most {} (got {})",
                agile::MAX_SPIN_COUNT,
                self.spin_count
            )));
        }
        Ok(())
    }
}

/// Returns true if the provided bytes look like an OLE/CFB container holding an Office-encrypted
/// OOXML package (streams `EncryptionInfo` and `EncryptedPackage`).
pub fn is_encrypted_ooxml_ole(bytes: &[u8]) -> bool {
    if bytes.len() < OLE_MAGIC.len() || bytes[..OLE_MAGIC.len()] != OLE_MAGIC {
        return false;
    }

    let Ok(mut ole) = cfb::CompoundFile::open(Cursor::new(bytes)) else {
        return false;
    };

    stream_exists(&mut ole, "EncryptionInfo") && stream_exists(&mut ole, "EncryptedPackage")
}

/// Encrypt a raw OOXML ZIP package into an Office `EncryptedPackage` OLE/CFB wrapper.
///
/// Only the two encryption streams are written; Office opens such files without the optional
/// `\x06DataSpaces` storage.
pub fn encrypt_package_to_ole(
    zip_bytes: &[u8],
    password: &str,
    opts: EncryptOptions,
) -> Result<Vec<u8>, OfficeCryptoError> {
    opts.validate()?;
    if !zip_bytes.starts_with(ZIP_MAGIC) {
        let detail = if zip_bytes.starts_with(&OLE_MAGIC) {
            "input is already an OLE/CFB container (encrypted or legacy binary Office file)"
        } else {
            "input is not an OOXML package (missing PK signature)"
        };
        return Err(OfficeCryptoError::InvalidFormat(detail.to_string()));
    }

    let (encryption_info, encrypted_package) =
        agile::encrypt_agile_encrypted_package(zip_bytes, password, &opts)?;

    let mut ole = cfb::CompoundFile::create(Cursor::new(Vec::new()))?;
    ole.create_stream("EncryptionInfo")?
        .write_all(&encryption_info)?;
    ole.create_stream("EncryptedPackage")?
        .write_all(&encrypted_package)?;

    Ok(ole.into_inner().into_inner())
}

/// Decrypt an Office-encrypted OOXML OLE/CFB wrapper and return the decrypted raw ZIP bytes.
pub fn decrypt_encrypted_package_ole(
    bytes: &[u8],
    password: &str,
) -> Result<Vec<u8>, OfficeCryptoError> {
    let mut ole = cfb::CompoundFile::open(Cursor::new(bytes))?;

    let mut encryption_info = Vec::new();
    ole.open_stream("EncryptionInfo")?
        .read_to_end(&mut encryption_info)?;

    let mut encrypted_package = Vec::new();
    ole.open_stream("EncryptedPackage")?
        .read_to_end(&mut encrypted_package)?;

    let info = agile::parse_agile_encryption_info(&encryption_info)?;
    let out = agile::decrypt_agile_encrypted_package(&info, &encrypted_package, password)?;
    validate_decrypted_package(&out)?;
    Ok(out)
}

fn stream_exists<R: Read + Seek>(ole: &mut cfb::CompoundFile<R>, name: &str) -> bool {
    ole.open_stream(name).is_ok()
}

fn validate_decrypted_package(bytes: &[u8]) -> Result<(), OfficeCryptoError> {
    if !bytes.starts_with(ZIP_MAGIC) {
        return Err(OfficeCryptoError::InvalidFormat(
            "decrypted package does not look like a ZIP (missing PK signature)".to_string(),
        ));
    }
    Ok(())
}

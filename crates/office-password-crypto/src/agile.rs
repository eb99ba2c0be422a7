//! MS-OFFCRYPTO "Agile" encryption (EncryptionInfo version 4.4, XML descriptor).

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use rand::RngCore;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::crypto::{
    aes_cbc_decrypt, aes_cbc_encrypt, derive_iv, derive_key, iterated_password_hash,
    pad_to_block, password_to_utf16le, HashAlgorithm, AES_BLOCK_SIZE,
};
use crate::error::OfficeCryptoError;
use crate::EncryptOptions;

const VERIFIER_HASH_INPUT_BLOCK: [u8; 8] = [0xFE, 0xA7, 0xD2, 0x76, 0x3B, 0x4B, 0x9E, 0x79];
const VERIFIER_HASH_VALUE_BLOCK: [u8; 8] = [0xD7, 0xAA, 0x0F, 0x6D, 0x30, 0x61, 0x34, 0x4E];
const KEY_VALUE_BLOCK: [u8; 8] = [0x14, 0x6E, 0x0B, 0xE7, 0xAB, 0xAC, 0xD0, 0xD6];
const HMAC_KEY_BLOCK: [u8; 8] = [0x5F, 0xB2, 0xAD, 0x01, 0x0C, 0xB9, 0xE1, 0xF6];
const HMAC_VALUE_BLOCK: [u8; 8] = [0xA0, 0x67, 0x7F, 0x02, 0xB2, 0x2C, 0x84, 0x33];

const ENCRYPTION_NS: &str = "http://schemas.microsoft.com/office/2006/encryption";
const PASSWORD_KEY_ENCRYPTOR_NS: &str =
    "http://schemas.microsoft.com/office/2006/keyEncryptor/password";

const AGILE_VERSION: (u16, u16) = (4, 4);
const AGILE_FLAGS: u32 = 0x40;
const SALT_LEN: usize = 16;
const SEGMENT_LEN: usize = 4096;
const PACKAGE_SIZE_PREFIX_LEN: usize = 8;

/// Upper bound accepted for `spinCount` when decrypting.
///
/// Office writes 100,000. A hostile descriptor can otherwise pin a CPU for minutes before the
/// password check fails.
pub(crate) const MAX_SPIN_COUNT: u32 = 1_000_000;

#[derive(Debug, Clone)]
pub(crate) struct AgileEncryptionInfo {
    #[allow(dead_code)]
    pub(crate) version_major: u16,
    #[allow(dead_code)]
    pub(crate) version_minor: u16,
    #[allow(dead_code)]
    pub(crate) flags: u32,
    pub(crate) key_data: AgileKeyData,
    pub(crate) data_integrity: AgileDataIntegrity,
    pub(crate) password_key_encryptor: AgilePasswordKeyEncryptor,
}

#[derive(Debug, Clone)]
pub(crate) struct AgileKeyData {
    pub(crate) salt: Vec<u8>,
    pub(crate) block_size: usize,
    pub(crate) key_bits: usize,
    pub(crate) hash_algorithm: HashAlgorithm,
}

#[derive(Debug, Clone)]
pub(crate) struct AgileDataIntegrity {
    pub(crate) encrypted_hmac_key: Vec<u8>,
    pub(crate) encrypted_hmac_value: Vec<u8>,
}

#[derive(Debug, Clone)]
pub(crate) struct AgilePasswordKeyEncryptor {
    pub(crate) salt: Vec<u8>,
    pub(crate) block_size: usize,
    pub(crate) key_bits: usize,
    pub(crate) spin_count: u32,
    pub(crate) hash_algorithm: HashAlgorithm,
    pub(crate) encrypted_verifier_hash_input: Vec<u8>,
    pub(crate) encrypted_verifier_hash_value: Vec<u8>,
    pub(crate) encrypted_key_value: Vec<u8>,
}

/// Builds the `EncryptionInfo` and `EncryptedPackage` stream contents for `zip_bytes`.
pub(crate) fn encrypt_agile_encrypted_package(
    zip_bytes: &[u8],
    password: &str,
    opts: &EncryptOptions,
) -> Result<(Vec<u8>, Vec<u8>), OfficeCryptoError> {
    let hash_alg = opts.hash_algorithm;
    let key_len = opts.key_bits / 8;
    let mut rng = rand::thread_rng();

    let mut key_data_salt = [0u8; SALT_LEN];
    rng.fill_bytes(&mut key_data_salt);
    let mut encryptor_salt = [0u8; SALT_LEN];
    rng.fill_bytes(&mut encryptor_salt);
    let mut package_key = Zeroizing::new(vec![0u8; key_len]);
    rng.fill_bytes(&mut package_key);
    let mut verifier_input = Zeroizing::new([0u8; SALT_LEN]);
    rng.fill_bytes(verifier_input.as_mut_slice());
    let mut hmac_key = Zeroizing::new(vec![0u8; hash_alg.digest_len()]);
    rng.fill_bytes(&mut hmac_key);

    let encrypted_package = encrypt_segments(zip_bytes, &package_key, &key_data_salt, hash_alg)?;

    // dataIntegrity: HMAC over the whole EncryptedPackage stream, size prefix included.
    let hmac_value = hash_alg.hmac(&hmac_key, &encrypted_package)?;
    let encrypted_hmac_key = aes_cbc_encrypt(
        &package_key,
        &derive_iv(&key_data_salt, &HMAC_KEY_BLOCK, hash_alg, AES_BLOCK_SIZE),
        &pad_to_block(&hmac_key),
    )?;
    let encrypted_hmac_value = aes_cbc_encrypt(
        &package_key,
        &derive_iv(&key_data_salt, &HMAC_VALUE_BLOCK, hash_alg, AES_BLOCK_SIZE),
        &pad_to_block(&hmac_value),
    )?;

    // Password key encryptor. Every field uses the encryptor salt as its IV.
    let password_utf16 = password_to_utf16le(password);
    let h = iterated_password_hash(&password_utf16, &encryptor_salt, hash_alg, opts.spin_count);

    let verifier_hash = hash_alg.digest(verifier_input.as_slice());
    let encrypted_verifier_hash_input = aes_cbc_encrypt(
        &derive_key(&h, &VERIFIER_HASH_INPUT_BLOCK, hash_alg, key_len),
        &encryptor_salt,
        &pad_to_block(verifier_input.as_slice()),
    )?;
    let encrypted_verifier_hash_value = aes_cbc_encrypt(
        &derive_key(&h, &VERIFIER_HASH_VALUE_BLOCK, hash_alg, key_len),
        &encryptor_salt,
        &pad_to_block(&verifier_hash),
    )?;
    let encrypted_key_value = aes_cbc_encrypt(
        &derive_key(&h, &KEY_VALUE_BLOCK, hash_alg, key_len),
        &encryptor_salt,
        &pad_to_block(&package_key),
    )?;

    let xml = format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            "\r\n",
            r#"<encryption xmlns="{ns}" xmlns:p="{pns}">"#,
            r#"<keyData saltSize="{salt_size}" blockSize="{block}" keyBits="{key_bits}" hashSize="{hash_size}" "#,
            r#"cipherAlgorithm="AES" cipherChaining="ChainingModeCBC" hashAlgorithm="{hash}" saltValue="{key_salt}"/>"#,
            r#"<dataIntegrity encryptedHmacKey="{hmac_key}" encryptedHmacValue="{hmac_value}"/>"#,
            r#"<keyEncryptors><keyEncryptor uri="{pns}">"#,
            r#"<p:encryptedKey spinCount="{spin}" saltSize="{salt_size}" blockSize="{block}" keyBits="{key_bits}" hashSize="{hash_size}" "#,
            r#"cipherAlgorithm="AES" cipherChaining="ChainingModeCBC" hashAlgorithm="{hash}" saltValue="{enc_salt}" "#,
            r#"encryptedVerifierHashInput="{vhi}" encryptedVerifierHashValue="{vhv}" encryptedKeyValue="{kv}"/>"#,
            r#"</keyEncryptor></keyEncryptors></encryption>"#,
        ),
        ns = ENCRYPTION_NS,
        pns = PASSWORD_KEY_ENCRYPTOR_NS,
        salt_size = SALT_LEN,
        block = AES_BLOCK_SIZE,
        key_bits = opts.key_bits,
        hash_size = hash_alg.digest_len(),
        hash = hash_alg.as_offcrypto_name(),
        key_salt = STANDARD.encode(key_data_salt),
        hmac_key = STANDARD.encode(&encrypted_hmac_key),
        hmac_value = STANDARD.encode(&encrypted_hmac_value),
        spin = opts.spin_count,
        enc_salt = STANDARD.encode(encryptor_salt),
        vhi = STANDARD.encode(&encrypted_verifier_hash_input),
        vhv = STANDARD.encode(&encrypted_verifier_hash_value),
        kv = STANDARD.encode(&encrypted_key_value),
    );

    let mut encryption_info = Vec::with_capacity(8 + xml.len());
    encryption_info.extend_from_slice(&AGILE_VERSION.0.to_le_bytes());
    encryption_info.extend_from_slice(&AGILE_VERSION.1.to_le_bytes());
    encryption_info.extend_from_slice(&AGILE_FLAGS.to_le_bytes());
    encryption_info.extend_from_slice(xml.as_bytes());

    Ok((encryption_info, encrypted_package))
}

fn encrypt_segments(
    plaintext: &[u8],
    key: &[u8],
    key_data_salt: &[u8],
    hash_alg: HashAlgorithm,
) -> Result<Vec<u8>, OfficeCryptoError> {
    let padded_len = plaintext.len().div_ceil(AES_BLOCK_SIZE) * AES_BLOCK_SIZE;
    let mut out = Vec::with_capacity(PACKAGE_SIZE_PREFIX_LEN + padded_len);
    out.extend_from_slice(&(plaintext.len() as u64).to_le_bytes());

    for (index, segment) in plaintext.chunks(SEGMENT_LEN).enumerate() {
        let index = u32::try_from(index).map_err(|_| {
            OfficeCryptoError::InvalidFormat("package has too many segments".to_string())
        })?;
        let iv = derive_iv(key_data_salt, &index.to_le_bytes(), hash_alg, AES_BLOCK_SIZE);
        out.extend_from_slice(&aes_cbc_encrypt(key, &iv, &pad_to_block(segment))?);
    }

    Ok(out)
}

/// Parses an Agile `EncryptionInfo` stream (8-byte version header followed by the XML descriptor).
pub(crate) fn parse_agile_encryption_info(
    bytes: &[u8],
) -> Result<AgileEncryptionInfo, OfficeCryptoError> {
    if bytes.len() < 8 {
        return Err(OfficeCryptoError::InvalidFormat(
            "EncryptionInfo stream is too short".to_string(),
        ));
    }
    let version_major = u16::from_le_bytes([bytes[0], bytes[1]]);
    let version_minor = u16::from_le_bytes([bytes[2], bytes[3]]);
    let flags = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);

    match (version_major, version_minor) {
        AGILE_VERSION => {}
        (2..=4, 2) => {
            return Err(OfficeCryptoError::UnsupportedEncryption(
                "Standard (CryptoAPI) encryption".to_string(),
            ))
        }
        (major, minor) => {
            return Err(OfficeCryptoError::UnsupportedEncryption(format!(
                "EncryptionInfo version {major}.{minor}"
            )))
        }
    }

    let xml = std::str::from_utf8(&bytes[8..]).map_err(|_| {
        OfficeCryptoError::InvalidFormat("Agile EncryptionInfo XML is not valid UTF-8".to_string())
    })?;
    let xml = xml.trim_start_matches('\u{feff}').trim_end_matches('\0');

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut key_data = None;
    let mut data_integrity = None;
    let mut password_key_encryptor = None;

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|err| {
            OfficeCryptoError::InvalidFormat(format!("Agile EncryptionInfo XML: {err}"))
        })?;
        match event {
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"keyData" => key_data = Some(parse_key_data(&Attrs::collect(&e)?)?),
                b"dataIntegrity" => {
                    let attrs = Attrs::collect(&e)?;
                    data_integrity = Some(AgileDataIntegrity {
                        encrypted_hmac_key: attrs.base64("encryptedHmacKey")?,
                        encrypted_hmac_value: attrs.base64("encryptedHmacValue")?,
                    });
                }
                // Certificate key encryptors carry no spinCount; only the password one is usable.
                b"encryptedKey" => {
                    let attrs = Attrs::collect(&e)?;
                    if attrs.get("spinCount").is_some() {
                        password_key_encryptor = Some(parse_password_key_encryptor(&attrs)?);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(AgileEncryptionInfo {
        version_major,
        version_minor,
        flags,
        key_data: key_data.ok_or_else(|| missing("keyData"))?,
        data_integrity: data_integrity.ok_or_else(|| missing("dataIntegrity"))?,
        password_key_encryptor: password_key_encryptor
            .ok_or_else(|| missing("password encryptedKey"))?,
    })
}

fn parse_key_data(attrs: &Attrs) -> Result<AgileKeyData, OfficeCryptoError> {
    check_cipher(attrs)?;
    Ok(AgileKeyData {
        salt: attrs.base64("saltValue")?,
        block_size: attrs.number("blockSize")?,
        key_bits: attrs.number("keyBits")?,
        hash_algorithm: HashAlgorithm::parse_offcrypto_name(attrs.required("hashAlgorithm")?)?,
    })
}

fn parse_password_key_encryptor(
    attrs: &Attrs,
) -> Result<AgilePasswordKeyEncryptor, OfficeCryptoError> {
    check_cipher(attrs)?;
    Ok(AgilePasswordKeyEncryptor {
        salt: attrs.base64("saltValue")?,
        block_size: attrs.number("blockSize")?,
        key_bits: attrs.number("keyBits")?,
        spin_count: attrs.number("spinCount")?,
        hash_algorithm: HashAlgorithm::parse_offcrypto_name(attrs.required("hashAlgorithm")?)?,
        encrypted_verifier_hash_input: attrs.base64("encryptedVerifierHashInput")?,
        encrypted_verifier_hash_value: attrs.base64("encryptedVerifierHashValue")?,
        encrypted_key_value: attrs.base64("encryptedKeyValue")?,
    })
}

fn check_cipher(attrs: &Attrs) -> Result<(), OfficeCryptoError> {
    let cipher = attrs.required("cipherAlgorithm")?;
    if !cipher.eq_ignore_ascii_case("AES") {
        return Err(OfficeCryptoError::UnsupportedEncryption(format!(
            "cipherAlgorithm {cipher}"
        )));
    }
    let chaining = attrs.required("cipherChaining")?;
    if chaining != "ChainingModeCBC" {
        return Err(OfficeCryptoError::UnsupportedEncryption(format!(
            "cipherChaining {chaining}"
        )));
    }
    let block_size: usize = attrs.number("blockSize")?;
    if block_size != AES_BLOCK_SIZE {
        return Err(OfficeCryptoError::UnsupportedEncryption(format!(
            "blockSize {block_size}"
        )));
    }
    let key_bits: usize = attrs.number("keyBits")?;
    if !matches!(key_bits, 128 | 192 | 256) {
        return Err(OfficeCryptoError::UnsupportedEncryption(format!(
            "keyBits {key_bits}"
        )));
    }
    Ok(())
}

fn missing(what: &str) -> OfficeCryptoError {
    OfficeCryptoError::InvalidFormat(format!("Agile EncryptionInfo is missing {what}"))
}

/// Attributes of one descriptor element, keyed by local name.
struct Attrs(Vec<(String, String)>);

impl Attrs {
    fn collect(e: &BytesStart<'_>) -> Result<Self, OfficeCryptoError> {
        let mut out = Vec::new();
        for attr in e.attributes().with_checks(false) {
            let attr = attr.map_err(|err| {
                OfficeCryptoError::InvalidFormat(format!("invalid XML attribute: {err}"))
            })?;
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = String::from_utf8_lossy(attr.value.as_ref()).into_owned();
            out.push((key, value));
        }
        Ok(Self(out))
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn required(&self, name: &str) -> Result<&str, OfficeCryptoError> {
        self.get(name).ok_or_else(|| {
            OfficeCryptoError::InvalidFormat(format!("missing `{name}` attribute"))
        })
    }

    fn number<T: std::str::FromStr>(&self, name: &str) -> Result<T, OfficeCryptoError> {
        let raw = self.required(name)?;
        raw.trim().parse().map_err(|_| {
            OfficeCryptoError::InvalidFormat(format!("`{name}` is not a valid number: {raw:?}"))
        })
    }

    fn base64(&self, name: &str) -> Result<Vec<u8>, OfficeCryptoError> {
        let raw = self.required(name)?;
        let compact: String = raw.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        STANDARD.decode(compact).map_err(|err| {
            OfficeCryptoError::InvalidFormat(format!("`{name}` is not valid base64: {err}"))
        })
    }
}

/// Verifies `password` against the descriptor and returns the decrypted package bytes.
pub(crate) fn decrypt_agile_encrypted_package(
    info: &AgileEncryptionInfo,
    encrypted_package: &[u8],
    password: &str,
) -> Result<Vec<u8>, OfficeCryptoError> {
    let size_prefix = encrypted_package
        .get(..PACKAGE_SIZE_PREFIX_LEN)
        .ok_or_else(|| {
            OfficeCryptoError::InvalidFormat("EncryptedPackage stream is too short".to_string())
        })?;
    let mut size_bytes = [0u8; PACKAGE_SIZE_PREFIX_LEN];
    size_bytes.copy_from_slice(size_prefix);
    let total_size = u64::from_le_bytes(size_bytes);
    let ciphertext = &encrypted_package[PACKAGE_SIZE_PREFIX_LEN..];

    // Reject impossible sizes before allocating anything proportional to them.
    let original_len = usize::try_from(total_size)
        .ok()
        .filter(|len| *len <= ciphertext.len())
        .ok_or(OfficeCryptoError::EncryptedPackageSizeOverflow { total_size })?;

    let encryptor = &info.password_key_encryptor;
    if encryptor.spin_count > MAX_SPIN_COUNT {
        return Err(OfficeCryptoError::SpinCountTooLarge {
            spin_count: encryptor.spin_count,
            max: MAX_SPIN_COUNT,
        });
    }

    let package_key = unwrap_package_key(encryptor, password)?;
    let key_data = &info.key_data;
    let package_key_len = key_data.key_bits / 8;
    if package_key.len() < package_key_len {
        return Err(OfficeCryptoError::InvalidFormat(
            "encryptedKeyValue is shorter than keyData.keyBits".to_string(),
        ));
    }
    let package_key = &package_key[..package_key_len];

    verify_data_integrity(info, package_key, encrypted_package)?;

    let mut out = Vec::with_capacity(original_len);
    for (index, segment) in ciphertext.chunks(SEGMENT_LEN).enumerate() {
        if out.len() >= original_len {
            break;
        }
        let index = u32::try_from(index).map_err(|_| {
            OfficeCryptoError::InvalidFormat("package has too many segments".to_string())
        })?;
        let iv = derive_iv(
            &key_data.salt,
            &index.to_le_bytes(),
            key_data.hash_algorithm,
            key_data.block_size,
        );
        out.extend_from_slice(&aes_cbc_decrypt(package_key, &iv, segment)?);
    }
    out.truncate(original_len);

    Ok(out)
}

fn unwrap_package_key(
    encryptor: &AgilePasswordKeyEncryptor,
    password: &str,
) -> Result<Zeroizing<Vec<u8>>, OfficeCryptoError> {
    let hash_alg = encryptor.hash_algorithm;
    let key_len = encryptor.key_bits / 8;
    let mut iv = encryptor.salt.clone();
    iv.resize(encryptor.block_size, 0x36);

    let password_utf16 = password_to_utf16le(password);
    let h = iterated_password_hash(
        &password_utf16,
        &encryptor.salt,
        hash_alg,
        encryptor.spin_count,
    );

    let verifier_input = aes_cbc_decrypt(
        &derive_key(&h, &VERIFIER_HASH_INPUT_BLOCK, hash_alg, key_len),
        &iv,
        &encryptor.encrypted_verifier_hash_input,
    )?;
    let verifier_hash_value = aes_cbc_decrypt(
        &derive_key(&h, &VERIFIER_HASH_VALUE_BLOCK, hash_alg, key_len),
        &iv,
        &encryptor.encrypted_verifier_hash_value,
    )?;

    let input_len = encryptor.salt.len().min(verifier_input.len());
    let expected = hash_alg.digest(&verifier_input[..input_len]);
    let actual = verifier_hash_value
        .get(..expected.len())
        .ok_or(OfficeCryptoError::InvalidPassword)?;
    if !bool::from(expected.as_slice().ct_eq(actual)) {
        return Err(OfficeCryptoError::InvalidPassword);
    }

    aes_cbc_decrypt(
        &derive_key(&h, &KEY_VALUE_BLOCK, hash_alg, key_len),
        &iv,
        &encryptor.encrypted_key_value,
    )
}

fn verify_data_integrity(
    info: &AgileEncryptionInfo,
    package_key: &[u8],
    encrypted_package: &[u8],
) -> Result<(), OfficeCryptoError> {
    let key_data = &info.key_data;
    let hash_alg = key_data.hash_algorithm;
    let hash_len = hash_alg.digest_len();

    let hmac_key = aes_cbc_decrypt(
        package_key,
        &derive_iv(&key_data.salt, &HMAC_KEY_BLOCK, hash_alg, key_data.block_size),
        &info.data_integrity.encrypted_hmac_key,
    )?;
    let hmac_value = aes_cbc_decrypt(
        package_key,
        &derive_iv(&key_data.salt, &HMAC_VALUE_BLOCK, hash_alg, key_data.block_size),
        &info.data_integrity.encrypted_hmac_value,
    )?;

    let (Some(hmac_key), Some(expected)) = (hmac_key.get(..hash_len), hmac_value.get(..hash_len))
    else {
        return Err(OfficeCryptoError::IntegrityCheckFailed);
    };
    let actual = hash_alg.hmac(hmac_key, encrypted_package)?;
    if !bool::from(actual.as_slice().ct_eq(expected)) {
        return Err(OfficeCryptoError::IntegrityCheckFailed);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_options() -> EncryptOptions {
        EncryptOptions {
            spin_count: 16,
            ..Default::default()
        }
    }

    fn sample_package(len: usize) -> Vec<u8> {
        let mut bytes = b"PK\x03\x04".to_vec();
        bytes.extend((0..len).map(|i| (i % 251) as u8));
        bytes
    }

    #[test]
    fn writer_output_parses_back() {
        let (info_bytes, package) =
            encrypt_agile_encrypted_package(&sample_package(100), "pw", &fast_options())
                .expect("encrypt");

        assert_eq!(&info_bytes[..4], &[4, 0, 4, 0]);
        assert_eq!(&info_bytes[4..8], &AGILE_FLAGS.to_le_bytes());

        let info = parse_agile_encryption_info(&info_bytes).expect("parse");
        assert_eq!((info.version_major, info.version_minor), (4, 4));
        assert_eq!(info.key_data.key_bits, 256);
        assert_eq!(info.key_data.hash_algorithm, HashAlgorithm::Sha512);
        assert_eq!(info.key_data.salt.len(), SALT_LEN);
        assert_eq!(info.password_key_encryptor.spin_count, 16);
        assert_eq!(info.password_key_encryptor.salt.len(), SALT_LEN);
        assert_ne!(info.password_key_encryptor.salt, info.key_data.salt);

        // 8-byte size prefix followed by block-aligned ciphertext.
        assert_eq!(&package[..8], &104u64.to_le_bytes());
        assert_eq!((package.len() - 8) % AES_BLOCK_SIZE, 0);
    }

    #[test]
    fn multi_segment_package_round_trips() {
        let plaintext = sample_package(SEGMENT_LEN * 2 + 17);
        let (info_bytes, package) =
            encrypt_agile_encrypted_package(&plaintext, "secret", &fast_options())
                .expect("encrypt");
        let info = parse_agile_encryption_info(&info_bytes).expect("parse");
        let decrypted =
            decrypt_agile_encrypted_package(&info, &package, "secret").expect("decrypt");
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn rejects_standard_encryption_header() {
        let mut bytes = vec![0u8; 16];
        bytes[..2].copy_from_slice(&4u16.to_le_bytes());
        bytes[2..4].copy_from_slice(&2u16.to_le_bytes());
        let err = parse_agile_encryption_info(&bytes).expect_err("standard");
        assert!(matches!(err, OfficeCryptoError::UnsupportedEncryption(_)));
    }

    #[test]
    fn excessive_spin_count_is_rejected_before_hashing() {
        let (info_bytes, package) =
            encrypt_agile_encrypted_package(&sample_package(10), "pw", &fast_options())
                .expect("encrypt");
        let mut info = parse_agile_encryption_info(&info_bytes).expect("parse");
        info.password_key_encryptor.spin_count = MAX_SPIN_COUNT + 1;

        let err = decrypt_agile_encrypted_package(&info, &package, "pw").expect_err("too large");
        assert!(matches!(
            err,
            OfficeCryptoError::SpinCountTooLarge { spin_count, max }
                if spin_count == MAX_SPIN_COUNT + 1 && max == MAX_SPIN_COUNT
        ));
    }

    #[test]
    fn oversized_original_size_is_rejected() {
        let (info_bytes, mut package) =
            encrypt_agile_encrypted_package(&sample_package(10), "pw", &fast_options())
                .expect("encrypt");
        let info = parse_agile_encryption_info(&info_bytes).expect("parse");
        package[..8].copy_from_slice(&u64::MAX.to_le_bytes());

        let err = decrypt_agile_encrypted_package(&info, &package, "pw").expect_err("overflow");
        assert!(matches!(
            err,
            OfficeCryptoError::EncryptedPackageSizeOverflow { total_size } if total_size == u64::MAX
        ));
    }

    #[test]
    fn descriptor_without_password_encryptor_is_invalid() {
        let xml = format!(
            r#"<encryption xmlns="{ENCRYPTION_NS}"><keyData saltSize="16" blockSize="16" keyBits="256" hashSize="64" cipherAlgorithm="AES" cipherChaining="ChainingModeCBC" hashAlgorithm="SHA512" saltValue="AAAAAAAAAAAAAAAAAAAAAA=="/><dataIntegrity encryptedHmacKey="" encryptedHmacValue=""/></encryption>"#
        );
        let mut bytes = vec![4, 0, 4, 0, 0x40, 0, 0, 0];
        bytes.extend_from_slice(xml.as_bytes());

        let err = parse_agile_encryption_info(&bytes).expect_err("missing encryptor");
        assert!(matches!(
            err,
            OfficeCryptoError::InvalidFormat(msg) if msg.contains("encryptedKey")
        ));
    }
}

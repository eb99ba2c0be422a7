use thiserror::Error;

#[derive(Debug, Error)]
pub enum OfficeCryptoError {
    #[error("invalid password")]
    InvalidPassword,
    #[error("unsupported encryption: {0}")]
    UnsupportedEncryption(String),
    #[error("invalid encryption options: {0}")]
    InvalidOptions(String),
    #[error("invalid format: {0}")]
    InvalidFormat(String),
    #[error("EncryptedPackage reported invalid original size {total_size}")]
    EncryptedPackageSizeOverflow { total_size: u64 },
    #[error("spinCount {spin_count} exceeds the maximum of {max}")]
    SpinCountTooLarge { spin_count: u32, max: u32 },
    #[error("integrity check failed")]
    IntegrityCheckFailed,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

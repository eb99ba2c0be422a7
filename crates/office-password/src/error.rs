use thiserror::Error;

use crate::encryption::EncryptionError;
use crate::sandbox::{SandboxError, ScriptError};

/// Operator-facing message for a missing `encryption.secretKey`.
pub const MISSING_SECRET_MESSAGE: &str = "office-password extension uses encryption to store sensitive data and needs secret key to be defined. Please fill \"encryption.secretKey\" at the root of the config or disable encryption using \"encryption.enabled=false\".";

/// Operator-facing message when stored data was sealed under a different secret.
pub const DECRYPT_FAILED_MESSAGE: &str = "office-password data decrypt failed, looks like secret key value is different to the key used to encrypt sensitive data, make sure \"encryption.secretKey\" was not changed";

pub const PASSWORD_NOT_SET_MESSAGE: &str =
    "password was not set, you must supply a password when office-password is enabled";

pub const PASSWORD_NOT_SET_STATUS_CODE: u16 = 4000;

pub const SANDBOX_FAILURE_MESSAGE: &str = "Error while adding password to office file";

#[derive(Debug, Error)]
pub enum OfficePasswordError {
    #[error("{}", MISSING_SECRET_MESSAGE)]
    NoSecretConfigured,
    #[error("{}", DECRYPT_FAILED_MESSAGE)]
    DecryptFailed {
        #[source]
        source: EncryptionError,
    },
    #[error("{}", PASSWORD_NOT_SET_MESSAGE)]
    PasswordNotSet,
    /// Terminal failure of the sandboxed protection step. Never retried.
    #[error("{}", SANDBOX_FAILURE_MESSAGE)]
    SandboxFailure {
        #[source]
        source: ProtectionFailure,
    },
    #[error(transparent)]
    Encryption(EncryptionError),
}

impl OfficePasswordError {
    /// Structured status code for programmatic handling, when the error carries one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            OfficePasswordError::PasswordNotSet => Some(PASSWORD_NOT_SET_STATUS_CODE),
            _ => None,
        }
    }

    /// Weak errors are final and already carry their diagnostics.
    pub fn is_weak(&self) -> bool {
        matches!(self, OfficePasswordError::SandboxFailure { .. })
    }

    /// Failures from the write path. Only the missing-secret case gets a rewritten message.
    pub(crate) fn from_encrypt(err: EncryptionError) -> Self {
        match err {
            EncryptionError::NoSecret => OfficePasswordError::NoSecretConfigured,
            other => OfficePasswordError::Encryption(other),
        }
    }

    pub(crate) fn from_decrypt(err: EncryptionError) -> Self {
        match err {
            EncryptionError::NoSecret => OfficePasswordError::NoSecretConfigured,
            err @ EncryptionError::DecryptFailed(_) => {
                OfficePasswordError::DecryptFailed { source: err }
            }
            other => OfficePasswordError::Encryption(other),
        }
    }

    pub(crate) fn sandbox(source: ProtectionFailure) -> Self {
        OfficePasswordError::SandboxFailure { source }
    }
}

/// Underlying cause of a [`OfficePasswordError::SandboxFailure`].
#[derive(Debug, Error)]
pub enum ProtectionFailure {
    /// The worker ran and answered with an in-band `{ error }` object.
    #[error("{}", .0.message)]
    Script(ScriptError),
    /// The worker could not be reached, crashed, timed out or broke the protocol.
    #[error(transparent)]
    Transport(#[from] SandboxError),
}

impl ProtectionFailure {
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Stack reported by the worker. Transport failures have none.
    pub fn stack(&self) -> Option<&str> {
        match self {
            ProtectionFailure::Script(err) if !err.stack.is_empty() => Some(&err.stack),
            _ => None,
        }
    }
}

//! Request handling for the `office-password-worker` binary.
//!
//! The worker answers exactly one request per process. Whatever happens while protecting the
//! package (malformed base64, a non-OOXML payload, a panic deep inside the encryptor) is turned
//! into an in-band `{ "error": ... }` answer so the host can tell a failed document apart from a
//! broken worker.

use std::any::Any;
use std::io::{self, BufRead, Write};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Mutex;

use base64::engine::general_purpose;
use base64::Engine as _;
use office_password_crypto::{encrypt_package_to_ole, EncryptOptions, OfficeCryptoError};

use crate::sandbox::protocol::{invalid_json_line_error, read_line_bounded};
use crate::sandbox::{SandboxInput, SandboxOutput, ScriptError};

pub const DEFAULT_MAX_INPUT_BYTES: usize = 128 * 1024 * 1024;

static PANIC_LOCATION: Mutex<Option<String>> = Mutex::new(None);

#[derive(Debug, thiserror::Error)]
enum WorkerError {
    #[error("officeContent is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("failed to encrypt office package: {0}")]
    Crypto(#[from] OfficeCryptoError),
}

/// Records panic locations for the in-band error and keeps stderr quiet.
pub fn install_panic_hook() {
    panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()));
        if let Ok(mut slot) = PANIC_LOCATION.lock() {
            *slot = location;
        }
    }));
}

pub fn protect_office_content(input: &SandboxInput) -> SandboxOutput {
    match panic::catch_unwind(AssertUnwindSafe(|| encrypt_content(input))) {
        Ok(Ok(office_content)) => SandboxOutput::Success { office_content },
        Ok(Err(err)) => SandboxOutput::Failure {
            error: ScriptError::from_error(&err),
        },
        Err(payload) => SandboxOutput::Failure {
            error: panic_error(payload.as_ref()),
        },
    }
}

fn encrypt_content(input: &SandboxInput) -> Result<String, WorkerError> {
    let package = general_purpose::STANDARD.decode(input.office_content.as_bytes())?;
    let protected = encrypt_package_to_ole(&package, &input.password, EncryptOptions::default())?;
    Ok(general_purpose::STANDARD.encode(protected))
}

fn panic_error(payload: &(dyn Any + Send)) -> ScriptError {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    let message = format!("office-password worker panicked: {detail}");
    let location = PANIC_LOCATION.lock().ok().and_then(|mut slot| slot.take());
    let stack = match location {
        Some(location) => format!("{message}\n    at {location}"),
        None => message.clone(),
    };
    ScriptError { message, stack }
}

fn request_error(message: String) -> SandboxOutput {
    SandboxOutput::Failure {
        error: ScriptError {
            stack: message.clone(),
            message,
        },
    }
}

/// Reads one request line from `reader` and writes one answer line to `writer`.
///
/// Only I/O errors on `writer` are returned; everything else is answered in-band.
pub fn serve_one<R: BufRead, W: Write>(
    reader: &mut R,
    writer: &mut W,
    max_input_bytes: usize,
) -> io::Result<()> {
    let output = match read_line_bounded(reader, max_input_bytes) {
        Ok(Some(line)) => match serde_json::from_str::<SandboxInput>(line.trim()) {
            Ok(input) => protect_office_content(&input),
            Err(err) => request_error(invalid_json_line_error(err, line.trim())),
        },
        Ok(None) => request_error("no request received on stdin".to_string()),
        Err(err) => request_error(err.to_string()),
    };

    serde_json::to_writer(&mut *writer, &output)?;
    writer.write_all(b"\n")?;
    writer.flush()
}

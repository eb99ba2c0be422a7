//! Isolated execution of the document encryption step.
//!
//! The host never parses untrusted office packages in-process. Instead a [`SandboxExecutor`]
//! ships a [`SandboxInput`] to isolated logic and gets back a [`SandboxOutput`]:
//!
//! - input: `{ "officeContent": "<base64>", "password": "..." }`
//! - success: `{ "officeContent": "<base64>" }`
//! - in-band failure: `{ "error": { "message": "...", "stack": "..." } }`
//!
//! Transport-level failures (spawn, crash, timeout, protocol corruption) are reported through
//! [`SandboxError`] instead.

mod process;
pub(crate) mod protocol;

use std::fmt;
use std::future::Future;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

pub use process::{ProcessSandbox, SandboxSettings};

#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct SandboxInput {
    pub office_content: String,
    pub password: String,
}

impl SandboxInput {
    pub fn new(office_content: String, password: &str) -> Self {
        Self {
            office_content,
            password: password.to_string(),
        }
    }
}

impl fmt::Debug for SandboxInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SandboxInput")
            .field("office_content_len", &self.office_content.len())
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Result object produced by the isolated logic.
///
/// `Failure` is listed first so an object carrying `error` is never read as a success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SandboxOutput {
    Failure {
        error: ScriptError,
    },
    Success {
        #[serde(rename = "officeContent")]
        office_content: String,
    },
}

/// Structured error that crosses the isolation boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptError {
    pub message: String,
    #[serde(default)]
    pub stack: String,
}

impl ScriptError {
    /// `stack` is the error followed by its `source()` chain, one cause per line.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut stack = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            stack.push_str("\n    caused by: ");
            stack.push_str(&cause.to_string());
            source = cause.source();
        }
        Self {
            message: err.to_string(),
            stack,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("failed to spawn office-password worker {path:?}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("office-password worker I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("office-password worker protocol error: {0}")]
    Protocol(String),
    #[error("office-password worker timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("office-password worker exited without a result ({status}): {stderr}")]
    Crashed { status: String, stderr: String },
    #[error("office-password worker task failed: {0}")]
    Task(String),
    #[error("office-password sandbox is shut down")]
    Closed,
}

/// Runs the document encryption step in an isolated context.
pub trait SandboxExecutor: Send + Sync {
    fn execute(
        &self,
        input: SandboxInput,
    ) -> impl Future<Output = Result<SandboxOutput, SandboxError>> + Send;
}

//! Host configuration.
//!
//! ```json
//! {
//!   "encryption": { "secretKey": "...", "enabled": true },
//!   "officePassword": { "workerPath": "/usr/lib/office-password-worker", "timeoutMs": 30000 }
//! }
//! ```
//!
//! `OFFICE_PASSWORD_SECRET_KEY`, `OFFICE_PASSWORD_WORKER` and `OFFICE_PASSWORD_TIMEOUT_MS`
//! override the file values.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::sandbox::SandboxSettings;

pub const ENV_SECRET_KEY: &str = "OFFICE_PASSWORD_SECRET_KEY";
pub const ENV_WORKER_PATH: &str = "OFFICE_PASSWORD_WORKER";
pub const ENV_TIMEOUT_MS: &str = "OFFICE_PASSWORD_TIMEOUT_MS";

const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_MAX_OUTPUT_BYTES: usize = 128 * 1024 * 1024;

// Hard caps applied to whatever the config asks for.
const MAX_TIMEOUT_MS: u64 = 10 * 60 * 1_000;
const MAX_CONCURRENCY: usize = 64;
const MAX_OUTPUT_BYTES: usize = 1024 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid value for {name}: {value:?}")]
    InvalidEnv { name: &'static str, value: String },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub encryption: EncryptionConfig,
    pub office_password: OfficePasswordConfig,
}

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EncryptionConfig {
    pub secret_key: Option<String>,
    pub enabled: bool,
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            secret_key: None,
            enabled: true,
        }
    }
}

impl fmt::Debug for EncryptionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionConfig")
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("enabled", &self.enabled)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OfficePasswordConfig {
    /// Worker binary. Defaults to `office-password-worker` next to the current executable.
    pub worker_path: Option<PathBuf>,
    /// `0` means "use the cap".
    pub timeout_ms: u64,
    /// `0` means "one per available CPU".
    pub max_concurrency: usize,
    /// Bound on a single protocol line in either direction.
    pub max_output_bytes: usize,
}

impl Default for OfficePasswordConfig {
    fn default() -> Self {
        Self {
            worker_path: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_concurrency: 0,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

impl Config {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Reads `path` when given (defaults otherwise) and applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_path(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    fn apply_overrides_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(secret) = lookup(ENV_SECRET_KEY).filter(|v| !v.is_empty()) {
            self.encryption.secret_key = Some(secret);
        }
        if let Some(path) = lookup(ENV_WORKER_PATH).filter(|v| !v.trim().is_empty()) {
            self.office_password.worker_path = Some(PathBuf::from(path));
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_MS) {
            self.office_password.timeout_ms =
                raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                    name: ENV_TIMEOUT_MS,
                    value: raw.clone(),
                })?;
        }
        Ok(())
    }

    /// Effective sandbox limits with every value clamped to its hard cap.
    pub fn sandbox_settings(&self) -> SandboxSettings {
        let cfg = &self.office_password;
        let timeout_ms = match cfg.timeout_ms {
            0 => MAX_TIMEOUT_MS,
            requested => requested.min(MAX_TIMEOUT_MS),
        };
        let max_concurrency = match cfg.max_concurrency {
            0 => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            requested => requested,
        }
        .clamp(1, MAX_CONCURRENCY);
        let max_output_bytes = cfg.max_output_bytes.clamp(1024, MAX_OUTPUT_BYTES);

        SandboxSettings {
            worker_path: cfg
                .worker_path
                .clone()
                .unwrap_or_else(SandboxSettings::default_worker_path),
            timeout_ms,
            max_concurrency,
            max_output_bytes,
        }
    }
}

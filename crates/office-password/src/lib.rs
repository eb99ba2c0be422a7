//! Password protection for rendered office reports.
//!
//! - [`SecretFieldGuard`] seals `officePassword.passwordRaw` into `passwordSecure` on every
//!   template write, using the process-wide root secret held by [`EncryptionService`].
//! - [`OfficePasswordProtector`] runs after rendering: it decides whether the output is an office
//!   package that must be protected, resolves the password and hands the package to a
//!   [`SandboxExecutor`].
//! - [`ProcessSandbox`] runs the MS-OFFCRYPTO Agile encryption from `office-password-crypto`
//!   inside the `office-password-worker` child process.

pub mod config;
pub mod decision;
pub mod encryption;
pub mod error;
pub mod guard;
pub mod kind;
pub mod model;
pub mod sandbox;
pub mod schema;
pub mod store;
pub mod worker;

pub use crate::config::Config;
pub use crate::decision::{
    OfficePasswordProtector, PreviewContent, PreviewOptions, PreviewResponder, ProtectionOutcome,
    RenderOptions, RenderRequest, RenderResponse, ResponseMeta, SkipReason,
};
pub use crate::encryption::{EncryptionError, EncryptionService};
pub use crate::error::{OfficePasswordError, ProtectionFailure};
pub use crate::guard::SecretFieldGuard;
pub use crate::kind::OfficeDocumentKind;
pub use crate::model::{OfficePasswordSettings, Template, TemplatePatch, TemplateUpdate};
pub use crate::sandbox::{
    ProcessSandbox, SandboxError, SandboxExecutor, SandboxInput, SandboxOutput, SandboxSettings,
    ScriptError,
};
pub use crate::store::{StoreError, TemplateCollection};

/// The write hooks and the render policy wired to one [`EncryptionService`].
#[derive(Debug, Clone)]
pub struct OfficePassword<E> {
    guard: SecretFieldGuard,
    protector: OfficePasswordProtector<E>,
}

impl OfficePassword<ProcessSandbox> {
    pub fn from_config(config: &Config) -> Self {
        Self::with_executor(
            EncryptionService::from_config(&config.encryption),
            ProcessSandbox::new(config.sandbox_settings()),
        )
    }
}

impl<E: SandboxExecutor> OfficePassword<E> {
    pub fn with_executor(encryption: EncryptionService, executor: E) -> Self {
        Self {
            guard: SecretFieldGuard::new(encryption.clone()),
            protector: OfficePasswordProtector::new(encryption, executor),
        }
    }

    pub fn guard(&self) -> &SecretFieldGuard {
        &self.guard
    }

    pub fn protector(&self) -> &OfficePasswordProtector<E> {
        &self.protector
    }

    /// A fresh in-memory template collection guarded by this instance's hooks.
    pub fn template_collection(&self) -> TemplateCollection {
        TemplateCollection::new(self.guard.clone())
    }
}

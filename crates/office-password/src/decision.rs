//! After-render policy: decides whether a rendered report gets password protected, which
//! password to use and where the protected bytes go.

use base64::engine::general_purpose;
use base64::Engine as _;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::encryption::EncryptionService;
use crate::error::{OfficePasswordError, ProtectionFailure};
use crate::kind::OfficeDocumentKind;
use crate::model::{OfficePasswordSettings, Template};
use crate::sandbox::{SandboxError, SandboxExecutor, SandboxInput, SandboxOutput};

#[derive(Debug, Clone, Default)]
pub struct RenderRequest {
    pub template: Template,
    pub options: RenderOptions,
}

#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    pub preview: bool,
    /// Binary already prepared for the preview response, if any.
    pub preview_content: Option<PreviewContent>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreviewContent {
    pub content: Vec<u8>,
    pub file_extension: String,
    pub public_uri: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderResponse {
    pub content: Vec<u8>,
    pub meta: ResponseMeta,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseMeta {
    pub content_type: Option<String>,
    /// Not consulted by the policy; carried for [`PreviewResponder`] implementations.
    pub file_extension: Option<String>,
    /// Set by office recipes; wins over `content_type` when recognized.
    pub office_document_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewOptions {
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_uri: Option<String>,
}

/// Builds the preview response for protected office content.
pub trait PreviewResponder: Send + Sync {
    fn preview(
        &self,
        response: &mut RenderResponse,
        content: Vec<u8>,
        kind: OfficeDocumentKind,
        options: PreviewOptions,
    );
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No `officePassword` settings, or `enabled: false`.
    Disabled,
    NotOfficeDocument,
    /// Preview requested but no preview binary was prepared.
    PreviewWithoutContent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectionOutcome {
    Protected {
        kind: OfficeDocumentKind,
        preview: bool,
    },
    Skipped(SkipReason),
}

/// Runs the protection policy for one render.
#[derive(Debug, Clone)]
pub struct OfficePasswordProtector<E> {
    encryption: EncryptionService,
    executor: E,
}

impl<E: SandboxExecutor> OfficePasswordProtector<E> {
    pub fn new(encryption: EncryptionService, executor: E) -> Self {
        Self {
            encryption,
            executor,
        }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Protects `response` in place (or hands the protected preview to `responder`).
    ///
    /// Skips are not errors. Password resolution errors are hard failures of the render, and
    /// sandbox failures surface as the weak [`OfficePasswordError::SandboxFailure`].
    pub async fn protect_rendered_output(
        &self,
        request: &RenderRequest,
        response: &mut RenderResponse,
        responder: &dyn PreviewResponder,
    ) -> Result<ProtectionOutcome, OfficePasswordError> {
        let Some(settings) = request
            .template
            .office_password
            .as_ref()
            .filter(|settings| settings.is_enabled())
        else {
            return Ok(ProtectionOutcome::Skipped(SkipReason::Disabled));
        };

        let target = match detect_target(request, response) {
            Ok(target) => target,
            Err(reason) => {
                debug!("Skipping office-password generation ({reason:?})");
                return Ok(ProtectionOutcome::Skipped(reason));
            }
        };
        let kind = target.kind();

        let password = self.resolve_password(settings).await?;

        debug!("office-password starting to add password to office file \"{kind}\"");
        let source = match &target {
            Target::Preview { content, .. } => content.content.as_slice(),
            Target::Main(_) => response.content.as_slice(),
        };
        let input = SandboxInput::new(general_purpose::STANDARD.encode(source), &password);
        drop(password);

        let protected = self.run_sandbox(input).await?;
        debug!("office-password finished adding password to office file \"{kind}\"");

        match target {
            Target::Preview { kind, content } => {
                let options = PreviewOptions {
                    enabled: true,
                    public_uri: content.public_uri.clone(),
                };
                responder.preview(response, protected, kind, options);
                Ok(ProtectionOutcome::Protected {
                    kind,
                    preview: true,
                })
            }
            Target::Main(kind) => {
                response.content = protected;
                Ok(ProtectionOutcome::Protected {
                    kind,
                    preview: false,
                })
            }
        }
    }

    async fn resolve_password(
        &self,
        settings: &OfficePasswordSettings,
    ) -> Result<Zeroizing<String>, OfficePasswordError> {
        if let Some(raw) = settings.raw_password() {
            if settings.secure_password().is_some() {
                debug!("office-password using passwordRaw; ignoring stored passwordSecure");
            }
            return Ok(Zeroizing::new(raw.to_string()));
        }

        let Some(secure) = settings.secure_password() else {
            return Err(OfficePasswordError::PasswordNotSet);
        };
        self.encryption
            .decrypt(secure)
            .await
            .map(Zeroizing::new)
            .map_err(OfficePasswordError::from_decrypt)
    }

    async fn run_sandbox(&self, input: SandboxInput) -> Result<Vec<u8>, OfficePasswordError> {
        let failure = match self.executor.execute(input).await {
            Ok(SandboxOutput::Success { office_content }) => {
                match general_purpose::STANDARD.decode(office_content.as_bytes()) {
                    Ok(bytes) => return Ok(bytes),
                    Err(err) => ProtectionFailure::Transport(SandboxError::Protocol(format!(
                        "worker returned invalid base64 officeContent: {err}"
                    ))),
                }
            }
            Ok(SandboxOutput::Failure { error }) => ProtectionFailure::Script(error),
            Err(err) => ProtectionFailure::Transport(err),
        };
        warn!("Error while adding password to office file: {failure}");
        Err(OfficePasswordError::sandbox(failure))
    }
}

enum Target<'a> {
    Main(OfficeDocumentKind),
    Preview {
        kind: OfficeDocumentKind,
        content: &'a PreviewContent,
    },
}

impl Target<'_> {
    fn kind(&self) -> OfficeDocumentKind {
        match self {
            Target::Main(kind) | Target::Preview { kind, .. } => *kind,
        }
    }
}

fn detect_target<'a>(
    request: &'a RenderRequest,
    response: &RenderResponse,
) -> Result<Target<'a>, SkipReason> {
    if request.options.preview {
        let content = request
            .options
            .preview_content
            .as_ref()
            .ok_or(SkipReason::PreviewWithoutContent)?;
        let kind = OfficeDocumentKind::from_extension(&content.file_extension)
            .ok_or(SkipReason::NotOfficeDocument)?;
        return Ok(Target::Preview { kind, content });
    }

    let meta = &response.meta;
    meta.office_document_type
        .as_deref()
        .and_then(OfficeDocumentKind::from_extension)
        .or_else(|| {
            meta.content_type
                .as_deref()
                .and_then(OfficeDocumentKind::from_content_type)
        })
        .map(Target::Main)
        .ok_or(SkipReason::NotOfficeDocument)
}

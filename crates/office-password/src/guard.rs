use log::debug;

use crate::encryption::EncryptionService;
use crate::error::OfficePasswordError;
use crate::model::{OfficePasswordSettings, Template, TemplateUpdate};

/// Store hooks that replace `passwordRaw` with its sealed form before a write is applied.
///
/// Both hooks only touch the in-flight payload. On failure the payload is left exactly as it was
/// and the caller must abort the write.
#[derive(Debug, Clone)]
pub struct SecretFieldGuard {
    encryption: EncryptionService,
}

impl SecretFieldGuard {
    pub fn new(encryption: EncryptionService) -> Self {
        Self { encryption }
    }

    pub async fn before_insert(&self, template: &mut Template) -> Result<(), OfficePasswordError> {
        match template.office_password.as_mut() {
            Some(settings) => self.seal(settings).await,
            None => Ok(()),
        }
    }

    /// Only inspects the `$set` payload; the stored record is not available here.
    pub async fn before_update(
        &self,
        update: &mut TemplateUpdate,
    ) -> Result<(), OfficePasswordError> {
        match update.set.office_password.as_mut() {
            Some(settings) => self.seal(settings).await,
            None => Ok(()),
        }
    }

    async fn seal(&self, settings: &mut OfficePasswordSettings) -> Result<(), OfficePasswordError> {
        let Some(raw) = settings.raw_password() else {
            return Ok(());
        };

        let sealed = self
            .encryption
            .encrypt(raw)
            .await
            .map_err(OfficePasswordError::from_encrypt)?;

        settings.password_secure = Some(sealed);
        settings.password_raw = None;
        settings.password_filled = Some(true);
        debug!("office-password sealed raw password before write");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encryption::EncryptionError;
    use crate::error::MISSING_SECRET_MESSAGE;
    use crate::model::TemplatePatch;
    use proptest::prelude::*;

    fn guard(secret: Option<&str>) -> SecretFieldGuard {
        SecretFieldGuard::new(EncryptionService::new(secret, true))
    }

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("tokio runtime")
    }

    #[tokio::test]
    async fn insert_seals_the_raw_password() {
        let guard = guard(Some("root"));
        let mut template = Template::new("invoice", "docx")
            .with_office_password(OfficePasswordSettings::with_raw_password("abc123"));

        guard.before_insert(&mut template).await.expect("insert hook");

        let settings = template.office_password.expect("settings");
        assert_eq!(settings.password_raw, None);
        assert_eq!(settings.password_filled, Some(true));
        let sealed = settings.password_secure.expect("sealed");
        assert!(!sealed.contains("abc123"));
        assert_eq!(
            guard.encryption.decrypt(&sealed).await.expect("decrypt"),
            "abc123"
        );
    }

    #[tokio::test]
    async fn missing_secret_aborts_with_the_remediation_message() {
        let guard = guard(None);
        let mut template = Template::new("invoice", "docx")
            .with_office_password(OfficePasswordSettings::with_raw_password("abc123"));
        let before = template.clone();

        let err = guard
            .before_insert(&mut template)
            .await
            .expect_err("no secret");

        assert!(matches!(err, OfficePasswordError::NoSecretConfigured));
        assert_eq!(err.to_string(), MISSING_SECRET_MESSAGE);
        assert_eq!(template, before, "payload must be untouched on failure");
    }

    #[tokio::test]
    async fn update_seals_only_the_set_payload() {
        let guard = guard(Some("root"));
        let mut update = TemplateUpdate::set(TemplatePatch {
            office_password: Some(OfficePasswordSettings::with_raw_password("new-password")),
            ..Default::default()
        });

        guard.before_update(&mut update).await.expect("update hook");

        let settings = update.set.office_password.expect("settings");
        assert_eq!(settings.password_raw, None);
        assert_eq!(settings.password_filled, Some(true));
        assert!(settings.password_secure.is_some());
        assert!(update.set.name.is_none());
    }

    #[tokio::test]
    async fn updates_without_a_raw_password_are_untouched() {
        let guard = guard(None);
        let settings = OfficePasswordSettings {
            password_secure: Some("sealed".to_string()),
            password_filled: Some(true),
            enabled: Some(false),
            ..Default::default()
        };
        let mut update = TemplateUpdate::set(TemplatePatch {
            office_password: Some(settings),
            ..Default::default()
        });
        let before = update.clone();

        // Twice, and without a secret: nothing to seal means nothing can fail.
        guard.before_update(&mut update).await.expect("first");
        guard.before_update(&mut update).await.expect("second");
        assert_eq!(update, before);

        let mut unrelated = TemplateUpdate::set(TemplatePatch {
            content: Some("<p>hello</p>".to_string()),
            ..Default::default()
        });
        guard.before_update(&mut unrelated).await.expect("unrelated");
        assert!(unrelated.set.office_password.is_none());
    }

    #[tokio::test]
    async fn empty_raw_password_is_ignored() {
        let guard = guard(Some("root"));
        let mut template = Template::new("invoice", "docx")
            .with_office_password(OfficePasswordSettings::with_raw_password(""));
        guard.before_insert(&mut template).await.expect("insert");
        let settings = template.office_password.expect("settings");
        assert_eq!(settings.password_raw.as_deref(), Some(""));
        assert!(settings.password_secure.is_none());
        assert!(settings.password_filled.is_none());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn any_non_empty_password_is_sealed_and_recoverable(password in ".{1,64}") {
            let rt = runtime();
            let guard = guard(Some("property-secret"));
            let mut template = Template::new("t", "xlsx")
                .with_office_password(OfficePasswordSettings::with_raw_password(password.clone()));

            rt.block_on(guard.before_insert(&mut template)).expect("insert hook");
            let settings = template.office_password.expect("settings");
            prop_assert_eq!(settings.password_raw.as_ref(), None);
            prop_assert_eq!(settings.password_filled, Some(true));

            let sealed = settings.password_secure.expect("sealed");
            let recovered = rt.block_on(guard.encryption.decrypt(&sealed)).expect("decrypt");
            prop_assert_eq!(recovered, password);
        }

        #[test]
        fn a_rotated_secret_never_decrypts(password in ".{1,32}") {
            let rt = runtime();
            let sealed = rt
                .block_on(EncryptionService::new(Some("secret-a"), true).encrypt(&password))
                .expect("encrypt");
            let err = rt
                .block_on(EncryptionService::new(Some("secret-b"), true).decrypt(&sealed))
                .expect_err("rotated");
            prop_assert!(matches!(err, EncryptionError::DecryptFailed(_)));
        }
    }
}

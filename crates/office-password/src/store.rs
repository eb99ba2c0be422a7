use std::collections::BTreeMap;

use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::OfficePasswordError;
use crate::guard::SecretFieldGuard;
use crate::model::{Template, TemplateUpdate};
use crate::schema::strip_hidden_fields;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Guard(#[from] OfficePasswordError),
    #[error("template {0:?} already exists")]
    Duplicate(String),
    #[error("template {0:?} not found")]
    NotFound(String),
    #[error("failed to serialize template: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// In-memory `templates` collection keyed by name.
///
/// Every write runs through [`SecretFieldGuard`] first; nothing is stored when the guard fails.
#[derive(Debug)]
pub struct TemplateCollection {
    guard: SecretFieldGuard,
    templates: RwLock<BTreeMap<String, Template>>,
}

impl TemplateCollection {
    pub fn new(guard: SecretFieldGuard) -> Self {
        Self {
            guard,
            templates: RwLock::new(BTreeMap::new()),
        }
    }

    pub async fn insert(&self, mut template: Template) -> Result<(), StoreError> {
        if self.templates.read().await.contains_key(&template.name) {
            return Err(StoreError::Duplicate(template.name));
        }
        self.guard.before_insert(&mut template).await?;

        let mut templates = self.templates.write().await;
        if templates.contains_key(&template.name) {
            return Err(StoreError::Duplicate(template.name));
        }
        templates.insert(template.name.clone(), template);
        Ok(())
    }

    /// Applies a `$set` update to the template called `name`.
    pub async fn update(&self, name: &str, mut update: TemplateUpdate) -> Result<(), StoreError> {
        if !self.templates.read().await.contains_key(name) {
            return Err(StoreError::NotFound(name.to_string()));
        }
        self.guard.before_update(&mut update).await?;

        let mut templates = self.templates.write().await;
        if let Some(new_name) = update.set.name.as_deref() {
            if new_name != name && templates.contains_key(new_name) {
                return Err(StoreError::Duplicate(new_name.to_string()));
            }
        }
        let Some(mut template) = templates.remove(name) else {
            return Err(StoreError::NotFound(name.to_string()));
        };
        update.apply_to(&mut template);
        templates.insert(template.name.clone(), template);
        Ok(())
    }

    /// The stored record, hidden fields included. Used by the render path.
    pub async fn find(&self, name: &str) -> Option<Template> {
        self.templates.read().await.get(name).cloned()
    }

    /// The record as exposed to API consumers, without non-visible fields.
    pub async fn find_public(&self, name: &str) -> Result<Option<Value>, StoreError> {
        let Some(template) = self.find(name).await else {
            return Ok(None);
        };
        let mut value = serde_json::to_value(template)?;
        strip_hidden_fields(&mut value);
        Ok(Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encryption::EncryptionService;
    use crate::model::{OfficePasswordSettings, TemplatePatch};
    use serde_json::json;

    fn collection(secret: Option<&str>) -> TemplateCollection {
        TemplateCollection::new(SecretFieldGuard::new(EncryptionService::new(secret, true)))
    }

    #[tokio::test]
    async fn stored_records_never_hold_the_raw_password() {
        let store = collection(Some("root"));
        store
            .insert(
                Template::new("invoice", "docx")
                    .with_office_password(OfficePasswordSettings::with_raw_password("abc123")),
            )
            .await
            .expect("insert");

        let stored = store.find("invoice").await.expect("stored");
        let settings = stored.office_password.expect("settings");
        assert_eq!(settings.password_raw, None);
        assert_eq!(settings.password_filled, Some(true));
        assert!(settings.password_secure.is_some());

        let public = store.find_public("invoice").await.expect("public").expect("found");
        assert_eq!(public["officePassword"], json!({ "passwordFilled": true }));
    }

    #[tokio::test]
    async fn failed_guard_aborts_the_write() {
        let store = collection(None);
        let err = store
            .insert(
                Template::new("invoice", "docx")
                    .with_office_password(OfficePasswordSettings::with_raw_password("abc123")),
            )
            .await
            .expect_err("no secret");
        assert!(matches!(err, StoreError::Guard(OfficePasswordError::NoSecretConfigured)));
        assert!(store.find("invoice").await.is_none());
    }

    #[tokio::test]
    async fn update_replaces_the_sealed_password_and_keeps_other_fields() {
        let store = collection(Some("root"));
        store
            .insert(
                Template::new("invoice", "docx")
                    .with_office_password(OfficePasswordSettings::with_raw_password("first")),
            )
            .await
            .expect("insert");
        let first = store
            .find("invoice")
            .await
            .and_then(|t| t.office_password)
            .and_then(|s| s.password_secure)
            .expect("first seal");

        store
            .update(
                "invoice",
                TemplateUpdate::set(TemplatePatch {
                    content: Some("<p>v2</p>".to_string()),
                    office_password: Some(OfficePasswordSettings::with_raw_password("second")),
                    ..Default::default()
                }),
            )
            .await
            .expect("update");

        let stored = store.find("invoice").await.expect("stored");
        assert_eq!(stored.content.as_deref(), Some("<p>v2</p>"));
        assert_eq!(stored.recipe, "docx");
        let settings = stored.office_password.expect("settings");
        assert_eq!(settings.password_raw, None);
        let second = settings.password_secure.expect("second seal");
        assert_ne!(second, first);
        let service = EncryptionService::new(Some("root"), true);
        assert_eq!(service.decrypt(&second).await.expect("decrypt"), "second");
    }

    #[tokio::test]
    async fn failed_update_leaves_the_record_unchanged() {
        let sealing = collection(Some("root"));
        sealing
            .insert(Template::new("invoice", "docx"))
            .await
            .expect("insert");
        let before = sealing.find("invoice").await.expect("stored");

        let store = collection(None);
        store.insert(before.clone()).await.expect("insert without password");
        let err = store
            .update(
                "invoice",
                TemplateUpdate::set(TemplatePatch {
                    name: Some("renamed".to_string()),
                    office_password: Some(OfficePasswordSettings::with_raw_password("pw")),
                    ..Default::default()
                }),
            )
            .await
            .expect_err("no secret");
        assert!(matches!(err, StoreError::Guard(_)));
        assert_eq!(store.find("invoice").await, Some(before));
        assert!(store.find("renamed").await.is_none());
    }

    #[tokio::test]
    async fn duplicates_and_unknown_names_are_rejected() {
        let store = collection(Some("root"));
        store
            .insert(Template::new("a", "xlsx"))
            .await
            .expect("insert");
        assert!(matches!(
            store.insert(Template::new("a", "xlsx")).await,
            Err(StoreError::Duplicate(_))
        ));
        assert!(matches!(
            store.update("missing", TemplateUpdate::default()).await,
            Err(StoreError::NotFound(_))
        ));
    }
}

//! Template records as seen by the store hooks and the render pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The `officePassword` sub-object of a template.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfficePasswordSettings {
    /// Write-only plaintext password. Cleared by the store hooks once sealed.
    #[serde(default)]
    pub password_raw: Option<String>,
    /// Serialized [`crate::encryption::EncryptedEnvelope`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_secure: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_filled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

impl OfficePasswordSettings {
    pub fn with_raw_password(password: impl Into<String>) -> Self {
        Self {
            password_raw: Some(password.into()),
            ..Default::default()
        }
    }

    /// Protection applies unless `enabled` is explicitly `false`.
    pub fn is_enabled(&self) -> bool {
        self.enabled != Some(false)
    }

    pub fn raw_password(&self) -> Option<&str> {
        self.password_raw.as_deref().filter(|raw| !raw.is_empty())
    }

    pub fn secure_password(&self) -> Option<&str> {
        self.password_secure
            .as_deref()
            .filter(|secure| !secure.is_empty())
    }

    /// Field-level merge used by `$set` updates: fields present in `patch` win.
    /// A new sealed value also drops any stale stored `password_raw`.
    pub(crate) fn merge_from(&mut self, patch: OfficePasswordSettings) {
        if patch.password_secure.is_some() {
            self.password_secure = patch.password_secure;
            self.password_raw = None;
        }
        if patch.password_raw.is_some() {
            self.password_raw = patch.password_raw;
        }
        if patch.password_filled.is_some() {
            self.password_filled = patch.password_filled;
        }
        if patch.enabled.is_some() {
            self.enabled = patch.enabled;
        }
    }
}

impl fmt::Debug for OfficePasswordSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OfficePasswordSettings")
            .field("password_raw", &self.password_raw.as_ref().map(|_| "<redacted>"))
            .field("password_secure", &self.password_secure.as_ref().map(|_| "<sealed>"))
            .field("password_filled", &self.password_filled)
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// A stored template. Fields this crate does not know about round-trip through `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub name: String,
    #[serde(default)]
    pub recipe: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub office_password: Option<OfficePasswordSettings>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Template {
    pub fn new(name: impl Into<String>, recipe: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            recipe: recipe.into(),
            ..Default::default()
        }
    }

    pub fn with_office_password(mut self, settings: OfficePasswordSettings) -> Self {
        self.office_password = Some(settings);
        self
    }
}

/// Partial template carried by an update. Only the fields being changed are present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplatePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipe: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub office_password: Option<OfficePasswordSettings>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `{ "$set": { ... } }` update document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateUpdate {
    #[serde(rename = "$set")]
    pub set: TemplatePatch,
}

impl TemplateUpdate {
    pub fn set(patch: TemplatePatch) -> Self {
        Self { set: patch }
    }

    pub(crate) fn apply_to(self, template: &mut Template) {
        let patch = self.set;
        if let Some(name) = patch.name {
            template.name = name;
        }
        if let Some(recipe) = patch.recipe {
            template.recipe = recipe;
        }
        if let Some(content) = patch.content {
            template.content = Some(content);
        }
        if let Some(settings) = patch.office_password {
            template
                .office_password
                .get_or_insert_with(OfficePasswordSettings::default)
                .merge_from(settings);
        }
        template.extra.extend(patch.extra);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn settings_use_camel_case_and_null_out_raw_password() {
        let settings = OfficePasswordSettings {
            password_raw: None,
            password_secure: Some("sealed".to_string()),
            password_filled: Some(true),
            enabled: None,
        };
        assert_eq!(
            serde_json::to_value(&settings).expect("serialize"),
            json!({ "passwordRaw": null, "passwordSecure": "sealed", "passwordFilled": true })
        );
    }

    #[test]
    fn missing_enabled_flag_means_enabled() {
        let settings: OfficePasswordSettings =
            serde_json::from_value(json!({ "passwordRaw": "abc" })).expect("deserialize");
        assert!(settings.is_enabled());
        assert!(!OfficePasswordSettings {
            enabled: Some(false),
            ..settings
        }
        .is_enabled());
    }

    #[test]
    fn empty_passwords_count_as_absent() {
        let settings = OfficePasswordSettings {
            password_raw: Some(String::new()),
            password_secure: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(settings.raw_password(), None);
        assert_eq!(settings.secure_password(), None);
    }

    #[test]
    fn debug_output_never_shows_the_raw_password() {
        let rendered = format!("{:?}", OfficePasswordSettings::with_raw_password("hunter2"));
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn unknown_template_fields_round_trip() {
        let value = json!({
            "name": "invoice",
            "recipe": "docx",
            "shortid": "abc",
            "officePassword": { "passwordSecure": "sealed", "passwordFilled": true }
        });
        let template: Template = serde_json::from_value(value).expect("deserialize");
        assert_eq!(template.extra.get("shortid"), Some(&json!("abc")));
        let back = serde_json::to_value(&template).expect("serialize");
        assert_eq!(back["shortid"], json!("abc"));
    }

    #[test]
    fn set_update_merges_office_password_fields() {
        let mut template = Template::new("invoice", "xlsx").with_office_password(
            OfficePasswordSettings {
                password_secure: Some("sealed".to_string()),
                password_filled: Some(true),
                ..Default::default()
            },
        );
        let update: TemplateUpdate =
            serde_json::from_value(json!({ "$set": { "officePassword": { "enabled": false } } }))
                .expect("deserialize update");

        update.apply_to(&mut template);

        let settings = template.office_password.expect("settings");
        assert_eq!(settings.enabled, Some(false));
        assert_eq!(settings.password_secure.as_deref(), Some("sealed"));
        assert_eq!(settings.password_filled, Some(true));
    }
}

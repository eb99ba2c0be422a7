//! Entity-schema contribution: the `OfficePasswordTemplateType` complex type and the
//! `officePassword` property it adds to templates.

use serde::Serialize;
use serde_json::Value;

pub const OFFICE_PASSWORD_TYPE_NAME: &str = "OfficePasswordTemplateType";
pub const TEMPLATE_PROPERTY_NAME: &str = "officePassword";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EdmType {
    #[serde(rename = "Edm.String")]
    String,
    #[serde(rename = "Edm.Boolean")]
    Boolean,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDef {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub edm_type: EdmType,
    pub visible: bool,
    /// The store seals this field at rest.
    pub encrypted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComplexType {
    pub name: &'static str,
    pub fields: Vec<FieldDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyDef {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub type_name: &'static str,
}

pub fn office_password_complex_type() -> ComplexType {
    let field = |name, edm_type, visible, encrypted| FieldDef {
        name,
        edm_type,
        visible,
        encrypted,
    };
    ComplexType {
        name: OFFICE_PASSWORD_TYPE_NAME,
        fields: vec![
            field("passwordRaw", EdmType::String, false, false),
            field("passwordSecure", EdmType::String, false, true),
            field("passwordFilled", EdmType::Boolean, true, false),
            field("enabled", EdmType::Boolean, true, false),
        ],
    }
}

/// Property contributed to the template entity type.
pub fn template_property() -> PropertyDef {
    PropertyDef {
        name: TEMPLATE_PROPERTY_NAME,
        type_name: OFFICE_PASSWORD_TYPE_NAME,
    }
}

/// Removes non-visible `officePassword` fields from a serialized template.
pub fn strip_hidden_fields(template: &mut Value) {
    let Some(settings) = template
        .get_mut(TEMPLATE_PROPERTY_NAME)
        .and_then(Value::as_object_mut)
    else {
        return;
    };
    for field in office_password_complex_type().fields {
        if !field.visible {
            settings.remove(field.name);
        }
    }
}

//! Resource and field descriptors, and their UI selection format.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub field_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_mandatory: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_available: Option<bool>,
}

impl Field {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: None,
            is_mandatory: None,
            is_available: None,
        }
    }

    pub fn with_type(mut self, field_type: impl Into<String>) -> Self {
        self.field_type = Some(field_type.into());
        self
    }

    pub fn mandatory(mut self) -> Self {
        self.is_mandatory = Some(true);
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.is_available = Some(false);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<Field>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires: Option<Vec<String>>,
}

impl Resource {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            fields: None,
            available: None,
            required: None,
            requires: None,
        }
    }

    pub fn with_fields(mut self, fields: Vec<Field>) -> Self {
        self.fields = Some(fields);
        self
    }

    pub fn requires(mut self, ids: &[&str]) -> Self {
        self.requires = Some(ids.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = Some(true);
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.available = Some(false);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceOption {
    pub name: String,
    pub value: String,
    pub disabled: bool,
    pub required: bool,
    pub requires: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldOption {
    pub name: String,
    pub value: String,
    #[serde(rename = "type")]
    pub field_type: Option<String>,
    pub is_mandatory: bool,
    pub disabled: bool,
}

/// A descriptor that can be rendered as a UI selection option.
pub trait UiDescriptor {
    type Output;

    fn to_ui(&self) -> Self::Output;
}

impl UiDescriptor for Resource {
    type Output = ResourceOption;

    fn to_ui(&self) -> ResourceOption {
        ResourceOption {
            name: self.title.clone(),
            value: self.id.clone(),
            disabled: !self.available.unwrap_or(true),
            required: self.required.unwrap_or(false),
            requires: self.requires.clone().unwrap_or_default(),
        }
    }
}

impl UiDescriptor for Field {
    type Output = FieldOption;

    fn to_ui(&self) -> FieldOption {
        let name = match &self.field_type {
            Some(field_type) => format!("{} [{}]", self.name, field_type),
            None => self.name.clone(),
        };

        FieldOption {
            name,
            value: self.name.clone(),
            field_type: self.field_type.clone(),
            is_mandatory: self.is_mandatory.unwrap_or(false),
            disabled: !self.is_available.unwrap_or(true),
        }
    }
}

/// `None` for an empty slice, never an empty vector.
pub fn convert_to_ui_format<D: UiDescriptor>(descriptors: &[D]) -> Option<Vec<D::Output>> {
    if descriptors.is_empty() {
        return None;
    }
    Some(descriptors.iter().map(UiDescriptor::to_ui).collect())
}

pub fn list_resources(resources: &[Resource]) -> Option<Vec<ResourceOption>> {
    convert_to_ui_format(resources)
}

pub fn list_fields(fields: &[Field]) -> Option<Vec<FieldOption>> {
    convert_to_ui_format(fields)
}

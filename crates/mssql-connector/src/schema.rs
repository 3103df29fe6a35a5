//! Per-kind attribute schema.
//!
//! Describes which attributes a resource kind accepts, which are required,
//! which are computed by the server, which force recreation when changed and
//! which are secrets.

use serde::{Deserialize, Serialize};

use crate::ids::ObjectKind;
use crate::operation::{AttributeSet, AttributeValue};
use crate::validate::ValidationError;

/// Data type of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeDataType {
    String,
    Integer,
    StringSet,
    Block,
}

/// Definition of one attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaAttribute {
    pub name: String,
    pub data_type: AttributeDataType,

    /// Must be set in configuration.
    #[serde(default)]
    pub required: bool,

    /// Filled in by Read when not configured.
    #[serde(default)]
    pub computed: bool,

    /// A change forces delete-then-create.
    #[serde(default)]
    pub force_new: bool,

    /// Never logged.
    #[serde(default)]
    pub sensitive: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl SchemaAttribute {
    /// Create an optional attribute with the given name and type.
    pub fn new(name: impl Into<String>, data_type: AttributeDataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            required: false,
            computed: false,
            force_new: false,
            sensitive: false,
            description: None,
        }
    }

    /// Mark this attribute as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Mark this attribute as computed.
    #[must_use]
    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    /// Mark this attribute as forcing replacement.
    #[must_use]
    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    /// Mark this attribute as sensitive.
    #[must_use]
    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Attribute schema of one resource kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSchema {
    pub kind: ObjectKind,
    pub attributes: Vec<SchemaAttribute>,
}

impl ResourceSchema {
    pub fn new(kind: ObjectKind) -> Self {
        Self {
            kind,
            attributes: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, attribute: SchemaAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn get_attribute(&self, name: &str) -> Option<&SchemaAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn required_attributes(&self) -> impl Iterator<Item = &SchemaAttribute> {
        self.attributes.iter().filter(|a| a.required)
    }

    pub fn force_new_attributes(&self) -> impl Iterator<Item = &SchemaAttribute> {
        self.attributes.iter().filter(|a| a.force_new)
    }

    /// Check that required attributes are present and non-empty, and that no
    /// unknown attribute is configured.
    pub fn check(&self, attrs: &AttributeSet) -> Result<(), ValidationError> {
        for attribute in self.required_attributes() {
            let missing = match attrs.get(&attribute.name) {
                None | Some(AttributeValue::Null) => true,
                Some(AttributeValue::String(s)) => s.is_empty(),
                Some(_) => false,
            };
            if missing {
                return Err(ValidationError::new(
                    attribute.name.clone(),
                    "required",
                    format!("{} is required for {}", attribute.name, self.kind),
                ));
            }
        }

        let mut unknown: Vec<&str> = attrs
            .names()
            .filter(|name| self.get_attribute(name).is_none())
            .collect();
        unknown.sort_unstable();
        if let Some(name) = unknown.first() {
            return Err(ValidationError::new(
                *name,
                "unknown_attribute",
                format!("{name} is not a valid attribute for {}", self.kind),
            ));
        }
        Ok(())
    }

    /// Force-new attributes whose value differs between `prior` and `planned`.
    pub fn replacement_attributes<'a>(
        &'a self,
        prior: &AttributeSet,
        planned: &AttributeSet,
    ) -> Vec<&'a str> {
        self.force_new_attributes()
            .filter(|a| {
                let before = prior.get(&a.name).unwrap_or(&AttributeValue::Null);
                let after = planned.get(&a.name).unwrap_or(&AttributeValue::Null);
                // Unset computed values are filled in by Read, not a change.
                if a.computed && after.is_null() {
                    return false;
                }
                !before.same_as(after)
            })
            .map(|a| a.name.as_str())
            .collect()
    }

    /// Copy of `attrs` with sensitive values masked, for logging.
    pub fn redact(&self, attrs: &AttributeSet) -> AttributeSet {
        attrs
            .iter()
            .map(|(name, value)| {
                let sensitive = self.get_attribute(name).is_some_and(|a| a.sensitive);
                let value = if sensitive && !value.is_null() {
                    AttributeValue::from("[REDACTED]")
                } else {
                    value.clone()
                };
                (name.clone(), value)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn login_schema() -> ResourceSchema {
        ResourceSchema::new(ObjectKind::Login)
            .with_attribute(SchemaAttribute::new("server", AttributeDataType::Block).required().force_new())
            .with_attribute(SchemaAttribute::new("login_name", AttributeDataType::String).required().force_new())
            .with_attribute(SchemaAttribute::new("password", AttributeDataType::String).required().sensitive())
            .with_attribute(SchemaAttribute::new("sid", AttributeDataType::String).computed().force_new())
    }

    #[test]
    fn test_check_required() {
        let schema = login_schema();
        let attrs = AttributeSet::new()
            .with("server", serde_json::Map::new())
            .with("login_name", "")
            .with("password", "x");
        let err = schema.check(&attrs).unwrap_err();
        assert_eq!(err.field, "login_name");
        assert_eq!(err.code, "required");
    }

    #[test]
    fn test_check_unknown_attribute() {
        let schema = login_schema();
        let attrs = AttributeSet::new()
            .with("server", serde_json::Map::new())
            .with("login_name", "app")
            .with("password", "x")
            .with("colour", "blue");
        let err = schema.check(&attrs).unwrap_err();
        assert_eq!(err.code, "unknown_attribute");
    }

    #[test]
    fn test_replacement_attributes() {
        let schema = login_schema();
        let prior = AttributeSet::new().with("login_name", "a").with("sid", "0x01").with("password", "x");
        let planned = AttributeSet::new().with("login_name", "b").with("password", "y");
        assert_eq!(schema.replacement_attributes(&prior, &planned), vec!["login_name"]);
    }

    #[test]
    fn test_redact() {
        let schema = login_schema();
        let attrs = AttributeSet::new().with("login_name", "app").with("password", "Secret1!");
        let redacted = schema.redact(&attrs);
        assert_eq!(redacted.get_string("password"), Some("[REDACTED]"));
        assert_eq!(redacted.get_string("login_name"), Some("app"));
    }
}

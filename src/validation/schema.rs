//! Declarative field schemas for JSON payloads.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

/// Expected JSON type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    Float,
    Bool,
    Email,
    Array,
    Object,
    Any,
}

impl FieldType {
    fn accepts(self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Integer => value.is_i64() || value.is_u64(),
            FieldType::Float => value.is_number(),
            FieldType::Bool => value.is_boolean(),
            FieldType::Email => value.as_str().is_some_and(is_valid_email),
            FieldType::Array => value.is_array(),
            FieldType::Object => value.is_object(),
            FieldType::Any => true,
        }
    }

    fn message(self, field: &str) -> String {
        match self {
            FieldType::String => format!("{field} must be a string"),
            FieldType::Integer => format!("{field} must be an integer"),
            FieldType::Float => format!("{field} must be a number"),
            FieldType::Bool => format!("{field} must be a boolean"),
            FieldType::Email => format!("{field} must be a valid email address"),
            FieldType::Array => format!("{field} must be an array"),
            FieldType::Object => format!("{field} must be an object"),
            FieldType::Any => String::new(),
        }
    }
}

/// One entry of a [`Schema`].
#[derive(Debug, Clone)]
pub struct FieldRule {
    pub name: String,
    pub kind: FieldType,
    pub required: bool,
}

/// Field name to human readable message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.insert(field.into(), message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (field, message)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{field}: {message}")?;
        }
        Ok(())
    }
}

impl std::error::Error for FieldErrors {}

/// Ordered list of field rules checked against a JSON object.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<FieldRule>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field rule.
    pub fn field(mut self, name: impl Into<String>, kind: FieldType, required: bool) -> Self {
        self.fields.push(FieldRule {
            name: name.into(),
            kind,
            required,
        });
        self
    }

    pub fn required(self, name: impl Into<String>, kind: FieldType) -> Self {
        self.field(name, kind, true)
    }

    pub fn optional(self, name: impl Into<String>, kind: FieldType) -> Self {
        self.field(name, kind, false)
    }

    pub fn fields(&self) -> &[FieldRule] {
        &self.fields
    }

    /// Check a payload. Objects are checked field by field; arrays are
    /// checked element by element and the first failing element is reported.
    pub fn validate(&self, value: &Value) -> Result<(), FieldErrors> {
        match value {
            Value::Object(_) => self.validate_object(value),
            Value::Array(items) => items.iter().try_for_each(|item| self.validate_object(item)),
            _ => {
                let mut errors = FieldErrors::new();
                errors.insert("$", "payload must be an object or an array of objects");
                Err(errors)
            }
        }
    }

    fn validate_object(&self, value: &Value) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        for rule in &self.fields {
            match value.get(&rule.name) {
                None | Some(Value::Null) => {
                    if rule.required {
                        errors.insert(&rule.name, format!("{} is a required field", rule.name));
                    }
                }
                Some(Value::String(s)) if s.is_empty() && rule.required => {
                    errors.insert(&rule.name, format!("{} is a required field", rule.name));
                }
                Some(field) => {
                    if !rule.kind.accepts(field) {
                        errors.insert(&rule.name, rule.kind.message(&rule.name));
                    }
                }
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Loose structural check: `local@domain.tld` without whitespace.
pub fn is_valid_email(email: &str) -> bool {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL
        .get_or_init(|| {
            Regex::new(r"^[^\s@<>()\[\],;:]+@[^\s@<>()\[\],;:]+\.[^\s@<>()\[\],;:.]+$")
                .expect("email regex is valid")
        })
        .is_match(email)
}

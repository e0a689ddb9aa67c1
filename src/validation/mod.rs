//! Payload validation subsystem.
//!
//! # Data Flow
//! ```text
//! Registration phase:
//!     Router::register_schema::<T>(Schema)
//!     → Validator (TypeId → Schema)
//!
//! Per request:
//!     Context::bind_json_validated::<T>()
//!     → body parsed to serde_json::Value
//!     → Schema::validate (field → message map on failure)
//!     → serde_json::from_value::<T>
//! ```
//!
//! # Design Decisions
//! - Schemas are declared once per type, never discovered per call
//! - A type without a registered schema always validates
//! - Error shape is a flat field → message map, ready to serialize

pub mod schema;

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

pub use schema::{is_valid_email, FieldErrors, FieldRule, FieldType, Schema};

/// Registry of schemas keyed by the Rust type they describe.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    schemas: HashMap<TypeId, Arc<Schema>>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the schema used for payloads bound to `T`.
    pub fn register<T: 'static>(&mut self, schema: Schema) {
        self.schemas.insert(TypeId::of::<T>(), Arc::new(schema));
    }

    pub fn schema_for<T: 'static>(&self) -> Option<&Schema> {
        self.schemas.get(&TypeId::of::<T>()).map(Arc::as_ref)
    }

    /// Validate a payload destined for `T`.
    pub fn validate<T: 'static>(&self, value: &Value) -> Result<(), FieldErrors> {
        match self.schema_for::<T>() {
            Some(schema) => schema.validate(value),
            None => Ok(()),
        }
    }
}

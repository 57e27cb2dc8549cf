use std::any::Any;

use serde_json::Value;

use super::{Payload, TypeDescriptor};

/// A generic wrapper around an arbitrary JSON value, used both as the
/// default "wrap the parsed route value" target for the structured router
/// and as the carrier for schemas flowing through `schema_output`/
/// `<route>_schema_input` ports.
#[derive(Debug, Clone)]
pub struct StructuredPayload {
    pub value: Value,
    pub schema: Option<Value>,
}

impl StructuredPayload {
    pub fn new(value: Value) -> Self {
        Self { value, schema: None }
    }

    pub fn with_schema(value: Value, schema: Value) -> Self {
        Self { value, schema: Some(schema) }
    }

    pub fn schema_only(schema: Value) -> Self {
        Self { value: Value::Null, schema: Some(schema) }
    }
}

impl Payload for StructuredPayload {
    fn descriptor(&self) -> TypeDescriptor {
        TypeDescriptor::scalar("Structured")
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

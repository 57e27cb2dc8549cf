use std::any::Any;

use super::{Payload, TypeDescriptor};

/// A single string payload — the carrier for text intended to contain a
/// JSON object routed by a `StructuredRouterTransformer`.
#[derive(Debug, Clone)]
pub struct TextPayload {
    pub content: String,
}

impl TextPayload {
    pub fn new(content: impl Into<String>) -> Self {
        Self { content: content.into() }
    }
}

impl Payload for TextPayload {
    fn descriptor(&self) -> TypeDescriptor {
        TypeDescriptor::scalar("Text")
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

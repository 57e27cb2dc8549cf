use std::any::Any;

use super::{Payload, TypeDescriptor};

/// A "role + content" message, the unit `ContextBuilder` assembles into
/// ordered lists for an LLM call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePayload {
    pub role: String,
    pub content: String,
}

impl MessagePayload {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self { role: role.into(), content: content.into() }
    }

    /// Produces a copy with a different role, leaving `self` untouched —
    /// role overrides never mutate the original payload.
    pub fn with_role(&self, role: impl Into<String>) -> Self {
        Self { role: role.into(), content: self.content.clone() }
    }
}

impl Payload for MessagePayload {
    fn descriptor(&self) -> TypeDescriptor {
        TypeDescriptor::scalar("Message")
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

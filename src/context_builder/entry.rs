use std::sync::Arc;

use futures::future::BoxFuture;

use crate::payload::{MessagePayload, Payload, TypeDescriptor};

/// Transforms a freshly received payload into the messages it contributes
/// to the built context. Returning an empty vec drops the payload from
/// this round without treating the entry as missing.
pub type EntryCallback =
    Arc<dyn Fn(Arc<dyn Payload>) -> BoxFuture<'static, Vec<MessagePayload>> + Send + Sync>;

/// One named slot in a `ContextBuilder`'s input map.
pub enum InputMapEntry {
    /// Fed by an `InputPort`; contributes its most recently received
    /// payload (if any) to each emission.
    Port {
        payload_type: TypeDescriptor,
        /// Overrides the contributed message's role, producing a copy
        /// rather than mutating the received payload.
        role: Option<String>,
        /// Whether the stored payload survives past the emission round it
        /// contributed to.
        persist: bool,
        /// An optional entry (declared with `[name]` at reference sites)
        /// is silently skipped, rather than suppressing the whole
        /// emission, when no payload has arrived yet.
        optional: bool,
        /// Defaults to `default_message_for` when absent.
        callback: Option<EntryCallback>,
    },
    /// A fixed message, always available.
    Constant { message: MessagePayload },
    /// A template string with `{name}` (mandatory) and `[name]` (optional)
    /// placeholders referencing other entries by name.
    Template {
        template: String,
        role: String,
        /// Entries that must be resolvable or this template is silently
        /// skipped for the round (distinct from a missing mandatory `Port`
        /// entry, which suppresses the *entire* emission).
        depends_on: Vec<String>,
    },
}

impl InputMapEntry {
    pub fn port(payload_type: TypeDescriptor) -> Self {
        InputMapEntry::Port { payload_type, role: None, persist: true, optional: false, callback: None }
    }

    pub fn optional_port(payload_type: TypeDescriptor) -> Self {
        InputMapEntry::Port { payload_type, role: None, persist: true, optional: true, callback: None }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        if let InputMapEntry::Port { role: slot, .. } = &mut self {
            *slot = Some(role.into());
        }
        self
    }

    pub fn transient(mut self) -> Self {
        if let InputMapEntry::Port { persist, .. } = &mut self {
            *persist = false;
        }
        self
    }

    pub fn with_callback(mut self, callback: EntryCallback) -> Self {
        if let InputMapEntry::Port { callback: slot, .. } = &mut self {
            *slot = Some(callback);
        }
        self
    }

    pub fn constant(role: impl Into<String>, content: impl Into<String>) -> Self {
        InputMapEntry::Constant { message: MessagePayload::new(role, content) }
    }

    pub fn template(
        template: impl Into<String>,
        role: impl Into<String>,
        depends_on: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        InputMapEntry::Template {
            template: template.into(),
            role: role.into(),
            depends_on: depends_on.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_optional(&self) -> bool {
        matches!(self, InputMapEntry::Port { optional: true, .. })
    }
}

/// The default payload-to-message conversion applied to a `Port` entry with
/// no explicit `callback`: a `MessagePayload` passes through (with the
/// role override applied as a copy), a `SequencePayload` is flattened into
/// one message per element (each element going through this same
/// conversion, recursively), and anything else is rendered to text and
/// wrapped in a message under the entry's role (or `"user"`).
pub fn default_message_for(payload: &Arc<dyn Payload>, role_override: Option<&str>) -> Vec<MessagePayload> {
    if let Some(message) = crate::payload::downcast::<MessagePayload>(payload.as_ref()) {
        let message = match role_override {
            Some(role) => message.with_role(role),
            None => message.clone(),
        };
        return vec![message];
    }

    if let Some(sequence) = crate::payload::downcast::<crate::payload::SequencePayload>(payload.as_ref()) {
        return sequence
            .items
            .iter()
            .flat_map(|item| default_message_for(item, role_override))
            .collect();
    }

    let role = role_override.unwrap_or("user").to_string();
    let content = render_payload_as_text(payload);
    vec![MessagePayload::new(role, content)]
}

/// Best-effort textual rendering of a payload for use inside templates and
/// the default message conversion.
pub fn render_payload_as_text(payload: &Arc<dyn Payload>) -> String {
    if let Some(message) = crate::payload::downcast::<MessagePayload>(payload.as_ref()) {
        return message.content.clone();
    }
    if let Some(text) = crate::payload::downcast::<crate::payload::TextPayload>(payload.as_ref()) {
        return text.content.clone();
    }
    if let Some(structured) = crate::payload::downcast::<crate::payload::StructuredPayload>(payload.as_ref()) {
        return structured.value.to_string();
    }
    if let Some(sequence) = crate::payload::downcast::<crate::payload::SequencePayload>(payload.as_ref()) {
        return sequence
            .items
            .iter()
            .map(render_payload_as_text)
            .collect::<Vec<_>>()
            .join("\n");
    }
    format!("{payload:?}")
}

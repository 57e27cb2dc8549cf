//! Assembles ordered message lists for LLM calls out of named port, constant,
//! and template entries.

mod builder;
mod entry;

pub use builder::{ContextBuilder, PlanCallback, PlanContext};
pub use entry::{default_message_for, render_payload_as_text, EntryCallback, InputMapEntry};

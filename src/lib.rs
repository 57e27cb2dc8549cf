//! A small async dataflow kernel: typed `Port`s move `Payload`s between
//! `Element`s, `FlowController` wires a callback up to a declarative map of
//! ports, `ContextBuilder` assembles ordered message lists for LLM calls,
//! and `StructuredRouterTransformer` demultiplexes JSON payloads across
//! routes by a discriminated-union schema.

pub mod context_builder;
pub mod element;
pub mod error;
pub mod flow;
pub mod payload;
pub mod ports;
pub mod router;
pub mod runtime;

pub use element::ElementHandle;
pub use error::KernelError;

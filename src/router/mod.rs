//! Demultiplexes JSON-shaped payloads across named routes by a composed
//! discriminated-union schema.

mod schema;
mod transformer;

pub use transformer::{RouteSpec, RouteTransform, StructuredRouterTransformer};

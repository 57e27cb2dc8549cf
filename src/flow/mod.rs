//! Declarative port wiring for elements whose behavior is "run a callback
//! whenever an input arrives, with typed access to every port's current
//! state" rather than hand-rolled port plumbing.

mod context;
mod controller;

pub use context::Context;
pub use controller::{FlowCallback, FlowController, FlowPortMap, FlowPortSpec};

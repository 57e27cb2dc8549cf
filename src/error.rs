//! Error taxonomy for the dataflow kernel.
//!
//! Each failure family named by the port/flow/composer contracts gets its
//! own `thiserror` enum; `KernelError` composes them for callers that don't
//! care which layer failed. Configuration and staging errors are meant to be
//! propagated to the caller; transport and callback errors are meant to be
//! logged and swallowed at the task boundary (see `ports::output` and
//! `flow::controller`).

use thiserror::Error;

/// Errors raised while connecting, staging, or emitting through a `Port`.
#[derive(Debug, Error, Clone)]
pub enum PortError {
    #[error(
        "cannot connect output '{output}' on element '{producer_element}' to '{input}' on \
         element '{consumer_element}': target is not an InputPort"
    )]
    WrongEndpointKind {
        output: String,
        input: String,
        producer_element: String,
        consumer_element: String,
    },

    #[error(
        "incompatible types connecting '{producer_element}'.'{output}' ({output_type}) to \
         '{consumer_element}'.'{input}' ({input_type})"
    )]
    IncompatibleTypes {
        output: String,
        input: String,
        producer_element: String,
        consumer_element: String,
        output_type: String,
        input_type: String,
    },

    #[error("staging error on output '{port}' of element '{element}': {reason}")]
    StagingTypeError {
        element: String,
        port: String,
        reason: String,
    },

    #[error("receive type error on input '{port}' of element '{element}': {reason}")]
    ReceiveTypeError {
        element: String,
        port: String,
        reason: String,
    },

    #[error("port '{port}' on element '{element}' is closed")]
    PortClosed { element: String, port: String },

    #[error("missing callback on port '{port}' of element '{element}'")]
    MissingCallback { element: String, port: String },

    #[error("'{item}' is not a declared item on output '{port}' of element '{element}'")]
    UnknownItem {
        element: String,
        port: String,
        item: String,
    },

    #[error(
        "emit called on '{port}' of element '{element}' before all required items were staged; \
         missing: {missing:?}"
    )]
    EmitNotReady {
        element: String,
        port: String,
        missing: Vec<String>,
    },
}

/// Errors raised while configuring or dispatching a `FlowController`.
#[derive(Debug, Error, Clone)]
pub enum FlowError {
    #[error("flow port configuration for {io_type} port '{alias}' must declare a payload_type or at least one pre-connected port")]
    MissingPayloadType { io_type: &'static str, alias: String },

    #[error("no flow port is declared with alias '{alias}'")]
    UnknownFlowPort { alias: String },

    #[error(transparent)]
    Port(#[from] PortError),
}

/// Errors raised while configuring or running a `ContextBuilder`.
#[derive(Debug, Error, Clone)]
pub enum ContextBuilderError {
    #[error("template '{template}' references unknown entry '{reference}'")]
    UnknownTemplateReference { template: String, reference: String },

    #[error("plan entry '{entry}' is not declared in the input map")]
    UnknownPlanEntry { entry: String },

    #[error(transparent)]
    Flow(#[from] FlowError),

    #[error(transparent)]
    Port(#[from] PortError),
}

/// Errors raised while routing through a `StructuredRouterTransformer`.
#[derive(Debug, Error, Clone)]
pub enum RouterError {
    #[error("route '{route_input}' text payload is not valid JSON: {reason}")]
    InvalidJson { route_input: String, reason: String },

    #[error("payload for '{route_input}' does not conform to the composed root schema: {reason}")]
    SchemaViolation { route_input: String, reason: String },

    #[error("route '{route}' is not declared in the routing map")]
    UnknownRoute { route: String },

    #[error(transparent)]
    Flow(#[from] FlowError),

    #[error(transparent)]
    Port(#[from] PortError),
}

/// Crate-wide error, composing the per-subsystem taxonomies above.
#[derive(Debug, Error)]
pub enum KernelError {
    #[error(transparent)]
    Port(#[from] PortError),

    #[error(transparent)]
    Flow(#[from] FlowError),

    #[error(transparent)]
    ContextBuilder(#[from] ContextBuilderError),

    #[error(transparent)]
    Router(#[from] RouterError),
}

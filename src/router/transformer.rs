use std::collections::HashMap;
use std::sync::{Arc, Weak};

use futures::future::BoxFuture;
use serde_json::{json, Value};
use tokio::sync::Mutex as TokioMutex;

use crate::error::RouterError;
use crate::payload::{downcast, Payload, StructuredPayload, TextPayload, TypeDescriptor};
use crate::ports::{InputPort, OutputPort, PortsDirectory, RequiredItem};

use super::schema::validate as validate_schema;

/// Converts a route's matched JSON value into the payload staged on its
/// output port. Defaults to wrapping the raw value in a `StructuredPayload`.
pub type RouteTransform = Arc<dyn Fn(Value) -> BoxFuture<'static, Arc<dyn Payload>> + Send + Sync>;

/// One declared route: the discriminator value it matches on, the JSON
/// sub-schema its payload must satisfy, and where its output goes.
pub struct RouteSpec {
    pub schema: Value,
    pub payload_type: TypeDescriptor,
    pub output_alias: String,
    pub transform: Option<RouteTransform>,
}

impl RouteSpec {
    pub fn new(schema: Value, payload_type: TypeDescriptor, output_alias: impl Into<String>) -> Self {
        Self { schema, payload_type, output_alias: output_alias.into(), transform: None }
    }

    pub fn with_transform(mut self, transform: RouteTransform) -> Self {
        self.transform = Some(transform);
        self
    }
}

/// Demultiplexes JSON-shaped text across named routes by a composed
/// discriminated-union schema: `{"route": "<name>", "<name>": { ... }}`.
/// Each route's matched sub-value is validated against that route's own
/// schema, transformed (or wrapped as-is), and emitted on that route's
/// output port.
///
/// A route's schema can be replaced at runtime by sending a
/// [`StructuredPayload`] with a `schema` on its `<route>_schema_input` port
/// — useful when a schema is itself produced upstream (e.g. generated from
/// a Pydantic-equivalent model defined elsewhere in the pipeline).
pub struct StructuredRouterTransformer {
    pub element_name: String,
    routes: TokioMutex<HashMap<String, RouteSpec>>,
    route_order: Vec<String>,
    directory: PortsDirectory,
}

impl StructuredRouterTransformer {
    pub fn new(
        element_name: impl Into<String>,
        routes: Vec<(String, RouteSpec)>,
    ) -> Arc<Self> {
        let element_name = element_name.into();
        let route_order: Vec<String> = routes.iter().map(|(name, _)| name.clone()).collect();

        Arc::new_cyclic(|weak: &Weak<StructuredRouterTransformer>| {
            let mut directory = PortsDirectory::new();

            {
                let weak = weak.clone();
                let unpack: crate::ports::UnpackCallback = Arc::new(move |payload| {
                    let weak = weak.clone();
                    Box::pin(async move {
                        if let Some(router) = weak.upgrade() {
                            if let Err(err) = router.route(payload).await {
                                tracing::warn!(
                                    element = %router.element_name,
                                    error = %err,
                                    "structured router failed to route payload",
                                );
                            }
                        }
                    })
                });
                let input = InputPort::new(
                    "text_input",
                    element_name.clone(),
                    TypeDescriptor::scalar("Text"),
                    unpack,
                );
                directory.add_input(input);
            }

            for (name, spec) in &routes {
                let output = OutputPort::new(
                    spec.output_alias.clone(),
                    element_name.clone(),
                    vec![RequiredItem { name: "value".to_string(), item_type: spec.payload_type.clone() }],
                    Arc::new(|mut items| {
                        Box::pin(async move { items.remove("value").expect("value staged before emit") })
                    }),
                    None,
                    true,
                );
                directory.add_output(output);

                let weak = weak.clone();
                let route_name = name.clone();
                let schema_unpack: crate::ports::UnpackCallback = Arc::new(move |payload| {
                    let weak = weak.clone();
                    let route_name = route_name.clone();
                    Box::pin(async move {
                        if let Some(router) = weak.upgrade() {
                            router.update_schema(&route_name, payload).await;
                        }
                    })
                });
                let schema_input = InputPort::new(
                    format!("{name}_schema_input"),
                    element_name.clone(),
                    TypeDescriptor::scalar("Structured"),
                    schema_unpack,
                );
                directory.add_input(schema_input);
            }

            StructuredRouterTransformer {
                element_name,
                routes: TokioMutex::new(routes.into_iter().collect()),
                route_order,
                directory,
            }
        })
    }

    pub fn input_port(&self, name: &str) -> Option<&Arc<InputPort>> {
        self.directory.input(name)
    }

    pub fn output_port(&self, name: &str) -> Option<&Arc<OutputPort>> {
        self.directory.output(name)
    }

    pub fn route_names(&self) -> &[String] {
        &self.route_order
    }

    async fn update_schema(&self, route: &str, payload: Arc<dyn Payload>) {
        let Some(structured) = downcast::<StructuredPayload>(payload.as_ref()) else { return };
        let Some(schema) = &structured.schema else { return };
        if let Some(spec) = self.routes.lock().await.get_mut(route) {
            spec.schema = schema.clone();
        }
    }

    /// Composes the current `{"route": <string>, "<name>": <schema>, ...}`
    /// root schema from every declared route. The discriminant itself is
    /// left unconstrained to a known route name here: that check happens
    /// against the live route table in `route()`, so an unknown route
    /// surfaces as `RouterError::UnknownRoute` rather than failing this
    /// envelope-shape validation as a `SchemaViolation`.
    pub async fn composed_schema(&self) -> Value {
        let routes = self.routes.lock().await;
        let mut properties = serde_json::Map::new();
        properties.insert("route".to_string(), json!({ "type": "string" }));
        for (name, spec) in routes.iter() {
            properties.insert(name.clone(), spec.schema.clone());
        }
        json!({
            "type": "object",
            "required": ["route"],
            "properties": properties,
        })
    }

    async fn route(self: &Arc<Self>, payload: Arc<dyn Payload>) -> Result<(), RouterError> {
        let content = downcast::<TextPayload>(payload.as_ref())
            .map(|text| text.content.clone())
            .unwrap_or_else(|| crate::context_builder::render_payload_as_text(&payload));

        let value: Value = serde_json::from_str(&content).map_err(|err| RouterError::InvalidJson {
            route_input: "text_input".to_string(),
            reason: err.to_string(),
        })?;

        let root_schema = self.composed_schema().await;
        validate_schema(&value, &root_schema).map_err(|reason| RouterError::SchemaViolation {
            route_input: "text_input".to_string(),
            reason,
        })?;

        let route_name = value
            .get("route")
            .and_then(Value::as_str)
            .ok_or_else(|| RouterError::UnknownRoute { route: "<missing>".to_string() })?
            .to_string();

        let spec_schema;
        let output_alias;
        let transform;
        {
            let routes = self.routes.lock().await;
            let spec = routes
                .get(&route_name)
                .ok_or_else(|| RouterError::UnknownRoute { route: route_name.clone() })?;
            spec_schema = spec.schema.clone();
            output_alias = spec.output_alias.clone();
            transform = spec.transform.clone();
        }

        let sub_value = value.get(&route_name).cloned().unwrap_or(Value::Null);
        validate_schema(&sub_value, &spec_schema).map_err(|reason| RouterError::SchemaViolation {
            route_input: route_name.clone(),
            reason,
        })?;

        let routed_payload = match transform {
            Some(transform) => transform(sub_value).await,
            None => Arc::new(StructuredPayload::new(sub_value)) as Arc<dyn Payload>,
        };

        let output = self
            .output_port(&output_alias)
            .ok_or_else(|| RouterError::UnknownRoute { route: route_name.clone() })?;
        output.stage("value", routed_payload).await.map_err(RouterError::from)
    }
}

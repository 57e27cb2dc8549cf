use std::collections::HashMap;
use std::sync::{Arc, Weak};

use futures::future::BoxFuture;

use crate::error::FlowError;
use crate::payload::{Payload, TypeDescriptor};
use crate::ports::{InputPort, OutputPort, PortsDirectory, RequiredItem};

/// How a single flow port alias is declared in a `FlowController`'s map.
///
/// The shorthand form (just a payload type) is what most ports need; the
/// full form adds `persist`, which controls whether an input's most
/// recently received payload survives past the callback invocation it
/// triggered or is cleared immediately after.
#[derive(Debug, Clone)]
pub struct FlowPortSpec {
    pub payload_type: TypeDescriptor,
    pub persist: bool,
}

impl FlowPortSpec {
    pub fn of(payload_type: TypeDescriptor) -> Self {
        Self { payload_type, persist: true }
    }

    pub fn transient(payload_type: TypeDescriptor) -> Self {
        Self { payload_type, persist: false }
    }
}

/// The callback a `FlowController` drives on every input receipt. Receives
/// a [`FlowPortMap`] giving typed access to every declared port's most
/// recent payload and a way to emit on declared outputs.
pub type FlowCallback = Arc<dyn Fn(FlowPortMap) -> BoxFuture<'static, ()> + Send + Sync>;

/// Drives a user callback off a declarative map of named input and output
/// ports, rather than requiring an `Element` to wire up ports by hand.
/// Every input receipt stores the payload under its alias and spawns the
/// callback; after the callback completes, a non-`persist` input's stored
/// payload is cleared so the next build sees it as absent again.
pub struct FlowController {
    pub element_name: String,
    directory: PortsDirectory,
    persist: HashMap<String, bool>,
    last_payloads: tokio::sync::Mutex<HashMap<String, Arc<dyn Payload>>>,
    build_fn: FlowCallback,
}

impl FlowController {
    pub fn new(
        element_name: impl Into<String>,
        inputs: HashMap<String, FlowPortSpec>,
        outputs: HashMap<String, TypeDescriptor>,
        build_fn: FlowCallback,
    ) -> Arc<Self> {
        let element_name = element_name.into();
        let persist: HashMap<String, bool> =
            inputs.iter().map(|(alias, spec)| (alias.clone(), spec.persist)).collect();

        Arc::new_cyclic(|weak: &Weak<FlowController>| {
            let mut directory = PortsDirectory::new();

            for (alias, spec) in &inputs {
                let weak = weak.clone();
                let alias_owned = alias.clone();
                let unpack: crate::ports::UnpackCallback = Arc::new(move |payload| {
                    let weak = weak.clone();
                    let alias = alias_owned.clone();
                    Box::pin(async move {
                        if let Some(controller) = weak.upgrade() {
                            controller.handle_receipt(alias, payload).await;
                        }
                    })
                });
                let input = InputPort::new(alias.clone(), element_name.clone(), spec.payload_type.clone(), unpack);
                directory.add_input(input);
            }

            for (alias, payload_type) in &outputs {
                let pack: crate::ports::PackCallback = Arc::new(|mut items| {
                    Box::pin(async move { items.remove("value").expect("value staged before emit") })
                });
                let output = OutputPort::new(
                    alias.clone(),
                    element_name.clone(),
                    vec![RequiredItem { name: "value".to_string(), item_type: payload_type.clone() }],
                    pack,
                    None,
                    true,
                );
                directory.add_output(output);
            }

            FlowController {
                element_name,
                directory,
                persist,
                last_payloads: tokio::sync::Mutex::new(HashMap::new()),
                build_fn,
            }
        })
    }

    async fn handle_receipt(self: &Arc<Self>, alias: String, payload: Arc<dyn Payload>) {
        self.last_payloads.lock().await.insert(alias.clone(), payload);

        let controller = self.clone();
        tokio::spawn(async move {
            let payloads = controller.last_payloads.lock().await.clone();
            let port_map = FlowPortMap {
                controller: controller.clone(),
                payloads,
                triggered_by: alias.clone(),
            };

            (controller.build_fn)(port_map).await;

            if !*controller.persist.get(&alias).unwrap_or(&true) {
                controller.last_payloads.lock().await.remove(&alias);
            }
        });
    }

    pub fn input_port(&self, alias: &str) -> Option<&Arc<InputPort>> {
        self.directory.input(alias)
    }

    pub fn output_port(&self, alias: &str) -> Option<&Arc<OutputPort>> {
        self.directory.output(alias)
    }

    pub fn input_aliases(&self) -> impl Iterator<Item = &str> {
        self.directory.input_names()
    }

    pub fn output_aliases(&self) -> impl Iterator<Item = &str> {
        self.directory.output_names()
    }
}

/// Snapshot of a `FlowController`'s port state passed into the user
/// callback: which input triggered this invocation, every input's most
/// recently received payload (if any), and the ability to emit on declared
/// outputs.
pub struct FlowPortMap {
    controller: Arc<FlowController>,
    payloads: HashMap<String, Arc<dyn Payload>>,
    triggered_by: String,
}

impl FlowPortMap {
    pub fn triggered_by(&self) -> &str {
        &self.triggered_by
    }

    pub fn input(&self, alias: &str) -> Option<Arc<dyn Payload>> {
        self.payloads.get(alias).cloned()
    }

    pub fn has_input(&self, alias: &str) -> bool {
        self.payloads.contains_key(alias)
    }

    /// Stages and emits `payload` on the output declared under `alias`.
    pub async fn emit(&self, alias: &str, payload: Arc<dyn Payload>) -> Result<(), FlowError> {
        let output = self
            .controller
            .output_port(alias)
            .ok_or_else(|| FlowError::UnknownFlowPort { alias: alias.to_string() })?;
        output.stage("value", payload).await.map_err(FlowError::from)
    }
}

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::{mpsc, Mutex as TokioMutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::PortError;
use crate::payload::Payload;

use super::input::InputPort;
use super::lifecycle::LifecycleManager;

/// Default bound on an output port's emission queue. Emission blocks once
/// the queue is full, which is how backpressure propagates upstream (see
/// the backpressure scenario in the design doc).
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

#[derive(Debug, Clone)]
pub struct RequiredItem {
    pub name: String,
    pub item_type: crate::payload::TypeDescriptor,
}

/// Packs a complete set of staged items into a single payload to emit.
pub type PackCallback = Arc<
    dyn Fn(HashMap<String, Arc<dyn Payload>>) -> BoxFuture<'static, Arc<dyn Payload>>
        + Send
        + Sync,
>;

/// Runs once per newly connected input, after the connection is wired up.
pub type OnConnectCallback =
    Arc<dyn Fn(Uuid, String) -> BoxFuture<'static, ()> + Send + Sync>;

/// A typed output endpoint on an `Element`.
///
/// Emission is queued rather than delivered inline: a background task
/// drains the queue one payload at a time and, for each payload, awaits
/// delivery to every connected input in connection order before moving on
/// to the next queued payload. That ordering is what guarantees a single
/// edge never reorders payloads and that two inputs fed by the same
/// output observe emissions in the same relative order.
pub struct OutputPort {
    pub id: Uuid,
    pub name: String,
    pub element_name: String,
    required_items: Vec<RequiredItem>,
    staged: TokioMutex<HashMap<String, Arc<dyn Payload>>>,
    pack_callback: PackCallback,
    on_connect_callback: Option<OnConnectCallback>,
    emit_when_ready: bool,
    inputs: Arc<TokioMutex<Vec<Arc<InputPort>>>>,
    /// Wrapped in `Option` so `close()` can drop it, which is what lets the
    /// drain task's `recv().await` loop see the channel close and return.
    sender: TokioMutex<Option<mpsc::Sender<Arc<dyn Payload>>>>,
    drain_task: TokioMutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl OutputPort {
    pub fn new(
        name: impl Into<String>,
        element_name: impl Into<String>,
        required_items: Vec<RequiredItem>,
        pack_callback: PackCallback,
        on_connect_callback: Option<OnConnectCallback>,
        emit_when_ready: bool,
    ) -> Arc<Self> {
        Self::with_capacity(
            name,
            element_name,
            required_items,
            pack_callback,
            on_connect_callback,
            emit_when_ready,
            DEFAULT_QUEUE_CAPACITY,
        )
    }

    pub fn with_capacity(
        name: impl Into<String>,
        element_name: impl Into<String>,
        required_items: Vec<RequiredItem>,
        pack_callback: PackCallback,
        on_connect_callback: Option<OnConnectCallback>,
        emit_when_ready: bool,
        queue_capacity: usize,
    ) -> Arc<Self> {
        let (sender, mut receiver) = mpsc::channel::<Arc<dyn Payload>>(queue_capacity);
        let inputs: Arc<TokioMutex<Vec<Arc<InputPort>>>> = Arc::new(TokioMutex::new(Vec::new()));

        let id = Uuid::new_v4();
        let name = name.into();
        let element_name = element_name.into();

        let drain_inputs = inputs.clone();
        let drain_id = id;
        let drain_name = name.clone();
        let drain_element = element_name.clone();
        let drain_task = tokio::spawn(async move {
            while let Some(payload) = receiver.recv().await {
                let targets = drain_inputs.lock().await.clone();
                for input in targets {
                    if let Err(err) = input.receive(payload.clone(), drain_id, &drain_name).await {
                        tracing::warn!(
                            output.element = %drain_element,
                            output.port = %drain_name,
                            input.port = %input.name,
                            error = %err,
                            "dropping payload: receiving input rejected it",
                        );
                    }
                }
            }
        });

        Arc::new(Self {
            id,
            name,
            element_name,
            required_items,
            staged: TokioMutex::new(HashMap::new()),
            pack_callback,
            on_connect_callback,
            emit_when_ready,
            inputs,
            sender: TokioMutex::new(Some(sender)),
            drain_task: TokioMutex::new(Some(drain_task)),
            closed: AtomicBool::new(false),
        })
    }

    /// Connects this output to `input`, appending it to the ordered list of
    /// delivery targets and running `on_connect_callback` if configured.
    pub async fn connect(self: &Arc<Self>, input: &Arc<InputPort>) -> Result<(), PortError> {
        if !crate::payload::TypeDescriptor::compatible(&self.descriptor(), &input.payload_type) {
            return Err(PortError::IncompatibleTypes {
                output: self.name.clone(),
                input: input.name.clone(),
                producer_element: self.element_name.clone(),
                consumer_element: input.element_name.clone(),
                output_type: self.descriptor().label(),
                input_type: input.payload_type.label(),
            });
        }

        self.inputs.lock().await.push(input.clone());
        input.register_output(self.id, self.name.clone()).await;
        LifecycleManager::global().register(self).await;

        if let Some(callback) = &self.on_connect_callback {
            callback(input.id, input.name.clone()).await;
        }
        Ok(())
    }

    pub async fn connected_input_count(&self) -> usize {
        self.inputs.lock().await.len()
    }

    /// The declared type of payloads this output emits. A single-item
    /// output's descriptor is that item's type; a multi-item output with no
    /// single dominant item is `Any`, matching the source system's
    /// "the packed result's shape is the packer's business" stance.
    pub fn descriptor(&self) -> crate::payload::TypeDescriptor {
        match self.required_items.as_slice() {
            [single] => single.item_type.clone(),
            _ => crate::payload::TypeDescriptor::Any,
        }
    }

    /// Stages one named item toward the next emission. Type-checks the
    /// value against the item's declared type.
    pub async fn stage(&self, item: &str, payload: Arc<dyn Payload>) -> Result<(), PortError> {
        let declared = self
            .required_items
            .iter()
            .find(|required| required.name == item)
            .ok_or_else(|| PortError::UnknownItem {
                element: self.element_name.clone(),
                port: self.name.clone(),
                item: item.to_string(),
            })?;

        super::input::validate_value(&payload, &declared.item_type).map_err(|reason| {
            PortError::StagingTypeError {
                element: self.element_name.clone(),
                port: self.name.clone(),
                reason,
            }
        })?;

        self.staged.lock().await.insert(item.to_string(), payload);

        if self.emit_when_ready && self.ready().await {
            self.emit().await?;
        }
        Ok(())
    }

    async fn ready(&self) -> bool {
        let staged = self.staged.lock().await;
        self.required_items.iter().all(|req| staged.contains_key(&req.name))
    }

    /// Packs everything currently staged and enqueues the result for
    /// delivery, then clears staged state. Errors if required items are
    /// still missing.
    pub async fn emit(&self) -> Result<(), PortError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PortError::PortClosed {
                element: self.element_name.clone(),
                port: self.name.clone(),
            });
        }

        let mut staged = self.staged.lock().await;
        let missing: Vec<String> = self
            .required_items
            .iter()
            .filter(|req| !staged.contains_key(&req.name))
            .map(|req| req.name.clone())
            .collect();
        if !missing.is_empty() {
            return Err(PortError::EmitNotReady {
                element: self.element_name.clone(),
                port: self.name.clone(),
                missing,
            });
        }

        let items = std::mem::take(&mut *staged);
        drop(staged);

        let packed = (self.pack_callback)(items).await;

        tracing::trace!(
            output.element = %self.element_name,
            output.port = %self.name,
            "queuing payload for delivery",
        );

        let sender = self.sender.lock().await;
        match sender.as_ref() {
            Some(sender) => sender.send(packed).await.map_err(|_| PortError::PortClosed {
                element: self.element_name.clone(),
                port: self.name.clone(),
            }),
            None => Err(PortError::PortClosed {
                element: self.element_name.clone(),
                port: self.name.clone(),
            }),
        }
    }

    /// Stops accepting new emissions, drops the sender half so the drain
    /// loop's `recv().await` returns `None` once the queue empties, and
    /// awaits the background delivery task up to `timeout`, aborting it if
    /// it doesn't finish in time.
    pub async fn close(&self, timeout: std::time::Duration) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.sender.lock().await.take();

        let handle = self.drain_task.lock().await.take();
        if let Some(handle) = handle {
            let abort_handle = handle.abort_handle();
            if tokio::time::timeout(timeout, handle).await.is_err() {
                abort_handle.abort();
                tracing::warn!(
                    output.element = %self.element_name,
                    output.port = %self.name,
                    "drain task aborted: pending deliveries may not have completed",
                );
            }
        }
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::PortError;
use crate::payload::{Payload, TypeDescriptor};

/// Callback invoked once per payload a port receives. May do async work;
/// the port awaits it before moving on to the next queued payload on the
/// same edge (see `Ports — compatibility, connection, validation` in the
/// design doc for the ordering guarantee this upholds).
pub type UnpackCallback =
    Arc<dyn Fn(Arc<dyn Payload>) -> BoxFuture<'static, ()> + Send + Sync>;

/// A typed input endpoint on an `Element`.
///
/// Receipt of a payload triggers exactly one invocation of
/// `unpack_callback` per connected output port's emission, serialized
/// per-port: a `tokio::sync::Mutex` plays the role of the single
/// `asyncio.Lock` the source system serializes `unpack_payload_callback`
/// invocations behind, so receipts from different outputs may interleave
/// at await points but never run the callback concurrently with itself.
pub struct InputPort {
    pub id: Uuid,
    pub name: String,
    pub element_name: String,
    pub payload_type: TypeDescriptor,
    unpack_callback: UnpackCallback,
    /// Ordered list of `(output_id, output_name)` this input is connected
    /// from, in connection order.
    connected_outputs: Mutex<Vec<(Uuid, String)>>,
    /// First successful receipt from a given output marks that edge
    /// "validated"; later receipts on the same edge skip the per-item type
    /// check.
    validation_cache: Mutex<HashMap<Uuid, bool>>,
    dispatch_lock: Mutex<()>,
    closed: std::sync::atomic::AtomicBool,
}

impl InputPort {
    pub fn new(
        name: impl Into<String>,
        element_name: impl Into<String>,
        payload_type: TypeDescriptor,
        unpack_callback: UnpackCallback,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            name: name.into(),
            element_name: element_name.into(),
            payload_type,
            unpack_callback,
            connected_outputs: Mutex::new(Vec::new()),
            validation_cache: Mutex::new(HashMap::new()),
            dispatch_lock: Mutex::new(()),
            closed: std::sync::atomic::AtomicBool::new(false),
        })
    }

    pub(crate) async fn register_output(&self, output_id: Uuid, output_name: String) {
        self.connected_outputs.lock().await.push((output_id, output_name));
        self.validation_cache.lock().await.insert(output_id, false);
    }

    pub async fn connected_output_count(&self) -> usize {
        self.connected_outputs.lock().await.len()
    }

    /// Receives a payload emitted by `from_id`/`from_name`. Validates the
    /// payload against `payload_type` on the first receipt from this edge
    /// only, then invokes `unpack_callback` under the per-input dispatch
    /// lock.
    pub async fn receive(
        &self,
        payload: Arc<dyn Payload>,
        from_id: Uuid,
        from_name: &str,
    ) -> Result<(), PortError> {
        if self.closed.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(PortError::PortClosed {
                element: self.element_name.clone(),
                port: self.name.clone(),
            });
        }

        let already_validated = {
            let cache = self.validation_cache.lock().await;
            *cache.get(&from_id).unwrap_or(&false)
        };

        if !already_validated {
            validate_value(&payload, &self.payload_type).map_err(|reason| {
                PortError::ReceiveTypeError {
                    element: self.element_name.clone(),
                    port: self.name.clone(),
                    reason,
                }
            })?;
        }

        tracing::trace!(
            input.element = %self.element_name,
            input.port = %self.name,
            output.port = %from_name,
            "receiving payload",
        );

        {
            let _guard = self.dispatch_lock.lock().await;
            (self.unpack_callback)(payload).await;
        }

        self.validation_cache.lock().await.insert(from_id, true);
        Ok(())
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, std::sync::atomic::Ordering::SeqCst);
    }
}

/// Validates a concrete payload against a declared type the same way
/// `compatible()` distributes over unions and sequences, but against an
/// actual value rather than two declared types: a declared `Seq<T>` input
/// requires a non-empty `SequencePayload` whose element type is compatible
/// with `T`.
pub(crate) fn validate_value(
    payload: &Arc<dyn Payload>,
    declared: &TypeDescriptor,
) -> Result<(), String> {
    if matches!(declared, TypeDescriptor::Any) {
        return Ok(());
    }

    if let TypeDescriptor::Seq(element_ty) = declared {
        if let Some(seq) = crate::payload::downcast::<crate::payload::SequencePayload>(payload.as_ref()) {
            if seq.items.is_empty() {
                return Err(format!(
                    "expected a non-empty sequence of {}, got an empty sequence",
                    element_ty.label()
                ));
            }
            if !TypeDescriptor::compatible(&seq.element_type, element_ty) {
                return Err(format!(
                    "sequence element type {} is not compatible with declared {}",
                    seq.element_type.label(),
                    element_ty.label()
                ));
            }
            return Ok(());
        }
        // A bare (non-sequence) value may still satisfy a Seq<T>-declared
        // input, per the seq/scalar distribution rule.
        if TypeDescriptor::compatible(&payload.descriptor(), element_ty) {
            return Ok(());
        }
        return Err(format!(
            "expected a sequence of {} (or a bare {}), got {}",
            element_ty.label(),
            element_ty.label(),
            payload.descriptor().label()
        ));
    }

    if TypeDescriptor::compatible(&payload.descriptor(), declared) {
        return Ok(());
    }

    Err(format!(
        "expected {}, got {}",
        declared.label(),
        payload.descriptor().label()
    ))
}

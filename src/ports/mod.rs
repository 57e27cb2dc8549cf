//! Typed connection points between `Element`s.
//!
//! An [`OutputPort`] queues emissions and delivers them, in connection
//! order, to every [`InputPort`] it is connected to; an `InputPort`
//! validates and dispatches each receipt through a single per-port lock.
//! [`PortsDirectory`] is the by-name lookup table an `Element` exposes its
//! ports through, and [`LifecycleManager`] tracks every output port ever
//! created so the process can shut them all down together.

mod directory;
mod input;
mod lifecycle;
mod output;

pub use directory::PortsDirectory;
pub use input::{InputPort, UnpackCallback};
pub use lifecycle::LifecycleManager;
pub use output::{OnConnectCallback, OutputPort, PackCallback, RequiredItem, DEFAULT_QUEUE_CAPACITY};

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::payload::{MessagePayload, Payload, TypeDescriptor};

    use super::*;

    fn text_required(name: &str) -> RequiredItem {
        RequiredItem { name: name.to_string(), item_type: TypeDescriptor::scalar("Message") }
    }

    fn identity_pack() -> PackCallback {
        Arc::new(|mut items| {
            Box::pin(async move { items.remove("value").expect("value staged") })
        })
    }

    #[tokio::test]
    async fn connecting_incompatible_types_is_rejected() {
        let output = OutputPort::new(
            "out",
            "producer",
            vec![text_required("value")],
            identity_pack(),
            None,
            true,
        );
        let input = InputPort::new(
            "in",
            "consumer",
            TypeDescriptor::scalar("Structured"),
            Arc::new(|_| Box::pin(async {})),
        );

        let err = output.connect(&input).await.unwrap_err();
        assert!(matches!(err, crate::error::PortError::IncompatibleTypes { .. }));
    }

    #[tokio::test]
    async fn connected_fan_out_preserves_emission_order() {
        let output = OutputPort::new(
            "out",
            "producer",
            vec![text_required("value")],
            identity_pack(),
            None,
            true,
        );

        let received: Arc<std::sync::Mutex<Vec<String>>> = Arc::new(std::sync::Mutex::new(Vec::new()));
        let received_clone = received.clone();
        let input = InputPort::new(
            "in",
            "consumer",
            TypeDescriptor::scalar("Message"),
            Arc::new(move |payload| {
                let received = received_clone.clone();
                Box::pin(async move {
                    let message = crate::payload::downcast::<MessagePayload>(payload.as_ref()).unwrap();
                    received.lock().unwrap().push(message.content.clone());
                })
            }),
        );

        output.connect(&input).await.unwrap();

        for i in 0..5 {
            output
                .stage("value", Arc::new(MessagePayload::new("user", format!("msg-{i}"))))
                .await
                .unwrap();
        }

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let got = received.lock().unwrap().clone();
        assert_eq!(got, vec!["msg-0", "msg-1", "msg-2", "msg-3", "msg-4"]);
    }

    #[tokio::test]
    async fn validation_only_runs_on_first_receipt_per_edge() {
        let counter = Arc::new(AtomicUsize::new(0));
        let output = OutputPort::new(
            "out",
            "producer",
            vec![text_required("value")],
            identity_pack(),
            None,
            true,
        );
        let counter_clone = counter.clone();
        let input = InputPort::new(
            "in",
            "consumer",
            TypeDescriptor::scalar("Message"),
            Arc::new(move |_payload| {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                Box::pin(async {})
            }),
        );
        output.connect(&input).await.unwrap();

        for _ in 0..3 {
            output
                .stage("value", Arc::new(MessagePayload::new("user", "hi")))
                .await
                .unwrap();
        }

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }
}

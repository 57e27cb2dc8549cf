//! End-to-end wiring across modules: a `FlowController` producing text,
//! connected through ports into a `ContextBuilder`, producing an ordered
//! message list.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use flowkernel::context_builder::{ContextBuilder, InputMapEntry};
use flowkernel::flow::{FlowCallback, FlowController, FlowPortSpec};
use flowkernel::payload::{downcast, MessagePayload, Payload, SequencePayload, TextPayload, TypeDescriptor};

#[tokio::test]
async fn flow_controller_output_feeds_a_context_builder_input() {
    let mut inputs = HashMap::new();
    inputs.insert("raw_text".to_string(), FlowPortSpec::of(TypeDescriptor::scalar("Text")));
    let mut outputs = HashMap::new();
    outputs.insert("greeting_output".to_string(), TypeDescriptor::scalar("Text"));

    let build_fn: FlowCallback = Arc::new(move |port_map| {
        Box::pin(async move {
            if let Some(payload) = port_map.input("raw_text") {
                let text = downcast::<TextPayload>(payload.as_ref()).unwrap();
                let greeting = TextPayload::new(format!("hello, {}", text.content));
                port_map.emit("greeting_output", Arc::new(greeting)).await.unwrap();
            }
        })
    });

    let flow = FlowController::new("greeter", inputs, outputs, build_fn);

    let entries = vec![
        ("system".to_string(), InputMapEntry::constant("system", "be friendly")),
        ("greeting".to_string(), InputMapEntry::port(TypeDescriptor::scalar("Text")).with_role("user")),
    ];
    let builder = ContextBuilder::new(
        "assembler",
        entries,
        None,
        None,
        Some(vec!["system".to_string(), "greeting".to_string()]),
    )
    .unwrap();

    let greeting_output = flow.output_port("greeting_output").unwrap();
    let greeting_input = builder.input_port("greeting").unwrap();
    greeting_output.connect(greeting_input).await.unwrap();

    let captured: Arc<tokio::sync::Mutex<Option<Vec<MessagePayload>>>> =
        Arc::new(tokio::sync::Mutex::new(None));
    let captured_clone = captured.clone();
    let sink_input = flowkernel::ports::InputPort::new(
        "sink",
        "observer",
        TypeDescriptor::seq(TypeDescriptor::scalar("Message")),
        Arc::new(move |payload| {
            let captured = captured_clone.clone();
            Box::pin(async move {
                let sequence = downcast::<SequencePayload>(payload.as_ref()).unwrap();
                let messages: Vec<MessagePayload> = sequence
                    .items
                    .iter()
                    .map(|item| downcast::<MessagePayload>(item.as_ref()).unwrap().clone())
                    .collect();
                *captured.lock().await = Some(messages);
            })
        }),
    );
    builder.output_port().connect(&sink_input).await.unwrap();

    let raw_input = flow.input_port("raw_text").unwrap();
    raw_input
        .receive(Arc::new(TextPayload::new("world")), uuid::Uuid::new_v4(), "caller")
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;

    let messages = captured.lock().await.clone().expect("context builder should have emitted");
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, "system");
    assert_eq!(messages[1].content, "hello, world");
    assert_eq!(messages[1].role, "user");
}

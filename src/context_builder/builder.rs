use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock, Weak};

use futures::future::BoxFuture;
use regex::Regex;

use crate::error::ContextBuilderError;
use crate::payload::{MessagePayload, Payload, SequencePayload, TypeDescriptor};
use crate::ports::{InputPort, OutputPort, PortsDirectory, RequiredItem};

use super::entry::{default_message_for, render_payload_as_text, InputMapEntry};

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{(\w+)\}|\[(\w+)\]").expect("valid placeholder pattern"))
}

/// A plan entry (in `emit_order`, a `trigger_map` list, or returned from a
/// `build_fn`) written as `[name]` denotes an optional slot: if it can't be
/// resolved this round, it's skipped rather than suppressing the whole
/// emission, regardless of whether the entry itself was declared optional.
/// Returns the bare entry name and whether the bracket marker was present.
fn strip_plan_optional_marker(raw: &str) -> (&str, bool) {
    if raw.len() >= 2 && raw.starts_with('[') && raw.ends_with(']') {
        (&raw[1..raw.len() - 1], true)
    } else {
        (raw, false)
    }
}

/// What the builder was asked to emit for, handed to a `build_fn` plan
/// callback: which entry just arrived, and which entries currently have a
/// resolvable value.
pub struct PlanContext {
    pub triggered_by: String,
    pub available: HashSet<String>,
}

/// Custom emission-plan logic; highest priority of the three selection
/// mechanisms when present. Returning `None` suppresses the round.
pub type PlanCallback =
    Arc<dyn Fn(PlanContext) -> BoxFuture<'static, Option<Vec<String>>> + Send + Sync>;

/// Assembles an ordered list of `MessagePayload`s — typically the turns of
/// an LLM conversation — out of named `InputMapEntry` slots and emits the
/// result as a single `SequencePayload` on `messages_output`.
///
/// Exactly one of `build_fn`, `trigger_map`, or `emit_order` determines
/// which entries are emitted on a given round, in that priority order.
pub struct ContextBuilder {
    pub element_name: String,
    entries: HashMap<String, InputMapEntry>,
    order: Vec<String>,
    build_fn: Option<PlanCallback>,
    trigger_map: Option<HashMap<String, Vec<String>>>,
    emit_order: Option<Vec<String>>,
    directory: PortsDirectory,
    latest: tokio::sync::Mutex<HashMap<String, Arc<dyn Payload>>>,
    template_storage: tokio::sync::Mutex<HashMap<String, String>>,
}

impl std::fmt::Debug for ContextBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextBuilder")
            .field("element_name", &self.element_name)
            .field("order", &self.order)
            .finish_non_exhaustive()
    }
}

impl ContextBuilder {
    /// `entries` order is preserved as the declaration order, used when no
    /// `emit_order` is supplied but one is needed as a last resort (every
    /// entry, in declaration order).
    pub fn new(
        element_name: impl Into<String>,
        entries: Vec<(String, InputMapEntry)>,
        build_fn: Option<PlanCallback>,
        trigger_map: Option<HashMap<String, Vec<String>>>,
        emit_order: Option<Vec<String>>,
    ) -> Result<Arc<Self>, ContextBuilderError> {
        let element_name = element_name.into();
        let order: Vec<String> = entries.iter().map(|(name, _)| name.clone()).collect();
        let names: HashSet<&str> = order.iter().map(String::as_str).collect();

        for (name, entry) in &entries {
            if let InputMapEntry::Template { template, depends_on, .. } = entry {
                for capture in placeholder_pattern().captures_iter(template) {
                    let reference = capture.get(1).or_else(|| capture.get(2)).unwrap().as_str();
                    if !names.contains(reference) {
                        return Err(ContextBuilderError::UnknownTemplateReference {
                            template: name.clone(),
                            reference: reference.to_string(),
                        });
                    }
                }
                for dependency in depends_on {
                    if !names.contains(dependency.as_str()) {
                        return Err(ContextBuilderError::UnknownPlanEntry { entry: dependency.clone() });
                    }
                }
            }
        }
        if let Some(trigger_map) = &trigger_map {
            for plan in trigger_map.values() {
                for entry in plan {
                    let (bare, _) = strip_plan_optional_marker(entry);
                    if !names.contains(bare) {
                        return Err(ContextBuilderError::UnknownPlanEntry { entry: bare.to_string() });
                    }
                }
            }
        }
        if let Some(plan) = &emit_order {
            for entry in plan {
                let (bare, _) = strip_plan_optional_marker(entry);
                if !names.contains(bare) {
                    return Err(ContextBuilderError::UnknownPlanEntry { entry: bare.to_string() });
                }
            }
        }

        let entries: HashMap<String, InputMapEntry> = entries.into_iter().collect();

        Ok(Arc::new_cyclic(|weak: &Weak<ContextBuilder>| {
            let mut directory = PortsDirectory::new();
            for (name, entry) in &entries {
                if let InputMapEntry::Port { payload_type, .. } = entry {
                    let weak = weak.clone();
                    let name_owned = name.clone();
                    let unpack: crate::ports::UnpackCallback = Arc::new(move |payload| {
                        let weak = weak.clone();
                        let name = name_owned.clone();
                        Box::pin(async move {
                            if let Some(builder) = weak.upgrade() {
                                builder.handle_receipt(name, payload).await;
                            }
                        })
                    });
                    let input = InputPort::new(name.clone(), element_name.clone(), payload_type.clone(), unpack);
                    directory.add_input(input);
                }
            }

            let pack: crate::ports::PackCallback = Arc::new(|mut items| {
                Box::pin(async move { items.remove("value").expect("value staged before emit") })
            });
            let output = OutputPort::new(
                "messages_output",
                element_name.clone(),
                vec![RequiredItem {
                    name: "value".to_string(),
                    item_type: TypeDescriptor::seq(TypeDescriptor::scalar("Message")),
                }],
                pack,
                None,
                true,
            );
            directory.add_output(output);

            ContextBuilder {
                element_name,
                entries,
                order,
                build_fn,
                trigger_map,
                emit_order,
                directory,
                latest: tokio::sync::Mutex::new(HashMap::new()),
                template_storage: tokio::sync::Mutex::new(HashMap::new()),
            }
        }))
    }

    pub fn output_port(&self) -> &Arc<OutputPort> {
        self.directory.output("messages_output").expect("messages_output always declared")
    }

    pub fn input_port(&self, name: &str) -> Option<&Arc<InputPort>> {
        self.directory.input(name)
    }

    /// The most recently rendered text for a template entry, if it has
    /// rendered at least once.
    pub async fn template_storage(&self, name: &str) -> Option<String> {
        self.template_storage.lock().await.get(name).cloned()
    }

    async fn handle_receipt(self: &Arc<Self>, name: String, payload: Arc<dyn Payload>) {
        self.latest.lock().await.insert(name.clone(), payload);

        let plan = self.resolve_plan(&name).await;
        let Some(plan) = plan else { return };

        if let Err(err) = self.emit_plan(&plan).await {
            tracing::warn!(
                element = %self.element_name,
                triggered_by = %name,
                error = %err,
                "context builder emission failed",
            );
        }

        let clear_persist = matches!(
            self.entries.get(&name),
            Some(InputMapEntry::Port { persist: false, .. })
        );
        if clear_persist {
            self.latest.lock().await.remove(&name);
        }
    }

    async fn resolve_plan(self: &Arc<Self>, triggered_by: &str) -> Option<Vec<String>> {
        if let Some(build_fn) = &self.build_fn {
            let available = self.available_entries().await;
            return build_fn(PlanContext { triggered_by: triggered_by.to_string(), available }).await;
        }
        if let Some(trigger_map) = &self.trigger_map {
            return trigger_map.get(triggered_by).cloned();
        }
        self.emit_order.clone().or_else(|| Some(self.order.clone()))
    }

    async fn available_entries(&self) -> HashSet<String> {
        let latest = self.latest.lock().await;
        self.entries
            .iter()
            .filter(|(name, entry)| match entry {
                InputMapEntry::Port { .. } => latest.contains_key(*name),
                InputMapEntry::Constant { .. } => true,
                InputMapEntry::Template { .. } => true,
            })
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Resolves `plan` into messages and emits them as one `SequencePayload`.
    /// A missing, non-optional `Port` entry anywhere in the plan suppresses
    /// the whole emission; a `Template` entry whose `depends_on` can't be
    /// resolved is silently skipped rather than suppressing the round.
    async fn emit_plan(self: &Arc<Self>, plan: &[String]) -> Result<(), ContextBuilderError> {
        let latest = self.latest.lock().await.clone();
        let mut messages = Vec::new();

        for raw_name in plan {
            let (name, plan_optional) = strip_plan_optional_marker(raw_name);
            let Some(entry) = self.entries.get(name) else {
                return Err(ContextBuilderError::UnknownPlanEntry { entry: name.to_string() });
            };

            match entry {
                InputMapEntry::Port { role, optional, callback, .. } => {
                    let Some(payload) = latest.get(name) else {
                        if *optional || plan_optional {
                            continue;
                        }
                        tracing::debug!(
                            element = %self.element_name,
                            entry = %name,
                            "suppressing emission: required entry has no payload yet",
                        );
                        return Ok(());
                    };
                    let produced = match callback {
                        Some(callback) => callback(payload.clone()).await,
                        None => default_message_for(payload, role.as_deref()),
                    };
                    messages.extend(produced);
                }
                InputMapEntry::Constant { message } => messages.push(message.clone()),
                InputMapEntry::Template { template, role, depends_on } => {
                    if depends_on.iter().any(|dep| !latest.contains_key(dep) && !self.is_always_available(dep)) {
                        continue;
                    }
                    let rendered = self.render_template(template, &latest);
                    self.template_storage.lock().await.insert(name.to_string(), rendered.clone());
                    messages.push(MessagePayload::new(role.clone(), rendered));
                }
            }
        }

        let output = self.output_port();
        let sequence = SequencePayload::new(TypeDescriptor::scalar("Message"), messages_to_payloads(messages));
        output.stage("value", Arc::new(sequence)).await.map_err(ContextBuilderError::from)
    }

    fn is_always_available(&self, name: &str) -> bool {
        matches!(
            self.entries.get(name),
            Some(InputMapEntry::Constant { .. }) | Some(InputMapEntry::Template { .. })
        )
    }

    fn render_template(&self, template: &str, latest: &HashMap<String, Arc<dyn Payload>>) -> String {
        placeholder_pattern()
            .replace_all(template, |caps: &regex::Captures| {
                let (name, optional) = match (caps.get(1), caps.get(2)) {
                    (Some(m), _) => (m.as_str(), false),
                    (None, Some(m)) => (m.as_str(), true),
                    _ => unreachable!(),
                };
                self.resolve_reference(name, latest).unwrap_or_else(|| {
                    if optional { String::new() } else { format!("{{{name}}}") }
                })
            })
            .into_owned()
    }

    fn resolve_reference(&self, name: &str, latest: &HashMap<String, Arc<dyn Payload>>) -> Option<String> {
        match self.entries.get(name)? {
            InputMapEntry::Port { .. } => latest.get(name).map(render_payload_as_text),
            InputMapEntry::Constant { message } => Some(message.content.clone()),
            InputMapEntry::Template { .. } => {
                // Templates referencing templates read the last rendered
                // value synchronously isn't possible without blocking on the
                // async lock here, so nested template references resolve
                // against this round's own rendering only when declared
                // earlier in `order`.
                None
            }
        }
    }
}

fn messages_to_payloads(messages: Vec<MessagePayload>) -> Vec<Arc<dyn Payload>> {
    messages.into_iter().map(|m| Arc::new(m) as Arc<dyn Payload>).collect()
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use crate::payload::TextPayload;

    use super::*;

    fn recv(builder: &Arc<ContextBuilder>, name: &str, payload: Arc<dyn Payload>) -> BoxFuture<'static, ()> {
        let input = builder.input_port(name).unwrap().clone();
        Box::pin(async move {
            input.receive(payload, Uuid::new_v4(), "test").await.unwrap();
        })
    }

    #[tokio::test]
    async fn emit_order_runs_entries_in_declared_order_once_all_required_are_present() {
        let entries = vec![
            ("system".to_string(), InputMapEntry::constant("system", "be helpful")),
            ("user".to_string(), InputMapEntry::port(TypeDescriptor::scalar("Text"))),
        ];
        let builder = ContextBuilder::new(
            "ctx",
            entries,
            None,
            None,
            Some(vec!["system".to_string(), "user".to_string()]),
        )
        .unwrap();

        recv(&builder, "user", Arc::new(TextPayload::new("hello"))).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn missing_non_optional_port_suppresses_the_whole_emission() {
        let entries = vec![
            ("a".to_string(), InputMapEntry::port(TypeDescriptor::scalar("Text"))),
            ("b".to_string(), InputMapEntry::port(TypeDescriptor::scalar("Text"))),
        ];
        let builder =
            ContextBuilder::new("ctx", entries, None, None, Some(vec!["a".to_string(), "b".to_string()]))
                .unwrap();

        // Only "a" arrives; "b" is required and absent, so nothing should
        // ever reach messages_output. We can't directly observe the queue
        // here without a consumer, so this just exercises the path without
        // panicking (a panic would mean emit_plan mis-staged a partial set).
        recv(&builder, "a", Arc::new(TextPayload::new("first"))).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn unknown_template_reference_is_rejected_at_construction() {
        let entries = vec![(
            "greeting".to_string(),
            InputMapEntry::template("hi {nonexistent}", "system", Vec::<String>::new()),
        )];
        let err = ContextBuilder::new("ctx", entries, None, None, None).unwrap_err();
        assert!(matches!(err, ContextBuilderError::UnknownTemplateReference { .. }));
    }

    #[tokio::test]
    async fn template_renders_referenced_entries_and_records_template_storage() {
        let entries = vec![
            ("name".to_string(), InputMapEntry::constant("user", "Ada")),
            ("trigger".to_string(), InputMapEntry::port(TypeDescriptor::scalar("Text"))),
            (
                "greeting".to_string(),
                InputMapEntry::template("hello {name}", "system", vec!["name".to_string()]),
            ),
        ];
        let builder = ContextBuilder::new(
            "ctx",
            entries,
            None,
            None,
            Some(vec!["greeting".to_string()]),
        )
        .unwrap();

        assert_eq!(builder.template_storage("greeting").await, None);
        recv(&builder, "trigger", Arc::new(TextPayload::new("go"))).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(builder.template_storage("greeting").await, Some("hello Ada".to_string()));
    }

    /// Attaches a sink input to `builder`'s output and returns a handle to
    /// the messages it has captured so far.
    fn attach_sink(builder: &Arc<ContextBuilder>) -> Arc<tokio::sync::Mutex<Vec<Vec<MessagePayload>>>> {
        let captured: Arc<tokio::sync::Mutex<Vec<Vec<MessagePayload>>>> =
            Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let captured_clone = captured.clone();
        let sink = InputPort::new(
            "sink",
            "observer",
            TypeDescriptor::Any,
            Arc::new(move |payload| {
                let captured = captured_clone.clone();
                Box::pin(async move {
                    let sequence = crate::payload::downcast::<crate::payload::SequencePayload>(payload.as_ref())
                        .expect("messages_output always emits a SequencePayload");
                    let messages = sequence
                        .items
                        .iter()
                        .map(|item| crate::payload::downcast::<MessagePayload>(item.as_ref()).unwrap().clone())
                        .collect();
                    captured.lock().await.push(messages);
                })
            }),
        );
        let output = builder.output_port().clone();
        tokio::spawn(async move {
            output.connect(&sink).await.unwrap();
        });
        captured
    }

    #[tokio::test]
    async fn a_sequence_payload_is_flattened_into_one_message_per_element() {
        let entries = vec![
            ("system".to_string(), InputMapEntry::constant("system", "be helpful")),
            ("hist".to_string(), InputMapEntry::port(TypeDescriptor::seq(TypeDescriptor::scalar("Message")))),
        ];
        let builder = ContextBuilder::new(
            "ctx",
            entries,
            None,
            None,
            Some(vec!["system".to_string(), "hist".to_string()]),
        )
        .unwrap();

        let captured = attach_sink(&builder);
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let history = SequencePayload::new(
            TypeDescriptor::scalar("Message"),
            vec![
                Arc::new(MessagePayload::new("assistant", "prev")) as Arc<dyn Payload>,
                Arc::new(MessagePayload::new("user", "prev2")) as Arc<dyn Payload>,
            ],
        );
        recv(&builder, "hist", Arc::new(history)).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let rounds = captured.lock().await;
        let messages = rounds.last().expect("one emission happened");
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].content, "prev");
        assert_eq!(messages[2].content, "prev2");
    }

    #[tokio::test]
    async fn bracketed_plan_entry_makes_an_otherwise_required_port_optional_for_that_round() {
        let entries = vec![
            ("system".to_string(), InputMapEntry::constant("system", "be helpful")),
            ("hist".to_string(), InputMapEntry::port(TypeDescriptor::scalar("Text"))),
            ("q".to_string(), InputMapEntry::port(TypeDescriptor::scalar("Text"))),
        ];
        let builder = ContextBuilder::new(
            "ctx",
            entries,
            None,
            None,
            Some(vec!["system".to_string(), "[hist]".to_string(), "q".to_string()]),
        )
        .unwrap();

        let captured = attach_sink(&builder);
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        // "hist" never arrives; since it's bracketed in the plan it's
        // skipped rather than suppressing the whole emission.
        recv(&builder, "q", Arc::new(TextPayload::new("question"))).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let rounds = captured.lock().await;
        let messages = rounds.last().expect("emission should not be suppressed");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].content, "question");
    }
}

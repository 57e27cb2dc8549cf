use std::collections::HashMap;
use std::sync::Arc;

use super::{InputPort, OutputPort};

/// The by-name lookup table an `Element` exposes its ports through. Mirrors
/// the directory role `AsyncPorts` plays in the source system: collaborator
/// code looks a port up by name rather than holding a typed field per port,
/// which is what lets `FlowController` and `ContextBuilder` wire up
/// dynamically declared ports uniformly.
#[derive(Default)]
pub struct PortsDirectory {
    inputs: HashMap<String, Arc<InputPort>>,
    outputs: HashMap<String, Arc<OutputPort>>,
}

impl PortsDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_input(&mut self, port: Arc<InputPort>) {
        self.inputs.insert(port.name.clone(), port);
    }

    pub fn add_output(&mut self, port: Arc<OutputPort>) {
        self.outputs.insert(port.name.clone(), port);
    }

    pub fn input(&self, name: &str) -> Option<&Arc<InputPort>> {
        self.inputs.get(name)
    }

    pub fn output(&self, name: &str) -> Option<&Arc<OutputPort>> {
        self.outputs.get(name)
    }

    pub fn input_names(&self) -> impl Iterator<Item = &str> {
        self.inputs.keys().map(String::as_str)
    }

    pub fn output_names(&self) -> impl Iterator<Item = &str> {
        self.outputs.keys().map(String::as_str)
    }

    pub fn outputs(&self) -> impl Iterator<Item = &Arc<OutputPort>> {
        self.outputs.values()
    }

    pub fn inputs(&self) -> impl Iterator<Item = &Arc<InputPort>> {
        self.inputs.values()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::payload::TypeDescriptor;

    use super::*;

    #[test]
    fn lookup_by_name_finds_registered_ports() {
        let mut dir = PortsDirectory::new();
        let input = InputPort::new(
            "text_input",
            "el",
            TypeDescriptor::scalar("Text"),
            Arc::new(|_| Box::pin(async {})),
        );
        dir.add_input(input);
        assert!(dir.input("text_input").is_some());
        assert!(dir.input("missing").is_none());
    }
}

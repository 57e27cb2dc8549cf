//! The `Element` identity every port and `FlowController` hangs off of.

use uuid::Uuid;

/// A node in the dataflow graph. An `Element` is identity only — its
/// behavior lives in the ports it owns (`ports::PortsDirectory`) and, for
/// `FlowController`-based elements, in the user callback driving them.
#[derive(Debug, Clone)]
pub struct ElementHandle {
    pub id: Uuid,
    pub name: String,
}

impl ElementHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self { id: Uuid::new_v4(), name: name.into() }
    }

    pub fn anonymous(prefix: &str) -> Self {
        let id = Uuid::new_v4();
        Self { name: format!("{prefix}-{}", &id.to_string()[..8]), id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_elements_keep_the_given_name() {
        let el = ElementHandle::new("router");
        assert_eq!(el.name, "router");
    }

    #[test]
    fn anonymous_elements_get_distinct_ids() {
        let a = ElementHandle::anonymous("flow");
        let b = ElementHandle::anonymous("flow");
        assert_ne!(a.id, b.id);
    }
}

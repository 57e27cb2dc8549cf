//! Payload types carried between ports.
//!
//! A `Payload` is an opaque, typed message. The kernel only ever inspects a
//! payload's declared [`TypeDescriptor`] (for compatibility checks) and its
//! concrete Rust type (via `Any`, for downcasting inside collaborator
//! callbacks) — it never looks at payload contents itself.

mod message;
mod structured;
mod text;

pub use message::MessagePayload;
pub use structured::StructuredPayload;
pub use text::TextPayload;

use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

/// Runtime representation of a port's "declared type", mirroring the
/// `Any` / `Union[...]` / `list[...]` shapes `compatible()` has to reason
/// about in the source system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeDescriptor {
    /// Compatible with everything.
    Any,
    /// A nominal scalar type, identified by name (e.g. `"Message"`).
    Scalar(&'static str),
    /// A union of member types; compatible if any member is.
    Union(Vec<TypeDescriptor>),
    /// A non-empty sequence of some element type.
    Seq(Box<TypeDescriptor>),
}

impl TypeDescriptor {
    pub fn scalar(name: &'static str) -> Self {
        TypeDescriptor::Scalar(name)
    }

    pub fn seq(element: TypeDescriptor) -> Self {
        TypeDescriptor::Seq(Box::new(element))
    }

    pub fn union(members: impl IntoIterator<Item = TypeDescriptor>) -> Self {
        TypeDescriptor::Union(members.into_iter().collect())
    }

    /// Implements `compatible(O, I)` from the port compatibility rules:
    /// `Any` matches anything, equal types match, unions distribute over
    /// either side, and a `Seq<T>` is compatible with a bare `U` whenever
    /// `T` is compatible with `U` (and symmetrically), letting a
    /// sequence-producing output feed a scalar-declared input or vice versa.
    pub fn compatible(output: &TypeDescriptor, input: &TypeDescriptor) -> bool {
        if matches!(output, TypeDescriptor::Any) || matches!(input, TypeDescriptor::Any) {
            return true;
        }
        if output == input {
            return true;
        }
        if let TypeDescriptor::Union(members) = output {
            return members.iter().any(|m| Self::compatible(m, input));
        }
        if let TypeDescriptor::Union(members) = input {
            return members.iter().any(|m| Self::compatible(output, m));
        }
        match (output, input) {
            (TypeDescriptor::Seq(o), TypeDescriptor::Seq(i)) => Self::compatible(o, i),
            (TypeDescriptor::Seq(o), _) => Self::compatible(o, input),
            (_, TypeDescriptor::Seq(i)) => Self::compatible(output, i),
            _ => false,
        }
    }

    pub fn label(&self) -> String {
        match self {
            TypeDescriptor::Any => "Any".to_string(),
            TypeDescriptor::Scalar(name) => name.to_string(),
            TypeDescriptor::Union(members) => {
                let parts: Vec<String> = members.iter().map(TypeDescriptor::label).collect();
                format!("Union[{}]", parts.join(", "))
            }
            TypeDescriptor::Seq(inner) => format!("Seq[{}]", inner.label()),
        }
    }
}

/// An opaque, typed message carried from one `OutputPort` to one or more
/// `InputPort`s. Declared type is fixed at emission and never mutated by the
/// kernel.
pub trait Payload: Any + Debug + Send + Sync {
    /// The declared type of this concrete payload value.
    fn descriptor(&self) -> TypeDescriptor;

    fn as_any(&self) -> &dyn Any;
}

/// Downcasts a type-erased payload to a concrete type, the way collaborator
/// callbacks recover their expected payload shape.
pub fn downcast<T: Payload>(payload: &dyn Payload) -> Option<&T> {
    payload.as_any().downcast_ref::<T>()
}

/// A non-empty, homogeneously-typed sequence of payloads — the "sequence of
/// T" container the compatibility rules and staging rules both special-case.
#[derive(Debug, Clone)]
pub struct SequencePayload {
    pub element_type: TypeDescriptor,
    pub items: Vec<Arc<dyn Payload>>,
}

impl SequencePayload {
    pub fn new(element_type: TypeDescriptor, items: Vec<Arc<dyn Payload>>) -> Self {
        Self { element_type, items }
    }
}

impl Payload for SequencePayload {
    fn descriptor(&self) -> TypeDescriptor {
        TypeDescriptor::Seq(Box::new(self.element_type.clone()))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_is_universally_compatible() {
        assert!(TypeDescriptor::compatible(&TypeDescriptor::Any, &TypeDescriptor::scalar("Foo")));
        assert!(TypeDescriptor::compatible(&TypeDescriptor::scalar("Foo"), &TypeDescriptor::Any));
    }

    #[test]
    fn equal_scalars_are_compatible() {
        let a = TypeDescriptor::scalar("Message");
        let b = TypeDescriptor::scalar("Message");
        assert!(TypeDescriptor::compatible(&a, &b));
    }

    #[test]
    fn unions_distribute_over_either_side() {
        let union = TypeDescriptor::union([TypeDescriptor::scalar("A"), TypeDescriptor::scalar("B")]);
        assert!(TypeDescriptor::compatible(&union, &TypeDescriptor::scalar("B")));
        assert!(TypeDescriptor::compatible(&TypeDescriptor::scalar("A"), &union));
        assert!(!TypeDescriptor::compatible(&union, &TypeDescriptor::scalar("C")));
    }

    #[test]
    fn sequences_distribute_over_element_types_including_unions() {
        let seq_a = TypeDescriptor::seq(TypeDescriptor::scalar("A"));
        assert!(TypeDescriptor::compatible(&seq_a, &TypeDescriptor::scalar("A")));
        assert!(TypeDescriptor::compatible(&TypeDescriptor::scalar("A"), &seq_a));

        let seq_union = TypeDescriptor::seq(TypeDescriptor::union([
            TypeDescriptor::scalar("A"),
            TypeDescriptor::scalar("B"),
        ]));
        let seq_b = TypeDescriptor::seq(TypeDescriptor::scalar("B"));
        assert!(TypeDescriptor::compatible(&seq_union, &seq_b));
    }

    #[test]
    fn unrelated_scalars_are_incompatible() {
        assert!(!TypeDescriptor::compatible(
            &TypeDescriptor::scalar("A"),
            &TypeDescriptor::scalar("B")
        ));
    }
}

//! Per-type destructor table.

use std::any::Any;
use std::sync::OnceLock;

use crate::api::registry::ObjectRegistry;
use crate::api::tag::{DebugCategory, ObjectType};

/// Type destructor.
///
/// Runs once, on the thread that dropped the last reference (or on the
/// shutdown thread), before the payload's own `Drop`. It receives the
/// registry so it can release references the payload holds, and the payload
/// as `dyn Any` to downcast.
pub type Destructor = fn(&ObjectRegistry, &mut dyn Any);

/// Snapshot of one type's registration.
#[derive(Clone, Copy)]
pub struct TypeDescriptor {
    /// The type tag.
    pub object_type: ObjectType,
    /// Display name.
    pub name: &'static str,
    /// Debug category.
    pub category: DebugCategory,
    /// Registered destructor, if any object of this type supplied one.
    pub destructor: Option<Destructor>,
}

impl std::fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("object_type", &self.object_type)
            .field("category", &self.category)
            .field("has_destructor", &self.destructor.is_some())
            .finish()
    }
}

/// Destructor table indexed by [`ObjectType`].
///
/// Entries are write-once: the first registration for a type wins and later
/// ones are ignored, even when they pass a different function. Nothing is
/// ever removed.
pub(crate) struct TypeRegistry {
    destructors: [OnceLock<Destructor>; ObjectType::COUNT],
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self {
            destructors: std::array::from_fn(|_| OnceLock::new()),
        }
    }

    /// Register `destructor` for `object_type` unless one is already set.
    ///
    /// Returns true if this call installed it.
    pub fn register_if_absent(&self, object_type: ObjectType, destructor: Destructor) -> bool {
        self.destructors[object_type.index()].set(destructor).is_ok()
    }

    pub fn destructor(&self, object_type: ObjectType) -> Option<Destructor> {
        self.destructors[object_type.index()].get().copied()
    }

    pub fn descriptor(&self, object_type: ObjectType) -> TypeDescriptor {
        TypeDescriptor {
            object_type,
            name: object_type.name(),
            category: object_type.category(),
            destructor: self.destructor(object_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first(_: &ObjectRegistry, _: &mut dyn Any) {}
    fn second(_: &ObjectRegistry, _: &mut dyn Any) {}

    #[test]
    fn test_first_registration_wins() {
        let types = TypeRegistry::new();
        assert!(types.destructor(ObjectType::Device).is_none());

        assert!(types.register_if_absent(ObjectType::Device, first));
        assert!(!types.register_if_absent(ObjectType::Device, second));

        let installed = types.destructor(ObjectType::Device).unwrap();
        assert_eq!(installed as usize, first as Destructor as usize);
        assert!(types.destructor(ObjectType::Line).is_none());
    }

    #[test]
    fn test_descriptor() {
        let types = TypeRegistry::new();
        types.register_if_absent(ObjectType::Channel, first);
        let desc = types.descriptor(ObjectType::Channel);
        assert_eq!(desc.name, "channel");
        assert_eq!(desc.category, DebugCategory::Channel);
        assert!(desc.destructor.is_some());
    }
}

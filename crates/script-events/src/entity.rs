//! World entity handles.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Generational handle to an entity owned by the world collaborator.
///
/// A handle stays comparable after its entity is destroyed, but the world
/// reports it as no longer alive once the slot has been reused or freed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub index: u32,
    pub generation: u32,
}

impl EntityRef {
    /// Creates a handle from its raw parts.
    pub fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Session-wide identity of a replicated entity.
///
/// Survives reinstantiation, unlike [`EntityRef`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkId(pub Uuid);

impl NetworkId {
    /// Generates a fresh random identity.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "net_{}", self.0.simple())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_ref_display() {
        assert_eq!(EntityRef::new(4, 2).to_string(), "4v2");
    }

    #[test]
    fn test_entity_ref_ordering() {
        let a = EntityRef::new(1, 0);
        let b = EntityRef::new(2, 0);
        assert!(a < b);
        assert_ne!(EntityRef::new(1, 0), EntityRef::new(1, 1));
    }

    #[test]
    fn test_network_ids_are_unique() {
        assert_ne!(NetworkId::generate(), NetworkId::generate());
    }
}

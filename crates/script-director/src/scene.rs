//! World collaborator.
//!
//! The orchestration core never owns the world. It reads positions and area
//! occupancy, toggles subtrees, and captures/rebuilds subtrees for
//! reinstantiation through the [`Scene`] trait. [`InMemoryScene`] is a small
//! hierarchy used by tests and by embedders without their own world.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use script_events::{Aabb, EntityRef, NetworkId, Vec3};

use crate::arena::{Arena, ArenaKey};

/// Where a subtree root sits in the world.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    /// World-space position of the root.
    pub position: Vec3,
    pub parent: Option<EntityRef>,
    pub network_id: Option<NetworkId>,
}

/// Serialized copy of a subtree, excluding the root's placement and active
/// flag. Two captures of identical subtrees are byte-equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtreeSnapshot(pub Vec<u8>);

impl SubtreeSnapshot {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Access to the simulated world.
pub trait Scene {
    /// True while the handle refers to a live entity.
    fn is_alive(&self, entity: EntityRef) -> bool;

    /// World-space position of a live entity.
    fn world_position(&self, entity: EntityRef) -> Option<Vec3>;

    /// Named gameplay value stored on an entity.
    fn property(&self, entity: EntityRef, name: &str) -> Option<serde_json::Value>;

    fn set_property(&mut self, entity: EntityRef, name: &str, value: serde_json::Value);

    /// Active actors whose position lies in `region`, in ascending handle order.
    fn actors_in(&self, region: &Aabb) -> Vec<EntityRef>;

    /// Resolves a `/`-separated child path below `root`.
    fn find_descendant(&self, root: EntityRef, path: &str) -> Option<EntityRef>;

    /// Sets the root's own active flag. Descendants inherit it.
    fn set_active(&mut self, root: EntityRef, active: bool);

    fn placement(&self, root: EntityRef) -> Option<Placement>;

    fn capture_subtree(&self, root: EntityRef) -> Option<SubtreeSnapshot>;

    /// Destroys `root` and all its descendants.
    fn destroy_subtree(&mut self, root: EntityRef);

    /// Builds a fresh subtree from a snapshot. The new root starts inactive.
    fn instantiate_subtree(
        &mut self,
        snapshot: &SubtreeSnapshot,
        placement: &Placement,
    ) -> Option<EntityRef>;
}

#[derive(Debug, Clone)]
struct Node {
    name: String,
    local_position: Vec3,
    parent: Option<ArenaKey>,
    children: Vec<ArenaKey>,
    active: bool,
    actor: bool,
    network_id: Option<NetworkId>,
    properties: BTreeMap<String, serde_json::Value>,
}

impl Node {
    fn new(name: String, local_position: Vec3, parent: Option<ArenaKey>) -> Self {
        Self {
            name,
            local_position,
            parent,
            children: Vec::new(),
            active: true,
            actor: false,
            network_id: None,
            properties: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotNode {
    name: String,
    local_position: Vec3,
    active: bool,
    actor: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    properties: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<SnapshotNode>,
}

fn key(entity: EntityRef) -> ArenaKey {
    ArenaKey {
        index: entity.index,
        generation: entity.generation,
    }
}

fn entity(key: ArenaKey) -> EntityRef {
    EntityRef::new(key.index, key.generation)
}

/// Hierarchical entity store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryScene {
    nodes: Arena<Node>,
}

impl InMemoryScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns a plain entity, optionally under `parent`.
    pub fn spawn(
        &mut self,
        name: impl Into<String>,
        local_position: Vec3,
        parent: Option<EntityRef>,
    ) -> EntityRef {
        let parent_key = parent.map(key).filter(|k| self.nodes.contains(*k));
        let k = self
            .nodes
            .insert(Node::new(name.into(), local_position, parent_key));
        if let Some(p) = parent_key.and_then(|p| self.nodes.get_mut(p)) {
            p.children.push(k);
        }
        entity(k)
    }

    /// Spawns a root-level actor that area triggers can detect.
    pub fn spawn_actor(&mut self, name: impl Into<String>, position: Vec3) -> EntityRef {
        let e = self.spawn(name, position, None);
        if let Some(node) = self.nodes.get_mut(key(e)) {
            node.actor = true;
        }
        e
    }

    pub fn set_local_position(&mut self, e: EntityRef, local_position: Vec3) {
        if let Some(node) = self.nodes.get_mut(key(e)) {
            node.local_position = local_position;
        }
    }

    pub fn set_network_id(&mut self, e: EntityRef, id: NetworkId) {
        if let Some(node) = self.nodes.get_mut(key(e)) {
            node.network_id = Some(id);
        }
    }

    pub fn name(&self, e: EntityRef) -> Option<&str> {
        self.nodes.get(key(e)).map(|n| n.name.as_str())
    }

    pub fn children(&self, e: EntityRef) -> Vec<EntityRef> {
        self.nodes
            .get(key(e))
            .map(|n| n.children.iter().copied().map(entity).collect())
            .unwrap_or_default()
    }

    /// Active flag of the entity and all its ancestors.
    pub fn is_active_in_hierarchy(&self, e: EntityRef) -> bool {
        let mut current = Some(key(e));
        while let Some(k) = current {
            match self.nodes.get(k) {
                Some(node) if node.active => current = node.parent,
                _ => return false,
            }
        }
        true
    }

    pub fn entity_count(&self) -> usize {
        self.nodes.len()
    }

    fn capture_node(&self, k: ArenaKey, is_root: bool) -> Option<SnapshotNode> {
        let node = self.nodes.get(k)?;
        let children = node
            .children
            .iter()
            .filter_map(|c| self.capture_node(*c, false))
            .collect();
        Some(SnapshotNode {
            name: node.name.clone(),
            local_position: if is_root { Vec3::ZERO } else { node.local_position },
            active: if is_root { false } else { node.active },
            actor: node.actor,
            properties: node.properties.clone(),
            children,
        })
    }

    fn build_node(&mut self, snap: &SnapshotNode, parent: Option<ArenaKey>) -> ArenaKey {
        let mut node = Node::new(snap.name.clone(), snap.local_position, parent);
        node.active = snap.active;
        node.actor = snap.actor;
        node.properties = snap.properties.clone();
        let k = self.nodes.insert(node);
        for child in &snap.children {
            let c = self.build_node(child, Some(k));
            if let Some(n) = self.nodes.get_mut(k) {
                n.children.push(c);
            }
        }
        k
    }
}

impl Scene for InMemoryScene {
    fn is_alive(&self, e: EntityRef) -> bool {
        self.nodes.contains(key(e))
    }

    fn property(&self, e: EntityRef, name: &str) -> Option<serde_json::Value> {
        self.nodes.get(key(e))?.properties.get(name).cloned()
    }

    fn set_property(&mut self, e: EntityRef, name: &str, value: serde_json::Value) {
        if let Some(node) = self.nodes.get_mut(key(e)) {
            node.properties.insert(name.to_string(), value);
        }
    }

    fn world_position(&self, e: EntityRef) -> Option<Vec3> {
        let mut node = self.nodes.get(key(e))?;
        let mut position = node.local_position;
        while let Some(parent) = node.parent.and_then(|p| self.nodes.get(p)) {
            position = position + parent.local_position;
            node = parent;
        }
        Some(position)
    }

    fn actors_in(&self, region: &Aabb) -> Vec<EntityRef> {
        let mut found: Vec<EntityRef> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.actor)
            .map(|(k, _)| entity(k))
            .filter(|e| self.is_active_in_hierarchy(*e))
            .filter(|e| {
                self.world_position(*e)
                    .map(|p| region.contains(p))
                    .unwrap_or(false)
            })
            .collect();
        found.sort();
        found
    }

    fn find_descendant(&self, root: EntityRef, path: &str) -> Option<EntityRef> {
        let mut current = key(root);
        self.nodes.get(current)?;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let node = self.nodes.get(current)?;
            current = *node
                .children
                .iter()
                .find(|c| self.nodes.get(**c).map(|n| n.name == segment).unwrap_or(false))?;
        }
        Some(entity(current))
    }

    fn set_active(&mut self, root: EntityRef, active: bool) {
        if let Some(node) = self.nodes.get_mut(key(root)) {
            node.active = active;
        }
    }

    fn placement(&self, root: EntityRef) -> Option<Placement> {
        let node = self.nodes.get(key(root))?;
        Some(Placement {
            position: self.world_position(root)?,
            parent: node.parent.map(entity),
            network_id: node.network_id,
        })
    }

    fn capture_subtree(&self, root: EntityRef) -> Option<SubtreeSnapshot> {
        let snap = self.capture_node(key(root), true)?;
        serde_json::to_vec(&snap).ok().map(SubtreeSnapshot)
    }

    fn destroy_subtree(&mut self, root: EntityRef) {
        let k = key(root);
        let Some(node) = self.nodes.get(k) else {
            return;
        };
        let parent = node.parent;
        let mut stack = vec![k];
        while let Some(current) = stack.pop() {
            if let Some(removed) = self.nodes.remove(current) {
                stack.extend(removed.children);
            }
        }
        if let Some(p) = parent.and_then(|p| self.nodes.get_mut(p)) {
            p.children.retain(|c| *c != k);
        }
    }

    fn instantiate_subtree(
        &mut self,
        snapshot: &SubtreeSnapshot,
        placement: &Placement,
    ) -> Option<EntityRef> {
        let snap: SnapshotNode = match serde_json::from_slice(snapshot.as_bytes()) {
            Ok(snap) => snap,
            Err(e) => {
                tracing::warn!("Discarding unreadable subtree snapshot: {}", e);
                return None;
            }
        };

        let parent = placement.parent.map(key).filter(|k| self.nodes.contains(*k));
        let root = self.build_node(&snap, parent);
        if let Some(p) = parent.and_then(|p| self.nodes.get_mut(p)) {
            p.children.push(root);
        }

        let parent_position = parent
            .and_then(|p| self.world_position(entity(p)))
            .unwrap_or(Vec3::ZERO);
        if let Some(node) = self.nodes.get_mut(root) {
            node.local_position = placement.position - parent_position;
            node.network_id = placement.network_id;
        }
        Some(entity(root))
    }
}

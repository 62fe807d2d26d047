//! Composite events.
//!
//! A composite event owns a set of event components plus the world subtree
//! they are anchored in, and folds their lifecycles into one
//! Dormant/Active/Finished state. Reinstantiating events capture their
//! subtree at spawn time and rebuild it from that snapshot on restart.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use script_events::{CompositeEventDef, EntityRef, EventComponentDef};

use crate::component::{ComponentId, ComponentStore, EventComponent};
use crate::scene::{Placement, Scene, SubtreeSnapshot};
use crate::scheduler::{PollScheduler, SourceKey};

/// Collaborators a composite needs to change state.
pub struct CompositeContext<'a> {
    pub store: &'a mut ComponentStore,
    pub scheduler: &'a mut PollScheduler,
    pub scene: &'a mut dyn Scene,
    pub default_polling_interval: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositeState {
    Dormant,
    Active,
    Finished,
}

/// Runtime instance of a [`CompositeEventDef`].
#[derive(Debug, Clone)]
pub struct CompositeEvent {
    def: Arc<CompositeEventDef>,
    state: CompositeState,
    components: Vec<ComponentId>,
    subtree: Option<EntityRef>,
    placement: Option<Placement>,
    initial_snapshot: Option<SubtreeSnapshot>,
    has_ever_played: bool,
    finished_last_tick: bool,
}

impl CompositeEvent {
    /// Builds a dormant event. The subtree, when given, is deactivated and,
    /// for reinstantiating events, captured.
    pub fn instantiate(
        def: Arc<CompositeEventDef>,
        subtree: Option<EntityRef>,
        cx: &mut CompositeContext<'_>,
    ) -> Self {
        let subtree = subtree.filter(|root| cx.scene.is_alive(*root));
        let (initial_snapshot, placement) = match subtree {
            Some(root) if def.reinstantiate_on_restart => {
                (cx.scene.capture_subtree(root), cx.scene.placement(root))
            }
            _ => (None, None),
        };
        if let Some(root) = subtree {
            cx.scene.set_active(root, false);
        }

        let components = build_components(&def, subtree, cx);
        tracing::debug!(
            "Instantiated event {} with {} components",
            def.key,
            components.len()
        );

        Self {
            def,
            state: CompositeState::Dormant,
            components,
            subtree,
            placement,
            initial_snapshot,
            has_ever_played: false,
            finished_last_tick: false,
        }
    }

    pub fn key(&self) -> &str {
        &self.def.key
    }

    pub fn definition(&self) -> &CompositeEventDef {
        &self.def
    }

    pub fn state(&self) -> CompositeState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == CompositeState::Active
    }

    pub fn is_stackable(&self) -> bool {
        self.def.stackable
    }

    pub fn has_ever_played(&self) -> bool {
        self.has_ever_played
    }

    pub fn components(&self) -> &[ComponentId] {
        &self.components
    }

    pub fn subtree(&self) -> Option<EntityRef> {
        self.subtree
    }

    pub fn placement(&self) -> Option<&Placement> {
        self.placement.as_ref()
    }

    pub fn initial_snapshot(&self) -> Option<&SubtreeSnapshot> {
        self.initial_snapshot.as_ref()
    }

    /// Finds the live component built from `path`.
    pub fn component(&self, path: &str, store: &ComponentStore) -> Option<ComponentId> {
        self.components
            .iter()
            .copied()
            .find(|id| store.get(*id).map(|c| c.path() == path).unwrap_or(false))
    }

    /// Activates the event, restarting it first if it has played before.
    pub fn enable(&mut self, cx: &mut CompositeContext<'_>) {
        if self.has_ever_played {
            self.restart(cx);
        }
        self.state = CompositeState::Active;
        self.has_ever_played = true;
        self.finished_last_tick = false;
        self.activate(cx);
    }

    /// Stops the event and every component in it.
    pub fn disable(&mut self, cx: &mut CompositeContext<'_>) {
        self.state = CompositeState::Finished;
        if let Some(root) = self.live_subtree(cx.scene) {
            cx.scene.set_active(root, false);
        }
        for id in &self.components {
            cx.store.force_finish(*id);
        }
    }

    /// Returns the event to its initial condition without changing its
    /// lifecycle state.
    pub fn restart(&mut self, cx: &mut CompositeContext<'_>) {
        let rebuild = match (&self.initial_snapshot, &self.placement) {
            (Some(snapshot), Some(placement)) if self.def.reinstantiate_on_restart => {
                Some((snapshot.clone(), *placement))
            }
            _ => None,
        };

        match rebuild {
            Some((snapshot, placement)) => {
                if let Some(root) = self.live_subtree(cx.scene) {
                    cx.scene.destroy_subtree(root);
                }
                for id in self.components.drain(..) {
                    cx.store.remove(id);
                    cx.scheduler.unregister_component(id);
                }

                self.subtree = cx.scene.instantiate_subtree(&snapshot, &placement);
                if self.subtree.is_none() {
                    tracing::warn!("Event {} could not rebuild its subtree", self.def.key);
                }
                self.components = build_components(&self.def, self.subtree, cx);
                tracing::debug!("Reinstantiated event {}", self.def.key);
            }
            None => {
                for id in &self.components {
                    cx.store.reset(*id);
                }
            }
        }

        self.finished_last_tick = false;
        if self.state == CompositeState::Active {
            self.activate(cx);
        } else if let Some(root) = self.live_subtree(cx.scene) {
            cx.scene.set_active(root, false);
        }
    }

    /// True when every component is finished, optional and idle, disabled,
    /// or gone.
    pub fn is_complete(&self, store: &ComponentStore) -> bool {
        self.components
            .iter()
            .all(|id| store.get(*id).map(|c| c.is_done()).unwrap_or(true))
    }

    /// Reports a completion on the first tick the predicate holds while
    /// active.
    pub fn check_completion(&mut self, store: &ComponentStore) -> bool {
        if self.state != CompositeState::Active {
            self.finished_last_tick = false;
            return false;
        }
        let finished = self.is_complete(store);
        let completed = finished && !self.finished_last_tick;
        self.finished_last_tick = finished;
        completed
    }

    fn activate(&self, cx: &mut CompositeContext<'_>) {
        if let Some(root) = self.live_subtree(cx.scene) {
            cx.scene.set_active(root, true);
        }
        for id in &self.components {
            cx.store.enable(*id);
        }
    }

    fn live_subtree(&self, scene: &dyn Scene) -> Option<EntityRef> {
        self.subtree.filter(|root| scene.is_alive(*root))
    }
}

fn build_components(
    def: &CompositeEventDef,
    root: Option<EntityRef>,
    cx: &mut CompositeContext<'_>,
) -> Vec<ComponentId> {
    let mut ids = Vec::with_capacity(def.components.len());
    for component in &def.components {
        let anchor = resolve_anchor(&def.key, component, root, cx.scene);
        let built = EventComponent::from_def(&def.key, component, anchor, cx.default_polling_interval);
        let polled: Vec<usize> = built
            .sources()
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_polled())
            .map(|(i, _)| i)
            .collect();

        let id = cx.store.insert(built);
        for index in polled {
            cx.scheduler.register(SourceKey {
                component: id,
                index,
            });
        }
        ids.push(id);
    }

    let by_path: HashMap<&str, ComponentId> = def
        .components
        .iter()
        .map(|c| c.path.as_str())
        .zip(ids.iter().copied())
        .collect();
    let resolve = |paths: &[String]| -> Vec<ComponentId> {
        paths
            .iter()
            .filter_map(|p| by_path.get(p.as_str()).copied())
            .collect()
    };

    for (component, id) in def.components.iter().zip(&ids) {
        cx.store.link(
            *id,
            resolve(component.disable_on_trigger.as_slice()),
            resolve(component.disabled_while_playing.as_slice()),
        );
    }
    ids
}

fn resolve_anchor(
    event_key: &str,
    component: &EventComponentDef,
    root: Option<EntityRef>,
    scene: &dyn Scene,
) -> Option<EntityRef> {
    match (&component.anchor, root) {
        (None, root) => root,
        (Some(path), Some(root)) => match scene.find_descendant(root, path) {
            Some(anchor) => Some(anchor),
            None => {
                tracing::warn!(
                    "Event {} component {} has no anchor {}, using subtree root",
                    event_key,
                    component.path,
                    path
                );
                Some(root)
            }
        },
        (Some(path), None) => {
            tracing::warn!(
                "Event {} component {} anchors at {} but the event has no subtree",
                event_key,
                component.path,
                path
            );
            None
        }
    }
}

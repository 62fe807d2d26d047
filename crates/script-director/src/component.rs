//! Event components.
//!
//! An event component binds a set of trigger sources to one payload. It is
//! `Armed` until a qualifying trigger is admitted, `Playing` while its payload
//! runs, and then either re-armed or, for once-components, `Finished`.
//!
//! Components live in a [`ComponentStore`] and reference siblings by
//! [`ComponentId`], so cascading disable lists may form cycles.

use serde::{Deserialize, Serialize};

use script_events::{EntityRef, EventComponentDef};

use crate::arena::{Arena, ArenaKey};
use crate::scheduler::{SourceHost, SourceKey};
use crate::trigger::TriggerSource;

/// Handle to a component in a [`ComponentStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ComponentId(pub ArenaKey);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentState {
    Armed,
    Playing,
    Finished,
}

/// Runtime state of one event component.
#[derive(Debug, Clone)]
pub struct EventComponent {
    event_key: String,
    path: String,
    state: ComponentState,
    enabled: bool,
    trigger_once: bool,
    cooldown_seconds: f32,
    time_since_last_trigger: f32,
    required_to_finish: bool,
    disable_on_trigger: Vec<ComponentId>,
    disabled_while_playing: Vec<ComponentId>,
    suppressed: Vec<ComponentId>,
    cascade_disabled: bool,
    sources: Vec<TriggerSource>,
    anchor: Option<EntityRef>,
    payload: Option<String>,
    generation: u32,
    finish_due: Option<u64>,
}

impl EventComponent {
    /// Builds a disabled, armed component. Sibling lists are linked later
    /// with [`ComponentStore::link`].
    pub fn from_def(
        event_key: &str,
        def: &EventComponentDef,
        anchor: Option<EntityRef>,
        default_polling_interval: u32,
    ) -> Self {
        Self {
            event_key: event_key.to_string(),
            path: def.path.clone(),
            state: ComponentState::Armed,
            enabled: false,
            trigger_once: def.trigger_once,
            cooldown_seconds: def.cooldown_seconds,
            time_since_last_trigger: f32::MAX,
            required_to_finish: def.required_to_finish,
            disable_on_trigger: Vec::new(),
            disabled_while_playing: Vec::new(),
            suppressed: Vec::new(),
            cascade_disabled: false,
            sources: def
                .triggers
                .iter()
                .map(|t| TriggerSource::from_def(t, default_polling_interval))
                .collect(),
            anchor,
            payload: def.payload.clone(),
            generation: 0,
            finish_due: None,
        }
    }

    pub fn event_key(&self) -> &str {
        &self.event_key
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn state(&self) -> ComponentState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == ComponentState::Playing
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_cascade_disabled(&self) -> bool {
        self.cascade_disabled
    }

    pub fn is_required(&self) -> bool {
        self.required_to_finish
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn anchor(&self) -> Option<EntityRef> {
        self.anchor
    }

    pub fn sources(&self) -> &[TriggerSource] {
        &self.sources
    }

    pub fn suppressed(&self) -> &[ComponentId] {
        &self.suppressed
    }

    /// Counts as done for composite completion.
    pub fn is_done(&self) -> bool {
        self.state == ComponentState::Finished
            || (!self.required_to_finish && self.state != ComponentState::Playing)
            || !self.enabled
    }

    fn can_subscribe(&self) -> bool {
        !self.cascade_disabled && !(self.trigger_once && self.state == ComponentState::Finished)
    }

    fn set_sources_active(&mut self, active: bool) {
        for source in &mut self.sources {
            if active {
                source.activate();
            } else {
                source.deactivate();
            }
        }
    }

    fn bump_generation(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }
}

/// Returned when a notification is admitted. The caller launches the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub component: ComponentId,
    pub event_key: String,
    pub path: String,
    pub generation: u32,
    pub triggerer: Option<EntityRef>,
    pub anchor: Option<EntityRef>,
    pub payload: Option<String>,
}

/// Diagnostic view of one component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentStatus {
    pub event: String,
    pub path: String,
    pub state: ComponentState,
    pub enabled: bool,
    pub cascade_disabled: bool,
}

/// Arena of all event components in a session.
#[derive(Debug, Clone, Default)]
pub struct ComponentStore {
    components: Arena<EventComponent>,
}

impl ComponentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, component: EventComponent) -> ComponentId {
        ComponentId(self.components.insert(component))
    }

    pub fn remove(&mut self, id: ComponentId) -> Option<EventComponent> {
        self.components.remove(id.0)
    }

    pub fn get(&self, id: ComponentId) -> Option<&EventComponent> {
        self.components.get(id.0)
    }

    pub fn is_valid(&self, id: ComponentId) -> bool {
        self.components.contains(id.0)
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ComponentId, &EventComponent)> {
        self.components.iter().map(|(k, c)| (ComponentId(k), c))
    }

    /// Sets the resolved sibling lists of a component.
    pub fn link(
        &mut self,
        id: ComponentId,
        disable_on_trigger: Vec<ComponentId>,
        disabled_while_playing: Vec<ComponentId>,
    ) {
        if let Some(c) = self.components.get_mut(id.0) {
            c.disable_on_trigger = disable_on_trigger;
            c.disabled_while_playing = disabled_while_playing;
        }
    }

    /// True while `generation` is the component's current generation.
    pub fn is_current(&self, id: ComponentId, generation: u32) -> bool {
        self.get(id).map(|c| c.generation == generation).unwrap_or(false)
    }

    /// Advances every cooldown clock.
    pub fn advance_time(&mut self, dt: f32) {
        for (_, c) in self.components.iter_mut() {
            c.time_since_last_trigger = (c.time_since_last_trigger + dt).min(f32::MAX);
        }
    }

    /// Offers a trigger to a component.
    pub fn notify(&mut self, id: ComponentId, triggerer: Option<EntityRef>) -> Option<Admission> {
        let c = self.components.get_mut(id.0)?;
        if !c.enabled || c.cascade_disabled || c.state != ComponentState::Armed {
            return None;
        }
        if !c.trigger_once && c.time_since_last_trigger < c.cooldown_seconds {
            return None;
        }

        c.time_since_last_trigger = 0.0;
        c.state = ComponentState::Playing;
        c.bump_generation();
        if !c.trigger_once {
            for source in &mut c.sources {
                source.clear();
            }
        }

        let admission = Admission {
            component: id,
            event_key: c.event_key.clone(),
            path: c.path.clone(),
            generation: c.generation,
            triggerer,
            anchor: c.anchor,
            payload: c.payload.clone(),
        };
        let disable = c.disable_on_trigger.clone();
        let suppress = c.disabled_while_playing.clone();

        for target in disable {
            self.cascade_disable(target);
        }

        let mut suppressed = Vec::new();
        for target in suppress {
            if let Some(t) = self.components.get_mut(target.0) {
                if t.enabled {
                    t.enabled = false;
                    t.set_sources_active(false);
                    suppressed.push(target);
                }
            }
        }
        if let Some(c) = self.components.get_mut(id.0) {
            c.suppressed = suppressed;
        }

        Some(admission)
    }

    fn cascade_disable(&mut self, id: ComponentId) {
        if let Some(c) = self.components.get_mut(id.0) {
            c.state = ComponentState::Finished;
            c.enabled = false;
            c.cascade_disabled = true;
            c.finish_due = None;
            c.bump_generation();
            c.set_sources_active(false);
        }
    }

    /// Schedules a payload's finish for the next tick.
    ///
    /// Only the generation decides staleness: a component suppressed while
    /// playing still accepts its own payload's finish. Returns false when the
    /// request was ignored.
    pub fn request_finish(&mut self, id: ComponentId, generation: u32, tick: u64) -> bool {
        let Some(c) = self.components.get_mut(id.0) else {
            return false;
        };
        if c.generation != generation || c.state != ComponentState::Playing {
            return false;
        }
        c.finish_due = Some(tick + 1);
        true
    }

    /// Applies every finish that is due at `tick`.
    pub fn apply_due_finishes(&mut self, tick: u64) -> Vec<ComponentId> {
        let due: Vec<ComponentId> = self
            .iter()
            .filter(|(_, c)| c.finish_due.map(|t| t <= tick).unwrap_or(false))
            .map(|(id, _)| id)
            .collect();

        for id in &due {
            self.finish(*id);
        }
        due
    }

    fn finish(&mut self, id: ComponentId) {
        let Some(c) = self.components.get_mut(id.0) else {
            return;
        };
        c.finish_due = None;
        if c.state != ComponentState::Playing {
            return;
        }
        if c.trigger_once {
            c.state = ComponentState::Finished;
            c.set_sources_active(false);
        } else {
            c.state = ComponentState::Armed;
        }
        let restore = std::mem::take(&mut c.suppressed);
        for target in restore {
            self.enable(target);
        }
    }

    /// Enables a component and subscribes its sources where allowed.
    pub fn enable(&mut self, id: ComponentId) {
        let Some(c) = self.components.get_mut(id.0) else {
            return;
        };
        if c.cascade_disabled {
            return;
        }
        c.enabled = true;
        let subscribe = c.can_subscribe();
        c.set_sources_active(subscribe);
    }

    pub fn disable(&mut self, id: ComponentId) {
        if let Some(c) = self.components.get_mut(id.0) {
            c.enabled = false;
            c.set_sources_active(false);
        }
    }

    /// Stops a component outright: `Finished`, disabled, and any running
    /// payload invalidated.
    pub fn force_finish(&mut self, id: ComponentId) {
        if let Some(c) = self.components.get_mut(id.0) {
            c.state = ComponentState::Finished;
            c.enabled = false;
            c.finish_due = None;
            c.suppressed.clear();
            c.bump_generation();
            c.set_sources_active(false);
        }
    }

    /// Returns a component to its freshly built state, keeping it disabled.
    pub fn reset(&mut self, id: ComponentId) {
        if let Some(c) = self.components.get_mut(id.0) {
            c.state = ComponentState::Armed;
            c.enabled = false;
            c.cascade_disabled = false;
            c.finish_due = None;
            c.suppressed.clear();
            c.time_since_last_trigger = f32::MAX;
            c.bump_generation();
            for source in &mut c.sources {
                source.deactivate();
                source.clear();
            }
        }
    }

    pub fn status(&self, id: ComponentId) -> Option<ComponentStatus> {
        self.get(id).map(|c| ComponentStatus {
            event: c.event_key.clone(),
            path: c.path.clone(),
            state: c.state,
            enabled: c.enabled,
            cascade_disabled: c.cascade_disabled,
        })
    }
}

impl SourceHost for ComponentStore {
    fn source_mut(&mut self, key: SourceKey) -> Option<(&mut TriggerSource, Option<EntityRef>)> {
        let c = self.components.get_mut(key.component.0)?;
        let anchor = c.anchor;
        c.sources.get_mut(key.index).map(|s| (s, anchor))
    }
}

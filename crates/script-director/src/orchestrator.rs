//! Per-session registries for composite events and tasks.
//!
//! The [`EventOrchestrator`] owns every runtime event component, the poll
//! scheduler and the suspended payloads. The [`TaskOrchestrator`] owns the
//! active tasks. Both count progression for their own document. Neither
//! knows about the other except through explicit parameters.

use std::collections::BTreeMap;
use std::sync::Arc;

use script_events::{
    CompositeEventDef, EntityRef, ProgressionRecord, Signal, SimTimestamp, TaskDef, Vec3,
};

use crate::component::{Admission, ComponentId, ComponentStatus, ComponentStore};
use crate::composite::{CompositeContext, CompositeEvent};
use crate::payload::{
    ContinuationOwner, ContinuationRunner, EmittedSignal, Launch, RunOutcome,
};
use crate::progression::{PersistenceError, ProgressionLedger, ProgressionStore};
use crate::registry::{EvalContext, ScriptRegistry};
use crate::scene::Scene;
use crate::scheduler::PollScheduler;
use crate::task::{Task, TaskOutcome, TaskState};
use crate::trigger::PollContext;
use crate::validate::{validate_event, validate_task, DefinitionError};

/// Tuning for the event side of the session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventSettings {
    /// Polling interval for triggers that do not declare one.
    pub default_polling_interval: u32,
    /// Margin added to interaction bounds.
    pub bounds_epsilon: f32,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            default_polling_interval: 10,
            bounds_epsilon: 0.05,
        }
    }
}

/// Registry of composite events and the machinery that drives them.
#[derive(Debug)]
pub struct EventOrchestrator {
    settings: EventSettings,
    registry: Arc<ScriptRegistry>,
    definitions: BTreeMap<String, Arc<CompositeEventDef>>,
    events: BTreeMap<String, CompositeEvent>,
    /// Keys of active events, in activation order.
    active: Vec<String>,
    store: ComponentStore,
    scheduler: PollScheduler,
    runner: ContinuationRunner,
    ledger: ProgressionLedger,
    emitted: Vec<EmittedSignal>,
}

impl EventOrchestrator {
    pub fn new(
        settings: EventSettings,
        registry: Arc<ScriptRegistry>,
        document: impl Into<String>,
    ) -> Self {
        Self {
            settings,
            registry,
            definitions: BTreeMap::new(),
            events: BTreeMap::new(),
            active: Vec::new(),
            store: ComponentStore::new(),
            scheduler: PollScheduler::new(),
            runner: ContinuationRunner::new(),
            ledger: ProgressionLedger::new(document),
            emitted: Vec::new(),
        }
    }

    pub fn settings(&self) -> EventSettings {
        self.settings
    }

    pub fn registry(&self) -> &ScriptRegistry {
        &self.registry
    }

    /// Validates and stores a definition.
    pub fn add_definition(&mut self, def: CompositeEventDef) -> Result<(), DefinitionError> {
        if self.definitions.contains_key(&def.key) {
            return Err(DefinitionError::DuplicateKey(def.key));
        }
        validate_event(&def, &self.registry)?;
        self.definitions.insert(def.key.clone(), Arc::new(def));
        Ok(())
    }

    pub fn definition(&self, key: &str) -> Option<&CompositeEventDef> {
        self.definitions.get(key).map(|d| d.as_ref())
    }

    pub fn definition_count(&self) -> usize {
        self.definitions.len()
    }

    /// Instantiates the event `key` bound to the subtree at `root`.
    ///
    /// Returns false for unknown keys and for events that already exist.
    pub fn spawn(&mut self, key: &str, root: Option<EntityRef>, scene: &mut dyn Scene) -> bool {
        let Some(def) = self.definitions.get(key).cloned() else {
            tracing::warn!("Cannot spawn unknown event {}", key);
            return false;
        };
        if self.events.contains_key(key) {
            tracing::warn!("Event {} is already spawned", key);
            return false;
        }

        let mut cx = CompositeContext {
            store: &mut self.store,
            scheduler: &mut self.scheduler,
            scene,
            default_polling_interval: self.settings.default_polling_interval,
        };
        let event = CompositeEvent::instantiate(def, root, &mut cx);
        self.events.insert(key.to_string(), event);
        true
    }

    pub fn event(&self, key: &str) -> Option<&CompositeEvent> {
        self.events.get(key)
    }

    /// Keys of active events, in activation order.
    pub fn active_events(&self) -> &[String] {
        &self.active
    }

    pub fn is_active(&self, key: &str) -> bool {
        self.active.iter().any(|k| k == key)
    }

    pub fn store(&self) -> &ComponentStore {
        &self.store
    }

    pub fn scheduler(&self) -> &PollScheduler {
        &self.scheduler
    }

    /// Number of payloads waiting to be resumed.
    pub fn running_payloads(&self) -> usize {
        self.runner.len()
    }

    /// Activates an event.
    ///
    /// A non-stackable event is refused while another non-stackable event
    /// is active. Enabling an event that is already active does nothing.
    pub fn enable_event(&mut self, key: &str, scene: &mut dyn Scene) -> bool {
        let Some(event) = self.events.get(key) else {
            tracing::warn!("Cannot enable unknown event {}", key);
            return false;
        };
        if self.is_active(key) {
            return false;
        }
        if !event.is_stackable() {
            let blocker = self.active.iter().find(|k| {
                self.events
                    .get(k.as_str())
                    .map(|e| !e.is_stackable())
                    .unwrap_or(false)
            });
            if let Some(blocker) = blocker {
                tracing::info!("Event {} refused while {} is active", key, blocker);
                return false;
            }
        }

        let Some(event) = self.events.get_mut(key) else {
            return false;
        };
        let mut cx = CompositeContext {
            store: &mut self.store,
            scheduler: &mut self.scheduler,
            scene,
            default_polling_interval: self.settings.default_polling_interval,
        };
        event.enable(&mut cx);
        self.active.push(key.to_string());
        tracing::debug!("Enabled event {}", key);
        true
    }

    /// Stops an event and removes it from the active set.
    pub fn disable_event(&mut self, key: &str, scene: &mut dyn Scene) -> bool {
        let Some(event) = self.events.get_mut(key) else {
            return false;
        };
        let mut cx = CompositeContext {
            store: &mut self.store,
            scheduler: &mut self.scheduler,
            scene,
            default_polling_interval: self.settings.default_polling_interval,
        };
        event.disable(&mut cx);
        self.active.retain(|k| k != key);
        tracing::debug!("Disabled event {}", key);
        true
    }

    /// Returns an event to its initial condition without changing whether it
    /// is active.
    pub fn restart_event(&mut self, key: &str, scene: &mut dyn Scene) -> bool {
        let Some(event) = self.events.get_mut(key) else {
            return false;
        };
        let mut cx = CompositeContext {
            store: &mut self.store,
            scheduler: &mut self.scheduler,
            scene,
            default_polling_interval: self.settings.default_polling_interval,
        };
        event.restart(&mut cx);
        true
    }

    /// Disables every active event.
    pub fn disable_all(&mut self, scene: &mut dyn Scene) {
        for key in self.active.clone() {
            self.disable_event(&key, scene);
        }
    }

    /// Fires the manual sources of component `path` in event `key`.
    pub fn fire_manual(
        &mut self,
        key: &str,
        path: &str,
        actor: Option<EntityRef>,
        scene: &mut dyn Scene,
        now: SimTimestamp,
    ) -> Option<Admission> {
        let id = self.events.get(key)?.component(path, &self.store)?;
        let component = self.store.get(id)?;
        let armed = component
            .sources()
            .iter()
            .any(|s| s.is_manual() && s.is_active());
        if !armed {
            tracing::debug!("No active manual trigger on {}/{}", key, path);
            return None;
        }
        let admission = self.store.notify(id, actor)?;
        self.admit(&admission, scene, now);
        Some(admission)
    }

    /// Notifies every active interaction source listening for `signal`, then
    /// forwards the signal to the tasks.
    ///
    /// `target` is the world position of the interacted object. Sources with
    /// bounds only match when it lies inside them.
    pub fn interaction_occurred(
        &mut self,
        signal: &Signal,
        target: Option<Vec3>,
        actor: Option<EntityRef>,
        tasks: &mut TaskOrchestrator,
        scene: &mut dyn Scene,
        now: SimTimestamp,
    ) -> Vec<Admission> {
        let mut matched: Vec<ComponentId> = Vec::new();
        for key in &self.active {
            let Some(event) = self.events.get(key) else {
                continue;
            };
            for id in event.components() {
                let Some(component) = self.store.get(*id) else {
                    continue;
                };
                for source in component.sources() {
                    if source.matches_interaction(
                        signal,
                        target,
                        component.anchor(),
                        &*scene,
                        self.settings.bounds_epsilon,
                    ) {
                        matched.push(*id);
                    }
                }
            }
        }

        let mut admissions = Vec::new();
        for id in matched {
            if let Some(admission) = self.store.notify(id, actor) {
                self.admit(&admission, scene, now);
                admissions.push(admission);
            }
        }

        tasks.submit_signal(signal, actor);
        admissions
    }

    /// Advances cooldown clocks and applies the finishes due this tick.
    pub fn begin_tick(&mut self, dt: f32, now: SimTimestamp) -> Vec<ComponentId> {
        self.store.advance_time(dt);
        self.store.apply_due_finishes(now.tick)
    }

    /// Runs one scheduler sweep and admits its notifications in poll order.
    pub fn poll_triggers(&mut self, scene: &mut dyn Scene, now: SimTimestamp) -> Vec<Admission> {
        let sweep = {
            let cx = PollContext {
                scene: &*scene,
                now: now.seconds,
            };
            self.scheduler.sweep(&mut self.store, &cx)
        };

        let mut admissions = Vec::new();
        for notification in sweep.notifications {
            if let Some(admission) = self
                .store
                .notify(notification.source.component, notification.triggerer)
            {
                self.admit(&admission, scene, now);
                admissions.push(admission);
            }
        }
        admissions
    }

    /// Resumes every payload due at `now`.
    pub fn resume_payloads(&mut self, scene: &mut dyn Scene, now: SimTimestamp) {
        let store = &self.store;
        let outcome = self.runner.run_due(now, scene, |owner| match owner {
            ContinuationOwner::Component { id, generation } => store.is_current(*id, *generation),
            ContinuationOwner::Task { .. } => true,
        });
        self.apply_outcome(outcome, now);
    }

    /// Disables every active event whose completion predicate became true,
    /// and returns their keys.
    pub fn sweep_completions(&mut self, scene: &mut dyn Scene) -> Vec<String> {
        let mut completed = Vec::new();
        for key in self.active.clone() {
            let Some(event) = self.events.get_mut(&key) else {
                continue;
            };
            if event.check_completion(&self.store) {
                completed.push(key);
            }
        }

        for key in &completed {
            self.disable_event(key, scene);
            self.ledger.record_completed(key);
            tracing::info!("Event {} completed", key);
        }
        completed
    }

    /// Starts a payload that is not bound to a component, such as a task
    /// lifecycle hook.
    pub fn launch(
        &mut self,
        payload: &str,
        owner: ContinuationOwner,
        owner_entity: Option<EntityRef>,
        scene: &mut dyn Scene,
        now: SimTimestamp,
    ) -> bool {
        let Some(instance) = self.registry.instantiate(payload) else {
            tracing::warn!("Unknown payload {}", payload);
            return false;
        };
        let launch = Launch {
            owner,
            owner_entity,
            anchor: None,
            triggerer: owner_entity,
        };
        let outcome = self.runner.start(instance, launch, now, scene);
        self.apply_outcome(outcome, now);
        true
    }

    /// Signals raised by payloads since the last call.
    pub fn take_signals(&mut self) -> Vec<EmittedSignal> {
        std::mem::take(&mut self.emitted)
    }

    /// Stops every payload launched for a task. Returns how many were dropped.
    pub fn discard_task_payloads(&mut self) -> usize {
        self.runner
            .discard(|owner| matches!(owner, ContinuationOwner::Task { .. }))
    }

    /// State of every component, grouped by event key.
    pub fn component_states(&self) -> Vec<ComponentStatus> {
        self.events
            .values()
            .flat_map(|event| event.components().iter())
            .filter_map(|id| self.store.status(*id))
            .collect()
    }

    /// True while component `path` of event `key` is running its payload.
    pub fn is_playing(&self, key: &str, path: &str) -> bool {
        self.events
            .get(key)
            .and_then(|e| e.component(path, &self.store))
            .and_then(|id| self.store.get(id))
            .map(|c| c.is_playing())
            .unwrap_or(false)
    }

    pub fn progression(&mut self, key: &str) -> ProgressionRecord {
        self.ledger.get(key)
    }

    pub fn ledger(&self) -> &ProgressionLedger {
        &self.ledger
    }

    pub fn save_progression(&self, store: &mut dyn ProgressionStore) -> Result<(), PersistenceError> {
        self.ledger.save(store)
    }

    pub fn load_progression(&mut self, store: &dyn ProgressionStore) -> Result<usize, PersistenceError> {
        self.ledger.load(store)
    }

    fn admit(&mut self, admission: &Admission, scene: &mut dyn Scene, now: SimTimestamp) {
        self.ledger.record_triggered(&admission.event_key);
        tracing::debug!(
            "Admitted {}/{} (generation {})",
            admission.event_key,
            admission.path,
            admission.generation
        );

        let payload = match &admission.payload {
            Some(name) => match self.registry.instantiate(name) {
                Some(payload) => payload,
                None => {
                    tracing::warn!("Payload {} is not registered", name);
                    self.store
                        .request_finish(admission.component, admission.generation, now.tick);
                    return;
                }
            },
            None => {
                self.store
                    .request_finish(admission.component, admission.generation, now.tick);
                return;
            }
        };

        let launch = Launch {
            owner: ContinuationOwner::Component {
                id: admission.component,
                generation: admission.generation,
            },
            owner_entity: self
                .events
                .get(&admission.event_key)
                .and_then(|e| e.subtree()),
            anchor: admission.anchor,
            triggerer: admission.triggerer,
        };
        let outcome = self.runner.start(payload, launch, now, scene);
        self.apply_outcome(outcome, now);
    }

    fn apply_outcome(&mut self, outcome: RunOutcome, now: SimTimestamp) {
        for finish in outcome.finishes {
            self.store
                .request_finish(finish.component, finish.generation, now.tick);
        }
        self.emitted.extend(outcome.emitted);
    }
}

/// A task payload waiting to be launched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskLaunch {
    pub task: String,
    pub owner: EntityRef,
    pub payload: String,
}

/// A task that reached a terminal state this tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    pub task: String,
    pub owner: EntityRef,
    pub outcome: TaskOutcome,
}

/// Registry of task definitions and the tasks currently assigned.
#[derive(Debug)]
pub struct TaskOrchestrator {
    registry: Arc<ScriptRegistry>,
    definitions: BTreeMap<String, Arc<TaskDef>>,
    active: Vec<Task>,
    ledger: ProgressionLedger,
    launches: Vec<TaskLaunch>,
}

impl TaskOrchestrator {
    pub fn new(registry: Arc<ScriptRegistry>, document: impl Into<String>) -> Self {
        Self {
            registry,
            definitions: BTreeMap::new(),
            active: Vec::new(),
            ledger: ProgressionLedger::new(document),
            launches: Vec::new(),
        }
    }

    pub fn add_definition(&mut self, def: TaskDef) -> Result<(), DefinitionError> {
        if self.definitions.contains_key(&def.key) {
            return Err(DefinitionError::DuplicateKey(def.key));
        }
        validate_task(&def, &self.registry)?;
        self.definitions.insert(def.key.clone(), Arc::new(def));
        Ok(())
    }

    pub fn definition(&self, key: &str) -> Option<&TaskDef> {
        self.definitions.get(key).map(|d| d.as_ref())
    }

    pub fn definition_count(&self) -> usize {
        self.definitions.len()
    }

    /// Starts task `key` for `owner`.
    ///
    /// Returns false for unknown keys and when `owner` already has the task.
    /// The `on_start` payload is queued for [`Self::take_launches`].
    pub fn assign(&mut self, key: &str, owner: EntityRef) -> bool {
        let Some(def) = self.definitions.get(key).cloned() else {
            tracing::warn!("Cannot assign unknown task {}", key);
            return false;
        };
        if self.task(key, owner).is_some() {
            tracing::debug!("Task {} already assigned to {}", key, owner);
            return false;
        }

        let mut task = Task::new(def, owner);
        if let Some(payload) = task.start() {
            self.launches.push(TaskLaunch {
                task: key.to_string(),
                owner,
                payload: payload.to_string(),
            });
        }
        self.ledger.record_triggered(key);
        self.active.push(task);
        tracing::info!("Assigned task {} to {}", key, owner);
        true
    }

    /// Removes task `key` from `owner` without an outcome.
    pub fn unassign(&mut self, key: &str, owner: EntityRef) -> bool {
        let before = self.active.len();
        self.active
            .retain(|t| !(t.key() == key && t.owner() == owner));
        before != self.active.len()
    }

    /// Drops every active task.
    pub fn clear(&mut self) {
        self.active.clear();
        self.launches.clear();
    }

    pub fn task(&self, key: &str, owner: EntityRef) -> Option<&Task> {
        self.active
            .iter()
            .find(|t| t.key() == key && t.owner() == owner)
    }

    pub fn active(&self) -> &[Task] {
        &self.active
    }

    /// Credits `signal` to every in-progress task it applies to. Returns the
    /// number of tasks credited.
    pub fn submit_signal(&mut self, signal: &Signal, actor: Option<EntityRef>) -> usize {
        self.active
            .iter_mut()
            .map(|t| t.submit_signal(signal, actor))
            .filter(|credited| *credited)
            .count()
    }

    /// Runs the wave machine of every task and retires terminal ones.
    pub fn tick(&mut self, dt: f32, scene: &dyn Scene, now: SimTimestamp) -> Vec<TaskReport> {
        let mut reports = Vec::new();
        for task in &mut self.active {
            let cx = EvalContext {
                owner: task.owner(),
                scene,
                now,
            };
            let Some(outcome) = task.tick(dt, &self.registry, &cx) else {
                continue;
            };

            if outcome == TaskOutcome::Succeeded {
                self.ledger.record_completed(task.key());
            }
            tracing::info!("Task {} for {} ended: {:?}", task.key(), task.owner(), outcome);
            if let Some(payload) = task.outcome_payload(outcome) {
                self.launches.push(TaskLaunch {
                    task: task.key().to_string(),
                    owner: task.owner(),
                    payload: payload.to_string(),
                });
            }
            reports.push(TaskReport {
                task: task.key().to_string(),
                owner: task.owner(),
                outcome,
            });
        }

        self.active.retain(|t| !t.state().is_terminal());
        reports
    }

    /// Payloads queued by starts and outcomes since the last call.
    pub fn take_launches(&mut self) -> Vec<TaskLaunch> {
        std::mem::take(&mut self.launches)
    }

    pub fn progression(&mut self, key: &str) -> ProgressionRecord {
        self.ledger.get(key)
    }

    pub fn ledger(&self) -> &ProgressionLedger {
        &self.ledger
    }

    pub fn save_progression(&self, store: &mut dyn ProgressionStore) -> Result<(), PersistenceError> {
        self.ledger.save(store)
    }

    pub fn load_progression(&mut self, store: &dyn ProgressionStore) -> Result<usize, PersistenceError> {
        self.ledger.load(store)
    }

    /// True while some task is in progress.
    pub fn has_running(&self) -> bool {
        self.active
            .iter()
            .any(|t| t.state() == TaskState::InProgress)
    }
}

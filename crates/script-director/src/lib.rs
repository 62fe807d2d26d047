//! Script Director: scripted events and quests on a tick clock.
//!
//! The director decides when authored moments in the world fire, tracks
//! multi-step task progress and amortizes the cost of continuously evaluated
//! conditions across ticks. The world itself stays outside this crate,
//! behind the [`Scene`] trait.
//!
//! # Architecture
//!
//! ```text
//! interaction ──▶ ScriptDirector ──▶ EventOrchestrator ──▶ components ──▶ payloads
//!                      │                    ▲                  ▲
//!                      │                    └── PollScheduler ─┘
//!                      ├──▶ TaskOrchestrator ──▶ waves
//!                      └──▶ Outbox ──▶ other participants ──▶ receive()
//! ```
//!
//! # Modules
//!
//! - [`trigger`] and [`scheduler`]: trigger sources and amortized polling
//! - [`component`] and [`composite`]: event lifecycles
//! - [`payload`] and [`registry`]: scripted reactions as continuations
//! - [`task`]: the subtask wave machine
//! - [`orchestrator`]: per-session registries and signal fan-out
//! - [`progression`]: persisted counters
//! - [`replication`]: envelopes and duplicate suppression
//! - [`config`]: TOML configuration

pub mod arena;
pub mod component;
pub mod composite;
pub mod config;
pub mod orchestrator;
pub mod payload;
pub mod progression;
pub mod registry;
pub mod replication;
pub mod scene;
pub mod scheduler;
pub mod task;
pub mod trigger;
pub mod validate;

// Re-export config types
pub use config::{
    default_config_toml, ClockConfig, ConfigError, DirectorConfig, InteractionConfig,
    PersistenceConfig, ReplicationConfig, SchedulerConfig, TomlSerializeError,
};

// Re-export runtime types
pub use component::{Admission, ComponentId, ComponentState, ComponentStatus};
pub use composite::{CompositeEvent, CompositeState};
pub use orchestrator::{EventOrchestrator, EventSettings, TaskLaunch, TaskOrchestrator, TaskReport};
pub use payload::{Payload, PayloadContext, PayloadStep, Sequence};
pub use registry::{EvalContext, ScriptRegistry};
pub use scene::{InMemoryScene, Placement, Scene, SubtreeSnapshot};
pub use task::{Task, TaskOutcome, TaskState};

// Re-export persistence and replication types
pub use progression::{
    InMemoryStore, JsonFileStore, PersistenceError, ProgressionLedger, ProgressionStore,
};
pub use replication::{DeliveryLog, Outbox, SignalEnvelope, SignalKind};
pub use validate::DefinitionError;

use std::path::Path;
use std::sync::Arc;

use uuid::Uuid;

use script_events::{DefinitionsError, EntityRef, ScriptDefinitions, Signal, SimTimestamp};

use payload::ContinuationOwner;

/// Errors that can occur in director operations.
#[derive(Debug)]
pub enum DirectorError {
    /// Error loading configuration
    Config(ConfigError),
    /// Error reading a definitions bundle
    Definitions(DefinitionsError),
    /// Error reading or writing progression
    Persistence(PersistenceError),
}

impl std::fmt::Display for DirectorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DirectorError::Config(e) => write!(f, "Config error: {}", e),
            DirectorError::Definitions(e) => write!(f, "Definitions error: {}", e),
            DirectorError::Persistence(e) => write!(f, "Persistence error: {}", e),
        }
    }
}

impl std::error::Error for DirectorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DirectorError::Config(e) => Some(e),
            DirectorError::Definitions(e) => Some(e),
            DirectorError::Persistence(e) => Some(e),
        }
    }
}

impl From<ConfigError> for DirectorError {
    fn from(e: ConfigError) -> Self {
        DirectorError::Config(e)
    }
}

impl From<DefinitionsError> for DirectorError {
    fn from(e: DefinitionsError) -> Self {
        DirectorError::Definitions(e)
    }
}

impl From<PersistenceError> for DirectorError {
    fn from(e: PersistenceError) -> Self {
        DirectorError::Persistence(e)
    }
}

/// What happened during one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    /// Components admitted by polled triggers or by signals payloads emitted.
    pub admissions: Vec<Admission>,
    /// Components whose deferred finish was applied.
    pub finished_components: Vec<ComponentId>,
    /// Events whose completion predicate became true.
    pub completed_events: Vec<String>,
    pub task_outcomes: Vec<TaskReport>,
}

impl TickReport {
    pub fn is_quiet(&self) -> bool {
        self.admissions.is_empty()
            && self.finished_components.is_empty()
            && self.completed_events.is_empty()
            && self.task_outcomes.is_empty()
    }
}

/// One participant's view of a scripted session.
///
/// Owns both orchestrators and the tick clock. Each call to [`tick`] runs,
/// in order:
/// 1. Advance the clock and every cooldown
/// 2. Apply component finishes deferred from the previous tick
/// 3. Sweep polled triggers and admit their notifications
/// 4. Resume due payloads, then fan out the signals payloads emitted
/// 5. Complete events whose components are all done
/// 6. Run task waves and launch outcome payloads
///
/// [`tick`]: ScriptDirector::tick
#[derive(Debug)]
pub struct ScriptDirector {
    /// Configuration settings
    config: DirectorConfig,
    /// Current simulation time
    clock: SimTimestamp,
    events: EventOrchestrator,
    tasks: TaskOrchestrator,
    /// Identity of this participant in replicated envelopes
    participant: Uuid,
    outbox: Outbox,
    delivery: DeliveryLog,
}

impl ScriptDirector {
    /// Creates a new director with the given configuration and scripts.
    pub fn new(config: DirectorConfig, registry: ScriptRegistry) -> Self {
        let registry = Arc::new(registry);
        let settings = EventSettings {
            default_polling_interval: config.scheduler.default_max_polling_interval,
            bounds_epsilon: config.interaction.bounds_epsilon,
        };
        let participant = Uuid::new_v4();

        Self {
            events: EventOrchestrator::new(
                settings,
                Arc::clone(&registry),
                config.persistence.events_document.clone(),
            ),
            tasks: TaskOrchestrator::new(registry, config.persistence.tasks_document.clone()),
            clock: SimTimestamp::start(),
            participant,
            outbox: Outbox::new(participant),
            delivery: DeliveryLog::new(config.replication.reorder_window),
            config,
        }
    }

    /// Creates a director from a configuration file.
    pub fn from_config_file(path: &Path, registry: ScriptRegistry) -> Result<Self, DirectorError> {
        let config = DirectorConfig::from_file(path)?;
        Ok(Self::new(config, registry))
    }

    /// Creates a director with default configuration.
    pub fn with_registry(registry: ScriptRegistry) -> Self {
        Self::new(DirectorConfig::default(), registry)
    }

    pub fn config(&self) -> &DirectorConfig {
        &self.config
    }

    pub fn clock(&self) -> SimTimestamp {
        self.clock
    }

    pub fn participant(&self) -> Uuid {
        self.participant
    }

    pub fn events(&self) -> &EventOrchestrator {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut EventOrchestrator {
        &mut self.events
    }

    pub fn tasks(&self) -> &TaskOrchestrator {
        &self.tasks
    }

    pub fn tasks_mut(&mut self) -> &mut TaskOrchestrator {
        &mut self.tasks
    }

    /// Adds every valid definition in `defs`.
    ///
    /// Invalid definitions are skipped and returned; the rest load.
    pub fn load_definitions(&mut self, defs: ScriptDefinitions) -> Vec<DefinitionError> {
        let mut rejected = Vec::new();
        for def in defs.events {
            let key = def.key.clone();
            if let Err(e) = self.events.add_definition(def) {
                tracing::warn!("Skipping event {}: {}", key, e);
                rejected.push(e);
            }
        }
        for def in defs.tasks {
            let key = def.key.clone();
            if let Err(e) = self.tasks.add_definition(def) {
                tracing::warn!("Skipping task {}: {}", key, e);
                rejected.push(e);
            }
        }
        tracing::info!(
            "Loaded {} events and {} tasks",
            self.events.definition_count(),
            self.tasks.definition_count()
        );
        rejected
    }

    /// Reads a definitions bundle from a JSON file and loads it.
    pub fn load_definitions_file(&mut self, path: &Path) -> Result<Vec<DefinitionError>, DirectorError> {
        let defs = ScriptDefinitions::from_file(path)?;
        Ok(self.load_definitions(defs))
    }

    pub fn spawn_event(&mut self, key: &str, root: Option<EntityRef>, scene: &mut dyn Scene) -> bool {
        self.events.spawn(key, root, scene)
    }

    pub fn enable_event(&mut self, key: &str, scene: &mut dyn Scene) -> bool {
        self.events.enable_event(key, scene)
    }

    pub fn disable_event(&mut self, key: &str, scene: &mut dyn Scene) -> bool {
        self.events.disable_event(key, scene)
    }

    pub fn restart_event(&mut self, key: &str, scene: &mut dyn Scene) -> bool {
        self.events.restart_event(key, scene)
    }

    /// Fires the manual triggers of one component.
    pub fn fire_manual(
        &mut self,
        key: &str,
        path: &str,
        actor: Option<EntityRef>,
        scene: &mut dyn Scene,
    ) -> Option<Admission> {
        self.events.fire_manual(key, path, actor, scene, self.clock)
    }

    /// Starts a task for `owner` and launches its `on_start` payload.
    pub fn assign_task(&mut self, key: &str, owner: EntityRef, scene: &mut dyn Scene) -> bool {
        let assigned = self.tasks.assign(key, owner);
        self.launch_task_payloads(scene);
        assigned
    }

    pub fn unassign_task(&mut self, key: &str, owner: EntityRef) -> bool {
        self.tasks.unassign(key, owner)
    }

    /// Reports an interaction with `target` by `actor`.
    ///
    /// Applied locally at once, then queued for other participants with the
    /// target's world position resolved here.
    pub fn interaction_occurred(
        &mut self,
        signal: &Signal,
        target: Option<EntityRef>,
        actor: Option<EntityRef>,
        scene: &mut dyn Scene,
    ) -> Vec<Admission> {
        let position = target.and_then(|t| scene.world_position(t));
        let admissions = self.events.interaction_occurred(
            signal,
            position,
            actor,
            &mut self.tasks,
            scene,
            self.clock,
        );
        if self.config.replication.enabled {
            self.outbox.push(
                SignalKind::Interaction { target: position },
                signal.clone(),
                actor,
            );
        }
        admissions
    }

    /// Credits `signal` to the tasks only.
    pub fn submit_signal(&mut self, signal: &Signal, actor: Option<EntityRef>) -> usize {
        let credited = self.tasks.submit_signal(signal, actor);
        if self.config.replication.enabled {
            self.outbox.push(SignalKind::Progress, signal.clone(), actor);
        }
        credited
    }

    /// Applies an envelope from another participant.
    ///
    /// Returns false for envelopes this participant sent and for duplicates.
    pub fn receive(&mut self, envelope: &SignalEnvelope, scene: &mut dyn Scene) -> bool {
        if envelope.origin == self.participant {
            return false;
        }
        if !self.delivery.accept(envelope.origin, envelope.sequence) {
            tracing::debug!(
                "Dropping duplicate {} #{} from {}",
                envelope.signal,
                envelope.sequence,
                envelope.origin
            );
            return false;
        }

        match &envelope.kind {
            SignalKind::Interaction { target } => {
                self.events.interaction_occurred(
                    &envelope.signal,
                    *target,
                    envelope.actor,
                    &mut self.tasks,
                    scene,
                    self.clock,
                );
            }
            SignalKind::Progress => {
                self.tasks.submit_signal(&envelope.signal, envelope.actor);
            }
        }
        true
    }

    /// Envelopes queued for other participants since the last call.
    pub fn drain_outbox(&mut self) -> Vec<SignalEnvelope> {
        self.outbox.drain()
    }

    /// Runs one tick against `scene`.
    pub fn tick(&mut self, scene: &mut dyn Scene) -> TickReport {
        let dt = self.config.clock.tick_seconds;

        // 1-2. Clock, cooldowns, deferred finishes
        self.clock.advance_tick(dt);
        let now = self.clock;
        let finished_components = self.events.begin_tick(dt, now);

        // 3. Polled triggers
        let mut admissions = self.events.poll_triggers(scene, now);

        // 4. Payloads, then one pass over the signals they raised
        self.events.resume_payloads(scene, now);
        for emitted in self.events.take_signals() {
            let admitted = self.events.interaction_occurred(
                &emitted.signal,
                None,
                emitted.actor,
                &mut self.tasks,
                scene,
                now,
            );
            admissions.extend(admitted);
        }

        // 5. Event completion
        let completed_events = self.events.sweep_completions(scene);

        // 6. Task waves
        let task_outcomes = self.tasks.tick(dt, &*scene, now);
        self.launch_task_payloads(scene);

        TickReport {
            tick: now.tick,
            admissions,
            finished_components,
            completed_events,
            task_outcomes,
        }
    }

    /// Ends the current day: every active event is disabled so its next
    /// enable restarts it, every task is dropped along with its running
    /// payloads, and progression is saved when configured.
    ///
    /// Signals raised but not yet fanned out are discarded.
    pub fn roll_over_day(
        &mut self,
        scene: &mut dyn Scene,
        store: &mut dyn ProgressionStore,
    ) -> Result<(), DirectorError> {
        self.events.disable_all(scene);
        self.tasks.clear();
        let dropped = self.events.discard_task_payloads();
        let pending = self.events.take_signals().len();
        self.clock.advance_day();
        tracing::info!(
            "Rolled over to day {} (dropped {} task payloads, {} pending signals)",
            self.clock.day,
            dropped,
            pending
        );

        if self.config.persistence.save_on_rollover {
            self.save_progression(store)?;
        }
        Ok(())
    }

    /// File store for the configured progression directory.
    pub fn progression_store(&self) -> JsonFileStore {
        JsonFileStore::new(self.config.persistence.directory.clone())
    }

    pub fn save_progression(&self, store: &mut dyn ProgressionStore) -> Result<(), DirectorError> {
        self.events.save_progression(store)?;
        self.tasks.save_progression(store)?;
        Ok(())
    }

    /// Replaces the in-memory counters with the stored ones. Returns the
    /// number of records read.
    pub fn load_progression(&mut self, store: &dyn ProgressionStore) -> Result<usize, DirectorError> {
        let events = self.events.load_progression(store)?;
        let tasks = self.tasks.load_progression(store)?;
        Ok(events + tasks)
    }

    pub fn component_states(&self) -> Vec<ComponentStatus> {
        self.events.component_states()
    }

    fn launch_task_payloads(&mut self, scene: &mut dyn Scene) {
        for launch in self.tasks.take_launches() {
            self.events.launch(
                &launch.payload,
                ContinuationOwner::Task { key: launch.task },
                Some(launch.owner),
                scene,
                self.clock,
            );
        }
    }
}

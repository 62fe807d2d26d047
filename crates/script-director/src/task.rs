//! Tasks and their subtask waves.
//!
//! Subtasks sharing an `order` form a wave. A task only evaluates the current
//! wave, but signal progress is credited to matching subtasks in every wave,
//! so later waves can be pre-credited before they open.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use script_events::{EntityRef, Signal, SubtaskDef, TaskDef};

use crate::registry::{EvalContext, ScriptRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    NotStarted,
    InProgress,
    Succeeded,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed)
    }
}

/// Terminal result of a task tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    Succeeded,
    Failed,
}

/// Runtime progress of one subtask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subtask {
    pub order: i32,
    pub trigger_signal: Option<Signal>,
    pub evaluator: Option<String>,
    pub amount_to_complete: i32,
    current_amount: i32,
    completed: bool,
}

impl Subtask {
    pub fn from_def(def: &SubtaskDef) -> Self {
        Self {
            order: def.order,
            trigger_signal: def.trigger_signal.clone(),
            evaluator: def.evaluator.clone(),
            amount_to_complete: def.amount_to_complete,
            current_amount: 0,
            completed: false,
        }
    }

    pub fn current_amount(&self) -> i32 {
        self.current_amount
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    fn reset(&mut self) {
        self.current_amount = 0;
        self.completed = false;
    }
}

/// Runtime instance of a [`TaskDef`] assigned to one owner.
#[derive(Debug, Clone)]
pub struct Task {
    def: Arc<TaskDef>,
    owner: EntityRef,
    subtasks: Vec<Subtask>,
    current_wave: i32,
    timer: f32,
    state: TaskState,
}

impl Task {
    pub fn new(def: Arc<TaskDef>, owner: EntityRef) -> Self {
        let subtasks: Vec<Subtask> = def.subtasks.iter().map(Subtask::from_def).collect();
        Self {
            current_wave: first_wave(&subtasks),
            timer: def.time_limit_seconds,
            def,
            owner,
            subtasks,
            state: TaskState::NotStarted,
        }
    }

    pub fn key(&self) -> &str {
        &self.def.key
    }

    pub fn definition(&self) -> &TaskDef {
        &self.def
    }

    pub fn owner(&self) -> EntityRef {
        self.owner
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn current_wave(&self) -> i32 {
        self.current_wave
    }

    /// Seconds left on the time limit.
    pub fn time_remaining(&self) -> f32 {
        self.timer
    }

    pub fn subtasks(&self) -> &[Subtask] {
        &self.subtasks
    }

    /// Moves to `InProgress` and arms the timer. Returns the `on_start`
    /// payload name.
    pub fn start(&mut self) -> Option<&str> {
        self.state = TaskState::InProgress;
        self.timer = self.def.time_limit_seconds;
        self.def.on_start.as_deref()
    }

    /// Credits one unit to every subtask listening for `signal`, in any wave.
    ///
    /// Ignored unless the task is in progress and either global or owned by
    /// `actor`. Returns true if anything was credited.
    pub fn submit_signal(&mut self, signal: &Signal, actor: Option<EntityRef>) -> bool {
        if self.state != TaskState::InProgress {
            return false;
        }
        if !self.def.global && actor != Some(self.owner) {
            return false;
        }

        let mut credited = false;
        for subtask in &mut self.subtasks {
            if subtask.trigger_signal.as_ref() == Some(signal) {
                subtask.current_amount = subtask.current_amount.saturating_add(1);
                credited = true;
            }
        }
        credited
    }

    /// Runs one tick of the wave machine.
    ///
    /// Evaluator readings only raise `current_amount`; a later, lower reading
    /// never un-completes a subtask.
    pub fn tick(
        &mut self,
        dt: f32,
        registry: &ScriptRegistry,
        cx: &EvalContext<'_>,
    ) -> Option<TaskOutcome> {
        if self.state != TaskState::InProgress {
            return None;
        }
        if self.def.time_limited {
            self.timer -= dt;
        }

        let wave = self.current_wave;
        for subtask in self.subtasks.iter_mut().filter(|s| s.order == wave) {
            if let Some(evaluator) = &subtask.evaluator {
                let measured = registry.evaluate(evaluator, cx).unwrap_or(0);
                subtask.current_amount = subtask.current_amount.max(measured);
            }
            subtask.completed = subtask.current_amount >= subtask.amount_to_complete;
        }

        if self.subtasks.iter().all(|s| s.completed) {
            self.state = TaskState::Succeeded;
            return Some(TaskOutcome::Succeeded);
        }

        let condition_failed = self
            .def
            .fail_condition
            .as_deref()
            .and_then(|name| registry.check(name, cx))
            .unwrap_or(false);
        let timed_out = self.def.time_limited && self.timer <= 0.0;
        if condition_failed || timed_out {
            self.state = TaskState::Failed;
            return Some(TaskOutcome::Failed);
        }

        if self
            .subtasks
            .iter()
            .filter(|s| s.order == wave)
            .all(|s| s.completed)
        {
            self.current_wave = next_wave(&self.subtasks, wave);
        }
        None
    }

    /// Payload to run for a terminal outcome.
    pub fn outcome_payload(&self, outcome: TaskOutcome) -> Option<&str> {
        match outcome {
            TaskOutcome::Succeeded => self.def.on_success.as_deref(),
            TaskOutcome::Failed => self.def.on_fail.as_deref(),
        }
    }

    /// Back to `NotStarted` with every counter cleared.
    pub fn reset(&mut self) {
        self.state = TaskState::NotStarted;
        self.current_wave = first_wave(&self.subtasks);
        self.timer = self.def.time_limit_seconds;
        for subtask in &mut self.subtasks {
            subtask.reset();
        }
    }
}

/// Wave zero, or the lowest order when some are negative.
fn first_wave(subtasks: &[Subtask]) -> i32 {
    subtasks.iter().map(|s| s.order).min().unwrap_or(0).min(0)
}

/// Smallest order above `wave`, or `wave + 1` when none remain.
fn next_wave(subtasks: &[Subtask], wave: i32) -> i32 {
    subtasks
        .iter()
        .map(|s| s.order)
        .filter(|o| *o > wave)
        .min()
        .unwrap_or(wave.saturating_add(1))
}

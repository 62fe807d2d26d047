//! Authoring formats for scripted events and tasks.
//!
//! Definitions are static data. The director instantiates runtime state from
//! them at session start, on day rollover, and when an event is reinstantiated.
//! Payloads, evaluators and fail conditions are referenced by name and resolved
//! against a registry when the definitions are loaded.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::geometry::Vec3;
use crate::signal::Signal;

fn default_true() -> bool {
    true
}

fn default_amount() -> i32 {
    1
}

fn default_min_occupants() -> usize {
    1
}

/// Condition that notifies an event component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerDef {
    /// Fires for every actor that newly enters the area.
    AreaEnter {
        #[serde(default)]
        offset: Vec3,
        extent: Vec3,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_polling_interval: Option<u32>,
    },
    /// Like `AreaEnter`, but only while at least `min_occupants` are inside.
    AreaOccupancy {
        #[serde(default)]
        offset: Vec3,
        extent: Vec3,
        #[serde(default = "default_min_occupants")]
        min_occupants: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_polling_interval: Option<u32>,
    },
    /// Fires when a matching interaction signal is reported.
    InteractionMatch {
        identifier: Signal,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bounds: Option<BoundsDef>,
    },
    /// Fires every `interval_seconds` of simulation time.
    Timer {
        interval_seconds: f32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_polling_interval: Option<u32>,
    },
    /// Fired explicitly by gameplay code.
    Manual,
}

impl TriggerDef {
    /// Area trigger with no offset and default polling.
    pub fn area_enter(extent: Vec3) -> Self {
        TriggerDef::AreaEnter {
            offset: Vec3::ZERO,
            extent,
            max_polling_interval: None,
        }
    }

    /// Interaction trigger without a bounding region.
    pub fn interaction(identifier: impl Into<Signal>) -> Self {
        TriggerDef::InteractionMatch {
            identifier: identifier.into(),
            bounds: None,
        }
    }

    /// Timer trigger with default polling.
    pub fn timer(interval_seconds: f32) -> Self {
        TriggerDef::Timer {
            interval_seconds,
            max_polling_interval: None,
        }
    }
}

/// Box relative to a component's anchor entity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundsDef {
    #[serde(default)]
    pub offset: Vec3,
    pub extent: Vec3,
}

/// One event component inside a composite event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventComponentDef {
    /// Stable path, unique within the composite. Sibling references use it.
    pub path: String,
    /// Child entity (path below the subtree root) used as spatial anchor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<String>,
    #[serde(default)]
    pub trigger_once: bool,
    #[serde(default)]
    pub cooldown_seconds: f32,
    #[serde(default = "default_true")]
    pub required_to_finish: bool,
    #[serde(default)]
    pub triggers: Vec<TriggerDef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disable_on_trigger: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disabled_while_playing: Vec<String>,
    /// Registry name of the payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

impl EventComponentDef {
    /// Creates a required, repeatable component with no triggers.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            anchor: None,
            trigger_once: false,
            cooldown_seconds: 0.0,
            required_to_finish: true,
            triggers: Vec::new(),
            disable_on_trigger: Vec::new(),
            disabled_while_playing: Vec::new(),
            payload: None,
        }
    }

    pub fn once(mut self) -> Self {
        self.trigger_once = true;
        self
    }

    pub fn with_cooldown(mut self, seconds: f32) -> Self {
        self.cooldown_seconds = seconds;
        self
    }

    pub fn optional(mut self) -> Self {
        self.required_to_finish = false;
        self
    }

    pub fn with_trigger(mut self, trigger: TriggerDef) -> Self {
        self.triggers.push(trigger);
        self
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn anchored_at(mut self, path: impl Into<String>) -> Self {
        self.anchor = Some(path.into());
        self
    }

    /// Permanently disables `path` when this component fires.
    pub fn disables(mut self, path: impl Into<String>) -> Self {
        self.disable_on_trigger.push(path.into());
        self
    }

    /// Disables `path` while this component is playing.
    pub fn suppresses(mut self, path: impl Into<String>) -> Self {
        self.disabled_while_playing.push(path.into());
        self
    }
}

/// One authored scripted moment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeEventDef {
    pub key: String,
    #[serde(default)]
    pub stackable: bool,
    #[serde(default)]
    pub reinstantiate_on_restart: bool,
    #[serde(default)]
    pub components: Vec<EventComponentDef>,
}

impl CompositeEventDef {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            stackable: false,
            reinstantiate_on_restart: false,
            components: Vec::new(),
        }
    }

    pub fn with_component(mut self, component: EventComponentDef) -> Self {
        self.components.push(component);
        self
    }

    pub fn stackable(mut self) -> Self {
        self.stackable = true;
        self
    }

    pub fn reinstantiating(mut self) -> Self {
        self.reinstantiate_on_restart = true;
        self
    }

    /// Finds a component definition by path.
    pub fn component(&self, path: &str) -> Option<&EventComponentDef> {
        self.components.iter().find(|c| c.path == path)
    }
}

/// One step of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtaskDef {
    /// Wave number.
    #[serde(default)]
    pub order: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_signal: Option<Signal>,
    /// Registry name of a continuous evaluator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluator: Option<String>,
    #[serde(default = "default_amount")]
    pub amount_to_complete: i32,
}

impl SubtaskDef {
    /// Subtask counted by signal.
    pub fn signal(order: i32, signal: impl Into<Signal>, amount_to_complete: i32) -> Self {
        Self {
            order,
            trigger_signal: Some(signal.into()),
            evaluator: None,
            amount_to_complete,
        }
    }

    /// Subtask measured by a continuous evaluator.
    pub fn evaluated(order: i32, evaluator: impl Into<String>, amount_to_complete: i32) -> Self {
        Self {
            order,
            trigger_signal: None,
            evaluator: Some(evaluator.into()),
            amount_to_complete,
        }
    }
}

/// A quest made of ordered subtask waves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDef {
    pub key: String,
    #[serde(default)]
    pub subtasks: Vec<SubtaskDef>,
    /// Progress counts signals from any actor, not only the owner.
    #[serde(default)]
    pub global: bool,
    #[serde(default)]
    pub time_limited: bool,
    #[serde(default)]
    pub time_limit_seconds: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_success: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_fail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_condition: Option<String>,
}

impl TaskDef {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            subtasks: Vec::new(),
            global: false,
            time_limited: false,
            time_limit_seconds: 0.0,
            on_start: None,
            on_success: None,
            on_fail: None,
            fail_condition: None,
        }
    }

    pub fn with_subtask(mut self, subtask: SubtaskDef) -> Self {
        self.subtasks.push(subtask);
        self
    }

    pub fn global(mut self) -> Self {
        self.global = true;
        self
    }

    pub fn with_time_limit(mut self, seconds: f32) -> Self {
        self.time_limited = true;
        self.time_limit_seconds = seconds;
        self
    }

    pub fn fails_when(mut self, condition: impl Into<String>) -> Self {
        self.fail_condition = Some(condition.into());
        self
    }

    pub fn on_start(mut self, payload: impl Into<String>) -> Self {
        self.on_start = Some(payload.into());
        self
    }

    pub fn on_success(mut self, payload: impl Into<String>) -> Self {
        self.on_success = Some(payload.into());
        self
    }

    pub fn on_fail(mut self, payload: impl Into<String>) -> Self {
        self.on_fail = Some(payload.into());
        self
    }
}

/// A bundle of event and task definitions, usually one file per scenario.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptDefinitions {
    #[serde(default)]
    pub events: Vec<CompositeEventDef>,
    #[serde(default)]
    pub tasks: Vec<TaskDef>,
}

impl ScriptDefinitions {
    /// Parses definitions from JSON.
    pub fn from_json(content: &str) -> Result<Self, DefinitionsError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Reads definitions from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, DefinitionsError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}

/// Errors reading a definitions bundle.
#[derive(Debug, Error)]
pub enum DefinitionsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

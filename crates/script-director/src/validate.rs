//! Load-time checks for authored definitions.
//!
//! A definition that fails validation is skipped, never partially loaded.

use std::collections::HashSet;

use thiserror::Error;

use script_events::{CompositeEventDef, TaskDef};

use crate::registry::ScriptRegistry;

/// Why a definition was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    #[error("event {event}: component {component} references unknown payload {payload}")]
    MissingPayload {
        event: String,
        component: String,
        payload: String,
    },
    #[error("event {0} has no components")]
    NoComponents(String),
    #[error("event {event}: duplicate component path {path}")]
    DuplicateComponent { event: String, path: String },
    #[error("event {event}: component {component} references unknown sibling {sibling}")]
    UnknownSibling {
        event: String,
        component: String,
        sibling: String,
    },
    #[error("task {0} has no subtasks")]
    EmptySubtasks(String),
    #[error("task {task}: subtask {index} has neither a signal nor an evaluator")]
    SubtaskWithoutProgress { task: String, index: usize },
    #[error("task {task} references unknown evaluator {evaluator}")]
    UnknownEvaluator { task: String, evaluator: String },
    #[error("task {task} references unknown fail condition {condition}")]
    UnknownCondition { task: String, condition: String },
    #[error("task {task} references unknown payload {payload}")]
    UnknownTaskPayload { task: String, payload: String },
    #[error("duplicate definition key {0}")]
    DuplicateKey(String),
}

/// Checks an event definition against the registry.
pub fn validate_event(def: &CompositeEventDef, registry: &ScriptRegistry) -> Result<(), DefinitionError> {
    if def.components.is_empty() {
        return Err(DefinitionError::NoComponents(def.key.clone()));
    }

    let mut paths = HashSet::new();
    for component in &def.components {
        if !paths.insert(component.path.as_str()) {
            return Err(DefinitionError::DuplicateComponent {
                event: def.key.clone(),
                path: component.path.clone(),
            });
        }
    }

    for component in &def.components {
        if let Some(payload) = &component.payload {
            if !registry.has_payload(payload) {
                return Err(DefinitionError::MissingPayload {
                    event: def.key.clone(),
                    component: component.path.clone(),
                    payload: payload.clone(),
                });
            }
        }
        let siblings = component
            .disable_on_trigger
            .iter()
            .chain(&component.disabled_while_playing);
        for sibling in siblings {
            if !paths.contains(sibling.as_str()) {
                return Err(DefinitionError::UnknownSibling {
                    event: def.key.clone(),
                    component: component.path.clone(),
                    sibling: sibling.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Checks a task definition against the registry.
pub fn validate_task(def: &TaskDef, registry: &ScriptRegistry) -> Result<(), DefinitionError> {
    if def.subtasks.is_empty() {
        return Err(DefinitionError::EmptySubtasks(def.key.clone()));
    }

    for (index, subtask) in def.subtasks.iter().enumerate() {
        if subtask.trigger_signal.is_none() && subtask.evaluator.is_none() {
            return Err(DefinitionError::SubtaskWithoutProgress {
                task: def.key.clone(),
                index,
            });
        }
        if let Some(evaluator) = &subtask.evaluator {
            if !registry.has_evaluator(evaluator) {
                return Err(DefinitionError::UnknownEvaluator {
                    task: def.key.clone(),
                    evaluator: evaluator.clone(),
                });
            }
        }
    }

    if let Some(condition) = &def.fail_condition {
        if !registry.has_condition(condition) {
            return Err(DefinitionError::UnknownCondition {
                task: def.key.clone(),
                condition: condition.clone(),
            });
        }
    }

    for payload in [&def.on_start, &def.on_success, &def.on_fail].into_iter().flatten() {
        if !registry.has_payload(payload) {
            return Err(DefinitionError::UnknownTaskPayload {
                task: def.key.clone(),
                payload: payload.clone(),
            });
        }
    }
    Ok(())
}

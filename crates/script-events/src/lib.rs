//! Shared data types for the scripted-event and quest orchestration core.
//!
//! This crate contains pure data structures with no orchestration logic:
//! signals, entity handles, geometry, authoring definitions and progression
//! records. It is a dependency for all other crates in the workspace.

pub mod definition;
pub mod entity;
pub mod geometry;
pub mod progression;
pub mod signal;
pub mod timestamp;

#[cfg(any(test, feature = "test-fixtures"))]
pub mod fixtures;

// Re-export timestamp types
pub use timestamp::{SimTimestamp, DEFAULT_TICK_SECONDS};

// Re-export definition types
pub use definition::{
    BoundsDef, CompositeEventDef, DefinitionsError, EventComponentDef, ScriptDefinitions,
    SubtaskDef, TaskDef, TriggerDef,
};

pub use entity::{EntityRef, NetworkId};
pub use geometry::{Aabb, Vec3};
pub use progression::{ProgressionRecord, EVENTS_DOCUMENT, TASKS_DOCUMENT};
pub use signal::Signal;

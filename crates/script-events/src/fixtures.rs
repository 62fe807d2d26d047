//! Sample data fixtures for testing.
//!
//! This module provides ready-made definitions for other crates to use.
//! Enable the `test-fixtures` feature to access these helpers.
//!
//! # Example
//!
//! ```ignore
//! // In your Cargo.toml:
//! // [dev-dependencies]
//! // script-events = { path = "../script-events", features = ["test-fixtures"] }
//!
//! use script_events::fixtures;
//!
//! let defs = fixtures::sample_definitions();
//! let ambush = fixtures::bridge_ambush();
//! ```

use crate::{CompositeEventDef, ProgressionRecord, ScriptDefinitions, TaskDef};

/// Returns the sample scenario from the fixtures file.
///
/// Contains 2 composite events:
/// - `bridge_ambush`: reinstantiating, with an area lookout, a timed patrol
///   and a lever interaction
/// - `market_day`: stackable, a single manual bell
///
/// and 2 tasks:
/// - `clear_the_bridge`: two waves, time limited, with a fail condition
/// - `village_chores`: global, single wave
pub fn sample_definitions() -> ScriptDefinitions {
    let json = include_str!("../tests/fixtures/sample_definitions.json");
    ScriptDefinitions::from_json(json).expect("Failed to parse sample_definitions.json")
}

/// Returns the `bridge_ambush` event definition.
pub fn bridge_ambush() -> CompositeEventDef {
    event("bridge_ambush")
}

/// Returns the `clear_the_bridge` task definition.
pub fn clear_the_bridge() -> TaskDef {
    task("clear_the_bridge")
}

/// Returns an event definition from the samples by key.
pub fn event(key: &str) -> CompositeEventDef {
    sample_definitions()
        .events
        .into_iter()
        .find(|e| e.key == key)
        .unwrap_or_else(|| panic!("No sample event named {}", key))
}

/// Returns a task definition from the samples by key.
pub fn task(key: &str) -> TaskDef {
    sample_definitions()
        .tasks
        .into_iter()
        .find(|t| t.key == key)
        .unwrap_or_else(|| panic!("No sample task named {}", key))
}

/// Progression records matching the sample scenario.
pub fn sample_progression() -> Vec<ProgressionRecord> {
    vec![
        ProgressionRecord {
            key: "bridge_ambush".to_string(),
            times_triggered: 4,
            times_completed: 1,
        },
        ProgressionRecord {
            key: "market_day".to_string(),
            times_triggered: 12,
            times_completed: 12,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TriggerDef;

    #[test]
    fn test_sample_definitions_load() {
        let defs = sample_definitions();
        assert_eq!(defs.events.len(), 2);
        assert_eq!(defs.tasks.len(), 2);
    }

    #[test]
    fn test_bridge_ambush_shape() {
        let ambush = bridge_ambush();
        assert!(ambush.reinstantiate_on_restart);
        assert_eq!(ambush.components.len(), 3);

        let lookout = ambush.component("lookout").unwrap();
        assert!(lookout.trigger_once);
        assert_eq!(lookout.anchor.as_deref(), Some("watch_post"));
        assert!(matches!(lookout.triggers[0], TriggerDef::AreaEnter { .. }));

        let patrol = ambush.component("patrol").unwrap();
        assert!(!patrol.required_to_finish);
    }

    #[test]
    fn test_clear_the_bridge_waves() {
        let task = clear_the_bridge();
        assert!(task.time_limited);
        let orders: Vec<i32> = task.subtasks.iter().map(|s| s.order).collect();
        assert_eq!(orders, vec![0, 0, 1]);
    }
}

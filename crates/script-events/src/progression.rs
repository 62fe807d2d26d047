//! Persisted progression counters.
//!
//! One record per event or task key. Both `events.json` and `tasks.json` hold
//! a JSON list of these records.

use serde::{Deserialize, Serialize};

/// Document name for composite event counters.
pub const EVENTS_DOCUMENT: &str = "events.json";

/// Document name for task counters.
pub const TASKS_DOCUMENT: &str = "tasks.json";

/// How often a definition has been triggered and completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressionRecord {
    pub key: String,
    #[serde(default)]
    pub times_triggered: i32,
    #[serde(default)]
    pub times_completed: i32,
}

impl ProgressionRecord {
    /// Creates a record with zero counters.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            times_triggered: 0,
            times_completed: 0,
        }
    }
}

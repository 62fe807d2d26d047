//! Named scripts referenced by definitions.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use script_events::{EntityRef, SimTimestamp};

use crate::payload::Payload;
use crate::scene::Scene;

/// Input to evaluators and fail conditions.
pub struct EvalContext<'a> {
    pub owner: EntityRef,
    pub scene: &'a dyn Scene,
    pub now: SimTimestamp,
}

pub type PayloadFactory = Arc<dyn Fn() -> Box<dyn Payload>>;
pub type Evaluator = Arc<dyn Fn(&EvalContext<'_>) -> i32>;
pub type Condition = Arc<dyn Fn(&EvalContext<'_>) -> bool>;

/// Payload factories, subtask evaluators and task fail conditions by name.
#[derive(Clone, Default)]
pub struct ScriptRegistry {
    payloads: HashMap<String, PayloadFactory>,
    evaluators: HashMap<String, Evaluator>,
    conditions: HashMap<String, Condition>,
}

impl fmt::Debug for ScriptRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut payloads: Vec<&String> = self.payloads.keys().collect();
        let mut evaluators: Vec<&String> = self.evaluators.keys().collect();
        let mut conditions: Vec<&String> = self.conditions.keys().collect();
        payloads.sort();
        evaluators.sort();
        conditions.sort();
        f.debug_struct("ScriptRegistry")
            .field("payloads", &payloads)
            .field("evaluators", &evaluators)
            .field("conditions", &conditions)
            .finish()
    }
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a payload. `factory` builds a fresh instance per launch.
    pub fn register_payload<P, F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        P: Payload + 'static,
        F: Fn() -> P + 'static,
    {
        self.payloads
            .insert(name.into(), Arc::new(move || Box::new(factory()) as Box<dyn Payload>));
        self
    }

    pub fn register_evaluator<F>(&mut self, name: impl Into<String>, evaluator: F) -> &mut Self
    where
        F: Fn(&EvalContext<'_>) -> i32 + 'static,
    {
        self.evaluators.insert(name.into(), Arc::new(evaluator));
        self
    }

    pub fn register_condition<F>(&mut self, name: impl Into<String>, condition: F) -> &mut Self
    where
        F: Fn(&EvalContext<'_>) -> bool + 'static,
    {
        self.conditions.insert(name.into(), Arc::new(condition));
        self
    }

    pub fn has_payload(&self, name: &str) -> bool {
        self.payloads.contains_key(name)
    }

    pub fn has_evaluator(&self, name: &str) -> bool {
        self.evaluators.contains_key(name)
    }

    pub fn has_condition(&self, name: &str) -> bool {
        self.conditions.contains_key(name)
    }

    pub fn instantiate(&self, name: &str) -> Option<Box<dyn Payload>> {
        self.payloads.get(name).map(|factory| factory())
    }

    pub fn evaluate(&self, name: &str, cx: &EvalContext<'_>) -> Option<i32> {
        self.evaluators.get(name).map(|e| e(cx))
    }

    pub fn check(&self, name: &str, cx: &EvalContext<'_>) -> Option<bool> {
        self.conditions.get(name).map(|c| c(cx))
    }
}

//! Payloads as resumable continuations.
//!
//! A payload runs cooperatively on the tick clock. Each `resume` returns a
//! [`PayloadStep`] saying when to resume next or whether the payload is done.
//! The [`ContinuationRunner`] owns suspended payloads and drops any whose
//! owning component has been reset, disabled or destroyed since launch.

use script_events::{EntityRef, SimTimestamp, Signal};

use crate::component::ComponentId;
use crate::scene::Scene;

/// What a payload wants after one resume.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PayloadStep {
    /// Resume again next tick.
    Yield,
    /// Resume once this many simulation seconds have passed.
    WaitSeconds(f32),
    /// Ask the owning component to finish.
    Finish,
    /// Stop without finishing the owner.
    Abandon,
}

/// A signal a payload raised while running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedSignal {
    pub signal: Signal,
    pub actor: Option<EntityRef>,
}

/// Everything a payload can see or touch while resumed.
pub struct PayloadContext<'a> {
    /// Root of the owning event's subtree, or the task owner.
    pub owner: Option<EntityRef>,
    /// Component anchor, when launched by an event component.
    pub anchor: Option<EntityRef>,
    pub triggerer: Option<EntityRef>,
    pub now: SimTimestamp,
    /// Number of earlier resumes of this payload.
    pub resumes: u32,
    pub scene: &'a mut dyn Scene,
    emitted: &'a mut Vec<EmittedSignal>,
}

impl PayloadContext<'_> {
    /// Raises a signal. It is fanned out after payload processing.
    pub fn emit(&mut self, signal: impl Into<Signal>, actor: Option<EntityRef>) {
        self.emitted.push(EmittedSignal {
            signal: signal.into(),
            actor,
        });
    }
}

/// A scripted reaction.
pub trait Payload {
    fn resume(&mut self, cx: &mut PayloadContext<'_>) -> PayloadStep;
}

impl<F> Payload for F
where
    F: FnMut(&mut PayloadContext<'_>) -> PayloadStep,
{
    fn resume(&mut self, cx: &mut PayloadContext<'_>) -> PayloadStep {
        self(cx)
    }
}

type Action = Box<dyn FnMut(&mut PayloadContext<'_>)>;

enum SequenceStep {
    Run(Action),
    Emit(Signal),
    Wait(f32),
}

/// Linear "run, wait, run, finish" script.
///
/// ```
/// use script_director::payload::Sequence;
///
/// let payload = Sequence::new()
///     .emit("alarm_raised")
///     .wait(2.0)
///     .then(|cx| cx.emit("gate_dropped", cx.triggerer));
/// ```
#[derive(Default)]
pub struct Sequence {
    steps: Vec<SequenceStep>,
    cursor: usize,
}

impl Sequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, action: impl FnMut(&mut PayloadContext<'_>) + 'static) -> Self {
        self.steps.push(SequenceStep::Run(Box::new(action)));
        self
    }

    /// Emits `signal` with the triggerer as actor.
    pub fn emit(mut self, signal: impl Into<Signal>) -> Self {
        self.steps.push(SequenceStep::Emit(signal.into()));
        self
    }

    pub fn wait(mut self, seconds: f32) -> Self {
        self.steps.push(SequenceStep::Wait(seconds));
        self
    }
}

impl Payload for Sequence {
    fn resume(&mut self, cx: &mut PayloadContext<'_>) -> PayloadStep {
        while let Some(step) = self.steps.get_mut(self.cursor) {
            self.cursor += 1;
            match step {
                SequenceStep::Run(action) => action(cx),
                SequenceStep::Emit(signal) => {
                    let actor = cx.triggerer;
                    cx.emit(signal.clone(), actor);
                }
                SequenceStep::Wait(seconds) => return PayloadStep::WaitSeconds(*seconds),
            }
        }
        PayloadStep::Finish
    }
}

/// Who launched a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContinuationOwner {
    /// An admitted event component; finishing requests a component finish.
    Component { id: ComponentId, generation: u32 },
    /// A task lifecycle hook; finishing has no effect on the task.
    Task { key: String },
}

/// Launch parameters for a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launch {
    pub owner: ContinuationOwner,
    pub owner_entity: Option<EntityRef>,
    pub anchor: Option<EntityRef>,
    pub triggerer: Option<EntityRef>,
}

/// A component finish requested by its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinishRequest {
    pub component: ComponentId,
    pub generation: u32,
}

/// Results of resuming payloads.
#[derive(Debug, Default, PartialEq)]
pub struct RunOutcome {
    pub finishes: Vec<FinishRequest>,
    pub emitted: Vec<EmittedSignal>,
}

impl RunOutcome {
    pub fn extend(&mut self, other: RunOutcome) {
        self.finishes.extend(other.finishes);
        self.emitted.extend(other.emitted);
    }
}

struct Continuation {
    launch: Launch,
    payload: Box<dyn Payload>,
    resumes: u32,
    last_tick: u64,
    resume_at: f64,
}

const WAIT_EPSILON: f64 = 1e-9;

/// Suspended payloads waiting for the tick clock.
#[derive(Default)]
pub struct ContinuationRunner {
    suspended: Vec<Continuation>,
}

impl std::fmt::Debug for ContinuationRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContinuationRunner")
            .field("suspended", &self.suspended.len())
            .finish()
    }
}

impl ContinuationRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of suspended payloads.
    pub fn len(&self) -> usize {
        self.suspended.len()
    }

    pub fn is_empty(&self) -> bool {
        self.suspended.is_empty()
    }

    /// Resumes a new payload immediately and keeps it if it suspends.
    pub fn start(
        &mut self,
        payload: Box<dyn Payload>,
        launch: Launch,
        now: SimTimestamp,
        scene: &mut dyn Scene,
    ) -> RunOutcome {
        let mut outcome = RunOutcome::default();
        let continuation = Continuation {
            launch,
            payload,
            resumes: 0,
            last_tick: now.tick,
            resume_at: now.seconds,
        };
        if let Some(kept) = step(continuation, now, scene, &mut outcome) {
            self.suspended.push(kept);
        }
        outcome
    }

    /// Resumes every continuation that is due at `now`.
    ///
    /// Continuations whose owner fails `is_live` are dropped unresumed. A
    /// continuation never resumes twice in one tick.
    pub fn run_due(
        &mut self,
        now: SimTimestamp,
        scene: &mut dyn Scene,
        is_live: impl Fn(&ContinuationOwner) -> bool,
    ) -> RunOutcome {
        let mut outcome = RunOutcome::default();
        let pending = std::mem::take(&mut self.suspended);

        for continuation in pending {
            if !is_live(&continuation.launch.owner) {
                tracing::debug!("Dropping stale payload of {:?}", continuation.launch.owner);
                continue;
            }
            let due = continuation.last_tick < now.tick
                && now.seconds + WAIT_EPSILON >= continuation.resume_at;
            if !due {
                self.suspended.push(continuation);
                continue;
            }
            if let Some(kept) = step(continuation, now, scene, &mut outcome) {
                self.suspended.push(kept);
            }
        }

        outcome
    }

    /// Drops every suspended payload whose owner matches `discard`, returning
    /// how many were dropped.
    pub fn discard(&mut self, discard: impl Fn(&ContinuationOwner) -> bool) -> usize {
        let before = self.suspended.len();
        self.suspended.retain(|c| !discard(&c.launch.owner));
        before - self.suspended.len()
    }

    /// Drops every suspended payload.
    pub fn clear(&mut self) {
        self.suspended.clear();
    }
}

fn step(
    mut continuation: Continuation,
    now: SimTimestamp,
    scene: &mut dyn Scene,
    outcome: &mut RunOutcome,
) -> Option<Continuation> {
    let result = {
        let mut cx = PayloadContext {
            owner: continuation.launch.owner_entity,
            anchor: continuation.launch.anchor,
            triggerer: continuation.launch.triggerer,
            now,
            resumes: continuation.resumes,
            scene,
            emitted: &mut outcome.emitted,
        };
        continuation.payload.resume(&mut cx)
    };
    continuation.resumes += 1;
    continuation.last_tick = now.tick;

    match result {
        PayloadStep::Yield => {
            continuation.resume_at = now.seconds;
            Some(continuation)
        }
        PayloadStep::WaitSeconds(seconds) => {
            continuation.resume_at = now.seconds + f64::from(seconds.max(0.0));
            Some(continuation)
        }
        PayloadStep::Finish => {
            if let ContinuationOwner::Component { id, generation } = continuation.launch.owner {
                outcome.finishes.push(FinishRequest {
                    component: id,
                    generation,
                });
            }
            None
        }
        PayloadStep::Abandon => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaKey;
    use crate::scene::InMemoryScene;
    use std::cell::Cell;
    use std::rc::Rc;

    fn component_launch(generation: u32) -> Launch {
        Launch {
            owner: ContinuationOwner::Component {
                id: ComponentId(ArenaKey {
                    index: 0,
                    generation: 0,
                }),
                generation,
            },
            owner_entity: None,
            anchor: None,
            triggerer: None,
        }
    }

    fn boxed<F>(f: F) -> Box<dyn Payload>
    where
        F: FnMut(&mut PayloadContext<'_>) -> PayloadStep + 'static,
    {
        Box::new(f)
    }

    fn at(tick: u64, seconds: f64) -> SimTimestamp {
        SimTimestamp::new(tick, seconds, 1)
    }

    #[test]
    fn test_immediate_finish_requests_finish() {
        let mut scene = InMemoryScene::new();
        let mut runner = ContinuationRunner::new();

        let outcome = runner.start(
            boxed(|_| PayloadStep::Finish),
            component_launch(3),
            at(0, 0.0),
            &mut scene,
        );

        assert_eq!(outcome.finishes.len(), 1);
        assert_eq!(outcome.finishes[0].generation, 3);
        assert!(runner.is_empty());
    }

    #[test]
    fn test_yield_resumes_next_tick_only() {
        let mut scene = InMemoryScene::new();
        let mut runner = ContinuationRunner::new();
        let count = Rc::new(Cell::new(0));
        let seen = count.clone();

        runner.start(
            boxed(move |_| {
                seen.set(seen.get() + 1);
                PayloadStep::Yield
            }),
            component_launch(0),
            at(5, 0.1),
            &mut scene,
        );
        assert_eq!(count.get(), 1);

        runner.run_due(at(5, 0.1), &mut scene, |_| true);
        assert_eq!(count.get(), 1);

        runner.run_due(at(6, 0.12), &mut scene, |_| true);
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn test_wait_seconds() {
        let mut scene = InMemoryScene::new();
        let mut runner = ContinuationRunner::new();

        runner.start(
            Box::new(Sequence::new().wait(1.0).emit("done")),
            component_launch(0),
            at(0, 0.0),
            &mut scene,
        );

        let early = runner.run_due(at(25, 0.5), &mut scene, |_| true);
        assert!(early.emitted.is_empty());

        let due = runner.run_due(at(50, 1.0), &mut scene, |_| true);
        assert_eq!(due.emitted[0].signal, Signal::new("done"));
        assert_eq!(due.finishes.len(), 1);
        assert!(runner.is_empty());
    }

    #[test]
    fn test_stale_owner_dropped_unresumed() {
        let mut scene = InMemoryScene::new();
        let mut runner = ContinuationRunner::new();

        runner.start(
            Box::new(Sequence::new().wait(0.0).emit("late")),
            component_launch(1),
            at(0, 0.0),
            &mut scene,
        );

        let outcome = runner.run_due(at(1, 0.02), &mut scene, |_| false);
        assert!(outcome.emitted.is_empty());
        assert!(outcome.finishes.is_empty());
        assert!(runner.is_empty());
    }

    #[test]
    fn test_abandon_does_not_finish() {
        let mut scene = InMemoryScene::new();
        let mut runner = ContinuationRunner::new();

        let outcome = runner.start(
            boxed(|_| PayloadStep::Abandon),
            component_launch(0),
            at(0, 0.0),
            &mut scene,
        );
        assert!(outcome.finishes.is_empty());
        assert!(runner.is_empty());
    }

    #[test]
    fn test_task_payload_finish_is_silent() {
        let mut scene = InMemoryScene::new();
        let mut runner = ContinuationRunner::new();
        let launch = Launch {
            owner: ContinuationOwner::Task {
                key: "clear_the_bridge".to_string(),
            },
            owner_entity: None,
            anchor: None,
            triggerer: None,
        };

        let outcome = runner.start(Box::new(Sequence::new().emit("banner")), launch, at(0, 0.0), &mut scene);
        assert!(outcome.finishes.is_empty());
        assert_eq!(outcome.emitted.len(), 1);
    }

    #[test]
    fn test_sequence_runs_actions_in_order() {
        let mut scene = InMemoryScene::new();
        let mut runner = ContinuationRunner::new();
        let log = Rc::new(std::cell::RefCell::new(Vec::new()));
        let first = log.clone();
        let second = log.clone();

        runner.start(
            Box::new(
                Sequence::new()
                    .then(move |_| first.borrow_mut().push("first"))
                    .wait(0.0)
                    .then(move |_| second.borrow_mut().push("second")),
            ),
            component_launch(0),
            at(0, 0.0),
            &mut scene,
        );
        assert_eq!(*log.borrow(), vec!["first"]);

        runner.run_due(at(1, 0.02), &mut scene, |_| true);
        assert_eq!(*log.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn test_payload_can_touch_scene() {
        let mut scene = InMemoryScene::new();
        let gate = scene.spawn("gate", script_events::Vec3::ZERO, None);
        let mut runner = ContinuationRunner::new();
        let launch = Launch {
            anchor: Some(gate),
            ..component_launch(0)
        };

        runner.start(
            Box::new(Sequence::new().then(|cx| {
                if let Some(anchor) = cx.anchor {
                    cx.scene.set_active(anchor, false);
                }
            })),
            launch,
            at(0, 0.0),
            &mut scene,
        );
        assert!(!scene.is_active_in_hierarchy(gate));
    }
}

//! Trigger sources.
//!
//! A trigger source is a condition owned by exactly one event component.
//! Push sources (interaction, manual) are notified directly by the
//! orchestrator; poll sources (areas, timers) are evaluated by the
//! [`PollScheduler`](crate::scheduler::PollScheduler).

use std::collections::BTreeSet;

use script_events::{Aabb, BoundsDef, EntityRef, Signal, TriggerDef, Vec3};

use crate::scene::Scene;

/// What a poll can see.
pub struct PollContext<'a> {
    pub scene: &'a dyn Scene,
    /// Simulation seconds since session start.
    pub now: f64,
}

/// Area state shared by the enter and occupancy variants.
#[derive(Debug, Clone, PartialEq)]
pub struct AreaTrigger {
    pub offset: Vec3,
    pub extent: Vec3,
    objects_inside: BTreeSet<EntityRef>,
}

impl AreaTrigger {
    pub fn new(offset: Vec3, extent: Vec3) -> Self {
        Self {
            offset,
            extent,
            objects_inside: BTreeSet::new(),
        }
    }

    pub fn objects_inside(&self) -> &BTreeSet<EntityRef> {
        &self.objects_inside
    }

    /// Re-queries occupancy and returns the entities that were not inside
    /// at the previous poll.
    fn refresh(&mut self, origin: Vec3, scene: &dyn Scene) -> Vec<EntityRef> {
        let region = Aabb::new(origin + self.offset, self.extent);
        let now_inside: BTreeSet<EntityRef> = scene.actors_in(&region).into_iter().collect();
        let entered = now_inside
            .difference(&self.objects_inside)
            .copied()
            .collect();
        self.objects_inside = now_inside;
        entered
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InteractionTrigger {
    pub identifier: Signal,
    pub bounds: Option<BoundsDef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimerTrigger {
    pub interval_seconds: f32,
    armed_at: Option<f64>,
}

/// The closed set of trigger variants.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerKind {
    AreaEnter(AreaTrigger),
    AreaOccupancy {
        area: AreaTrigger,
        min_occupants: usize,
    },
    InteractionMatch(InteractionTrigger),
    Timer(TimerTrigger),
    Manual,
}

/// A condition plus its scheduling bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerSource {
    pub kind: TriggerKind,
    pub(crate) active: bool,
    is_polled: bool,
    max_polling_interval: u32,
    pub(crate) ticks_since_last_poll: u32,
    pub(crate) polled_this_tick: bool,
}

impl TriggerSource {
    /// Builds an inactive source from its definition.
    pub fn from_def(def: &TriggerDef, default_interval: u32) -> Self {
        let (kind, interval) = match def {
            TriggerDef::AreaEnter {
                offset,
                extent,
                max_polling_interval,
            } => (
                TriggerKind::AreaEnter(AreaTrigger::new(*offset, *extent)),
                *max_polling_interval,
            ),
            TriggerDef::AreaOccupancy {
                offset,
                extent,
                min_occupants,
                max_polling_interval,
            } => (
                TriggerKind::AreaOccupancy {
                    area: AreaTrigger::new(*offset, *extent),
                    min_occupants: *min_occupants,
                },
                *max_polling_interval,
            ),
            TriggerDef::InteractionMatch { identifier, bounds } => (
                TriggerKind::InteractionMatch(InteractionTrigger {
                    identifier: identifier.clone(),
                    bounds: *bounds,
                }),
                None,
            ),
            TriggerDef::Timer {
                interval_seconds,
                max_polling_interval,
            } => (
                TriggerKind::Timer(TimerTrigger {
                    interval_seconds: *interval_seconds,
                    armed_at: None,
                }),
                *max_polling_interval,
            ),
            TriggerDef::Manual => (TriggerKind::Manual, None),
        };
        Self::new(kind, interval.unwrap_or(default_interval))
    }

    pub fn new(kind: TriggerKind, max_polling_interval: u32) -> Self {
        let is_polled = matches!(
            kind,
            TriggerKind::AreaEnter(_) | TriggerKind::AreaOccupancy { .. } | TriggerKind::Timer(_)
        );
        Self {
            kind,
            active: false,
            is_polled,
            max_polling_interval,
            ticks_since_last_poll: 0,
            polled_this_tick: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_polled(&self) -> bool {
        self.is_polled
    }

    /// Polling interval in ticks, never below one.
    pub fn max_polling_interval(&self) -> u32 {
        self.max_polling_interval.max(1)
    }

    pub fn ticks_since_last_poll(&self) -> u32 {
        self.ticks_since_last_poll
    }

    pub(crate) fn activate(&mut self) {
        if !self.active {
            self.active = true;
            if let TriggerKind::Timer(timer) = &mut self.kind {
                timer.armed_at = None;
            }
        }
    }

    pub(crate) fn deactivate(&mut self) {
        self.active = false;
    }

    /// Forgets remembered occupants and disarms timers.
    pub fn clear(&mut self) {
        match &mut self.kind {
            TriggerKind::AreaEnter(area) | TriggerKind::AreaOccupancy { area, .. } => {
                area.objects_inside.clear();
            }
            TriggerKind::Timer(timer) => timer.armed_at = None,
            TriggerKind::InteractionMatch(_) | TriggerKind::Manual => {}
        }
    }

    /// Evaluates the condition and returns one entry per notification.
    ///
    /// An entry is the triggering entity, or `None` when the condition has no
    /// natural triggerer (a timer without an anchor).
    pub fn poll(&mut self, anchor: Option<EntityRef>, cx: &PollContext<'_>) -> Vec<Option<EntityRef>> {
        let Some(origin) = anchor_origin(anchor, cx.scene) else {
            return Vec::new();
        };

        match &mut self.kind {
            TriggerKind::AreaEnter(area) => {
                area.refresh(origin, cx.scene).into_iter().map(Some).collect()
            }
            TriggerKind::AreaOccupancy {
                area,
                min_occupants,
            } => {
                let entered = area.refresh(origin, cx.scene);
                if area.objects_inside.len() >= *min_occupants {
                    entered.into_iter().map(Some).collect()
                } else {
                    Vec::new()
                }
            }
            TriggerKind::Timer(timer) => match timer.armed_at {
                None => {
                    timer.armed_at = Some(cx.now);
                    Vec::new()
                }
                Some(armed_at) if cx.now - armed_at >= f64::from(timer.interval_seconds) => {
                    timer.armed_at = Some(cx.now);
                    vec![anchor]
                }
                Some(_) => Vec::new(),
            },
            TriggerKind::InteractionMatch(_) | TriggerKind::Manual => Vec::new(),
        }
    }

    /// True if this is an active interaction source for `signal` and, when it
    /// declares bounds, `target` lies inside them grown by `epsilon`.
    pub fn matches_interaction(
        &self,
        signal: &Signal,
        target: Option<Vec3>,
        anchor: Option<EntityRef>,
        scene: &dyn Scene,
        epsilon: f32,
    ) -> bool {
        if !self.active {
            return false;
        }
        let TriggerKind::InteractionMatch(interaction) = &self.kind else {
            return false;
        };
        if interaction.identifier != *signal {
            return false;
        }
        let Some(bounds) = interaction.bounds else {
            return true;
        };
        let (Some(origin), Some(target)) = (anchor_origin(anchor, scene), target) else {
            return false;
        };
        Aabb::new(origin + bounds.offset, bounds.extent)
            .grown(epsilon)
            .contains(target)
    }

    pub fn is_manual(&self) -> bool {
        matches!(self.kind, TriggerKind::Manual)
    }
}

/// World origin for anchored regions. Unanchored regions are absolute; a
/// stale anchor yields nothing.
fn anchor_origin(anchor: Option<EntityRef>, scene: &dyn Scene) -> Option<Vec3> {
    match anchor {
        None => Some(Vec3::ZERO),
        Some(e) => scene.world_position(e),
    }
}

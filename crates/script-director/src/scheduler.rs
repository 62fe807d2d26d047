//! Amortized polling of trigger sources.
//!
//! Each tick the scheduler gives one bonus evaluation to the source with the
//! smallest `ticks_since_last_poll`, ages every other source, and then polls
//! whatever has reached its `max_polling_interval`. Every active polled
//! source is therefore evaluated at least once every `max_polling_interval`
//! ticks.
//!
//! The bonus goes to the smallest counter, so the source that was polled
//! last usually keeps receiving it. Sources that never win the bonus still
//! meet their interval; the extra evaluations are simply not spread evenly.

use script_events::EntityRef;

use crate::component::ComponentId;
use crate::trigger::{PollContext, TriggerSource};

/// Address of one trigger source: owning component plus index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceKey {
    pub component: ComponentId,
    pub index: usize,
}

/// Anything that can resolve a [`SourceKey`] to a live source and its anchor.
pub trait SourceHost {
    /// `None` once the key no longer resolves.
    fn source_mut(&mut self, key: SourceKey) -> Option<(&mut TriggerSource, Option<EntityRef>)>;
}

/// A satisfied poll, delivered after the sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notification {
    pub source: SourceKey,
    pub triggerer: Option<EntityRef>,
}

/// What one sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Sources polled this tick, in poll order.
    pub polled: Vec<SourceKey>,
    /// Notifications in poll order.
    pub notifications: Vec<Notification>,
}

/// Registration list in stable insertion order.
#[derive(Debug, Clone, Default)]
pub struct PollScheduler {
    registered: Vec<SourceKey>,
}

impl PollScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, key: SourceKey) {
        if !self.registered.contains(&key) {
            self.registered.push(key);
        }
    }

    /// Drops every source owned by `component`.
    pub fn unregister_component(&mut self, component: ComponentId) {
        self.registered.retain(|k| k.component != component);
    }

    pub fn len(&self) -> usize {
        self.registered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registered.is_empty()
    }

    /// Runs one tick of polling.
    pub fn sweep<H: SourceHost>(&mut self, host: &mut H, cx: &PollContext<'_>) -> SweepOutcome {
        self.registered.retain(|k| host.source_mut(*k).is_some());

        let collected: Vec<SourceKey> = self
            .registered
            .iter()
            .copied()
            .filter(|k| {
                host.source_mut(*k)
                    .map(|(s, _)| s.is_active() && s.is_polled())
                    .unwrap_or(false)
            })
            .collect();

        let mut outcome = SweepOutcome::default();
        if collected.is_empty() {
            return outcome;
        }

        for key in &collected {
            if let Some((source, _)) = host.source_mut(*key) {
                source.polled_this_tick = false;
            }
        }

        // min_by_key keeps the first of equal minima, so ties go to the
        // earliest registration.
        let head = collected.iter().copied().min_by_key(|k| {
            host.source_mut(*k)
                .map(|(s, _)| s.ticks_since_last_poll)
                .unwrap_or(u32::MAX)
        });

        if let Some(head) = head {
            poll_one(host, head, cx, &mut outcome);
        }

        for key in &collected {
            if Some(*key) == head {
                continue;
            }
            if let Some((source, _)) = host.source_mut(*key) {
                source.ticks_since_last_poll = source.ticks_since_last_poll.saturating_add(1);
            }
        }

        for key in &collected {
            let overdue = host
                .source_mut(*key)
                .map(|(s, _)| !s.polled_this_tick && s.ticks_since_last_poll >= s.max_polling_interval())
                .unwrap_or(false);
            if overdue {
                poll_one(host, *key, cx, &mut outcome);
            }
        }

        outcome
    }
}

fn poll_one<H: SourceHost>(host: &mut H, key: SourceKey, cx: &PollContext<'_>, outcome: &mut SweepOutcome) {
    let Some((source, anchor)) = host.source_mut(key) else {
        return;
    };
    let triggerers = source.poll(anchor, cx);
    source.ticks_since_last_poll = 0;
    source.polled_this_tick = true;

    outcome.polled.push(key);
    outcome.notifications.extend(
        triggerers
            .into_iter()
            .map(|triggerer| Notification { source: key, triggerer }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaKey;
    use crate::scene::InMemoryScene;
    use crate::trigger::TriggerKind;
    use script_events::{TriggerDef, Vec3};
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct Host {
        sources: BTreeMap<SourceKey, TriggerSource>,
    }

    impl SourceHost for Host {
        fn source_mut(&mut self, key: SourceKey) -> Option<(&mut TriggerSource, Option<EntityRef>)> {
            self.sources.get_mut(&key).map(|s| (s, None))
        }
    }

    fn key(n: u32) -> SourceKey {
        SourceKey {
            component: ComponentId(ArenaKey {
                index: n,
                generation: 0,
            }),
            index: 0,
        }
    }

    fn area(interval: u32) -> TriggerSource {
        let mut source = TriggerSource::from_def(
            &TriggerDef::AreaEnter {
                offset: Vec3::ZERO,
                extent: Vec3::splat(1.0),
                max_polling_interval: Some(interval),
            },
            10,
        );
        source.activate();
        source
    }

    fn setup(count: u32, interval: u32) -> (PollScheduler, Host) {
        let mut scheduler = PollScheduler::new();
        let mut host = Host::default();
        for n in 0..count {
            host.sources.insert(key(n), area(interval));
            scheduler.register(key(n));
        }
        (scheduler, host)
    }

    #[test]
    fn test_every_source_polled_within_interval() {
        let scene = InMemoryScene::new();
        let (mut scheduler, mut host) = setup(6, 4);
        let cx = PollContext { scene: &scene, now: 0.0 };

        let history: Vec<Vec<SourceKey>> = (0..40).map(|_| scheduler.sweep(&mut host, &cx).polled).collect();

        for window in history.windows(4) {
            for n in 0..6 {
                assert!(
                    window.iter().any(|polled| polled.contains(&key(n))),
                    "source {} starved",
                    n
                );
            }
        }
    }

    #[test]
    fn test_no_source_polled_twice_per_tick() {
        let scene = InMemoryScene::new();
        let (mut scheduler, mut host) = setup(5, 1);
        let cx = PollContext { scene: &scene, now: 0.0 };

        for _ in 0..10 {
            let polled = scheduler.sweep(&mut host, &cx).polled;
            let mut deduped = polled.clone();
            deduped.sort();
            deduped.dedup();
            assert_eq!(polled.len(), deduped.len());
        }
    }

    #[test]
    fn test_head_tie_breaks_by_registration_order() {
        let scene = InMemoryScene::new();
        let (mut scheduler, mut host) = setup(3, 10);
        let cx = PollContext { scene: &scene, now: 0.0 };

        let first = scheduler.sweep(&mut host, &cx);
        assert_eq!(first.polled, vec![key(0)]);
    }

    #[test]
    fn test_bonus_stays_with_most_recent() {
        let scene = InMemoryScene::new();
        let (mut scheduler, mut host) = setup(3, 10);
        let cx = PollContext { scene: &scene, now: 0.0 };

        for _ in 0..5 {
            assert_eq!(scheduler.sweep(&mut host, &cx).polled, vec![key(0)]);
        }
        assert_eq!(host.sources[&key(1)].ticks_since_last_poll(), 5);
    }

    #[test]
    fn test_inactive_and_push_sources_skipped() {
        let scene = InMemoryScene::new();
        let mut scheduler = PollScheduler::new();
        let mut host = Host::default();

        host.sources.insert(key(0), TriggerSource::new(TriggerKind::Manual, 1));
        let mut dormant = area(1);
        dormant.deactivate();
        host.sources.insert(key(1), dormant);
        scheduler.register(key(0));
        scheduler.register(key(1));

        let cx = PollContext { scene: &scene, now: 0.0 };
        assert!(scheduler.sweep(&mut host, &cx).polled.is_empty());
    }

    #[test]
    fn test_stale_keys_pruned() {
        let scene = InMemoryScene::new();
        let (mut scheduler, mut host) = setup(2, 3);
        host.sources.remove(&key(1));

        let cx = PollContext { scene: &scene, now: 0.0 };
        scheduler.sweep(&mut host, &cx);
        assert_eq!(scheduler.len(), 1);
    }

    #[test]
    fn test_notifications_follow_poll_order() {
        let mut scene = InMemoryScene::new();
        let mira = scene.spawn_actor("mira", Vec3::ZERO);
        let (mut scheduler, mut host) = setup(2, 1);

        let cx = PollContext { scene: &scene, now: 0.0 };
        let outcome = scheduler.sweep(&mut host, &cx);
        assert_eq!(outcome.polled, vec![key(0), key(1)]);
        assert_eq!(
            outcome.notifications,
            vec![
                Notification { source: key(0), triggerer: Some(mira) },
                Notification { source: key(1), triggerer: Some(mira) },
            ]
        );
    }
}

//! Integration tests for the script director.
//!
//! These tests use the sample definitions fixture to drive full sessions
//! through the public `ScriptDirector` API.

use script_director::{
    ComponentState, DirectorConfig, InMemoryScene, JsonFileStore, PayloadContext, ProgressionStore,
    Scene, ScriptDirector, ScriptRegistry, Sequence, TaskOutcome, TickReport,
};
use script_events::{fixtures, EntityRef, Signal, Vec3, EVENTS_DOCUMENT, TASKS_DOCUMENT};
use serde_json::json;
use std::fs;
use tempfile::tempdir;

/// Registers every payload, evaluator and condition the fixture names.
fn sample_registry() -> ScriptRegistry {
    let mut registry = ScriptRegistry::new();
    registry
        .register_payload("ambush_warning", || {
            Sequence::new().emit("ambush_spotted").wait(1.0)
        })
        .register_payload("patrol_sweep", Sequence::new)
        .register_payload("drop_gate", || {
            Sequence::new().then(|cx: &mut PayloadContext<'_>| {
                if let Some(gate) = cx.anchor {
                    cx.scene.set_property(gate, "closed", json!(true));
                }
                if let Some(actor) = cx.triggerer {
                    cx.scene.set_property(actor, "gate_closed", json!(true));
                }
            })
        })
        .register_payload("ring_bell", || Sequence::new().emit("bell_rung"))
        .register_payload("task_banner", Sequence::new)
        .register_payload("reward", || Sequence::new().emit("reward_granted"))
        .register_evaluator("gate_closed", |cx| {
            match cx.scene.property(cx.owner, "gate_closed") {
                Some(value) if value == json!(true) => 1,
                _ => 0,
            }
        })
        .register_condition("captain_dead", |cx| {
            cx.scene.property(cx.owner, "captain_dead") == Some(json!(true))
        });
    registry
}

struct Bridge {
    root: EntityRef,
    gate: EntityRef,
    lever: EntityRef,
}

/// Builds the bridge subtree the `bridge_ambush` event is anchored in.
fn build_bridge(scene: &mut InMemoryScene) -> Bridge {
    let root = scene.spawn("bridge", Vec3::new(100.0, 0.0, 0.0), None);
    scene.spawn("watch_post", Vec3::ZERO, Some(root));
    let gate = scene.spawn("gate", Vec3::new(5.0, 0.0, 0.0), Some(root));
    let lever = scene.spawn("lever", Vec3::new(0.5, 0.0, 0.0), Some(gate));
    Bridge { root, gate, lever }
}

fn session() -> ScriptDirector {
    let mut director = ScriptDirector::with_registry(sample_registry());
    let rejected = director.load_definitions(fixtures::sample_definitions());
    assert!(rejected.is_empty(), "Unexpected rejections: {:?}", rejected);
    director
}

/// Ticks until `done` holds for a report, returning every report seen.
fn tick_until(
    director: &mut ScriptDirector,
    scene: &mut InMemoryScene,
    max_ticks: usize,
    done: impl Fn(&TickReport) -> bool,
) -> Vec<TickReport> {
    let mut reports = Vec::new();
    for _ in 0..max_ticks {
        let report = director.tick(scene);
        let finished = done(&report);
        reports.push(report);
        if finished {
            return reports;
        }
    }
    panic!("Condition not reached within {} ticks", max_ticks);
}

fn state_of(director: &ScriptDirector, event: &str, path: &str) -> Option<ComponentState> {
    director
        .component_states()
        .into_iter()
        .find(|s| s.event == event && s.path == path)
        .map(|s| s.state)
}

/// Test that the fixture bundle loads against the sample registry.
#[test]
fn test_fixtures_load() {
    let director = session();

    assert!(director.events().definition("bridge_ambush").is_some());
    assert!(director.events().definition("market_day").is_some());
    assert!(director.tasks().definition("clear_the_bridge").is_some());
    assert!(director.tasks().definition("village_chores").is_some());
}

/// Test loading the same bundle from disk.
#[test]
fn test_definitions_file_load() {
    let mut director = ScriptDirector::with_registry(sample_registry());
    let rejected = director
        .load_definitions_file(std::path::Path::new(
            "../script-events/tests/fixtures/sample_definitions.json",
        ))
        .unwrap();

    assert!(rejected.is_empty());
    assert_eq!(director.events().definition_count(), 2);
    assert_eq!(director.tasks().definition_count(), 2);
}

/// Test that an empty registry rejects every definition that names a script.
#[test]
fn test_unregistered_scripts_are_skipped() {
    let mut director = ScriptDirector::with_registry(ScriptRegistry::new());
    let rejected = director.load_definitions(fixtures::sample_definitions());

    // village_chores names no scripts and survives.
    assert_eq!(rejected.len(), 3);
    assert_eq!(director.tasks().definition_count(), 1);
    assert!(director.tasks().definition("village_chores").is_some());
}

/// Test the full bridge ambush session end to end.
#[test]
fn test_bridge_ambush_session() {
    let mut scene = InMemoryScene::new();
    let bridge = build_bridge(&mut scene);
    let hero = scene.spawn_actor("hero", Vec3::ZERO);
    let mut director = session();

    assert!(director.spawn_event("bridge_ambush", Some(bridge.root), &mut scene));
    assert!(director.enable_event("bridge_ambush", &mut scene));
    assert!(director.assign_task("clear_the_bridge", hero, &mut scene));

    for _ in 0..10 {
        assert!(director.tick(&mut scene).admissions.is_empty());
    }

    // Walk onto the watch post area.
    scene.set_local_position(hero, Vec3::new(100.0, 0.0, 2.0));
    let reports = tick_until(&mut director, &mut scene, 10, |r| !r.admissions.is_empty());
    let admission = &reports.last().unwrap().admissions[0];
    assert_eq!(admission.path, "lookout");
    assert_eq!(admission.triggerer, Some(hero));

    // The lookout cascade-disables the patrol for the rest of the session.
    let patrol = director
        .component_states()
        .into_iter()
        .find(|s| s.path == "patrol")
        .unwrap();
    assert!(patrol.cascade_disabled);
    assert_eq!(patrol.state, ComponentState::Finished);

    // A lever pull outside the gate bounds is ignored, inside it is admitted.
    let far = scene.spawn("rock", Vec3::new(50.0, 0.0, 0.0), None);
    let missed =
        director.interaction_occurred(&Signal::new("pull_lever"), Some(far), Some(hero), &mut scene);
    assert!(missed.is_empty());
    let pulled = director.interaction_occurred(
        &Signal::new("pull_lever"),
        Some(bridge.lever),
        Some(hero),
        &mut scene,
    );
    assert_eq!(pulled.len(), 1);
    assert_eq!(scene.property(bridge.gate, "closed"), Some(json!(true)));

    for _ in 0..3 {
        director.submit_signal(&Signal::new("bandit_defeated"), Some(hero));
    }
    director.tick(&mut scene);
    let task = director.tasks().task("clear_the_bridge", hero).unwrap();
    assert_eq!(task.current_wave(), 1);

    director.submit_signal(&Signal::new("report_to_captain"), Some(hero));
    let report = director.tick(&mut scene);
    assert_eq!(report.task_outcomes.len(), 1);
    assert_eq!(report.task_outcomes[0].outcome, TaskOutcome::Succeeded);
    assert!(director.tasks().active().is_empty());

    // The lookout payload waits one second before finishing.
    tick_until(&mut director, &mut scene, 100, |r| {
        r.completed_events.contains(&"bridge_ambush".to_string())
    });
    assert!(!director.events().is_active("bridge_ambush"));

    let event = director.events_mut().progression("bridge_ambush");
    assert_eq!(event.times_triggered, 2);
    assert_eq!(event.times_completed, 1);
    let task = director.tasks_mut().progression("clear_the_bridge");
    assert_eq!(task.times_triggered, 1);
    assert_eq!(task.times_completed, 1);
}

/// Test that the task fails when its condition holds and nothing succeeded.
#[test]
fn test_task_fail_condition() {
    let mut scene = InMemoryScene::new();
    let hero = scene.spawn_actor("hero", Vec3::ZERO);
    let mut director = session();
    director.assign_task("clear_the_bridge", hero, &mut scene);

    scene.set_property(hero, "captain_dead", json!(true));
    let report = director.tick(&mut scene);

    assert_eq!(report.task_outcomes[0].outcome, TaskOutcome::Failed);
    let record = director.tasks_mut().progression("clear_the_bridge");
    assert_eq!(record.times_triggered, 1);
    assert_eq!(record.times_completed, 0);
}

/// Test that signals for another owner do not count toward a personal task,
/// while a global task accepts anyone.
#[test]
fn test_task_ownership() {
    let mut scene = InMemoryScene::new();
    let hero = scene.spawn_actor("hero", Vec3::ZERO);
    let stranger = scene.spawn_actor("stranger", Vec3::ZERO);
    let mut director = session();
    director.assign_task("clear_the_bridge", hero, &mut scene);
    director.assign_task("village_chores", hero, &mut scene);

    director.submit_signal(&Signal::new("bandit_defeated"), Some(stranger));
    director.submit_signal(&Signal::new("water_fetched"), Some(stranger));
    director.submit_signal(&Signal::new("water_fetched"), None);

    let bridge = director.tasks().task("clear_the_bridge", hero).unwrap();
    assert_eq!(bridge.subtasks()[0].current_amount(), 0);

    let report = director.tick(&mut scene);
    assert_eq!(report.task_outcomes.len(), 1);
    assert_eq!(report.task_outcomes[0].task, "village_chores");
}

/// Test that reinstantiation rebuilds the subtree exactly as captured.
#[test]
fn test_reinstantiation_after_replay() {
    let mut scene = InMemoryScene::new();
    let bridge = build_bridge(&mut scene);
    let hero = scene.spawn_actor("hero", Vec3::ZERO);
    let mut director = session();
    director.spawn_event("bridge_ambush", Some(bridge.root), &mut scene);
    let initial = director
        .events()
        .event("bridge_ambush")
        .and_then(|e| e.initial_snapshot())
        .cloned()
        .unwrap();

    director.enable_event("bridge_ambush", &mut scene);
    director.interaction_occurred(
        &Signal::new("pull_lever"),
        Some(bridge.lever),
        Some(hero),
        &mut scene,
    );
    scene.set_local_position(bridge.gate, Vec3::new(9.0, 9.0, 9.0));
    director.disable_event("bridge_ambush", &mut scene);

    // Enabling an event that has played rebuilds it.
    director.enable_event("bridge_ambush", &mut scene);
    let event = director.events().event("bridge_ambush").unwrap();
    let root = event.subtree().unwrap();
    assert_ne!(root, bridge.root);
    assert!(!scene.is_alive(bridge.root));
    assert!(!scene.is_alive(bridge.gate));
    assert_eq!(scene.world_position(root), Some(Vec3::new(100.0, 0.0, 0.0)));
    assert_eq!(scene.capture_subtree(root).unwrap(), initial);

    let gate = scene.find_descendant(root, "gate").unwrap();
    assert_eq!(scene.property(gate, "closed"), None);
    assert_eq!(state_of(&director, "bridge_ambush", "lever"), Some(ComponentState::Armed));
}

/// Test that the market bell is stackable alongside the ambush.
#[test]
fn test_stackable_market_day() {
    let mut scene = InMemoryScene::new();
    let bridge = build_bridge(&mut scene);
    let mut director = session();
    director.spawn_event("bridge_ambush", Some(bridge.root), &mut scene);
    director.spawn_event("market_day", None, &mut scene);

    assert!(director.enable_event("bridge_ambush", &mut scene));
    assert!(director.enable_event("market_day", &mut scene));

    let admission = director.fire_manual("market_day", "bell", None, &mut scene);
    assert!(admission.is_some());
    assert!(director.events().is_playing("market_day", "bell"));

    let reports = tick_until(&mut director, &mut scene, 5, |r| !r.completed_events.is_empty());
    assert_eq!(
        reports.last().unwrap().completed_events,
        vec!["market_day".to_string()]
    );
    assert!(director.events().is_active("bridge_ambush"));
}

/// Test that duplicated and reordered envelopes apply exactly once.
#[test]
fn test_replicated_session() {
    let mut host_scene = InMemoryScene::new();
    let mut guest_scene = InMemoryScene::new();
    let hero = host_scene.spawn_actor("hero", Vec3::ZERO);
    guest_scene.spawn_actor("hero", Vec3::ZERO);

    let mut host = session();
    let mut guest = session();
    host.assign_task("village_chores", hero, &mut host_scene);
    guest.assign_task("village_chores", hero, &mut guest_scene);

    host.submit_signal(&Signal::new("water_fetched"), Some(hero));
    host.submit_signal(&Signal::new("water_fetched"), Some(hero));
    let mut envelopes = host.drain_outbox();
    assert_eq!(envelopes.len(), 2);

    // Deliver out of order, with a duplicate, across the JSON wire format.
    envelopes.reverse();
    envelopes.push(envelopes[0].clone());
    let applied = envelopes
        .iter()
        .map(|e| e.to_json().unwrap())
        .map(|json| script_director::SignalEnvelope::from_json(&json).unwrap())
        .filter(|e| guest.receive(e, &mut guest_scene))
        .count();
    assert_eq!(applied, 2);

    let report = guest.tick(&mut guest_scene);
    assert_eq!(report.task_outcomes.len(), 1);
    assert_eq!(report.task_outcomes[0].outcome, TaskOutcome::Succeeded);
}

/// Test progression persistence through the file store.
#[test]
fn test_progression_files() {
    let dir = tempdir().unwrap();
    let mut config = DirectorConfig::default();
    config.persistence.directory = dir.path().join("saves");

    let mut scene = InMemoryScene::new();
    let mut director = ScriptDirector::new(config.clone(), sample_registry());
    director.load_definitions(fixtures::sample_definitions());
    director.spawn_event("market_day", None, &mut scene);
    director.enable_event("market_day", &mut scene);
    director.fire_manual("market_day", "bell", None, &mut scene);

    let mut store = director.progression_store();
    director.roll_over_day(&mut scene, &mut store).unwrap();

    let events_path = dir.path().join("saves").join(EVENTS_DOCUMENT);
    let content = fs::read_to_string(&events_path).unwrap();
    let saved: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert_eq!(saved[0]["key"], "market_day");
    assert_eq!(saved[0]["timesTriggered"], 1);
    assert!(dir.path().join("saves").join(TASKS_DOCUMENT).exists());

    let mut restored = ScriptDirector::new(config, sample_registry());
    let store = JsonFileStore::new(dir.path().join("saves"));
    assert_eq!(restored.load_progression(&store).unwrap(), 1);
    assert_eq!(restored.events_mut().progression("market_day").times_triggered, 1);
    assert_eq!(
        store.load_records(EVENTS_DOCUMENT).unwrap(),
        fixtures::sample_progression()
            .into_iter()
            .filter(|r| r.key == "market_day")
            .map(|mut r| {
                r.times_triggered = 1;
                r.times_completed = 0;
                r
            })
            .collect::<Vec<_>>()
    );
}

/// Test that the day rollover lets a finished event play again.
#[test]
fn test_event_replays_after_rollover() {
    let mut scene = InMemoryScene::new();
    let mut store = script_director::InMemoryStore::new();
    let mut director = session();
    director.spawn_event("market_day", None, &mut scene);

    director.enable_event("market_day", &mut scene);
    director.fire_manual("market_day", "bell", None, &mut scene);
    tick_until(&mut director, &mut scene, 5, |r| !r.completed_events.is_empty());
    assert!(director.fire_manual("market_day", "bell", None, &mut scene).is_none());

    director.roll_over_day(&mut scene, &mut store).unwrap();
    assert!(director.enable_event("market_day", &mut scene));
    assert!(director.fire_manual("market_day", "bell", None, &mut scene).is_some());
    assert_eq!(director.events_mut().progression("market_day").times_triggered, 2);
}

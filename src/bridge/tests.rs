use super::*;
use crate::error::ActorError;
use crate::messaging::MemoryBus;
use crate::world::{ActorSnapshot, ScriptedWorld};
use serde_json::json;

fn options() -> BridgeOptions {
    BridgeOptions {
        reconcile_cooldown: Duration::ZERO,
        ..Default::default()
    }
}

fn setup() -> (Arc<ScriptedWorld>, Arc<MemoryBus>, Arc<Bridge>) {
    let world = Arc::new(ScriptedWorld::new("Town01"));
    let bus = Arc::new(MemoryBus::new(json!({
        "ego_vehicle": { "role_name": ["hero"] }
    })));
    let bridge = Bridge::new(world.clone(), bus.clone(), options());
    (world, bus, bridge)
}

fn ts(elapsed: f64) -> Timestamp {
    Timestamp::new((elapsed * 20.0) as u64, elapsed, 0.05)
}

/// Pseudo actor whose update always fails
struct Broken;

impl PseudoActor for Broken {
    fn type_name(&self) -> &'static str {
        "Broken"
    }

    fn topic_prefix(&self) -> &str {
        "broken"
    }

    fn update(&mut self, _ctx: &UpdateContext<'_>) -> Result<(), ActorError> {
        Err(ActorError::MissingAttribute {
            id: 0,
            name: "anything".to_string(),
        })
    }
}

#[test]
fn test_new_registers_callbacks_and_seeds_pseudo_actors() {
    let (world, _bus, bridge) = setup();

    assert_eq!(world.callback_count(), 2);
    assert_eq!(bridge.pseudo_actor_topics(), vec!["/map", "objects"]);
    assert!(bridge.actor_ids().is_empty());
    assert_eq!(bridge.last_timestamp(), None);
}

#[test]
fn test_first_tick_always_runs() {
    let (_world, bus, bridge) = setup();

    let outcome = bridge.on_update_tick(ts(0.0));
    assert!(matches!(outcome, TickOutcome::Updated(_)));
    assert_eq!(bridge.last_timestamp(), Some(0.0));
    assert_eq!(bus.clock().map(|c| c.elapsed_seconds), Some(0.0));
}

#[test]
fn test_non_advancing_timestamps_are_skipped() {
    let (_world, bus, bridge) = setup();

    assert!(matches!(bridge.on_update_tick(ts(1.0)), TickOutcome::Updated(_)));
    assert_eq!(bridge.on_update_tick(ts(1.0)), TickOutcome::Skipped(SkipReason::Stale));
    assert_eq!(bridge.on_update_tick(ts(0.5)), TickOutcome::Skipped(SkipReason::Stale));
    assert_eq!(bridge.on_update_tick(ts(f64::NAN)), TickOutcome::Skipped(SkipReason::Stale));
    assert!(matches!(bridge.on_update_tick(ts(1.05)), TickOutcome::Updated(_)));

    assert_eq!(bridge.last_timestamp(), Some(1.05));
    assert_eq!(bus.batches().len(), 2);
    assert_eq!(bridge.stats().snapshot().stale_skips, 3);
}

#[test]
fn test_nan_first_tick_is_stale() {
    let (_world, _bus, bridge) = setup();
    assert_eq!(bridge.on_update_tick(ts(f64::NAN)), TickOutcome::Skipped(SkipReason::Stale));
    assert_eq!(bridge.last_timestamp(), None);
}

#[test]
fn test_busy_update_lock_skips() {
    let (_world, bus, bridge) = setup();

    let held = bridge.state.lock().unwrap();
    assert_eq!(bridge.on_update_tick(ts(1.0)), TickOutcome::Skipped(SkipReason::Busy));
    drop(held);

    assert!(bus.batches().is_empty());
    assert_eq!(bridge.stats().snapshot().busy_skips, 1);
    assert!(matches!(bridge.on_update_tick(ts(1.0)), TickOutcome::Updated(_)));
}

#[test]
fn test_busy_reconcile_lock_skips() {
    let (world, _bus, bridge) = setup();
    world.spawn(ActorSnapshot::new(1, "spectator"));

    let held = bridge.reconcile_lock.lock().unwrap();
    assert_eq!(bridge.on_reconcile_tick(ts(1.0)), None);
    drop(held);
    assert!(bridge.actor_ids().is_empty());

    let report = bridge.on_reconcile_tick(ts(1.0)).unwrap();
    assert_eq!(report.created, vec![1]);
    assert_eq!(bridge.stats().snapshot().reconcile_skips, 1);
}

#[test]
fn test_reconcile_cooldown_holds_lock() {
    let world = Arc::new(ScriptedWorld::new("Town01"));
    let bus = Arc::new(MemoryBus::new(json!({})));
    let bridge = Bridge::new(
        world,
        bus,
        BridgeOptions {
            reconcile_cooldown: Duration::from_millis(300),
            ..Default::default()
        },
    );

    let worker = {
        let bridge = bridge.clone();
        std::thread::spawn(move || bridge.on_reconcile_tick(ts(1.0)))
    };

    // the worker is well inside its cooldown by now
    std::thread::sleep(Duration::from_millis(100));
    let skipped = bridge.on_reconcile_tick(ts(1.0)).is_none();

    assert!(worker.join().unwrap().is_some());
    assert!(skipped);
}

#[test]
fn test_shutdown_skips_both_passes() {
    let (world, bus, bridge) = setup();
    world.spawn(ActorSnapshot::new(1, "spectator"));

    bridge.shutdown();
    assert!(bus.is_shutdown());

    assert_eq!(bridge.on_update_tick(ts(1.0)), TickOutcome::Skipped(SkipReason::Shutdown));
    assert_eq!(bridge.on_reconcile_tick(ts(1.0)), None);
    assert!(bridge.actor_ids().is_empty());
}

#[test]
fn test_run_returns_after_shutdown() {
    let (_world, bus, bridge) = setup();

    let runner = {
        let bridge = bridge.clone();
        std::thread::spawn(move || bridge.run())
    };
    bus.signal_shutdown("test");
    runner.join().unwrap();

    assert!(bus.is_shutdown());
}

#[test]
fn test_world_tick_reconciles_then_updates() {
    let (world, bus, bridge) = setup();
    world.spawn(ActorSnapshot::new(7, "spectator"));

    world.tick_inline(ts(0.5));

    assert_eq!(bridge.actor_ids(), vec![7]);
    assert_eq!(bridge.actor_kind(7), Some(ActorKind::Spectator));
    assert_eq!(bus.messages_on("/map").len(), 1);
    assert_eq!(bridge.stats().passes(), 1);
}

#[test]
fn test_failing_pseudo_actor_does_not_abort_pass() {
    let (world, _bus, bridge) = setup();
    world.spawn(ActorSnapshot::new(1, "spectator"));
    bridge.add_pseudo_actor(Box::new(Broken));
    bridge.on_reconcile_tick(ts(0.0));

    match bridge.on_update_tick(ts(0.1)) {
        TickOutcome::Updated(report) => {
            assert_eq!(report.pseudo_updated, 2);
            assert_eq!(report.pseudo_failures.len(), 1);
            assert_eq!(report.pseudo_failures[0].0, "Broken");
            assert_eq!(report.actors_updated, 1);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(bridge.stats().snapshot().update_failures, 1);
}

#[test]
fn test_accessors_follow_registry() {
    let (world, _bus, bridge) = setup();
    world.spawn(ActorSnapshot::new(1, "vehicle.tesla").with_attribute("role_name", "hero"));
    world.spawn(
        ActorSnapshot::new(2, "sensor.other.gnss")
            .with_attribute("role_name", "gnss1")
            .with_parent(1),
    );

    bridge.on_reconcile_tick(ts(0.0));

    assert_eq!(bridge.parent_of(2), Some(1));
    assert_eq!(bridge.parent_of(1), None);
    assert_eq!(bridge.topic_prefix_of(1).as_deref(), Some("hero"));
    assert_eq!(bridge.topic_prefix_of(2).as_deref(), Some("gnss/gnss1"));
    assert!(bridge.created_seq_of(1) < bridge.created_seq_of(2));
    assert_eq!(bridge.pseudo_actor_count(), 3);
}

#[test]
fn test_options_from_config() {
    let mut config = BridgeConfig::default();
    config.reconcile.cooldown_ms = 250;
    config.ego_vehicle.drop_object_list_on_destroy = true;

    let options = BridgeOptions::from(&config);
    assert_eq!(options.reconcile_cooldown, Duration::from_millis(250));
    assert_eq!(
        options.scoped_publisher_policy,
        ScopedPublisherPolicy::DropWithVehicle
    );
}

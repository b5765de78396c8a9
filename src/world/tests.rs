use super::*;
use serde_json::json;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[test]
fn test_spawn_and_enumerate() {
    let world = ScriptedWorld::new("Town01");
    world.spawn(ActorSnapshot::new(1, "vehicle.tesla").with_attribute("role_name", "hero"));
    world.spawn(ActorSnapshot::new(2, "sensor.camera.rgb").with_parent(1));

    let actors = world.actors();
    assert_eq!(actors.len(), 2);
    assert_eq!(actors[0].role_name(), Some("hero"));
    assert_eq!(actors[1].parent, Some(1));
    assert_eq!(world.find_actor(2).unwrap().type_id, "sensor.camera.rgb");
    assert!(world.find_actor(3).is_none());
}

#[test]
fn test_destroy_drops_state() {
    let world = ScriptedWorld::new("Town01");
    world.spawn(ActorSnapshot::new(7, "spectator"));
    assert!(world.actor_state(7).is_some());

    assert!(world.destroy(7));
    assert!(!world.destroy(7));
    assert!(world.actor_state(7).is_none());
    assert!(!world.set_state(7, ActorState::default()));
}

#[test]
fn test_advance_fires_callbacks_with_increasing_time() {
    let world = ScriptedWorld::new("Town01");
    let last_frame = Arc::new(AtomicU64::new(0));

    let seen = Arc::clone(&last_frame);
    world.on_tick(Arc::new(move |ts: Timestamp| {
        seen.fetch_max(ts.frame, Ordering::SeqCst);
    }));

    for handle in world.advance(0.05) {
        handle.join().unwrap();
    }
    for handle in world.advance(0.05) {
        handle.join().unwrap();
    }

    assert_eq!(last_frame.load(Ordering::SeqCst), 2);
    assert_eq!(world.callback_count(), 1);
}

#[test]
fn test_tick_inline_runs_every_callback() {
    let world = ScriptedWorld::new("Town01");
    let calls = Arc::new(AtomicU64::new(0));
    for _ in 0..2 {
        let calls = Arc::clone(&calls);
        world.on_tick(Arc::new(move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
        }));
    }

    world.tick_inline(Timestamp::new(1, 0.1, 0.1));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_load_scenario() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "map": "Town03",
            "actors": [
                {{ "id": 1, "type_id": "vehicle.audi.tt", "attributes": {{ "role_name": "hero" }},
                   "state": {{ "velocity": {{ "x": 3.0, "y": 4.0, "z": 0.0 }} }} }},
                {{ "id": 5, "type_id": "sensor.other.gnss", "parent": 1,
                   "sensor_events": [ {{ "latitude": 49.0 }} ] }}
            ]
        }}"#
    )
    .unwrap();

    let world = ScriptedWorld::from_scenario(file.path()).unwrap();
    assert_eq!(world.map_name(), "Town03");
    assert_eq!(world.actor_count(), 2);
    assert_eq!(world.actor_state(1).unwrap().velocity.length(), 5.0);
    assert_eq!(world.find_actor(5).unwrap().parent, Some(1));
    assert_eq!(world.sensor_events(5), vec![json!({ "latitude": 49.0 })]);
}

#[test]
fn test_load_missing_scenario_fails() {
    assert!(ScriptedWorld::from_scenario("/nonexistent/scenario.json").is_err());
}

#[test]
fn test_sensor_events_are_drained() {
    let world = ScriptedWorld::new("Town01");
    world.spawn(ActorSnapshot::new(4, "sensor.other.collision"));

    assert!(world.push_sensor_event(4, json!({ "other_actor_id": 9 })));
    assert!(world.push_sensor_event(4, json!({ "other_actor_id": 10 })));
    assert!(!world.push_sensor_event(5, json!({})));

    let events = world.sensor_events(4);
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["other_actor_id"], 9);
    assert!(world.sensor_events(4).is_empty());
    assert!(world.sensor_events(5).is_empty());
}

#[test]
fn test_control_and_autopilot_are_recorded() {
    let world = ScriptedWorld::new("Town01");
    world.spawn(ActorSnapshot::new(1, "vehicle.tesla"));
    assert_eq!(world.last_control(1), None);
    assert_eq!(world.autopilot(1), Some(false));

    let control = VehicleControl {
        throttle: 0.5,
        steer: -0.2,
        ..Default::default()
    };
    assert!(world.apply_control(1, control));
    assert!(world.set_autopilot(1, true));
    assert_eq!(world.last_control(1), Some(control));
    assert_eq!(world.autopilot(1), Some(true));

    world.destroy(1);
    assert!(!world.apply_control(1, control));
    assert!(!world.set_autopilot(1, false));
    assert_eq!(world.autopilot(1), None);
}

//! Physics synchronization tests
//!
//! Tests for:
//! - At-most-once contact/trigger semantics across continuous contact
//! - Deferral: zero user callbacks while the native step is in flight
//! - Replay order (contacts before triggers, FIFO within each)
//! - Stale-handle skipping when a callback destroys a node mid-drain
//! - The destroy+recreate rebuild protocol and its dependent cascades
//! - Fixed-step interpolation and guarded pose feedback

mod common;

use glam::Vec3;
use parking_lot::Mutex;
use std::sync::Arc;
use veld::physics::events::{ContactCallback, TriggerCallback};
use veld::physics::native::ContactPhase;
use veld::{
    ActorMotion, ColliderConfig, ColliderShape, ContactEvent, GeometryId, MaterialId, MeshDesc,
    Node, RigidBodyConfig, ShadowFlags, TriggerEvent, World,
};

// ============================================================================
// Helpers
// ============================================================================

type EventLog = Arc<Mutex<Vec<String>>>;

fn logging_body(tag: &str, log: &EventLog) -> Node {
    let mut config = RigidBodyConfig::new(ActorMotion::Dynamic);
    config.tag = Some(tag.to_string());

    let sink = Arc::clone(log);
    let on_start: Arc<ContactCallback> = Arc::new(move |_world: &mut World, event: &ContactEvent| {
        sink.lock()
            .push(format!("start:{}", event.tag.as_deref().unwrap_or("?")));
    });
    config.on_contact_start = Some(on_start);

    let sink = Arc::clone(log);
    let on_end: Arc<ContactCallback> = Arc::new(move |_world: &mut World, event: &ContactEvent| {
        sink.lock()
            .push(format!("end:{}", event.tag.as_deref().unwrap_or("?")));
    });
    config.on_contact_end = Some(on_end);

    Node::rigid_body(config)
}

fn logging_trigger(tag: &str, log: &EventLog) -> Node {
    let mut config = ColliderConfig::new(ColliderShape::Sphere { radius: 1.0 });
    config.trigger = true;
    config.tag = Some(tag.to_string());

    let sink = Arc::clone(log);
    let on_enter: Arc<TriggerCallback> = Arc::new(move |_world: &mut World, event: &TriggerEvent| {
        sink.lock()
            .push(format!("enter:{}", event.tag.as_deref().unwrap_or("?")));
    });
    config.on_trigger_enter = Some(on_enter);

    let sink = Arc::clone(log);
    let on_leave: Arc<TriggerCallback> = Arc::new(move |_world: &mut World, event: &TriggerEvent| {
        sink.lock()
            .push(format!("leave:{}", event.tag.as_deref().unwrap_or("?")));
    });
    config.on_trigger_leave = Some(on_leave);

    Node::collider(config)
}

fn sphere_collider(radius: f32) -> Node {
    Node::collider(ColliderConfig::new(ColliderShape::Sphere { radius }))
}

fn mesh_node() -> Node {
    Node::mesh(MeshDesc {
        geometry: GeometryId::next(),
        material: MaterialId::next(),
        shadows: ShadowFlags::default(),
    })
}

const STEP: f32 = 1.0 / 50.0;

// ============================================================================
// Contact semantics
// ============================================================================

#[test]
fn contact_start_fires_once_per_continuous_contact() {
    let (mut world, probe) = common::physics_world();
    let log = EventLog::default();

    let a = world.add(logging_body("alpha", &log));
    let b = world.add(logging_body("beta", &log));
    let (na, nb) = (common::native_of(&world, a), common::native_of(&world, b));

    // The engine may report the same found pair twice in one step.
    probe.queue_contact(na, nb, ContactPhase::Found);
    probe.queue_contact(na, nb, ContactPhase::Found);
    world.update(STEP);
    assert_eq!(
        *log.lock(),
        ["start:beta", "start:alpha"],
        "touch found fires exactly once per side"
    );

    // Still touching on a later step: no new transition.
    probe.queue_contact(na, nb, ContactPhase::Found);
    world.update(STEP);
    assert_eq!(log.lock().len(), 2);

    probe.queue_contact(na, nb, ContactPhase::Lost);
    world.update(STEP);
    assert_eq!(
        *log.lock(),
        ["start:beta", "start:alpha", "end:beta", "end:alpha"],
        "touch lost fires exactly once per prior start"
    );

    // A lost report with no matching start is swallowed.
    probe.queue_contact(na, nb, ContactPhase::Lost);
    world.update(STEP);
    assert_eq!(log.lock().len(), 4);
}

#[test]
fn trigger_enter_and_leave_fire_once_per_crossing() {
    let (mut world, probe) = common::physics_world();
    let log = EventLog::default();

    let trigger = world.add(logging_trigger("zone", &log));
    let body = world.add(logging_body("walker", &log));
    let (nt, nb) = (common::native_of(&world, trigger), common::native_of(&world, body));

    probe.queue_trigger(nt, nb, ContactPhase::Found);
    probe.queue_trigger(nt, nb, ContactPhase::Found);
    world.update(STEP);
    assert_eq!(*log.lock(), ["enter:walker"]);

    probe.queue_trigger(nt, nb, ContactPhase::Lost);
    world.update(STEP);
    assert_eq!(*log.lock(), ["enter:walker", "leave:walker"]);
}

#[test]
fn callbacks_never_run_inside_the_native_step() {
    let (mut world, probe) = common::physics_world();
    let observed: Arc<Mutex<Vec<bool>>> = Arc::default();

    let mut config = RigidBodyConfig::new(ActorMotion::Dynamic);
    let sink = Arc::clone(&observed);
    let step_probe = probe.clone();
    let on_start: Arc<ContactCallback> = Arc::new(move |_world: &mut World, _event: &ContactEvent| {
        // True here would mean the engine's fetch_results invoked us
        // reentrantly instead of the queue deferring us.
        sink.lock().push(step_probe.inside_step());
    });
    config.on_contact_start = Some(on_start);
    let a = world.add(Node::rigid_body(config));
    let b = world.add(logging_body("other", &EventLog::default()));

    let (na, nb) = (common::native_of(&world, a), common::native_of(&world, b));
    probe.queue_contact(na, nb, ContactPhase::Found);
    world.update(STEP);

    assert_eq!(
        *observed.lock(),
        [false],
        "the callback must run exactly once, after the step finalized"
    );
}

#[test]
fn contacts_replay_before_triggers_in_discovery_order() {
    let (mut world, probe) = common::physics_world();
    let log = EventLog::default();

    let trigger = world.add(logging_trigger("zone", &log));
    let a = world.add(logging_body("alpha", &log));
    let b = world.add(logging_body("beta", &log));
    let nt = common::native_of(&world, trigger);
    let (na, nb) = (common::native_of(&world, a), common::native_of(&world, b));

    // Triggers are discovered first this step, but contacts replay first.
    probe.queue_trigger(nt, na, ContactPhase::Found);
    probe.queue_contact(na, nb, ContactPhase::Found);
    world.update(STEP);

    assert_eq!(
        *log.lock(),
        ["start:beta", "start:alpha", "enter:alpha"]
    );
}

#[test]
fn callback_destroying_a_node_skips_its_queued_callbacks() {
    let (mut world, probe) = common::physics_world();
    let log = EventLog::default();

    let a = world.add(logging_body("hunter", &log));
    let b = world.add(logging_body("victim", &log));

    // Replace the hunter's start callback with one that despawns the victim.
    let sink = Arc::clone(&log);
    world
        .node_mut(a)
        .on_contact_start(move |world: &mut World, _event: &ContactEvent| {
            sink.lock().push("despawn".to_string());
            world.despawn(b);
        })
        .unwrap();
    world.flush();

    let (na, nb) = (common::native_of(&world, a), common::native_of(&world, b));
    probe.queue_contact(na, nb, ContactPhase::Found);
    world.update(STEP);

    // The victim's queued start callback found its handle destroyed and was
    // skipped instead of erroring.
    assert_eq!(*log.lock(), ["despawn"]);
    assert_eq!(world.physics().registry().len(), 1);
    assert!(world.node(b).is_none());
}

// ============================================================================
// Rebuild protocol
// ============================================================================

#[test]
fn radius_change_rebuilds_the_shape_without_leaks() {
    let (mut world, probe) = common::physics_world();

    let collider = world.add(sphere_collider(0.5));
    let shape_before = world.node(collider).unwrap().as_collider().unwrap().shape_id();
    let count_before = probe.resource_count();

    world.node_mut(collider).set_radius(2.0).unwrap();
    world.update(STEP);

    let shape_after = world.node(collider).unwrap().as_collider().unwrap().shape_id();
    assert!(shape_after.is_some());
    assert_ne!(shape_before, shape_after, "the native shape was recreated");
    assert_eq!(probe.resource_count(), count_before, "no leaked native shape");
    assert_eq!(probe.shape_count(), 1);
}

#[test]
fn invalid_radius_is_rejected_before_touching_the_engine() {
    let (mut world, probe) = common::physics_world();

    let collider = world.add(sphere_collider(0.5));
    let shape_before = world.node(collider).unwrap().as_collider().unwrap().shape_id();
    let count_before = probe.resource_count();

    assert!(world.node_mut(collider).set_radius(-1.0).is_err());
    world.update(STEP);

    // Previous resource intact, no rebuild scheduled.
    let shape_after = world.node(collider).unwrap().as_collider().unwrap().shape_id();
    assert_eq!(shape_before, shape_after);
    assert_eq!(probe.resource_count(), count_before);
}

#[test]
fn body_rebuild_reattaches_dependent_collider_shapes() {
    let (mut world, probe) = common::physics_world();

    let body = world.add(Node::rigid_body(RigidBodyConfig::new(ActorMotion::Dynamic)));
    let collider = world.spawn(sphere_collider(0.5));
    world.add_child(body, collider);
    assert_eq!((probe.actor_count(), probe.shape_count()), (1, 1));
    let shape_before = world.node(collider).unwrap().as_collider().unwrap().shape_id();

    world.node_mut(body).set_mass(5.0).unwrap();
    world.flush();

    // The old actor died with its attached shape; both were recreated in
    // the same drain.
    assert_eq!((probe.actor_count(), probe.shape_count()), (1, 1));
    let shape_after = world.node(collider).unwrap().as_collider().unwrap().shape_id();
    assert_ne!(shape_before, shape_after);
    assert_eq!(world.physics().registry().len(), 1);
}

#[test]
fn body_rebuild_recreates_joints_referencing_it() {
    let (mut world, probe) = common::physics_world();

    let a = world.add(Node::rigid_body(RigidBodyConfig::new(ActorMotion::Dynamic)));
    let b = world.add(Node::rigid_body(RigidBodyConfig::new(ActorMotion::Dynamic)));
    let joint = world.add(Node::joint(veld::JointConfig {
        body_a: Some(a),
        body_b: Some(b),
        ..veld::JointConfig::default()
    }));
    assert_eq!(probe.joint_count(), 1);
    let count_before = probe.resource_count();

    world.node_mut(a).set_mass(3.0).unwrap();
    world.flush();

    assert_eq!(probe.joint_count(), 1, "joint rebuilt against the new actor");
    assert_eq!(probe.resource_count(), count_before);
    let _ = joint;
}

// ============================================================================
// Interpolation / pose feedback
// ============================================================================

#[test]
fn resting_dynamic_body_is_left_alone() {
    let (mut world, _probe) = common::physics_world();

    let body = world.add(
        Node::rigid_body(RigidBodyConfig::new(ActorMotion::Dynamic))
            .with_position(Vec3::new(3.0, 0.0, 0.0)),
    );
    for _ in 0..4 {
        world.update(STEP);
    }

    // Never in the engine's active set → never interpolated, transform
    // untouched.
    let pos = world.scene().world_position(body).unwrap();
    assert!((pos - Vec3::new(3.0, 0.0, 0.0)).length() < 1e-5);
    assert_eq!(world.scene().dirty_count(), 0);
}

#[test]
fn moving_body_blends_between_fixed_steps() {
    let (mut world, probe) = common::physics_world();

    let body = world.add(Node::rigid_body(RigidBodyConfig::new(ActorMotion::Dynamic)));
    let native = common::native_of(&world, body);
    probe.set_velocity(native, Vec3::X);

    world.update(STEP); // engine at 0.02; first sample brackets collapse
    world.update(STEP); // engine at 0.04; brackets = [0.02, 0.04]
    let pos = world.scene().world_position(body).unwrap();
    assert!(
        (pos.x - 0.02).abs() < 1e-4,
        "alpha 0 renders the previous fixed pose, got {}",
        pos.x
    );

    world.update(STEP * 0.5); // no step; alpha = 0.5 → halfway
    let pos = world.scene().world_position(body).unwrap();
    assert!((pos.x - 0.03).abs() < 1e-4, "expected 0.03, got {}", pos.x);

    // The feedback write must not re-enter the dirty propagation set.
    assert_eq!(world.scene().dirty_count(), 0);
}

#[test]
fn pose_feedback_moves_child_visuals() {
    let (mut world, engine_probe, render_probe) = common::full_world();

    let body = world.add(Node::rigid_body(RigidBodyConfig::new(ActorMotion::Dynamic)));
    let visual = world.spawn(mesh_node());
    world.add_child(body, visual);

    let native = common::native_of(&world, body);
    engine_probe.set_velocity(native, Vec3::X);
    world.update(STEP);
    world.update(STEP);

    let matrix = render_probe.matrix_of(1).unwrap();
    let translation = matrix.w_axis.truncate();
    assert!(
        (translation.x - 0.02).abs() < 1e-4,
        "child renderable follows the interpolated body, got {}",
        translation.x
    );
}

#[test]
fn kinematic_move_commits_as_a_target() {
    let (mut world, probe) = common::physics_world();

    let body = world.add(Node::rigid_body(RigidBodyConfig::new(ActorMotion::Kinematic)));
    let native = common::native_of(&world, body);

    world.node_mut(body).set_position(Vec3::new(1.0, 0.0, 0.0));
    world.update(STEP);

    // The commit set a kinematic target; the step swept the actor to it.
    let pose = probe.actor_pose(native).unwrap();
    assert!((pose.position - Vec3::new(1.0, 0.0, 0.0)).length() < 1e-5);
}

#[test]
fn controller_sweeps_to_its_kinematic_target() {
    let (mut world, probe) = common::physics_world();

    let controller = world.add(Node::controller(veld::ControllerConfig::new(0.3, 1.8)));
    let native = common::native_of(&world, controller);
    assert_eq!(probe.shape_count(), 1);

    world.node_mut(controller).set_position(Vec3::new(0.0, 0.0, 2.0));
    world.update(STEP);

    let pose = probe.actor_pose(native).unwrap();
    assert!((pose.position - Vec3::new(0.0, 0.0, 2.0)).length() < 1e-5);
}

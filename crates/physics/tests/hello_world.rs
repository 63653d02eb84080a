use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use glam::{Quat, Vec3};
use jobs::SingleThreaded;
use parking_lot::Mutex;
use physics::{
    Activation, Body, BodyActivationListener, BodyCreationSettings, BodyId, BodyManager, ContactListener,
    ContactManifold, ContactSettings, MotionType, PhysicsLimits, PhysicsSettings, PhysicsStepListener, PhysicsSystem,
    RVec3, Real, ShapeSettings, SubShapeIdPair, UpdateError, MOVING, NON_MOVING,
};

#[derive(Default)]
struct Counter {
    added_pairs: Mutex<Vec<(BodyId, BodyId)>>,
    added: AtomicUsize,
    persisted: AtomicUsize,
    removed: AtomicUsize,
    deactivated: AtomicUsize,
}

impl ContactListener for Counter {
    fn on_contact_added(&self, body1: &Body, body2: &Body, _: &ContactManifold, _: &mut ContactSettings) {
        self.added_pairs.lock().push((body1.id(), body2.id()));
        self.added.fetch_add(1, Ordering::Relaxed);
    }

    fn on_contact_persisted(&self, _: &Body, _: &Body, _: &ContactManifold, _: &mut ContactSettings) {
        self.persisted.fetch_add(1, Ordering::Relaxed);
    }

    fn on_contact_removed(&self, _: &SubShapeIdPair) {
        self.removed.fetch_add(1, Ordering::Relaxed);
    }
}

impl BodyActivationListener for Counter {
    fn on_body_activated(&self, _: BodyId, _: u64) {}

    fn on_body_deactivated(&self, _: BodyId, _: u64) {
        self.deactivated.fetch_add(1, Ordering::Relaxed);
    }
}

/// Static floor with its top at y = 0 and a ball of radius 0.5 thrown down
/// from y = 2.
fn hello_world() -> (PhysicsSystem, BodyId, BodyId) {
    let mut system = PhysicsSystem::with_default_layers(PhysicsSettings::default(), PhysicsLimits::default());
    let floor = ShapeSettings::box_shape(Vec3::new(100.0, 1.0, 100.0)).create().unwrap();
    let floor = system
        .create_and_add_body(
            &BodyCreationSettings::new(floor, RVec3::new(0.0, -1.0, 0.0), Quat::IDENTITY, MotionType::Static, NON_MOVING),
            Activation::DontActivate,
        )
        .unwrap();
    let ball = ShapeSettings::sphere(0.5).create().unwrap();
    let sphere = system
        .create_and_add_body(
            &BodyCreationSettings::new(ball, RVec3::new(0.0, 2.0, 0.0), Quat::IDENTITY, MotionType::Dynamic, MOVING)
                .with_linear_velocity(Vec3::new(0.0, -5.0, 0.0)),
            Activation::Activate,
        )
        .unwrap();
    (system, floor, sphere)
}

#[test]
fn sphere_comes_to_rest_on_floor() {
    let (mut system, floor, sphere) = hello_world();
    let counter = Arc::new(Counter::default());
    system.set_contact_listener(Some(counter.clone()));
    system.set_body_activation_listener(Some(counter.clone()));
    let jobs = SingleThreaded::new();

    let mut steps = 0;
    while system.is_active(sphere) && steps < 1000 {
        assert_eq!(system.update(1.0 / 60.0, 1, 1, &jobs), UpdateError::empty());
        steps += 1;
    }

    let y = system.position(sphere).unwrap().y;
    // floor top is at y = 0, so the center rests one radius above it
    assert!((y - 0.5).abs() < 0.05, "y={y}");
    let added = counter.added_pairs.lock();
    assert!(added.contains(&(floor, sphere)) || added.contains(&(sphere, floor)));
    drop(added);
    assert!(counter.persisted.load(Ordering::Relaxed) > 0);
    assert!(!system.is_active(sphere), "sphere still awake after {steps} steps");
    assert_eq!(counter.deactivated.load(Ordering::Relaxed), 1);
    assert_eq!(system.linear_velocity(sphere), Some(Vec3::ZERO));
}

#[test]
fn free_fall_matches_analytic() {
    let (mut system, _, sphere) = hello_world();
    let jobs = SingleThreaded::new();
    let dt: f32 = 1.0 / 60.0;
    for _ in 0..10 {
        system.update(dt, 1, 1, &jobs);
    }
    // symplectic Euler: y = y0 + v0 n dt - g dt² n(n+1)/2, damping slows the ball a little
    let expected = Real::from(2.0 - 5.0 * 10.0 * dt - 9.81 * dt * dt * (10.0 * 11.0) / 2.0);
    let y = system.position(sphere).unwrap().y;
    assert!(y >= expected - 1e-3 && y < expected + 0.02, "y={y} expected={expected}");
}

#[test]
fn lifting_the_ball_reports_removed_contact() {
    let (mut system, _, sphere) = hello_world();
    let counter = Arc::new(Counter::default());
    system.set_contact_listener(Some(counter.clone()));
    let jobs = SingleThreaded::new();
    for _ in 0..90 {
        system.update(1.0 / 60.0, 1, 1, &jobs);
    }
    let before = counter.removed.load(Ordering::Relaxed);

    system
        .set_position(sphere, RVec3::new(0.0, 10.0, 0.0), Activation::Activate)
        .unwrap();
    system.update(1.0 / 60.0, 1, 1, &jobs);
    assert!(counter.removed.load(Ordering::Relaxed) > before);
    assert_eq!(system.num_cached_manifolds(), 0);
}

#[test]
fn sub_steps_do_not_change_the_rest_height() {
    let (mut system, _, sphere) = hello_world();
    let jobs = SingleThreaded::new();
    for _ in 0..240 {
        system.update(1.0 / 30.0, 2, 2, &jobs);
    }
    let y = system.position(sphere).unwrap().y;
    assert!((y - 0.5).abs() < 0.05, "y={y}");
}

#[derive(Default)]
struct StepLog(Mutex<Vec<(f32, usize)>>);

impl PhysicsStepListener for StepLog {
    fn on_step(&self, delta_time: f32, bodies: &mut BodyManager) {
        self.0.lock().push((delta_time, bodies.len()));
    }
}

#[test]
fn step_listeners_run_once_per_collision_step() {
    let (mut system, _, _) = hello_world();
    let log = Arc::new(StepLog::default());
    let listener: Arc<dyn PhysicsStepListener> = log.clone();
    system.add_step_listener(listener.clone());
    let jobs = SingleThreaded::new();

    system.update(1.0 / 30.0, 2, 1, &jobs);
    {
        let calls = log.0.lock();
        assert_eq!(calls.len(), 2);
        for &(dt, bodies) in calls.iter() {
            assert!((dt - 1.0 / 60.0).abs() < 1e-6);
            assert_eq!(bodies, 2);
        }
    }

    system.remove_step_listener(&listener);
    system.update(1.0 / 60.0, 1, 1, &jobs);
    assert_eq!(log.0.lock().len(), 2);
}

#[test]
fn sub_steps_do_not_overshoot_a_speculative_contact() {
    let mut system = PhysicsSystem::with_default_layers(PhysicsSettings::default(), PhysicsLimits::default());
    let floor = ShapeSettings::box_shape(Vec3::new(100.0, 1.0, 100.0)).create().unwrap();
    system
        .create_and_add_body(
            &BodyCreationSettings::new(floor, RVec3::new(0.0, -1.0, 0.0), Quat::IDENTITY, MotionType::Static, NON_MOVING),
            Activation::DontActivate,
        )
        .unwrap();
    // 1.5 cm above the floor, moving fast enough to cross the gap in one sub-step
    let ball = ShapeSettings::sphere(0.5).create().unwrap();
    let sphere = system
        .create_and_add_body(
            &BodyCreationSettings::new(ball, RVec3::new(0.0, 0.515, 0.0), Quat::IDENTITY, MotionType::Dynamic, MOVING)
                .with_linear_velocity(Vec3::new(0.0, -3.0, 0.0)),
            Activation::Activate,
        )
        .unwrap();

    let jobs = SingleThreaded::new();
    system.update(1.0 / 60.0, 1, 4, &jobs);
    let penetration = 0.5 - system.position(sphere).unwrap().y;
    assert!(
        penetration < Real::from(system.settings().penetration_slop),
        "penetration={penetration}"
    );
}

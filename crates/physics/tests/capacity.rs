use glam::{Quat, Vec3};
use jobs::SingleThreaded;
use physics::{
    Activation, BodyCreationSettings, MotionType, PhysicsLimits, PhysicsSettings, PhysicsSystem, RVec3, Real, ShapeSettings,
    UpdateError, MOVING, NON_MOVING,
};

/// Floor with a row of touching balls resting on it.
fn row_of_balls(limits: PhysicsLimits) -> PhysicsSystem {
    let mut system = PhysicsSystem::with_default_layers(PhysicsSettings::default(), limits);
    let floor = ShapeSettings::box_shape(Vec3::new(10.0, 0.5, 10.0)).create().unwrap();
    system
        .create_and_add_body(
            &BodyCreationSettings::new(floor, RVec3::new(0.0, -0.5, 0.0), Quat::IDENTITY, MotionType::Static, NON_MOVING),
            Activation::DontActivate,
        )
        .unwrap();
    let ball = ShapeSettings::sphere(0.5).create().unwrap();
    for i in 0..3 {
        let settings = BodyCreationSettings::new(
            ball.clone(),
            RVec3::new(i as Real - 1.0, 0.5, 0.0),
            Quat::IDENTITY,
            MotionType::Dynamic,
            MOVING,
        );
        system.create_and_add_body(&settings, Activation::Activate).unwrap();
    }
    system
}

#[test]
fn defaults_do_not_overflow() {
    let mut system = row_of_balls(PhysicsLimits::default());
    let jobs = SingleThreaded::new();
    for _ in 0..10 {
        assert_eq!(system.update(1.0 / 60.0, 1, 1, &jobs), UpdateError::empty());
    }
}

#[test]
fn too_many_body_pairs_is_reported() {
    let limits = PhysicsLimits {
        max_body_pairs: 1,
        ..PhysicsLimits::default()
    };
    let mut system = row_of_balls(limits);
    let errors = system.update(1.0 / 60.0, 1, 1, &SingleThreaded::new());
    assert!(errors.contains(UpdateError::BODY_PAIR_CACHE_FULL));
    assert!(!errors.contains(UpdateError::CONTACT_CONSTRAINTS_FULL));
}

#[test]
fn too_many_contacts_is_reported_and_step_completes() {
    let limits = PhysicsLimits {
        max_contact_constraints: 1,
        ..PhysicsLimits::default()
    };
    let mut system = row_of_balls(limits);
    let ids = system.body_ids();
    let errors = system.update(1.0 / 60.0, 1, 1, &SingleThreaded::new());
    assert!(errors.contains(UpdateError::CONTACT_CONSTRAINTS_FULL));
    assert!(!errors.contains(UpdateError::BODY_PAIR_CACHE_FULL));
    // every body still got integrated
    for id in &ids[1..] {
        assert!(system.linear_velocity(*id).unwrap().y.abs() < 1.0);
    }
    assert!(system.num_cached_manifolds() <= 1);
}

#[test]
fn sensor_contacts_fill_the_manifold_cache() {
    let limits = PhysicsLimits {
        max_contact_constraints: 1,
        ..PhysicsLimits::default()
    };
    let mut system = PhysicsSystem::with_default_layers(PhysicsSettings::default(), limits);
    system.set_gravity(Vec3::ZERO);
    let volume = ShapeSettings::box_shape(Vec3::splat(3.0)).create().unwrap();
    system
        .create_and_add_body(
            &BodyCreationSettings::new(volume, RVec3::ZERO, Quat::IDENTITY, MotionType::Static, NON_MOVING)
                .with_sensor(true),
            Activation::DontActivate,
        )
        .unwrap();
    let ball = ShapeSettings::sphere(0.3).create().unwrap();
    for x in [-1.5, 1.5] {
        system
            .create_and_add_body(
                &BodyCreationSettings::new(ball.clone(), RVec3::new(x, 0.0, 0.0), Quat::IDENTITY, MotionType::Dynamic, MOVING),
                Activation::Activate,
            )
            .unwrap();
    }
    let errors = system.update(1.0 / 60.0, 1, 1, &SingleThreaded::new());
    assert_eq!(errors, UpdateError::MANIFOLD_CACHE_FULL);
    assert_eq!(system.num_cached_manifolds(), 1);
}

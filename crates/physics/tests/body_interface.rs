use glam::{Quat, Vec3};
use jobs::SingleThreaded;
use physics::{
    Activation, BodyCreationSettings, BodyId, MotionType, PhysicsError, PhysicsLimits, PhysicsSettings, PhysicsSystem,
    RVec3, ShapeSettings, MOVING, NON_MOVING,
};

fn weightless() -> PhysicsSystem {
    let mut system = PhysicsSystem::with_default_layers(PhysicsSettings::default(), PhysicsLimits::default());
    system.set_gravity(Vec3::ZERO);
    system
}

fn add(system: &mut PhysicsSystem, settings: &BodyCreationSettings) -> BodyId {
    system.create_and_add_body(settings, Activation::Activate).unwrap()
}

#[test]
fn impulse_changes_momentum() {
    let mut system = weightless();
    // 1 m cube of density 1000 weighs a ton
    let shape = ShapeSettings::box_shape(Vec3::splat(0.5)).create().unwrap();
    let id = add(
        &mut system,
        &BodyCreationSettings::new(shape, RVec3::ZERO, Quat::IDENTITY, MotionType::Dynamic, MOVING),
    );
    system.add_impulse(id, Vec3::new(1000.0, 0.0, 0.0)).unwrap();
    let v = system.linear_velocity(id).unwrap();
    assert!((v - Vec3::X).length() < 1.0e-4, "v={v:?}");

    system.set_linear_velocity(id, Vec3::ZERO).unwrap();
    system.add_impulse_at(id, Vec3::new(0.0, 100.0, 0.0), RVec3::new(0.5, 0.0, 0.0)).unwrap();
    let w = system.angular_velocity(id).unwrap();
    assert!(w.z > 0.0 && w.x.abs() < 1.0e-6 && w.y.abs() < 1.0e-6, "w={w:?}");
}

#[test]
fn force_acts_for_one_step() {
    let mut system = weightless();
    let shape = ShapeSettings::sphere(0.5).create().unwrap();
    let mut settings = BodyCreationSettings::new(shape, RVec3::ZERO, Quat::IDENTITY, MotionType::Dynamic, MOVING);
    settings.linear_damping = 0.0;
    let id = add(&mut system, &settings);
    let mass = 1.0 / system.bodies().lock_read(id).unwrap().inverse_mass();

    let jobs = SingleThreaded::new();
    system.add_force(id, Vec3::new(mass * 60.0, 0.0, 0.0), Activation::Activate).unwrap();
    system.update(1.0 / 60.0, 1, 1, &jobs);
    let after_push = system.linear_velocity(id).unwrap().x;
    assert!((after_push - 1.0).abs() < 1.0e-4, "v={after_push}");

    system.update(1.0 / 60.0, 1, 1, &jobs);
    assert_eq!(system.linear_velocity(id).unwrap().x, after_push);
}

#[test]
fn kinematic_body_reaches_target() {
    let mut system = PhysicsSystem::with_default_layers(PhysicsSettings::default(), PhysicsLimits::default());
    let paddle = ShapeSettings::box_shape(Vec3::new(0.5, 0.5, 0.5)).create().unwrap();
    let paddle = add(
        &mut system,
        &BodyCreationSettings::new(paddle, RVec3::ZERO, Quat::IDENTITY, MotionType::Kinematic, MOVING),
    );
    let jobs = SingleThreaded::new();
    let target = RVec3::new(1.0, 0.0, 0.0);
    let turn = Quat::from_rotation_y(0.5);
    system.move_kinematic(paddle, target, turn, 0.25).unwrap();
    for _ in 0..15 {
        system.update(1.0 / 60.0, 1, 1, &jobs);
    }
    let p = system.position(paddle).unwrap();
    assert!((p - target).length() < 1.0e-3, "p={p:?}");
    assert!(system.rotation(paddle).unwrap().angle_between(turn) < 1.0e-3);
    // gravity does not act on kinematic bodies
    assert_eq!(system.linear_velocity(paddle).unwrap().y, 0.0);
}

#[test]
fn set_shape_keeps_center_of_mass() {
    let mut system = weightless();
    let small = ShapeSettings::sphere(0.5).create().unwrap();
    let id = add(
        &mut system,
        &BodyCreationSettings::new(small, RVec3::new(0.0, 2.0, 0.0), Quat::IDENTITY, MotionType::Dynamic, MOVING),
    );
    let before = system.center_of_mass_position(id).unwrap();
    let inv_mass = system.bodies().lock_read(id).unwrap().inverse_mass();

    let offset = ShapeSettings::decorated(
        ShapeSettings::sphere(1.0).create().unwrap(),
        Vec3::new(1.0, 0.0, 0.0),
        Quat::IDENTITY,
    )
    .create()
    .unwrap();
    system.set_shape(id, offset, true, Activation::Activate).unwrap();

    let after = system.center_of_mass_position(id).unwrap();
    assert!((after - before).length() < 1.0e-5);
    // 8 times the volume
    let new_inv_mass = system.bodies().lock_read(id).unwrap().inverse_mass();
    assert!((inv_mass / new_inv_mass - 8.0).abs() < 1.0e-3);
    let bounds = system.world_bounds(id).unwrap();
    assert!((bounds.max.y - 3.0).abs() < 1.0e-4);
}

#[test]
fn motion_type_changes() {
    let mut system = weightless();
    let shape = ShapeSettings::sphere(0.5).create().unwrap();
    let fixed = system
        .create_and_add_body(
            &BodyCreationSettings::new(shape.clone(), RVec3::ZERO, Quat::IDENTITY, MotionType::Static, NON_MOVING),
            Activation::DontActivate,
        )
        .unwrap();
    assert!(matches!(
        system.set_motion_type(fixed, MotionType::Dynamic, Activation::Activate),
        Err(PhysicsError::InvalidMassProperties(_))
    ));

    let mut convertible = BodyCreationSettings::new(shape, RVec3::new(3.0, 0.0, 0.0), Quat::IDENTITY, MotionType::Static, MOVING);
    convertible.allow_dynamic_or_kinematic = true;
    let id = system.create_and_add_body(&convertible, Activation::DontActivate).unwrap();
    system.set_motion_type(id, MotionType::Dynamic, Activation::Activate).unwrap();
    assert_eq!(system.motion_type(id), Some(MotionType::Dynamic));
    assert!(system.is_active(id));

    system.set_motion_type(id, MotionType::Static, Activation::Activate).unwrap();
    assert!(!system.is_active(id));
}

#[test]
fn stale_ids_are_rejected() {
    let mut system = weightless();
    let shape = ShapeSettings::sphere(0.5).create().unwrap();
    let id = system
        .create_body(&BodyCreationSettings::new(shape, RVec3::ZERO, Quat::IDENTITY, MotionType::Dynamic, MOVING))
        .unwrap();
    system.destroy_body(id).unwrap();
    assert_eq!(system.set_position(id, RVec3::ZERO, Activation::Activate), Err(PhysicsError::InvalidBodyId(id)));
    assert_eq!(system.add_impulse(id, Vec3::X), Err(PhysicsError::InvalidBodyId(id)));
    assert_eq!(system.set_friction(id, 0.5), Err(PhysicsError::InvalidBodyId(id)));
    assert!(system.linear_velocity(id).is_none());
}

#[test]
fn object_layer_moves_between_trees() {
    let mut system = PhysicsSystem::with_default_layers(PhysicsSettings::default(), PhysicsLimits::default());
    let floor = ShapeSettings::box_shape(Vec3::new(5.0, 0.5, 5.0)).create().unwrap();
    let settings = BodyCreationSettings::new(floor, RVec3::new(0.0, -0.5, 0.0), Quat::IDENTITY, MotionType::Static, MOVING);
    let floor = system.create_and_add_body(&settings, Activation::DontActivate).unwrap();
    system.set_object_layer(floor, NON_MOVING).unwrap();

    let ball = ShapeSettings::sphere(0.5).create().unwrap();
    let ball = add(
        &mut system,
        &BodyCreationSettings::new(ball, RVec3::new(0.0, 1.0, 0.0), Quat::IDENTITY, MotionType::Dynamic, MOVING),
    );
    let jobs = SingleThreaded::new();
    for _ in 0..120 {
        system.update(1.0 / 60.0, 1, 1, &jobs);
    }
    assert!((system.position(ball).unwrap().y - 0.5).abs() < 0.05);
}

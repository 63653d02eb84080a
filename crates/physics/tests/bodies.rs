use glam::{Quat, Vec3};
use physics::shapes::shape_ref_count;
use physics::{
    Activation, BodyCreationSettings, BodyId, MotionType, PhysicsError, PhysicsLimits, PhysicsSettings, PhysicsSystem,
    RVec3, ShapeSettings, MOVING,
};

fn system_with(max_bodies: usize) -> PhysicsSystem {
    let limits = PhysicsLimits {
        max_bodies,
        ..PhysicsLimits::default()
    };
    PhysicsSystem::with_default_layers(PhysicsSettings::default(), limits)
}

fn ball_settings() -> BodyCreationSettings {
    let shape = ShapeSettings::sphere(0.5).create().unwrap();
    BodyCreationSettings::new(shape, RVec3::ZERO, Quat::IDENTITY, MotionType::Dynamic, MOVING)
}

#[test]
fn id_round_trips_through_raw() {
    let id = BodyId::new(1234, 7);
    assert_eq!(id.index(), 1234);
    assert_eq!(id.sequence_number(), 7);
    assert_eq!(BodyId::from_raw(id.raw()), id);
    assert!(BodyId::default().is_invalid());
}

#[test]
fn reused_slot_invalidates_old_id() {
    let mut system = system_with(4);
    let first = system.create_body(&ball_settings()).unwrap();
    system.destroy_body(first).unwrap();
    let second = system.create_body(&ball_settings()).unwrap();

    assert_eq!(first.index(), second.index());
    assert_ne!(first.sequence_number(), second.sequence_number());
    assert!(system.position(first).is_none());
    assert!(system.position(second).is_some());
    assert_eq!(system.destroy_body(first), Err(PhysicsError::InvalidBodyId(first)));
}

#[test]
fn store_reports_full() {
    let mut system = system_with(2);
    system.create_body(&ball_settings()).unwrap();
    system.create_body(&ball_settings()).unwrap();
    assert_eq!(system.create_body(&ball_settings()), Err(PhysicsError::TooManyBodies(2)));
    assert_eq!(system.num_bodies(), 2);
}

#[test]
fn added_bodies_must_be_removed_before_destroying() {
    let mut system = system_with(4);
    let id = system.create_and_add_body(&ball_settings(), Activation::Activate).unwrap();
    assert!(system.is_added(id));
    assert!(system.is_active(id));
    assert_eq!(system.destroy_body(id), Err(PhysicsError::BodyStillAdded(id)));
    assert_eq!(system.add_body(id, Activation::Activate), Err(PhysicsError::BodyAlreadyAdded(id)));

    system.remove_body(id).unwrap();
    assert!(!system.is_active(id));
    assert_eq!(system.remove_body(id), Err(PhysicsError::BodyNotAdded(id)));
    system.destroy_body(id).unwrap();
    assert_eq!(system.num_bodies(), 0);
}

#[test]
fn shapes_are_released_with_their_bodies() {
    let mut system = system_with(4);
    let shape = ShapeSettings::box_shape(Vec3::splat(0.5)).create().unwrap();
    let settings = BodyCreationSettings::new(shape.clone(), RVec3::ZERO, Quat::IDENTITY, MotionType::Dynamic, MOVING);
    // the local handle plus the one held by the settings
    assert_eq!(shape_ref_count(&shape), 2);

    let a = system.create_body(&settings).unwrap();
    let b = system.create_body(&settings).unwrap();
    assert_eq!(shape_ref_count(&shape), 4);

    system.destroy_body(a).unwrap();
    system.destroy_body(b).unwrap();
    drop(settings);
    assert_eq!(shape_ref_count(&shape), 1);
}

#[test]
fn user_data_and_velocity_setters() {
    let mut system = system_with(4);
    let id = system.create_and_add_body(&ball_settings().with_user_data(42), Activation::DontActivate).unwrap();
    assert_eq!(system.user_data(id), Some(42));
    assert!(!system.is_active(id));

    system.set_linear_velocity(id, Vec3::new(1.0, 0.0, 0.0)).unwrap();
    assert!(system.is_active(id));
    assert_eq!(system.linear_velocity(id), Some(Vec3::new(1.0, 0.0, 0.0)));

    system.set_user_data(id, 7).unwrap();
    assert_eq!(system.user_data(id), Some(7));
}

#[test]
fn activation_is_idempotent() {
    let mut system = system_with(4);
    let id = system.create_and_add_body(&ball_settings(), Activation::DontActivate).unwrap();
    assert!(system.activate_body(id));
    assert!(!system.activate_body(id));
    assert_eq!(system.num_active_bodies(), 1);
    assert!(system.deactivate_body(id));
    assert!(!system.deactivate_body(id));
    assert_eq!(system.num_active_bodies(), 0);
}

#[test]
fn static_bodies_never_activate() {
    let mut system = system_with(4);
    let shape = ShapeSettings::sphere(1.0).create().unwrap();
    let id = system
        .create_and_add_body(
            &BodyCreationSettings::new(shape, RVec3::ZERO, Quat::IDENTITY, MotionType::Static, MOVING),
            Activation::Activate,
        )
        .unwrap();
    assert!(!system.is_active(id));
    assert!(!system.activate_body(id));
}

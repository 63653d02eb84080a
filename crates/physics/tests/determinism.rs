use glam::{Quat, Vec3};
use jobs::{JobSystem, SingleThreaded};
use physics::{
    Activation, BodyCreationSettings, MotionType, PhysicsLimits, PhysicsSettings, PhysicsSystem, RVec3, Real, ShapeSettings,
    MOVING, NON_MOVING,
};

/// A pile of mixed shapes dropped into a walled box.
fn build_scene() -> PhysicsSystem {
    let mut system = PhysicsSystem::with_default_layers(PhysicsSettings::default(), PhysicsLimits::default());
    let floor = ShapeSettings::box_shape(Vec3::new(10.0, 0.5, 10.0)).create().unwrap();
    system
        .create_and_add_body(
            &BodyCreationSettings::new(floor, RVec3::new(0.0, -0.5, 0.0), Quat::IDENTITY, MotionType::Static, NON_MOVING),
            Activation::DontActivate,
        )
        .unwrap();

    let shapes = [
        ShapeSettings::sphere(0.4).create().unwrap(),
        ShapeSettings::box_shape(Vec3::splat(0.35)).create().unwrap(),
        ShapeSettings::capsule(0.3, 0.25).create().unwrap(),
        ShapeSettings::cylinder(0.3, 0.3).create().unwrap(),
    ];
    for i in 0..24_u32 {
        let x = (i % 4) as Real * 0.9 - 1.35;
        let z = ((i / 4) % 2) as Real * 0.9 - 0.45;
        let y = 1.0 + (i / 8) as Real * 1.1;
        let rotation = Quat::from_rotation_y(i as f32 * 0.3) * Quat::from_rotation_x(i as f32 * 0.17);
        let settings = BodyCreationSettings::new(
            shapes[i as usize % shapes.len()].clone(),
            RVec3::new(x, y, z),
            rotation,
            MotionType::Dynamic,
            MOVING,
        )
        .with_angular_velocity(Vec3::new(0.0, 0.5, 0.0));
        system.create_and_add_body(&settings, Activation::Activate).unwrap();
    }
    system
}

fn run(jobs: &dyn JobSystem, steps: usize) -> Vec<(RVec3, Quat, Vec3)> {
    let mut system = build_scene();
    for _ in 0..steps {
        system.update(1.0 / 60.0, 1, 1, jobs);
    }
    system
        .body_ids()
        .into_iter()
        .map(|id| {
            (
                system.position(id).unwrap(),
                system.rotation(id).unwrap(),
                system.linear_velocity(id).unwrap(),
            )
        })
        .collect()
}

#[test]
fn identical_runs_match_bit_for_bit() {
    let jobs = SingleThreaded::new();
    assert_eq!(run(&jobs, 120), run(&jobs, 120));
}

#[test]
fn thread_count_does_not_change_results() {
    let single = SingleThreaded::new();
    let pool = jobs::ThreadPool::new(4).unwrap();
    assert_eq!(run(&single, 120), run(&pool, 120));
}

#[test]
fn pile_stays_above_floor() {
    let jobs = SingleThreaded::new();
    for (position, _, _) in run(&jobs, 240).into_iter().skip(1) {
        assert!(position.y > 0.0, "body sank to {position:?}");
    }
}

//! Sequential impulse contact constraints with warm starting.

use std::collections::BTreeMap;

use glam::Vec3;

use super::{pair_mut, SolverBody};
use crate::collision::ContactManifold;
use crate::listener::{ContactSettings, SubShapeIdPair};
use crate::settings::PhysicsSettings;
use crate::types::{to_f32, to_real};

/// Cached points match new ones when they are closer than this in body 1's
/// frame.
const WARM_START_MATCH_DISTANCE_SQ: f32 = 0.02 * 0.02;

/// Accumulated impulses of one point, kept between steps.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct CachedPoint {
    /// Contact point on body 1 relative to its center of mass, body space.
    pub local_on_1: Vec3,
    pub normal_lambda: f32,
    pub tangent_lambda: [f32; 2],
}

/// Manifold state kept from one step to the next.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct CachedManifold {
    pub points: Vec<CachedPoint>,
}

pub(crate) type ManifoldCache = BTreeMap<SubShapeIdPair, CachedManifold>;

#[derive(Clone, Copy, Debug)]
struct PointConstraint {
    local_on_1: Vec3,
    local_on_2: Vec3,
    r1: Vec3,
    r2: Vec3,
    normal_mass: f32,
    tangent_mass: [f32; 2],
    /// Lower bound for the normal relative velocity.
    target_velocity: f32,
    /// Restitution target; speculative targets are refreshed every sub-step
    /// instead.
    bounce: Option<f32>,
    normal_lambda: f32,
    tangent_lambda: [f32; 2],
}

#[derive(Clone, Debug)]
pub(crate) struct ContactConstraint {
    pub key: SubShapeIdPair,
    pub body1: usize,
    pub body2: usize,
    normal: Vec3,
    tangents: [Vec3; 2],
    friction: f32,
    points: Vec<PointConstraint>,
}

impl ContactConstraint {
    /// Builds the constraint of `manifold` between solver bodies `body1` and
    /// `body2`, reusing impulses from `cached` for matching points.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        key: SubShapeIdPair,
        manifold: &ContactManifold,
        (body1, body2): (usize, usize),
        bodies: &[SolverBody],
        contact: &ContactSettings,
        cached: Option<&CachedManifold>,
        settings: &PhysicsSettings,
        delta_time: f32,
    ) -> Self {
        let b1 = &bodies[body1];
        let b2 = &bodies[body2];
        let normal = manifold.world_space_normal;
        let t1 = normal.any_orthonormal_vector();
        let tangents = [t1, normal.cross(t1)];
        let inv_rot1 = b1.rotation.inverse();
        let inv_rot2 = b2.rotation.inverse();

        let points = (0..manifold.num_points())
            .map(|i| {
                let p1 = manifold.world_point_on_1(i);
                let p2 = manifold.world_point_on_2(i);
                let r1 = b1.offset_of(p1);
                let r2 = b2.offset_of(p2);
                let local_on_1 = inv_rot1 * r1;
                let separation = -to_f32(p1 - p2).dot(normal);

                let approach = (b2.velocity_at(r2) - b1.velocity_at(r1)).dot(normal);
                let bounce = (contact.combined_restitution > 0.0 && approach < -settings.min_velocity_for_restitution)
                    .then(|| -contact.combined_restitution * approach);
                let target_velocity = bounce.unwrap_or_else(|| speculative_target(separation, delta_time));

                let warm = cached
                    .filter(|_| settings.constraint_warm_start)
                    .and_then(|c| {
                        c.points
                            .iter()
                            .find(|p| p.local_on_1.distance_squared(local_on_1) < WARM_START_MATCH_DISTANCE_SQ)
                    });

                PointConstraint {
                    local_on_1,
                    local_on_2: inv_rot2 * r2,
                    r1,
                    r2,
                    normal_mass: SolverBody::effective_mass(b1, r1, b2, r2, normal),
                    tangent_mass: tangents.map(|t| SolverBody::effective_mass(b1, r1, b2, r2, t)),
                    target_velocity,
                    bounce,
                    normal_lambda: warm.map_or(0.0, |w| w.normal_lambda),
                    tangent_lambda: warm.map_or([0.0; 2], |w| w.tangent_lambda),
                }
            })
            .collect();

        Self {
            key,
            body1,
            body2,
            normal,
            tangents,
            friction: contact.combined_friction,
            points,
        }
    }

    pub fn cache_entry(&self) -> CachedManifold {
        CachedManifold {
            points: self
                .points
                .iter()
                .map(|p| CachedPoint {
                    local_on_1: p.local_on_1,
                    normal_lambda: p.normal_lambda,
                    tangent_lambda: p.tangent_lambda,
                })
                .collect(),
        }
    }

    /// Total normal impulse applied in the last solve.
    pub fn normal_impulse(&self) -> f32 {
        self.points.iter().map(|p| p.normal_lambda).sum()
    }
}

/// Speculative contacts may close the gap within one step, touching ones
/// may not approach at all.
fn speculative_target(separation: f32, delta_time: f32) -> f32 {
    if separation > 0.0 {
        -separation / delta_time
    } else {
        0.0
    }
}

/// Recomputes the speculative targets from the current body poses, so a gap
/// closed by an earlier sub-step is not closed again.
pub(crate) fn update_targets(constraints: &mut [ContactConstraint], bodies: &[SolverBody], delta_time: f32) {
    for c in constraints {
        let (b1, b2) = (&bodies[c.body1], &bodies[c.body2]);
        for p in c.points.iter_mut().filter(|p| p.bounce.is_none()) {
            let world1 = b1.com + to_real(b1.rotation * p.local_on_1);
            let world2 = b2.com + to_real(b2.rotation * p.local_on_2);
            let separation = -to_f32(world1 - world2).dot(c.normal);
            p.target_velocity = speculative_target(separation, delta_time);
        }
    }
}

/// Re-applies the impulses carried over from the previous step.
pub(crate) fn warm_start(constraints: &[ContactConstraint], bodies: &mut [SolverBody]) {
    for c in constraints {
        let (b1, b2) = pair_mut(bodies, c.body1, c.body2);
        for p in &c.points {
            let impulse =
                c.normal * p.normal_lambda + c.tangents[0] * p.tangent_lambda[0] + c.tangents[1] * p.tangent_lambda[1];
            b1.apply_impulse(-impulse, p.r1);
            b2.apply_impulse(impulse, p.r2);
        }
    }
}

/// One velocity iteration over all contacts: friction first, then the
/// non-penetration rows.
pub(crate) fn solve_velocity(constraints: &mut [ContactConstraint], bodies: &mut [SolverBody]) {
    for c in constraints {
        let (b1, b2) = pair_mut(bodies, c.body1, c.body2);
        for p in &mut c.points {
            let max_friction = c.friction * p.normal_lambda;
            for (axis, tangent) in c.tangents.iter().enumerate() {
                let relative = (b2.velocity_at(p.r2) - b1.velocity_at(p.r1)).dot(*tangent);
                let previous = p.tangent_lambda[axis];
                let lambda = (previous - relative * p.tangent_mass[axis]).clamp(-max_friction, max_friction);
                let delta = lambda - previous;
                p.tangent_lambda[axis] = lambda;
                b1.apply_impulse(-*tangent * delta, p.r1);
                b2.apply_impulse(*tangent * delta, p.r2);
            }

            let relative = (b2.velocity_at(p.r2) - b1.velocity_at(p.r1)).dot(c.normal);
            let previous = p.normal_lambda;
            let lambda = (previous + (p.target_velocity - relative) * p.normal_mass).max(0.0);
            let delta = lambda - previous;
            p.normal_lambda = lambda;
            b1.apply_impulse(-c.normal * delta, p.r1);
            b2.apply_impulse(c.normal * delta, p.r2);
        }
    }
}

/// One position iteration: pushes penetrating points apart along the
/// contact normal (Baumgarte stabilisation).
pub(crate) fn solve_position(constraints: &[ContactConstraint], bodies: &mut [SolverBody], settings: &PhysicsSettings) {
    for c in constraints {
        let (b1, b2) = pair_mut(bodies, c.body1, c.body2);
        for p in &c.points {
            let r1 = b1.rotation * p.local_on_1;
            let r2 = b2.rotation * p.local_on_2;
            let world1 = b1.com + to_real(r1);
            let world2 = b2.com + to_real(r2);
            let penetration = to_f32(world1 - world2).dot(c.normal);
            let correction = (settings.baumgarte * (penetration - settings.penetration_slop))
                .min(settings.max_penetration_correction);
            if correction <= 0.0 {
                continue;
            }
            let lambda = correction * SolverBody::effective_mass(b1, r1, b2, r2, c.normal);
            b1.apply_position_impulse(-c.normal * lambda, r1);
            b2.apply_position_impulse(c.normal * lambda, r2);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{BodyCreationSettings, BodyId, BodyManager};
    use crate::collision::ContactPoints;
    use crate::shapes::{ShapeSettings, SubShapeId};
    use crate::types::{BroadPhaseLayer, MotionType, RVec3};
    use glam::Quat;

    struct Scene {
        bodies: Vec<SolverBody>,
        manifold: ContactManifold,
        key: SubShapeIdPair,
    }

    /// Unit sphere resting 0.05 deep on a static floor box, falling at 2 m/s.
    fn scene() -> Scene {
        let mut manager = BodyManager::new(4);
        let floor = ShapeSettings::box_shape(glam::Vec3::new(5.0, 0.5, 5.0)).create().unwrap();
        let ball = ShapeSettings::sphere(1.0).create().unwrap();
        let a = manager
            .create_body(
                &BodyCreationSettings::new(floor, RVec3::new(0.0, -0.5, 0.0), Quat::IDENTITY, MotionType::Static, 0),
                BroadPhaseLayer(0),
            )
            .unwrap();
        let b = manager
            .create_body(
                &BodyCreationSettings::new(ball, RVec3::new(0.0, 0.95, 0.0), Quat::IDENTITY, MotionType::Dynamic, 1)
                    .with_linear_velocity(Vec3::new(0.0, -2.0, 0.0)),
                BroadPhaseLayer(1),
            )
            .unwrap();
        let bodies = vec![
            SolverBody::from_body(&manager.lock_read(a).unwrap()),
            SolverBody::from_body(&manager.lock_read(b).unwrap()),
        ];
        let mut points_on_1 = ContactPoints::new();
        let mut points_on_2 = ContactPoints::new();
        points_on_1.push(Vec3::new(0.0, 0.5, 0.0));
        points_on_2.push(Vec3::new(0.0, 0.45, 0.0));
        let manifold = ContactManifold {
            body1: a,
            body2: b,
            sub_shape_id1: SubShapeId::EMPTY,
            sub_shape_id2: SubShapeId::EMPTY,
            base_offset: RVec3::new(0.0, -0.5, 0.0),
            world_space_normal: Vec3::Y,
            penetration_depth: 0.05,
            points_on_1,
            points_on_2,
        };
        let key = SubShapeIdPair {
            body1: a,
            sub_shape1: SubShapeId::EMPTY,
            body2: b,
            sub_shape2: SubShapeId::EMPTY,
        };
        Scene { bodies, manifold, key }
    }

    fn contact(restitution: f32) -> ContactSettings {
        ContactSettings {
            combined_friction: 0.5,
            combined_restitution: restitution,
            is_sensor: false,
        }
    }

    #[test]
    fn stops_approach_and_corrects_position() {
        let Scene { mut bodies, manifold, key } = scene();
        let settings = PhysicsSettings::default();
        let mut constraints =
            vec![ContactConstraint::new(key, &manifold, (0, 1), &bodies, &contact(0.0), None, &settings, 1.0 / 60.0)];
        for _ in 0..settings.num_velocity_steps {
            solve_velocity(&mut constraints, &mut bodies);
        }
        assert!(bodies[1].linear_velocity.y.abs() < 1e-4);
        assert_eq!(bodies[0].linear_velocity, Vec3::ZERO);
        assert!(constraints[0].normal_impulse() > 0.0);

        let before = bodies[1].com.y;
        solve_position(&constraints, &mut bodies, &settings);
        assert!(bodies[1].com.y > before);
    }

    #[test]
    fn restitution_bounces() {
        let Scene { mut bodies, manifold, key } = scene();
        let settings = PhysicsSettings::default();
        let mut constraints =
            vec![ContactConstraint::new(key, &manifold, (0, 1), &bodies, &contact(1.0), None, &settings, 1.0 / 60.0)];
        for _ in 0..settings.num_velocity_steps {
            solve_velocity(&mut constraints, &mut bodies);
        }
        assert!((bodies[1].linear_velocity.y - 2.0).abs() < 1e-3);
    }

    #[test]
    fn warm_start_reuses_matching_points() {
        let Scene { mut bodies, manifold, key } = scene();
        let settings = PhysicsSettings::default();
        let first = ContactConstraint::new(key, &manifold, (0, 1), &bodies, &contact(0.0), None, &settings, 1.0 / 60.0);
        let mut cached = first.cache_entry();
        cached.points[0].normal_lambda = 3.0;
        let second =
            ContactConstraint::new(key, &manifold, (0, 1), &bodies, &contact(0.0), Some(&cached), &settings, 1.0 / 60.0);
        assert_eq!(second.normal_impulse(), 3.0);
        let v = bodies[1].linear_velocity.y;
        warm_start(&[second], &mut bodies);
        assert!(bodies[1].linear_velocity.y > v);
        assert_eq!(bodies[1].id(), manifold.body2);
        assert_ne!(bodies[0].id(), BodyId::INVALID);
    }

    #[test]
    fn closed_gap_stops_the_approach() {
        let Scene { mut bodies, mut manifold, key } = scene();
        let settings = PhysicsSettings::default();
        // ball hovering 0.01 above the floor
        manifold.points_on_2.clear();
        manifold.points_on_2.push(Vec3::new(0.0, 0.51, 0.0));
        bodies[1].com.y += 0.06;
        let dt = 1.0 / 240.0;
        let mut constraints =
            vec![ContactConstraint::new(key, &manifold, (0, 1), &bodies, &contact(0.0), None, &settings, dt)];
        update_targets(&mut constraints, &bodies, dt);
        for _ in 0..settings.num_velocity_steps {
            solve_velocity(&mut constraints, &mut bodies);
        }
        // 2 m/s is slower than the 2.4 m/s that closes the gap
        assert!((bodies[1].linear_velocity.y + 2.0).abs() < 1e-4);

        // an earlier sub-step moved the ball onto the floor
        bodies[1].com.y -= 0.01;
        update_targets(&mut constraints, &bodies, dt);
        for _ in 0..settings.num_velocity_steps {
            solve_velocity(&mut constraints, &mut bodies);
        }
        assert!(bodies[1].linear_velocity.y.abs() < 1e-3, "v={}", bodies[1].linear_velocity.y);
    }
}

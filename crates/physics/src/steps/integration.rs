//! Force application and position integration of solver bodies.

use glam::Vec3;

use super::SolverBody;
use crate::body::Body;
use crate::types::{to_real, MotionQuality, MotionType};

/// Standard gravity, applied along -Y.
pub const DEFAULT_GRAVITY: Vec3 = Vec3::new(0.0, -9.81, 0.0);

/// Per body inputs of the integration stage that the solver itself never
/// touches.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct MotionState {
    gravity_factor: f32,
    force: Vec3,
    torque: Vec3,
    linear_damping: f32,
    angular_damping: f32,
    max_linear_velocity: f32,
    max_angular_velocity: f32,
    linear_cast: bool,
    inner_radius: f32,
}

impl MotionState {
    pub fn from_body(body: &Body) -> Self {
        match body.moving() {
            Some(m) => Self {
                gravity_factor: m.gravity_factor,
                force: m.force,
                torque: m.torque,
                linear_damping: m.linear_damping,
                angular_damping: m.angular_damping,
                max_linear_velocity: m.max_linear_velocity,
                max_angular_velocity: m.max_angular_velocity,
                linear_cast: m.motion_quality == MotionQuality::LinearCast,
                inner_radius: body.shape().inner_radius(),
            },
            None => Self {
                gravity_factor: 0.0,
                force: Vec3::ZERO,
                torque: Vec3::ZERO,
                linear_damping: 0.0,
                angular_damping: 0.0,
                max_linear_velocity: 0.0,
                max_angular_velocity: 0.0,
                linear_cast: false,
                inner_radius: 0.0,
            },
        }
    }
}

/// Adds gravity and accumulated forces to a dynamic body's velocity, then
/// damps and clamps it.
pub(crate) fn apply_forces(body: &mut SolverBody, motion: &MotionState, gravity: Vec3, dt: f32) {
    if body.motion_type != MotionType::Dynamic {
        return;
    }
    body.linear_velocity += (gravity * motion.gravity_factor + motion.force * body.inv_mass) * dt;
    body.angular_velocity += body.inv_inertia * motion.torque * dt;

    body.linear_velocity *= (1.0 - motion.linear_damping * dt).max(0.0);
    body.angular_velocity *= (1.0 - motion.angular_damping * dt).max(0.0);
    body.linear_velocity = body.linear_velocity.clamp_length_max(motion.max_linear_velocity);
    body.angular_velocity = body.angular_velocity.clamp_length_max(motion.max_angular_velocity);
}

/// Moves a body by its velocity over `dt`.
///
/// `LinearCast` bodies that would travel further than `cast_threshold` times
/// their inner radius first sweep their center of mass along the
/// displacement with `cast`, which returns the hit fraction of the first
/// obstacle. Travel is then cut so the inner sphere stops at the obstacle.
pub(crate) fn integrate(
    body: &mut SolverBody,
    motion: &MotionState,
    dt: f32,
    cast_threshold: f32,
    cast: &mut dyn FnMut(&SolverBody, Vec3) -> Option<f32>,
) {
    if body.motion_type == MotionType::Static {
        return;
    }
    let displacement = body.linear_velocity * dt;
    let distance = displacement.length();
    if motion.linear_cast && motion.inner_radius > 0.0 && distance > cast_threshold * motion.inner_radius {
        if let Some(fraction) = cast(body, displacement) {
            let allowed = (fraction * distance - motion.inner_radius).clamp(0.0, distance);
            if allowed < distance {
                let com = body.com;
                body.integrate(dt);
                body.com = com + to_real(displacement * (allowed / distance));
                return;
            }
        }
    }
    body.integrate(dt);
}

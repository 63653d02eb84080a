use glam::{Mat3, Quat, Vec3};

use super::{invert_or_zero, local_anchor, point_effective_mass, Constraint};
use crate::body::{Body, BodyId};
use crate::steps::SolverBody;
use crate::types::to_f32;

/// Welds two bodies together in their pose at creation time.
#[derive(Clone, Debug)]
pub struct FixedConstraint {
    body1: BodyId,
    body2: BodyId,
    local1: Vec3,
    local2: Vec3,
    /// Rotation of body 2 relative to body 1 that is maintained.
    relative_rotation: Quat,
    r1: Vec3,
    r2: Vec3,
    point_mass: Mat3,
    angular_mass: Mat3,
    point_lambda: Vec3,
    angular_lambda: Vec3,
    pub enabled: bool,
}

impl FixedConstraint {
    /// The anchor sits halfway between the two centers of mass.
    #[must_use]
    pub fn new(body1: &Body, body2: &Body) -> Self {
        let anchor = (body1.center_of_mass_position() + body2.center_of_mass_position()) / 2.0;
        Self {
            body1: body1.id(),
            body2: body2.id(),
            local1: local_anchor(body1, anchor),
            local2: local_anchor(body2, anchor),
            relative_rotation: body1.rotation().inverse() * body2.rotation(),
            r1: Vec3::ZERO,
            r2: Vec3::ZERO,
            point_mass: Mat3::ZERO,
            angular_mass: Mat3::ZERO,
            point_lambda: Vec3::ZERO,
            angular_lambda: Vec3::ZERO,
            enabled: true,
        }
    }

    fn refresh(&mut self, body1: &SolverBody, body2: &SolverBody) {
        self.r1 = body1.rotation() * self.local1;
        self.r2 = body2.rotation() * self.local2;
        self.point_mass = point_effective_mass(body1, self.r1, body2, self.r2);
        self.angular_mass = invert_or_zero(body1.inverse_inertia() + body2.inverse_inertia());
    }

    /// Small rotation that takes body 2 from its target orientation to its
    /// current one.
    fn rotation_error(&self, body1: &SolverBody, body2: &SolverBody) -> Vec3 {
        let target = body1.rotation() * self.relative_rotation;
        let diff = body2.rotation() * target.inverse();
        let diff = if diff.w < 0.0 { -diff } else { diff };
        2.0 * diff.xyz()
    }

    fn apply(&self, body1: &mut SolverBody, body2: &mut SolverBody, point: Vec3, angular: Vec3) {
        body1.apply_impulse(-point, self.r1);
        body2.apply_impulse(point, self.r2);
        body1.apply_angular_impulse(-angular);
        body2.apply_angular_impulse(angular);
    }
}

impl Constraint for FixedConstraint {
    fn bodies(&self) -> (BodyId, BodyId) {
        (self.body1, self.body2)
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn setup(&mut self, body1: &SolverBody, body2: &SolverBody, _delta_time: f32) {
        self.refresh(body1, body2);
    }

    fn warm_start(&mut self, body1: &mut SolverBody, body2: &mut SolverBody) {
        self.apply(body1, body2, self.point_lambda, self.angular_lambda);
    }

    fn solve_velocity(&mut self, body1: &mut SolverBody, body2: &mut SolverBody) {
        let spin = body2.angular_velocity() - body1.angular_velocity();
        let angular = -(self.angular_mass * spin);
        self.angular_lambda += angular;
        self.apply(body1, body2, Vec3::ZERO, angular);

        let relative = body2.velocity_at(self.r2) - body1.velocity_at(self.r1);
        let point = -(self.point_mass * relative);
        self.point_lambda += point;
        self.apply(body1, body2, point, Vec3::ZERO);
    }

    fn solve_position(&mut self, body1: &mut SolverBody, body2: &mut SolverBody, baumgarte: f32) {
        self.refresh(body1, body2);
        let angle = self.rotation_error(body1, body2);
        if angle.length_squared() > 1.0e-12 {
            let lambda = -(self.angular_mass * angle) * baumgarte;
            body1.apply_angular_position_impulse(-lambda);
            body2.apply_angular_position_impulse(lambda);
            self.refresh(body1, body2);
        }

        let error = to_f32(body2.world_point(self.local2) - body1.world_point(self.local1));
        if error.length_squared() > 1.0e-12 {
            let lambda = -(self.point_mass * error) * baumgarte;
            body1.apply_position_impulse(-lambda, self.r1);
            body2.apply_position_impulse(lambda, self.r2);
        }
    }
}

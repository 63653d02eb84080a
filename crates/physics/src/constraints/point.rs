use glam::{Mat3, Vec3};

use super::{local_anchor, point_effective_mass, Constraint};
use crate::body::{Body, BodyId};
use crate::steps::SolverBody;
use crate::types::{to_f32, RVec3};

/// Ball joint: keeps one point of each body at the same world position while
/// both rotate freely around it.
#[derive(Clone, Debug)]
pub struct PointConstraint {
    body1: BodyId,
    body2: BodyId,
    local1: Vec3,
    local2: Vec3,
    r1: Vec3,
    r2: Vec3,
    effective_mass: Mat3,
    total_lambda: Vec3,
    pub enabled: bool,
}

impl PointConstraint {
    /// Joins `body1` and `body2` at the world point `anchor`.
    #[must_use]
    pub fn new(body1: &Body, body2: &Body, anchor: RVec3) -> Self {
        Self::with_anchors(body1, anchor, body2, anchor)
    }

    /// Joins `anchor1` on `body1` to `anchor2` on `body2`; the system pulls
    /// the two points together.
    #[must_use]
    pub fn with_anchors(body1: &Body, anchor1: RVec3, body2: &Body, anchor2: RVec3) -> Self {
        Self {
            body1: body1.id(),
            body2: body2.id(),
            local1: local_anchor(body1, anchor1),
            local2: local_anchor(body2, anchor2),
            r1: Vec3::ZERO,
            r2: Vec3::ZERO,
            effective_mass: Mat3::ZERO,
            total_lambda: Vec3::ZERO,
            enabled: true,
        }
    }

    /// Impulse applied to body 2 in the last step.
    #[must_use]
    pub fn total_lambda(&self) -> Vec3 {
        self.total_lambda
    }

    fn refresh(&mut self, body1: &SolverBody, body2: &SolverBody) {
        self.r1 = body1.rotation() * self.local1;
        self.r2 = body2.rotation() * self.local2;
        self.effective_mass = point_effective_mass(body1, self.r1, body2, self.r2);
    }

    fn apply(&self, body1: &mut SolverBody, body2: &mut SolverBody, impulse: Vec3) {
        body1.apply_impulse(-impulse, self.r1);
        body2.apply_impulse(impulse, self.r2);
    }
}

impl Constraint for PointConstraint {
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
        self.apply(body1, body2, self.total_lambda);
    }

    fn solve_velocity(&mut self, body1: &mut SolverBody, body2: &mut SolverBody) {
        let relative = body2.velocity_at(self.r2) - body1.velocity_at(self.r1);
        let lambda = -(self.effective_mass * relative);
        self.total_lambda += lambda;
        self.apply(body1, body2, lambda);
    }

    fn solve_position(&mut self, body1: &mut SolverBody, body2: &mut SolverBody, baumgarte: f32) {
        self.refresh(body1, body2);
        let error = to_f32(body2.world_point(self.local2) - body1.world_point(self.local1));
        if error.length_squared() < 1.0e-12 {
            return;
        }
        let lambda = -(self.effective_mass * error) * baumgarte;
        body1.apply_position_impulse(-lambda, self.r1);
        body2.apply_position_impulse(lambda, self.r2);
    }
}

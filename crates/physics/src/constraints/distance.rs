use glam::Vec3;

use super::{local_anchor, Constraint};
use crate::body::{Body, BodyId};
use crate::error::PhysicsError;
use crate::steps::SolverBody;
use crate::types::{to_f32, RVec3};

/// Keeps the distance between two anchor points within `[min, max]`. Equal
/// bounds make a rigid rod, a zero minimum a rope.
#[derive(Clone, Debug)]
pub struct DistanceConstraint {
    body1: BodyId,
    body2: BodyId,
    local1: Vec3,
    local2: Vec3,
    min_distance: f32,
    max_distance: f32,
    r1: Vec3,
    r2: Vec3,
    axis: Vec3,
    length: f32,
    effective_mass: f32,
    total_lambda: f32,
    pub enabled: bool,
}

impl DistanceConstraint {
    /// # Errors
    /// [`PhysicsError::InvalidConstraint`] when the range is negative, empty
    /// or not finite.
    pub fn new(
        body1: &Body,
        body2: &Body,
        anchor1: RVec3,
        anchor2: RVec3,
        min_distance: f32,
        max_distance: f32,
    ) -> Result<Self, PhysicsError> {
        if !min_distance.is_finite() || !max_distance.is_finite() {
            return Err(PhysicsError::InvalidConstraint("distance limits must be finite"));
        }
        if min_distance < 0.0 || min_distance > max_distance {
            return Err(PhysicsError::InvalidConstraint("distance limits must satisfy 0 <= min <= max"));
        }
        Ok(Self {
            body1: body1.id(),
            body2: body2.id(),
            local1: local_anchor(body1, anchor1),
            local2: local_anchor(body2, anchor2),
            min_distance,
            max_distance,
            r1: Vec3::ZERO,
            r2: Vec3::ZERO,
            axis: Vec3::Y,
            length: 0.0,
            effective_mass: 0.0,
            total_lambda: 0.0,
            enabled: true,
        })
    }

    /// Rod that keeps the current distance between the anchors.
    ///
    /// # Errors
    /// See [`DistanceConstraint::new`].
    pub fn rigid(body1: &Body, body2: &Body, anchor1: RVec3, anchor2: RVec3) -> Result<Self, PhysicsError> {
        let length = to_f32(anchor2 - anchor1).length();
        Self::new(body1, body2, anchor1, anchor2, length, length)
    }

    #[must_use]
    pub fn limits(&self) -> (f32, f32) {
        (self.min_distance, self.max_distance)
    }

    fn refresh(&mut self, body1: &SolverBody, body2: &SolverBody) {
        self.r1 = body1.rotation() * self.local1;
        self.r2 = body2.rotation() * self.local2;
        let delta = to_f32(body2.world_point(self.local2) - body1.world_point(self.local1));
        self.length = delta.length();
        if self.length > 1.0e-6 {
            self.axis = delta / self.length;
        }
        self.effective_mass = SolverBody::effective_mass(body1, self.r1, body2, self.r2, self.axis);
    }

    /// Allowed range of the accumulated impulse on body 2 along the axis.
    fn impulse_bounds(&self) -> Option<(f32, f32)> {
        let at_min = self.length <= self.min_distance;
        let at_max = self.length >= self.max_distance;
        match (at_min, at_max) {
            (false, false) => None,
            (true, true) => Some((f32::NEG_INFINITY, f32::INFINITY)),
            (true, false) => Some((0.0, f32::INFINITY)),
            (false, true) => Some((f32::NEG_INFINITY, 0.0)),
        }
    }

    fn apply(&self, body1: &mut SolverBody, body2: &mut SolverBody, lambda: f32) {
        body1.apply_impulse(-self.axis * lambda, self.r1);
        body2.apply_impulse(self.axis * lambda, self.r2);
    }
}

impl Constraint for DistanceConstraint {
    fn bodies(&self) -> (BodyId, BodyId) {
        (self.body1, self.body2)
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn setup(&mut self, body1: &SolverBody, body2: &SolverBody, _delta_time: f32) {
        self.refresh(body1, body2);
        if self.impulse_bounds().is_none() {
            self.total_lambda = 0.0;
        }
    }

    fn warm_start(&mut self, body1: &mut SolverBody, body2: &mut SolverBody) {
        self.apply(body1, body2, self.total_lambda);
    }

    fn solve_velocity(&mut self, body1: &mut SolverBody, body2: &mut SolverBody) {
        let Some((low, high)) = self.impulse_bounds() else {
            return;
        };
        let relative = (body2.velocity_at(self.r2) - body1.velocity_at(self.r1)).dot(self.axis);
        let previous = self.total_lambda;
        self.total_lambda = (previous - relative * self.effective_mass).clamp(low, high);
        self.apply(body1, body2, self.total_lambda - previous);
    }

    fn solve_position(&mut self, body1: &mut SolverBody, body2: &mut SolverBody, baumgarte: f32) {
        self.refresh(body1, body2);
        let error = self.length - self.length.clamp(self.min_distance, self.max_distance);
        if error == 0.0 {
            return;
        }
        let lambda = -error * self.effective_mass * baumgarte;
        body1.apply_position_impulse(-self.axis * lambda, self.r1);
        body2.apply_position_impulse(self.axis * lambda, self.r2);
    }
}

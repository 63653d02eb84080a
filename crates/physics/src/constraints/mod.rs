//! # Constraints
//!
//! Caller owned joints between two bodies, solved alongside contacts. A
//! constraint is shared with the system through a [`ConstraintRef`]; the
//! caller may keep its own clone to tweak or disable it between steps.
//!
//! Anchors are stored in the center of mass frame of each body, so a body
//! changing its shape after the constraint was made shifts the anchor.

mod distance;
mod fixed;
mod point;

use std::fmt;
use std::sync::Arc;

use glam::{Mat3, Vec3};
use parking_lot::Mutex;

pub use distance::DistanceConstraint;
pub use fixed::FixedConstraint;
pub use point::PointConstraint;

use crate::body::{Body, BodyId};
use crate::steps::SolverBody;
use crate::types::{to_f32, RVec3};

/// A velocity level constraint between two bodies.
///
/// Every step the system calls [`Constraint::setup`] once per integration
/// sub-step, then [`Constraint::warm_start`], the velocity iterations, and
/// after integrating positions the position iterations. The two solver
/// bodies are passed in the order of [`Constraint::bodies`].
pub trait Constraint: Send + fmt::Debug {
    fn bodies(&self) -> (BodyId, BodyId);

    /// Disabled constraints are skipped and do not link sleep islands.
    fn is_enabled(&self) -> bool {
        true
    }

    fn setup(&mut self, body1: &SolverBody, body2: &SolverBody, delta_time: f32);

    /// Applies the impulse accumulated in the previous step.
    fn warm_start(&mut self, body1: &mut SolverBody, body2: &mut SolverBody);

    fn solve_velocity(&mut self, body1: &mut SolverBody, body2: &mut SolverBody);

    /// Moves the bodies to reduce the position error by `baumgarte` times
    /// its size.
    fn solve_position(&mut self, body1: &mut SolverBody, body2: &mut SolverBody, baumgarte: f32);
}

pub type ConstraintRef = Arc<Mutex<dyn Constraint>>;

/// Wraps a constraint for [`crate::PhysicsSystem::add_constraint`].
pub fn constraint_ref<C: Constraint + 'static>(constraint: C) -> ConstraintRef {
    Arc::new(Mutex::new(constraint))
}

/// Offset of `world` from the center of mass of `body` in its rotated frame.
fn local_anchor(body: &Body, world: RVec3) -> Vec3 {
    body.rotation().inverse() * to_f32(world - body.center_of_mass_position())
}

/// Matrix form of `v.cross(_)`.
fn skew(v: Vec3) -> Mat3 {
    Mat3::from_cols(Vec3::new(0.0, v.z, -v.y), Vec3::new(-v.z, 0.0, v.x), Vec3::new(v.y, -v.x, 0.0))
}

fn invert_or_zero(m: Mat3) -> Mat3 {
    if m.determinant().abs() > 1.0e-12 {
        m.inverse()
    } else {
        Mat3::ZERO
    }
}

/// Inverse of the 3x3 effective mass of a point to point impulse at offsets
/// `r1` and `r2`.
fn point_effective_mass(body1: &SolverBody, r1: Vec3, body2: &SolverBody, r2: Vec3) -> Mat3 {
    let s1 = skew(r1);
    let s2 = skew(r2);
    let k = Mat3::from_diagonal(Vec3::splat(body1.inverse_mass() + body2.inverse_mass()))
        + s1 * body1.inverse_inertia() * s1.transpose()
        + s2 * body2.inverse_inertia() * s2.transpose();
    invert_or_zero(k)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skew_matches_cross() {
        let a = Vec3::new(1.0, -2.0, 3.0);
        let b = Vec3::new(0.5, 4.0, -1.0);
        assert!((skew(a) * b - a.cross(b)).length() < 1e-6);
        assert_eq!(invert_or_zero(Mat3::ZERO), Mat3::ZERO);
    }
}

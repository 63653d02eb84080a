//! Per step stages of the pipeline: contact constraints, integration and
//! sleeping. They work on [`SolverBody`] copies of the bodies taking part in
//! a step, which are written back once the step's solve is done.

pub(crate) mod contact;
pub(crate) mod integration;
pub(crate) mod sleep;

use glam::{Mat3, Quat, Vec3};

use crate::body::{Body, BodyId};
use crate::types::{to_f32, to_real, MotionType, RVec3};

/// Solver view of a body: center of mass state plus inverse mass.
///
/// Static and kinematic bodies have zero inverse mass and ignore impulses,
/// which makes them behave as infinitely heavy anchors.
#[derive(Clone, Debug, PartialEq)]
pub struct SolverBody {
    pub(crate) id: BodyId,
    pub(crate) motion_type: MotionType,
    pub(crate) com: RVec3,
    pub(crate) rotation: Quat,
    pub(crate) linear_velocity: Vec3,
    pub(crate) angular_velocity: Vec3,
    pub(crate) inv_mass: f32,
    inv_inertia_local: Mat3,
    pub(crate) inv_inertia: Mat3,
}

impl SolverBody {
    pub(crate) fn from_body(body: &Body) -> Self {
        let (inv_mass, inv_inertia_local) = match (body.moving(), body.motion_type()) {
            (Some(m), MotionType::Dynamic) => (m.inverse_mass(), m.inverse_inertia()),
            _ => (0.0, Mat3::ZERO),
        };
        let mut solver = Self {
            id: body.id(),
            motion_type: body.motion_type(),
            com: body.center_of_mass_position(),
            rotation: body.rotation(),
            linear_velocity: body.linear_velocity(),
            angular_velocity: body.angular_velocity(),
            inv_mass,
            inv_inertia_local,
            inv_inertia: Mat3::ZERO,
        };
        solver.refresh_inertia();
        solver
    }

    /// Turns the body into an immovable anchor for this step, for bodies
    /// outside the active set that a contact or constraint references.
    pub(crate) fn anchored(mut self) -> Self {
        self.motion_type = MotionType::Static;
        self.inv_mass = 0.0;
        self.inv_inertia_local = Mat3::ZERO;
        self.inv_inertia = Mat3::ZERO;
        self
    }

    fn refresh_inertia(&mut self) {
        let r = Mat3::from_quat(self.rotation);
        self.inv_inertia = r * self.inv_inertia_local * r.transpose();
    }

    #[must_use]
    pub fn id(&self) -> BodyId {
        self.id
    }

    #[must_use]
    pub fn center_of_mass(&self) -> RVec3 {
        self.com
    }

    #[must_use]
    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    #[must_use]
    pub fn linear_velocity(&self) -> Vec3 {
        self.linear_velocity
    }

    #[must_use]
    pub fn angular_velocity(&self) -> Vec3 {
        self.angular_velocity
    }

    #[must_use]
    pub fn inverse_mass(&self) -> f32 {
        self.inv_mass
    }

    /// World space inverse inertia.
    #[must_use]
    pub fn inverse_inertia(&self) -> Mat3 {
        self.inv_inertia
    }

    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        self.motion_type == MotionType::Dynamic
    }

    /// Velocity of the point at offset `r` from the center of mass.
    #[must_use]
    pub fn velocity_at(&self, r: Vec3) -> Vec3 {
        self.linear_velocity + self.angular_velocity.cross(r)
    }

    /// Offset of a world point from the center of mass.
    #[must_use]
    pub fn offset_of(&self, world: RVec3) -> Vec3 {
        to_f32(world - self.com)
    }

    /// World position of a point given in the body's center of mass frame.
    #[must_use]
    pub fn world_point(&self, local: Vec3) -> RVec3 {
        self.com + to_real(self.rotation * local)
    }

    /// Applies `impulse` at offset `r` from the center of mass.
    pub fn apply_impulse(&mut self, impulse: Vec3, r: Vec3) {
        if self.is_dynamic() {
            self.linear_velocity += impulse * self.inv_mass;
            self.angular_velocity += self.inv_inertia * r.cross(impulse);
        }
    }

    pub fn apply_angular_impulse(&mut self, impulse: Vec3) {
        if self.is_dynamic() {
            self.angular_velocity += self.inv_inertia * impulse;
        }
    }

    /// Moves the body as if `impulse` acted at `r` for one unit of time.
    pub fn apply_position_impulse(&mut self, impulse: Vec3, r: Vec3) {
        if self.is_dynamic() {
            self.com += to_real(impulse * self.inv_mass);
            self.rotate_by(self.inv_inertia * r.cross(impulse));
        }
    }

    pub fn apply_angular_position_impulse(&mut self, impulse: Vec3) {
        if self.is_dynamic() {
            self.rotate_by(self.inv_inertia * impulse);
        }
    }

    fn rotate_by(&mut self, angle: Vec3) {
        let spin = Quat::from_xyzw(angle.x, angle.y, angle.z, 0.0) * self.rotation;
        self.rotation = (self.rotation + spin * 0.5).normalize();
        self.refresh_inertia();
    }

    /// Inverse effective mass of an impulse along `n` at offsets `r1`/`r2`.
    pub(crate) fn effective_mass(body1: &Self, r1: Vec3, body2: &Self, r2: Vec3, n: Vec3) -> f32 {
        let rn1 = r1.cross(n);
        let rn2 = r2.cross(n);
        let k = body1.inv_mass
            + body2.inv_mass
            + rn1.dot(body1.inv_inertia * rn1)
            + rn2.dot(body2.inv_inertia * rn2);
        if k > 1.0e-12 {
            1.0 / k
        } else {
            0.0
        }
    }

    pub(crate) fn integrate(&mut self, dt: f32) {
        if self.motion_type == MotionType::Static {
            return;
        }
        self.com += to_real(self.linear_velocity * dt);
        self.rotate_by_velocity(dt);
    }

    fn rotate_by_velocity(&mut self, dt: f32) {
        let w = self.angular_velocity * dt;
        let spin = Quat::from_xyzw(w.x, w.y, w.z, 0.0) * self.rotation;
        self.rotation = (self.rotation + spin * 0.5).normalize();
        self.refresh_inertia();
    }

    /// Copies position and velocity back into `body`.
    pub(crate) fn write_back(&self, body: &mut Body) {
        if body.is_static() {
            return;
        }
        body.rotation = self.rotation;
        body.set_center_of_mass_position(self.com);
        if let Some(motion) = body.moving_mut() {
            motion.linear_velocity = self.linear_velocity;
            motion.angular_velocity = self.angular_velocity;
            motion.clamp_velocities();
        }
        body.update_world_bounds();
    }
}

/// Mutable access to two distinct solver bodies.
pub(crate) fn pair_mut(bodies: &mut [SolverBody], a: usize, b: usize) -> (&mut SolverBody, &mut SolverBody) {
    debug_assert_ne!(a, b);
    if a < b {
        let (left, right) = bodies.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = bodies.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{BodyCreationSettings, BodyManager};
    use crate::shapes::ShapeSettings;
    use crate::types::BroadPhaseLayer;

    fn dynamic_ball() -> (BodyManager, BodyId) {
        let mut bodies = BodyManager::new(4);
        let shape = ShapeSettings::sphere(1.0).create().unwrap();
        let settings = BodyCreationSettings::new(shape, RVec3::ZERO, Quat::IDENTITY, MotionType::Dynamic, 1);
        let id = bodies.create_body(&settings, BroadPhaseLayer(1)).unwrap();
        (bodies, id)
    }

    #[test]
    fn impulse_at_offset_spins() {
        let (bodies, id) = dynamic_ball();
        let mut solver = SolverBody::from_body(&bodies.lock_read(id).unwrap());
        solver.apply_impulse(Vec3::X, Vec3::Y);
        assert!(solver.linear_velocity.x > 0.0);
        assert!(solver.angular_velocity.z < 0.0);
    }

    #[test]
    fn integrate_and_write_back() {
        let (mut bodies, id) = dynamic_ball();
        let mut solver = SolverBody::from_body(&bodies.lock_read(id).unwrap());
        solver.linear_velocity = Vec3::new(0.0, -2.0, 0.0);
        solver.integrate(0.5);
        let body = bodies.get_mut(id).unwrap();
        solver.write_back(body);
        assert!((body.position().y + 1.0).abs() < 1e-6);
        assert_eq!(body.linear_velocity(), Vec3::new(0.0, -2.0, 0.0));
        assert!((body.world_bounds().max.y - 0.0).abs() < 1e-5);
    }

    #[test]
    fn pair_mut_returns_argument_order() {
        let (bodies, id) = dynamic_ball();
        let base = SolverBody::from_body(&bodies.lock_read(id).unwrap());
        let mut list = vec![base.clone(), base.clone(), base];
        list[2].inv_mass = 7.0;
        let (a, b) = pair_mut(&mut list, 2, 0);
        assert_eq!(a.inv_mass, 7.0);
        assert_ne!(b.inv_mass, 7.0);
    }
}

//! Body lifecycle and mutation through the [`PhysicsSystem`].
//!
//! Bodies go `created -> added <-> removed -> destroyed`. Only added bodies
//! are simulated and found by queries. Setters keep the broad phase in sync
//! and wake sleeping bodies unless told otherwise.

use glam::{Mat3, Quat, Vec3};
use tracing::{debug, warn};

use crate::body::{Body, BodyCreationSettings, BodyId, MotionProperties};
use crate::error::PhysicsError;
use crate::shapes::ShapeRef;
use crate::simulation::PhysicsSystem;
use crate::types::{to_f32, to_real, Aabb, Activation, MotionType, ObjectLayer, RVec3};

impl PhysicsSystem {
    /// # Errors
    /// [`PhysicsError::TooManyBodies`] or the validation error of `settings`.
    pub fn create_body(&mut self, settings: &BodyCreationSettings) -> Result<BodyId, PhysicsError> {
        let layer = self.layers.broad_phase_layer(settings.object_layer);
        self.bodies.create_body(settings, layer)
    }

    /// Creates a body and adds it to the broad phase in one go.
    ///
    /// # Errors
    /// See [`PhysicsSystem::create_body`].
    pub fn create_and_add_body(
        &mut self,
        settings: &BodyCreationSettings,
        activation: Activation,
    ) -> Result<BodyId, PhysicsError> {
        let id = self.create_body(settings)?;
        self.add_body(id, activation)?;
        Ok(id)
    }

    /// # Errors
    /// [`PhysicsError::InvalidBodyId`] for stale ids and
    /// [`PhysicsError::BodyStillAdded`] when the body was not removed first.
    pub fn destroy_body(&mut self, id: BodyId) -> Result<(), PhysicsError> {
        self.bodies.destroy_body(id)
    }

    /// Inserts the body into the broad phase so it takes part in the
    /// simulation.
    ///
    /// # Errors
    /// [`PhysicsError::InvalidBodyId`] or [`PhysicsError::BodyAlreadyAdded`].
    pub fn add_body(&mut self, id: BodyId, activation: Activation) -> Result<(), PhysicsError> {
        let body = self.bodies.get_mut(id).ok_or(PhysicsError::InvalidBodyId(id))?;
        if body.is_in_broad_phase() {
            warn!(?id, "add_body called on a body that is already added");
            return Err(PhysicsError::BodyAlreadyAdded(id));
        }
        body.broad_phase_proxy = Some(self.broad_phase.insert(body.broad_phase_layer, body.world_bounds, id));
        if activation == Activation::Activate {
            self.bodies.activate_body(id);
        }
        debug!(?id, "added body");
        Ok(())
    }

    /// Takes the body out of the broad phase and puts it to sleep.
    ///
    /// # Errors
    /// [`PhysicsError::InvalidBodyId`] or [`PhysicsError::BodyNotAdded`].
    pub fn remove_body(&mut self, id: BodyId) -> Result<(), PhysicsError> {
        let body = self.bodies.get_mut(id).ok_or(PhysicsError::InvalidBodyId(id))?;
        let proxy = body.broad_phase_proxy.ok_or(PhysicsError::BodyNotAdded(id))?;
        let layer = body.broad_phase_layer;
        self.bodies.deactivate_body(id);
        self.broad_phase.remove(layer, proxy);
        if let Some(body) = self.bodies.get_mut(id) {
            body.broad_phase_proxy = None;
        }
        debug!(?id, "removed body");
        Ok(())
    }

    #[must_use]
    pub fn is_added(&self, id: BodyId) -> bool {
        self.bodies.lock_read(id).is_some_and(|b| b.is_in_broad_phase())
    }

    #[must_use]
    pub fn num_bodies(&self) -> usize {
        self.bodies.len()
    }

    #[must_use]
    pub fn num_active_bodies(&self) -> usize {
        self.bodies.active_body_ids().len()
    }

    /// Ids of the awake bodies.
    #[must_use]
    pub fn active_body_ids(&self) -> &[BodyId] {
        self.bodies.active_body_ids()
    }

    #[must_use]
    pub fn body_ids(&self) -> Vec<BodyId> {
        self.bodies.body_ids()
    }

    /// Returns `false` for stale ids, static bodies and bodies that are not
    /// added.
    pub fn activate_body(&mut self, id: BodyId) -> bool {
        self.bodies.activate_body(id)
    }

    pub fn deactivate_body(&mut self, id: BodyId) -> bool {
        self.bodies.deactivate_body(id)
    }

    #[must_use]
    pub fn is_active(&self, id: BodyId) -> bool {
        self.read(id, Body::is_active).unwrap_or(false)
    }

    fn read<R>(&self, id: BodyId, f: impl FnOnce(&Body) -> R) -> Option<R> {
        self.bodies.lock_read(id).map(|b| f(&b))
    }

    #[must_use]
    pub fn position(&self, id: BodyId) -> Option<RVec3> {
        self.read(id, Body::position)
    }

    #[must_use]
    pub fn rotation(&self, id: BodyId) -> Option<Quat> {
        self.read(id, Body::rotation)
    }

    #[must_use]
    pub fn center_of_mass_position(&self, id: BodyId) -> Option<RVec3> {
        self.read(id, Body::center_of_mass_position)
    }

    #[must_use]
    pub fn linear_velocity(&self, id: BodyId) -> Option<Vec3> {
        self.read(id, Body::linear_velocity)
    }

    #[must_use]
    pub fn angular_velocity(&self, id: BodyId) -> Option<Vec3> {
        self.read(id, Body::angular_velocity)
    }

    #[must_use]
    pub fn world_bounds(&self, id: BodyId) -> Option<Aabb> {
        self.read(id, Body::world_bounds)
    }

    #[must_use]
    pub fn motion_type(&self, id: BodyId) -> Option<MotionType> {
        self.read(id, Body::motion_type)
    }

    #[must_use]
    pub fn user_data(&self, id: BodyId) -> Option<u64> {
        self.read(id, Body::user_data)
    }

    #[must_use]
    pub fn shape(&self, id: BodyId) -> Option<ShapeRef> {
        self.read(id, |b| b.shape().clone())
    }

    /// Mutates a live body, then pushes its new bounds to the broad phase
    /// and wakes it when asked to.
    fn modify(
        &mut self,
        id: BodyId,
        activation: Activation,
        f: impl FnOnce(&mut Body),
    ) -> Result<(), PhysicsError> {
        let body = self.bodies.get_mut(id).ok_or(PhysicsError::InvalidBodyId(id))?;
        f(body);
        body.update_world_bounds();
        if let Some(proxy) = body.broad_phase_proxy {
            self.broad_phase.update_bounds(body.broad_phase_layer, proxy, body.world_bounds);
        }
        if activation == Activation::Activate {
            self.bodies.activate_body(id);
        }
        Ok(())
    }

    /// Teleports the shape origin of a body.
    ///
    /// # Errors
    /// [`PhysicsError::InvalidBodyId`] for stale ids.
    pub fn set_position(&mut self, id: BodyId, position: RVec3, activation: Activation) -> Result<(), PhysicsError> {
        self.modify(id, activation, |body| {
            body.position = position;
        })
    }

    /// # Errors
    /// [`PhysicsError::InvalidBodyId`] for stale ids.
    pub fn set_rotation(&mut self, id: BodyId, rotation: Quat, activation: Activation) -> Result<(), PhysicsError> {
        self.modify(id, activation, |body| {
            body.rotation = rotation.normalize();
        })
    }

    /// # Errors
    /// [`PhysicsError::InvalidBodyId`] for stale ids.
    pub fn set_position_and_rotation(
        &mut self,
        id: BodyId,
        position: RVec3,
        rotation: Quat,
        activation: Activation,
    ) -> Result<(), PhysicsError> {
        self.modify(id, activation, |body| {
            body.position = position;
            body.rotation = rotation.normalize();
        })
    }

    /// Changes a velocity without touching the broad phase. Wakes the body
    /// when the new velocity is not zero; static bodies are left alone.
    fn set_velocity(&mut self, id: BodyId, f: impl FnOnce(&mut MotionProperties) -> bool) -> Result<(), PhysicsError> {
        let body = self.bodies.get_mut(id).ok_or(PhysicsError::InvalidBodyId(id))?;
        let Some(motion) = body.moving_mut() else {
            return Ok(());
        };
        let wake = f(motion);
        motion.clamp_velocities();
        if wake {
            self.bodies.activate_body(id);
        }
        Ok(())
    }

    /// # Errors
    /// [`PhysicsError::InvalidBodyId`] for stale ids.
    pub fn set_linear_velocity(&mut self, id: BodyId, velocity: Vec3) -> Result<(), PhysicsError> {
        self.set_velocity(id, |m| {
            m.linear_velocity = velocity;
            velocity != Vec3::ZERO
        })
    }

    /// # Errors
    /// [`PhysicsError::InvalidBodyId`] for stale ids.
    pub fn set_angular_velocity(&mut self, id: BodyId, velocity: Vec3) -> Result<(), PhysicsError> {
        self.set_velocity(id, |m| {
            m.angular_velocity = velocity;
            velocity != Vec3::ZERO
        })
    }

    /// Adds a force acting through the center of mass during the next step.
    ///
    /// # Errors
    /// [`PhysicsError::InvalidBodyId`] for stale ids.
    pub fn add_force(&mut self, id: BodyId, force: Vec3, activation: Activation) -> Result<(), PhysicsError> {
        self.set_velocity(id, |m| {
            m.force += force;
            activation == Activation::Activate
        })
    }

    /// # Errors
    /// [`PhysicsError::InvalidBodyId`] for stale ids.
    pub fn add_torque(&mut self, id: BodyId, torque: Vec3, activation: Activation) -> Result<(), PhysicsError> {
        self.set_velocity(id, |m| {
            m.torque += torque;
            activation == Activation::Activate
        })
    }

    /// Changes the velocity of a dynamic body as if `impulse` hit its center
    /// of mass.
    ///
    /// # Errors
    /// [`PhysicsError::InvalidBodyId`] for stale ids.
    pub fn add_impulse(&mut self, id: BodyId, impulse: Vec3) -> Result<(), PhysicsError> {
        let inv_mass = self.read(id, Body::inverse_mass).ok_or(PhysicsError::InvalidBodyId(id))?;
        self.set_velocity(id, |m| {
            m.linear_velocity += impulse * inv_mass;
            inv_mass > 0.0
        })
    }

    /// # Errors
    /// [`PhysicsError::InvalidBodyId`] for stale ids.
    pub fn add_impulse_at(&mut self, id: BodyId, impulse: Vec3, point: RVec3) -> Result<(), PhysicsError> {
        let (inv_mass, inv_inertia, com) = self
            .read(id, |b| (b.inverse_mass(), b.world_inverse_inertia(), b.center_of_mass_position()))
            .ok_or(PhysicsError::InvalidBodyId(id))?;
        let r = to_f32(point - com);
        self.set_velocity(id, |m| {
            m.linear_velocity += impulse * inv_mass;
            m.angular_velocity += inv_inertia * r.cross(impulse);
            inv_mass > 0.0
        })
    }

    /// # Errors
    /// [`PhysicsError::InvalidBodyId`] for stale ids.
    pub fn add_angular_impulse(&mut self, id: BodyId, impulse: Vec3) -> Result<(), PhysicsError> {
        let inv_inertia = self.read(id, Body::world_inverse_inertia).ok_or(PhysicsError::InvalidBodyId(id))?;
        self.set_velocity(id, |m| {
            m.angular_velocity += inv_inertia * impulse;
            inv_inertia != Mat3::ZERO
        })
    }

    /// Sets the velocities of a kinematic body so that it arrives at
    /// `position`/`rotation` after `delta_time`.
    ///
    /// # Errors
    /// [`PhysicsError::InvalidBodyId`] for stale ids.
    pub fn move_kinematic(&mut self, id: BodyId, position: RVec3, rotation: Quat, delta_time: f32) -> Result<(), PhysicsError> {
        let (com, current_rotation, local_com) = self
            .read(id, |b| (b.center_of_mass_position(), b.rotation(), b.shape().center_of_mass()))
            .ok_or(PhysicsError::InvalidBodyId(id))?;
        if delta_time <= 0.0 {
            return Ok(());
        }
        let rotation = rotation.normalize();
        let target_com = position + to_real(rotation * local_com);
        let linear = to_f32(target_com - com) / delta_time;
        let delta = rotation * current_rotation.inverse();
        let delta = if delta.w < 0.0 { -delta } else { delta };
        let (axis, angle) = delta.to_axis_angle();
        let angular = if angle.abs() > 1.0e-6 { axis * (angle / delta_time) } else { Vec3::ZERO };
        self.set_velocity(id, |m| {
            m.linear_velocity = linear;
            m.angular_velocity = angular;
            true
        })
    }

    /// Switches between static, kinematic and dynamic. Bodies created static
    /// need `allow_dynamic_or_kinematic` to become movable.
    ///
    /// # Errors
    /// [`PhysicsError::InvalidBodyId`] for stale ids and
    /// [`PhysicsError::InvalidMassProperties`] when the body has no motion
    /// properties or no mass for becoming dynamic.
    pub fn set_motion_type(&mut self, id: BodyId, motion_type: MotionType, activation: Activation) -> Result<(), PhysicsError> {
        let body = self.bodies.get_mut(id).ok_or(PhysicsError::InvalidBodyId(id))?;
        if body.motion_type == motion_type {
            return Ok(());
        }
        match (&body.motion, motion_type) {
            (_, MotionType::Static) => {}
            (None, _) => {
                return Err(PhysicsError::InvalidMassProperties(
                    "body was created static without allow_dynamic_or_kinematic",
                ))
            }
            (Some(m), MotionType::Dynamic) if m.inv_mass <= 0.0 => {
                return Err(PhysicsError::InvalidMassProperties("body has no mass to become dynamic"))
            }
            (Some(_), _) => {}
        }
        body.motion_type = motion_type;
        if let Some(motion) = body.motion.as_mut() {
            motion.linear_velocity = Vec3::ZERO;
            motion.angular_velocity = Vec3::ZERO;
            motion.reset_sleep();
        }
        if motion_type == MotionType::Static {
            self.bodies.deactivate_body(id);
        } else if activation == Activation::Activate {
            self.bodies.activate_body(id);
        }
        Ok(())
    }

    /// Replaces the shape of a body, optionally recomputing its mass and
    /// inertia from the new shape.
    ///
    /// # Errors
    /// [`PhysicsError::InvalidBodyId`] for stale ids, or the mass error of
    /// the new shape when `update_mass` is set.
    pub fn set_shape(&mut self, id: BodyId, shape: ShapeRef, update_mass: bool, activation: Activation) -> Result<(), PhysicsError> {
        let props = if update_mass {
            let moving = self.read(id, |b| b.motion.is_some()).ok_or(PhysicsError::InvalidBodyId(id))?;
            moving.then(|| shape.mass_properties()).transpose()?
        } else {
            None
        };
        self.modify(id, activation, |body| {
            // The center of mass stays where it was.
            let com = body.center_of_mass_position();
            body.shape = shape;
            body.set_center_of_mass_position(com);
            if let (Some(props), Some(motion)) = (props, body.motion.as_mut()) {
                motion.set_mass_properties(&props);
            }
        })
    }

    /// Moves a body to another object layer, and to another broad-phase
    /// tree when the layer maps to one.
    ///
    /// # Errors
    /// [`PhysicsError::InvalidBodyId`] for stale ids.
    pub fn set_object_layer(&mut self, id: BodyId, layer: ObjectLayer) -> Result<(), PhysicsError> {
        let new_layer = self.layers.broad_phase_layer(layer);
        let body = self.bodies.get_mut(id).ok_or(PhysicsError::InvalidBodyId(id))?;
        body.object_layer = layer;
        if body.broad_phase_layer != new_layer {
            if let Some(proxy) = body.broad_phase_proxy {
                self.broad_phase.remove(body.broad_phase_layer, proxy);
                body.broad_phase_proxy = Some(self.broad_phase.insert(new_layer, body.world_bounds, id));
            }
            body.broad_phase_layer = new_layer;
        }
        Ok(())
    }

    fn set_field(&mut self, id: BodyId, f: impl FnOnce(&mut Body)) -> Result<(), PhysicsError> {
        let body = self.bodies.get_mut(id).ok_or(PhysicsError::InvalidBodyId(id))?;
        f(body);
        Ok(())
    }

    /// # Errors
    /// [`PhysicsError::InvalidBodyId`] for stale ids.
    pub fn set_friction(&mut self, id: BodyId, friction: f32) -> Result<(), PhysicsError> {
        self.set_field(id, |b| b.friction = friction)
    }

    /// # Errors
    /// [`PhysicsError::InvalidBodyId`] for stale ids.
    pub fn set_restitution(&mut self, id: BodyId, restitution: f32) -> Result<(), PhysicsError> {
        self.set_field(id, |b| b.restitution = restitution)
    }

    /// # Errors
    /// [`PhysicsError::InvalidBodyId`] for stale ids.
    pub fn set_user_data(&mut self, id: BodyId, user_data: u64) -> Result<(), PhysicsError> {
        self.set_field(id, |b| b.user_data = user_data)
    }

    /// # Errors
    /// [`PhysicsError::InvalidBodyId`] for stale ids.
    pub fn set_gravity_factor(&mut self, id: BodyId, factor: f32) -> Result<(), PhysicsError> {
        self.set_field(id, |b| {
            if let Some(motion) = b.motion.as_mut() {
                motion.gravity_factor = factor;
            }
        })
    }
}

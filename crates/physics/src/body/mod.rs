//! # Rigid Bodies
//!
//! A [`Body`] couples a shared [`ShapeRef`] with a world transform, material
//! values, filtering data and, for bodies that can move, [`MotionProperties`].
//! Bodies live in the [`BodyManager`] arena and are addressed by
//! generation-checked [`BodyId`]s.

mod creation;
mod manager;

use std::fmt;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Quat, Vec3};

pub use creation::{BodyCreationSettings, OverrideMassProperties};
pub use manager::{BodyManager, BodyReadGuard, BodyWriteGuard};

use crate::shapes::{MassProperties, ShapeRef};
use crate::types::{to_f32, to_real, Aabb, BroadPhaseLayer, Isometry, MotionQuality, MotionType, ObjectLayer, RVec3};

/// Index plus sequence number of a body slot.
///
/// Bits 0..23 hold the slot index, bit 23 is reserved for the broad phase and
/// the high byte holds the slot's sequence number at creation time. A slot's
/// sequence number is bumped every time it is reused, which invalidates ids
/// of bodies previously stored there.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Pod, Zeroable)]
pub struct BodyId(u32);

impl BodyId {
    pub const INVALID: Self = Self(0xffff_ffff);
    pub const MAX_BODY_INDEX: u32 = 0x007f_ffff;
    pub const BROAD_PHASE_BIT: u32 = 0x0080_0000;

    #[must_use]
    pub const fn new(index: u32, sequence_number: u8) -> Self {
        Self(((sequence_number as u32) << 24) | (index & Self::MAX_BODY_INDEX))
    }

    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 & Self::MAX_BODY_INDEX
    }

    #[must_use]
    pub const fn sequence_number(self) -> u8 {
        (self.0 >> 24) as u8
    }

    #[must_use]
    pub const fn is_invalid(self) -> bool {
        self.0 == Self::INVALID.0
    }
}

impl Default for BodyId {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Debug for BodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_invalid() {
            write!(f, "BodyId(invalid)")
        } else {
            write!(f, "BodyId({}:{})", self.index(), self.sequence_number())
        }
    }
}

/// Decides whether two bodies in filtered collision groups may collide.
pub trait GroupFilter: Send + Sync + fmt::Debug {
    fn can_collide(&self, a: &CollisionGroup, b: &CollisionGroup) -> bool;
}

/// Group membership used for fine grained pair filtering.
#[derive(Clone, Debug)]
pub struct CollisionGroup {
    pub filter: Option<Arc<dyn GroupFilter>>,
    pub group_id: u32,
    pub sub_group_id: u32,
}

impl CollisionGroup {
    pub const INVALID_GROUP: u32 = u32::MAX;

    #[must_use]
    pub fn new(filter: Arc<dyn GroupFilter>, group_id: u32, sub_group_id: u32) -> Self {
        Self {
            filter: Some(filter),
            group_id,
            sub_group_id,
        }
    }

    /// Asks the first available filter. Groups without filters always collide.
    #[must_use]
    pub fn can_collide(&self, other: &CollisionGroup) -> bool {
        match (&self.filter, &other.filter) {
            (Some(filter), _) => filter.can_collide(self, other),
            (None, Some(filter)) => filter.can_collide(other, self),
            (None, None) => true,
        }
    }
}

impl Default for CollisionGroup {
    fn default() -> Self {
        Self {
            filter: None,
            group_id: Self::INVALID_GROUP,
            sub_group_id: Self::INVALID_GROUP,
        }
    }
}

/// Table of sub-group pairs that may not collide within the same group.
/// Bodies of different groups always collide.
#[derive(Clone, Debug)]
pub struct GroupFilterTable {
    sub_groups: u32,
    disabled: Vec<bool>,
}

impl GroupFilterTable {
    #[must_use]
    pub fn new(sub_groups: u32) -> Self {
        Self {
            sub_groups,
            disabled: vec![false; (sub_groups as usize) * (sub_groups as usize)],
        }
    }

    fn slot(&self, a: u32, b: u32) -> Option<usize> {
        (a < self.sub_groups && b < self.sub_groups).then(|| (a * self.sub_groups + b) as usize)
    }

    pub fn disable_collision(&mut self, a: u32, b: u32) {
        self.set(a, b, true);
    }

    pub fn enable_collision(&mut self, a: u32, b: u32) {
        self.set(a, b, false);
    }

    fn set(&mut self, a: u32, b: u32, disabled: bool) {
        for (x, y) in [(a, b), (b, a)] {
            if let Some(i) = self.slot(x, y) {
                self.disabled[i] = disabled;
            }
        }
    }

    #[must_use]
    pub fn is_collision_enabled(&self, a: u32, b: u32) -> bool {
        self.slot(a, b).map_or(true, |i| !self.disabled[i])
    }
}

impl GroupFilter for GroupFilterTable {
    fn can_collide(&self, a: &CollisionGroup, b: &CollisionGroup) -> bool {
        a.group_id != b.group_id || self.is_collision_enabled(a.sub_group_id, b.sub_group_id)
    }
}

/// Velocity and mass state of a body that can move.
#[derive(Clone, Debug, PartialEq)]
pub struct MotionProperties {
    pub(crate) linear_velocity: Vec3,
    pub(crate) angular_velocity: Vec3,
    /// Inverse mass used while the body is dynamic.
    pub(crate) inv_mass: f32,
    /// Inverse inertia about the center of mass, body space.
    pub(crate) inv_inertia: Mat3,
    pub(crate) linear_damping: f32,
    pub(crate) angular_damping: f32,
    pub(crate) max_linear_velocity: f32,
    pub(crate) max_angular_velocity: f32,
    pub(crate) gravity_factor: f32,
    pub(crate) motion_quality: MotionQuality,
    pub(crate) allow_sleeping: bool,
    pub(crate) force: Vec3,
    pub(crate) torque: Vec3,
    /// Consecutive steps spent below the sleep threshold.
    pub(crate) sleep_steps: u32,
}

impl MotionProperties {
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

    #[must_use]
    pub fn inverse_inertia(&self) -> Mat3 {
        self.inv_inertia
    }

    #[must_use]
    pub fn gravity_factor(&self) -> f32 {
        self.gravity_factor
    }

    #[must_use]
    pub fn motion_quality(&self) -> MotionQuality {
        self.motion_quality
    }

    #[must_use]
    pub fn allow_sleeping(&self) -> bool {
        self.allow_sleeping
    }

    /// Replaces mass and inertia; velocities are kept.
    pub(crate) fn set_mass_properties(&mut self, props: &MassProperties) {
        self.inv_mass = if props.mass > 0.0 { 1.0 / props.mass } else { 0.0 };
        self.inv_inertia = if props.inertia.determinant().abs() > f32::EPSILON {
            props.inertia.inverse()
        } else {
            Mat3::ZERO
        };
    }

    pub(crate) fn clamp_velocities(&mut self) {
        self.linear_velocity = self.linear_velocity.clamp_length_max(self.max_linear_velocity);
        self.angular_velocity = self.angular_velocity.clamp_length_max(self.max_angular_velocity);
    }

    pub(crate) fn reset_sleep(&mut self) {
        self.sleep_steps = 0;
    }
}

#[derive(Debug)]
pub struct Body {
    pub(crate) id: BodyId,
    pub(crate) shape: ShapeRef,
    /// World position of the shape origin.
    pub(crate) position: RVec3,
    pub(crate) rotation: Quat,
    pub(crate) motion_type: MotionType,
    pub(crate) motion: Option<MotionProperties>,
    pub(crate) object_layer: ObjectLayer,
    pub(crate) broad_phase_layer: BroadPhaseLayer,
    pub(crate) collision_group: CollisionGroup,
    pub(crate) friction: f32,
    pub(crate) restitution: f32,
    pub(crate) is_sensor: bool,
    pub(crate) use_manifold_reduction: bool,
    pub(crate) user_data: u64,
    pub(crate) broad_phase_proxy: Option<u32>,
    pub(crate) world_bounds: Aabb,
    /// Position in the active list while the body is awake.
    pub(crate) active_index: Option<usize>,
}

impl Body {
    #[must_use]
    pub fn id(&self) -> BodyId {
        self.id
    }

    #[must_use]
    pub fn shape(&self) -> &ShapeRef {
        &self.shape
    }

    #[must_use]
    pub fn position(&self) -> RVec3 {
        self.position
    }

    #[must_use]
    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    #[must_use]
    pub fn center_of_mass_position(&self) -> RVec3 {
        self.position + to_real(self.rotation * self.shape.center_of_mass())
    }

    #[must_use]
    pub fn motion_type(&self) -> MotionType {
        self.motion_type
    }

    #[must_use]
    pub fn is_static(&self) -> bool {
        self.motion_type == MotionType::Static
    }

    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        self.motion_type == MotionType::Dynamic
    }

    #[must_use]
    pub fn is_kinematic(&self) -> bool {
        self.motion_type == MotionType::Kinematic
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active_index.is_some()
    }

    #[must_use]
    pub fn is_sensor(&self) -> bool {
        self.is_sensor
    }

    #[must_use]
    pub fn is_in_broad_phase(&self) -> bool {
        self.broad_phase_proxy.is_some()
    }

    #[must_use]
    pub fn motion_properties(&self) -> Option<&MotionProperties> {
        self.motion.as_ref()
    }

    #[must_use]
    pub fn linear_velocity(&self) -> Vec3 {
        self.moving().map_or(Vec3::ZERO, |m| m.linear_velocity)
    }

    #[must_use]
    pub fn angular_velocity(&self) -> Vec3 {
        self.moving().map_or(Vec3::ZERO, |m| m.angular_velocity)
    }

    /// Zero unless the body is dynamic.
    #[must_use]
    pub fn inverse_mass(&self) -> f32 {
        match (&self.motion, self.motion_type) {
            (Some(m), MotionType::Dynamic) => m.inv_mass,
            _ => 0.0,
        }
    }

    /// World space inverse inertia, zero unless the body is dynamic.
    #[must_use]
    pub fn world_inverse_inertia(&self) -> Mat3 {
        match (&self.motion, self.motion_type) {
            (Some(m), MotionType::Dynamic) => {
                let r = Mat3::from_quat(self.rotation);
                r * m.inv_inertia * r.transpose()
            }
            _ => Mat3::ZERO,
        }
    }

    /// Velocity of the material point at `offset` from the center of mass.
    #[must_use]
    pub fn point_velocity(&self, offset: Vec3) -> Vec3 {
        self.linear_velocity() + self.angular_velocity().cross(offset)
    }

    #[must_use]
    pub fn object_layer(&self) -> ObjectLayer {
        self.object_layer
    }

    #[must_use]
    pub fn broad_phase_layer(&self) -> BroadPhaseLayer {
        self.broad_phase_layer
    }

    #[must_use]
    pub fn collision_group(&self) -> &CollisionGroup {
        &self.collision_group
    }

    #[must_use]
    pub fn friction(&self) -> f32 {
        self.friction
    }

    #[must_use]
    pub fn restitution(&self) -> f32 {
        self.restitution
    }

    #[must_use]
    pub fn user_data(&self) -> u64 {
        self.user_data
    }

    #[must_use]
    pub fn world_bounds(&self) -> Aabb {
        self.world_bounds
    }

    /// Shape transform with the translation taken relative to `base`, which
    /// keeps single precision math accurate far from the world origin.
    #[must_use]
    pub fn transform_relative_to(&self, base: RVec3) -> Isometry {
        Isometry::new(to_f32(self.position - base), self.rotation)
    }

    pub(crate) fn moving(&self) -> Option<&MotionProperties> {
        match self.motion_type {
            MotionType::Static => None,
            MotionType::Kinematic | MotionType::Dynamic => self.motion.as_ref(),
        }
    }

    pub(crate) fn moving_mut(&mut self) -> Option<&mut MotionProperties> {
        match self.motion_type {
            MotionType::Static => None,
            MotionType::Kinematic | MotionType::Dynamic => self.motion.as_mut(),
        }
    }

    pub(crate) fn update_world_bounds(&mut self) {
        let bounds = self.shape.world_bounds(&Isometry::new(to_f32(self.position), self.rotation));
        // f64 positions lose bits when narrowed; widen the box to stay conservative.
        #[cfg(feature = "double-precision")]
        let bounds = bounds.expanded(bounds.min.abs().max(bounds.max.abs()).max_element() * f32::EPSILON * 2.0);
        self.world_bounds = bounds;
    }

    /// Moves the body so that its center of mass ends up at `com`.
    pub(crate) fn set_center_of_mass_position(&mut self, com: RVec3) {
        self.position = com - to_real(self.rotation * self.shape.center_of_mass());
    }
}

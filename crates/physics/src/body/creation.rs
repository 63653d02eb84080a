use glam::{Mat3, Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::{Body, BodyId, CollisionGroup, MotionProperties};
use crate::error::PhysicsError;
use crate::shapes::{MassProperties, ShapeRef};
use crate::types::{Aabb, BroadPhaseLayer, MotionQuality, MotionType, ObjectLayer, RVec3};

/// How the mass and inertia of a new body are determined.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum OverrideMassProperties {
    /// Integrate mass and inertia over the shape's density.
    #[default]
    CalculateMassAndInertia,
    /// Use the provided mass; scale the computed inertia to match it.
    CalculateInertia,
    /// Use the provided mass and inertia verbatim.
    MassAndInertiaProvided,
}

/// Everything needed to create a body.
#[derive(Clone, Debug)]
pub struct BodyCreationSettings {
    pub position: RVec3,
    pub rotation: Quat,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    pub user_data: u64,
    pub object_layer: ObjectLayer,
    pub collision_group: CollisionGroup,
    pub motion_type: MotionType,
    /// Keep motion properties on a static body so it can be made movable later.
    pub allow_dynamic_or_kinematic: bool,
    /// Sensors report contacts but never receive impulses.
    pub is_sensor: bool,
    pub use_manifold_reduction: bool,
    pub motion_quality: MotionQuality,
    pub allow_sleeping: bool,
    pub friction: f32,
    pub restitution: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub max_linear_velocity: f32,
    pub max_angular_velocity: f32,
    pub gravity_factor: f32,
    pub override_mass_properties: OverrideMassProperties,
    /// Applied to computed inertia only.
    pub inertia_multiplier: f32,
    pub mass_properties_override: MassProperties,
    pub shape: ShapeRef,
}

impl BodyCreationSettings {
    #[must_use]
    pub fn new(shape: ShapeRef, position: RVec3, rotation: Quat, motion_type: MotionType, object_layer: ObjectLayer) -> Self {
        Self {
            position,
            rotation,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            user_data: 0,
            object_layer,
            collision_group: CollisionGroup::default(),
            motion_type,
            allow_dynamic_or_kinematic: false,
            is_sensor: false,
            use_manifold_reduction: true,
            motion_quality: MotionQuality::Discrete,
            allow_sleeping: true,
            friction: 0.2,
            restitution: 0.0,
            linear_damping: 0.05,
            angular_damping: 0.05,
            max_linear_velocity: 500.0,
            max_angular_velocity: 0.25 * std::f32::consts::PI * 60.0,
            gravity_factor: 1.0,
            override_mass_properties: OverrideMassProperties::CalculateMassAndInertia,
            inertia_multiplier: 1.0,
            mass_properties_override: MassProperties::ZERO,
            shape,
        }
    }

    #[must_use]
    pub fn with_linear_velocity(mut self, velocity: Vec3) -> Self {
        self.linear_velocity = velocity;
        self
    }

    #[must_use]
    pub fn with_angular_velocity(mut self, velocity: Vec3) -> Self {
        self.angular_velocity = velocity;
        self
    }

    #[must_use]
    pub fn with_friction(mut self, friction: f32) -> Self {
        self.friction = friction;
        self
    }

    #[must_use]
    pub fn with_restitution(mut self, restitution: f32) -> Self {
        self.restitution = restitution;
        self
    }

    #[must_use]
    pub fn with_motion_quality(mut self, quality: MotionQuality) -> Self {
        self.motion_quality = quality;
        self
    }

    #[must_use]
    pub fn with_user_data(mut self, user_data: u64) -> Self {
        self.user_data = user_data;
        self
    }

    #[must_use]
    pub fn with_sensor(mut self, is_sensor: bool) -> Self {
        self.is_sensor = is_sensor;
        self
    }

    #[must_use]
    pub fn with_mass_override(mut self, policy: OverrideMassProperties, properties: MassProperties) -> Self {
        self.override_mass_properties = policy;
        self.mass_properties_override = properties;
        self
    }

    /// Resolves the mass policy against the shape.
    ///
    /// # Errors
    /// [`PhysicsError::InvalidMassProperties`] when the result has no
    /// positive, finite mass.
    pub fn mass_properties(&self) -> Result<MassProperties, PhysicsError> {
        let scale_inertia = |m: MassProperties| MassProperties::new(m.mass, m.inertia * self.inertia_multiplier);
        let props = match self.override_mass_properties {
            OverrideMassProperties::CalculateMassAndInertia => scale_inertia(self.shape.mass_properties()?),
            OverrideMassProperties::CalculateInertia => {
                scale_inertia(self.shape.mass_properties()?.scaled_to_mass(self.mass_properties_override.mass))
            }
            OverrideMassProperties::MassAndInertiaProvided => self.mass_properties_override,
        };
        if !(props.mass.is_finite() && props.mass > 0.0) {
            return Err(PhysicsError::InvalidMassProperties("mass must be positive"));
        }
        Ok(props)
    }

    fn motion_properties(&self) -> Result<MotionProperties, PhysicsError> {
        // Kinematic bodies never use their mass; tolerate shapes without one.
        let props = match (self.motion_type, self.mass_properties()) {
            (MotionType::Dynamic, result) => result?,
            (_, result) => result.unwrap_or(MassProperties::ZERO),
        };
        let mut motion = MotionProperties {
            linear_velocity: self.linear_velocity,
            angular_velocity: self.angular_velocity,
            inv_mass: 0.0,
            inv_inertia: Mat3::ZERO,
            linear_damping: self.linear_damping,
            angular_damping: self.angular_damping,
            max_linear_velocity: self.max_linear_velocity,
            max_angular_velocity: self.max_angular_velocity,
            gravity_factor: self.gravity_factor,
            motion_quality: self.motion_quality,
            allow_sleeping: self.allow_sleeping,
            force: Vec3::ZERO,
            torque: Vec3::ZERO,
            sleep_steps: 0,
        };
        motion.set_mass_properties(&props);
        Ok(motion)
    }

    pub(crate) fn build(&self, id: BodyId, broad_phase_layer: BroadPhaseLayer) -> Result<Body, PhysicsError> {
        if !self.rotation.is_finite() || self.rotation.length_squared() < 1.0e-6 {
            return Err(PhysicsError::InvalidGeometry("body rotation is not a valid quaternion"));
        }
        let needs_motion = self.motion_type != MotionType::Static || self.allow_dynamic_or_kinematic;
        let motion = if needs_motion {
            let mut motion = self.motion_properties()?;
            motion.clamp_velocities();
            Some(motion)
        } else {
            None
        };

        let mut body = Body {
            id,
            shape: self.shape.clone(),
            position: self.position,
            rotation: self.rotation.normalize(),
            motion_type: self.motion_type,
            motion,
            object_layer: self.object_layer,
            broad_phase_layer,
            collision_group: self.collision_group.clone(),
            friction: self.friction,
            restitution: self.restitution,
            is_sensor: self.is_sensor,
            use_manifold_reduction: self.use_manifold_reduction,
            user_data: self.user_data,
            broad_phase_proxy: None,
            world_bounds: Aabb::EMPTY,
            active_index: None,
        };
        body.update_world_bounds();
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::ShapeSettings;

    fn sphere_settings(motion_type: MotionType) -> BodyCreationSettings {
        let shape = ShapeSettings::sphere(1.0).create().unwrap();
        BodyCreationSettings::new(shape, RVec3::ZERO, Quat::IDENTITY, motion_type, 1)
    }

    #[test]
    fn static_bodies_have_no_motion() {
        let body = sphere_settings(MotionType::Static).build(BodyId::new(0, 0), BroadPhaseLayer(0)).unwrap();
        assert!(body.motion_properties().is_none());
        assert_eq!(body.inverse_mass(), 0.0);
        assert_eq!(body.world_inverse_inertia(), Mat3::ZERO);
    }

    #[test]
    fn mass_policies() {
        let computed = sphere_settings(MotionType::Dynamic).mass_properties().unwrap();
        assert!((computed.mass - 4.0 / 3.0 * std::f32::consts::PI * 1000.0).abs() < 1.0);

        let scaled = sphere_settings(MotionType::Dynamic)
            .with_mass_override(OverrideMassProperties::CalculateInertia, MassProperties::new(10.0, Mat3::ZERO))
            .mass_properties()
            .unwrap();
        assert!((scaled.mass - 10.0).abs() < 1e-5);
        assert!((scaled.inertia.x_axis.x - 4.0).abs() < 1e-4);

        let provided = MassProperties::new(2.0, Mat3::from_diagonal(Vec3::new(1.0, 2.0, 3.0)));
        let verbatim = sphere_settings(MotionType::Dynamic)
            .with_mass_override(OverrideMassProperties::MassAndInertiaProvided, provided)
            .mass_properties()
            .unwrap();
        assert_eq!(verbatim, provided);
    }

    #[test]
    fn dynamic_body_needs_mass() {
        let bad = sphere_settings(MotionType::Dynamic)
            .with_mass_override(OverrideMassProperties::MassAndInertiaProvided, MassProperties::ZERO);
        assert!(matches!(
            bad.build(BodyId::new(0, 0), BroadPhaseLayer(1)),
            Err(PhysicsError::InvalidMassProperties(_))
        ));
    }
}

//! # Core Types
//!
//! Precision aliases, bounding boxes, rigid transforms and the small enums
//! shared by every subsystem.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Scalar used for world-space positions.
#[cfg(feature = "double-precision")]
pub type Real = f64;
/// Scalar used for world-space positions.
#[cfg(not(feature = "double-precision"))]
pub type Real = f32;

/// Vector used for world-space positions.
#[cfg(feature = "double-precision")]
pub type RVec3 = glam::DVec3;
/// Vector used for world-space positions.
#[cfg(not(feature = "double-precision"))]
pub type RVec3 = glam::Vec3;

/// Widens a single precision vector to world precision.
#[inline]
#[must_use]
pub fn to_real(v: Vec3) -> RVec3 {
    #[cfg(feature = "double-precision")]
    {
        v.as_dvec3()
    }
    #[cfg(not(feature = "double-precision"))]
    {
        v
    }
}

/// Narrows a world precision vector to single precision. Only use this on
/// differences of nearby positions.
#[inline]
#[must_use]
pub fn to_f32(v: RVec3) -> Vec3 {
    #[cfg(feature = "double-precision")]
    {
        v.as_vec3()
    }
    #[cfg(not(feature = "double-precision"))]
    {
        v
    }
}

/// Axis aligned bounding box.
///
/// World-space boxes are kept in single precision in both precision modes;
/// conversions round outward so the box stays conservative.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// An inverted box that any `encapsulate` call replaces.
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::MAX),
        max: Vec3::splat(-f32::MAX),
    };

    #[must_use]
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    #[must_use]
    pub fn from_center_half_extents(center: Vec3, half_extents: Vec3) -> Self {
        Self::new(center - half_extents, center + half_extents)
    }

    #[must_use]
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        points.into_iter().fold(Self::EMPTY, |acc, p| acc.encapsulate_point(p))
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.min.cmple(self.max).all()
    }

    #[must_use]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    #[must_use]
    pub fn extent(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    #[must_use]
    pub fn surface_area(&self) -> f32 {
        let d = self.max - self.min;
        2.0 * (d.x * d.y + d.y * d.z + d.z * d.x)
    }

    #[must_use]
    pub fn encapsulate_point(self, p: Vec3) -> Self {
        Self::new(self.min.min(p), self.max.max(p))
    }

    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self::new(self.min.min(other.min), self.max.max(other.max))
    }

    #[must_use]
    pub fn expanded(self, margin: f32) -> Self {
        Self::new(self.min - Vec3::splat(margin), self.max + Vec3::splat(margin))
    }

    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.min.cmple(other.max).all() && self.max.cmpge(other.min).all()
    }

    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        self.min.cmple(other.min).all() && self.max.cmpge(other.max).all()
    }

    #[must_use]
    pub fn contains_point(&self, p: Vec3) -> bool {
        self.min.cmple(p).all() && self.max.cmpge(p).all()
    }

    /// Bounds of this box after applying `transform`.
    #[must_use]
    pub fn transformed(&self, transform: &Isometry) -> Self {
        let center = transform.transform_point(self.center());
        let extent = self.extent();
        let m = glam::Mat3::from_quat(transform.rotation);
        let half = Vec3::new(
            m.x_axis.x.abs() * extent.x + m.y_axis.x.abs() * extent.y + m.z_axis.x.abs() * extent.z,
            m.x_axis.y.abs() * extent.x + m.y_axis.y.abs() * extent.y + m.z_axis.y.abs() * extent.z,
            m.x_axis.z.abs() * extent.x + m.y_axis.z.abs() * extent.y + m.z_axis.z.abs() * extent.z,
        );
        Self::from_center_half_extents(center, half)
    }

    /// Slab test. Returns the entry fraction along `direction` (which spans the
    /// full ray length) or `None` when the ray misses within `[0, max_fraction]`.
    #[must_use]
    pub fn ray_entry(&self, origin: Vec3, direction: Vec3, max_fraction: f32) -> Option<f32> {
        let mut t_min = 0.0_f32;
        let mut t_max = max_fraction;
        for axis in 0..3 {
            let o = origin[axis];
            let d = direction[axis];
            if d.abs() < 1.0e-12 {
                if o < self.min[axis] || o > self.max[axis] {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / d;
            let mut t1 = (self.min[axis] - o) * inv;
            let mut t2 = (self.max[axis] - o) * inv;
            if t1 > t2 {
                std::mem::swap(&mut t1, &mut t2);
            }
            t_min = t_min.max(t1);
            t_max = t_max.min(t2);
            if t_min > t_max {
                return None;
            }
        }
        Some(t_min)
    }
}

/// Rigid transform (rotation followed by translation) in single precision.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Isometry {
    pub translation: Vec3,
    pub rotation: Quat,
}

impl Isometry {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    #[must_use]
    pub const fn new(translation: Vec3, rotation: Quat) -> Self {
        Self { translation, rotation }
    }

    #[must_use]
    pub fn from_translation(translation: Vec3) -> Self {
        Self::new(translation, Quat::IDENTITY)
    }

    #[inline]
    #[must_use]
    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        self.rotation * p + self.translation
    }

    #[inline]
    #[must_use]
    pub fn transform_vector(&self, v: Vec3) -> Vec3 {
        self.rotation * v
    }

    #[inline]
    #[must_use]
    pub fn inverse_transform_point(&self, p: Vec3) -> Vec3 {
        self.rotation.inverse() * (p - self.translation)
    }

    #[inline]
    #[must_use]
    pub fn inverse_transform_vector(&self, v: Vec3) -> Vec3 {
        self.rotation.inverse() * v
    }

    #[must_use]
    pub fn inverse(&self) -> Self {
        let inv = self.rotation.inverse();
        Self::new(-(inv * self.translation), inv)
    }

    /// `self * other`: applies `other` first.
    #[must_use]
    pub fn mul(&self, other: &Self) -> Self {
        Self::new(
            self.transform_point(other.translation),
            (self.rotation * other.rotation).normalize(),
        )
    }
}

impl Default for Isometry {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// How a body participates in the simulation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum MotionType {
    /// Immovable, infinite mass, never active.
    #[default]
    Static = 0,
    /// Moved by velocity only, infinite mass.
    Kinematic = 1,
    /// Fully simulated.
    Dynamic = 2,
}

/// Collision detection quality for moving bodies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum MotionQuality {
    #[default]
    Discrete = 0,
    /// Sweeps the body along its displacement to stop it tunnelling.
    LinearCast = 1,
}

/// Whether a mutation should wake a sleeping body.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Activation {
    #[default]
    Activate,
    DontActivate,
}

/// Coarse, user defined category of a body (e.g. static vs moving).
pub type ObjectLayer = u16;

/// Category of a broad-phase tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct BroadPhaseLayer(pub u8);

//! Mass and inertia of the primitive shapes, about their center of mass.

use glam::{Mat3, Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

/// Mass and inertia tensor about the center of mass.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MassProperties {
    pub mass: f32,
    pub inertia: Mat3,
}

impl MassProperties {
    pub const ZERO: Self = Self {
        mass: 0.0,
        inertia: Mat3::ZERO,
    };

    #[must_use]
    pub fn new(mass: f32, inertia: Mat3) -> Self {
        Self { mass, inertia }
    }

    /// Rescales mass and inertia so that the mass equals `mass`, keeping the
    /// mass distribution.
    #[must_use]
    pub fn scaled_to_mass(&self, mass: f32) -> Self {
        if self.mass <= 0.0 {
            return Self::new(mass, self.inertia);
        }
        let k = mass / self.mass;
        Self::new(mass, self.inertia * k)
    }

    /// Inertia expressed in a frame rotated by `rotation`.
    #[must_use]
    pub fn rotated(&self, rotation: Quat) -> Self {
        let r = Mat3::from_quat(rotation);
        Self::new(self.mass, r * self.inertia * r.transpose())
    }

    /// Parallel axis theorem: inertia about a point `offset` away from the
    /// center of mass.
    #[must_use]
    pub fn translated(&self, offset: Vec3) -> Self {
        let d2 = offset.length_squared();
        let outer = Mat3::from_cols(offset * offset.x, offset * offset.y, offset * offset.z);
        let shift = (Mat3::IDENTITY * d2 - outer) * self.mass;
        Self::new(self.mass, self.inertia + shift)
    }
}

#[must_use]
pub fn sphere(radius: f32, density: f32) -> MassProperties {
    let mass = 4.0 / 3.0 * PI * radius.powi(3) * density;
    let i = 0.4 * mass * radius * radius;
    MassProperties::new(mass, Mat3::from_diagonal(Vec3::splat(i)))
}

#[must_use]
pub fn cuboid(half_extent: Vec3, density: f32) -> MassProperties {
    let mass = 8.0 * half_extent.x * half_extent.y * half_extent.z * density;
    let s = half_extent * half_extent;
    let diag = Vec3::new(s.y + s.z, s.x + s.z, s.x + s.y) * (mass / 3.0);
    MassProperties::new(mass, Mat3::from_diagonal(diag))
}

/// Cylinder along the Y axis.
#[must_use]
pub fn cylinder(half_height: f32, radius: f32, density: f32) -> MassProperties {
    let height = 2.0 * half_height;
    let mass = PI * radius * radius * height * density;
    let iy = 0.5 * mass * radius * radius;
    let ixz = mass * (3.0 * radius * radius + height * height) / 12.0;
    MassProperties::new(mass, Mat3::from_diagonal(Vec3::new(ixz, iy, ixz)))
}

/// Capsule along the Y axis.
#[must_use]
pub fn capsule(half_height: f32, radius: f32, density: f32) -> MassProperties {
    let h = 2.0 * half_height;
    let r2 = radius * radius;
    let m_cyl = PI * r2 * h * density;
    let m_sph = 4.0 / 3.0 * PI * r2 * radius * density;
    let iy = m_cyl * r2 * 0.5 + m_sph * 0.4 * r2;
    let ixz = m_cyl * (h * h / 12.0 + r2 / 4.0) + m_sph * (0.4 * r2 + h * h / 4.0 + 3.0 * h * radius / 8.0);
    MassProperties::new(m_cyl + m_sph, Mat3::from_diagonal(Vec3::new(ixz, iy, ixz)))
}

/// Volume, center of mass and unit-density inertia of a closed, outward
/// oriented triangle soup.
pub(crate) fn closed_mesh(triangles: impl Iterator<Item = [Vec3; 3]>, reference: Vec3) -> (f32, Vec3, Mat3) {
    let canonical = Mat3::from_cols(
        Vec3::new(2.0, 1.0, 1.0),
        Vec3::new(1.0, 2.0, 1.0),
        Vec3::new(1.0, 1.0, 2.0),
    ) * (1.0 / 120.0);

    let mut volume = 0.0;
    let mut weighted_center = Vec3::ZERO;
    let mut covariance = Mat3::ZERO;
    for [a, b, c] in triangles {
        let (a, b, c) = (a - reference, b - reference, c - reference);
        let m = Mat3::from_cols(a, b, c);
        let det = m.determinant();
        let tet_volume = det / 6.0;
        volume += tet_volume;
        weighted_center += (a + b + c) * (tet_volume / 4.0);
        covariance += (m * canonical * m.transpose()) * det;
    }
    if volume <= f32::EPSILON {
        return (0.0, reference, Mat3::ZERO);
    }
    let com = weighted_center / volume;
    let outer = Mat3::from_cols(com * com.x, com * com.y, com * com.z);
    let centered = covariance - outer * volume;
    let trace = centered.x_axis.x + centered.y_axis.y + centered.z_axis.z;
    let inertia = Mat3::IDENTITY * trace - centered;
    (volume, reference + com, inertia)
}

//! Contact manifolds: fixed capacity point sets plus the shared normal.

use glam::Vec3;

use crate::body::BodyId;
use crate::shapes::SubShapeId;
use crate::types::RVec3;

/// Most points a manifold can hold before reduction.
pub const MAX_CONTACT_POINTS: usize = 64;

/// Fixed capacity list of points. Pushing past capacity drops the point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContactPoints {
    len: usize,
    points: [Vec3; MAX_CONTACT_POINTS],
}

impl ContactPoints {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            len: 0,
            points: [Vec3::ZERO; MAX_CONTACT_POINTS],
        }
    }

    /// Returns `false` when the list was full.
    pub fn push(&mut self, point: Vec3) -> bool {
        if self.len == MAX_CONTACT_POINTS {
            return false;
        }
        self.points[self.len] = point;
        self.len += 1;
        true
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Vec3] {
        &self.points[..self.len]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }
}

impl Default for ContactPoints {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<Vec3> for ContactPoints {
    fn from_iter<I: IntoIterator<Item = Vec3>>(iter: I) -> Self {
        let mut points = Self::new();
        for p in iter {
            if !points.push(p) {
                break;
            }
        }
        points
    }
}

/// How two leaves of two bodies touch.
///
/// Points are stored relative to `base_offset` so they stay precise in
/// double precision worlds. `points_on_1[i]` and `points_on_2[i]` form a
/// pair; the normal points from body 1 towards body 2.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContactManifold {
    pub body1: BodyId,
    pub body2: BodyId,
    pub sub_shape_id1: SubShapeId,
    pub sub_shape_id2: SubShapeId,
    pub base_offset: RVec3,
    pub world_space_normal: Vec3,
    /// Positive when penetrating, negative for speculative contacts.
    pub penetration_depth: f32,
    pub points_on_1: ContactPoints,
    pub points_on_2: ContactPoints,
}

impl ContactManifold {
    #[must_use]
    pub fn num_points(&self) -> usize {
        self.points_on_1.len().min(self.points_on_2.len())
    }

    /// World position of contact point `index` on body 1.
    #[must_use]
    pub fn world_point_on_1(&self, index: usize) -> RVec3 {
        self.base_offset + crate::types::to_real(self.points_on_1.as_slice()[index])
    }

    /// World position of contact point `index` on body 2.
    #[must_use]
    pub fn world_point_on_2(&self, index: usize) -> RVec3 {
        self.base_offset + crate::types::to_real(self.points_on_2.as_slice()[index])
    }

    /// Keeps at most four points that span the contact area: the deepest
    /// point, the point furthest from it, and the two points that maximise
    /// the contact polygon on either side of that line.
    pub fn reduce(&mut self) {
        let n = self.num_points();
        if n <= 4 {
            return;
        }
        let normal = self.world_space_normal;
        let p1 = self.points_on_1.as_slice();
        let p2 = self.points_on_2.as_slice();
        let depth = |i: usize| (p1[i] - p2[i]).dot(normal);

        let first = (0..n).max_by(|&a, &b| depth(a).total_cmp(&depth(b))).unwrap_or(0);
        let second = (0..n)
            .max_by(|&a, &b| {
                p1[a]
                    .distance_squared(p1[first])
                    .total_cmp(&p1[b].distance_squared(p1[first]))
            })
            .unwrap_or(0);
        let area = |i: usize| (p1[second] - p1[first]).cross(p1[i] - p1[first]).dot(normal);
        let third = (0..n).max_by(|&a, &b| area(a).total_cmp(&area(b))).unwrap_or(0);
        let fourth = (0..n).min_by(|&a, &b| area(a).total_cmp(&area(b))).unwrap_or(0);

        let mut keep: Vec<usize> = Vec::with_capacity(4);
        for i in [first, second, third, fourth] {
            if !keep.contains(&i) {
                keep.push(i);
            }
        }
        let new1: ContactPoints = keep.iter().map(|&i| p1[i]).collect();
        let new2: ContactPoints = keep.iter().map(|&i| p2[i]).collect();
        self.points_on_1 = new1;
        self.points_on_2 = new2;
    }
}

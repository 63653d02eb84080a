//! Gilbert-Johnson-Keerthi distance queries on the Minkowski difference of
//! two placed convex shapes.
//!
//! [`closest_points`] works on the core shapes (convex radius excluded) and
//! reports their closest points. [`intersect`] is the boolean variant on the
//! full shapes and returns a tetrahedron enclosing the origin to seed EPA.

use glam::Vec3;

use crate::shapes::ConvexShape;
use crate::types::Isometry;

const MAX_ITERATIONS: usize = 64;
/// Squared distance below which the cores are treated as touching.
const TOUCH_EPSILON_SQ: f32 = 1.0e-10;
/// Relative distance improvement below which iteration stops.
const RELATIVE_TOLERANCE: f32 = 1.0e-5;

/// A convex shape placed in the space of the pair being tested.
pub(crate) struct PlacedConvex<'a> {
    pub shape: &'a dyn ConvexShape,
    pub transform: Isometry,
}

impl PlacedConvex<'_> {
    pub fn support_core(&self, direction: Vec3) -> Vec3 {
        let local = self.transform.inverse_transform_vector(direction);
        self.transform.transform_point(self.shape.support_core(local))
    }

    pub fn support(&self, direction: Vec3) -> Vec3 {
        let local = self.transform.inverse_transform_vector(direction);
        self.transform.transform_point(self.shape.support(local))
    }

    pub fn radius(&self) -> f32 {
        self.shape.convex_radius()
    }
}

/// Vertex of the Minkowski difference `A - B` with the points that made it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct SupportPoint {
    pub w: Vec3,
    pub a: Vec3,
    pub b: Vec3,
}

impl SupportPoint {
    const ZERO: Self = Self {
        w: Vec3::ZERO,
        a: Vec3::ZERO,
        b: Vec3::ZERO,
    };
}

pub(crate) fn support_point(a: &PlacedConvex<'_>, b: &PlacedConvex<'_>, direction: Vec3, core: bool) -> SupportPoint {
    let (pa, pb) = if core {
        (a.support_core(direction), b.support_core(-direction))
    } else {
        (a.support(direction), b.support(-direction))
    };
    SupportPoint { w: pa - pb, a: pa, b: pb }
}

fn initial_direction(a: &PlacedConvex<'_>, b: &PlacedConvex<'_>) -> Vec3 {
    (a.transform.translation - b.transform.translation)
        .try_normalize()
        .unwrap_or(Vec3::X)
}

/// Closest points between the cores of two shapes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct ClosestPoints {
    pub distance: f32,
    pub point_a: Vec3,
    pub point_b: Vec3,
}

#[derive(Clone, Copy, Debug)]
struct Simplex {
    points: [SupportPoint; 4],
    weights: [f32; 4],
    len: usize,
}

impl Simplex {
    fn new(first: SupportPoint) -> Self {
        let mut points = [SupportPoint::ZERO; 4];
        points[0] = first;
        Self {
            points,
            weights: [1.0, 0.0, 0.0, 0.0],
            len: 1,
        }
    }

    fn contains(&self, w: Vec3) -> bool {
        self.points[..self.len].iter().any(|p| p.w.distance_squared(w) < 1.0e-12)
    }

    fn push(&mut self, p: SupportPoint) {
        self.points[self.len] = p;
        self.len += 1;
    }

    fn set(&mut self, entries: &[(SupportPoint, f32)]) {
        self.len = entries.len();
        for (i, (p, w)) in entries.iter().enumerate() {
            self.points[i] = *p;
            self.weights[i] = *w;
        }
    }

    fn closest(&self) -> Vec3 {
        (0..self.len).map(|i| self.points[i].w * self.weights[i]).sum()
    }

    fn witnesses(&self) -> (Vec3, Vec3) {
        (0..self.len).fold((Vec3::ZERO, Vec3::ZERO), |(pa, pb), i| {
            (pa + self.points[i].a * self.weights[i], pb + self.points[i].b * self.weights[i])
        })
    }

    /// Reduces the simplex to the smallest feature containing the point
    /// closest to the origin. Returns `false` when the origin is enclosed.
    fn reduce(&mut self) -> bool {
        let p = self.points;
        match self.len {
            1 => {
                self.weights[0] = 1.0;
                true
            }
            2 => {
                let entries = closest_on_segment(p[0], p[1]);
                self.set(&entries);
                true
            }
            3 => {
                let entries = closest_on_triangle(p[0], p[1], p[2]);
                self.set(&entries);
                true
            }
            _ => match closest_on_tetrahedron(p[0], p[1], p[2], p[3]) {
                Some(entries) => {
                    self.set(&entries);
                    true
                }
                None => false,
            },
        }
    }
}

type Feature = Vec<(SupportPoint, f32)>;

fn closest_on_segment(a: SupportPoint, b: SupportPoint) -> Feature {
    let ab = b.w - a.w;
    let len_sq = ab.length_squared();
    if len_sq < 1.0e-20 {
        return vec![(a, 1.0)];
    }
    let t = (-a.w).dot(ab) / len_sq;
    if t <= 0.0 {
        vec![(a, 1.0)]
    } else if t >= 1.0 {
        vec![(b, 1.0)]
    } else {
        vec![(a, 1.0 - t), (b, t)]
    }
}

/// Voronoi region walk of the triangle for the origin.
fn closest_on_triangle(a: SupportPoint, b: SupportPoint, c: SupportPoint) -> Feature {
    let ab = b.w - a.w;
    let ac = c.w - a.w;
    let ap = -a.w;
    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return vec![(a, 1.0)];
    }
    let bp = -b.w;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return vec![(b, 1.0)];
    }
    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return vec![(a, 1.0 - v), (b, v)];
    }
    let cp = -c.w;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return vec![(c, 1.0)];
    }
    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return vec![(a, 1.0 - w), (c, w)];
    }
    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return vec![(b, 1.0 - w), (c, w)];
    }
    let sum = va + vb + vc;
    if sum.abs() < 1.0e-20 {
        // Degenerate triangle: fall back to its best edge.
        return [closest_on_segment(a, b), closest_on_segment(a, c), closest_on_segment(b, c)]
            .into_iter()
            .min_by(|x, y| feature_distance_sq(x).total_cmp(&feature_distance_sq(y)))
            .unwrap_or_else(|| vec![(a, 1.0)]);
    }
    let v = vb / sum;
    let w = vc / sum;
    vec![(a, 1.0 - v - w), (b, v), (c, w)]
}

fn feature_distance_sq(feature: &Feature) -> f32 {
    feature.iter().map(|(p, w)| p.w * *w).sum::<Vec3>().length_squared()
}

/// Closest feature of the tetrahedron, `None` when it contains the origin.
fn closest_on_tetrahedron(a: SupportPoint, b: SupportPoint, c: SupportPoint, d: SupportPoint) -> Option<Feature> {
    let faces = [(a, b, c, d), (a, c, d, b), (a, d, b, c), (b, d, c, a)];
    let mut best: Option<(f32, Feature)> = None;
    for (p, q, r, opposite) in faces {
        let n = (q.w - p.w).cross(r.w - p.w);
        let sign_origin = n.dot(-p.w);
        let sign_opposite = n.dot(opposite.w - p.w);
        // A flat tetrahedron has no inside; every face is a candidate.
        let outside = sign_origin * sign_opposite < 0.0 || sign_opposite.abs() < 1.0e-12;
        if !outside {
            continue;
        }
        let feature = closest_on_triangle(p, q, r);
        let dist = feature_distance_sq(&feature);
        if best.as_ref().map_or(true, |(bd, _)| dist < *bd) {
            best = Some((dist, feature));
        }
    }
    best.map(|(_, f)| f)
}

/// Closest points between the cores of `a` and `b`. `None` when the cores
/// overlap or touch.
pub(crate) fn closest_points(a: &PlacedConvex<'_>, b: &PlacedConvex<'_>) -> Option<ClosestPoints> {
    let mut simplex = Simplex::new(support_point(a, b, initial_direction(a, b), true));
    let mut v = simplex.closest();

    for _ in 0..MAX_ITERATIONS {
        let vv = v.length_squared();
        if vv < TOUCH_EPSILON_SQ {
            return None;
        }
        let p = support_point(a, b, -v, true);
        if vv - v.dot(p.w) <= RELATIVE_TOLERANCE * vv || simplex.contains(p.w) {
            break;
        }
        simplex.push(p);
        if !simplex.reduce() {
            return None;
        }
        let next = simplex.closest();
        if next.length_squared() >= vv {
            // No progress; keep the previous estimate.
            break;
        }
        v = next;
    }

    if v.length_squared() < TOUCH_EPSILON_SQ {
        return None;
    }
    let (point_a, point_b) = simplex.witnesses();
    Some(ClosestPoints {
        distance: v.length(),
        point_a,
        point_b,
    })
}

/// Boolean GJK on the full shapes. Returns a non degenerate tetrahedron of
/// the Minkowski difference that encloses the origin.
pub(crate) fn intersect(a: &PlacedConvex<'_>, b: &PlacedConvex<'_>) -> Option<[SupportPoint; 4]> {
    let first = support_point(a, b, initial_direction(a, b), false);
    let mut simplex: Vec<SupportPoint> = vec![first];
    let mut direction = -first.w;
    if direction.length_squared() < 1.0e-12 {
        direction = Vec3::X;
    }

    for _ in 0..MAX_ITERATIONS {
        let p = support_point(a, b, direction, false);
        if p.w.dot(direction) < 0.0 {
            return None;
        }
        simplex.push(p);
        if evolve(&mut simplex, &mut direction) {
            let [s0, s1, s2, s3] = [simplex[0], simplex[1], simplex[2], simplex[3]];
            let volume = (s1.w - s0.w).cross(s2.w - s0.w).dot(s3.w - s0.w);
            return (volume.abs() > 1.0e-9).then_some([s0, s1, s2, s3]);
        }
    }
    None
}

/// One step of the boolean simplex evolution. The newest point is last.
/// Returns `true` once a tetrahedron encloses the origin.
fn evolve(simplex: &mut Vec<SupportPoint>, direction: &mut Vec3) -> bool {
    match simplex.len() {
        2 => {
            let (b, a) = (simplex[0], simplex[1]);
            *direction = line_direction(a.w, b.w, simplex, a);
            false
        }
        3 => {
            triangle_case(simplex, direction);
            false
        }
        _ => {
            let (d, c, b, a) = (simplex[0], simplex[1], simplex[2], simplex[3]);
            let ao = -a.w;
            let abc = (b.w - a.w).cross(c.w - a.w);
            let acd = (c.w - a.w).cross(d.w - a.w);
            let adb = (d.w - a.w).cross(b.w - a.w);
            // Orient each face normal away from the opposite vertex.
            let away = |n: Vec3, opposite: Vec3| if n.dot(opposite - a.w) > 0.0 { -n } else { n };
            let abc = away(abc, d.w);
            let acd = away(acd, b.w);
            let adb = away(adb, c.w);
            if abc.dot(ao) > 0.0 {
                *simplex = vec![c, b, a];
                triangle_case(simplex, direction);
                false
            } else if acd.dot(ao) > 0.0 {
                *simplex = vec![d, c, a];
                triangle_case(simplex, direction);
                false
            } else if adb.dot(ao) > 0.0 {
                *simplex = vec![b, d, a];
                triangle_case(simplex, direction);
                false
            } else {
                true
            }
        }
    }
}

/// Direction towards the origin from segment `ab` (`a` newest). Collapses
/// the simplex to `a` when the origin lies beyond it.
fn line_direction(a: Vec3, b: Vec3, simplex: &mut Vec<SupportPoint>, newest: SupportPoint) -> Vec3 {
    let ab = b - a;
    let ao = -a;
    if ab.dot(ao) > 0.0 {
        let d = ab.cross(ao).cross(ab);
        if d.length_squared() > 1.0e-12 {
            d
        } else {
            // Origin on the segment; any perpendicular works.
            ab.any_orthogonal_vector()
        }
    } else {
        *simplex = vec![newest];
        ao
    }
}

fn triangle_case(simplex: &mut Vec<SupportPoint>, direction: &mut Vec3) {
    let (c, b, a) = (simplex[0], simplex[1], simplex[2]);
    let ab = b.w - a.w;
    let ac = c.w - a.w;
    let ao = -a.w;
    let abc = ab.cross(ac);

    if abc.cross(ac).dot(ao) > 0.0 {
        if ac.dot(ao) > 0.0 {
            *simplex = vec![c, a];
            *direction = ac.cross(ao).cross(ac);
            if direction.length_squared() < 1.0e-12 {
                *direction = ac.any_orthogonal_vector();
            }
        } else {
            *simplex = vec![b, a];
            *direction = line_direction(a.w, b.w, simplex, a);
        }
    } else if ab.cross(abc).dot(ao) > 0.0 {
        *simplex = vec![b, a];
        *direction = line_direction(a.w, b.w, simplex, a);
    } else if abc.dot(ao) >= 0.0 {
        *direction = abc;
    } else {
        *simplex = vec![b, c, a];
        *direction = -abc;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::{BoxShape, SphereShape};
    use glam::Quat;

    fn sphere(radius: f32) -> SphereShape {
        SphereShape { radius, density: 1.0 }
    }

    fn cube(half: f32, convex_radius: f32) -> BoxShape {
        BoxShape {
            half_extent: Vec3::splat(half),
            convex_radius,
            density: 1.0,
        }
    }

    #[test]
    fn separated_boxes_distance() {
        let a = cube(1.0, 0.0);
        let b = cube(1.0, 0.0);
        let pa = PlacedConvex { shape: &a, transform: Isometry::IDENTITY };
        let pb = PlacedConvex {
            shape: &b,
            transform: Isometry::new(Vec3::new(3.5, 0.2, -0.1), Quat::IDENTITY),
        };
        let result = closest_points(&pa, &pb).unwrap();
        assert!((result.distance - 1.5).abs() < 1e-4, "{result:?}");
        assert!((result.point_a.x - 1.0).abs() < 1e-4);
        assert!((result.point_b.x - 2.5).abs() < 1e-4);
    }

    #[test]
    fn sphere_cores_are_points() {
        let a = sphere(1.0);
        let pa = PlacedConvex { shape: &a, transform: Isometry::IDENTITY };
        let pb = PlacedConvex {
            shape: &a,
            transform: Isometry::from_translation(Vec3::new(0.0, 1.5, 0.0)),
        };
        // Full spheres overlap but the core points are 1.5 apart.
        let result = closest_points(&pa, &pb).unwrap();
        assert!((result.distance - 1.5).abs() < 1e-5);
        assert!(intersect(&pa, &pb).is_some());
    }

    #[test]
    fn overlapping_cores_report_none() {
        let a = cube(1.0, 0.05);
        let pa = PlacedConvex { shape: &a, transform: Isometry::IDENTITY };
        let pb = PlacedConvex {
            shape: &a,
            transform: Isometry::new(Vec3::new(0.5, 0.3, 0.0), Quat::from_rotation_y(0.4)),
        };
        assert!(closest_points(&pa, &pb).is_none());
        let tetra = intersect(&pa, &pb).unwrap();
        assert_eq!(tetra.len(), 4);
    }

    #[test]
    fn disjoint_shapes_do_not_intersect() {
        let a = cube(0.5, 0.0);
        let pa = PlacedConvex { shape: &a, transform: Isometry::IDENTITY };
        let pb = PlacedConvex {
            shape: &a,
            transform: Isometry::from_translation(Vec3::new(0.0, 0.0, 2.0)),
        };
        assert!(intersect(&pa, &pb).is_none());
    }
}

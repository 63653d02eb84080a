//! Expanding polytope penetration depth.

use glam::Vec3;

use super::gjk::{self, PlacedConvex, SupportPoint};

const MAX_ITERATIONS: usize = 64;
const TOLERANCE: f32 = 1.0e-4;

/// Deepest penetration of two overlapping shapes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Penetration {
    /// Unit normal from `a` towards `b`.
    pub normal: Vec3,
    pub depth: f32,
    /// Deepest point of `a` inside `b`.
    pub point_a: Vec3,
    /// Deepest point of `b` inside `a`.
    pub point_b: Vec3,
}

#[derive(Clone, Copy, Debug)]
struct Face {
    vertices: [usize; 3],
    normal: Vec3,
    distance: f32,
}

fn make_face(points: &[SupportPoint], mut vertices: [usize; 3]) -> Option<Face> {
    let [a, b, c] = vertices.map(|i| points[i].w);
    let mut normal = (b - a).cross(c - a).try_normalize()?;
    let mut distance = normal.dot(a);
    if distance < 0.0 {
        vertices.swap(1, 2);
        normal = -normal;
        distance = -distance;
    }
    Some(Face {
        vertices,
        normal,
        distance,
    })
}

/// Adds `edge` to the horizon, or cancels it against its twin.
fn add_edge(horizon: &mut Vec<(usize, usize)>, edge: (usize, usize)) {
    if let Some(i) = horizon.iter().position(|&(a, b)| a == edge.1 && b == edge.0) {
        horizon.swap_remove(i);
    } else {
        horizon.push(edge);
    }
}

/// Penetration of `a` and `b` along the minimum translation distance of
/// their Minkowski difference. `None` when the shapes are disjoint.
pub(crate) fn penetration(a: &PlacedConvex<'_>, b: &PlacedConvex<'_>) -> Option<Penetration> {
    let tetra = gjk::intersect(a, b)?;
    let mut points: Vec<SupportPoint> = tetra.to_vec();
    let mut faces: Vec<Face> = [[0, 1, 2], [0, 3, 1], [0, 2, 3], [1, 3, 2]]
        .into_iter()
        .filter_map(|v| make_face(&points, v))
        .collect();
    if faces.len() < 4 {
        return None;
    }

    let mut closest = faces[0];
    for _ in 0..MAX_ITERATIONS {
        closest = *faces
            .iter()
            .min_by(|x, y| x.distance.total_cmp(&y.distance))?;
        let p = gjk::support_point(a, b, closest.normal, false);
        if p.w.dot(closest.normal) - closest.distance < TOLERANCE {
            break;
        }

        let index = points.len();
        points.push(p);
        let mut horizon: Vec<(usize, usize)> = Vec::new();
        faces.retain(|face| {
            let visible = face.normal.dot(p.w - points[face.vertices[0]].w) > 1.0e-7;
            if visible {
                let [i, j, k] = face.vertices;
                add_edge(&mut horizon, (i, j));
                add_edge(&mut horizon, (j, k));
                add_edge(&mut horizon, (k, i));
            }
            !visible
        });
        for (i, j) in horizon {
            if let Some(face) = make_face(&points, [i, j, index]) {
                faces.push(face);
            }
        }
        if faces.is_empty() {
            break;
        }
    }

    let [ia, ib, ic] = closest.vertices;
    let projected = closest.normal * closest.distance;
    let (u, v, w) = barycentric(points[ia].w, points[ib].w, points[ic].w, projected);
    let point_a = points[ia].a * u + points[ib].a * v + points[ic].a * w;
    let point_b = points[ia].b * u + points[ib].b * v + points[ic].b * w;

    // Support of A - B along a face normal pairs the point of A furthest
    // towards B with the point of B furthest towards A.
    Some(Penetration {
        normal: closest.normal,
        depth: closest.distance,
        point_a,
        point_b,
    })
}

fn barycentric(a: Vec3, b: Vec3, c: Vec3, p: Vec3) -> (f32, f32, f32) {
    let v0 = b - a;
    let v1 = c - a;
    let v2 = p - a;
    let d00 = v0.dot(v0);
    let d01 = v0.dot(v1);
    let d11 = v1.dot(v1);
    let d20 = v2.dot(v0);
    let d21 = v2.dot(v1);
    let denom = d00 * d11 - d01 * d01;
    if denom.abs() < 1.0e-20 {
        return (1.0, 0.0, 0.0);
    }
    let v = (d11 * d20 - d01 * d21) / denom;
    let w = (d00 * d21 - d01 * d20) / denom;
    (1.0 - v - w, v, w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::{BoxShape, SphereShape};
    use crate::types::Isometry;

    #[test]
    fn stacked_boxes_penetrate_along_y() {
        let cube = BoxShape {
            half_extent: Vec3::splat(0.5),
            convex_radius: 0.0,
            density: 1.0,
        };
        let a = PlacedConvex { shape: &cube, transform: Isometry::IDENTITY };
        let b = PlacedConvex {
            shape: &cube,
            transform: Isometry::from_translation(Vec3::new(0.1, 0.9, -0.05)),
        };
        let pen = penetration(&a, &b).unwrap();
        assert!((pen.depth - 0.1).abs() < 1e-3, "{pen:?}");
        assert!((pen.normal - Vec3::Y).length() < 1e-3);
        assert!((pen.point_a.y - 0.5).abs() < 1e-3);
        assert!((pen.point_b.y - 0.4).abs() < 1e-3);
    }

    #[test]
    fn deep_sphere_overlap() {
        let ball = SphereShape { radius: 1.0, density: 1.0 };
        let a = PlacedConvex { shape: &ball, transform: Isometry::IDENTITY };
        let b = PlacedConvex {
            shape: &ball,
            transform: Isometry::from_translation(Vec3::new(0.5, 0.0, 0.0)),
        };
        let pen = penetration(&a, &b).unwrap();
        assert!((pen.depth - 1.5).abs() < 5e-2, "{pen:?}");
        assert!(pen.normal.x > 0.99);
    }
}

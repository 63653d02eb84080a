//! General convex vs convex contacts: GJK on the cores, EPA when the cores
//! overlap, then face clipping to turn the deepest point into a manifold.

use glam::Vec3;

use super::epa;
use super::gjk::{self, PlacedConvex};
use super::manifold::ContactPoints;
use super::{CollideSettings, LeafContact, LeafManifold};
use crate::shapes::ConvexLeaf;
use crate::types::Aabb;

pub(crate) fn placed<'a>(leaf: &'a ConvexLeaf<'_>) -> PlacedConvex<'a> {
    PlacedConvex {
        shape: leaf.shape.convex(),
        transform: leaf.transform,
    }
}

/// Pair space bounds of a leaf from six support queries.
pub(crate) fn leaf_bounds(leaf: &ConvexLeaf<'_>) -> Aabb {
    let shape = placed(leaf);
    let mut min = Vec3::ZERO;
    let mut max = Vec3::ZERO;
    for (axis, dir) in [Vec3::X, Vec3::Y, Vec3::Z].into_iter().enumerate() {
        max[axis] = shape.support(dir)[axis];
        min[axis] = shape.support(-dir)[axis];
    }
    Aabb::new(min, max)
}

/// Deepest contact of two convex shapes, or `None` when they are further
/// apart than `max_separation`.
pub(crate) fn collide_convex(a: &PlacedConvex<'_>, b: &PlacedConvex<'_>, max_separation: f32) -> Option<LeafContact> {
    let (ra, rb) = (a.radius(), b.radius());
    let closest = gjk::closest_points(a, b);
    if let Some(cp) = closest.filter(|cp| cp.distance > 1.0e-4) {
        let separation = cp.distance - ra - rb;
        if separation > max_separation {
            return None;
        }
        let normal = (cp.point_b - cp.point_a) / cp.distance;
        return Some(LeafContact {
            normal,
            depth: -separation,
            point_a: cp.point_a + normal * ra,
            point_b: cp.point_b - normal * rb,
        });
    }

    if let Some(pen) = epa::penetration(a, b) {
        return Some(LeafContact {
            normal: pen.normal,
            depth: pen.depth,
            point_a: pen.point_a,
            point_b: pen.point_b,
        });
    }

    // Cores touch but EPA found no usable polytope; separate along the
    // line between the shape origins.
    closest.map(|cp| {
        let normal = (b.transform.translation - a.transform.translation)
            .try_normalize()
            .unwrap_or(Vec3::Y);
        LeafContact {
            normal,
            depth: ra + rb - cp.distance,
            point_a: cp.point_a + normal * ra,
            point_b: cp.point_b - normal * rb,
        }
    })
}

/// Contact detection for any pair of leaves.
pub(crate) fn collide_leaves(a: &ConvexLeaf<'_>, b: &ConvexLeaf<'_>, settings: &CollideSettings) -> Option<LeafManifold> {
    let contact = collide_convex(&placed(a), &placed(b), settings.max_separation)?;
    Some(build_manifold(a, b, &contact, settings))
}

/// Expands a single deepest contact into a manifold by clipping the
/// supporting faces of both leaves against each other.
pub(crate) fn build_manifold(
    a: &ConvexLeaf<'_>,
    b: &ConvexLeaf<'_>,
    contact: &LeafContact,
    settings: &CollideSettings,
) -> LeafManifold {
    let n = contact.normal;
    let face_a = supporting_face(a, n);
    let face_b = supporting_face(b, -n);

    let mut points_a = ContactPoints::new();
    let mut points_b = ContactPoints::new();
    let alignment = |face: &[Vec3], dir: Vec3| face_normal(face).map_or(0.0, |fnrm| fnrm.dot(dir).abs());

    let use_a_as_reference = match (face_a.len(), face_b.len()) {
        (la, lb) if la >= 3 && lb >= 3 => Some(alignment(&face_a, n) >= alignment(&face_b, n)),
        (la, _) if la >= 3 => Some(true),
        (_, lb) if lb >= 3 => Some(false),
        (2, lb) if lb >= 2 => Some(true),
        _ => None,
    };
    match use_a_as_reference {
        Some(true) => clip_faces(&face_a, n, &face_b, settings.max_separation, &mut points_a, &mut points_b),
        Some(false) => clip_faces(&face_b, -n, &face_a, settings.max_separation, &mut points_b, &mut points_a),
        None => {}
    }

    dedupe(&mut points_a, &mut points_b, settings.manifold_tolerance);
    if points_a.is_empty() {
        points_a.push(contact.point_a);
        points_b.push(contact.point_b);
    }
    LeafManifold {
        normal: n,
        depth: contact.depth,
        points_a,
        points_b,
    }
}

fn supporting_face(leaf: &ConvexLeaf<'_>, direction: Vec3) -> Vec<Vec3> {
    let local = leaf.transform.inverse_transform_vector(direction);
    leaf.shape
        .convex()
        .supporting_face(local)
        .into_iter()
        .map(|p| leaf.transform.transform_point(p))
        .collect()
}

/// Newell normal of a polygon with at least three points.
fn face_normal(face: &[Vec3]) -> Option<Vec3> {
    if face.len() < 3 {
        return None;
    }
    let mut n = Vec3::ZERO;
    for (i, p) in face.iter().enumerate() {
        let q = face[(i + 1) % face.len()];
        n += Vec3::new(
            (p.y - q.y) * (p.z + q.z),
            (p.z - q.z) * (p.x + q.x),
            (p.x - q.x) * (p.y + q.y),
        );
    }
    n.try_normalize()
}

/// Clips `incident` against the side planes of `reference` (as seen along
/// `normal`, which points from the reference shape to the incident one) and
/// pairs every surviving point with its projection onto the reference face.
fn clip_faces(
    reference: &[Vec3],
    normal: Vec3,
    incident: &[Vec3],
    max_separation: f32,
    out_reference: &mut ContactPoints,
    out_incident: &mut ContactPoints,
) {
    let origin = reference[0];
    let plane_normal = match face_normal(reference) {
        Some(fnrm) if fnrm.dot(normal) < 0.0 => -fnrm,
        Some(fnrm) => fnrm,
        None => {
            let edge = reference[1] - reference[0];
            let perp = edge.cross(normal.cross(edge));
            match perp.try_normalize() {
                Some(p) if p.dot(normal) < 0.0 => -p,
                Some(p) => p,
                None => return,
            }
        }
    };
    let denominator = normal.dot(plane_normal);
    if denominator < 1.0e-3 {
        return;
    }

    let mut clipped = incident.to_vec();
    if reference.len() >= 3 {
        // Walk the reference counter clockwise around `normal`.
        let ccw = face_normal(reference).map_or(true, |fnrm| fnrm.dot(normal) >= 0.0);
        let count = reference.len();
        for i in 0..count {
            let (p, q) = if ccw {
                (reference[i], reference[(i + 1) % count])
            } else {
                (reference[(i + 1) % count], reference[i])
            };
            clipped = clip_against_plane(&clipped, p, normal.cross(q - p));
            if clipped.is_empty() {
                return;
            }
        }
    } else {
        let edge = reference[1] - reference[0];
        let edge = edge - normal * normal.dot(edge);
        clipped = clip_against_plane(&clipped, reference[0], edge);
        clipped = clip_against_plane(&clipped, reference[1], -edge);
    }

    for q in clipped {
        let t = (q - origin).dot(plane_normal) / denominator;
        if t <= max_separation {
            out_reference.push(q - normal * t);
            out_incident.push(q);
        }
    }
}

/// Keeps the part of `points` on the positive side of the plane through
/// `origin` with normal `inward`. Two points are treated as a segment,
/// anything longer as a closed polygon.
fn clip_against_plane(points: &[Vec3], origin: Vec3, inward: Vec3) -> Vec<Vec3> {
    let side = |p: Vec3| (p - origin).dot(inward);
    let intersect = |p: Vec3, q: Vec3, dp: f32, dq: f32| p + (q - p) * (dp / (dp - dq));

    match points.len() {
        0 => Vec::new(),
        1 => points.iter().copied().filter(|p| side(*p) >= 0.0).collect(),
        2 => {
            let (p, q) = (points[0], points[1]);
            let (dp, dq) = (side(p), side(q));
            match (dp >= 0.0, dq >= 0.0) {
                (true, true) => vec![p, q],
                (true, false) => vec![p, intersect(p, q, dp, dq)],
                (false, true) => vec![intersect(p, q, dp, dq), q],
                (false, false) => Vec::new(),
            }
        }
        count => {
            let mut out = Vec::with_capacity(count + 1);
            for i in 0..count {
                let p = points[i];
                let q = points[(i + 1) % count];
                let (dp, dq) = (side(p), side(q));
                if dp >= 0.0 {
                    out.push(p);
                }
                if (dp >= 0.0) != (dq >= 0.0) {
                    out.push(intersect(p, q, dp, dq));
                }
            }
            out
        }
    }
}

/// Removes point pairs closer than `tolerance` to an earlier pair.
fn dedupe(points_a: &mut ContactPoints, points_b: &mut ContactPoints, tolerance: f32) {
    let tol_sq = tolerance * tolerance;
    let mut kept_a = ContactPoints::new();
    let mut kept_b = ContactPoints::new();
    for (pa, pb) in points_a.as_slice().iter().zip(points_b.as_slice()) {
        if kept_a.as_slice().iter().any(|k| k.distance_squared(*pa) < tol_sq) {
            continue;
        }
        kept_a.push(*pa);
        kept_b.push(*pb);
    }
    *points_a = kept_a;
    *points_b = kept_b;
}

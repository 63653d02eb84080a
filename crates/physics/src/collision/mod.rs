//! # Narrow Phase
//!
//! Turns a body pair from the broad phase into contact manifolds. Shapes are
//! split into convex leaves, every overlapping leaf pair is routed through
//! the [`CollisionDispatcher`], and the result is expressed relative to the
//! position of the first body.

mod convex_pair;
mod dispatcher;
mod epa;
mod gjk;
mod manifold;
mod primitives;

use glam::Vec3;

pub(crate) use dispatcher::CollisionDispatcher;
pub use manifold::{ContactManifold, ContactPoints, MAX_CONTACT_POINTS};

use crate::body::Body;
use crate::shapes::{ConvexLeaf, SubShapeIdCreator};

/// Tolerances shared by every detector of a step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct CollideSettings {
    /// Shapes closer than this produce speculative contacts.
    pub max_separation: f32,
    /// Manifold points closer than this are merged.
    pub manifold_tolerance: f32,
}

/// Deepest point pair of two leaves.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct LeafContact {
    /// From leaf `a` towards leaf `b`.
    pub normal: Vec3,
    /// Positive when penetrating.
    pub depth: f32,
    pub point_a: Vec3,
    pub point_b: Vec3,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct LeafManifold {
    pub normal: Vec3,
    pub depth: f32,
    pub points_a: ContactPoints,
    pub points_b: ContactPoints,
}

impl LeafManifold {
    pub fn single(contact: LeafContact) -> Self {
        let mut points_a = ContactPoints::new();
        let mut points_b = ContactPoints::new();
        points_a.push(contact.point_a);
        points_b.push(contact.point_b);
        Self {
            normal: contact.normal,
            depth: contact.depth,
            points_a,
            points_b,
        }
    }
}

/// Collides every leaf of `body1` with every leaf of `body2` and appends one
/// manifold per touching leaf pair. Manifolds with more than four points are
/// reduced when `reduce` is set.
pub(crate) fn collide_bodies(
    dispatcher: &CollisionDispatcher,
    body1: &Body,
    body2: &Body,
    settings: &CollideSettings,
    reduce: bool,
    out: &mut Vec<ContactManifold>,
) {
    let base = body1.position();
    let t1 = body1.transform_relative_to(base);
    let t2 = body2.transform_relative_to(base);
    let bounds1 = body1.shape().world_bounds(&t1).expanded(settings.max_separation);
    let bounds2 = body2.shape().world_bounds(&t2).expanded(settings.max_separation);
    if !bounds1.overlaps(&bounds2) {
        return;
    }

    let mut leaves1: Vec<ConvexLeaf<'_>> = Vec::new();
    let mut leaves2: Vec<ConvexLeaf<'_>> = Vec::new();
    body1
        .shape()
        .collect_leaves(&t1, &bounds2, SubShapeIdCreator::new(), &mut leaves1);
    body2
        .shape()
        .collect_leaves(&t2, &bounds1, SubShapeIdCreator::new(), &mut leaves2);
    let bounds2: Vec<_> = leaves2.iter().map(convex_pair::leaf_bounds).collect();

    for leaf1 in &leaves1 {
        let bounds1 = convex_pair::leaf_bounds(leaf1).expanded(settings.max_separation);
        for (leaf2, leaf2_bounds) in leaves2.iter().zip(&bounds2) {
            if !bounds1.overlaps(leaf2_bounds) {
                continue;
            }
            let Some(leaf) = dispatcher.collide(leaf1, leaf2, settings) else {
                continue;
            };
            let mut manifold = ContactManifold {
                body1: body1.id(),
                body2: body2.id(),
                sub_shape_id1: leaf1.sub_shape_id,
                sub_shape_id2: leaf2.sub_shape_id,
                base_offset: base,
                world_space_normal: leaf.normal,
                penetration_depth: leaf.depth,
                points_on_1: leaf.points_a,
                points_on_2: leaf.points_b,
            };
            if reduce {
                manifold.reduce();
            }
            out.push(manifold);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{BodyCreationSettings, BodyManager};
    use crate::shapes::ShapeSettings;
    use crate::types::{BroadPhaseLayer, MotionType, RVec3};
    use glam::Quat;

    fn settings() -> CollideSettings {
        CollideSettings {
            max_separation: 0.02,
            manifold_tolerance: 1.0e-3,
        }
    }

    #[test]
    fn compound_reports_touching_children_only() {
        let ball = ShapeSettings::sphere(0.5).create().unwrap();
        let dumbbell = ShapeSettings::compound([
            (ball.clone(), Vec3::new(-2.0, 0.0, 0.0), Quat::IDENTITY),
            (ball, Vec3::new(2.0, 0.0, 0.0), Quat::IDENTITY),
        ])
        .create()
        .unwrap();
        let floor = ShapeSettings::box_shape(Vec3::new(1.0, 0.5, 1.0)).create().unwrap();

        let mut bodies = BodyManager::new(4);
        let a = bodies
            .create_body(
                &BodyCreationSettings::new(floor, RVec3::new(2.0, -0.5, 0.0), Quat::IDENTITY, MotionType::Static, 0),
                BroadPhaseLayer(0),
            )
            .unwrap();
        let b = bodies
            .create_body(
                &BodyCreationSettings::new(dumbbell, RVec3::new(0.0, 0.49, 0.0), Quat::IDENTITY, MotionType::Dynamic, 1),
                BroadPhaseLayer(1),
            )
            .unwrap();

        let mut out = Vec::new();
        let (ba, bb) = (bodies.lock_read(a).unwrap(), bodies.lock_read(b).unwrap());
        collide_bodies(&CollisionDispatcher::new(), &ba, &bb, &settings(), true, &mut out);
        assert_eq!(out.len(), 1);
        let m = out[0];
        assert_eq!(m.sub_shape_id2.pop(1).0, 1);
        assert!((m.penetration_depth - 0.01).abs() < 1e-4);
        assert_eq!(m.world_space_normal, Vec3::Y);
        let world = m.world_point_on_2(0);
        assert!((world.x - 2.0).abs() < 1e-4);
    }
}

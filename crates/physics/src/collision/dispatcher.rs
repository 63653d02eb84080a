//! Routes a pair of convex leaves to the cheapest detector for their types.

use std::collections::HashMap;

use super::convex_pair::collide_leaves;
use super::primitives::{box_vs_sphere, sphere_vs_sphere};
use super::{CollideSettings, LeafContact, LeafManifold};
use crate::shapes::{ConvexLeaf, LeafShape, ShapeType};

/// Detector for one ordered pair of leaf types.
type LeafDetector = fn(&ConvexLeaf<'_>, &ConvexLeaf<'_>, &CollideSettings) -> Option<LeafManifold>;

/// Table of specialised detectors. Pairs without an entry use GJK/EPA with
/// face clipping.
pub(crate) struct CollisionDispatcher {
    detectors: HashMap<(ShapeType, ShapeType), LeafDetector>,
}

impl CollisionDispatcher {
    pub fn new() -> Self {
        let mut dispatcher = Self {
            detectors: HashMap::new(),
        };
        dispatcher.register(ShapeType::Sphere, ShapeType::Sphere, detect_sphere_sphere);
        dispatcher.register(ShapeType::Sphere, ShapeType::Box, detect_sphere_box);
        dispatcher
    }

    /// Registers `detector` for both orderings of the pair.
    fn register(&mut self, type_a: ShapeType, type_b: ShapeType, detector: LeafDetector) {
        self.detectors.insert((type_a, type_b), detector);
        if type_a != type_b {
            self.detectors.insert((type_b, type_a), detector);
        }
    }

    pub fn collide(&self, a: &ConvexLeaf<'_>, b: &ConvexLeaf<'_>, settings: &CollideSettings) -> Option<LeafManifold> {
        let key = (a.shape.shape_type(), b.shape.shape_type());
        match self.detectors.get(&key) {
            Some(detector) => detector(a, b, settings),
            None => collide_leaves(a, b, settings),
        }
    }
}

impl Default for CollisionDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn detect_sphere_sphere(a: &ConvexLeaf<'_>, b: &ConvexLeaf<'_>, settings: &CollideSettings) -> Option<LeafManifold> {
    match (&a.shape, &b.shape) {
        (LeafShape::Sphere(sa), LeafShape::Sphere(sb)) => sphere_vs_sphere(
            a.transform.translation,
            sa.radius,
            b.transform.translation,
            sb.radius,
            settings.max_separation,
        )
        .map(LeafManifold::single),
        _ => collide_leaves(a, b, settings),
    }
}

fn detect_sphere_box(a: &ConvexLeaf<'_>, b: &ConvexLeaf<'_>, settings: &CollideSettings) -> Option<LeafManifold> {
    match (&a.shape, &b.shape) {
        (LeafShape::Box(cube), LeafShape::Sphere(ball)) => box_vs_sphere(
            cube,
            &a.transform,
            b.transform.translation,
            ball.radius,
            settings.max_separation,
        )
        .map(LeafManifold::single),
        (LeafShape::Sphere(ball), LeafShape::Box(cube)) => box_vs_sphere(
            cube,
            &b.transform,
            a.transform.translation,
            ball.radius,
            settings.max_separation,
        )
        .map(|c| {
            LeafManifold::single(LeafContact {
                normal: -c.normal,
                depth: c.depth,
                point_a: c.point_b,
                point_b: c.point_a,
            })
        }),
        _ => collide_leaves(a, b, settings),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::{BoxShape, SphereShape, SubShapeId};
    use crate::types::Isometry;
    use glam::Vec3;

    fn settings() -> CollideSettings {
        CollideSettings {
            max_separation: 0.02,
            manifold_tolerance: 1.0e-3,
        }
    }

    #[test]
    fn sphere_box_in_either_order() {
        let ball = SphereShape { radius: 0.5, density: 1.0 };
        let cube = BoxShape {
            half_extent: Vec3::new(10.0, 1.0, 10.0),
            convex_radius: 0.05,
            density: 1.0,
        };
        let sphere_leaf = ConvexLeaf {
            shape: LeafShape::Sphere(&ball),
            transform: Isometry::from_translation(Vec3::new(0.0, 1.45, 0.0)),
            sub_shape_id: SubShapeId::EMPTY,
        };
        let box_leaf = ConvexLeaf {
            shape: LeafShape::Box(&cube),
            transform: Isometry::IDENTITY,
            sub_shape_id: SubShapeId::EMPTY,
        };
        let dispatcher = CollisionDispatcher::new();

        let box_first = dispatcher.collide(&box_leaf, &sphere_leaf, &settings()).unwrap();
        assert_eq!(box_first.normal, Vec3::Y);
        let sphere_first = dispatcher.collide(&sphere_leaf, &box_leaf, &settings()).unwrap();
        assert_eq!(sphere_first.normal, Vec3::NEG_Y);
        assert!((box_first.depth - sphere_first.depth).abs() < 1e-6);
        assert_eq!(box_first.points_a.as_slice(), sphere_first.points_b.as_slice());
    }

    #[test]
    fn unregistered_pairs_fall_back_to_gjk() {
        let cube = BoxShape {
            half_extent: Vec3::splat(0.5),
            convex_radius: 0.05,
            density: 1.0,
        };
        let a = ConvexLeaf {
            shape: LeafShape::Box(&cube),
            transform: Isometry::IDENTITY,
            sub_shape_id: SubShapeId::EMPTY,
        };
        let b = ConvexLeaf {
            shape: LeafShape::Box(&cube),
            transform: Isometry::from_translation(Vec3::new(0.0, 0.0, 0.98)),
            sub_shape_id: SubShapeId::EMPTY,
        };
        let m = CollisionDispatcher::new().collide(&a, &b, &settings()).unwrap();
        assert!((m.normal - Vec3::Z).length() < 1e-3);
        assert_eq!(m.points_a.len(), 4);
    }
}

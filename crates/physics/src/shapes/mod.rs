//! # Shape Library
//!
//! Immutable collision geometry shared between bodies through [`ShapeRef`]
//! (`Arc<Shape>`). Cloning a `ShapeRef` adds a reference and dropping it
//! releases one; compound and decorated shapes hold references to their
//! children, so releasing the last owner of a parent releases the children
//! too. Shapes never point back to their parents, so shape graphs are acyclic.
//!
//! Shapes are built from [`ShapeSettings`] and validated on creation. All
//! queries take shape-local coordinates and are safe to call from any thread.

mod compound;
mod convex;
mod height_field;
mod hull;
pub mod mass;
mod mesh;
mod sub_shape_id;

use std::sync::Arc;

use glam::{Quat, Vec3};

pub use compound::{CompoundChild, CompoundShape, DecoratedShape};
pub use convex::{
    BoxShape, CapsuleShape, ConvexShape, CylinderShape, SphereShape, TriangleShape, DEFAULT_CONVEX_RADIUS,
};
pub use height_field::{HeightFieldShape, MAX_HEIGHT_FIELD_SAMPLES};
pub use hull::{ConvexHullShape, HullFace, MAX_HULL_POINTS};
pub use mass::MassProperties;
pub use mesh::MeshShape;
pub use sub_shape_id::{bits_for_count, SubShapeId, SubShapeIdCreator};

use crate::error::PhysicsError;
use crate::types::{Aabb, Isometry};

/// Shared, reference counted shape.
pub type ShapeRef = Arc<Shape>;

/// Density used when settings do not name one (kg/m³).
pub const DEFAULT_DENSITY: f32 = 1000.0;

/// Number of live references to `shape`.
#[must_use]
pub fn shape_ref_count(shape: &ShapeRef) -> usize {
    Arc::strong_count(shape)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShapeType {
    Sphere,
    Box,
    Capsule,
    Cylinder,
    ConvexHull,
    /// Also the type of a single mesh triangle during collision.
    Mesh,
    HeightField,
    Compound,
    Decorated,
}

#[derive(Clone, Debug)]
pub enum ShapeKind {
    Sphere(SphereShape),
    Box(BoxShape),
    Capsule(CapsuleShape),
    Cylinder(CylinderShape),
    ConvexHull(ConvexHullShape),
    Mesh(MeshShape),
    HeightField(HeightFieldShape),
    Compound(CompoundShape),
    Decorated(DecoratedShape),
}

/// Result of a shape-local ray cast.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShapeRayHit {
    /// Hit position as a fraction of the ray direction.
    pub fraction: f32,
    pub sub_shape_id: SubShapeId,
}

#[derive(Debug)]
pub struct Shape {
    kind: ShapeKind,
    local_bounds: Aabb,
    volume: f32,
    center_of_mass: Vec3,
    mass: Option<MassProperties>,
    inner_radius: f32,
    sub_shape_id_bits: u32,
}

impl Shape {
    fn from_kind(kind: ShapeKind) -> Self {
        use std::f32::consts::PI;

        let (local_bounds, volume, center_of_mass, mass, inner_radius) = match &kind {
            ShapeKind::Sphere(s) => (
                s.local_bounds(),
                4.0 / 3.0 * PI * s.radius.powi(3),
                Vec3::ZERO,
                Some(s.mass_properties()),
                s.radius,
            ),
            ShapeKind::Box(b) => (
                b.local_bounds(),
                8.0 * b.half_extent.x * b.half_extent.y * b.half_extent.z,
                Vec3::ZERO,
                Some(b.mass_properties()),
                b.half_extent.min_element(),
            ),
            ShapeKind::Capsule(c) => (
                c.local_bounds(),
                PI * c.radius * c.radius * (2.0 * c.half_height + 4.0 / 3.0 * c.radius),
                Vec3::ZERO,
                Some(c.mass_properties()),
                c.radius,
            ),
            ShapeKind::Cylinder(c) => (
                c.local_bounds(),
                PI * c.radius * c.radius * 2.0 * c.half_height,
                Vec3::ZERO,
                Some(c.mass_properties()),
                c.radius.min(c.half_height),
            ),
            ShapeKind::ConvexHull(h) => (
                h.local_bounds(),
                h.volume(),
                h.center_of_mass(),
                Some(h.mass_properties()),
                h.inner_radius(),
            ),
            ShapeKind::Mesh(m) | ShapeKind::HeightField(HeightFieldShape { mesh: m, .. }) => {
                (m.local_bounds(), 0.0, m.local_bounds().center(), None, 0.0)
            }
            ShapeKind::Compound(c) => compound_properties(c),
            ShapeKind::Decorated(d) => {
                let t = d.transform();
                (
                    d.inner.local_bounds.transformed(&t),
                    d.inner.volume,
                    t.transform_point(d.inner.center_of_mass),
                    d.inner.mass.map(|m| m.rotated(d.rotation)),
                    d.inner.inner_radius,
                )
            }
        };
        let sub_shape_id_bits = path_bits(&kind);

        Self {
            kind,
            local_bounds,
            volume,
            center_of_mass,
            mass,
            inner_radius,
            sub_shape_id_bits,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &ShapeKind {
        &self.kind
    }

    #[must_use]
    pub fn shape_type(&self) -> ShapeType {
        match self.kind {
            ShapeKind::Sphere(_) => ShapeType::Sphere,
            ShapeKind::Box(_) => ShapeType::Box,
            ShapeKind::Capsule(_) => ShapeType::Capsule,
            ShapeKind::Cylinder(_) => ShapeType::Cylinder,
            ShapeKind::ConvexHull(_) => ShapeType::ConvexHull,
            ShapeKind::Mesh(_) => ShapeType::Mesh,
            ShapeKind::HeightField(_) => ShapeType::HeightField,
            ShapeKind::Compound(_) => ShapeType::Compound,
            ShapeKind::Decorated(_) => ShapeType::Decorated,
        }
    }

    #[must_use]
    pub fn volume(&self) -> f32 {
        self.volume
    }

    #[must_use]
    pub fn local_bounds(&self) -> Aabb {
        self.local_bounds
    }

    #[must_use]
    pub fn center_of_mass(&self) -> Vec3 {
        self.center_of_mass
    }

    /// Radius of the largest sphere around the center of mass that fits
    /// inside the shape. Zero for meshes.
    #[must_use]
    pub fn inner_radius(&self) -> f32 {
        self.inner_radius
    }

    /// Longest sub-shape id path below this shape, in bits.
    #[must_use]
    pub fn sub_shape_id_bits(&self) -> u32 {
        self.sub_shape_id_bits
    }

    /// Mass and inertia about [`Shape::center_of_mass`].
    ///
    /// # Errors
    /// Meshes, and compounds containing them, have no volume to integrate.
    pub fn mass_properties(&self) -> Result<MassProperties, PhysicsError> {
        self.mass
            .ok_or(PhysicsError::InvalidMassProperties("shape has no volume"))
    }

    #[must_use]
    pub fn world_bounds(&self, transform: &Isometry) -> Aabb {
        self.local_bounds.transformed(transform)
    }

    /// Casts the ray `origin + t * direction`, `t` in `[0, max_fraction]`.
    #[must_use]
    pub fn cast_ray(&self, origin: Vec3, direction: Vec3, max_fraction: f32) -> Option<ShapeRayHit> {
        self.cast_ray_with(origin, direction, max_fraction, SubShapeIdCreator::new())
    }

    fn cast_ray_with(&self, origin: Vec3, direction: Vec3, max_fraction: f32, creator: SubShapeIdCreator) -> Option<ShapeRayHit> {
        self.local_bounds.ray_entry(origin, direction, max_fraction)?;
        let hit = |fraction: f32| ShapeRayHit {
            fraction,
            sub_shape_id: creator.id(),
        };
        match &self.kind {
            ShapeKind::Sphere(s) => s.cast_ray(origin, direction, max_fraction).map(hit),
            ShapeKind::Box(b) => b.cast_ray(origin, direction, max_fraction).map(hit),
            ShapeKind::Capsule(c) => c.cast_ray(origin, direction, max_fraction).map(hit),
            ShapeKind::Cylinder(c) => c.cast_ray(origin, direction, max_fraction).map(hit),
            ShapeKind::ConvexHull(h) => h.cast_ray(origin, direction, max_fraction).map(hit),
            ShapeKind::Mesh(m) | ShapeKind::HeightField(HeightFieldShape { mesh: m, .. }) => m
                .cast_ray(origin, direction, max_fraction, creator)
                .map(|(fraction, sub_shape_id)| ShapeRayHit { fraction, sub_shape_id }),
            ShapeKind::Compound(c) => {
                let mut best: Option<ShapeRayHit> = None;
                for (index, child) in c.children().iter().enumerate() {
                    let t = child.transform();
                    let limit = best.map_or(max_fraction, |b| b.fraction);
                    let child_creator = creator.push(child_index(index), c.id_bits());
                    if let Some(h) = child.shape.cast_ray_with(
                        t.inverse_transform_point(origin),
                        t.inverse_transform_vector(direction),
                        limit,
                        child_creator,
                    ) {
                        if best.map_or(true, |b| h.fraction < b.fraction) {
                            best = Some(h);
                        }
                    }
                }
                best
            }
            ShapeKind::Decorated(d) => {
                let t = d.transform();
                d.inner.cast_ray_with(
                    t.inverse_transform_point(origin),
                    t.inverse_transform_vector(direction),
                    max_fraction,
                    creator,
                )
            }
        }
    }

    /// Outward normal at a local `point` on the leaf addressed by `id`.
    #[must_use]
    pub fn surface_normal(&self, id: SubShapeId, point: Vec3) -> Vec3 {
        match &self.kind {
            ShapeKind::Sphere(s) => s.surface_normal(point),
            ShapeKind::Box(b) => b.surface_normal(point),
            ShapeKind::Capsule(c) => c.surface_normal(point),
            ShapeKind::Cylinder(c) => c.surface_normal(point),
            ShapeKind::ConvexHull(h) => h.surface_normal(point),
            ShapeKind::Mesh(m) | ShapeKind::HeightField(HeightFieldShape { mesh: m, .. }) => {
                m.triangle_for_id(id).map_or(Vec3::Y, |tri| {
                    let [a, b, c] = tri.vertices;
                    (b - a).cross(c - a).normalize_or_zero()
                })
            }
            ShapeKind::Compound(c) => {
                let (index, rest) = id.pop(c.id_bits());
                c.children().get(index as usize).map_or(Vec3::Y, |child| {
                    let t = child.transform();
                    t.transform_vector(child.shape.surface_normal(rest, t.inverse_transform_point(point)))
                })
            }
            ShapeKind::Decorated(d) => {
                let t = d.transform();
                t.transform_vector(d.inner.surface_normal(id, t.inverse_transform_point(point)))
            }
        }
    }

    /// Vertices of the face of leaf `id` that best faces `direction`, in
    /// local space. Empty for curved leaves.
    #[must_use]
    pub fn supporting_face(&self, id: SubShapeId, direction: Vec3) -> Vec<Vec3> {
        match &self.kind {
            ShapeKind::Sphere(s) => s.supporting_face(direction),
            ShapeKind::Box(b) => b.supporting_face(direction),
            ShapeKind::Capsule(c) => c.supporting_face(direction),
            ShapeKind::Cylinder(c) => c.supporting_face(direction),
            ShapeKind::ConvexHull(h) => h.supporting_face(direction),
            ShapeKind::Mesh(m) | ShapeKind::HeightField(HeightFieldShape { mesh: m, .. }) => m
                .triangle_for_id(id)
                .map(|tri| tri.supporting_face(direction))
                .unwrap_or_default(),
            ShapeKind::Compound(c) => {
                let (index, rest) = id.pop(c.id_bits());
                c.children()
                    .get(index as usize)
                    .map(|child| {
                        let t = child.transform();
                        child
                            .shape
                            .supporting_face(rest, t.inverse_transform_vector(direction))
                            .into_iter()
                            .map(|p| t.transform_point(p))
                            .collect()
                    })
                    .unwrap_or_default()
            }
            ShapeKind::Decorated(d) => {
                let t = d.transform();
                d.inner
                    .supporting_face(id, t.inverse_transform_vector(direction))
                    .into_iter()
                    .map(|p| t.transform_point(p))
                    .collect()
            }
        }
    }

    /// Whether a local point lies inside the solid. Meshes have no inside.
    #[must_use]
    pub fn contains_point(&self, point: Vec3) -> bool {
        if !self.local_bounds.contains_point(point) {
            return false;
        }
        match &self.kind {
            ShapeKind::Sphere(s) => point.length_squared() <= s.radius * s.radius,
            ShapeKind::Box(b) => b.contains_point(point),
            ShapeKind::Capsule(c) => c.contains_point(point),
            ShapeKind::Cylinder(c) => c.contains_point(point),
            ShapeKind::ConvexHull(h) => h.contains_point(point),
            ShapeKind::Mesh(_) | ShapeKind::HeightField(_) => false,
            ShapeKind::Compound(c) => c
                .children()
                .iter()
                .any(|child| child.shape.contains_point(child.transform().inverse_transform_point(point))),
            ShapeKind::Decorated(d) => d.inner.contains_point(d.transform().inverse_transform_point(point)),
        }
    }

    /// Collects the convex leaves of this shape placed at `transform` whose
    /// world bounds may touch `query`.
    pub(crate) fn collect_leaves<'a>(
        &'a self,
        transform: &Isometry,
        query: &Aabb,
        creator: SubShapeIdCreator,
        out: &mut Vec<ConvexLeaf<'a>>,
    ) {
        let leaf = |shape: LeafShape<'a>| ConvexLeaf {
            shape,
            transform: *transform,
            sub_shape_id: creator.id(),
        };
        match &self.kind {
            ShapeKind::Sphere(s) => out.push(leaf(LeafShape::Sphere(s))),
            ShapeKind::Box(b) => out.push(leaf(LeafShape::Box(b))),
            ShapeKind::Capsule(c) => out.push(leaf(LeafShape::Capsule(c))),
            ShapeKind::Cylinder(c) => out.push(leaf(LeafShape::Cylinder(c))),
            ShapeKind::ConvexHull(h) => out.push(leaf(LeafShape::Hull(h))),
            ShapeKind::Mesh(m) | ShapeKind::HeightField(HeightFieldShape { mesh: m, .. }) => {
                let local_query = query.transformed(&transform.inverse());
                m.for_each_triangle(&local_query, creator, |tri, sub_shape_id| {
                    out.push(ConvexLeaf {
                        shape: LeafShape::Triangle(tri),
                        transform: *transform,
                        sub_shape_id,
                    });
                });
            }
            ShapeKind::Compound(c) => {
                for (index, child) in c.children().iter().enumerate() {
                    let t = transform.mul(&child.transform());
                    if child.shape.world_bounds(&t).overlaps(query) {
                        let child_creator = creator.push(child_index(index), c.id_bits());
                        child.shape.collect_leaves(&t, query, child_creator, out);
                    }
                }
            }
            ShapeKind::Decorated(d) => {
                let t = transform.mul(&d.transform());
                d.inner.collect_leaves(&t, query, creator, out);
            }
        }
    }
}

fn child_index(index: usize) -> u32 {
    u32::try_from(index).unwrap_or(u32::MAX)
}

type DerivedProperties = (Aabb, f32, Vec3, Option<MassProperties>, f32);

fn compound_properties(compound: &CompoundShape) -> DerivedProperties {
    let mut bounds = Aabb::EMPTY;
    let mut volume = 0.0;
    let mut inner_radius = f32::MAX;
    let mut total_mass = 0.0;
    let mut weighted = Vec3::ZERO;
    let mut all_massive = true;
    for child in compound.children() {
        let t = child.transform();
        bounds = bounds.union(child.shape.local_bounds.transformed(&t));
        volume += child.shape.volume;
        inner_radius = inner_radius.min(child.shape.inner_radius);
        match child.shape.mass {
            Some(m) => {
                total_mass += m.mass;
                weighted += t.transform_point(child.shape.center_of_mass) * m.mass;
            }
            None => all_massive = false,
        }
    }

    let center_of_mass = if total_mass > 0.0 {
        weighted / total_mass
    } else {
        bounds.center()
    };

    let mass = all_massive.then(|| {
        compound.children().iter().fold(MassProperties::ZERO, |acc, child| {
            let Some(m) = child.shape.mass else {
                return acc;
            };
            let t = child.transform();
            let placed = m
                .rotated(child.rotation)
                .translated(t.transform_point(child.shape.center_of_mass) - center_of_mass);
            MassProperties::new(acc.mass + placed.mass, acc.inertia + placed.inertia)
        })
    });

    (bounds, volume, center_of_mass, mass, inner_radius)
}

/// A convex piece of a shape together with its world transform.
pub(crate) struct ConvexLeaf<'a> {
    pub shape: LeafShape<'a>,
    pub transform: Isometry,
    pub sub_shape_id: SubShapeId,
}

pub(crate) enum LeafShape<'a> {
    Sphere(&'a SphereShape),
    Box(&'a BoxShape),
    Capsule(&'a CapsuleShape),
    Cylinder(&'a CylinderShape),
    Hull(&'a ConvexHullShape),
    Triangle(TriangleShape),
}

impl LeafShape<'_> {
    pub fn convex(&self) -> &dyn ConvexShape {
        match self {
            LeafShape::Sphere(s) => *s,
            LeafShape::Box(b) => *b,
            LeafShape::Capsule(c) => *c,
            LeafShape::Cylinder(c) => *c,
            LeafShape::Hull(h) => *h,
            LeafShape::Triangle(t) => t,
        }
    }

    pub fn shape_type(&self) -> ShapeType {
        match self {
            LeafShape::Sphere(_) => ShapeType::Sphere,
            LeafShape::Box(_) => ShapeType::Box,
            LeafShape::Capsule(_) => ShapeType::Capsule,
            LeafShape::Cylinder(_) => ShapeType::Cylinder,
            LeafShape::Hull(_) => ShapeType::ConvexHull,
            LeafShape::Triangle(_) => ShapeType::Mesh,
        }
    }
}

/// Recipe for a [`Shape`]. Convex kinds carry a density used for mass
/// properties.
#[derive(Clone, Debug)]
pub enum ShapeSettings {
    Sphere {
        radius: f32,
        density: f32,
    },
    Box {
        half_extent: Vec3,
        convex_radius: f32,
        density: f32,
    },
    /// Y axis capsule.
    Capsule {
        half_height: f32,
        radius: f32,
        density: f32,
    },
    /// Y axis cylinder.
    Cylinder {
        half_height: f32,
        radius: f32,
        convex_radius: f32,
        density: f32,
    },
    ConvexHull {
        points: Vec<Vec3>,
        density: f32,
    },
    Mesh {
        vertices: Vec<Vec3>,
        triangles: Vec<[u32; 3]>,
    },
    /// `sample_count²` heights, row by row along +Z; sample `(x, z)` sits at
    /// `offset + scale * (x, height, z)`.
    HeightField {
        heights: Vec<f32>,
        sample_count: u32,
        offset: Vec3,
        scale: Vec3,
    },
    Compound {
        children: Vec<CompoundChild>,
    },
    Decorated {
        inner: ShapeRef,
        offset: Vec3,
        rotation: Quat,
    },
}

impl ShapeSettings {
    #[must_use]
    pub fn sphere(radius: f32) -> Self {
        Self::Sphere {
            radius,
            density: DEFAULT_DENSITY,
        }
    }

    /// Box with the default convex radius, reduced for very thin boxes.
    #[must_use]
    pub fn box_shape(half_extent: Vec3) -> Self {
        Self::Box {
            half_extent,
            convex_radius: DEFAULT_CONVEX_RADIUS.min(half_extent.min_element()).max(0.0),
            density: DEFAULT_DENSITY,
        }
    }

    #[must_use]
    pub fn capsule(half_height: f32, radius: f32) -> Self {
        Self::Capsule {
            half_height,
            radius,
            density: DEFAULT_DENSITY,
        }
    }

    #[must_use]
    pub fn cylinder(half_height: f32, radius: f32) -> Self {
        Self::Cylinder {
            half_height,
            radius,
            convex_radius: DEFAULT_CONVEX_RADIUS.min(half_height).min(radius).max(0.0),
            density: DEFAULT_DENSITY,
        }
    }

    #[must_use]
    pub fn convex_hull(points: Vec<Vec3>) -> Self {
        Self::ConvexHull {
            points,
            density: DEFAULT_DENSITY,
        }
    }

    #[must_use]
    pub fn mesh(vertices: Vec<Vec3>, triangles: Vec<[u32; 3]>) -> Self {
        Self::Mesh { vertices, triangles }
    }

    #[must_use]
    pub fn height_field(heights: Vec<f32>, sample_count: u32, offset: Vec3, scale: Vec3) -> Self {
        Self::HeightField {
            heights,
            sample_count,
            offset,
            scale,
        }
    }

    /// Compound from `(shape, offset, rotation)` triples.
    #[must_use]
    pub fn compound(children: impl IntoIterator<Item = (ShapeRef, Vec3, Quat)>) -> Self {
        Self::Compound {
            children: children
                .into_iter()
                .map(|(shape, offset, rotation)| CompoundChild { shape, offset, rotation })
                .collect(),
        }
    }

    #[must_use]
    pub fn decorated(inner: ShapeRef, offset: Vec3, rotation: Quat) -> Self {
        Self::Decorated { inner, offset, rotation }
    }

    /// Sets the density of convex kinds; other kinds are unchanged.
    #[must_use]
    pub fn with_density(mut self, value: f32) -> Self {
        match &mut self {
            Self::Sphere { density, .. }
            | Self::Box { density, .. }
            | Self::Capsule { density, .. }
            | Self::Cylinder { density, .. }
            | Self::ConvexHull { density, .. } => *density = value,
            Self::Mesh { .. } | Self::HeightField { .. } | Self::Compound { .. } | Self::Decorated { .. } => {}
        }
        self
    }

    /// Sets the convex radius of boxes and cylinders.
    #[must_use]
    pub fn with_convex_radius(mut self, value: f32) -> Self {
        if let Self::Box { convex_radius, .. } | Self::Cylinder { convex_radius, .. } = &mut self {
            *convex_radius = value;
        }
        self
    }

    /// Validates the settings and builds the shape.
    ///
    /// # Errors
    /// [`PhysicsError::InvalidGeometry`] when the geometry is degenerate.
    pub fn create(&self) -> Result<ShapeRef, PhysicsError> {
        let kind = match self {
            Self::Sphere { radius, density } => {
                check_positive(*radius, "sphere radius must be positive")?;
                check_density(*density)?;
                ShapeKind::Sphere(SphereShape {
                    radius: *radius,
                    density: *density,
                })
            }
            Self::Box {
                half_extent,
                convex_radius,
                density,
            } => {
                check_positive(half_extent.min_element(), "box half extents must be positive")?;
                check_positive(half_extent.max_element(), "box half extents must be finite")?;
                check_convex_radius(*convex_radius, half_extent.min_element())?;
                check_density(*density)?;
                ShapeKind::Box(BoxShape {
                    half_extent: *half_extent,
                    convex_radius: *convex_radius,
                    density: *density,
                })
            }
            Self::Capsule {
                half_height,
                radius,
                density,
            } => {
                check_positive(*half_height, "capsule half height must be positive")?;
                check_positive(*radius, "capsule radius must be positive")?;
                check_density(*density)?;
                ShapeKind::Capsule(CapsuleShape {
                    half_height: *half_height,
                    radius: *radius,
                    density: *density,
                })
            }
            Self::Cylinder {
                half_height,
                radius,
                convex_radius,
                density,
            } => {
                check_positive(*half_height, "cylinder half height must be positive")?;
                check_positive(*radius, "cylinder radius must be positive")?;
                check_convex_radius(*convex_radius, half_height.min(*radius))?;
                check_density(*density)?;
                ShapeKind::Cylinder(CylinderShape {
                    half_height: *half_height,
                    radius: *radius,
                    convex_radius: *convex_radius,
                    density: *density,
                })
            }
            Self::ConvexHull { points, density } => {
                check_density(*density)?;
                ShapeKind::ConvexHull(ConvexHullShape::new(points, *density)?)
            }
            Self::Mesh { vertices, triangles } => ShapeKind::Mesh(MeshShape::new(vertices.clone(), triangles)?),
            Self::HeightField {
                heights,
                sample_count,
                offset,
                scale,
            } => ShapeKind::HeightField(HeightFieldShape::new(heights.clone(), *sample_count, *offset, *scale)?),
            Self::Compound { children } => {
                if children.is_empty() {
                    return Err(PhysicsError::InvalidGeometry("compound has no children"));
                }
                let mut placed = Vec::with_capacity(children.len());
                for child in children {
                    placed.push(CompoundChild {
                        shape: child.shape.clone(),
                        offset: child.offset,
                        rotation: checked_rotation(child.offset, child.rotation)?,
                    });
                }
                ShapeKind::Compound(CompoundShape::new(placed))
            }
            Self::Decorated { inner, offset, rotation } => ShapeKind::Decorated(DecoratedShape {
                inner: inner.clone(),
                offset: *offset,
                rotation: checked_rotation(*offset, *rotation)?,
            }),
        };
        if path_bits(&kind) > SubShapeId::MAX_BITS {
            return Err(PhysicsError::InvalidGeometry("sub-shape ids do not fit in 32 bits"));
        }
        Ok(Arc::new(Shape::from_kind(kind)))
    }
}

fn path_bits(kind: &ShapeKind) -> u32 {
    match kind {
        ShapeKind::Mesh(m) | ShapeKind::HeightField(HeightFieldShape { mesh: m, .. }) => m.id_bits(),
        ShapeKind::Compound(c) => {
            c.id_bits() + c.children().iter().map(|child| child.shape.sub_shape_id_bits).max().unwrap_or(0)
        }
        ShapeKind::Decorated(d) => d.inner.sub_shape_id_bits,
        ShapeKind::Sphere(_)
        | ShapeKind::Box(_)
        | ShapeKind::Capsule(_)
        | ShapeKind::Cylinder(_)
        | ShapeKind::ConvexHull(_) => 0,
    }
}

fn check_positive(value: f32, what: &'static str) -> Result<(), PhysicsError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(PhysicsError::InvalidGeometry(what))
    }
}

fn check_density(density: f32) -> Result<(), PhysicsError> {
    if density.is_finite() && density >= 0.0 {
        Ok(())
    } else {
        Err(PhysicsError::InvalidGeometry("density must be non-negative"))
    }
}

fn check_convex_radius(radius: f32, limit: f32) -> Result<(), PhysicsError> {
    if radius.is_finite() && (0.0..=limit).contains(&radius) {
        Ok(())
    } else {
        Err(PhysicsError::InvalidGeometry("convex radius out of range"))
    }
}

fn checked_rotation(offset: Vec3, rotation: Quat) -> Result<Quat, PhysicsError> {
    if !offset.is_finite() || !rotation.is_finite() || rotation.length_squared() < 1.0e-6 {
        return Err(PhysicsError::InvalidGeometry("child transform is not finite"));
    }
    Ok(rotation.normalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compound_mass_matches_offset_spheres() {
        let ball = ShapeSettings::sphere(0.5).create().unwrap();
        let pair = ShapeSettings::compound([
            (ball.clone(), Vec3::new(-1.0, 0.0, 0.0), Quat::IDENTITY),
            (ball.clone(), Vec3::new(1.0, 0.0, 0.0), Quat::IDENTITY),
        ])
        .create()
        .unwrap();
        let single = ball.mass_properties().unwrap();
        let both = pair.mass_properties().unwrap();
        assert!((both.mass - 2.0 * single.mass).abs() < 1e-2);
        assert!(pair.center_of_mass().length() < 1e-5);
        let expected_yy = 2.0 * (single.inertia.y_axis.y + single.mass);
        assert!((both.inertia.y_axis.y - expected_yy).abs() / expected_yy < 1e-4);
        assert_eq!(shape_ref_count(&ball), 3);
    }

    #[test]
    fn compound_ray_reports_child_id() {
        let ball = ShapeSettings::sphere(0.5).create().unwrap();
        let cube = ShapeSettings::box_shape(Vec3::splat(0.5)).create().unwrap();
        let pair = ShapeSettings::compound([
            (ball, Vec3::new(-2.0, 0.0, 0.0), Quat::IDENTITY),
            (cube, Vec3::new(2.0, 0.0, 0.0), Quat::IDENTITY),
        ])
        .create()
        .unwrap();
        let hit = pair.cast_ray(Vec3::new(2.0, 5.0, 0.0), Vec3::new(0.0, -10.0, 0.0), 1.0).unwrap();
        assert!((hit.fraction - 0.45).abs() < 1e-5);
        assert_eq!(hit.sub_shape_id.pop(1).0, 1);
        assert_eq!(pair.surface_normal(hit.sub_shape_id, Vec3::new(2.0, 0.5, 0.0)), Vec3::Y);
    }

    #[test]
    fn decorated_moves_bounds_and_com() {
        let cube = ShapeSettings::box_shape(Vec3::new(1.0, 0.5, 0.5)).create().unwrap();
        let moved = ShapeSettings::decorated(
            cube,
            Vec3::new(0.0, 3.0, 0.0),
            Quat::from_rotation_z(std::f32::consts::FRAC_PI_2),
        )
        .create()
        .unwrap();
        assert!((moved.center_of_mass() - Vec3::new(0.0, 3.0, 0.0)).length() < 1e-5);
        let b = moved.local_bounds();
        assert!((b.max.y - 4.0).abs() < 1e-4);
        assert!((b.max.x - 0.5).abs() < 1e-4);
        assert!(moved.contains_point(Vec3::new(0.0, 3.9, 0.0)));
    }

    #[test]
    fn invalid_settings_rejected() {
        assert!(ShapeSettings::sphere(0.0).create().is_err());
        assert!(ShapeSettings::box_shape(Vec3::new(1.0, 0.0, 1.0)).create().is_err());
        assert!(ShapeSettings::box_shape(Vec3::ONE).with_convex_radius(2.0).create().is_err());
        assert!(ShapeSettings::capsule(1.0, -1.0).create().is_err());
        assert!(ShapeSettings::sphere(1.0).with_density(-1.0).create().is_err());
        assert!(ShapeSettings::compound([]).create().is_err());
    }

    #[test]
    fn mesh_has_no_mass() {
        let mesh = ShapeSettings::mesh(vec![Vec3::ZERO, Vec3::X, Vec3::Z], vec![[0, 2, 1]])
            .create()
            .unwrap();
        assert!(matches!(
            mesh.mass_properties(),
            Err(PhysicsError::InvalidMassProperties(_))
        ));
        assert!(!mesh.contains_point(Vec3::new(0.2, 0.0, 0.2)));
    }

    /// `levels` two-child compounds, each holding the previous level at the
    /// origin and a small ball far off to the side.
    fn nested(levels: usize) -> Result<ShapeRef, PhysicsError> {
        let side = ShapeSettings::sphere(0.1).create()?;
        let mut shape = ShapeSettings::sphere(0.5).create()?;
        for _ in 0..levels {
            shape = ShapeSettings::compound([
                (shape, Vec3::ZERO, Quat::IDENTITY),
                (side.clone(), Vec3::new(100.0, 0.0, 0.0), Quat::IDENTITY),
            ])
            .create()?;
        }
        Ok(shape)
    }

    #[test]
    fn sub_shape_paths_must_fit_in_an_id() {
        let deepest = nested(32).unwrap();
        assert_eq!(deepest.sub_shape_id_bits(), 32);
        let hit = deepest.cast_ray(Vec3::new(0.0, 5.0, 0.0), Vec3::new(0.0, -10.0, 0.0), 1.0).unwrap();
        assert!((hit.fraction - 0.45).abs() < 1e-5);
        let mut id = hit.sub_shape_id;
        for _ in 0..32 {
            let (index, rest) = id.pop(1);
            assert_eq!(index, 0);
            id = rest;
        }

        assert!(matches!(nested(33), Err(PhysicsError::InvalidGeometry(_))));

        let mesh = ShapeSettings::mesh(vec![Vec3::ZERO, Vec3::X, Vec3::Z], vec![[0, 2, 1], [0, 1, 2]])
            .create()
            .unwrap();
        assert_eq!(mesh.sub_shape_id_bits(), 1);
        let over = ShapeSettings::compound([
            (deepest, Vec3::ZERO, Quat::IDENTITY),
            (mesh, Vec3::X, Quat::IDENTITY),
        ]);
        assert!(matches!(over.create(), Err(PhysicsError::InvalidGeometry(_))));
    }
}

//! Ray and overlap queries against the bodies that are added to the broad
//! phase. Queries take shared body locks only and can run from any thread
//! that holds a `&PhysicsSystem`.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::body::{Body, BodyId};
use crate::shapes::SubShapeId;
use crate::simulation::PhysicsSystem;
use crate::types::{to_f32, Aabb, BroadPhaseLayer, ObjectLayer, RVec3};

/// Ray in world space. `direction` spans the full length of the ray, hits are
/// reported as fractions of it in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RRayCast {
    pub origin: RVec3,
    pub direction: Vec3,
}

impl RRayCast {
    #[must_use]
    pub fn new(origin: RVec3, direction: Vec3) -> Self {
        Self { origin, direction }
    }

    /// World position at `fraction` along the ray.
    #[must_use]
    pub fn point_at(&self, fraction: f32) -> RVec3 {
        self.origin + crate::types::to_real(self.direction * fraction)
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct RayCastResult {
    pub body_id: BodyId,
    pub fraction: f32,
    pub sub_shape_id: SubShapeId,
}

/// Restricts which bodies a query visits. Unset filters accept everything.
#[derive(Default)]
pub struct QueryFilter<'a> {
    pub broad_phase_layer: Option<&'a dyn Fn(BroadPhaseLayer) -> bool>,
    pub object_layer: Option<&'a dyn Fn(ObjectLayer) -> bool>,
    pub body: Option<&'a dyn Fn(&Body) -> bool>,
}

impl<'a> QueryFilter<'a> {
    #[must_use]
    pub fn with_broad_phase_layer(mut self, filter: &'a dyn Fn(BroadPhaseLayer) -> bool) -> Self {
        self.broad_phase_layer = Some(filter);
        self
    }

    #[must_use]
    pub fn with_object_layer(mut self, filter: &'a dyn Fn(ObjectLayer) -> bool) -> Self {
        self.object_layer = Some(filter);
        self
    }

    #[must_use]
    pub fn with_body(mut self, filter: &'a dyn Fn(&Body) -> bool) -> Self {
        self.body = Some(filter);
        self
    }

    fn accepts_layer(&self, layer: BroadPhaseLayer) -> bool {
        self.broad_phase_layer.map_or(true, |f| f(layer))
    }

    fn accepts_body(&self, body: &Body) -> bool {
        self.object_layer.map_or(true, |f| f(body.object_layer())) && self.body.map_or(true, |f| f(body))
    }
}

impl std::fmt::Debug for QueryFilter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryFilter")
            .field("broad_phase_layer", &self.broad_phase_layer.is_some())
            .field("object_layer", &self.object_layer.is_some())
            .field("body", &self.body.is_some())
            .finish()
    }
}

impl PhysicsSystem {
    /// Closest hit along `ray`, ties broken by the lower body id.
    #[must_use]
    pub fn cast_ray(&self, ray: &RRayCast, filter: &QueryFilter<'_>) -> Option<RayCastResult> {
        let mut best: Option<RayCastResult> = None;
        self.broad_phase.cast_ray(
            to_f32(ray.origin),
            ray.direction,
            1.0,
            |layer| filter.accepts_layer(layer),
            |id, _| {
                let limit = best.map_or(1.0, |b| b.fraction);
                let hit = self.cast_against(id, ray, limit, filter)?;
                let closer = best.map_or(true, |b| {
                    hit.fraction < b.fraction || (hit.fraction == b.fraction && hit.body_id < b.body_id)
                });
                if closer {
                    best = Some(hit);
                }
                best.map(|b| b.fraction)
            },
        );
        best
    }

    /// Every body the ray hits, one result per body, nearest first.
    #[must_use]
    pub fn cast_ray_all(&self, ray: &RRayCast, filter: &QueryFilter<'_>) -> Vec<RayCastResult> {
        let mut hits = Vec::new();
        self.broad_phase.cast_ray(
            to_f32(ray.origin),
            ray.direction,
            1.0,
            |layer| filter.accepts_layer(layer),
            |id, _| {
                if let Some(hit) = self.cast_against(id, ray, 1.0, filter) {
                    hits.push(hit);
                }
                None
            },
        );
        hits.sort_by(|a, b| a.fraction.total_cmp(&b.fraction).then(a.body_id.cmp(&b.body_id)));
        hits.dedup_by_key(|h| h.body_id);
        hits
    }

    /// Bodies whose world bounds overlap `bounds`, sorted by id.
    #[must_use]
    pub fn collide_aabb(&self, bounds: &Aabb, filter: &QueryFilter<'_>) -> Vec<BodyId> {
        let mut out = Vec::new();
        self.broad_phase.query_aabb(bounds, |layer| filter.accepts_layer(layer), |id| {
            let Some(body) = self.bodies.lock_read(id) else {
                return;
            };
            if filter.accepts_body(&body) && body.world_bounds().overlaps(bounds) {
                out.push(id);
            }
        });
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Bodies whose shape contains `point`, sorted by id.
    #[must_use]
    pub fn collide_point(&self, point: RVec3, filter: &QueryFilter<'_>) -> Vec<BodyId> {
        let p = to_f32(point);
        let bounds = Aabb::new(p, p);
        let mut out = Vec::new();
        self.broad_phase.query_aabb(&bounds, |layer| filter.accepts_layer(layer), |id| {
            let Some(body) = self.bodies.lock_read(id) else {
                return;
            };
            if !filter.accepts_body(&body) || !body.world_bounds().contains_point(p) {
                return;
            }
            let local = body.transform_relative_to(point).inverse_transform_point(Vec3::ZERO);
            if body.shape().contains_point(local) {
                out.push(id);
            }
        });
        out.sort_unstable();
        out.dedup();
        out
    }

    fn cast_against(&self, id: BodyId, ray: &RRayCast, limit: f32, filter: &QueryFilter<'_>) -> Option<RayCastResult> {
        let body = self.bodies.lock_read(id)?;
        if !filter.accepts_body(&body) {
            return None;
        }
        let t = body.transform_relative_to(ray.origin);
        let hit = body.shape().cast_ray(
            t.inverse_transform_point(Vec3::ZERO),
            t.inverse_transform_vector(ray.direction),
            limit,
        )?;
        Some(RayCastResult {
            body_id: id,
            fraction: hit.fraction,
            sub_shape_id: hit.sub_shape_id,
        })
    }
}

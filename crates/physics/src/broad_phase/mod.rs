//! # Broad Phase
//!
//! One [`DynamicTree`] per broad-phase layer over the bounds of every added
//! body. Pair finding walks the active bodies only, so sleeping and static
//! bodies never query the trees themselves.

mod layers;
mod tree;

use glam::Vec3;
use tracing::trace;

pub use layers::{
    BroadPhaseLayerInterface, DefaultLayers, ObjectLayerPairFilter, ObjectVsBroadPhaseLayerFilter, MOVING, NON_MOVING,
};
pub use tree::DynamicTree;

use crate::body::{Body, BodyId, BodyManager};
use crate::types::{Aabb, BroadPhaseLayer};
use jobs::JobSystem;

/// Fat box margin of broad-phase leaves.
const FAT_MARGIN: f32 = 0.05;

/// Two bodies whose bounds overlap, lower id first.
pub type BodyPair = (BodyId, BodyId);

pub(crate) struct BroadPhase {
    trees: Vec<DynamicTree<BodyId>>,
}

impl BroadPhase {
    pub fn new(num_layers: u8) -> Self {
        Self {
            trees: (0..num_layers.max(1)).map(|_| DynamicTree::new(FAT_MARGIN)).collect(),
        }
    }

    fn tree_mut(&mut self, layer: BroadPhaseLayer) -> &mut DynamicTree<BodyId> {
        let index = usize::from(layer.0);
        if index >= self.trees.len() {
            self.trees.resize_with(index + 1, || DynamicTree::new(FAT_MARGIN));
        }
        &mut self.trees[index]
    }

    pub fn insert(&mut self, layer: BroadPhaseLayer, bounds: Aabb, id: BodyId) -> u32 {
        self.tree_mut(layer).insert(bounds, id)
    }

    pub fn remove(&mut self, layer: BroadPhaseLayer, proxy: u32) -> Option<BodyId> {
        self.tree_mut(layer).remove(proxy)
    }

    /// Returns `true` when the leaf left its fat box and was reinserted.
    pub fn update_bounds(&mut self, layer: BroadPhaseLayer, proxy: u32, bounds: Aabb) -> bool {
        self.tree_mut(layer).update(proxy, bounds)
    }

    pub fn optimize(&mut self) {
        for tree in &mut self.trees {
            tree.optimize();
        }
    }

    fn layers(&self) -> impl Iterator<Item = (BroadPhaseLayer, &DynamicTree<BodyId>)> {
        self.trees
            .iter()
            .enumerate()
            .map(|(i, tree)| (BroadPhaseLayer(u8::try_from(i).unwrap_or(u8::MAX)), tree))
    }

    /// Bodies whose fat bounds overlap `bounds` in the layers accepted by
    /// `layer_filter`.
    pub fn query_aabb(&self, bounds: &Aabb, layer_filter: impl Fn(BroadPhaseLayer) -> bool, mut visit: impl FnMut(BodyId)) {
        for (layer, tree) in self.layers() {
            if layer_filter(layer) {
                tree.query(bounds, |_, id| visit(id));
            }
        }
    }

    /// Bodies whose fat bounds the ray enters, with the entry fraction.
    /// `visit` may return a closer maximum fraction.
    pub fn cast_ray(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_fraction: f32,
        layer_filter: impl Fn(BroadPhaseLayer) -> bool,
        mut visit: impl FnMut(BodyId, f32) -> Option<f32>,
    ) {
        let mut limit = max_fraction;
        for (layer, tree) in self.layers() {
            if layer_filter(layer) {
                tree.cast_ray(origin, direction, limit, |id, entry| {
                    let closer = visit(id, entry);
                    if let Some(c) = closer {
                        limit = limit.min(c);
                    }
                    closer
                });
            }
        }
    }

    /// Overlapping pairs involving at least one active body, sorted and
    /// without duplicates.
    pub fn find_pairs(
        &self,
        bodies: &BodyManager,
        margin: f32,
        object_vs_broad_phase: &dyn ObjectVsBroadPhaseLayerFilter,
        object_pair: &dyn ObjectLayerPairFilter,
        jobs: &dyn JobSystem,
    ) -> Vec<BodyPair> {
        let active = bodies.active_body_ids();
        let per_body: Vec<Vec<BodyPair>> = jobs::map_batched(jobs, "find_pairs", active.len(), |i| {
            let id = active[i];
            let Some(body) = bodies.lock_read(id) else {
                return Vec::new();
            };
            let bounds = body.world_bounds().expanded(margin);
            let layer = body.object_layer();
            let mut found = Vec::new();
            self.query_aabb(
                &bounds,
                |bp| object_vs_broad_phase.should_collide(layer, bp),
                |other| {
                    if other != id {
                        found.push(if id < other { (id, other) } else { (other, id) });
                    }
                },
            );
            drop(body);
            found.retain(|&(a, b)| {
                let (Some(ba), Some(bb)) = (bodies.lock_read(a), bodies.lock_read(b)) else {
                    return false;
                };
                object_pair.should_collide(ba.object_layer(), bb.object_layer()) && bodies_can_collide(&ba, &bb)
            });
            found
        });

        let mut pairs: Vec<BodyPair> = per_body.into_iter().flatten().collect();
        pairs.sort_unstable();
        pairs.dedup();
        trace!(pairs = pairs.len(), active = active.len(), "broad phase pairs");
        pairs
    }
}

/// Motion type, sensor and collision group rules for a candidate pair.
pub(crate) fn bodies_can_collide(a: &Body, b: &Body) -> bool {
    let movable_pair = a.is_dynamic() || b.is_dynamic();
    let sensor_pair = (a.is_sensor() && !b.is_static()) || (b.is_sensor() && !a.is_static());
    (movable_pair || sensor_pair) && a.collision_group().can_collide(b.collision_group())
}

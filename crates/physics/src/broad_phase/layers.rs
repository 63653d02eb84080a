//! Layer mapping and the two filters that decide which layers may collide.

use crate::types::{BroadPhaseLayer, ObjectLayer};

/// Maps object layers onto broad-phase trees.
pub trait BroadPhaseLayerInterface: Send + Sync {
    fn num_broad_phase_layers(&self) -> u8;

    fn broad_phase_layer(&self, layer: ObjectLayer) -> BroadPhaseLayer;
}

/// Decides whether bodies of an object layer look into a broad-phase tree.
pub trait ObjectVsBroadPhaseLayerFilter: Send + Sync {
    fn should_collide(&self, layer: ObjectLayer, broad_phase_layer: BroadPhaseLayer) -> bool;
}

/// Decides whether two object layers collide. Must be symmetric.
pub trait ObjectLayerPairFilter: Send + Sync {
    fn should_collide(&self, a: ObjectLayer, b: ObjectLayer) -> bool;
}

/// Object layer of bodies that never move.
pub const NON_MOVING: ObjectLayer = 0;
/// Object layer of everything else.
pub const MOVING: ObjectLayer = 1;

/// Two layer setup: non-moving bodies only collide with moving ones.
/// Unknown object layers are treated as moving.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DefaultLayers;

impl DefaultLayers {
    pub const NON_MOVING_BROAD_PHASE: BroadPhaseLayer = BroadPhaseLayer(0);
    pub const MOVING_BROAD_PHASE: BroadPhaseLayer = BroadPhaseLayer(1);
}

impl BroadPhaseLayerInterface for DefaultLayers {
    fn num_broad_phase_layers(&self) -> u8 {
        2
    }

    fn broad_phase_layer(&self, layer: ObjectLayer) -> BroadPhaseLayer {
        if layer == NON_MOVING {
            Self::NON_MOVING_BROAD_PHASE
        } else {
            Self::MOVING_BROAD_PHASE
        }
    }
}

impl ObjectVsBroadPhaseLayerFilter for DefaultLayers {
    fn should_collide(&self, layer: ObjectLayer, broad_phase_layer: BroadPhaseLayer) -> bool {
        layer != NON_MOVING || broad_phase_layer == Self::MOVING_BROAD_PHASE
    }
}

impl ObjectLayerPairFilter for DefaultLayers {
    fn should_collide(&self, a: ObjectLayer, b: ObjectLayer) -> bool {
        a != NON_MOVING || b != NON_MOVING
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_layers_ignore_each_other() {
        let layers = DefaultLayers;
        assert!(!ObjectLayerPairFilter::should_collide(&layers, NON_MOVING, NON_MOVING));
        assert!(ObjectLayerPairFilter::should_collide(&layers, NON_MOVING, MOVING));
        assert!(ObjectLayerPairFilter::should_collide(&layers, MOVING, MOVING));
        assert!(!ObjectVsBroadPhaseLayerFilter::should_collide(
            &layers,
            NON_MOVING,
            DefaultLayers::NON_MOVING_BROAD_PHASE
        ));
        assert_eq!(layers.broad_phase_layer(7), DefaultLayers::MOVING_BROAD_PHASE);
    }
}

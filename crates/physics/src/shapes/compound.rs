//! Shapes that place other shapes: compounds of several children and a
//! decorator that offsets and rotates a single inner shape.

use glam::{Quat, Vec3};

use super::sub_shape_id::bits_for_count;
use super::ShapeRef;
use crate::types::Isometry;

#[derive(Clone, Debug)]
pub struct CompoundChild {
    pub shape: ShapeRef,
    pub offset: Vec3,
    pub rotation: Quat,
}

impl CompoundChild {
    #[must_use]
    pub fn transform(&self) -> Isometry {
        Isometry::new(self.offset, self.rotation)
    }
}

#[derive(Clone, Debug)]
pub struct CompoundShape {
    children: Vec<CompoundChild>,
    id_bits: u32,
}

impl CompoundShape {
    pub(crate) fn new(children: Vec<CompoundChild>) -> Self {
        Self {
            id_bits: bits_for_count(children.len()),
            children,
        }
    }

    #[must_use]
    pub fn children(&self) -> &[CompoundChild] {
        &self.children
    }

    /// Bits this compound adds to a sub-shape id.
    #[must_use]
    pub fn id_bits(&self) -> u32 {
        self.id_bits
    }
}

#[derive(Clone, Debug)]
pub struct DecoratedShape {
    pub inner: ShapeRef,
    pub offset: Vec3,
    pub rotation: Quat,
}

impl DecoratedShape {
    #[must_use]
    pub fn transform(&self) -> Isometry {
        Isometry::new(self.offset, self.rotation)
    }
}

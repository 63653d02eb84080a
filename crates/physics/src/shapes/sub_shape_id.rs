//! Path-encoded identifiers for the leaves of compound and mesh shapes.
//!
//! Every level of the shape tree pushes just enough bits to address its
//! children; unused high bits stay set, so an id that was never pushed to is
//! [`SubShapeId::EMPTY`].

use bytemuck::{Pod, Zeroable};

#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Pod, Zeroable)]
pub struct SubShapeId(u32);

impl SubShapeId {
    pub const EMPTY: Self = Self(u32::MAX);
    /// Longest path a shape may need.
    pub const MAX_BITS: u32 = 32;

    #[must_use]
    pub const fn from_raw(value: u32) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == u32::MAX
    }

    /// Splits off the `bits` lowest bits (the index at the current level) and
    /// returns it together with the id of the remainder of the path.
    #[must_use]
    pub fn pop(self, bits: u32) -> (u32, SubShapeId) {
        if bits == 0 {
            return (0, self);
        }
        if bits >= 32 {
            return (self.0, Self::EMPTY);
        }
        let mask = (1_u32 << bits) - 1;
        let value = self.0 & mask;
        let rest = (self.0 >> bits) | (u32::MAX << (32 - bits));
        (value, Self(rest))
    }
}

impl Default for SubShapeId {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Builds a [`SubShapeId`] while descending into a shape tree.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SubShapeIdCreator {
    value: u32,
    bits: u32,
}

impl SubShapeIdCreator {
    #[must_use]
    pub const fn new() -> Self {
        Self { value: 0, bits: 0 }
    }

    /// Appends `index` using `bits` bits.
    #[must_use]
    pub fn push(self, index: u32, bits: u32) -> Self {
        debug_assert!(self.bits + bits <= 32, "sub shape id overflow");
        debug_assert!(bits >= 32 || index < (1_u32 << bits));
        if bits == 0 {
            return self;
        }
        Self {
            value: self.value | index.checked_shl(self.bits).unwrap_or(0),
            bits: self.bits + bits,
        }
    }

    #[must_use]
    pub fn id(self) -> SubShapeId {
        let fill = u32::MAX.checked_shl(self.bits).unwrap_or(0);
        SubShapeId(self.value | fill)
    }
}

/// Bits needed to address `count` children.
#[must_use]
pub fn bits_for_count(count: usize) -> u32 {
    if count <= 1 {
        0
    } else {
        usize::BITS - (count - 1).leading_zeros()
    }
}

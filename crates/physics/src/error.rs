use bitflags::bitflags;
use thiserror::Error;

use crate::body::BodyId;

/// Errors returned by construction and body-management operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PhysicsError {
    #[error("invalid geometry: {0}")]
    InvalidGeometry(&'static str),
    #[error("invalid mass properties: {0}")]
    InvalidMassProperties(&'static str),
    #[error("body id {0:?} does not refer to a live body")]
    InvalidBodyId(BodyId),
    #[error("body {0:?} is still added to the broad phase")]
    BodyStillAdded(BodyId),
    #[error("body {0:?} is not added to the broad phase")]
    BodyNotAdded(BodyId),
    #[error("body {0:?} is already added to the broad phase")]
    BodyAlreadyAdded(BodyId),
    #[error("body store is full ({0} bodies)")]
    TooManyBodies(usize),
    #[error("invalid constraint: {0}")]
    InvalidConstraint(&'static str),
}

bitflags! {
    /// Soft errors reported by [`crate::PhysicsSystem::update`]. The step
    /// still completes; contacts beyond capacity are dropped.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct UpdateError: u32 {
        /// Manifolds could not all be cached for the next step.
        const MANIFOLD_CACHE_FULL = 1 << 0;
        /// The broad phase produced more body pairs than `max_body_pairs`.
        const BODY_PAIR_CACHE_FULL = 1 << 1;
        /// More contact constraints than `max_contact_constraints`.
        const CONTACT_CONSTRAINTS_FULL = 1 << 2;
    }
}

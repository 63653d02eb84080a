//! Callback traits through which the embedder observes and tunes a step.
//!
//! Listeners are shared trait objects and are called from the thread running
//! [`crate::PhysicsSystem::update`], one callback at a time.

use crate::body::{Body, BodyId, BodyManager};
use crate::collision::ContactManifold;
use crate::shapes::SubShapeId;

/// Answer of [`ContactListener::on_contact_validate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ValidateResult {
    /// Accept this manifold and skip validation for the rest of the body pair
    /// this step.
    #[default]
    AcceptAllContactsForThisBodyPair,
    /// Accept this manifold only.
    AcceptContact,
    /// Reject this manifold only.
    RejectContact,
    /// Reject this manifold and every other one of the body pair this step.
    RejectAllContactsForThisBodyPair,
}

/// Per contact values the listener may override in `on_contact_added` and
/// `on_contact_persisted`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContactSettings {
    pub combined_friction: f32,
    pub combined_restitution: f32,
    /// Sensor contacts are reported but never resolved.
    pub is_sensor: bool,
}

/// Identifies the two leaves of a contact.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubShapeIdPair {
    pub body1: BodyId,
    pub sub_shape1: SubShapeId,
    pub body2: BodyId,
    pub sub_shape2: SubShapeId,
}

/// Contact callbacks. `body1` is always the body with the lower id.
pub trait ContactListener: Send + Sync {
    fn on_contact_validate(&self, _body1: &Body, _body2: &Body, _manifold: &ContactManifold) -> ValidateResult {
        ValidateResult::AcceptAllContactsForThisBodyPair
    }

    /// First step in which the two leaves touch.
    fn on_contact_added(&self, _body1: &Body, _body2: &Body, _manifold: &ContactManifold, _settings: &mut ContactSettings) {}

    /// The leaves touched in the previous step as well.
    fn on_contact_persisted(&self, _body1: &Body, _body2: &Body, _manifold: &ContactManifold, _settings: &mut ContactSettings) {}

    /// The leaves touched in the previous step but no longer do. The bodies
    /// may already be destroyed.
    fn on_contact_removed(&self, _pair: &SubShapeIdPair) {}
}

pub trait BodyActivationListener: Send + Sync {
    fn on_body_activated(&self, id: BodyId, user_data: u64);
    fn on_body_deactivated(&self, id: BodyId, user_data: u64);
}

/// Runs at the end of every collision step.
pub trait PhysicsStepListener: Send + Sync {
    fn on_step(&self, delta_time: f32, bodies: &mut BodyManager);
}

/// Geometric mean, so a frictionless surface stays frictionless.
#[must_use]
pub fn combine_friction(a: f32, b: f32) -> f32 {
    (a * b).max(0.0).sqrt()
}

/// The bouncier material wins.
#[must_use]
pub fn combine_restitution(a: f32, b: f32) -> f32 {
    a.max(b)
}

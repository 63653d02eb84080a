//! Slot arena that owns all bodies.
//!
//! Every slot sits behind its own `RwLock`, so readers of different bodies
//! never contend. Callers holding `&mut BodyManager` can skip the locks with
//! [`BodyManager::get_mut`].

use std::sync::Arc;

use glam::Vec3;
use parking_lot::{MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

use super::{Body, BodyCreationSettings, BodyId};
use crate::error::PhysicsError;
use crate::listener::BodyActivationListener;
use crate::types::BroadPhaseLayer;

pub type BodyReadGuard<'a> = MappedRwLockReadGuard<'a, Body>;
pub type BodyWriteGuard<'a> = MappedRwLockWriteGuard<'a, Body>;

#[derive(Debug, Default)]
struct BodySlot {
    sequence: u8,
    body: Option<Body>,
}

pub struct BodyManager {
    slots: Vec<RwLock<BodySlot>>,
    /// Reused last in, first out.
    free_list: Vec<u32>,
    active: Vec<BodyId>,
    body_count: usize,
    max_bodies: usize,
    activation_listener: Option<Arc<dyn BodyActivationListener>>,
}

impl BodyManager {
    #[must_use]
    pub fn new(max_bodies: usize) -> Self {
        let max_bodies = max_bodies.min(BodyId::MAX_BODY_INDEX as usize + 1);
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            active: Vec::new(),
            body_count: 0,
            max_bodies,
            activation_listener: None,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.body_count
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.body_count == 0
    }

    #[must_use]
    pub fn max_bodies(&self) -> usize {
        self.max_bodies
    }

    pub fn set_activation_listener(&mut self, listener: Option<Arc<dyn BodyActivationListener>>) {
        self.activation_listener = listener;
    }

    /// Allocates a slot and builds the body in it.
    ///
    /// # Errors
    /// [`PhysicsError::TooManyBodies`] when the store is full, or the error
    /// from validating `settings`.
    pub fn create_body(&mut self, settings: &BodyCreationSettings, broad_phase_layer: BroadPhaseLayer) -> Result<BodyId, PhysicsError> {
        if self.body_count >= self.max_bodies {
            warn!(max_bodies = self.max_bodies, "body store is full");
            return Err(PhysicsError::TooManyBodies(self.max_bodies));
        }

        let (index, sequence) = if let Some(index) = self.free_list.pop() {
            let slot = self.slots[index as usize].get_mut();
            slot.sequence = slot.sequence.wrapping_add(1);
            (index, slot.sequence)
        } else {
            let index = u32::try_from(self.slots.len())
                .ok()
                .filter(|i| *i <= BodyId::MAX_BODY_INDEX)
                .ok_or(PhysicsError::TooManyBodies(self.max_bodies))?;
            self.slots.push(RwLock::new(BodySlot::default()));
            (index, 0)
        };

        let id = BodyId::new(index, sequence);
        match settings.build(id, broad_phase_layer) {
            Ok(body) => {
                self.slots[index as usize].get_mut().body = Some(body);
                self.body_count += 1;
                debug!(?id, motion_type = ?settings.motion_type, "created body");
                Ok(id)
            }
            Err(err) => {
                self.free_list.push(index);
                Err(err)
            }
        }
    }

    /// Frees the slot of `id`, releasing its shape reference.
    ///
    /// # Errors
    /// [`PhysicsError::InvalidBodyId`] for stale ids and
    /// [`PhysicsError::BodyStillAdded`] while the body is in the broad phase;
    /// the body is left untouched in both cases.
    pub fn destroy_body(&mut self, id: BodyId) -> Result<(), PhysicsError> {
        let body = self.get_mut(id).ok_or(PhysicsError::InvalidBodyId(id))?;
        if body.is_in_broad_phase() {
            warn!(?id, "destroy_body called on a body that is still added");
            return Err(PhysicsError::BodyStillAdded(id));
        }
        if body.is_active() {
            self.deactivate_body(id);
        }
        self.slots[id.index() as usize].get_mut().body = None;
        self.free_list.push(id.index());
        self.body_count -= 1;
        debug!(?id, "destroyed body");
        Ok(())
    }

    fn slot(&self, id: BodyId) -> Option<&RwLock<BodySlot>> {
        if id.is_invalid() {
            None
        } else {
            self.slots.get(id.index() as usize)
        }
    }

    /// Whether `id` refers to a live body.
    #[must_use]
    pub fn contains(&self, id: BodyId) -> bool {
        self.lock_read(id).is_some()
    }

    /// Shared lock on a body. `None` for stale or invalid ids.
    #[must_use]
    pub fn lock_read(&self, id: BodyId) -> Option<BodyReadGuard<'_>> {
        let guard = self.slot(id)?.read();
        RwLockReadGuard::try_map(guard, |slot| slot.body.as_ref().filter(|b| b.id == id)).ok()
    }

    /// Exclusive lock on a body. `None` for stale or invalid ids.
    #[must_use]
    pub fn lock_write(&self, id: BodyId) -> Option<BodyWriteGuard<'_>> {
        let guard = self.slot(id)?.write();
        RwLockWriteGuard::try_map(guard, |slot| slot.body.as_mut().filter(|b| b.id == id)).ok()
    }

    /// Locks two different bodies, always in slot order so concurrent callers
    /// cannot deadlock. Guards are returned in argument order.
    #[must_use]
    pub fn lock_pair_write(&self, a: BodyId, b: BodyId) -> Option<(BodyWriteGuard<'_>, BodyWriteGuard<'_>)> {
        if a.index() == b.index() {
            return None;
        }
        if a.index() < b.index() {
            let first = self.lock_write(a)?;
            let second = self.lock_write(b)?;
            Some((first, second))
        } else {
            let second = self.lock_write(b)?;
            let first = self.lock_write(a)?;
            Some((first, second))
        }
    }

    /// Lock free access through exclusive ownership of the manager.
    pub fn get_mut(&mut self, id: BodyId) -> Option<&mut Body> {
        if id.is_invalid() {
            return None;
        }
        self.slots
            .get_mut(id.index() as usize)?
            .get_mut()
            .body
            .as_mut()
            .filter(|b| b.id == id)
    }

    /// Ids of all live bodies in slot order.
    #[must_use]
    pub fn body_ids(&self) -> Vec<BodyId> {
        self.slots
            .iter()
            .filter_map(|slot| slot.read().body.as_ref().map(|b| b.id))
            .collect()
    }

    /// Ids of awake bodies in activation order.
    #[must_use]
    pub fn active_body_ids(&self) -> &[BodyId] {
        &self.active
    }

    /// Wakes a movable body that is in the broad phase. Returns `true` when
    /// the body was asleep.
    pub fn activate_body(&mut self, id: BodyId) -> bool {
        let next = self.active.len();
        let Some(body) = self.get_mut(id) else {
            return false;
        };
        if body.is_static() || body.is_active() || !body.is_in_broad_phase() {
            return false;
        }
        body.active_index = Some(next);
        if let Some(motion) = body.motion.as_mut() {
            motion.reset_sleep();
        }
        let user_data = body.user_data;
        self.active.push(id);
        if let Some(listener) = &self.activation_listener {
            listener.on_body_activated(id, user_data);
        }
        true
    }

    /// Puts a body to sleep and zeroes its velocity. Returns `true` when the
    /// body was awake.
    pub fn deactivate_body(&mut self, id: BodyId) -> bool {
        let Some(body) = self.get_mut(id) else {
            return false;
        };
        let Some(index) = body.active_index.take() else {
            return false;
        };
        if let Some(motion) = body.motion.as_mut() {
            motion.linear_velocity = Vec3::ZERO;
            motion.angular_velocity = Vec3::ZERO;
            motion.reset_sleep();
        }
        let user_data = body.user_data;
        self.active.swap_remove(index);
        if let Some(&moved) = self.active.get(index) {
            if let Some(moved_body) = self.get_mut(moved) {
                moved_body.active_index = Some(index);
            }
        }
        if let Some(listener) = &self.activation_listener {
            listener.on_body_deactivated(id, user_data);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::ShapeSettings;
    use crate::types::{MotionType, RVec3};
    use glam::Quat;

    fn settings() -> BodyCreationSettings {
        let shape = ShapeSettings::sphere(0.5).create().unwrap();
        BodyCreationSettings::new(shape, RVec3::ZERO, Quat::IDENTITY, MotionType::Dynamic, 1)
    }

    #[test]
    fn slot_reuse_bumps_sequence() {
        let mut bodies = BodyManager::new(16);
        let a = bodies.create_body(&settings(), BroadPhaseLayer(1)).unwrap();
        bodies.destroy_body(a).unwrap();
        let b = bodies.create_body(&settings(), BroadPhaseLayer(1)).unwrap();
        assert_eq!(a.index(), b.index());
        assert_ne!(a.sequence_number(), b.sequence_number());
        assert!(bodies.lock_read(a).is_none());
        assert!(bodies.lock_read(b).is_some());
        assert_eq!(bodies.destroy_body(a), Err(PhysicsError::InvalidBodyId(a)));
    }

    #[test]
    fn capacity_is_enforced() {
        let mut bodies = BodyManager::new(2);
        bodies.create_body(&settings(), BroadPhaseLayer(1)).unwrap();
        bodies.create_body(&settings(), BroadPhaseLayer(1)).unwrap();
        assert_eq!(
            bodies.create_body(&settings(), BroadPhaseLayer(1)),
            Err(PhysicsError::TooManyBodies(2))
        );
    }

    #[test]
    fn pair_lock_rejects_same_body() {
        let mut bodies = BodyManager::new(4);
        let a = bodies.create_body(&settings(), BroadPhaseLayer(1)).unwrap();
        let b = bodies.create_body(&settings(), BroadPhaseLayer(1)).unwrap();
        assert!(bodies.lock_pair_write(a, a).is_none());
        let (ga, gb) = bodies.lock_pair_write(b, a).unwrap();
        assert_eq!(ga.id(), b);
        assert_eq!(gb.id(), a);
    }

    #[test]
    fn invalid_id_lookups_fail_cleanly() {
        let mut bodies = BodyManager::new(4);
        assert!(bodies.lock_read(BodyId::INVALID).is_none());
        assert!(bodies.lock_write(BodyId::new(3, 0)).is_none());
        assert!(bodies.get_mut(BodyId::new(9999, 1)).is_none());
        assert!(!bodies.activate_body(BodyId::INVALID));
    }
}

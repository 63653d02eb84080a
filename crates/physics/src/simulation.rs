//! # Physics System
//!
//! [`PhysicsSystem`] owns the body store, the broad phase, the contact cache
//! and the registered constraints and listeners. [`PhysicsSystem::update`]
//! advances the world; every collision step runs the same fixed pipeline:
//!
//! 1.  refresh the broad-phase bounds of awake bodies,
//! 2.  find overlapping body pairs,
//! 3.  run the narrow phase and the contact callbacks,
//! 4.  per integration sub-step: apply forces, solve velocities, integrate,
//!     solve positions,
//! 5.  write the results back and update sleeping,
//! 6.  fire the step listeners.
//!
//! Pair finding and the narrow phase fan out over the [`JobSystem`]; all
//! other stages run on the calling thread in a fixed order, so two runs with
//! the same inputs produce bit identical results.

use std::collections::HashMap;
use std::sync::Arc;

use glam::Vec3;
use tracing::{debug_span, trace, warn};

use crate::body::{BodyId, BodyManager};
use crate::broad_phase::{
    bodies_can_collide, BodyPair, BroadPhase, BroadPhaseLayerInterface, DefaultLayers, ObjectLayerPairFilter,
    ObjectVsBroadPhaseLayerFilter,
};
use crate::collision::{self, CollideSettings, CollisionDispatcher, ContactManifold};
use crate::constraints::ConstraintRef;
use crate::error::UpdateError;
use crate::listener::{
    combine_friction, combine_restitution, BodyActivationListener, ContactListener, ContactSettings,
    PhysicsStepListener, SubShapeIdPair, ValidateResult,
};
use crate::settings::{PhysicsLimits, PhysicsSettings};
use crate::steps::contact::{self, CachedManifold, ContactConstraint, ManifoldCache};
use crate::steps::integration::{self, MotionState, DEFAULT_GRAVITY};
use crate::steps::sleep::{update_sleep_steps, IslandBuilder};
use crate::steps::{pair_mut, SolverBody};
use crate::types::to_f32;
use jobs::JobSystem;

/// A touching leaf pair that survived validation.
struct Contact {
    key: SubShapeIdPair,
    manifold: ContactManifold,
    settings: ContactSettings,
}

/// Bodies taking part in the solve of one collision step. The awake bodies
/// come first; anything they touch that is not awake follows as an anchor.
struct SolverSet {
    bodies: Vec<SolverBody>,
    motions: Vec<MotionState>,
    index: HashMap<BodyId, usize>,
    num_active: usize,
}

impl SolverSet {
    fn new(manager: &BodyManager) -> Self {
        let mut set = Self {
            bodies: Vec::new(),
            motions: Vec::new(),
            index: HashMap::new(),
            num_active: 0,
        };
        for &id in manager.active_body_ids() {
            if let Some(body) = manager.lock_read(id) {
                set.index.insert(id, set.bodies.len());
                set.bodies.push(SolverBody::from_body(&body));
                set.motions.push(MotionState::from_body(&body));
            }
        }
        set.num_active = set.bodies.len();
        set
    }

    fn is_active(&self, id: BodyId) -> bool {
        self.index.get(&id).is_some_and(|&i| i < self.num_active)
    }

    fn index_of(&mut self, manager: &BodyManager, id: BodyId) -> Option<usize> {
        if let Some(&i) = self.index.get(&id) {
            return Some(i);
        }
        let body = manager.lock_read(id)?;
        let i = self.bodies.len();
        self.index.insert(id, i);
        self.bodies.push(SolverBody::from_body(&body).anchored());
        self.motions.push(MotionState::from_body(&body));
        Some(i)
    }
}

/// The simulation: body store, broad phase, narrow phase and solver.
pub struct PhysicsSystem {
    pub(crate) settings: PhysicsSettings,
    limits: PhysicsLimits,
    gravity: Vec3,
    pub(crate) bodies: BodyManager,
    pub(crate) broad_phase: BroadPhase,
    pub(crate) layers: Arc<dyn BroadPhaseLayerInterface>,
    pub(crate) object_vs_broad_phase: Arc<dyn ObjectVsBroadPhaseLayerFilter>,
    pub(crate) object_pair: Arc<dyn ObjectLayerPairFilter>,
    dispatcher: CollisionDispatcher,
    contact_listener: Option<Arc<dyn ContactListener>>,
    step_listeners: Vec<Arc<dyn PhysicsStepListener>>,
    constraints: Vec<ConstraintRef>,
    manifold_cache: ManifoldCache,
    step_count: u64,
}

impl PhysicsSystem {
    #[must_use]
    pub fn new(
        settings: PhysicsSettings,
        limits: PhysicsLimits,
        layers: Arc<dyn BroadPhaseLayerInterface>,
        object_vs_broad_phase: Arc<dyn ObjectVsBroadPhaseLayerFilter>,
        object_pair: Arc<dyn ObjectLayerPairFilter>,
    ) -> Self {
        Self {
            settings,
            limits,
            gravity: DEFAULT_GRAVITY,
            bodies: BodyManager::new(limits.max_bodies),
            broad_phase: BroadPhase::new(layers.num_broad_phase_layers()),
            layers,
            object_vs_broad_phase,
            object_pair,
            dispatcher: CollisionDispatcher::new(),
            contact_listener: None,
            step_listeners: Vec::new(),
            constraints: Vec::new(),
            manifold_cache: ManifoldCache::new(),
            step_count: 0,
        }
    }

    /// System using [`DefaultLayers`] for the layer mapping and both filters.
    #[must_use]
    pub fn with_default_layers(settings: PhysicsSettings, limits: PhysicsLimits) -> Self {
        let layers = Arc::new(DefaultLayers);
        Self::new(settings, limits, layers.clone(), layers.clone(), layers)
    }

    #[must_use]
    pub fn settings(&self) -> &PhysicsSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: PhysicsSettings) {
        self.settings = settings;
    }

    #[must_use]
    pub fn limits(&self) -> &PhysicsLimits {
        &self.limits
    }

    #[must_use]
    pub fn gravity(&self) -> Vec3 {
        self.gravity
    }

    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.gravity = gravity;
    }

    /// Locking access to the bodies. Moving a body through a write lock does
    /// not update the broad phase until the body's next step; prefer the
    /// setters on [`PhysicsSystem`].
    #[must_use]
    pub fn bodies(&self) -> &BodyManager {
        &self.bodies
    }

    /// Lock free access for callers that own the system exclusively.
    pub fn bodies_mut(&mut self) -> &mut BodyManager {
        &mut self.bodies
    }

    pub fn set_contact_listener(&mut self, listener: Option<Arc<dyn ContactListener>>) {
        self.contact_listener = listener;
    }

    pub fn set_body_activation_listener(&mut self, listener: Option<Arc<dyn BodyActivationListener>>) {
        self.bodies.set_activation_listener(listener);
    }

    pub fn add_step_listener(&mut self, listener: Arc<dyn PhysicsStepListener>) {
        self.step_listeners.push(listener);
    }

    pub fn remove_step_listener(&mut self, listener: &Arc<dyn PhysicsStepListener>) {
        self.step_listeners.retain(|l| !Arc::ptr_eq(l, listener));
    }

    pub fn add_constraint(&mut self, constraint: ConstraintRef) {
        self.constraints.push(constraint);
    }

    pub fn remove_constraint(&mut self, constraint: &ConstraintRef) {
        self.constraints.retain(|c| !Arc::ptr_eq(c, constraint));
    }

    #[must_use]
    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    /// Rebuilds the broad-phase trees for faster queries. Not needed for
    /// correctness; call it after adding many bodies at once.
    pub fn optimize_broad_phase(&mut self) {
        self.broad_phase.optimize();
    }

    /// Number of contact manifolds remembered from the last step.
    #[must_use]
    pub fn num_cached_manifolds(&self) -> usize {
        self.manifold_cache.len()
    }

    /// Advances the world by `delta_time` seconds in `collision_steps` equal
    /// steps, each integrated in `integration_sub_steps` sub-steps.
    ///
    /// Overflowing a fixed capacity buffer drops the excess work and sets the
    /// matching bit of the returned [`UpdateError`]; the update still
    /// completes.
    pub fn update(
        &mut self,
        delta_time: f32,
        collision_steps: u32,
        integration_sub_steps: u32,
        jobs: &dyn JobSystem,
    ) -> UpdateError {
        let mut errors = UpdateError::empty();
        if collision_steps == 0 || delta_time.is_nan() || delta_time <= 0.0 {
            return errors;
        }
        let step_time = delta_time / collision_steps as f32;
        for _ in 0..collision_steps {
            errors |= self.step(step_time, integration_sub_steps.max(1), jobs);
        }
        if !errors.is_empty() {
            warn!(?errors, "physics update overflowed its buffers");
        }
        errors
    }

    fn step(&mut self, delta_time: f32, sub_steps: u32, jobs: &dyn JobSystem) -> UpdateError {
        let span = debug_span!("physics_step", step = self.step_count);
        let _enter = span.enter();
        self.step_count += 1;
        let mut errors = UpdateError::empty();

        self.wake_constrained_bodies();
        self.refresh_broad_phase_bounds();

        let mut pairs = self.broad_phase.find_pairs(
            &self.bodies,
            self.settings.speculative_contact_distance,
            &*self.object_vs_broad_phase,
            &*self.object_pair,
            jobs,
        );
        if pairs.len() > self.limits.max_body_pairs {
            warn!(pairs = pairs.len(), max = self.limits.max_body_pairs, "body pair buffer full");
            pairs.truncate(self.limits.max_body_pairs);
            errors |= UpdateError::BODY_PAIR_CACHE_FULL;
        }

        let manifolds = self.narrow_phase(&pairs, jobs);
        let (contacts, carried) = self.run_contact_callbacks(&pairs, manifolds);
        trace!(pairs = pairs.len(), contacts = contacts.len(), "narrow phase done");

        self.report_removed_contacts(&contacts, &carried);

        let mut set = SolverSet::new(&self.bodies);
        let sub_dt = delta_time / sub_steps as f32;
        let mut constraints = Vec::new();
        let mut sensors = Vec::new();
        for c in &contacts {
            if c.settings.is_sensor {
                sensors.push((c.key, CachedManifold { points: Vec::new() }));
                continue;
            }
            if constraints.len() == self.limits.max_contact_constraints {
                errors |= UpdateError::CONTACT_CONSTRAINTS_FULL;
                continue;
            }
            let (Some(i1), Some(i2)) =
                (set.index_of(&self.bodies, c.manifold.body1), set.index_of(&self.bodies, c.manifold.body2))
            else {
                continue;
            };
            constraints.push(ContactConstraint::new(
                c.key,
                &c.manifold,
                (i1, i2),
                &set.bodies,
                &c.settings,
                self.manifold_cache.get(&c.key),
                &self.settings,
                sub_dt,
            ));
        }
        if errors.contains(UpdateError::CONTACT_CONSTRAINTS_FULL) {
            warn!(max = self.limits.max_contact_constraints, "contact constraint buffer full");
        }
        let joints = self.collect_constraints(&mut set);

        self.solve(&mut set, &mut constraints, &joints, sub_dt, sub_steps);

        for solver in &set.bodies[..set.num_active] {
            if let Some(body) = self.bodies.get_mut(solver.id()) {
                solver.write_back(body);
                if let Some(motion) = body.moving_mut() {
                    motion.force = Vec3::ZERO;
                    motion.torque = Vec3::ZERO;
                }
            }
        }
        self.refresh_broad_phase_bounds();

        let mut cache: ManifoldCache = carried.into_iter().collect();
        cache.extend(sensors);
        cache.extend(constraints.iter().map(|c| (c.key, c.cache_entry())));
        if cache.len() > self.limits.max_contact_constraints {
            warn!(manifolds = cache.len(), max = self.limits.max_contact_constraints, "manifold cache full");
            errors |= UpdateError::MANIFOLD_CACHE_FULL;
            while cache.len() > self.limits.max_contact_constraints {
                cache.pop_last();
            }
        }
        self.manifold_cache = cache;

        self.update_sleeping(&set, &constraints, &joints);

        for listener in &self.step_listeners {
            listener.on_step(delta_time, &mut self.bodies);
        }
        errors
    }

    /// Constraints between an awake and a sleeping body wake the sleeper.
    fn wake_constrained_bodies(&mut self) {
        let mut wake = Vec::new();
        for constraint in &self.constraints {
            let constraint = constraint.lock();
            if !constraint.is_enabled() {
                continue;
            }
            let (a, b) = constraint.bodies();
            let (Some(ba), Some(bb)) = (self.bodies.lock_read(a), self.bodies.lock_read(b)) else {
                continue;
            };
            if ba.is_active() && !bb.is_active() && bb.is_dynamic() {
                wake.push(b);
            } else if bb.is_active() && !ba.is_active() && ba.is_dynamic() {
                wake.push(a);
            }
        }
        for id in wake {
            self.bodies.activate_body(id);
        }
    }

    pub(crate) fn refresh_broad_phase_bounds(&mut self) {
        let Self { bodies, broad_phase, .. } = self;
        for &id in bodies.active_body_ids() {
            if let Some(body) = bodies.lock_read(id) {
                if let Some(proxy) = body.broad_phase_proxy {
                    broad_phase.update_bounds(body.broad_phase_layer(), proxy, body.world_bounds());
                }
            }
        }
    }

    fn narrow_phase(&self, pairs: &[BodyPair], jobs: &dyn JobSystem) -> Vec<Vec<ContactManifold>> {
        let settings = CollideSettings {
            max_separation: self.settings.speculative_contact_distance,
            manifold_tolerance: self.settings.manifold_tolerance,
        };
        let bodies = &self.bodies;
        let dispatcher = &self.dispatcher;
        let use_reduction = self.settings.use_manifold_reduction;
        jobs::map_batched(jobs, "narrow_phase", pairs.len(), |i| {
            let (id1, id2) = pairs[i];
            let mut out = Vec::new();
            if let (Some(body1), Some(body2)) = (bodies.lock_read(id1), bodies.lock_read(id2)) {
                let reduce = use_reduction && body1.use_manifold_reduction && body2.use_manifold_reduction;
                collision::collide_bodies(dispatcher, &body1, &body2, &settings, reduce, &mut out);
            }
            out
        })
    }

    /// Validates the new manifolds with the contact listener and reports
    /// them as added or persisted. Returns the accepted contacts and the
    /// cache entries kept unchanged because both bodies sleep. Sleeping
    /// bodies touched by awake ones are woken.
    fn run_contact_callbacks(
        &mut self,
        pairs: &[BodyPair],
        manifolds: Vec<Vec<ContactManifold>>,
    ) -> (Vec<Contact>, Vec<(SubShapeIdPair, CachedManifold)>) {
        let carried: Vec<_> = self
            .manifold_cache
            .iter()
            .filter(|(key, _)| {
                let (Some(b1), Some(b2)) = (self.bodies.lock_read(key.body1), self.bodies.lock_read(key.body2)) else {
                    return false;
                };
                b1.is_in_broad_phase() && b2.is_in_broad_phase() && !b1.is_active() && !b2.is_active()
            })
            .map(|(key, cached)| (*key, cached.clone()))
            .collect();

        let listener = self.contact_listener.clone();
        let mut contacts = Vec::new();
        let mut wake = Vec::new();
        for (&(id1, id2), pair_manifolds) in pairs.iter().zip(manifolds) {
            if pair_manifolds.is_empty() {
                continue;
            }
            let (Some(body1), Some(body2)) = (self.bodies.lock_read(id1), self.bodies.lock_read(id2)) else {
                continue;
            };
            let mut validate = true;
            for manifold in pair_manifolds {
                if let (true, Some(listener)) = (validate, &listener) {
                    match listener.on_contact_validate(&body1, &body2, &manifold) {
                        ValidateResult::AcceptAllContactsForThisBodyPair => validate = false,
                        ValidateResult::AcceptContact => {}
                        ValidateResult::RejectContact => continue,
                        ValidateResult::RejectAllContactsForThisBodyPair => break,
                    }
                }

                let key = SubShapeIdPair {
                    body1: manifold.body1,
                    sub_shape1: manifold.sub_shape_id1,
                    body2: manifold.body2,
                    sub_shape2: manifold.sub_shape_id2,
                };
                let mut settings = ContactSettings {
                    combined_friction: combine_friction(body1.friction(), body2.friction()),
                    combined_restitution: combine_restitution(body1.restitution(), body2.restitution()),
                    is_sensor: body1.is_sensor() || body2.is_sensor(),
                };
                if let Some(listener) = &listener {
                    if self.manifold_cache.contains_key(&key) {
                        listener.on_contact_persisted(&body1, &body2, &manifold, &mut settings);
                    } else {
                        listener.on_contact_added(&body1, &body2, &manifold, &mut settings);
                    }
                }
                if !settings.is_sensor {
                    for (body, other) in [(&body1, &body2), (&body2, &body1)] {
                        if body.is_dynamic() && !body.is_active() && other.is_active() {
                            wake.push(body.id());
                        }
                    }
                }
                contacts.push(Contact { key, manifold, settings });
            }
        }
        for id in wake {
            self.bodies.activate_body(id);
        }
        (contacts, carried)
    }

    fn report_removed_contacts(&self, contacts: &[Contact], carried: &[(SubShapeIdPair, CachedManifold)]) {
        let Some(listener) = &self.contact_listener else {
            return;
        };
        let mut still_touching: Vec<SubShapeIdPair> =
            contacts.iter().map(|c| c.key).chain(carried.iter().map(|(key, _)| *key)).collect();
        still_touching.sort_unstable();
        for key in self.manifold_cache.keys() {
            if still_touching.binary_search(key).is_err() {
                listener.on_contact_removed(key);
            }
        }
    }

    /// Enabled constraints with at least one awake body, with their solver
    /// body indices.
    fn collect_constraints(&self, set: &mut SolverSet) -> Vec<(ConstraintRef, usize, usize)> {
        let mut joints = Vec::new();
        for constraint in &self.constraints {
            let (a, b) = {
                let c = constraint.lock();
                if !c.is_enabled() {
                    continue;
                }
                c.bodies()
            };
            if a == b || !(set.is_active(a) || set.is_active(b)) {
                continue;
            }
            if let (Some(i), Some(j)) = (set.index_of(&self.bodies, a), set.index_of(&self.bodies, b)) {
                joints.push((constraint.clone(), i, j));
            }
        }
        joints
    }

    fn solve(
        &self,
        set: &mut SolverSet,
        contacts: &mut [ContactConstraint],
        joints: &[(ConstraintRef, usize, usize)],
        sub_dt: f32,
        sub_steps: u32,
    ) {
        let settings = &self.settings;
        let bodies = &self.bodies;
        let broad_phase = &self.broad_phase;
        let object_vs_broad_phase = &*self.object_vs_broad_phase;
        let object_pair = &*self.object_pair;
        let mut cast = |body: &SolverBody, displacement: Vec3| {
            sweep(bodies, broad_phase, object_vs_broad_phase, object_pair, body, displacement)
        };

        for _ in 0..sub_steps {
            for (body, motion) in set.bodies.iter_mut().zip(&set.motions).take(set.num_active) {
                integration::apply_forces(body, motion, self.gravity, sub_dt);
            }
            contact::update_targets(contacts, &set.bodies, sub_dt);

            for (constraint, i, j) in joints {
                let (b1, b2) = pair_mut(&mut set.bodies, *i, *j);
                let mut constraint = constraint.lock();
                constraint.setup(b1, b2, sub_dt);
                if settings.constraint_warm_start {
                    constraint.warm_start(b1, b2);
                }
            }
            if settings.constraint_warm_start {
                contact::warm_start(contacts, &mut set.bodies);
            }

            for _ in 0..settings.num_velocity_steps {
                for (constraint, i, j) in joints {
                    let (b1, b2) = pair_mut(&mut set.bodies, *i, *j);
                    constraint.lock().solve_velocity(b1, b2);
                }
                contact::solve_velocity(contacts, &mut set.bodies);
            }

            for (body, motion) in set.bodies.iter_mut().zip(&set.motions).take(set.num_active) {
                integration::integrate(body, motion, sub_dt, settings.linear_cast_threshold, &mut cast);
            }

            for _ in 0..settings.num_position_steps {
                for (constraint, i, j) in joints {
                    let (b1, b2) = pair_mut(&mut set.bodies, *i, *j);
                    constraint.lock().solve_position(b1, b2, settings.baumgarte);
                }
                contact::solve_position(contacts, &mut set.bodies, settings);
            }
        }
    }

    /// Puts islands to sleep whose bodies have all been quiet long enough.
    fn update_sleeping(
        &mut self,
        set: &SolverSet,
        contacts: &[ContactConstraint],
        joints: &[(ConstraintRef, usize, usize)],
    ) {
        if !self.settings.allow_sleeping {
            return;
        }
        let active = &set.bodies[..set.num_active];
        let quiet: Vec<bool> = active
            .iter()
            .map(|solver| {
                self.bodies
                    .get_mut(solver.id())
                    .is_some_and(|body| update_sleep_steps(body, &self.settings))
            })
            .collect();

        let mut islands = IslandBuilder::new(active.len());
        let links = contacts
            .iter()
            .map(|c| (c.body1, c.body2))
            .chain(joints.iter().map(|(_, i, j)| (*i, *j)));
        for (i, j) in links {
            if i < active.len() && j < active.len() && active[i].is_dynamic() && active[j].is_dynamic() {
                islands.link(i, j);
            }
        }

        let mut sleepers = Vec::new();
        for island in islands.islands() {
            if island.iter().all(|&i| quiet[i]) {
                sleepers.extend(island.into_iter().map(|i| active[i].id()));
            }
        }
        if !sleepers.is_empty() {
            trace!(bodies = sleepers.len(), "deactivating islands");
        }
        for id in sleepers {
            self.bodies.deactivate_body(id);
        }
    }
}

/// First obstacle on the straight path of `body`'s center of mass, as a
/// fraction of `displacement`.
fn sweep(
    bodies: &BodyManager,
    broad_phase: &BroadPhase,
    object_vs_broad_phase: &dyn ObjectVsBroadPhaseLayerFilter,
    object_pair: &dyn ObjectLayerPairFilter,
    body: &SolverBody,
    displacement: Vec3,
) -> Option<f32> {
    let mover = bodies.lock_read(body.id())?;
    let layer = mover.object_layer();
    let origin = body.center_of_mass();
    let mut best: Option<f32> = None;
    broad_phase.cast_ray(
        to_f32(origin),
        displacement,
        1.0,
        |bp| object_vs_broad_phase.should_collide(layer, bp),
        |id, _| {
            if id == body.id() {
                return None;
            }
            let other = bodies.lock_read(id)?;
            if other.is_sensor()
                || !object_pair.should_collide(layer, other.object_layer())
                || !bodies_can_collide(&mover, &other)
            {
                return None;
            }
            let t = other.transform_relative_to(origin);
            let hit = other.shape().cast_ray(
                t.inverse_transform_point(Vec3::ZERO),
                t.inverse_transform_vector(displacement),
                best.unwrap_or(1.0),
            )?;
            best = Some(hit.fraction);
            best
        },
    );
    best
}

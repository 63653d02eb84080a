#![deny(clippy::all, clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_lossless,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]
//! # Physics Engine
//!
//! A rigid body physics core: convex and composite shapes, a body store with
//! generation checked ids, a layered dynamic AABB tree broad phase, a GJK/EPA
//! narrow phase and a sequential impulse solver with sleeping.
//!
//! ## Key Components
//!
//! -   **Shapes:** [`ShapeSettings`] validates geometry and produces shared,
//!     immutable [`Shape`]s (sphere, box, capsule, cylinder, convex hull,
//!     triangle mesh, compound and decorated shapes).
//! -   **Bodies:** [`BodyManager`] owns every [`Body`] behind a per slot
//!     lock. Bodies are referred to by [`BodyId`]; an id whose slot was
//!     reused no longer resolves.
//! -   **Simulation:** [`PhysicsSystem`] is the main entry point. It owns
//!     the body store, the broad phase and the contact cache and advances
//!     the world with [`PhysicsSystem::update`], which reports capacity
//!     overflows through [`UpdateError`] instead of failing.
//! -   **Extension points:** [`ContactListener`], [`BodyActivationListener`]
//!     and [`PhysicsStepListener`] observe a step; [`Constraint`]s join
//!     bodies together.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use physics::{Activation, BodyCreationSettings, MotionType, PhysicsSystem, ShapeSettings};
//!
//! let mut system = PhysicsSystem::with_default_layers(Default::default(), Default::default());
//! let ball = ShapeSettings::sphere(0.5).create()?;
//! let id = system.create_and_add_body(
//!     &BodyCreationSettings::new(ball, RVec3::new(0.0, 2.0, 0.0), Quat::IDENTITY, MotionType::Dynamic, MOVING),
//!     Activation::Activate,
//! )?;
//! let errors = system.update(1.0 / 60.0, 1, 1, &*jobs::default_job_system());
//! ```

pub mod body;
mod body_interface;
pub mod broad_phase;
pub mod collision;
pub mod constraints;
pub mod error;
pub mod listener;
pub mod query;
pub mod settings;
pub mod shapes;
pub mod simulation;
mod steps;
pub mod transform;
pub mod types;

pub use body::{
    Body, BodyCreationSettings, BodyId, BodyManager, CollisionGroup, GroupFilter, GroupFilterTable, MotionProperties,
    OverrideMassProperties,
};
pub use broad_phase::{
    BroadPhaseLayerInterface, DefaultLayers, ObjectLayerPairFilter, ObjectVsBroadPhaseLayerFilter, MOVING, NON_MOVING,
};
pub use collision::{ContactManifold, ContactPoints};
pub use constraints::{constraint_ref, Constraint, ConstraintRef, DistanceConstraint, FixedConstraint, PointConstraint};
pub use error::{PhysicsError, UpdateError};
pub use listener::{
    BodyActivationListener, ContactListener, ContactSettings, PhysicsStepListener, SubShapeIdPair, ValidateResult,
};
pub use query::{QueryFilter, RRayCast, RayCastResult};
pub use settings::{PhysicsLimits, PhysicsSettings};
pub use shapes::{MassProperties, Shape, ShapeRef, ShapeSettings, ShapeType, SubShapeId};
pub use simulation::PhysicsSystem;
pub use steps::integration::DEFAULT_GRAVITY;
pub use steps::SolverBody;
pub use transform::BodyTransform;
pub use types::{Aabb, Activation, BroadPhaseLayer, Isometry, MotionQuality, MotionType, ObjectLayer, RVec3, Real};

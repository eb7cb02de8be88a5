//! Tumble - a discrete-time rigid-body physics core
//!
//! Core modules, leaves first:
//! - `math`: AABB, tangent bases, quaternion integration
//! - `shapes`: sphere, plane, box, convex hull, triangle mesh, heightfield
//! - `body`: mass/inertia/kinematic state and sleep lifecycle
//! - `material`: contact material pair table
//! - `broadphase`: candidate pair culling (naive or sweep-and-prune)
//! - `narrowphase`: exact per-shape-pair contact generation
//! - `equations` / `solver`: sequential-impulse constraint resolution
//! - `raycast`: analytic and tree-accelerated ray queries
//! - `events`: begin/end contact diffing, drained by the caller
//! - `world`: the fixed-timestep pipeline tying it all together
//!
//! The simulation is single-threaded and deterministic: fixed timestep,
//! stable iteration order (by insertion), no hidden global state.

pub mod body;
pub mod broadphase;
pub mod equations;
pub mod error;
pub mod events;
pub mod material;
pub mod math;
pub mod narrowphase;
pub mod raycast;
pub mod shapes;
pub mod solver;
pub mod world;

pub use body::{Body, BodyType, SleepState};
pub use broadphase::BroadphaseKind;
pub use equations::ShapeRef;
pub use error::ShapeError;
pub use events::Event;
pub use material::{ContactMaterial, Material, MaterialId};
pub use math::Aabb;
pub use raycast::{Ray, RaycastHit, RaycastOptions};
pub use shapes::{Shape, ShapeKind};
pub use world::World;

/// Simulation tuning constants
pub mod consts {
    /// Default fixed timestep (60 Hz)
    pub const DEFAULT_DT: f32 = 1.0 / 60.0;
    /// Maximum substeps per `step_with_elapsed` call to prevent spiral of death
    pub const MAX_SUBSTEPS: u32 = 10;

    /// Solver iteration cap
    pub const SOLVER_ITERATIONS: u32 = 10;
    /// Solver early-out tolerance on total impulse change per pass
    pub const SOLVER_TOLERANCE: f32 = 1e-7;

    /// Default contact equation stiffness (spook `k`)
    pub const CONTACT_STIFFNESS: f32 = 1e7;
    /// Default contact equation relaxation, in timesteps (spook `d`)
    pub const CONTACT_RELAXATION: f32 = 3.0;
    /// Default friction coefficient when no material says otherwise
    pub const DEFAULT_FRICTION: f32 = 0.3;
    /// Default restitution when no material says otherwise
    pub const DEFAULT_RESTITUTION: f32 = 0.0;

    /// Combined linear+angular speed below which a body turns sleepy
    pub const SLEEP_SPEED_LIMIT: f32 = 0.1;
    /// Seconds a body must stay sleepy before it falls asleep
    pub const SLEEP_TIME_LIMIT: f32 = 1.0;

    /// Stand-in for an unbounded extent (kept finite so SAP sums stay sane)
    pub const HALF_SPACE_EXTENT: f32 = 1e30;
}

//! The simulation world: bodies, stepping pipeline and queries
//!
//! `step` advances exactly one fixed timestep through the full pipeline:
//! gravity, broadphase, narrowphase, contact wake-up, solve, integrate,
//! sleep bookkeeping, event diffing. `step_with_elapsed` wraps it in a
//! fixed-timestep accumulator with a substep cap and writes interpolated
//! transforms for rendering between substeps.

use std::collections::HashMap;

use glam::Vec3;

use crate::body::Body;
use crate::broadphase::{Broadphase, BroadphaseKind};
use crate::equations::{Equation, EquationKind, ShapeRef};
use crate::events::{Event, OverlapKeeper};
use crate::material::{ContactMaterial, Material, MaterialId, MaterialTable};
use crate::narrowphase::Narrowphase;
use crate::raycast::{intersect_shape, Ray, RaycastHit, RaycastOptions};
use crate::solver::GsSolver;

/// A rigid-body simulation world
#[derive(Debug)]
pub struct World {
    pub gravity: Vec3,
    pub solver: GsSolver,

    bodies: Vec<Body>,
    id_index: HashMap<u32, usize>,
    next_id: u32,

    broadphase: Broadphase,
    narrowphase: Narrowphase,
    materials: MaterialTable,

    /// Accumulated simulation time
    time: f32,
    /// Unsimulated remainder of wall time, in [0, dt)
    accumulator: f32,

    body_overlaps: OverlapKeeper<(u32, u32)>,
    shape_overlaps: OverlapKeeper<(ShapeRef, ShapeRef)>,
    events: Vec<Event>,

    // Per-step scratch, reused across steps
    pairs: Vec<(usize, usize)>,
    equations: Vec<Equation>,
    wake_queue: Vec<usize>,
}

impl World {
    pub fn new(gravity: Vec3) -> Self {
        Self {
            gravity,
            solver: GsSolver::default(),
            bodies: Vec::new(),
            id_index: HashMap::new(),
            next_id: 1,
            broadphase: Broadphase::default(),
            narrowphase: Narrowphase::default(),
            materials: MaterialTable::default(),
            time: 0.0,
            accumulator: 0.0,
            body_overlaps: OverlapKeeper::default(),
            shape_overlaps: OverlapKeeper::default(),
            events: Vec::new(),
            pairs: Vec::new(),
            equations: Vec::new(),
            wake_queue: Vec::new(),
        }
    }

    /// Accumulated simulation time in seconds
    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn set_broadphase(&mut self, kind: BroadphaseKind) {
        self.broadphase = Broadphase::new(kind);
    }

    /// Merge per-pair friction equations into one averaged pair
    pub fn set_friction_reduction(&mut self, enabled: bool) {
        self.narrowphase.friction_reduction = enabled;
    }

    /// Add a body, returning its stable id
    pub fn add_body(&mut self, mut body: Body) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        body.id = id;
        body.previous_position = body.position;
        body.previous_orientation = body.orientation;
        body.interpolated_position = body.position;
        body.interpolated_orientation = body.orientation;
        self.id_index.insert(id, self.bodies.len());
        self.bodies.push(body);
        log::debug!("added body {id}");
        id
    }

    /// Remove a body by id, returning it if present
    pub fn remove_body(&mut self, id: u32) -> Option<Body> {
        let index = self.id_index.remove(&id)?;
        let body = self.bodies.swap_remove(index);
        if let Some(moved) = self.bodies.get(index) {
            self.id_index.insert(moved.id, index);
        }
        log::debug!("removed body {id}");
        Some(body)
    }

    pub fn body(&self, id: u32) -> Option<&Body> {
        self.id_index.get(&id).map(|&i| &self.bodies[i])
    }

    pub fn body_mut(&mut self, id: u32) -> Option<&mut Body> {
        self.id_index.get(&id).map(|&i| &mut self.bodies[i])
    }

    pub fn bodies(&self) -> impl Iterator<Item = &Body> {
        self.bodies.iter()
    }

    pub fn bodies_mut(&mut self) -> impl Iterator<Item = &mut Body> {
        self.bodies.iter_mut()
    }

    pub fn add_material(&mut self, material: Material) -> MaterialId {
        self.materials.add_material(material)
    }

    pub fn add_contact_material(&mut self, a: MaterialId, b: MaterialId, cm: ContactMaterial) {
        self.materials.add_contact_material(a, b, cm);
    }

    /// Fallback contact parameters for unregistered material pairs
    pub fn default_contact_material_mut(&mut self) -> &mut ContactMaterial {
        &mut self.materials.default
    }

    /// Exact narrowphase overlap test between two bodies (no equations made)
    pub fn bodies_overlap(&mut self, id_a: u32, id_b: u32) -> bool {
        let (Some(&i), Some(&j)) = (self.id_index.get(&id_a), self.id_index.get(&id_b)) else {
            return false;
        };
        self.narrowphase
            .test_overlap(&self.bodies, i, j, &self.materials)
    }

    /// Take all events produced since the last drain
    pub fn drain_events(&mut self) -> impl Iterator<Item = Event> + '_ {
        self.events.drain(..)
    }

    /// Advance the simulation by exactly one timestep of `dt` seconds
    pub fn step(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }

        // Gravity as an accumulated force; sleeping bodies stay untouched.
        // Callers may have moved bodies directly, so awake AABBs are stale.
        for body in &mut self.bodies {
            if !body.is_sleeping() {
                body.mark_aabb_dirty();
            }
            if body.is_dynamic() && !body.is_sleeping() {
                body.force += self.gravity * body.mass();
            }
        }

        self.broadphase.collision_pairs(&mut self.bodies, &mut self.pairs);
        log::trace!("step t={:.3}: {} candidate pairs", self.time, self.pairs.len());

        self.equations.clear();
        self.narrowphase.generate(
            &self.bodies,
            &self.pairs,
            &self.materials,
            self.gravity,
            &mut self.equations,
        );

        self.wake_contact_neighbors();
        self.record_overlaps();

        self.solver.solve(dt, &mut self.equations, &mut self.bodies);

        let time = self.time;
        for body in &mut self.bodies {
            body.previous_position = body.position;
            body.previous_orientation = body.orientation;
            body.integrate(dt);
            body.force = Vec3::ZERO;
            body.torque = Vec3::ZERO;
            body.sleep_tick(time);
        }

        self.emit_contact_events();
        self.time += dt;
    }

    /// A sleeping body is woken when something fast touches it
    fn wake_contact_neighbors(&mut self) {
        self.wake_queue.clear();
        for eq in &self.equations {
            if !matches!(eq.kind, EquationKind::Contact { .. }) {
                continue;
            }
            for (sleeper, other) in [(eq.body_a, eq.body_b), (eq.body_b, eq.body_a)] {
                let s = &self.bodies[sleeper];
                let o = &self.bodies[other];
                if s.is_sleeping()
                    && s.is_dynamic()
                    && !o.is_sleeping()
                    && o.speed_squared() >= 4.0 * o.sleep_speed_limit * o.sleep_speed_limit
                {
                    self.wake_queue.push(sleeper);
                }
            }
        }
        for &i in &self.wake_queue {
            log::trace!("waking body {} from contact", self.bodies[i].id);
            self.bodies[i].wake_up();
        }
    }

    /// Feed this step's touching pairs to the overlap keepers and emit
    /// per-body collide events for each pair
    fn record_overlaps(&mut self) {
        let mut last_pair = None;
        for eq in &self.equations {
            if !matches!(eq.kind, EquationKind::Contact { .. }) {
                continue;
            }
            let (id_a, id_b) = (eq.shape_a.body, eq.shape_b.body);
            let body_key = (id_a.min(id_b), id_a.max(id_b));
            let shape_key = if eq.shape_a <= eq.shape_b {
                (eq.shape_a, eq.shape_b)
            } else {
                (eq.shape_b, eq.shape_a)
            };
            self.body_overlaps.observe(body_key);
            self.shape_overlaps.observe(shape_key);

            // One collide pair of events per body pair per step; equations
            // for the same pair are contiguous
            if last_pair != Some(body_key) {
                last_pair = Some(body_key);
                self.events.push(Event::Collide {
                    body: id_a,
                    other: id_b,
                    normal: eq.axis,
                });
                self.events.push(Event::Collide {
                    body: id_b,
                    other: id_a,
                    normal: -eq.axis,
                });
            }
        }
    }

    fn emit_contact_events(&mut self) {
        let mut begin = Vec::new();
        let mut end = Vec::new();
        self.body_overlaps.step_diff(
            |(body_a, body_b)| begin.push(Event::BeginContact { body_a, body_b }),
            |(body_a, body_b)| end.push(Event::EndContact { body_a, body_b }),
        );
        self.events.append(&mut begin);
        self.events.append(&mut end);
        self.shape_overlaps.step_diff(
            |(shape_a, shape_b)| begin.push(Event::BeginShapeContact { shape_a, shape_b }),
            |(shape_a, shape_b)| end.push(Event::EndShapeContact { shape_a, shape_b }),
        );
        self.events.append(&mut begin);
        self.events.append(&mut end);
    }

    /// Advance by wall-clock `elapsed` seconds in fixed `dt` substeps
    /// (at most `max_substeps`), then blend interpolated transforms from the
    /// leftover fraction.
    pub fn step_with_elapsed(&mut self, dt: f32, elapsed: f32, max_substeps: u32) {
        if dt <= 0.0 {
            return;
        }
        self.accumulator += elapsed;
        let mut substeps = 0;
        while self.accumulator >= dt && substeps < max_substeps.max(1) {
            self.step(dt);
            self.accumulator -= dt;
            substeps += 1;
        }
        // Falling behind: drop the backlog instead of spiraling
        if self.accumulator > dt {
            log::warn!(
                "simulation lagging, dropping {:.1} ms of backlog",
                (self.accumulator - dt) * 1000.0
            );
            self.accumulator = dt;
        }

        let blend = (self.accumulator / dt).clamp(0.0, 1.0);
        for body in &mut self.bodies {
            body.interpolated_position = body.previous_position.lerp(body.position, blend);
            body.interpolated_orientation =
                body.previous_orientation.slerp(body.orientation, blend);
        }
    }

    /// Nearest intersection along the ray, if any
    pub fn raycast_closest(&self, ray: &Ray, options: RaycastOptions) -> Option<RaycastHit> {
        let mut best: Option<RaycastHit> = None;
        self.raycast_visit(ray, options, &mut |hit| {
            if best.as_ref().is_none_or(|b| hit.t < b.t) {
                best = Some(hit);
            }
            true
        });
        best
    }

    /// Some intersection along the ray, if any (not necessarily the
    /// nearest); the scan stops at the first hit
    pub fn raycast_any(&self, ray: &Ray, options: RaycastOptions) -> Option<RaycastHit> {
        let mut found = None;
        self.raycast_visit(ray, options, &mut |hit| {
            found = Some(hit);
            false
        });
        found
    }

    /// Visit every intersection along the ray, in body order
    pub fn raycast_all(
        &self,
        ray: &Ray,
        options: RaycastOptions,
        mut visit: impl FnMut(RaycastHit),
    ) {
        self.raycast_visit(ray, options, &mut |hit| {
            visit(hit);
            true
        });
    }

    /// Shared scan behind the three query modes; the visitor returns false
    /// to stop after the current hit
    fn raycast_visit(
        &self,
        ray: &Ray,
        options: RaycastOptions,
        visit: &mut dyn FnMut(RaycastHit) -> bool,
    ) {
        let ray_length = ray.length();
        let mut stop = false;
        for body in &self.bodies {
            if options.collision_filter_mask & body.collision_filter_group == 0
                || body.collision_filter_mask & options.collision_filter_group == 0
            {
                continue;
            }
            let r = body.bounding_radius();
            if segment_distance_sq(ray.from, ray.to, body.position) > r * r {
                continue;
            }
            for (si, entry) in body.shapes.iter().enumerate() {
                let shape = &entry.shape;
                if options.collision_filter_mask & shape.collision_filter_group == 0
                    || shape.collision_filter_mask & options.collision_filter_group == 0
                {
                    continue;
                }
                let (pos, quat) = body.shape_world_transform(si);
                intersect_shape(shape, pos, quat, ray, options.skip_backfaces, &mut |hit| {
                    if stop {
                        return;
                    }
                    let keep_going = visit(RaycastHit {
                        body: body.id,
                        shape: si as u32,
                        point: hit.point,
                        normal: hit.normal,
                        t: hit.t,
                        distance: hit.t * ray_length,
                    });
                    if !keep_going {
                        stop = true;
                    }
                });
                if stop {
                    return;
                }
            }
        }
    }
}

fn segment_distance_sq(from: Vec3, to: Vec3, p: Vec3) -> f32 {
    let d = to - from;
    let len_sq = d.length_squared();
    let t = if len_sq > 1e-12 {
        ((p - from).dot(d) / len_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };
    (from + d * t - p).length_squared()
}

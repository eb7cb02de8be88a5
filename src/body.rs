//! Rigid bodies: mass, inertia, kinematic state and the sleep lifecycle
//!
//! A body owns its shapes by value; each shape is addressed as
//! `(body id, shape index)` by narrowphase and events. Derived quantities
//! (inverse mass, world inverse inertia, the AABB) are kept consistent by
//! the mutators here, never patched from outside.

use glam::{Mat3, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::consts::{SLEEP_SPEED_LIMIT, SLEEP_TIME_LIMIT};
use crate::material::MaterialId;
use crate::math::{self, Aabb};
use crate::shapes::Shape;

/// Lifecycle type of a body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyType {
    /// Fully simulated: forces, contacts, integration
    Dynamic,
    /// Never moves; infinite effective mass
    Static,
    /// Moves by its velocity but is immune to forces and impulses
    Kinematic,
}

/// Sleep state of a body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SleepState {
    Awake,
    /// Below the speed limit, waiting out the time limit
    Sleepy,
    /// Excluded from integration; zero effective mass in the solver
    Sleeping,
}

/// A shape attached to a body at a local offset and orientation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShapeEntry {
    pub shape: Shape,
    pub offset: Vec3,
    pub orientation: Quat,
}

/// A rigid body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Body {
    /// World-assigned stable id (0 until added to a world)
    pub(crate) id: u32,
    pub body_type: BodyType,

    pub position: Vec3,
    pub orientation: Quat,
    pub velocity: Vec3,
    pub angular_velocity: Vec3,

    /// Force accumulator, cleared every step
    pub force: Vec3,
    /// Torque accumulator, cleared every step
    pub torque: Vec3,

    mass: f32,
    inv_mass: f32,
    inertia_local: Vec3,
    inv_inertia_local: Vec3,
    #[serde(skip)]
    pub(crate) inv_inertia_world: Mat3,

    pub linear_damping: f32,
    pub angular_damping: f32,
    /// Per-axis multipliers on linear motion (0 locks an axis)
    pub linear_factor: Vec3,
    /// Per-axis multipliers on angular motion
    pub angular_factor: Vec3,

    pub collision_filter_group: u32,
    pub collision_filter_mask: u32,
    pub collision_response: bool,
    pub material: Option<MaterialId>,

    pub shapes: Vec<ShapeEntry>,
    bounding_radius: f32,

    pub sleep_state: SleepState,
    pub allow_sleep: bool,
    pub sleep_speed_limit: f32,
    pub sleep_time_limit: f32,
    /// Simulation time at which the body last turned sleepy
    sleepy_since: f32,

    #[serde(skip)]
    aabb: Aabb,
    #[serde(skip, default = "default_true")]
    aabb_dirty: bool,

    /// Transform at the start of the last substep, for interpolation
    pub previous_position: Vec3,
    pub previous_orientation: Quat,
    /// Render-facing transform blended between previous and current
    pub interpolated_position: Vec3,
    pub interpolated_orientation: Quat,
}

fn default_true() -> bool {
    true
}

impl Body {
    fn new(body_type: BodyType, mass: f32) -> Self {
        let mut body = Self {
            id: 0,
            body_type,
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            force: Vec3::ZERO,
            torque: Vec3::ZERO,
            mass,
            inv_mass: 0.0,
            inertia_local: Vec3::ZERO,
            inv_inertia_local: Vec3::ZERO,
            inv_inertia_world: Mat3::IDENTITY,
            linear_damping: 0.01,
            angular_damping: 0.01,
            linear_factor: Vec3::ONE,
            angular_factor: Vec3::ONE,
            collision_filter_group: 1,
            collision_filter_mask: u32::MAX,
            collision_response: true,
            material: None,
            shapes: Vec::new(),
            bounding_radius: 0.0,
            sleep_state: SleepState::Awake,
            allow_sleep: true,
            sleep_speed_limit: SLEEP_SPEED_LIMIT,
            sleep_time_limit: SLEEP_TIME_LIMIT,
            sleepy_since: 0.0,
            aabb: Aabb::EMPTY,
            aabb_dirty: true,
            previous_position: Vec3::ZERO,
            previous_orientation: Quat::IDENTITY,
            interpolated_position: Vec3::ZERO,
            interpolated_orientation: Quat::IDENTITY,
        };
        body.update_mass_properties();
        body
    }

    pub fn dynamic(mass: f32) -> Self {
        Self::new(BodyType::Dynamic, mass.max(0.0))
    }

    pub fn fixed() -> Self {
        Self::new(BodyType::Static, 0.0)
    }

    pub fn kinematic() -> Self {
        Self::new(BodyType::Kinematic, 0.0)
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self.previous_position = position;
        self.interpolated_position = position;
        self
    }

    pub fn with_shape(mut self, shape: Shape) -> Self {
        self.add_shape(shape, Vec3::ZERO, Quat::IDENTITY);
        self
    }

    pub fn with_material(mut self, material: MaterialId) -> Self {
        self.material = Some(material);
        self
    }

    /// Stable id assigned by the world (0 before `add_body`)
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn mass(&self) -> f32 {
        self.mass
    }

    pub fn inv_mass(&self) -> f32 {
        self.inv_mass
    }

    pub fn inv_inertia_local(&self) -> Vec3 {
        self.inv_inertia_local
    }

    pub fn is_dynamic(&self) -> bool {
        self.body_type == BodyType::Dynamic && self.inv_mass > 0.0
    }

    pub fn is_sleeping(&self) -> bool {
        self.sleep_state == SleepState::Sleeping
    }

    /// Attach a shape at a local offset and orientation
    pub fn add_shape(&mut self, shape: Shape, offset: Vec3, orientation: Quat) {
        self.shapes.push(ShapeEntry {
            shape,
            offset,
            orientation,
        });
        self.update_mass_properties();
        self.update_bounding_radius();
        self.aabb_dirty = true;
    }

    /// Recompute inverse mass and inertia from mass, type and shapes.
    ///
    /// Non-dynamic bodies get zero inverse mass/inertia. Shape offsets add
    /// their diagonal parallel-axis terms; products of inertia are ignored.
    pub fn update_mass_properties(&mut self) {
        if self.body_type != BodyType::Dynamic || self.mass <= 0.0 {
            self.inv_mass = 0.0;
            self.inertia_local = Vec3::ZERO;
            self.inv_inertia_local = Vec3::ZERO;
            self.inv_inertia_world = Mat3::ZERO;
            return;
        }
        self.inv_mass = 1.0 / self.mass;

        let mut inertia = Vec3::ZERO;
        if !self.shapes.is_empty() {
            let share = self.mass / self.shapes.len() as f32;
            for entry in &self.shapes {
                let mut i = entry.shape.local_inertia(share);
                let r = entry.offset;
                i.x += share * (r.y * r.y + r.z * r.z);
                i.y += share * (r.x * r.x + r.z * r.z);
                i.z += share * (r.x * r.x + r.y * r.y);
                inertia += i;
            }
        }
        self.inertia_local = inertia;
        // Near-singular components are clamped to immovable rather than blown up
        self.inv_inertia_local = Vec3::new(
            if inertia.x > 1e-9 { 1.0 / inertia.x } else { 0.0 },
            if inertia.y > 1e-9 { 1.0 / inertia.y } else { 0.0 },
            if inertia.z > 1e-9 { 1.0 / inertia.z } else { 0.0 },
        );
        self.update_inertia_world();
    }

    pub(crate) fn update_inertia_world(&mut self) {
        self.inv_inertia_world = math::inv_inertia_world(self.orientation, self.inv_inertia_local);
    }

    fn update_bounding_radius(&mut self) {
        self.bounding_radius = self
            .shapes
            .iter()
            .map(|e| e.offset.length() + e.shape.bounding_radius())
            .fold(0.0f32, f32::max);
    }

    /// Radius of the bounding sphere around the body origin
    pub fn bounding_radius(&self) -> f32 {
        self.bounding_radius
    }

    /// World AABB, recomputing it first if the body moved
    pub fn aabb(&mut self) -> Aabb {
        if self.aabb_dirty {
            let mut aabb = Aabb::EMPTY;
            for entry in &self.shapes {
                let pos = self.position + self.orientation * entry.offset;
                let quat = self.orientation * entry.orientation;
                aabb.extend(&entry.shape.world_aabb(pos, quat));
            }
            self.aabb = aabb;
            self.aabb_dirty = false;
        }
        self.aabb
    }

    pub(crate) fn mark_aabb_dirty(&mut self) {
        self.aabb_dirty = true;
    }

    /// World transform of shape `index`
    pub fn shape_world_transform(&self, index: usize) -> (Vec3, Quat) {
        let entry = &self.shapes[index];
        (
            self.position + self.orientation * entry.offset,
            self.orientation * entry.orientation,
        )
    }

    /// Apply a world-frame force at a world-frame offset from the center of mass
    pub fn apply_force(&mut self, force: Vec3, rel_point: Vec3) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        self.wake_up();
        self.force += force;
        self.torque += rel_point.cross(force);
    }

    /// Apply a body-local force at a body-local point
    pub fn apply_local_force(&mut self, local_force: Vec3, local_point: Vec3) {
        let force = self.orientation * local_force;
        let rel = self.orientation * local_point;
        self.apply_force(force, rel);
    }

    /// Apply a world-frame impulse at a world-frame offset; wakes the body
    pub fn apply_impulse(&mut self, impulse: Vec3, rel_point: Vec3) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        self.wake_up();
        self.velocity += impulse * self.inv_mass * self.linear_factor;
        self.angular_velocity +=
            (self.inv_inertia_world * rel_point.cross(impulse)) * self.angular_factor;
    }

    /// Apply a body-local impulse at a body-local point
    pub fn apply_local_impulse(&mut self, local_impulse: Vec3, local_point: Vec3) {
        let impulse = self.orientation * local_impulse;
        let rel = self.orientation * local_point;
        self.apply_impulse(impulse, rel);
    }

    /// Velocity of a world-space point rigidly attached to the body
    pub fn point_velocity(&self, world_point: Vec3) -> Vec3 {
        self.velocity + self.angular_velocity.cross(world_point - self.position)
    }

    pub fn wake_up(&mut self) {
        self.sleep_state = SleepState::Awake;
    }

    /// Force the body asleep, zeroing its motion
    pub fn sleep(&mut self) {
        self.sleep_state = SleepState::Sleeping;
        self.velocity = Vec3::ZERO;
        self.angular_velocity = Vec3::ZERO;
        self.force = Vec3::ZERO;
        self.torque = Vec3::ZERO;
    }

    pub(crate) fn speed_squared(&self) -> f32 {
        self.velocity.length_squared() + self.angular_velocity.length_squared()
    }

    /// Advance the sleep state machine; `time` is accumulated simulation time
    pub(crate) fn sleep_tick(&mut self, time: f32) {
        if !self.allow_sleep || self.body_type != BodyType::Dynamic {
            return;
        }
        let speed_sq = self.speed_squared();
        let limit_sq = self.sleep_speed_limit * self.sleep_speed_limit;
        match self.sleep_state {
            SleepState::Awake if speed_sq < limit_sq => {
                self.sleep_state = SleepState::Sleepy;
                self.sleepy_since = time;
            }
            SleepState::Sleepy if speed_sq >= limit_sq => {
                self.wake_up();
            }
            SleepState::Sleepy if time - self.sleepy_since > self.sleep_time_limit => {
                log::trace!("body {} falling asleep", self.id);
                self.sleep();
            }
            _ => {}
        }
    }

    /// Semi-implicit Euler step: velocity from accumulated force, then
    /// position from velocity. Damping decays exponentially with dt.
    pub(crate) fn integrate(&mut self, dt: f32) {
        if self.is_sleeping() || self.body_type == BodyType::Static {
            return;
        }

        if self.body_type == BodyType::Dynamic {
            self.velocity += self.force * self.inv_mass * dt * self.linear_factor;
            self.angular_velocity +=
                (self.inv_inertia_world * self.torque) * dt * self.angular_factor;
            self.velocity *= (1.0 - self.linear_damping).powf(dt);
            self.angular_velocity *= (1.0 - self.angular_damping).powf(dt);
        }

        self.position += self.velocity * dt;
        self.orientation = math::integrate_quat(self.orientation, self.angular_velocity, dt)
            .normalize();
        self.update_inertia_world();
        self.aabb_dirty = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_body_has_zero_inverse_mass() {
        let mut b = Body::fixed();
        b.add_shape(Shape::sphere(1.0).unwrap(), Vec3::ZERO, Quat::IDENTITY);
        assert_eq!(b.inv_mass(), 0.0);
        assert_eq!(b.inv_inertia_local(), Vec3::ZERO);
    }

    #[test]
    fn test_dynamic_mass_properties() {
        let mut b = Body::dynamic(2.0);
        b.add_shape(Shape::sphere(0.5).unwrap(), Vec3::ZERO, Quat::IDENTITY);
        assert_eq!(b.inv_mass(), 0.5);
        // Solid sphere: I = 2/5 m r^2 = 0.2
        assert!((1.0 / b.inv_inertia_local().x - 0.2).abs() < 1e-5);
    }

    #[test]
    fn test_offset_shape_adds_parallel_axis_term() {
        let mut centered = Body::dynamic(1.0);
        centered.add_shape(Shape::sphere(0.5).unwrap(), Vec3::ZERO, Quat::IDENTITY);
        let mut offset = Body::dynamic(1.0);
        offset.add_shape(Shape::sphere(0.5).unwrap(), Vec3::new(0.0, 2.0, 0.0), Quat::IDENTITY);
        // Inertia about x grows with the offset, about y it does not
        assert!(
            1.0 / offset.inv_inertia_local().x > 1.0 / centered.inv_inertia_local().x
        );
        assert!(
            (offset.inv_inertia_local().y - centered.inv_inertia_local().y).abs() < 1e-6
        );
    }

    #[test]
    fn test_impulse_changes_velocity_and_wakes() {
        let mut b = Body::dynamic(2.0);
        b.add_shape(Shape::sphere(0.5).unwrap(), Vec3::ZERO, Quat::IDENTITY);
        b.sleep();
        assert!(b.is_sleeping());
        b.apply_impulse(Vec3::new(4.0, 0.0, 0.0), Vec3::ZERO);
        assert_eq!(b.sleep_state, SleepState::Awake);
        assert!((b.velocity.x - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_impulse_ignored_by_static() {
        let mut b = Body::fixed();
        b.apply_impulse(Vec3::X, Vec3::ZERO);
        assert_eq!(b.velocity, Vec3::ZERO);
    }

    #[test]
    fn test_sleep_lifecycle() {
        let mut b = Body::dynamic(1.0);
        b.add_shape(Shape::sphere(0.5).unwrap(), Vec3::ZERO, Quat::IDENTITY);
        b.velocity = Vec3::new(0.01, 0.0, 0.0); // Below default speed limit

        b.sleep_tick(0.0);
        assert_eq!(b.sleep_state, SleepState::Sleepy);
        // Not yet past the time limit
        b.sleep_tick(0.5);
        assert_eq!(b.sleep_state, SleepState::Sleepy);
        // Past it
        b.sleep_tick(1.1);
        assert_eq!(b.sleep_state, SleepState::Sleeping);
        assert_eq!(b.velocity, Vec3::ZERO);
    }

    #[test]
    fn test_sleepy_body_speeding_up_wakes() {
        let mut b = Body::dynamic(1.0);
        b.velocity = Vec3::new(0.01, 0.0, 0.0);
        b.sleep_tick(0.0);
        assert_eq!(b.sleep_state, SleepState::Sleepy);
        b.velocity = Vec3::new(5.0, 0.0, 0.0);
        b.sleep_tick(0.1);
        assert_eq!(b.sleep_state, SleepState::Awake);
    }

    #[test]
    fn test_free_flight_integration() {
        let mut b = Body::dynamic(1.0).with_position(Vec3::new(1.0, 2.0, 3.0));
        b.linear_damping = 0.0;
        b.velocity = Vec3::new(2.0, 0.0, -1.0);
        let dt = 1.0 / 60.0;
        for _ in 0..60 {
            b.integrate(dt);
        }
        let expected = Vec3::new(3.0, 2.0, 2.0);
        assert!((b.position - expected).length() < 1e-4);
    }

    proptest::proptest! {
        #[test]
        fn prop_undamped_free_flight_is_linear(
            vx in -5.0f32..5.0,
            vy in -5.0f32..5.0,
            vz in -5.0f32..5.0,
        ) {
            let mut b = Body::dynamic(1.0);
            b.linear_damping = 0.0;
            b.velocity = Vec3::new(vx, vy, vz);
            let dt = 1.0 / 60.0;
            for _ in 0..30 {
                b.integrate(dt);
            }
            let expected = b.velocity * 0.5;
            proptest::prop_assert!((b.position - expected).length() < 1e-3);
        }
    }

    #[test]
    fn test_linear_factor_locks_axis() {
        let mut b = Body::dynamic(1.0);
        b.linear_factor = Vec3::new(1.0, 0.0, 1.0);
        b.force = Vec3::new(1.0, 1.0, 0.0);
        b.integrate(1.0 / 60.0);
        assert_eq!(b.velocity.y, 0.0);
        assert!(b.velocity.x > 0.0);
    }
}

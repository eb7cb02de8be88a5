//! Contact and friction constraint equations
//!
//! Each equation is one scalar velocity constraint between two bodies along
//! a direction: the contact normal (one-sided, push-apart only) or a
//! friction tangent (bounded both ways). Stabilization uses the spook
//! parameterization: stiffness and relaxation are re-derived into `a`, `b`
//! and `eps` for the current timestep, so changing dt never destabilizes a
//! tuned scene.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::solver::SolverBody;

/// Identifies one shape on one body, for event bookkeeping only
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ShapeRef {
    pub body: u32,
    pub shape: u32,
}

/// What the equation constrains
#[derive(Debug, Clone, Copy)]
pub enum EquationKind {
    /// Non-penetration along the contact normal
    Contact { restitution: f32 },
    /// Tangential stick/slip
    Friction,
}

/// A single scalar velocity constraint between two bodies
#[derive(Debug, Clone)]
pub struct Equation {
    /// Index of body A in the step's body list
    pub body_a: usize,
    pub body_b: usize,
    pub shape_a: ShapeRef,
    pub shape_b: ShapeRef,

    /// Constraint direction in world space, oriented from A toward B
    pub axis: Vec3,
    /// World offset from A's center of mass to its contact point
    pub ri: Vec3,
    /// World offset from B's center of mass to its contact point
    pub rj: Vec3,

    /// Force bounds; the solver clamps the impulse to [min, max] * dt
    pub min_force: f32,
    pub max_force: f32,

    /// Spook stiffness `k`
    pub stiffness: f32,
    /// Spook relaxation `d`, in timesteps
    pub relaxation: f32,
    a: f32,
    b: f32,
    pub eps: f32,

    /// Resulting constraint force (lambda / dt), filled in after solving
    pub multiplier: f32,
    /// Disabled equations are skipped by the solver (collision_response off)
    pub enabled: bool,

    pub kind: EquationKind,
}

impl Equation {
    pub fn new_contact(
        body_a: usize,
        body_b: usize,
        shape_a: ShapeRef,
        shape_b: ShapeRef,
        axis: Vec3,
        ri: Vec3,
        rj: Vec3,
        restitution: f32,
    ) -> Self {
        Self {
            body_a,
            body_b,
            shape_a,
            shape_b,
            axis,
            ri,
            rj,
            min_force: 0.0,
            max_force: f32::MAX,
            stiffness: crate::consts::CONTACT_STIFFNESS,
            relaxation: crate::consts::CONTACT_RELAXATION,
            a: 0.0,
            b: 0.0,
            eps: 0.0,
            multiplier: 0.0,
            enabled: true,
            kind: EquationKind::Contact { restitution },
        }
    }

    pub fn new_friction(
        body_a: usize,
        body_b: usize,
        shape_a: ShapeRef,
        shape_b: ShapeRef,
        axis: Vec3,
        ri: Vec3,
        rj: Vec3,
        force_bound: f32,
    ) -> Self {
        Self {
            body_a,
            body_b,
            shape_a,
            shape_b,
            axis,
            ri,
            rj,
            min_force: -force_bound,
            max_force: force_bound,
            stiffness: crate::consts::CONTACT_STIFFNESS,
            relaxation: crate::consts::CONTACT_RELAXATION,
            a: 0.0,
            b: 0.0,
            eps: 0.0,
            multiplier: 0.0,
            enabled: true,
            kind: EquationKind::Friction,
        }
    }

    /// Re-derive `a`, `b`, `eps` from stiffness/relaxation for timestep `dt`
    pub fn update_spook(&mut self, dt: f32) {
        let k = self.stiffness;
        let d = self.relaxation;
        self.a = 4.0 / (dt * (1.0 + 4.0 * d));
        self.b = (4.0 * d) / (1.0 + 4.0 * d);
        self.eps = 4.0 / (dt * dt * k * (1.0 + 4.0 * d));
    }

    /// Right-hand side: stabilized position error plus target relative
    /// velocity plus the free-motion contribution of accumulated forces.
    pub fn compute_b(&self, dt: f32, bodies: &[SolverBody]) -> f32 {
        let ba = &bodies[self.body_a];
        let bb = &bodies[self.body_b];
        let n = self.axis;
        let rixn = self.ri.cross(n);
        let rjxn = self.rj.cross(n);

        let g = match self.kind {
            // Penetration depth: separation of the two contact points along n
            EquationKind::Contact { .. } => {
                n.dot((bb.position + self.rj) - (ba.position + self.ri))
            }
            EquationKind::Friction => 0.0,
        };

        let e_plus_one = match self.kind {
            EquationKind::Contact { restitution } => 1.0 + restitution,
            EquationKind::Friction => 1.0,
        };
        let gw = e_plus_one * (bb.velocity.dot(n) - ba.velocity.dot(n))
            + bb.angular_velocity.dot(rjxn)
            - ba.angular_velocity.dot(rixn);

        let gi_mf = self.compute_gi_mf(bodies);

        -g * self.a - gw * self.b - dt * gi_mf
    }

    /// G * M^-1 * f: how accumulated external forces move the constraint
    fn compute_gi_mf(&self, bodies: &[SolverBody]) -> f32 {
        let ba = &bodies[self.body_a];
        let bb = &bodies[self.body_b];
        let n = self.axis;
        let rixn = self.ri.cross(n);
        let rjxn = self.rj.cross(n);
        n.dot(bb.force * bb.inv_mass - ba.force * ba.inv_mass)
            + rjxn.dot(bb.inv_inertia_world * bb.torque)
            - rixn.dot(ba.inv_inertia_world * ba.torque)
    }

    /// Effective inverse mass along the constraint, plus softening
    pub fn compute_c(&self, bodies: &[SolverBody]) -> f32 {
        let ba = &bodies[self.body_a];
        let bb = &bodies[self.body_b];
        let rixn = self.ri.cross(self.axis);
        let rjxn = self.rj.cross(self.axis);
        ba.inv_mass
            + bb.inv_mass
            + rixn.dot(ba.inv_inertia_world * rixn)
            + rjxn.dot(bb.inv_inertia_world * rjxn)
            + self.eps
    }

    /// Constraint-space relative velocity of the solver accumulators
    pub fn compute_gw_lambda(&self, bodies: &[SolverBody]) -> f32 {
        let ba = &bodies[self.body_a];
        let bb = &bodies[self.body_b];
        let n = self.axis;
        n.dot(bb.vlambda - ba.vlambda) + self.rj.cross(n).dot(bb.wlambda)
            - self.ri.cross(n).dot(ba.wlambda)
    }

    /// Apply an impulse delta to both bodies' solver-only accumulators
    pub fn add_to_wlambda(&self, bodies: &mut [SolverBody], delta_lambda: f32) {
        let n = self.axis;
        let rixn = self.ri.cross(n);
        let rjxn = self.rj.cross(n);

        let ba = &mut bodies[self.body_a];
        ba.vlambda -= n * (ba.inv_mass * delta_lambda) * ba.linear_factor;
        ba.wlambda -= (ba.inv_inertia_world * rixn) * delta_lambda * ba.angular_factor;

        let bb = &mut bodies[self.body_b];
        bb.vlambda += n * (bb.inv_mass * delta_lambda) * bb.linear_factor;
        bb.wlambda += (bb.inv_inertia_world * rjxn) * delta_lambda * bb.angular_factor;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::SolverBody;
    use glam::Mat3;

    fn free_body(pos: Vec3, vel: Vec3) -> SolverBody {
        SolverBody {
            position: pos,
            velocity: vel,
            angular_velocity: Vec3::ZERO,
            force: Vec3::ZERO,
            torque: Vec3::ZERO,
            inv_mass: 1.0,
            inv_inertia_world: Mat3::IDENTITY,
            linear_factor: Vec3::ONE,
            angular_factor: Vec3::ONE,
            vlambda: Vec3::ZERO,
            wlambda: Vec3::ZERO,
        }
    }

    fn head_on_contact() -> (Equation, Vec<SolverBody>) {
        // Two unit spheres of radius 0.5 exactly touching at the origin,
        // approaching at 1 m/s each
        let bodies = vec![
            free_body(Vec3::new(-0.5, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0)),
            free_body(Vec3::new(0.5, 0.0, 0.0), Vec3::new(-1.0, 0.0, 0.0)),
        ];
        let sa = ShapeRef { body: 1, shape: 0 };
        let sb = ShapeRef { body: 2, shape: 0 };
        let mut eq = Equation::new_contact(
            0,
            1,
            sa,
            sb,
            Vec3::X,
            Vec3::new(0.5, 0.0, 0.0),
            Vec3::new(-0.5, 0.0, 0.0),
            0.0,
        );
        eq.update_spook(1.0 / 60.0);
        (eq, bodies)
    }

    #[test]
    fn test_spook_parameters() {
        let (eq, _) = head_on_contact();
        let dt = 1.0 / 60.0;
        let d = eq.relaxation;
        assert!((eq.b - 4.0 * d / (1.0 + 4.0 * d)).abs() < 1e-6);
        assert!((eq.eps - 4.0 / (dt * dt * eq.stiffness * (1.0 + 4.0 * d))).abs() < 1e-9);
    }

    #[test]
    fn test_compute_b_opposes_approach() {
        let (eq, bodies) = head_on_contact();
        // Bodies approaching: relative normal velocity is -2, so B demands a
        // positive (separating) impulse
        let b = eq.compute_b(1.0 / 60.0, &bodies);
        assert!(b > 0.0);
    }

    #[test]
    fn test_compute_c_includes_both_masses() {
        let (eq, bodies) = head_on_contact();
        let c = eq.compute_c(&bodies);
        // Two unit inverse masses plus angular terms plus eps
        assert!(c >= 2.0);
        assert!(c < 3.0);
    }

    #[test]
    fn test_add_to_wlambda_is_equal_and_opposite() {
        let (eq, mut bodies) = head_on_contact();
        eq.add_to_wlambda(&mut bodies, 1.0);
        assert!((bodies[0].vlambda + bodies[1].vlambda).length() < 1e-6);
        assert!(bodies[1].vlambda.x > 0.0);
    }

    #[test]
    fn test_locked_axis_receives_no_impulse() {
        let (eq, mut bodies) = head_on_contact();
        bodies[1].linear_factor = Vec3::new(0.0, 1.0, 1.0);
        eq.add_to_wlambda(&mut bodies, 1.0);
        assert_eq!(bodies[1].vlambda.x, 0.0);
        assert!(bodies[0].vlambda.x < 0.0);
    }
}

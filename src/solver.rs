//! Projected Gauss-Seidel (sequential impulse) constraint solver
//!
//! Equations are visited in insertion order, each impulse delta applied
//! immediately so later equations in the same pass observe it. Iteration
//! stops at the cap or when a pass's total impulse change drops below
//! tolerance. Impulses land in solver-only accumulators and are merged into
//! the real velocities at the end.

use glam::{Mat3, Vec3};

use crate::body::Body;
use crate::consts::{SOLVER_ITERATIONS, SOLVER_TOLERANCE};
use crate::equations::Equation;

/// Per-body state the solver reads and writes during one solve
#[derive(Debug, Clone)]
pub struct SolverBody {
    pub position: Vec3,
    pub velocity: Vec3,
    pub angular_velocity: Vec3,
    pub force: Vec3,
    pub torque: Vec3,
    /// Zero for non-dynamic or sleeping bodies
    pub inv_mass: f32,
    pub inv_inertia_world: Mat3,
    pub linear_factor: Vec3,
    pub angular_factor: Vec3,
    /// Solver-only velocity accumulator
    pub vlambda: Vec3,
    /// Solver-only angular velocity accumulator
    pub wlambda: Vec3,
}

impl SolverBody {
    fn from_body(body: &Body) -> Self {
        // Sleeping bodies must not be pushed around by the solver
        let solve_mass = if body.is_sleeping() { 0.0 } else { body.inv_mass() };
        let inv_inertia = if body.is_sleeping() {
            Mat3::ZERO
        } else {
            body.inv_inertia_world
        };
        Self {
            position: body.position,
            velocity: body.velocity,
            angular_velocity: body.angular_velocity,
            force: body.force,
            torque: body.torque,
            inv_mass: solve_mass,
            inv_inertia_world: inv_inertia,
            linear_factor: body.linear_factor,
            angular_factor: body.angular_factor,
            vlambda: Vec3::ZERO,
            wlambda: Vec3::ZERO,
        }
    }
}

#[derive(Debug)]
pub struct GsSolver {
    pub iterations: u32,
    pub tolerance: f32,
    // Scratch buffers reused across steps
    bodies: Vec<SolverBody>,
    lambdas: Vec<f32>,
    bs: Vec<f32>,
    inv_cs: Vec<f32>,
}

impl Default for GsSolver {
    fn default() -> Self {
        Self {
            iterations: SOLVER_ITERATIONS,
            tolerance: SOLVER_TOLERANCE,
            bodies: Vec::new(),
            lambdas: Vec::new(),
            bs: Vec::new(),
            inv_cs: Vec::new(),
        }
    }
}

impl GsSolver {
    /// Solve all enabled equations and merge the result into body velocities.
    /// Returns the number of iterations used.
    pub fn solve(&mut self, dt: f32, equations: &mut [Equation], bodies: &mut [Body]) -> u32 {
        if equations.is_empty() {
            return 0;
        }

        self.bodies.clear();
        self.bodies.extend(bodies.iter().map(SolverBody::from_body));

        let n = equations.len();
        self.lambdas.clear();
        self.lambdas.resize(n, 0.0);
        self.bs.clear();
        self.bs.resize(n, 0.0);
        self.inv_cs.clear();
        self.inv_cs.resize(n, 0.0);
        for (i, eq) in equations.iter_mut().enumerate() {
            eq.update_spook(dt);
            self.bs[i] = eq.compute_b(dt, &self.bodies);
            self.inv_cs[i] = 1.0 / eq.compute_c(&self.bodies);
        }

        let tolerance_sq = self.tolerance * self.tolerance;
        let mut used = 0;
        for _ in 0..self.iterations {
            used += 1;
            let mut total_change = 0.0f32;

            for (i, eq) in equations.iter().enumerate() {
                if !eq.enabled {
                    continue;
                }
                let lambda = self.lambdas[i];
                let gw_lambda = eq.compute_gw_lambda(&self.bodies);
                let mut delta = self.inv_cs[i] * (self.bs[i] - gw_lambda - eq.eps * lambda);

                // Clamp the running multiplier to the force bounds, adjusting
                // the delta so the applied impulse matches
                let min = eq.min_force * dt;
                let max = eq.max_force * dt;
                if lambda + delta < min {
                    delta = min - lambda;
                } else if lambda + delta > max {
                    delta = max - lambda;
                }
                self.lambdas[i] += delta;
                total_change += delta.abs();
                eq.add_to_wlambda(&mut self.bodies, delta);
            }

            if total_change * total_change < tolerance_sq {
                break;
            }
        }
        log::trace!("solver converged after {used} iterations");

        // Merge accumulators into real velocities; lock factors were applied
        // when the accumulators were built up
        for (body, sb) in bodies.iter_mut().zip(&self.bodies) {
            body.velocity += sb.vlambda;
            body.angular_velocity += sb.wlambda;
        }
        for (i, eq) in equations.iter_mut().enumerate() {
            eq.multiplier = self.lambdas[i] / dt;
        }
        used
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equations::ShapeRef;
    use crate::shapes::Shape;
    use glam::Quat;

    fn sphere_body(mass: f32, pos: Vec3, vel: Vec3) -> Body {
        let mut b = if mass > 0.0 { Body::dynamic(mass) } else { Body::fixed() };
        b.add_shape(Shape::sphere(0.5).unwrap(), Vec3::ZERO, Quat::IDENTITY);
        b.position = pos;
        b.velocity = vel;
        b
    }

    fn touching_pair(restitution: f32) -> (Vec<Body>, Vec<Equation>) {
        let bodies = vec![
            sphere_body(1.0, Vec3::new(-0.5, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0)),
            sphere_body(1.0, Vec3::new(0.5, 0.0, 0.0), Vec3::new(-1.0, 0.0, 0.0)),
        ];
        let eq = Equation::new_contact(
            0,
            1,
            ShapeRef { body: 1, shape: 0 },
            ShapeRef { body: 2, shape: 0 },
            Vec3::X,
            Vec3::new(0.5, 0.0, 0.0),
            Vec3::new(-0.5, 0.0, 0.0),
            restitution,
        );
        (bodies, vec![eq])
    }

    #[test]
    fn test_head_on_inelastic_collision_stops_approach() {
        let (mut bodies, mut eqs) = touching_pair(0.0);
        let mut solver = GsSolver::default();
        solver.solve(1.0 / 60.0, &mut eqs, &mut bodies);

        // Nearly all approach velocity removed; the relaxation split leaves a
        // small residual that the positional term picks up next step
        let separating = bodies[1].velocity.x - bodies[0].velocity.x;
        assert!(separating > -0.2, "bodies still approaching: {separating}");
        assert!(separating < 0.2);
        // Momentum conserved
        let p = bodies[0].velocity + bodies[1].velocity;
        assert!(p.length() < 1e-4);
    }

    #[test]
    fn test_restitution_scales_separating_velocity() {
        let (mut bodies, mut eqs) = touching_pair(0.5);
        let mut solver = GsSolver::default();
        solver.solve(1.0 / 60.0, &mut eqs, &mut bodies);

        // Closing speed 2, e = 0.5: separating speed about 1 (scaled down
        // slightly by the relaxation split)
        let separating = bodies[1].velocity.x - bodies[0].velocity.x;
        assert!(separating > 0.6 && separating < 1.1, "separating = {separating}");
    }

    #[test]
    fn test_contact_is_one_sided() {
        // Bodies already separating: contact must not pull them together
        let mut bodies = vec![
            sphere_body(1.0, Vec3::new(-0.5, 0.0, 0.0), Vec3::new(-1.0, 0.0, 0.0)),
            sphere_body(1.0, Vec3::new(0.5, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0)),
        ];
        let eq = Equation::new_contact(
            0,
            1,
            ShapeRef { body: 1, shape: 0 },
            ShapeRef { body: 2, shape: 0 },
            Vec3::X,
            Vec3::new(0.5, 0.0, 0.0),
            Vec3::new(-0.5, 0.0, 0.0),
            0.0,
        );
        let mut eqs = vec![eq];
        let mut solver = GsSolver::default();
        solver.solve(1.0 / 60.0, &mut eqs, &mut bodies);
        assert!((bodies[0].velocity.x - (-1.0)).abs() < 1e-3);
        assert!((bodies[1].velocity.x - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_disabled_equation_is_skipped() {
        let (mut bodies, mut eqs) = touching_pair(0.0);
        eqs[0].enabled = false;
        let mut solver = GsSolver::default();
        solver.solve(1.0 / 60.0, &mut eqs, &mut bodies);
        assert!((bodies[0].velocity.x - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_sleeping_body_not_moved() {
        let (mut bodies, mut eqs) = touching_pair(0.0);
        bodies[1].sleep();
        // Body 0 still approaches the sleeping body 1
        bodies[0].velocity = Vec3::new(1.0, 0.0, 0.0);
        let mut solver = GsSolver::default();
        solver.solve(1.0 / 60.0, &mut eqs, &mut bodies);
        assert_eq!(bodies[1].velocity, Vec3::ZERO);
        // The awake body is stopped by the infinite-effective-mass obstacle
        assert!(bodies[0].velocity.x < 0.2);
    }
}

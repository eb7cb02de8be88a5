//! Broadphase candidate-pair culling
//!
//! Two interchangeable strategies produce the same pair set: a naive O(n²)
//! bounding-sphere sweep and a one-axis sweep-and-prune that sorts along the
//! axis of greatest positional variance and confirms with exact AABB
//! overlap. Pairs come out sorted by index and duplicate-free either way.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::body::Body;

/// Broadphase strategy selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BroadphaseKind {
    /// All-pairs bounding-sphere distance test
    Naive,
    /// One-axis sweep-and-prune with AABB confirmation
    #[default]
    Sap,
}

#[derive(Debug, Default)]
pub(crate) struct Broadphase {
    pub kind: BroadphaseKind,
    /// Body indices sorted along the sweep axis, reused across steps
    order: Vec<usize>,
}

impl Broadphase {
    pub fn new(kind: BroadphaseKind) -> Self {
        Self {
            kind,
            order: Vec::new(),
        }
    }

    /// Collect candidate pairs into `out` as (index, index) with i < j,
    /// sorted, without duplicates.
    pub fn collision_pairs(&mut self, bodies: &mut [Body], out: &mut Vec<(usize, usize)>) {
        out.clear();
        match self.kind {
            BroadphaseKind::Naive => self.naive_pairs(bodies, out),
            BroadphaseKind::Sap => self.sap_pairs(bodies, out),
        }
        out.sort_unstable();
    }

    fn naive_pairs(&mut self, bodies: &[Body], out: &mut Vec<(usize, usize)>) {
        for i in 0..bodies.len() {
            for j in (i + 1)..bodies.len() {
                let (a, b) = (&bodies[i], &bodies[j]);
                if !needs_collision(a, b) {
                    continue;
                }
                let r = a.bounding_radius() + b.bounding_radius();
                if (b.position - a.position).length_squared() <= r * r {
                    out.push((i, j));
                }
            }
        }
    }

    fn sap_pairs(&mut self, bodies: &mut [Body], out: &mut Vec<(usize, usize)>) {
        // AABBs must be current before the sweep
        let aabbs: Vec<crate::math::Aabb> = bodies.iter_mut().map(|b| b.aabb()).collect();
        let axis = dominant_axis(bodies);

        self.order.clear();
        self.order.extend(0..bodies.len());
        self.order.sort_unstable_by(|&a, &b| {
            aabbs[a].lower[axis]
                .partial_cmp(&aabbs[b].lower[axis])
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(&b))
        });

        for oi in 0..self.order.len() {
            let i = self.order[oi];
            for &j in &self.order[oi + 1..] {
                // Past the end of i's interval on the sweep axis: no later
                // entry can overlap it either
                if aabbs[j].lower[axis] > aabbs[i].upper[axis] {
                    break;
                }
                if !needs_collision(&bodies[i], &bodies[j]) {
                    continue;
                }
                if aabbs[i].overlaps(&aabbs[j]) {
                    out.push((i.min(j), i.max(j)));
                }
            }
        }
    }
}

/// Filter shared by both strategies: compatible filter groups, and at least
/// one side dynamic and awake.
pub(crate) fn needs_collision(a: &Body, b: &Body) -> bool {
    if a.collision_filter_group & b.collision_filter_mask == 0
        || b.collision_filter_group & a.collision_filter_mask == 0
    {
        return false;
    }
    let a_inert = !a.is_dynamic() || a.is_sleeping();
    let b_inert = !b.is_dynamic() || b.is_sleeping();
    !(a_inert && b_inert)
}

/// Axis (0..3) with the greatest variance of body positions
fn dominant_axis(bodies: &[Body]) -> usize {
    if bodies.is_empty() {
        return 0;
    }
    let n = bodies.len() as f32;
    let mean = bodies.iter().map(|b| b.position).sum::<Vec3>() / n;
    let mut variance = Vec3::ZERO;
    for b in bodies {
        let d = b.position - mean;
        variance += d * d;
    }
    if variance.x >= variance.y && variance.x >= variance.z {
        0
    } else if variance.y >= variance.z {
        1
    } else {
        2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::Shape;
    use glam::Quat;

    fn sphere_body(mass: f32, pos: Vec3) -> Body {
        let mut b = if mass > 0.0 { Body::dynamic(mass) } else { Body::fixed() };
        b.add_shape(Shape::sphere(1.0).unwrap(), Vec3::ZERO, Quat::IDENTITY);
        b.position = pos;
        b
    }

    fn pairs(kind: BroadphaseKind, bodies: &mut [Body]) -> Vec<(usize, usize)> {
        let mut bp = Broadphase::new(kind);
        let mut out = Vec::new();
        bp.collision_pairs(bodies, &mut out);
        out
    }

    #[test]
    fn test_overlapping_spheres_found_by_both_strategies() {
        let mut bodies = vec![
            sphere_body(1.0, Vec3::ZERO),
            sphere_body(1.0, Vec3::new(1.5, 0.0, 0.0)),
            sphere_body(1.0, Vec3::new(10.0, 0.0, 0.0)),
        ];
        let naive = pairs(BroadphaseKind::Naive, &mut bodies);
        let sap = pairs(BroadphaseKind::Sap, &mut bodies);
        assert_eq!(naive, vec![(0, 1)]);
        assert_eq!(naive, sap);
    }

    #[test]
    fn test_non_dynamic_pairs_excluded() {
        let mut bodies = vec![
            sphere_body(0.0, Vec3::ZERO),
            sphere_body(0.0, Vec3::new(0.5, 0.0, 0.0)),
        ];
        assert!(pairs(BroadphaseKind::Naive, &mut bodies).is_empty());
        assert!(pairs(BroadphaseKind::Sap, &mut bodies).is_empty());
    }

    #[test]
    fn test_sleeping_pair_excluded_but_mixed_kept() {
        let mut bodies = vec![
            sphere_body(1.0, Vec3::ZERO),
            sphere_body(1.0, Vec3::new(0.5, 0.0, 0.0)),
        ];
        bodies[0].sleep();
        // One asleep, one awake: still a candidate
        assert_eq!(pairs(BroadphaseKind::Naive, &mut bodies), vec![(0, 1)]);
        bodies[1].sleep();
        assert!(pairs(BroadphaseKind::Naive, &mut bodies).is_empty());
    }

    #[test]
    fn test_filter_groups_respected() {
        let mut bodies = vec![
            sphere_body(1.0, Vec3::ZERO),
            sphere_body(1.0, Vec3::new(0.5, 0.0, 0.0)),
        ];
        bodies[0].collision_filter_group = 0b01;
        bodies[0].collision_filter_mask = 0b10;
        bodies[1].collision_filter_group = 0b01;
        bodies[1].collision_filter_mask = 0b10;
        // Each wants to hit group 2, both are group 1
        assert!(pairs(BroadphaseKind::Naive, &mut bodies).is_empty());
    }

    #[test]
    fn test_strategies_agree_on_cluster() {
        let mut bodies = Vec::new();
        // Deterministic pseudo-grid of touching spheres
        for i in 0..6 {
            for j in 0..4 {
                bodies.push(sphere_body(
                    1.0,
                    Vec3::new(i as f32 * 1.6, (j as f32 * 1.3).sin() * 2.0, j as f32 * 1.6),
                ));
            }
        }
        let naive = pairs(BroadphaseKind::Naive, &mut bodies);
        let sap = pairs(BroadphaseKind::Sap, &mut bodies);
        // The sphere-distance test is strictly tighter than AABB overlap for
        // spheres, so every naive pair must also come out of the sweep
        for p in &naive {
            assert!(sap.contains(p), "sap missed {p:?}");
        }
    }

    #[test]
    fn test_sap_finds_all_sphere_pairs_randomized() {
        use rand::{Rng, SeedableRng};
        let mut rng = rand_pcg::Pcg64Mcg::seed_from_u64(0x7ca8);
        for _ in 0..20 {
            let mut bodies: Vec<Body> = (0..32)
                .map(|_| {
                    sphere_body(
                        1.0,
                        Vec3::new(
                            rng.random_range(-8.0..8.0),
                            rng.random_range(-8.0..8.0),
                            rng.random_range(-8.0..8.0),
                        ),
                    )
                })
                .collect();
            let naive = pairs(BroadphaseKind::Naive, &mut bodies);
            let sap = pairs(BroadphaseKind::Sap, &mut bodies);
            for p in &naive {
                assert!(sap.contains(p), "sap missed {p:?}");
            }
        }
    }
}

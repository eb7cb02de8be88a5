//! Small math helpers shared across the simulation
//!
//! Vectors, quaternions and matrices come from `glam`; this module only adds
//! the few physics-specific pieces: axis-aligned bounding boxes, tangent
//! bases for friction, quaternion integration and inertia transforms.

use glam::{Mat3, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// An axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub lower: Vec3,
    pub upper: Vec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl Aabb {
    /// An inverted box that any point or box extends
    pub const EMPTY: Self = Self {
        lower: Vec3::splat(f32::MAX),
        upper: Vec3::splat(f32::MIN),
    };

    pub fn new(lower: Vec3, upper: Vec3) -> Self {
        Self { lower, upper }
    }

    /// Tight box around a set of points
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        let mut aabb = Self::EMPTY;
        for p in points {
            aabb.extend_point(p);
        }
        aabb
    }

    /// Box of half-extents `half` centered at `center`
    pub fn centered(center: Vec3, half: Vec3) -> Self {
        Self {
            lower: center - half,
            upper: center + half,
        }
    }

    pub fn extend_point(&mut self, p: Vec3) {
        self.lower = self.lower.min(p);
        self.upper = self.upper.max(p);
    }

    pub fn extend(&mut self, other: &Aabb) {
        self.lower = self.lower.min(other.lower);
        self.upper = self.upper.max(other.upper);
    }

    /// Grow the box by `margin` on all sides
    pub fn expand(&self, margin: f32) -> Self {
        Self {
            lower: self.lower - Vec3::splat(margin),
            upper: self.upper + Vec3::splat(margin),
        }
    }

    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.lower.x <= other.upper.x
            && self.upper.x >= other.lower.x
            && self.lower.y <= other.upper.y
            && self.upper.y >= other.lower.y
            && self.lower.z <= other.upper.z
            && self.upper.z >= other.lower.z
    }

    pub fn contains_point(&self, p: Vec3) -> bool {
        p.cmpge(self.lower).all() && p.cmple(self.upper).all()
    }

    pub fn center(&self) -> Vec3 {
        (self.lower + self.upper) * 0.5
    }
}

/// Two unit tangents orthogonal to `normal` and to each other
///
/// Used to build the pair of friction directions at a contact. The input is
/// assumed normalized; a degenerate input falls back to the world axes.
pub fn tangent_basis(normal: Vec3) -> (Vec3, Vec3) {
    // Pick the world axis least aligned with the normal to avoid a
    // near-parallel cross product
    let helper = if normal.x.abs() > 0.9 { Vec3::Y } else { Vec3::X };
    let t1 = normal.cross(helper).normalize_or_zero();
    if t1.length_squared() < 0.5 {
        return (Vec3::X, Vec3::Z);
    }
    let t2 = normal.cross(t1);
    (t1, t2)
}

/// Integrate an orientation by an angular velocity over `dt`
///
/// Semi-implicit quaternion derivative: q' = q + dt/2 * (w, 0) * q. The
/// result is NOT normalized; callers renormalize after integration.
#[inline]
pub fn integrate_quat(q: Quat, w: Vec3, dt: f32) -> Quat {
    let wq = Quat::from_xyzw(w.x, w.y, w.z, 0.0);
    let dq = wq * q;
    Quat::from_xyzw(
        q.x + 0.5 * dt * dq.x,
        q.y + 0.5 * dt * dq.y,
        q.z + 0.5 * dt * dq.z,
        q.w + 0.5 * dt * dq.w,
    )
}

/// World-space inverse inertia matrix from a diagonal local inverse inertia
///
/// R * diag(inv_inertia) * R^T for the body's current orientation.
#[inline]
pub fn inv_inertia_world(orientation: Quat, inv_inertia_local: Vec3) -> Mat3 {
    let r = Mat3::from_quat(orientation);
    r * Mat3::from_diagonal(inv_inertia_local) * r.transpose()
}

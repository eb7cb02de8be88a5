//! Ray queries against shapes
//!
//! A ray is the segment `from..to`; hits are parameterized by the fraction
//! t in [0, 1] along it. The per-shape intersectors here are exact (no
//! convex proxies) and emit every crossing; the world-level query modes
//! (closest / any / all) pick from those.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::math::Aabb;
use crate::shapes::convex::ConvexPolyhedron;
use crate::shapes::{Shape, ShapeKind};

/// A directed segment to test against the world
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Ray {
    pub from: Vec3,
    pub to: Vec3,
}

impl Ray {
    pub fn new(from: Vec3, to: Vec3) -> Self {
        Self { from, to }
    }

    pub fn direction(&self) -> Vec3 {
        self.to - self.from
    }

    pub fn point_at(&self, t: f32) -> Vec3 {
        self.from + self.direction() * t
    }

    pub fn length(&self) -> f32 {
        self.direction().length()
    }
}

/// Filtering and culling options for a world raycast
#[derive(Debug, Clone, Copy)]
pub struct RaycastOptions {
    pub collision_filter_group: u32,
    pub collision_filter_mask: u32,
    /// Ignore surfaces whose outward normal points along the ray
    pub skip_backfaces: bool,
}

impl Default for RaycastOptions {
    fn default() -> Self {
        Self {
            collision_filter_group: 1,
            collision_filter_mask: u32::MAX,
            skip_backfaces: true,
        }
    }
}

/// A single ray intersection
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RaycastHit {
    pub body: u32,
    pub shape: u32,
    /// World intersection point
    pub point: Vec3,
    /// Outward surface normal at the hit
    pub normal: Vec3,
    /// Fraction along the ray, in [0, 1]
    pub t: f32,
    /// World distance from the ray origin
    pub distance: f32,
}

/// A hit before body/shape attribution
#[derive(Debug, Clone, Copy)]
pub(crate) struct ShapeHit {
    pub t: f32,
    pub point: Vec3,
    pub normal: Vec3,
}

/// Emit every intersection of `ray` with one transformed shape
pub(crate) fn intersect_shape(
    shape: &Shape,
    pos: Vec3,
    quat: Quat,
    ray: &Ray,
    skip_backfaces: bool,
    emit: &mut dyn FnMut(ShapeHit),
) {
    match &shape.kind {
        ShapeKind::Sphere { radius } => ray_sphere(ray, pos, *radius, skip_backfaces, emit),
        ShapeKind::Plane => ray_plane(ray, pos, quat, skip_backfaces, emit),
        ShapeKind::Box { hull, .. } => ray_convex(ray, hull, pos, quat, skip_backfaces, emit),
        ShapeKind::Convex(hull) => ray_convex(ray, hull, pos, quat, skip_backfaces, emit),
        ShapeKind::TriMesh(mesh) => {
            // Work in mesh-local space, emit in world space
            let inv = quat.conjugate();
            let local = Ray {
                from: inv * (ray.from - pos),
                to: inv * (ray.to - pos),
            };
            let bounds = Aabb::from_points([local.from, local.to]).expand(1e-4);
            let mut hits = Vec::new();
            mesh.query_local_aabb(&bounds, &mut hits);
            for i in hits {
                let (a, b, c) = mesh.triangle(i);
                if let Some((t, n)) = ray_triangle(&local, a, b, c, skip_backfaces) {
                    emit(ShapeHit {
                        t,
                        point: ray.point_at(t),
                        normal: quat * n,
                    });
                }
            }
        }
        ShapeKind::Heightfield(hf) => {
            let inv = quat.conjugate();
            let local = Ray {
                from: inv * (ray.from - pos),
                to: inv * (ray.to - pos),
            };
            let bounds = Aabb::from_points([local.from, local.to]).expand(1e-4);
            let Some((ri, rj)) = hf.query_local_aabb(&bounds) else {
                return;
            };
            for i in ri {
                for j in rj.clone() {
                    for upper in [false, true] {
                        let (a, b, c) = cell_triangle(hf, i, j, upper);
                        if let Some((t, n)) = ray_triangle(&local, a, b, c, skip_backfaces) {
                            emit(ShapeHit {
                                t,
                                point: ray.point_at(t),
                                normal: quat * n,
                            });
                        }
                    }
                }
            }
        }
    }
}

fn cell_triangle(
    hf: &crate::shapes::Heightfield,
    i: usize,
    j: usize,
    upper: bool,
) -> (Vec3, Vec3, Vec3) {
    let s = hf.element_size;
    let corner = |di: usize, dj: usize| {
        Vec3::new(
            (i + di) as f32 * s,
            hf.data[i + di][j + dj],
            (j + dj) as f32 * s,
        )
    };
    if upper {
        (corner(1, 0), corner(1, 1), corner(0, 1))
    } else {
        (corner(0, 0), corner(1, 0), corner(0, 1))
    }
}

fn ray_sphere(
    ray: &Ray,
    center: Vec3,
    radius: f32,
    skip_backfaces: bool,
    emit: &mut dyn FnMut(ShapeHit),
) {
    let d = ray.direction();
    let m = ray.from - center;
    let a = d.length_squared();
    if a < 1e-12 {
        return;
    }
    let b = 2.0 * m.dot(d);
    let c = m.length_squared() - radius * radius;
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return;
    }
    let sqrt_disc = disc.sqrt();
    for t in [(-b - sqrt_disc) / (2.0 * a), (-b + sqrt_disc) / (2.0 * a)] {
        if !(0.0..=1.0).contains(&t) {
            continue;
        }
        let point = ray.point_at(t);
        let normal = (point - center).normalize_or_zero();
        // Exit hits see the normal pointing along the ray
        if skip_backfaces && normal.dot(d) > 0.0 {
            continue;
        }
        emit(ShapeHit { t, point, normal });
    }
}

fn ray_plane(
    ray: &Ray,
    pos: Vec3,
    quat: Quat,
    skip_backfaces: bool,
    emit: &mut dyn FnMut(ShapeHit),
) {
    let n = quat * Vec3::Y;
    let d = ray.direction();
    let denom = n.dot(d);
    if denom.abs() < 1e-12 {
        return;
    }
    if skip_backfaces && denom > 0.0 {
        return; // Hitting the plane from below
    }
    let t = n.dot(pos - ray.from) / denom;
    if (0.0..=1.0).contains(&t) {
        emit(ShapeHit {
            t,
            point: ray.point_at(t),
            normal: n,
        });
    }
}

fn ray_convex(
    ray: &Ray,
    hull: &ConvexPolyhedron,
    pos: Vec3,
    quat: Quat,
    skip_backfaces: bool,
    emit: &mut dyn FnMut(ShapeHit),
) {
    let d = ray.direction();
    for (fi, face) in hull.faces.iter().enumerate() {
        let n = quat * hull.face_normals[fi];
        if n.length_squared() < 0.5 {
            continue;
        }
        let denom = n.dot(d);
        if denom.abs() < 1e-12 {
            continue;
        }
        if skip_backfaces && denom > 0.0 {
            continue;
        }
        let world: Vec<Vec3> = face.iter().map(|&vi| quat * hull.vertices[vi] + pos).collect();
        let t = n.dot(world[0] - ray.from) / denom;
        if !(0.0..=1.0).contains(&t) {
            continue;
        }
        let p = ray.point_at(t);
        let mut contained = true;
        for k in 0..world.len() {
            let a = world[k];
            let b = world[(k + 1) % world.len()];
            if (b - a).cross(p - a).dot(n) < -1e-6 {
                contained = false;
                break;
            }
        }
        if contained {
            emit(ShapeHit {
                t,
                point: p,
                normal: n,
            });
        }
    }
}

/// Watertight-enough segment/triangle intersection (Moller-Trumbore),
/// returning the ray fraction and the triangle normal facing the ray.
fn ray_triangle(
    ray: &Ray,
    a: Vec3,
    b: Vec3,
    c: Vec3,
    skip_backfaces: bool,
) -> Option<(f32, Vec3)> {
    let d = ray.direction();
    let e1 = b - a;
    let e2 = c - a;
    let pvec = d.cross(e2);
    let det = e1.dot(pvec);
    if det.abs() < 1e-12 {
        return None;
    }
    let inv_det = 1.0 / det;
    let tvec = ray.from - a;
    let u = tvec.dot(pvec) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let qvec = tvec.cross(e1);
    let v = d.dot(qvec) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = e2.dot(qvec) * inv_det;
    if !(0.0..=1.0).contains(&t) {
        return None;
    }
    let mut n = e1.cross(e2).normalize_or_zero();
    if n.dot(d) > 0.0 {
        if skip_backfaces {
            return None;
        }
        n = -n;
    }
    Some((t, n))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hits_of(shape: &Shape, pos: Vec3, quat: Quat, ray: &Ray, skip_backfaces: bool) -> Vec<ShapeHit> {
        let mut out = Vec::new();
        intersect_shape(shape, pos, quat, ray, skip_backfaces, &mut |h| out.push(h));
        out.sort_by(|a, b| a.t.total_cmp(&b.t));
        out
    }

    #[test]
    fn test_ray_sphere_entry_and_exit() {
        let s = Shape::sphere(1.0).unwrap();
        let ray = Ray::new(Vec3::new(-5.0, 0.0, 0.0), Vec3::new(5.0, 0.0, 0.0));
        let hits = hits_of(&s, Vec3::ZERO, Quat::IDENTITY, &ray, false);
        assert_eq!(hits.len(), 2);
        assert!((hits[0].point.x + 1.0).abs() < 1e-4);
        assert!((hits[1].point.x - 1.0).abs() < 1e-4);
        assert!((hits[0].normal - Vec3::new(-1.0, 0.0, 0.0)).length() < 1e-4);

        // With backface culling only the entry survives
        let front = hits_of(&s, Vec3::ZERO, Quat::IDENTITY, &ray, true);
        assert_eq!(front.len(), 1);
        assert!((front[0].point.x + 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_ray_sphere_miss_and_short_segment() {
        let s = Shape::sphere(1.0).unwrap();
        let miss = Ray::new(Vec3::new(-5.0, 2.0, 0.0), Vec3::new(5.0, 2.0, 0.0));
        assert!(hits_of(&s, Vec3::ZERO, Quat::IDENTITY, &miss, false).is_empty());
        // Segment ends before reaching the sphere
        let short = Ray::new(Vec3::new(-5.0, 0.0, 0.0), Vec3::new(-3.0, 0.0, 0.0));
        assert!(hits_of(&s, Vec3::ZERO, Quat::IDENTITY, &short, false).is_empty());
    }

    #[test]
    fn test_ray_plane_from_above_only() {
        let p = Shape::plane();
        let down = Ray::new(Vec3::new(0.0, 5.0, 0.0), Vec3::new(0.0, -5.0, 0.0));
        let hits = hits_of(&p, Vec3::ZERO, Quat::IDENTITY, &down, true);
        assert_eq!(hits.len(), 1);
        assert!((hits[0].t - 0.5).abs() < 1e-5);
        assert_eq!(hits[0].normal, Vec3::Y);

        // From below against the backface
        let up = Ray::new(Vec3::new(0.0, -5.0, 0.0), Vec3::new(0.0, 5.0, 0.0));
        assert!(hits_of(&p, Vec3::ZERO, Quat::IDENTITY, &up, true).is_empty());
        assert_eq!(hits_of(&p, Vec3::ZERO, Quat::IDENTITY, &up, false).len(), 1);
    }

    #[test]
    fn test_ray_box_face_hit() {
        let b = Shape::cuboid(Vec3::splat(1.0)).unwrap();
        let ray = Ray::new(Vec3::new(-5.0, 0.3, 0.2), Vec3::new(5.0, 0.3, 0.2));
        let hits = hits_of(&b, Vec3::ZERO, Quat::IDENTITY, &ray, true);
        assert_eq!(hits.len(), 1);
        assert!((hits[0].point.x + 1.0).abs() < 1e-4);
        assert!((hits[0].normal - Vec3::new(-1.0, 0.0, 0.0)).length() < 1e-4);

        let both = hits_of(&b, Vec3::ZERO, Quat::IDENTITY, &ray, false);
        assert_eq!(both.len(), 2);
    }

    #[test]
    fn test_ray_rotated_box() {
        let b = Shape::cuboid(Vec3::splat(1.0)).unwrap();
        let q = Quat::from_rotation_z(std::f32::consts::FRAC_PI_4);
        // Straight down, slightly off the rotated box's top edge so exactly
        // one tilted face is hit
        let ray = Ray::new(Vec3::new(-0.2, 5.0, 0.0), Vec3::new(-0.2, -5.0, 0.0));
        let hits = hits_of(&b, Vec3::ZERO, q, &ray, true);
        assert_eq!(hits.len(), 1);
        // The tilted face follows y = x + sqrt(2)
        assert!((hits[0].point.y - (2.0f32.sqrt() - 0.2)).abs() < 1e-3);
    }

    #[test]
    fn test_ray_trimesh() {
        let mesh = Shape::trimesh(
            vec![
                Vec3::new(-1.0, 0.0, -1.0),
                Vec3::new(1.0, 0.0, -1.0),
                Vec3::new(1.0, 0.0, 1.0),
                Vec3::new(-1.0, 0.0, 1.0),
            ],
            vec![[0, 2, 1], [0, 3, 2]],
        )
        .unwrap();
        let ray = Ray::new(Vec3::new(0.2, 2.0, 0.2), Vec3::new(0.2, -2.0, 0.2));
        let hits = hits_of(&mesh, Vec3::ZERO, Quat::IDENTITY, &ray, false);
        assert_eq!(hits.len(), 1);
        assert!(hits[0].point.y.abs() < 1e-5);
        assert!((hits[0].normal - Vec3::Y).length() < 1e-4);

        let miss = Ray::new(Vec3::new(3.0, 2.0, 0.0), Vec3::new(3.0, -2.0, 0.0));
        assert!(hits_of(&mesh, Vec3::ZERO, Quat::IDENTITY, &miss, false).is_empty());
    }

    #[test]
    fn test_ray_heightfield() {
        let hf = Shape::heightfield(vec![vec![1.0; 4]; 4], 1.0).unwrap();
        let ray = Ray::new(Vec3::new(1.5, 5.0, 1.5), Vec3::new(1.5, -1.0, 1.5));
        let hits = hits_of(&hf, Vec3::ZERO, Quat::IDENTITY, &ray, true);
        assert!(!hits.is_empty());
        assert!((hits[0].point.y - 1.0).abs() < 1e-4);
    }
}

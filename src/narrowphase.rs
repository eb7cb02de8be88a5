//! Exact per-shape-pair contact generation
//!
//! For every broadphase candidate, each (shapeA, shapeB) combination is
//! dispatched on a canonicalized kind pair, so every unordered pairing is
//! registered exactly once. Routines append contact equations (normal plus
//! per-body offsets) and matching friction pairs; in test-only mode they
//! short-circuit to a boolean at the first touch.
//!
//! Concave shapes (trimesh, heightfield) never get their own math: a spatial
//! query narrows them to local convex proxies and the convex routines run
//! per proxy.

use glam::{Quat, Vec3};

use crate::body::Body;
use crate::equations::{Equation, ShapeRef};
use crate::material::{ContactMaterial, MaterialTable};
use crate::math::{tangent_basis, Aabb};
use crate::shapes::convex::{ClipPoint, ConvexPolyhedron};
use crate::shapes::mesh::{Heightfield, TriMesh};
use crate::shapes::{Shape, ShapeKind, ShapeType};

#[derive(Debug, Default)]
pub(crate) struct Narrowphase {
    /// Merge a manifold's friction pairs into a single averaged pair
    /// (less jitter on many-contact stacks)
    pub friction_reduction: bool,
    clip_scratch: Vec<ClipPoint>,
    proxy_hits: Vec<usize>,
}

/// Collects the contacts of one shape-pair test
struct ContactBuilder<'a> {
    equations: &'a mut Vec<Equation>,
    body_a: usize,
    body_b: usize,
    shape_a: ShapeRef,
    shape_b: ShapeRef,
    com_a: Vec3,
    com_b: Vec3,
    cm: ContactMaterial,
    enabled: bool,
    test_only: bool,
    hit: bool,
}

impl ContactBuilder<'_> {
    /// Record a contact: `normal` points from A toward B, `pa`/`pb` are the
    /// world surface points on each body. Returns true when the caller
    /// should stop (test-only mode).
    fn add(&mut self, normal: Vec3, pa: Vec3, pb: Vec3) -> bool {
        self.hit = true;
        if self.test_only {
            return true;
        }
        let mut eq = Equation::new_contact(
            self.body_a,
            self.body_b,
            self.shape_a,
            self.shape_b,
            normal,
            pa - self.com_a,
            pb - self.com_b,
            self.cm.restitution,
        );
        eq.stiffness = self.cm.contact_stiffness;
        eq.relaxation = self.cm.contact_relaxation;
        eq.enabled = self.enabled;
        self.equations.push(eq);
        false
    }
}

impl Narrowphase {
    /// Generate contact and friction equations for all candidate pairs
    pub fn generate(
        &mut self,
        bodies: &[Body],
        pairs: &[(usize, usize)],
        materials: &MaterialTable,
        gravity: Vec3,
        equations: &mut Vec<Equation>,
    ) {
        for &(i, j) in pairs {
            self.body_pair(bodies, i, j, materials, gravity, equations, false);
        }
    }

    /// Test-only overlap check between two bodies
    pub fn test_overlap(
        &mut self,
        bodies: &[Body],
        i: usize,
        j: usize,
        materials: &MaterialTable,
    ) -> bool {
        let mut scratch = Vec::new();
        self.body_pair(bodies, i, j, materials, Vec3::ZERO, &mut scratch, true)
    }

    #[allow(clippy::too_many_arguments)]
    fn body_pair(
        &mut self,
        bodies: &[Body],
        i: usize,
        j: usize,
        materials: &MaterialTable,
        gravity: Vec3,
        equations: &mut Vec<Equation>,
        test_only: bool,
    ) -> bool {
        let mut touched = false;
        for si in 0..bodies[i].shapes.len() {
            for sj in 0..bodies[j].shapes.len() {
                let hit = self.shape_pair(
                    bodies, (i, si), (j, sj), materials, gravity, equations, test_only,
                );
                touched |= hit;
                if test_only && touched {
                    return true;
                }
            }
        }
        touched
    }

    #[allow(clippy::too_many_arguments)]
    fn shape_pair(
        &mut self,
        bodies: &[Body],
        (mut i, mut si): (usize, usize),
        (mut j, mut sj): (usize, usize),
        materials: &MaterialTable,
        gravity: Vec3,
        equations: &mut Vec<Equation>,
        test_only: bool,
    ) -> bool {
        {
            let sa = &bodies[i].shapes[si].shape;
            let sb = &bodies[j].shapes[sj].shape;
            if sa.collision_filter_group & sb.collision_filter_mask == 0
                || sb.collision_filter_group & sa.collision_filter_mask == 0
            {
                return false;
            }
            // Canonicalize operand order by kind tag
            if sa.shape_type() > sb.shape_type() {
                std::mem::swap(&mut i, &mut j);
                std::mem::swap(&mut si, &mut sj);
            }
        }

        let (pos_a, quat_a) = bodies[i].shape_world_transform(si);
        let (pos_b, quat_b) = bodies[j].shape_world_transform(sj);
        let shape_a = &bodies[i].shapes[si].shape;
        let shape_b = &bodies[j].shapes[sj].shape;

        // Cheap bounding-sphere prune per shape pair
        let r = shape_a.bounding_radius() + shape_b.bounding_radius();
        if (pos_b - pos_a).length_squared() > r * r {
            return false;
        }

        let cm = materials.lookup(
            shape_a.material.or(bodies[i].material),
            shape_b.material.or(bodies[j].material),
        );
        let enabled = bodies[i].collision_response
            && bodies[j].collision_response
            && shape_a.collision_response
            && shape_b.collision_response;

        let contacts_start = equations.len();
        let mut out = ContactBuilder {
            equations,
            body_a: i,
            body_b: j,
            shape_a: ShapeRef {
                body: bodies[i].id(),
                shape: si as u32,
            },
            shape_b: ShapeRef {
                body: bodies[j].id(),
                shape: sj as u32,
            },
            com_a: bodies[i].position,
            com_b: bodies[j].position,
            cm,
            enabled,
            test_only,
            hit: false,
        };

        match (shape_a.shape_type(), shape_b.shape_type()) {
            (ShapeType::Sphere, ShapeType::Sphere) => {
                let (ra, rb) = (sphere_radius(shape_a), sphere_radius(shape_b));
                sphere_sphere(ra, pos_a, rb, pos_b, &mut out);
            }
            (ShapeType::Sphere, ShapeType::Plane) => {
                sphere_plane(sphere_radius(shape_a), pos_a, pos_b, quat_b, &mut out);
            }
            (ShapeType::Sphere, ShapeType::Box) | (ShapeType::Sphere, ShapeType::Convex) => {
                let hull = shape_hull(shape_b);
                sphere_convex(sphere_radius(shape_a), pos_a, hull, pos_b, quat_b, &mut out);
            }
            (ShapeType::Sphere, ShapeType::TriMesh) => {
                let mesh = shape_trimesh(shape_b);
                let radius = sphere_radius(shape_a);
                let local = local_query_aabb(
                    Aabb::centered(pos_a, Vec3::splat(radius)),
                    pos_b,
                    quat_b,
                );
                self.proxy_hits.clear();
                mesh.query_local_aabb(&local, &mut self.proxy_hits);
                for k in 0..self.proxy_hits.len() {
                    let Some(proxy) = mesh.triangle_proxy(self.proxy_hits[k]) else {
                        continue;
                    };
                    if sphere_convex(radius, pos_a, &proxy, pos_b, quat_b, &mut out) {
                        break;
                    }
                }
            }
            (ShapeType::Sphere, ShapeType::Heightfield) => {
                let hf = shape_heightfield(shape_b);
                let radius = sphere_radius(shape_a);
                let local = local_query_aabb(
                    Aabb::centered(pos_a, Vec3::splat(radius)),
                    pos_b,
                    quat_b,
                );
                if let Some((ri_range, rj_range)) = hf.query_local_aabb(&local) {
                    'cells: for ci in ri_range {
                        for cj in rj_range.clone() {
                            for upper in [false, true] {
                                let pillar = hf.pillar(ci, cj, upper);
                                if sphere_convex(radius, pos_a, &pillar, pos_b, quat_b, &mut out) {
                                    break 'cells;
                                }
                            }
                        }
                    }
                }
            }
            (ShapeType::Plane, ShapeType::Box) | (ShapeType::Plane, ShapeType::Convex) => {
                plane_convex(pos_a, quat_a, shape_hull(shape_b), pos_b, quat_b, &mut out);
            }
            (ShapeType::Plane, ShapeType::TriMesh) => {
                plane_trimesh(pos_a, quat_a, shape_trimesh(shape_b), pos_b, quat_b, &mut out);
            }
            (ShapeType::Box, ShapeType::Box)
            | (ShapeType::Box, ShapeType::Convex)
            | (ShapeType::Convex, ShapeType::Convex) => {
                convex_convex(
                    shape_hull(shape_a),
                    pos_a,
                    quat_a,
                    shape_hull(shape_b),
                    pos_b,
                    quat_b,
                    &mut out,
                    &mut self.clip_scratch,
                );
            }
            (ShapeType::Box, ShapeType::TriMesh) | (ShapeType::Convex, ShapeType::TriMesh) => {
                let hull = shape_hull(shape_a);
                let mesh = shape_trimesh(shape_b);
                let local = local_query_aabb(shape_a.world_aabb(pos_a, quat_a), pos_b, quat_b);
                self.proxy_hits.clear();
                mesh.query_local_aabb(&local, &mut self.proxy_hits);
                for k in 0..self.proxy_hits.len() {
                    let Some(proxy) = mesh.triangle_proxy(self.proxy_hits[k]) else {
                        continue;
                    };
                    if convex_convex(
                        hull,
                        pos_a,
                        quat_a,
                        &proxy,
                        pos_b,
                        quat_b,
                        &mut out,
                        &mut self.clip_scratch,
                    ) {
                        break;
                    }
                }
            }
            (ShapeType::Box, ShapeType::Heightfield)
            | (ShapeType::Convex, ShapeType::Heightfield) => {
                let hull = shape_hull(shape_a);
                let hf = shape_heightfield(shape_b);
                let local = local_query_aabb(shape_a.world_aabb(pos_a, quat_a), pos_b, quat_b);
                if let Some((ri_range, rj_range)) = hf.query_local_aabb(&local) {
                    'cells: for ci in ri_range {
                        for cj in rj_range.clone() {
                            for upper in [false, true] {
                                let pillar = hf.pillar(ci, cj, upper);
                                if convex_convex(
                                    hull,
                                    pos_a,
                                    quat_a,
                                    &pillar,
                                    pos_b,
                                    quat_b,
                                    &mut out,
                                    &mut self.clip_scratch,
                                ) {
                                    break 'cells;
                                }
                            }
                        }
                    }
                }
            }
            // Remaining combinations (plane-plane, concave-concave, ...) have
            // no routine; pairs of immovable geometry never reach this point
            // through broadphase anyway
            (a, b) => {
                log::trace!("no narrowphase routine for {a:?}/{b:?}");
            }
        }

        let hit = out.hit;
        if !test_only && hit {
            self.create_friction(bodies, i, j, cm, gravity, equations, contacts_start);
        }
        hit
    }

    /// Friction pairs for the contacts appended since `contacts_start`.
    ///
    /// Bounds use the classic normal-impulse estimate μ·|g|·m_reduced. With
    /// friction reduction on, all contacts collapse into one averaged pair.
    #[allow(clippy::too_many_arguments)]
    fn create_friction(
        &mut self,
        bodies: &[Body],
        i: usize,
        j: usize,
        cm: ContactMaterial,
        gravity: Vec3,
        equations: &mut Vec<Equation>,
        contacts_start: usize,
    ) {
        if cm.friction <= 0.0 {
            return;
        }
        let inv_sum = bodies[i].inv_mass() + bodies[j].inv_mass();
        if inv_sum <= 0.0 {
            return;
        }
        let reduced_mass = 1.0 / inv_sum;
        let bound = cm.friction * gravity.length() * reduced_mass;

        let contacts: Vec<(Vec3, Vec3, Vec3, ShapeRef, ShapeRef, bool)> = equations
            [contacts_start..]
            .iter()
            .map(|eq| (eq.axis, eq.ri, eq.rj, eq.shape_a, eq.shape_b, eq.enabled))
            .collect();
        if contacts.is_empty() {
            return;
        }

        let make = |(normal, ri, rj, sa, sb, enabled): (Vec3, Vec3, Vec3, ShapeRef, ShapeRef, bool),
                    equations: &mut Vec<Equation>| {
            let (t1, t2) = tangent_basis(normal);
            for t in [t1, t2] {
                let mut eq = Equation::new_friction(i, j, sa, sb, t, ri, rj, bound);
                eq.stiffness = cm.friction_stiffness;
                eq.relaxation = cm.friction_relaxation;
                eq.enabled = enabled;
                equations.push(eq);
            }
        };

        if self.friction_reduction && contacts.len() > 1 {
            let n = contacts.len() as f32;
            let mut avg = contacts[0];
            for c in &contacts[1..] {
                avg.0 += c.0;
                avg.1 += c.1;
                avg.2 += c.2;
            }
            avg.0 = (avg.0 / n).normalize_or_zero();
            if avg.0.length_squared() < 0.5 {
                avg.0 = contacts[0].0;
            }
            avg.1 /= n;
            avg.2 /= n;
            make(avg, equations);
        } else {
            for c in contacts {
                make(c, equations);
            }
        }
    }
}

fn sphere_radius(shape: &Shape) -> f32 {
    match &shape.kind {
        ShapeKind::Sphere { radius } => *radius,
        _ => unreachable!("dispatch guarantees a sphere"),
    }
}

fn shape_hull(shape: &Shape) -> &ConvexPolyhedron {
    match &shape.kind {
        ShapeKind::Box { hull, .. } => hull,
        ShapeKind::Convex(hull) => hull,
        _ => unreachable!("dispatch guarantees a polytope"),
    }
}

fn shape_trimesh(shape: &Shape) -> &TriMesh {
    match &shape.kind {
        ShapeKind::TriMesh(mesh) => mesh,
        _ => unreachable!("dispatch guarantees a trimesh"),
    }
}

fn shape_heightfield(shape: &Shape) -> &Heightfield {
    match &shape.kind {
        ShapeKind::Heightfield(hf) => hf,
        _ => unreachable!("dispatch guarantees a heightfield"),
    }
}

/// Conservative transform of a world AABB into a shape's local frame
fn local_query_aabb(world: Aabb, pos: Vec3, quat: Quat) -> Aabb {
    let inv = quat.conjugate();
    let corners = [
        Vec3::new(world.lower.x, world.lower.y, world.lower.z),
        Vec3::new(world.upper.x, world.lower.y, world.lower.z),
        Vec3::new(world.lower.x, world.upper.y, world.lower.z),
        Vec3::new(world.lower.x, world.lower.y, world.upper.z),
        Vec3::new(world.upper.x, world.upper.y, world.lower.z),
        Vec3::new(world.upper.x, world.lower.y, world.upper.z),
        Vec3::new(world.lower.x, world.upper.y, world.upper.z),
        Vec3::new(world.upper.x, world.upper.y, world.upper.z),
    ];
    Aabb::from_points(corners.into_iter().map(|c| inv * (c - pos))).expand(0.05)
}

/// Center distance against summed radii; normal along the center line
fn sphere_sphere(ra: f32, xa: Vec3, rb: f32, xb: Vec3, out: &mut ContactBuilder) -> bool {
    let d = xb - xa;
    let dist_sq = d.length_squared();
    if dist_sq >= (ra + rb) * (ra + rb) {
        return false;
    }
    let dist = dist_sq.sqrt();
    // Concentric spheres have no meaningful normal; pick one
    let n = if dist > 1e-9 { d / dist } else { Vec3::X };
    out.add(n, xa + n * ra, xb - n * rb)
}

/// Signed center distance along the plane normal
fn sphere_plane(radius: f32, xs: Vec3, xp: Vec3, qp: Quat, out: &mut ContactBuilder) -> bool {
    let plane_n = qp * Vec3::Y;
    let dist = plane_n.dot(xs - xp);
    if dist >= radius {
        return false;
    }
    let pa = xs - plane_n * radius;
    let pb = xs - plane_n * dist;
    out.add(-plane_n, pa, pb)
}

/// One contact per hull vertex on the negative side of the plane.
/// Like the other routines, returns true only to request a stop
/// (test-only short-circuit).
fn plane_convex(
    xp: Vec3,
    qp: Quat,
    hull: &ConvexPolyhedron,
    xh: Vec3,
    qh: Quat,
    out: &mut ContactBuilder,
) -> bool {
    let n = qp * Vec3::Y;
    for &v in &hull.vertices {
        let wv = qh * v + xh;
        let d = n.dot(wv - xp);
        if d <= 0.0 && out.add(n, wv - n * d, wv) {
            return true;
        }
    }
    false
}

/// Per-vertex plane test against the mesh (meshes sit on planes, not the
/// other way around, so vertex resolution is plenty)
fn plane_trimesh(
    xp: Vec3,
    qp: Quat,
    mesh: &TriMesh,
    xm: Vec3,
    qm: Quat,
    out: &mut ContactBuilder,
) -> bool {
    let n = qp * Vec3::Y;
    for &v in &mesh.vertices {
        let wv = qm * v + xm;
        let d = n.dot(wv - xp);
        if d <= 0.0 && out.add(n, wv - n * d, wv) {
            return true;
        }
    }
    false
}

/// Closest-feature test of a sphere against a convex hull.
///
/// Face planes are exact separators for a sphere, so any face distance
/// beyond the radius means no contact. Otherwise the sphere center is
/// either inside (deepest face wins), over a face region, or nearest to an
/// edge/vertex.
fn sphere_convex(
    radius: f32,
    xs: Vec3,
    hull: &ConvexPolyhedron,
    xh: Vec3,
    qh: Quat,
    out: &mut ContactBuilder,
) -> bool {
    let mut deepest_face = None;
    let mut deepest_dist = f32::MIN;
    let mut inside = true;

    for (fi, face) in hull.faces.iter().enumerate() {
        let n = qh * hull.face_normals[fi];
        if n.length_squared() < 0.5 {
            continue; // Degenerate face
        }
        let v0 = qh * hull.vertices[face[0]] + xh;
        let d = n.dot(xs - v0);
        if d >= radius {
            return false; // Separated by this face plane
        }
        if d > 0.0 {
            inside = false;
        }
        if d > deepest_dist {
            deepest_dist = d;
            deepest_face = Some(fi);
        }
    }

    let Some(deepest_face) = deepest_face else {
        return false;
    };

    if inside {
        // Center inside the hull: resolve out through the least-deep face
        let n = qh * hull.face_normals[deepest_face];
        let p = xs - n * deepest_dist;
        return out.add(-n, xs - n * radius, p);
    }

    // Face region: project onto each positive-distance face and test the
    // polygon interior
    for (fi, face) in hull.faces.iter().enumerate() {
        let n = qh * hull.face_normals[fi];
        if n.length_squared() < 0.5 {
            continue;
        }
        let world: Vec<Vec3> = face.iter().map(|&vi| qh * hull.vertices[vi] + xh).collect();
        let d = n.dot(xs - world[0]);
        if d <= 0.0 || d >= radius {
            continue;
        }
        let p = xs - n * d;
        let mut contained = true;
        for k in 0..world.len() {
            let a = world[k];
            let b = world[(k + 1) % world.len()];
            if (b - a).cross(p - a).dot(n) < 0.0 {
                contained = false;
                break;
            }
        }
        if contained {
            return out.add(-n, xs - n * radius, p);
        }
    }

    // Edge/vertex region: closest point over all face edges (segment
    // clamping covers the vertices)
    let mut best: Option<(f32, Vec3)> = None;
    for face in &hull.faces {
        for k in 0..face.len() {
            let a = qh * hull.vertices[face[k]] + xh;
            let b = qh * hull.vertices[face[(k + 1) % face.len()]] + xh;
            let ab = b - a;
            let len_sq = ab.length_squared();
            if len_sq < 1e-12 {
                continue;
            }
            let t = (ab.dot(xs - a) / len_sq).clamp(0.0, 1.0);
            let c = a + ab * t;
            let dist_sq = (xs - c).length_squared();
            if best.map_or(true, |(d, _)| dist_sq < d) {
                best = Some((dist_sq, c));
            }
        }
    }
    if let Some((dist_sq, c)) = best
        && dist_sq < radius * radius
    {
        let dist = dist_sq.sqrt();
        if dist > 1e-9 {
            let toward_sphere = (xs - c) / dist;
            return out.add(-toward_sphere, xs - toward_sphere * radius, c);
        }
    }
    false
}

/// SAT plus reference-face clipping; one equation per manifold point
#[allow(clippy::too_many_arguments)]
fn convex_convex(
    hull_a: &ConvexPolyhedron,
    xa: Vec3,
    qa: Quat,
    hull_b: &ConvexPolyhedron,
    xb: Vec3,
    qb: Quat,
    out: &mut ContactBuilder,
    scratch: &mut Vec<ClipPoint>,
) -> bool {
    let Some((axis, _depth)) = hull_a.find_separating_axis(hull_b, xa, qa, xb, qb) else {
        return false;
    };
    scratch.clear();
    hull_a.clip_against_hull(xa, qa, hull_b, xb, qb, axis, scratch);
    for cp in scratch.iter() {
        // Project the incident point back up to A's surface along the axis
        let pa = cp.point - axis * cp.depth;
        if out.add(axis, pa, cp.point) {
            return true;
        }
    }
    false
}

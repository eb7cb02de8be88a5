//! Convex polyhedron geometry and the separating-axis machinery
//!
//! Boxes are represented as 8-vertex/6-face hulls with 3 unique axes, and
//! mesh triangles as degenerate 3-vertex hulls, so every polytope pair in
//! narrowphase funnels through the same SAT + face-clipping code path.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::ShapeError;

/// Edge directions closer than this (in |cross|²) are treated as parallel
const PARALLEL_EPS: f32 = 1e-8;

/// A convex polyhedron: vertices, CCW faces, derived normals and edges
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvexPolyhedron {
    pub vertices: Vec<Vec3>,
    /// Vertex index lists, counter-clockwise seen from outside
    pub faces: Vec<Vec<usize>>,
    /// Outward unit normal per face
    pub face_normals: Vec<Vec3>,
    /// Deduplicated edge directions (unit vectors) for SAT cross axes
    pub unique_edges: Vec<Vec3>,
    /// For boxes: the 3 local axes, replacing the full edge set in SAT
    pub unique_axes: Option<Vec<Vec3>>,
}

/// One point of a clipped contact manifold
#[derive(Debug, Clone, Copy)]
pub struct ClipPoint {
    /// World-space point on the incident hull
    pub point: Vec3,
    /// Signed distance above the reference face (negative = penetrating)
    pub depth: f32,
}

impl ConvexPolyhedron {
    /// Build a hull from vertices and faces, deriving normals and edges.
    ///
    /// Face normals are oriented outward against the vertex centroid, so
    /// winding mistakes in input data are corrected rather than rejected.
    pub fn new(vertices: Vec<Vec3>, faces: Vec<Vec<usize>>) -> Result<Self, ShapeError> {
        if vertices.len() < 4 {
            return Err(ShapeError::DegenerateHull(vertices.len()));
        }
        for (fi, face) in faces.iter().enumerate() {
            for &vi in face {
                if vi >= vertices.len() {
                    return Err(ShapeError::BadFaceIndex { face: fi, index: vi });
                }
            }
        }
        Ok(Self::build(vertices, faces, None))
    }

    /// An axis-aligned box of the given half extents, centered at the origin
    pub fn cuboid(half: Vec3) -> Self {
        let h = half;
        let vertices = vec![
            Vec3::new(-h.x, -h.y, -h.z),
            Vec3::new(h.x, -h.y, -h.z),
            Vec3::new(h.x, h.y, -h.z),
            Vec3::new(-h.x, h.y, -h.z),
            Vec3::new(-h.x, -h.y, h.z),
            Vec3::new(h.x, -h.y, h.z),
            Vec3::new(h.x, h.y, h.z),
            Vec3::new(-h.x, h.y, h.z),
        ];
        let faces = vec![
            vec![3, 2, 1, 0], // -z
            vec![4, 5, 6, 7], // +z
            vec![5, 4, 0, 1], // -y
            vec![2, 3, 7, 6], // +y
            vec![0, 4, 7, 3], // -x
            vec![1, 2, 6, 5], // +x
        ];
        let axes = Some(vec![Vec3::X, Vec3::Y, Vec3::Z]);
        Self::build(vertices, faces, axes)
    }

    /// A flat triangle as a two-faced degenerate hull (mesh collision proxy)
    pub fn triangle(a: Vec3, b: Vec3, c: Vec3) -> Self {
        Self::build(vec![a, b, c], vec![vec![0, 1, 2], vec![0, 2, 1]], None)
    }

    /// Internal constructor for generated geometry known to be well-formed
    /// (heightfield pillars), skipping the public validation.
    pub(crate) fn from_raw(vertices: Vec<Vec3>, faces: Vec<Vec<usize>>) -> Self {
        Self::build(vertices, faces, None)
    }

    fn build(vertices: Vec<Vec3>, faces: Vec<Vec<usize>>, unique_axes: Option<Vec<Vec3>>) -> Self {
        let centroid = vertices.iter().copied().sum::<Vec3>() / vertices.len().max(1) as f32;
        let mut face_normals = Vec::with_capacity(faces.len());
        for face in &faces {
            let n = face_plane_normal(&vertices, face, centroid);
            face_normals.push(n);
        }

        let mut unique_edges: Vec<Vec3> = Vec::new();
        for face in &faces {
            for i in 0..face.len() {
                let a = vertices[face[i]];
                let b = vertices[face[(i + 1) % face.len()]];
                let edge = (b - a).normalize_or_zero();
                if edge.length_squared() < 0.5 {
                    continue; // Repeated vertex
                }
                let known = unique_edges
                    .iter()
                    .any(|e| e.cross(edge).length_squared() < PARALLEL_EPS);
                if !known {
                    unique_edges.push(edge);
                }
            }
        }

        Self {
            vertices,
            faces,
            face_normals,
            unique_edges,
            unique_axes,
        }
    }

    /// Furthest vertex distance from the local origin
    pub fn bounding_radius(&self) -> f32 {
        self.vertices
            .iter()
            .map(|v| v.length())
            .fold(0.0f32, f32::max)
    }

    /// Min/max of the hull projected onto a world axis
    pub fn project(&self, pos: Vec3, quat: Quat, axis: Vec3) -> (f32, f32) {
        let mut min = f32::MAX;
        let mut max = f32::MIN;
        for &v in &self.vertices {
            let d = (quat * v + pos).dot(axis);
            min = min.min(d);
            max = max.max(d);
        }
        (min, max)
    }

    /// Overlap depth of the two hulls along `axis`, or None when separated
    fn test_sep_axis(
        &self,
        other: &ConvexPolyhedron,
        axis: Vec3,
        pos_a: Vec3,
        quat_a: Quat,
        pos_b: Vec3,
        quat_b: Quat,
    ) -> Option<f32> {
        let (min_a, max_a) = self.project(pos_a, quat_a, axis);
        let (min_b, max_b) = other.project(pos_b, quat_b, axis);
        if max_a < min_b || max_b < min_a {
            return None;
        }
        Some((max_a - min_b).min(max_b - min_a))
    }

    /// Separating-axis search over both hulls' face normals and edge crosses.
    ///
    /// Returns the axis of minimum penetration, oriented from `self` toward
    /// `other`, with its overlap depth. None means a separating axis exists.
    pub fn find_separating_axis(
        &self,
        other: &ConvexPolyhedron,
        pos_a: Vec3,
        quat_a: Quat,
        pos_b: Vec3,
        quat_b: Quat,
    ) -> Option<(Vec3, f32)> {
        let mut dmin = f32::MAX;
        let mut best = Vec3::ZERO;

        let mut consider = |axis: Vec3, dmin: &mut f32, best: &mut Vec3| -> bool {
            match self.test_sep_axis(other, axis, pos_a, quat_a, pos_b, quat_b) {
                Some(depth) => {
                    if depth < *dmin {
                        *dmin = depth;
                        *best = axis;
                    }
                    true
                }
                None => false,
            }
        };

        for &n in &self.face_normals {
            if !consider(quat_a * n, &mut dmin, &mut best) {
                return None;
            }
        }
        for &n in &other.face_normals {
            if !consider(quat_b * n, &mut dmin, &mut best) {
                return None;
            }
        }

        // Cross-product axes: boxes collapse their edge set to 3 axes
        let axes_a: &[Vec3] = self.unique_axes.as_deref().unwrap_or(&self.unique_edges);
        let axes_b: &[Vec3] = other.unique_axes.as_deref().unwrap_or(&other.unique_edges);
        for &ea in axes_a {
            let wa = quat_a * ea;
            for &eb in axes_b {
                let wb = quat_b * eb;
                let cross = wa.cross(wb);
                if cross.length_squared() < PARALLEL_EPS {
                    continue;
                }
                if !consider(cross.normalize(), &mut dmin, &mut best) {
                    return None;
                }
            }
        }

        if best == Vec3::ZERO {
            return None;
        }
        if best.dot(pos_b - pos_a) < 0.0 {
            best = -best;
        }
        Some((best, dmin))
    }

    /// Clip `other`'s incident face against this hull's reference face.
    ///
    /// `separating_normal` must point from `self` toward `other` (as returned
    /// by [`find_separating_axis`]). Appends the surviving penetrating points
    /// to `out`.
    pub fn clip_against_hull(
        &self,
        pos_a: Vec3,
        quat_a: Quat,
        other: &ConvexPolyhedron,
        pos_b: Vec3,
        quat_b: Quat,
        separating_normal: Vec3,
        out: &mut Vec<ClipPoint>,
    ) {
        // Reference face: the face of self most aligned with the axis
        let Some(ref_face) = argmax_face(&self.face_normals, quat_a, separating_normal) else {
            return;
        };
        // Incident face: the face of other most anti-aligned with it
        let Some(inc_face) = argmax_face(&other.face_normals, quat_b, -separating_normal) else {
            return;
        };

        let ref_normal = quat_a * self.face_normals[ref_face];
        let ref_verts: Vec<Vec3> = self.faces[ref_face]
            .iter()
            .map(|&i| quat_a * self.vertices[i] + pos_a)
            .collect();
        let mut poly: Vec<Vec3> = other.faces[inc_face]
            .iter()
            .map(|&i| quat_b * other.vertices[i] + pos_b)
            .collect();

        // Successive half-plane clipping against the reference face's sides
        let mut scratch = Vec::with_capacity(poly.len() + 4);
        for i in 0..ref_verts.len() {
            let a = ref_verts[i];
            let b = ref_verts[(i + 1) % ref_verts.len()];
            let edge = b - a;
            let side_normal = ref_normal.cross(edge).normalize_or_zero();
            if side_normal.length_squared() < 0.5 {
                continue;
            }
            clip_polygon(&poly, &mut scratch, side_normal, a);
            std::mem::swap(&mut poly, &mut scratch);
            if poly.is_empty() {
                return;
            }
        }

        let ref_point = ref_verts[0];
        for p in poly {
            let depth = ref_normal.dot(p - ref_point);
            if depth < 0.0 {
                out.push(ClipPoint { point: p, depth });
            }
        }
    }
}

/// Plane normal of a polygonal face, oriented away from `centroid`
fn face_plane_normal(vertices: &[Vec3], face: &[usize], centroid: Vec3) -> Vec3 {
    if face.len() < 3 {
        return Vec3::ZERO;
    }
    let a = vertices[face[0]];
    let b = vertices[face[1]];
    let c = vertices[face[2]];
    let mut n = (b - a).cross(c - a).normalize_or_zero();
    if n.length_squared() < 0.5 {
        // Zero-area face, leave a harmless placeholder
        return Vec3::ZERO;
    }
    if n.dot(a - centroid) < 0.0 {
        n = -n;
    }
    n
}

/// Index of the face whose world normal best aligns with `dir`
fn argmax_face(face_normals: &[Vec3], quat: Quat, dir: Vec3) -> Option<usize> {
    let mut best = None;
    let mut dmax = f32::MIN;
    for (i, &n) in face_normals.iter().enumerate() {
        let d = (quat * n).dot(dir);
        if d > dmax {
            dmax = d;
            best = Some(i);
        }
    }
    best
}

/// Keep the part of `poly` on the positive side of the plane (n, p0)
fn clip_polygon(poly: &[Vec3], out: &mut Vec<Vec3>, n: Vec3, p0: Vec3) {
    out.clear();
    let len = poly.len();
    for i in 0..len {
        let a = poly[i];
        let b = poly[(i + 1) % len];
        let da = n.dot(a - p0);
        let db = n.dot(b - p0);
        if da >= 0.0 {
            out.push(a);
        }
        if (da >= 0.0) != (db >= 0.0) {
            let t = da / (da - db);
            out.push(a + (b - a) * t);
        }
    }
}

//! Construction-time validation errors
//!
//! Invalid shape parameters fail fast at construction. Everything downstream
//! of a successfully built shape is epsilon-guarded instead of fallible: a
//! degenerate contact degrades the simulation visually, it never aborts a
//! step.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ShapeError {
    #[error("sphere radius must be positive, got {0}")]
    InvalidRadius(f32),

    #[error("box half extents must be positive, got ({0}, {1}, {2})")]
    InvalidHalfExtents(f32, f32, f32),

    #[error("convex hull needs at least 4 vertices, got {0}")]
    DegenerateHull(usize),

    #[error("convex face {face} references out-of-range vertex {index}")]
    BadFaceIndex { face: usize, index: usize },

    #[error("triangle mesh index {0} out of range for {1} vertices")]
    BadTriangleIndex(u32, usize),

    #[error("triangle mesh needs at least one triangle")]
    EmptyMesh,

    #[error("heightfield needs a grid of at least 2x2 samples")]
    HeightfieldTooSmall,

    #[error("heightfield rows must all have length {expected}, row {row} has {got}")]
    RaggedHeightfield { expected: usize, row: usize, got: usize },

    #[error("heightfield element size must be positive, got {0}")]
    InvalidElementSize(f32),
}

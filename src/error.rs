//! Error types for fairmesh.
//!
//! Mesh construction reports [`MeshError`]; the linear solver reports
//! [`SolveError`]; a fairing pass reports [`FairError`]. The boolean
//! [`fair`](crate::algo::fair::fair) entry point collapses the last one, the
//! detailed value is there for logging and for hosts that want it.

use thiserror::Error;

use crate::mesh::VertexId;

/// Result type alias using [`MeshError`].
pub type Result<T> = std::result::Result<T, MeshError>;

/// Errors that can occur while building or editing a mesh.
#[derive(Error, Debug)]
pub enum MeshError {
    /// The mesh has no faces.
    #[error("mesh has no faces")]
    EmptyMesh,

    /// A face references an invalid vertex index.
    #[error("face {face} references invalid vertex index {vertex}")]
    InvalidVertexIndex {
        /// The face index.
        face: usize,
        /// The invalid vertex index.
        vertex: usize,
    },

    /// A face has fewer than three corners or repeats a vertex.
    #[error("face {face} is degenerate (fewer than 3 or duplicate vertices)")]
    DegenerateFace {
        /// The face index.
        face: usize,
    },

    /// A directed edge is used by more than one face.
    #[error("directed edge ({v0}, {v1}) is used by more than one face")]
    NonManifoldEdge {
        /// First vertex of the edge.
        v0: usize,
        /// Second vertex of the edge.
        v1: usize,
    },

    /// Invalid parameter value.
    #[error("invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// The invalid value (as string).
        value: String,
        /// Reason the value is invalid.
        reason: &'static str,
    },
}

impl MeshError {
    /// Create an invalid parameter error.
    pub fn invalid_param<T: std::fmt::Display>(
        name: &'static str,
        value: T,
        reason: &'static str,
    ) -> Self {
        MeshError::InvalidParameter {
            name,
            value: value.to_string(),
            reason,
        }
    }
}

/// Failures of the sparse conjugate gradient solver.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolveError {
    /// The relative residual did not drop below tolerance.
    #[error("solver did not converge after {iterations} iterations (relative residual {residual:e})")]
    NotConverged {
        /// Number of iterations attempted.
        iterations: usize,
        /// Relative residual norm reached.
        residual: f64,
    },

    /// A search direction had zero or negative curvature; the matrix is singular
    /// or indefinite.
    #[error("solver broke down at iteration {iteration}: matrix is singular or indefinite")]
    Breakdown {
        /// Iteration at which the breakdown occurred.
        iteration: usize,
    },

    /// Some unknowns are not coupled to any fixed value, so the system has no
    /// unique solution.
    #[error("system is singular: {unanchored} unknowns are not connected to a fixed vertex")]
    Singular {
        /// Number of unanchored unknowns.
        unanchored: usize,
    },

    /// The system or its solution contains NaN or infinity.
    #[error("linear system contains non-finite values")]
    NonFinite,
}

/// Reasons a fairing pass did not produce new positions.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FairError {
    /// The affected vertex set is empty.
    #[error("no vertices to fair")]
    NothingToDo,

    /// The cancellation token was observed before write-back.
    #[error("fairing was cancelled")]
    Cancelled,

    /// An affected vertex does not belong to the mesh.
    #[error("affected vertex {vertex:?} is not part of the mesh")]
    InvalidVertex {
        /// The offending vertex.
        vertex: VertexId,
    },

    /// The linear system could not be solved.
    #[error("failed to solve the fairing system: {0}")]
    Solve(#[from] SolveError),
}

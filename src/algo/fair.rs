//! Continuity-constrained mesh fairing.
//!
//! Fairing replaces the positions of a set of *affected* vertices with the
//! smoothest patch that blends into the rest of the mesh. The smoothness is
//! chosen by a [`Continuity`] order `k`:
//!
//! - [`Continuity::Position`] (k = 1): harmonic patch, each affected vertex at
//!   the weighted average of its neighbours.
//! - [`Continuity::Tangent`] (k = 2): biharmonic patch, blends tangent planes.
//! - [`Continuity::Curvature`] (k = 3): triharmonic patch, blends curvature.
//!
//! # Algorithm
//!
//! With the weighted stiffness matrix `K` (from the loop weights) and the
//! diagonal mass matrix `M` (from the vertex weights), the order-`k` operator
//! is the symmetric matrix `A = K (M⁻¹K)^(k-1)`. Its rows for the affected
//! vertices are the classic `(M⁻¹K)^k x = 0` equations scaled by `M`, so both
//! have the same solution. Partitioning `A` into free (`f`) and fixed (`b`)
//! blocks gives
//!
//! ```text
//! A_ff x_f = -A_fb x_b
//! ```
//!
//! which is solved per axis with preconditioned conjugate gradient. Only the
//! vertices within `k` rings of the affected set take part.
//!
//! # Example
//!
//! ```
//! use fairmesh::prelude::*;
//! use fairmesh::algo::fair::{fair, Continuity, FairOptions};
//! use fairmesh::algo::status::{CancelToken, FairingStatus};
//! use fairmesh::algo::weights::{LoopWeight, VertexWeight};
//! use nalgebra::Point3;
//!
//! // 3x3 grid of quads with the centre vertex lifted
//! let mut vertices = Vec::new();
//! for j in 0..3 {
//!     for i in 0..3 {
//!         vertices.push(Point3::new(i as f64, j as f64, 0.0));
//!     }
//! }
//! vertices[4].z = 1.0;
//! let faces = vec![vec![0, 1, 4, 3], vec![1, 2, 5, 4], vec![3, 4, 7, 6], vec![4, 5, 8, 7]];
//! let mut mesh = build_from_polygons(&vertices, &faces).unwrap();
//!
//! let vw = VertexWeight::Uniform.build(&mesh);
//! let lw = LoopWeight::Uniform.build(&mesh);
//! let ok = fair(
//!     &mut mesh,
//!     &[VertexId::new(4)],
//!     Continuity::Position,
//!     &vw,
//!     &lw,
//!     &CancelToken::new(),
//!     &FairingStatus::new(),
//!     &FairOptions::default(),
//! );
//! assert!(ok);
//! assert!(mesh.position(VertexId::new(4)).z.abs() < 1e-9);
//! ```
//!
//! # References
//!
//! - Desbrun, M., et al. (1999). "Implicit Fairing of Irregular Meshes using
//!   Diffusion and Curvature Flow." SIGGRAPH.
//! - Botsch, M., Kobbelt, L. (2004). "An Intuitive Framework for Real-Time
//!   Freeform Modeling." SIGGRAPH.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, info};
use nalgebra::{DVector, Point3};
use rayon::prelude::*;

use crate::error::{FairError, MeshError, SolveError};
use crate::mesh::{HalfEdgeMesh, VertexId};

use super::region::vertex_rings;
use super::sparse::{conjugate_gradient, CsrMatrix, Solution};
use super::status::{CancelToken, FairingStatus};
use super::weights::{LoopWeightCache, VertexWeightCache};

/// Phase label while per-vertex and per-edge weights are gathered.
pub const PHASE_WEIGHTS: &str = "Looking up weights";
/// Phase label while the sparse operator is built.
pub const PHASE_ASSEMBLY: &str = "Assembling the linear system";
/// Phase label while the per-axis systems are solved.
pub const PHASE_SOLVE: &str = "Solving the linear system";

/// Continuity order of the faired patch at its border.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Continuity {
    /// Match positions (harmonic).
    Position = 1,
    /// Match positions and tangent planes (biharmonic).
    #[default]
    Tangent = 2,
    /// Match positions, tangents and curvature (triharmonic).
    Curvature = 3,
}

impl Continuity {
    /// All orders, lowest first.
    pub const ALL: [Continuity; 3] = [
        Continuity::Position,
        Continuity::Tangent,
        Continuity::Curvature,
    ];

    /// The order of the constraint (1, 2 or 3).
    #[inline]
    pub fn order(self) -> usize {
        self as usize
    }

    /// Extra rings of faces the involved region needs beyond the faces
    /// adjacent to the affected vertices.
    #[inline]
    pub fn rings(self) -> usize {
        self.order() - 1
    }

    /// Continuity for a numeric order.
    pub fn from_order(order: usize) -> Result<Self, MeshError> {
        match order {
            1 => Ok(Continuity::Position),
            2 => Ok(Continuity::Tangent),
            3 => Ok(Continuity::Curvature),
            _ => Err(MeshError::invalid_param("continuity", order, "order must be 1, 2 or 3")),
        }
    }

    /// Lower-case name used in the CLI and in logs.
    pub fn name(self) -> &'static str {
        match self {
            Continuity::Position => "position",
            Continuity::Tangent => "tangent",
            Continuity::Curvature => "curvature",
        }
    }
}

impl fmt::Display for Continuity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Continuity {
    type Err = MeshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "position" | "pos" => Ok(Continuity::Position),
            "tangent" | "tan" => Ok(Continuity::Tangent),
            "curvature" | "curv" => Ok(Continuity::Curvature),
            _ => Err(MeshError::invalid_param(
                "continuity",
                s,
                "expected position, tangent or curvature",
            )),
        }
    }
}

/// Numerical options for a fairing pass.
#[derive(Debug, Clone)]
pub struct FairOptions {
    /// Maximum conjugate gradient iterations per axis.
    pub max_iterations: usize,

    /// Relative residual at which the solve is considered converged.
    pub tolerance: f64,

    /// Whether to solve the three axes in parallel (default: true).
    pub parallel: bool,
}

impl Default for FairOptions {
    fn default() -> Self {
        Self {
            max_iterations: 10_000,
            tolerance: 1e-8,
            parallel: true,
        }
    }
}

impl FairOptions {
    /// Set the iteration limit per axis.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the relative residual tolerance.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set whether to use parallel execution.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Create options for single-threaded execution.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    /// Check that the options can drive a solve.
    pub fn validate(&self) -> Result<(), MeshError> {
        if self.max_iterations == 0 {
            return Err(MeshError::invalid_param(
                "max_iterations",
                self.max_iterations,
                "must be positive",
            ));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(MeshError::invalid_param(
                "tolerance",
                self.tolerance,
                "must be finite and positive",
            ));
        }
        Ok(())
    }
}

/// Summary of a successful fairing pass.
#[derive(Debug, Clone, PartialEq)]
pub struct FairReport {
    /// Number of distinct affected vertices that were moved.
    pub free_vertices: usize,
    /// Number of vertices taking part in the system (free and fixed).
    pub support_vertices: usize,
    /// Stored entries of the free block `A_ff`.
    pub nonzeros: usize,
    /// Conjugate gradient iterations for x, y and z.
    pub iterations: [usize; 3],
    /// Largest final relative residual over the three axes.
    pub residual: f64,
}

/// Fair the affected vertices in place.
///
/// Returns `true` when new positions were written. On `false` nothing was
/// written; this covers an empty affected set, cancellation, invalid input
/// and solver failure alike. Use [`try_fair`] to tell them apart.
#[allow(clippy::too_many_arguments)]
pub fn fair(
    mesh: &mut HalfEdgeMesh,
    affected: &[VertexId],
    continuity: Continuity,
    vertex_weights: &VertexWeightCache,
    loop_weights: &LoopWeightCache,
    cancel: &CancelToken,
    status: &FairingStatus,
    options: &FairOptions,
) -> bool {
    try_fair(
        mesh,
        affected,
        continuity,
        vertex_weights,
        loop_weights,
        cancel,
        status,
        options,
    )
    .map_err(|e| debug!("fairing aborted: {}", e))
    .is_ok()
}

/// Fair the affected vertices in place, reporting why a pass did not apply.
///
/// The weight caches must have been built from `mesh` (or from a mesh with the
/// same topology). Duplicate ids in `affected` are ignored. Positions are only
/// written after the solve succeeded and no cancellation was observed.
///
/// # Errors
///
/// - [`FairError::InvalidVertex`] if an affected id is not part of the mesh
/// - [`FairError::NothingToDo`] if `affected` is empty
/// - [`FairError::Cancelled`] if `cancel` was raised before write-back
/// - [`FairError::Solve`] if the system is singular (a connected part of the
///   mesh is affected entirely) or could not be solved to tolerance
#[allow(clippy::too_many_arguments)]
pub fn try_fair(
    mesh: &mut HalfEdgeMesh,
    affected: &[VertexId],
    continuity: Continuity,
    vertex_weights: &VertexWeightCache,
    loop_weights: &LoopWeightCache,
    cancel: &CancelToken,
    status: &FairingStatus,
    options: &FairOptions,
) -> Result<FairReport, FairError> {
    if let Some(&vertex) = affected.iter().find(|&&v| !mesh.contains_vertex(v)) {
        return Err(FairError::InvalidVertex { vertex });
    }

    let mut seen = HashSet::with_capacity(affected.len());
    let free: Vec<VertexId> = affected.iter().copied().filter(|&v| seen.insert(v)).collect();
    if free.is_empty() {
        return Err(FairError::NothingToDo);
    }

    status.set_phase(PHASE_WEIGHTS);
    let order = continuity.order();
    let support: Vec<VertexId> = vertex_rings(mesh, &free, order)
        .into_iter()
        .map(|(v, _)| v)
        .collect();
    let stencil = gather_stencil(mesh, &support, vertex_weights, loop_weights);

    // A free component with no fixed neighbour has no boundary values
    let unanchored = count_unanchored(&stencil, free.len());
    if unanchored > 0 {
        return Err(SolveError::Singular { unanchored }.into());
    }

    if cancel.is_cancelled() {
        return Err(FairError::Cancelled);
    }

    status.set_phase(PHASE_ASSEMBLY);
    let (a_ff, a_fb) = assemble(&stencil, free.len(), order);
    debug!(
        "fairing {} vertices ({}): support {}, nnz {}",
        free.len(),
        continuity,
        support.len(),
        a_ff.nnz()
    );

    if cancel.is_cancelled() {
        return Err(FairError::Cancelled);
    }

    status.set_phase(PHASE_SOLVE);
    status.set_progress(0, 3);
    let solutions = solve_axes(mesh, &support, free.len(), &a_ff, &a_fb, status, options)?;

    if cancel.is_cancelled() {
        return Err(FairError::Cancelled);
    }

    for (i, &v) in free.iter().enumerate() {
        mesh.set_position(
            v,
            Point3::new(solutions[0].x[i], solutions[1].x[i], solutions[2].x[i]),
        );
    }

    let report = FairReport {
        free_vertices: free.len(),
        support_vertices: support.len(),
        nonzeros: a_ff.nnz(),
        iterations: [
            solutions[0].iterations,
            solutions[1].iterations,
            solutions[2].iterations,
        ],
        residual: solutions
            .iter()
            .map(|s| s.residual)
            .fold(0.0, f64::max),
    };
    info!(
        "faired {} vertices with {} continuity in {:?} iterations",
        report.free_vertices, continuity, report.iterations
    );
    Ok(report)
}

/// Local weights of the support region, indexed by support position.
struct Stencil {
    /// `1 / vertex weight` per support vertex.
    inv_mass: Vec<f64>,
    /// Symmetric edge weights `(row, col, w)` between support vertices.
    edges: Vec<(usize, usize, f64)>,
    /// Sum of all edge weights around each support vertex, including edges
    /// leaving the support.
    degree: Vec<f64>,
}

fn gather_stencil(
    mesh: &HalfEdgeMesh,
    support: &[VertexId],
    vertex_weights: &VertexWeightCache,
    loop_weights: &LoopWeightCache,
) -> Stencil {
    let local: HashMap<VertexId, usize> =
        support.iter().enumerate().map(|(i, &v)| (v, i)).collect();

    let mut inv_mass = Vec::with_capacity(support.len());
    let mut degree = Vec::with_capacity(support.len());
    let mut edges = Vec::new();

    for (row, &v) in support.iter().enumerate() {
        inv_mass.push(1.0 / vertex_weights.weight(v));

        let mut sum = 0.0;
        for he in mesh.vertex_halfedges(v) {
            let w = 0.5 * (loop_weights.weight(he) + loop_weights.weight(mesh.twin(he)));
            sum += w;
            if let Some(&col) = local.get(&mesh.dest(he)) {
                edges.push((row, col, w));
            }
        }
        degree.push(sum);
    }

    Stencil {
        inv_mass,
        edges,
        degree,
    }
}

/// Number of free vertices that cannot reach a fixed support vertex through
/// free neighbours.
fn count_unanchored(stencil: &Stencil, num_free: usize) -> usize {
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); num_free];
    let mut anchored = vec![false; num_free];
    let mut queue = VecDeque::new();

    for &(row, col, _) in &stencil.edges {
        if row >= num_free {
            continue;
        }
        if col < num_free {
            adjacency[row].push(col);
        } else if !anchored[row] {
            anchored[row] = true;
            queue.push_back(row);
        }
    }

    while let Some(i) = queue.pop_front() {
        for &j in &adjacency[i] {
            if !anchored[j] {
                anchored[j] = true;
                queue.push_back(j);
            }
        }
    }

    anchored.iter().filter(|&&a| !a).count()
}

/// Build the free and fixed blocks of `A = K (M⁻¹K)^(order-1)`.
///
/// Rows of `K` for the outermost ring are truncated; they are never reached
/// from a free row within `order - 1` products.
fn assemble(stencil: &Stencil, num_free: usize, order: usize) -> (CsrMatrix, CsrMatrix) {
    let n = stencil.degree.len();

    let mut triplets = Vec::with_capacity(stencil.edges.len() + n);
    for &(row, col, w) in &stencil.edges {
        triplets.push((row, col, -w));
    }
    for (i, &d) in stencil.degree.iter().enumerate() {
        triplets.push((i, i, d));
    }
    let stiffness = CsrMatrix::from_triplets(n, n, triplets);

    let free: Vec<usize> = (0..num_free).collect();
    let fixed: Vec<usize> = (num_free..n).collect();
    let all: Vec<usize> = (0..n).collect();

    let mut rows = stiffness.submatrix(&free, &all);
    if order > 1 {
        let mut normalized = stiffness;
        normalized.scale_rows(&stencil.inv_mass);
        for _ in 1..order {
            rows = rows.mul(&normalized);
        }
    }

    (rows.submatrix(&free, &free), rows.submatrix(&free, &fixed))
}

fn solve_axes(
    mesh: &HalfEdgeMesh,
    support: &[VertexId],
    num_free: usize,
    a_ff: &CsrMatrix,
    a_fb: &CsrMatrix,
    status: &FairingStatus,
    options: &FairOptions,
) -> Result<Vec<Solution>, FairError> {
    let done = AtomicUsize::new(0);

    let solve_axis = |axis: usize| -> Result<Solution, SolveError> {
        let coord = |v: &VertexId| mesh.position(*v)[axis];
        let x_free = DVector::from_iterator(num_free, support[..num_free].iter().map(coord));
        let x_fixed =
            DVector::from_iterator(support.len() - num_free, support[num_free..].iter().map(coord));

        let rhs = -a_fb.mul_vec(&x_fixed);
        let solution = conjugate_gradient(
            a_ff,
            &rhs,
            Some(&x_free),
            options.max_iterations,
            options.tolerance,
        )?;
        if solution.x.iter().any(|c| !c.is_finite()) {
            return Err(SolveError::NonFinite);
        }

        status.set_progress(done.fetch_add(1, Ordering::AcqRel) + 1, 3);
        Ok(solution)
    };

    let results: Vec<Result<Solution, SolveError>> = if options.parallel {
        (0..3).into_par_iter().map(solve_axis).collect()
    } else {
        (0..3).map(solve_axis).collect()
    };

    let solutions = results.into_iter().collect::<Result<Vec<_>, _>>()?;
    debug!(
        "solved axes in {:?} iterations",
        solutions.iter().map(|s| s.iterations).collect::<Vec<_>>()
    );
    Ok(solutions)
}

//! Vertex and loop weights for the discrete Laplacian.
//!
//! The fairing operator is built from two kinds of weight:
//!
//! - a **vertex weight** (the integration measure at a vertex), chosen by
//!   [`VertexWeight`]: uniform or the mixed Voronoi area;
//! - a **loop weight** (the coefficient of a half-edge in the Laplacian),
//!   chosen by [`LoopWeight`]: uniform or cotangent.
//!
//! Each scheme builds an immutable cache once per fairing pass. Non-uniform
//! caches are dense arrays indexed by vertex / half-edge id, so lookups during
//! assembly are O(1) and the caches can be shared between threads.
//!
//! # Example
//!
//! ```
//! use fairmesh::prelude::*;
//! use fairmesh::algo::weights::{LoopWeight, VertexWeight};
//! use nalgebra::Point3;
//!
//! let vertices = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.0, 1.0, 0.0),
//! ];
//! let mesh = build_from_triangles(&vertices, &[[0, 1, 2]]).unwrap();
//!
//! let areas = VertexWeight::Voronoi.build(&mesh);
//! let total: f64 = mesh.vertex_ids().map(|v| areas.weight(v)).sum();
//! assert!((total - mesh.surface_area()).abs() < 1e-12);
//!
//! let cotans = LoopWeight::Cotan.build(&mesh);
//! assert!(mesh.halfedge_ids().all(|he| cotans.weight(he) >= 0.0));
//! ```
//!
//! # References
//!
//! - Meyer, M., et al. (2003). "Discrete Differential-Geometry Operators for
//!   Triangulated 2-Manifolds." Visualization and Mathematics III.

use std::fmt;
use std::str::FromStr;

use nalgebra::Point3;
use rayon::prelude::*;

use crate::error::MeshError;
use crate::mesh::{HalfEdgeId, HalfEdgeMesh, VertexId};

/// Scheme for per-vertex weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VertexWeight {
    /// Every vertex weighs 1.
    #[default]
    Uniform,
    /// Mixed Voronoi area of the vertex.
    Voronoi,
}

/// Scheme for per-half-edge (loop) weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoopWeight {
    /// Every half-edge weighs 1.
    #[default]
    Uniform,
    /// Sum of the cotangents of the angles opposite the edge.
    Cotan,
}

impl VertexWeight {
    /// Build the weight cache for `mesh`, computing in parallel.
    pub fn build(self, mesh: &HalfEdgeMesh) -> VertexWeightCache {
        self.build_with(mesh, true)
    }

    /// Build the weight cache for `mesh`, choosing parallel or sequential evaluation.
    pub fn build_with(self, mesh: &HalfEdgeMesh, parallel: bool) -> VertexWeightCache {
        match self {
            VertexWeight::Uniform => VertexWeightCache { values: None },
            VertexWeight::Voronoi => {
                let n = mesh.num_vertices();
                let mut areas: Vec<f64> = if parallel {
                    (0..n)
                        .into_par_iter()
                        .map(|i| voronoi_area(mesh, VertexId::new(i)))
                        .collect()
                } else {
                    (0..n).map(|i| voronoi_area(mesh, VertexId::new(i))).collect()
                };
                repair_areas(&mut areas);
                VertexWeightCache {
                    values: Some(areas),
                }
            }
        }
    }

    /// Lower-case name used in the CLI and in logs.
    pub fn name(self) -> &'static str {
        match self {
            VertexWeight::Uniform => "uniform",
            VertexWeight::Voronoi => "voronoi",
        }
    }
}

impl LoopWeight {
    /// Build the weight cache for `mesh`, computing in parallel.
    pub fn build(self, mesh: &HalfEdgeMesh) -> LoopWeightCache {
        self.build_with(mesh, true)
    }

    /// Build the weight cache for `mesh`, choosing parallel or sequential evaluation.
    pub fn build_with(self, mesh: &HalfEdgeMesh, parallel: bool) -> LoopWeightCache {
        match self {
            LoopWeight::Uniform => LoopWeightCache { values: None },
            LoopWeight::Cotan => {
                let n = mesh.num_halfedges();
                let values = if parallel {
                    (0..n)
                        .into_par_iter()
                        .map(|i| cotan_weight(mesh, HalfEdgeId::new(i)))
                        .collect()
                } else {
                    (0..n).map(|i| cotan_weight(mesh, HalfEdgeId::new(i))).collect()
                };
                LoopWeightCache {
                    values: Some(values),
                }
            }
        }
    }

    /// Lower-case name used in the CLI and in logs.
    pub fn name(self) -> &'static str {
        match self {
            LoopWeight::Uniform => "uniform",
            LoopWeight::Cotan => "cotan",
        }
    }
}

impl fmt::Display for VertexWeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for LoopWeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for VertexWeight {
    type Err = MeshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "uniform" => Ok(VertexWeight::Uniform),
            "voronoi" => Ok(VertexWeight::Voronoi),
            _ => Err(MeshError::invalid_param("vertex_weight", s, "expected uniform or voronoi")),
        }
    }
}

impl FromStr for LoopWeight {
    type Err = MeshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "uniform" => Ok(LoopWeight::Uniform),
            "cotan" | "cotangent" => Ok(LoopWeight::Cotan),
            _ => Err(MeshError::invalid_param("loop_weight", s, "expected uniform or cotan")),
        }
    }
}

/// Immutable per-vertex weights for one fairing pass.
#[derive(Debug, Clone)]
pub struct VertexWeightCache {
    /// `None` for the uniform scheme.
    values: Option<Vec<f64>>,
}

impl VertexWeightCache {
    /// Weight of vertex `v`. Always finite and strictly positive.
    #[inline]
    pub fn weight(&self, v: VertexId) -> f64 {
        self.values.as_ref().map_or(1.0, |w| w[v.index()])
    }

    /// Whether every vertex has weight 1.
    #[inline]
    pub fn is_uniform(&self) -> bool {
        self.values.is_none()
    }
}

/// Immutable per-half-edge weights for one fairing pass.
#[derive(Debug, Clone)]
pub struct LoopWeightCache {
    /// `None` for the uniform scheme.
    values: Option<Vec<f64>>,
}

impl LoopWeightCache {
    /// Weight of half-edge `he`. Always finite and non-negative.
    #[inline]
    pub fn weight(&self, he: HalfEdgeId) -> f64 {
        self.values.as_ref().map_or(1.0, |w| w[he.index()])
    }

    /// Whether every half-edge has weight 1.
    #[inline]
    pub fn is_uniform(&self) -> bool {
        self.values.is_none()
    }
}

/// Cotangent of the angle at `a` in triangle (a, b, c), or 0 if that corner is degenerate.
fn cotangent_angle(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> f64 {
    let ab = b - a;
    let ac = c - a;

    let dot = ab.dot(&ac);
    let cross_norm = ab.cross(&ac).norm();
    let scale = ab.norm() * ac.norm();

    // Zero-length side, or angle close to 0 or pi
    if cross_norm.is_nan() || cross_norm <= 1e-12 * scale {
        return 0.0;
    }

    dot / cross_norm
}

/// Cotangent weight of a half-edge.
///
/// Sums `cot` of the angle opposite the edge in each incident face. For a
/// polygon the corner after the edge's destination stands in for the opposite
/// vertex. Degenerate corners contribute 0 and the sum is clamped at 0, so the
/// result is finite and non-negative. Both half-edges of an edge get the same
/// value.
pub fn cotan_weight(mesh: &HalfEdgeMesh, he: HalfEdgeId) -> f64 {
    let a = mesh.position(mesh.origin(he));
    let b = mesh.position(mesh.dest(he));
    let mut weight = 0.0;

    for side in [he, mesh.twin(he)] {
        if !mesh.is_boundary_halfedge(side) {
            let opposite = mesh.position(mesh.dest(mesh.next(side)));
            weight += cotangent_angle(opposite, a, b);
        }
    }

    if weight.is_finite() {
        weight.max(0.0)
    } else {
        0.0
    }
}

/// Mixed Voronoi area of a vertex.
///
/// For each face corner at `v` (triangle `v`, next corner, previous corner):
/// - non-obtuse: the Voronoi region `(|PR|² cot Q + |PQ|² cot R) / 8`
/// - obtuse at `v`: half the corner triangle's area
/// - obtuse elsewhere: a quarter of it
///
/// Falls back to the barycentric area when the mixed sum is negligible next to
/// it.
/// The result may still be zero for a vertex with only degenerate faces.
pub fn voronoi_area(mesh: &HalfEdgeMesh, v: VertexId) -> f64 {
    let p = mesh.position(v);
    let mut mixed = 0.0;
    let mut barycentric = 0.0;

    for he in mesh.vertex_halfedges(v) {
        if mesh.is_boundary_halfedge(he) {
            continue;
        }
        let q = mesh.position(mesh.dest(he));
        let r = mesh.position(mesh.origin(mesh.prev(he)));

        let pq = q - p;
        let pr = r - p;
        let qr = r - q;
        let tri_area = 0.5 * pq.cross(&pr).norm();
        barycentric += tri_area / 3.0;

        if pq.dot(&pr) < 0.0 {
            mixed += tri_area / 2.0;
        } else if (-pq).dot(&qr) < 0.0 || pr.dot(&qr) < 0.0 {
            mixed += tri_area / 4.0;
        } else {
            let cot_q = cotangent_angle(q, p, r);
            let cot_r = cotangent_angle(r, p, q);
            mixed += 0.125 * (pr.norm_squared() * cot_q + pq.norm_squared() * cot_r);
        }
    }

    if mixed <= 1e-10 * barycentric {
        barycentric
    } else {
        mixed
    }
}

/// Replace unusable areas with the mean of the usable ones (or 1 if none are).
fn repair_areas(areas: &mut [f64]) {
    let usable = |a: f64| a.is_finite() && a > 0.0;
    let (sum, count) = areas
        .iter()
        .filter(|&&a| usable(a))
        .fold((0.0, 0usize), |(s, c), &a| (s + a, c + 1));
    let fallback = if count > 0 { sum / count as f64 } else { 1.0 };

    for a in areas.iter_mut().filter(|a| !usable(**a)) {
        *a = fallback;
    }
}
